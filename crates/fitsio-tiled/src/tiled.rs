//! Tile iteration, per-tile dispatch and assembly of the full image.
//!
//! Tiles are numbered row-major within a plane and plane after plane; table
//! row `n` holds tile `n`. Each tile is decoded into integer samples or raw
//! big-endian pixels and then written into its clipped rectangle of the
//! output buffer. The output is split into bands, one per row of tiles, so
//! that with the `rayon` feature every band can be filled independently.

use alloc::borrow::Cow;
use alloc::vec::Vec;

use crate::compression::{Algorithm, CompressionHeader};
use crate::error::{Error, Result};
use crate::gzip;
use crate::hcompress;
use crate::header::{image_header, Card};
use crate::pixel::{read_integer, read_pixel, write_integer, write_pixel, PixelBuffer};
use crate::quantize::{random_sequence, Dequantize};
use crate::rice::{self, RiceParams};
use crate::table::{PayloadSource, TileDescriptor};

/// What to do when a single tile cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TilePolicy {
    /// Stop and return [`Error::Tile`].
    #[default]
    Abort,
    /// Log the failure, leave the tile zero-filled and keep going.
    ZeroFill,
}

/// Options for [`decompress`] and [`TileDecoder::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub policy: TilePolicy,
    /// Build the plain-image header alongside the pixels.
    pub header: bool,
    /// Decode bands of tiles in parallel. Only has an effect with the
    /// `rayon` feature.
    pub parallel: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            policy: TilePolicy::Abort,
            header: false,
            parallel: true,
        }
    }
}

/// A tile skipped under [`TilePolicy::ZeroFill`].
#[derive(Debug)]
pub struct TileFailure {
    pub index: usize,
    /// Tile row within its plane.
    pub row: usize,
    /// Tile column.
    pub col: usize,
    pub error: Error,
}

/// Result of decoding a whole image.
#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: PixelBuffer,
    /// Plain-image header, when requested.
    pub header: Option<Vec<Card>>,
    pub failures: Vec<TileFailure>,
}

/// Where one tile sits in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub index: usize,
    pub plane: usize,
    pub row: usize,
    pub col: usize,
    /// First pixel column covered by the tile.
    pub x: usize,
    /// First pixel row covered by the tile, within its plane.
    pub y: usize,
    /// Clipped width.
    pub width: usize,
    /// Clipped height.
    pub height: usize,
}

impl TileRect {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Decoded tile contents before placement.
enum TileData<'a> {
    /// Big-endian pixels already in the output type.
    Raw(Cow<'a, [u8]>),
    /// Integer samples awaiting scaling.
    Integers(Vec<i64>),
}

/// Destination of a tile: a buffer `stride` pixels wide, with the tile's
/// top-left corner at `(x, y)`.
struct Target<'b> {
    bytes: &'b mut [u8],
    stride: usize,
    x: usize,
    y: usize,
}

impl Target<'_> {
    #[inline]
    fn offset(&self, i: usize, width: usize, bpp: usize) -> usize {
        ((self.y + i / width) * self.stride + self.x + i % width) * bpp
    }
}

/// Decoder over one compressed image: the parsed header plus the table's
/// data segment (rows followed by the heap).
#[derive(Debug)]
pub struct TileDecoder<'a> {
    header: CompressionHeader,
    cards: &'a [Card],
    data: &'a [u8],
    random: Vec<f32>,
}

impl<'a> TileDecoder<'a> {
    /// Parse the header and check the table fits in `data`. Fails before any
    /// image buffer is allocated.
    pub fn new(cards: &'a [Card], data: &'a [u8]) -> Result<Self> {
        let header = CompressionHeader::from_cards(cards)?;
        if data.len() < header.table.table_len() {
            return Err(Error::UnexpectedEof);
        }
        if header.algorithm == Algorithm::HCompress {
            log::debug!(
                "HCOMPRESS_1 SCALE {}; each tile stream carries its own scale",
                header.hcompress_scale
            );
            if header.hcompress_smooth {
                log::warn!("HCOMPRESS_1 smoothing is not supported; decoding without it");
            }
        }
        let random = if header.is_quantized() && header.quantization.is_dithered() {
            random_sequence()
        } else {
            Vec::new()
        };
        log::debug!(
            "{} image {:?}, BITPIX {}, {}x{} tiles, {} tiles in total",
            header.algorithm.name(),
            header.axes,
            header.depth.bitpix(),
            header.tile_width,
            header.tile_height,
            header.tile_count()
        );
        Ok(TileDecoder {
            header,
            cards,
            data,
            random,
        })
    }

    pub fn header(&self) -> &CompressionHeader {
        &self.header
    }

    /// Locate tile `index`.
    pub fn rect(&self, index: usize) -> Result<TileRect> {
        let h = &self.header;
        if index >= h.tile_count() {
            return Err(Error::TileGeometry("tile index out of range"));
        }
        let per_plane = h.tiles_per_plane();
        let within = index % per_plane;
        let row = within / h.tiles_across();
        let col = within % h.tiles_across();
        let x = col * h.tile_width;
        let y = row * h.tile_height;
        Ok(TileRect {
            index,
            plane: index / per_plane,
            row,
            col,
            x,
            y,
            width: h.tile_width.min(h.width() - x),
            height: h.tile_height.min(h.height() - y),
        })
    }

    /// Decode a single tile into its own buffer. The asinh stage is not
    /// applied.
    pub fn decode_tile(&self, index: usize) -> Result<PixelBuffer> {
        let rect = self.rect(index)?;
        let mut pixels = PixelBuffer::zeroed(self.header.depth, &[rect.width, rect.height]);
        let target = Target {
            bytes: &mut pixels.bytes,
            stride: rect.width,
            x: 0,
            y: 0,
        };
        self.decode_into(&rect, target)
            .map_err(|e| e.in_tile(index, rect.row, rect.col))?;
        Ok(pixels)
    }

    /// Decode every tile and assemble the image.
    pub fn decode(&self, options: &DecodeOptions) -> Result<DecodedImage> {
        let h = &self.header;
        let mut pixels = PixelBuffer::zeroed(h.depth, &h.axes);
        let failures = self.decode_bands(&mut pixels.bytes, options)?;
        log::debug!(
            "decoded {} tiles, {} zero-filled",
            h.tile_count(),
            failures.len()
        );

        let (pixels, bitpix) = match &h.lupton {
            Some(lupton) => (lupton.rescale(&pixels), -32),
            None => (pixels, h.depth.bitpix()),
        };
        let header = options
            .header
            .then(|| image_header(self.cards, bitpix, &h.axes, h.lupton.is_some()));
        Ok(DecodedImage {
            pixels,
            header,
            failures,
        })
    }

    fn band_sizes(&self) -> (usize, usize) {
        let h = &self.header;
        let row_bytes = h.width() * h.depth.bytes();
        (row_bytes * h.height(), row_bytes * h.tile_height)
    }

    fn decode_bands(&self, bytes: &mut [u8], options: &DecodeOptions) -> Result<Vec<TileFailure>> {
        let (plane_bytes, band_bytes) = self.band_sizes();
        if plane_bytes == 0 {
            return Ok(Vec::new());
        }
        #[cfg(feature = "rayon")]
        {
            if options.parallel {
                return self.decode_bands_parallel(bytes, options.policy);
            }
        }
        let mut failures = Vec::new();
        for (plane, plane_buf) in bytes.chunks_mut(plane_bytes).enumerate() {
            for (row, band) in plane_buf.chunks_mut(band_bytes).enumerate() {
                failures.extend(self.decode_band(plane, row, band, options.policy)?);
            }
        }
        Ok(failures)
    }

    #[cfg(feature = "rayon")]
    fn decode_bands_parallel(&self, bytes: &mut [u8], policy: TilePolicy) -> Result<Vec<TileFailure>> {
        use rayon::prelude::*;

        let (plane_bytes, band_bytes) = self.band_sizes();
        let results: Vec<Result<Vec<TileFailure>>> = bytes
            .par_chunks_mut(plane_bytes)
            .enumerate()
            .flat_map(|(plane, plane_buf)| {
                plane_buf
                    .par_chunks_mut(band_bytes)
                    .enumerate()
                    .map(move |(row, band)| self.decode_band(plane, row, band, policy))
            })
            .collect();
        let mut failures = Vec::new();
        for result in results {
            failures.extend(result?);
        }
        Ok(failures)
    }

    /// Decode one row of tiles into `band`, which spans `tile_height` image
    /// rows (fewer for the last band of a plane).
    fn decode_band(
        &self,
        plane: usize,
        row: usize,
        band: &mut [u8],
        policy: TilePolicy,
    ) -> Result<Vec<TileFailure>> {
        let h = &self.header;
        let mut failures = Vec::new();
        for col in 0..h.tiles_across() {
            let index = plane * h.tiles_per_plane() + row * h.tiles_across() + col;
            let rect = self.rect(index)?;
            let target = Target {
                bytes: &mut *band,
                stride: h.width(),
                x: rect.x,
                y: 0,
            };
            let Err(error) = self.decode_into(&rect, target) else {
                continue;
            };
            match policy {
                TilePolicy::Abort => return Err(error.in_tile(index, row, col)),
                TilePolicy::ZeroFill => {
                    log::warn!("tile {index} (row {row}, column {col}) left blank: {error}");
                    failures.push(TileFailure {
                        index,
                        row,
                        col,
                        error,
                    });
                }
            }
        }
        Ok(failures)
    }

    /// Read, decode and place one tile. Nothing is written unless the whole
    /// tile decoded.
    fn decode_into(&self, rect: &TileRect, target: Target<'_>) -> Result<()> {
        let tile = self.header.table.tile(self.data, rect.index)?;
        log::debug!(
            "tile {}: {}x{} at ({}, {}), {} payload bytes from {:?}",
            rect.index,
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            tile.payload.len(),
            tile.source
        );
        let data = self.samples(rect, &tile)?;
        self.place(rect, &tile, data, target)
    }

    /// Whether the tile's integers are quantized floats.
    fn quantized(&self, tile: &TileDescriptor<'_>) -> bool {
        self.header.is_quantized()
            && tile.scaled
            && tile.source == PayloadSource::Compressed
            && self.header.algorithm != Algorithm::NoCompress
    }

    fn samples<'t>(&self, rect: &TileRect, tile: &TileDescriptor<'t>) -> Result<TileData<'t>> {
        let h = &self.header;
        let npix = rect.pixels();
        let bpp = h.depth.bytes();
        match tile.source {
            PayloadSource::Uncompressed => return Ok(TileData::Raw(Cow::Borrowed(tile.payload))),
            PayloadSource::Gzip => {
                return Ok(TileData::Raw(Cow::Owned(gzip::inflate(tile.payload)?)));
            }
            PayloadSource::Compressed => {}
        }

        let quantized = self.quantized(tile);
        match h.algorithm {
            Algorithm::NoCompress => Ok(TileData::Raw(Cow::Borrowed(tile.payload))),
            Algorithm::Rice => {
                let params = RiceParams::for_bytepix(h.bytepix)?;
                let values = rice::decompress(tile.payload, npix, h.block_size, &params)?;
                Ok(TileData::Integers(values))
            }
            Algorithm::Gzip1 | Algorithm::Gzip2 => {
                let samples = if h.algorithm == Algorithm::Gzip1 {
                    gzip::decompress_gzip1(tile.payload, npix, bpp)?
                } else {
                    gzip::decompress_gzip2(tile.payload, npix, bpp)?
                };
                if !quantized && samples.width == bpp {
                    Ok(TileData::Raw(Cow::Owned(samples.bytes)))
                } else if h.depth.is_float() && !quantized {
                    Err(Error::TileGeometry("sample width does not match ZBITPIX"))
                } else {
                    let width = samples.width;
                    Ok(TileData::Integers(
                        samples
                            .bytes
                            .chunks_exact(width)
                            .map(|b| read_integer(b, width))
                            .collect(),
                    ))
                }
            }
            Algorithm::HCompress => {
                let decoded = hcompress::decompress(tile.payload, npix)?;
                Ok(TileData::Integers(decoded.values))
            }
        }
    }

    fn place(
        &self,
        rect: &TileRect,
        tile: &TileDescriptor<'_>,
        data: TileData<'_>,
        target: Target<'_>,
    ) -> Result<()> {
        let h = &self.header;
        let depth = h.depth;
        let bpp = depth.bytes();
        let npix = rect.pixels();
        let (bscale, bzero) = if h.lupton.is_some() || tile.source != PayloadSource::Compressed {
            (1.0, 0.0)
        } else {
            (tile.bscale, tile.bzero)
        };
        let identity = bscale == 1.0 && bzero == 0.0;

        match data {
            TileData::Raw(bytes) => {
                if bytes.len() != npix * bpp {
                    return Err(Error::TileGeometry(
                        "tile payload size does not match the tile",
                    ));
                }
                if npix == 0 {
                    return Ok(());
                }
                let row_bytes = rect.width * bpp;
                if identity && rect.width == target.stride {
                    let start = target.offset(0, rect.width, bpp);
                    target.bytes[start..start + bytes.len()].copy_from_slice(&bytes);
                    return Ok(());
                }
                for (r, src) in bytes.chunks_exact(row_bytes).enumerate() {
                    let start = target.offset(r * rect.width, rect.width, bpp);
                    let dst = &mut target.bytes[start..start + row_bytes];
                    if identity {
                        dst.copy_from_slice(src);
                    } else {
                        for (s, d) in src.chunks_exact(bpp).zip(dst.chunks_exact_mut(bpp)) {
                            write_pixel(d, depth, read_pixel(s, depth) * bscale + bzero);
                        }
                    }
                }
            }
            TileData::Integers(values) => {
                if values.len() != npix {
                    return Err(Error::TileGeometry(
                        "decoded sample count does not match the tile",
                    ));
                }
                if self.quantized(tile) {
                    let dequantize = Dequantize {
                        method: h.quantization,
                        scale: tile.bscale,
                        zero: tile.bzero,
                        blank: tile.blank.or(h.blank),
                        tile_index: rect.index,
                        dither_seed: h.dither_seed,
                        random: &self.random,
                    };
                    dequantize.apply(&values, |i, v| {
                        let at = target.offset(i, rect.width, bpp);
                        write_pixel(&mut target.bytes[at..at + bpp], depth, v);
                    });
                } else {
                    for (i, &v) in values.iter().enumerate() {
                        let at = target.offset(i, rect.width, bpp);
                        let dst = &mut target.bytes[at..at + bpp];
                        if identity {
                            write_integer(dst, depth, v);
                        } else {
                            write_pixel(dst, depth, v as f64 * bscale + bzero);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Decompress a tiled image given its header cards and the binary table's
/// data segment.
pub fn decompress(cards: &[Card], data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
    TileDecoder::new(cards, data)?.decode(options)
}
