//! Compression metadata of a tiled image: algorithm, image and tile
//! geometry, codec parameters and quantization settings.

use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::header::{card_integer_value, card_logical_value, card_string_value, find_value, Card};
use crate::lupton::LuptonParameters;
use crate::pixel::BitDepth;
use crate::quantize::Quantization;
use crate::rice::RiceParams;
use crate::table::TableLayout;
use crate::value::Value;

/// Tile compression algorithm named by `ZCMPTYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    NoCompress,
    Rice,
    Gzip1,
    Gzip2,
    HCompress,
}

impl Algorithm {
    /// Parse a `ZCMPTYPE` token. `PLIO_1` and unknown names are rejected.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim() {
            "NOCOMPRESS" => Ok(Algorithm::NoCompress),
            "RICE_1" | "RICE_ONE" => Ok(Algorithm::Rice),
            "GZIP_1" => Ok(Algorithm::Gzip1),
            "GZIP_2" => Ok(Algorithm::Gzip2),
            "HCOMPRESS_1" => Ok(Algorithm::HCompress),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::NoCompress => "NOCOMPRESS",
            Algorithm::Rice => "RICE_1",
            Algorithm::Gzip1 => "GZIP_1",
            Algorithm::Gzip2 => "GZIP_2",
            Algorithm::HCompress => "HCOMPRESS_1",
        }
    }
}

/// Everything parsed from the header of a compressed image.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionHeader {
    pub algorithm: Algorithm,
    /// Output pixel type (`ZBITPIX`).
    pub depth: BitDepth,
    /// Image axes (`ZNAXISn`), fastest first.
    pub axes: Vec<usize>,
    pub tile_width: usize,
    pub tile_height: usize,
    /// Rice block length in pixels.
    pub block_size: usize,
    /// Rice bytes per coded value.
    pub bytepix: usize,
    /// HCompress `SCALE` option, informational (the stream carries its own).
    pub hcompress_scale: f64,
    /// HCompress `SMOOTH` option. Smoothing is not applied.
    pub hcompress_smooth: bool,
    pub quantization: Quantization,
    /// `ZDITHER0`.
    pub dither_seed: i64,
    /// `ZBLANK` keyword, used when the table has no `ZBLANK` column.
    pub blank: Option<i64>,
    pub lupton: Option<LuptonParameters>,
    pub table: TableLayout,
}

/// `ZNAMEn`/`ZVALn` pairs.
fn options(cards: &[Card]) -> Vec<(&str, &Value)> {
    let mut out = Vec::new();
    for i in 1.. {
        let Some(name) = card_string_value(cards, &format!("ZNAME{i}")) else {
            break;
        };
        if let Some(value) = find_value(cards, &format!("ZVAL{i}")) {
            out.push((name, value));
        }
    }
    out
}

fn option<'a>(options: &[(&str, &'a Value)], name: &str) -> Option<&'a Value> {
    options
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| *v)
}

fn positive(value: i64, what: &'static str) -> Result<usize> {
    if value > 0 {
        Ok(value as usize)
    } else {
        Err(Error::TileGeometry(what))
    }
}

impl CompressionHeader {
    /// Parse and validate the compression keywords and table layout.
    pub fn from_cards(cards: &[Card]) -> Result<Self> {
        if card_logical_value(cards, "ZIMAGE") != Some(true) {
            return Err(Error::MalformedHeader("ZIMAGE is not set"));
        }
        let name = card_string_value(cards, "ZCMPTYPE").ok_or(Error::MissingKeyword("ZCMPTYPE"))?;
        let algorithm = Algorithm::from_name(name)?;
        let zbitpix =
            card_integer_value(cards, "ZBITPIX").ok_or(Error::MissingKeyword("ZBITPIX"))?;
        let depth = BitDepth::from_bitpix(zbitpix)?;

        let znaxis = card_integer_value(cards, "ZNAXIS").ok_or(Error::MissingKeyword("ZNAXIS"))?;
        if !(0..=999).contains(&znaxis) {
            return Err(Error::MalformedHeader("ZNAXIS out of range"));
        }
        let mut axes = Vec::with_capacity(znaxis as usize);
        for i in 1..=znaxis as usize {
            let len = card_integer_value(cards, &format!("ZNAXIS{i}"))
                .ok_or(Error::MissingKeyword("ZNAXISn"))?;
            if len < 0 {
                return Err(Error::MalformedHeader("negative ZNAXISn"));
            }
            axes.push(len as usize);
        }
        // Zero-length axes count as one so every partial product is bounded too.
        axes.iter()
            .try_fold(depth.bytes(), |acc, &len| acc.checked_mul(len.max(1)))
            .ok_or(Error::MalformedHeader("image size overflows"))?;

        let mut tiles = Vec::with_capacity(axes.len());
        for (i, &len) in axes.iter().enumerate() {
            let default = if i == 0 { len.max(1) as i64 } else { 1 };
            let value = card_integer_value(cards, &format!("ZTILE{}", i + 1)).unwrap_or(default);
            tiles.push(positive(value, "tile dimensions must be positive")?);
        }
        if tiles.iter().skip(2).any(|&t| t != 1) {
            return Err(Error::TileGeometry("tiles must span at most two axes"));
        }
        let tile_width = tiles.first().copied().unwrap_or(1);
        let tile_height = tiles.get(1).copied().unwrap_or(1);

        let opts = options(cards);
        // Without ZNAMEn the Rice values are positional.
        let positional = |keyword: &str| {
            if opts.is_empty() {
                card_integer_value(cards, keyword)
            } else {
                None
            }
        };
        let mut block_size = option(&opts, "BLOCKSIZE")
            .and_then(Value::as_integer)
            .or_else(|| positional("ZVAL1"))
            .unwrap_or(32);
        let default_bytepix = match depth {
            BitDepth::U8 => 1,
            BitDepth::I16 => 2,
            _ => 4,
        };
        let mut bytepix = option(&opts, "BYTEPIX")
            .and_then(Value::as_integer)
            .or_else(|| positional("ZVAL2"))
            .unwrap_or(default_bytepix);
        // Some writers store the two Rice values in the opposite order.
        if block_size < 16 && bytepix > 8 {
            core::mem::swap(&mut block_size, &mut bytepix);
        }
        let hcompress_scale = option(&opts, "SCALE")
            .and_then(Value::as_float)
            .unwrap_or(0.0);
        let hcompress_smooth = option(&opts, "SMOOTH")
            .and_then(Value::as_integer)
            .is_some_and(|v| v != 0);

        if algorithm == Algorithm::Rice {
            if block_size <= 0 {
                return Err(Error::MalformedHeader("Rice BLOCKSIZE must be positive"));
            }
            RiceParams::for_bytepix(bytepix.max(0) as usize)?;
        }

        let quantization = match card_string_value(cards, "ZQUANTIZ") {
            Some(name) => Quantization::from_name(name)
                .ok_or(Error::MalformedHeader("unknown ZQUANTIZ method"))?,
            None => Quantization::NoDither,
        };
        let dither_seed = card_integer_value(cards, "ZDITHER0").unwrap_or(1);
        let blank = card_integer_value(cards, "ZBLANK");
        let lupton = LuptonParameters::from_cards(cards);

        let header = CompressionHeader {
            algorithm,
            depth,
            axes,
            tile_width,
            tile_height,
            block_size: block_size.max(0) as usize,
            bytepix: bytepix.max(0) as usize,
            hcompress_scale,
            hcompress_smooth,
            quantization,
            dither_seed,
            blank,
            lupton,
            table: TableLayout::from_cards(cards)?,
        };
        if header.table.rows < header.tile_count() {
            return Err(Error::MalformedHeader("fewer table rows than tiles"));
        }
        Ok(header)
    }

    /// Row length of the image.
    pub fn width(&self) -> usize {
        self.axes.first().copied().unwrap_or(0)
    }

    /// Number of rows per plane.
    pub fn height(&self) -> usize {
        match self.axes.len() {
            0 => 0,
            1 => 1,
            _ => self.axes[1],
        }
    }

    /// Number of planes stacked along the third and higher axes.
    pub fn planes(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().skip(2).product()
        }
    }

    pub fn tiles_across(&self) -> usize {
        self.width().div_ceil(self.tile_width)
    }

    pub fn tiles_down(&self) -> usize {
        self.height().div_ceil(self.tile_height)
    }

    pub fn tiles_per_plane(&self) -> usize {
        self.tiles_across() * self.tiles_down()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_per_plane() * self.planes()
    }

    /// Total number of image pixels.
    pub fn pixel_count(&self) -> usize {
        self.width() * self.height() * self.planes()
    }

    /// Whether tile samples are quantized floats restored via `ZSCALE`.
    pub fn is_quantized(&self) -> bool {
        self.depth.is_float() && self.lupton.is_none()
    }
}
