//! Builders for in-memory compressed-image tables.

#![allow(dead_code)]

use fitsio_tiled::header::Card;
use fitsio_tiled::value::Value;

/// Header keywords of a compressed image, excluding the table structure.
pub struct CompressedHdu {
    pub algorithm: &'static str,
    pub bitpix: i64,
    pub axes: Vec<usize>,
    /// `ZTILEn` values; empty keeps the defaults.
    pub tile: Vec<usize>,
    pub extra: Vec<Card>,
}

impl CompressedHdu {
    pub fn new(algorithm: &'static str, bitpix: i64, axes: &[usize], tile: &[usize]) -> Self {
        CompressedHdu {
            algorithm,
            bitpix,
            axes: axes.to_vec(),
            tile: tile.to_vec(),
            extra: Vec::new(),
        }
    }

    pub fn with(mut self, keyword: &str, value: Value) -> Self {
        self.extra.push(Card::new(keyword, value));
        self
    }
}

/// One table row: the tile payload plus optional per-tile columns.
#[derive(Default, Clone)]
pub struct Row {
    pub compressed: Vec<u8>,
    pub uncompressed: Option<Vec<u8>>,
    pub gzip: Option<Vec<u8>>,
    /// `(ZSCALE, ZZERO)`.
    pub scale: Option<(f64, f64)>,
    pub blank: Option<i32>,
}

impl Row {
    pub fn new(compressed: Vec<u8>) -> Self {
        Row {
            compressed,
            ..Row::default()
        }
    }

    pub fn scaled(mut self, zscale: f64, zzero: f64) -> Self {
        self.scale = Some((zscale, zzero));
        self
    }
}

fn string(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Serialize rows into header cards and a data segment (rows, then heap).
pub fn build_table(hdu: &CompressedHdu, rows: &[Row]) -> (Vec<Card>, Vec<u8>) {
    let has_uncompressed = rows.iter().any(|r| r.uncompressed.is_some());
    let has_gzip = rows.iter().any(|r| r.gzip.is_some());
    let has_scale = rows.iter().any(|r| r.scale.is_some());
    let has_blank = rows.iter().any(|r| r.blank.is_some());

    let mut columns: Vec<(&str, &str)> = vec![("COMPRESSED_DATA", "1PB")];
    if has_gzip {
        columns.push(("GZIP_COMPRESSED_DATA", "1PB"));
    }
    if has_uncompressed {
        columns.push(("UNCOMPRESSED_DATA", "1PB"));
    }
    if has_scale {
        columns.push(("ZSCALE", "1D"));
        columns.push(("ZZERO", "1D"));
    }
    if has_blank {
        columns.push(("ZBLANK", "1J"));
    }
    let row_len: usize = columns
        .iter()
        .map(|(_, form)| match *form {
            "1PB" | "1D" => 8,
            _ => 4,
        })
        .sum();

    let mut table = Vec::with_capacity(row_len * rows.len());
    let mut heap = Vec::new();
    let mut descriptor = |table: &mut Vec<u8>, bytes: &[u8]| {
        table.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        table.extend_from_slice(&(heap.len() as u32).to_be_bytes());
        heap.extend_from_slice(bytes);
    };
    for row in rows {
        descriptor(&mut table, &row.compressed);
        if has_gzip {
            descriptor(&mut table, row.gzip.as_deref().unwrap_or(&[]));
        }
        if has_uncompressed {
            descriptor(&mut table, row.uncompressed.as_deref().unwrap_or(&[]));
        }
        if has_scale {
            let (zscale, zzero) = row.scale.unwrap_or((1.0, 0.0));
            table.extend_from_slice(&zscale.to_be_bytes());
            table.extend_from_slice(&zzero.to_be_bytes());
        }
        if has_blank {
            table.extend_from_slice(&row.blank.unwrap_or(0).to_be_bytes());
        }
    }

    let mut cards = vec![
        Card::new("XTENSION", string("BINTABLE")),
        Card::new("BITPIX", Value::Integer(8)),
        Card::new("NAXIS", Value::Integer(2)),
        Card::new("NAXIS1", Value::Integer(row_len as i64)),
        Card::new("NAXIS2", Value::Integer(rows.len() as i64)),
        Card::new("PCOUNT", Value::Integer(heap.len() as i64)),
        Card::new("GCOUNT", Value::Integer(1)),
        Card::new("TFIELDS", Value::Integer(columns.len() as i64)),
    ];
    for (i, (name, form)) in columns.iter().enumerate() {
        cards.push(Card::new(&format!("TTYPE{}", i + 1), string(name)));
        cards.push(Card::new(&format!("TFORM{}", i + 1), string(form)));
    }
    cards.push(Card::new("ZIMAGE", Value::Logical(true)));
    cards.push(Card::new("ZCMPTYPE", string(hdu.algorithm)));
    cards.push(Card::new("ZBITPIX", Value::Integer(hdu.bitpix)));
    cards.push(Card::new("ZNAXIS", Value::Integer(hdu.axes.len() as i64)));
    for (i, &len) in hdu.axes.iter().enumerate() {
        cards.push(Card::new(&format!("ZNAXIS{}", i + 1), Value::Integer(len as i64)));
    }
    for (i, &len) in hdu.tile.iter().enumerate() {
        cards.push(Card::new(&format!("ZTILE{}", i + 1), Value::Integer(len as i64)));
    }
    cards.extend(hdu.extra.iter().cloned());

    table.extend_from_slice(&heap);
    (cards, table)
}

/// Cut the big-endian bytes of every tile out of a single-plane image, in
/// tile order.
pub fn split_tiles(
    image: &[u8],
    bpp: usize,
    width: usize,
    height: usize,
    tile_w: usize,
    tile_h: usize,
) -> Vec<Vec<u8>> {
    let mut tiles = Vec::new();
    for ty in (0..height).step_by(tile_h) {
        for tx in (0..width).step_by(tile_w) {
            let w = tile_w.min(width - tx);
            let h = tile_h.min(height - ty);
            let mut tile = Vec::with_capacity(w * h * bpp);
            for y in ty..ty + h {
                let start = (y * width + tx) * bpp;
                tile.extend_from_slice(&image[start..start + w * bpp]);
            }
            tiles.push(tile);
        }
    }
    tiles
}

pub fn be_i16(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn be_i32(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

pub fn be_f32(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Read back big-endian integers of `width` bytes.
pub fn samples(bytes: &[u8], width: usize) -> Vec<i64> {
    bytes
        .chunks_exact(width)
        .map(|b| match width {
            1 => b[0] as i64,
            2 => i16::from_be_bytes([b[0], b[1]]) as i64,
            _ => i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64,
        })
        .collect()
}

pub fn zlib(raw: &[u8]) -> Vec<u8> {
    miniz_oxide::deflate::compress_to_vec_zlib(raw, 6)
}

/// A gzip member as cfitsio writes it. The trailer is left zeroed.
pub fn gzip(raw: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];
    out.extend(miniz_oxide::deflate::compress_to_vec(raw, 6));
    out.extend_from_slice(&[0u8; 8]);
    out
}

/// Interleave byte planes the way `GZIP_2` stores samples.
pub fn shuffle(bytes: &[u8], width: usize) -> Vec<u8> {
    let n = bytes.len() / width;
    let mut out = vec![0u8; bytes.len()];
    for j in 0..n {
        for k in 0..width {
            out[k * n + j] = bytes[j * width + k];
        }
    }
    out
}

/// MSB-first bit writer.
struct BitWriter {
    bytes: Vec<u8>,
    acc: u64,
    n: u32,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            bytes: Vec::new(),
            acc: 0,
            n: 0,
        }
    }

    fn output_nbits(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.acc = (self.acc << 1) | ((value >> i) & 1) as u64;
            self.n += 1;
            if self.n == 8 {
                self.bytes.push(self.acc as u8);
                self.acc = 0;
                self.n = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.n > 0 {
            self.bytes.push((self.acc << (8 - self.n)) as u8);
        }
        self.bytes
    }
}

/// Rice-compress samples of `bytepix` bytes (1 unsigned, 2 or 4 signed).
pub fn rice_compress(values: &[i64], block_size: usize, bytepix: usize) -> Vec<u8> {
    let (fsbits, fsmax, bbits) = match bytepix {
        1 => (3u32, 6u32, 8u32),
        2 => (4, 14, 16),
        _ => (5, 25, 32),
    };
    let wrap = |d: i64| -> i64 {
        match bytepix {
            1 => d as i8 as i64,
            2 => d as i16 as i64,
            _ => d as i32 as i64,
        }
    };

    let mut writer = BitWriter::new();
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    writer.output_nbits(first as u32, bbits);

    let mut last = first;
    for block in values.chunks(block_size) {
        let diffs: Vec<u32> = block
            .iter()
            .map(|&v| {
                let d = wrap(v - last);
                last = v;
                if d < 0 {
                    !((d as i32) << 1) as u32
                } else {
                    ((d as i32) << 1) as u32
                }
            })
            .collect();
        let sum: f64 = diffs.iter().map(|&d| d as f64).sum();
        let dpsum = ((sum - block.len() as f64 / 2.0 - 1.0) / block.len() as f64).max(0.0);
        let mut psum = (dpsum as u32) >> 1;
        let mut fs = 0u32;
        while psum > 0 {
            fs += 1;
            psum >>= 1;
        }

        if fs >= fsmax {
            writer.output_nbits(fsmax + 1, fsbits);
            for &d in &diffs {
                writer.output_nbits(d, bbits);
            }
        } else if fs == 0 && sum == 0.0 {
            writer.output_nbits(0, fsbits);
        } else {
            writer.output_nbits(fs + 1, fsbits);
            for &d in &diffs {
                let top = d >> fs;
                for _ in 0..top {
                    writer.output_nbits(0, 1);
                }
                writer.output_nbits(1, 1);
                if fs > 0 {
                    writer.output_nbits(d & ((1 << fs) - 1), fs);
                }
            }
        }
    }
    writer.finish()
}

/// A 4x4 HCompress stream decoding to [`HCOMPRESS_4X4_PIXELS`].
pub const HCOMPRESS_4X4: [u8; 48] = [
    221, 153, 0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 32, 5, 5, 5, 245, 231, 227,
    199, 253, 227, 199, 253, 247, 255, 120, 249, 245, 239, 254, 241, 255, 124, 120, 251, 0, 68,
    200,
];

pub const HCOMPRESS_4X4_PIXELS: [i64; 16] = [2, 2, 1, 2, 3, 2, 7, 7, 4, 2, 2, 1, 2, 4, 25, 2];
