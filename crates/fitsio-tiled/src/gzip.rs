//! `GZIP_1` and `GZIP_2` tile decompression.
//!
//! Both algorithms deflate the tile's big-endian samples. `GZIP_2` first
//! shuffles the bytes so that byte `k` of every sample forms one contiguous
//! plane, which must be undone after inflating.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Inflated samples of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    /// Stored bytes per sample.
    pub width: usize,
    /// Big-endian sample bytes, `width * npix` long.
    pub bytes: Vec<u8>,
}

/// Strip the gzip header and trailer, returning the raw deflate payload.
fn strip_gzip_header(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 18 || data[0] != 0x1f || data[1] != 0x8b || data[2] != 0x08 {
        return Err(Error::Inflate);
    }
    let flg = data[3];
    let mut pos = 10usize;
    if flg & 0x04 != 0 {
        // FEXTRA
        if pos + 2 > data.len() {
            return Err(Error::Inflate);
        }
        let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2 + xlen;
    }
    if flg & 0x08 != 0 {
        // FNAME
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & 0x10 != 0 {
        // FCOMMENT
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & 0x02 != 0 {
        // FHCRC
        pos += 2;
    }
    if data.len() < pos + 8 {
        return Err(Error::Inflate);
    }
    Ok(&data[pos..data.len() - 8])
}

/// Inflate a tile payload.
///
/// cfitsio writes a gzip member; zlib-wrapped and bare deflate streams are
/// accepted as well.
pub fn inflate(compressed: &[u8]) -> Result<Vec<u8>> {
    if compressed.len() >= 2 && compressed[0] == 0x1f && compressed[1] == 0x8b {
        let deflate_payload = strip_gzip_header(compressed)?;
        return miniz_oxide::inflate::decompress_to_vec(deflate_payload)
            .map_err(|_| Error::Inflate);
    }
    miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
        .or_else(|_| miniz_oxide::inflate::decompress_to_vec(compressed))
        .map_err(|_| Error::Inflate)
}

/// Infer the stored sample width from the inflated length.
fn sample_width(len: usize, npix: usize, fallback: usize) -> Result<usize> {
    if npix == 0 {
        return if len == 0 {
            Ok(fallback)
        } else {
            Err(Error::TileGeometry("inflated data for an empty tile"))
        };
    }
    match len / npix {
        w @ (1 | 2 | 4 | 8) if w * npix == len => Ok(w),
        _ => Err(Error::TileGeometry(
            "inflated length is not a whole number of samples",
        )),
    }
}

/// Undo the `GZIP_2` byte-plane shuffle: byte `k` of sample `j` was stored
/// at `k * n + j`.
pub fn unshuffle_bytes(shuffled: &[u8], width: usize) -> Vec<u8> {
    if width <= 1 {
        return shuffled.to_vec();
    }
    let n = shuffled.len() / width;
    let mut out = vec![0u8; n * width];
    for (k, plane) in shuffled.chunks_exact(n.max(1)).take(width).enumerate() {
        for (j, &b) in plane.iter().enumerate() {
            out[j * width + k] = b;
        }
    }
    out
}

/// Decode a `GZIP_1` tile of `npix` samples. `fallback_width` is reported
/// for empty tiles.
pub fn decompress_gzip1(payload: &[u8], npix: usize, fallback_width: usize) -> Result<Samples> {
    let bytes = inflate(payload)?;
    let width = sample_width(bytes.len(), npix, fallback_width)?;
    Ok(Samples { width, bytes })
}

/// Decode a `GZIP_2` tile of `npix` samples.
pub fn decompress_gzip2(payload: &[u8], npix: usize, fallback_width: usize) -> Result<Samples> {
    let shuffled = inflate(payload)?;
    let width = sample_width(shuffled.len(), npix, fallback_width)?;
    Ok(Samples {
        width,
        bytes: unshuffle_bytes(&shuffled, width),
    })
}
