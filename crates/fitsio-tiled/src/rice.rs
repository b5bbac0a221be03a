//! Rice (`RICE_1` / `RICE_ONE`) tile decompression.
//!
//! Each tile starts with one uncompressed sample that seeds the predictor.
//! The remaining samples come in blocks of `block_size` differences, each
//! block led by an `fsbits`-wide split level: zero means every difference in
//! the block is zero, `fsmax + 1` means raw `bbits`-wide differences follow,
//! anything else selects a Rice code with `fs` low bits.

use alloc::vec::Vec;

use crate::bits::BitReader;
use crate::error::{Error, Result};

/// Bit widths used by the coder for a given sample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiceParams {
    pub fsbits: u32,
    pub fsmax: i32,
    pub bbits: u32,
    pub bytepix: usize,
}

impl RiceParams {
    pub fn for_bytepix(bytepix: usize) -> Result<Self> {
        match bytepix {
            1 => Ok(RiceParams {
                fsbits: 3,
                fsmax: 6,
                bbits: 8,
                bytepix: 1,
            }),
            2 => Ok(RiceParams {
                fsbits: 4,
                fsmax: 14,
                bbits: 16,
                bytepix: 2,
            }),
            4 => Ok(RiceParams {
                fsbits: 5,
                fsmax: 25,
                bbits: 32,
                bytepix: 4,
            }),
            _ => Err(Error::MalformedHeader("Rice BYTEPIX must be 1, 2 or 4")),
        }
    }

    /// Sign-extend (or zero-extend for bytes) a predictor value to `i64`.
    fn widen(&self, value: u32) -> i64 {
        match self.bytepix {
            1 => (value as u8) as i64,
            2 => (value as u16 as i16) as i64,
            _ => value as i32 as i64,
        }
    }
}

#[inline]
fn unzigzag(diff: u32) -> u32 {
    if diff & 1 == 0 {
        diff >> 1
    } else {
        !(diff >> 1)
    }
}

/// Decode `npix` samples from a Rice-compressed tile.
///
/// Samples are returned already wrapped to the coded width: unsigned for one
/// byte, two's complement for two and four bytes. A stream that ends before
/// `npix` samples are produced fails with [`Error::TruncatedStream`].
pub fn decompress(
    input: &[u8],
    npix: usize,
    block_size: usize,
    params: &RiceParams,
) -> Result<Vec<i64>> {
    if npix == 0 {
        return Ok(Vec::new());
    }
    if block_size == 0 {
        return Err(Error::MalformedHeader("Rice BLOCKSIZE must be positive"));
    }
    if input.len() < params.bytepix {
        return Err(Error::TruncatedStream);
    }

    // Arithmetic runs modulo 2^32; the low bytes are what the coder wrapped.
    let mut last = input[..params.bytepix]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
    let mut reader = BitReader::new(&input[params.bytepix..]);
    let mut output = Vec::with_capacity(npix);

    while output.len() < npix {
        let block = block_size.min(npix - output.len());
        let fs = reader.read_bits(params.fsbits)? as i32 - 1;

        if fs < 0 {
            let value = params.widen(last);
            output.extend(core::iter::repeat(value).take(block));
        } else if fs == params.fsmax {
            for _ in 0..block {
                let diff = reader.read_bits(params.bbits)?;
                last = last.wrapping_add(unzigzag(diff));
                output.push(params.widen(last));
            }
        } else {
            let fs = fs as u32;
            for _ in 0..block {
                let nzero = reader.read_unary()?;
                let low = if fs > 0 { reader.read_bits(fs)? } else { 0 };
                let diff = nzero.wrapping_shl(fs) | low;
                last = last.wrapping_add(unzigzag(diff));
                output.push(params.widen(last));
            }
        }
    }

    Ok(output)
}
