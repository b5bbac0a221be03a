//! `HCOMPRESS_1` tile decompression.
//!
//! A stream carries the H-transform coefficients of one tile as bit planes
//! coded per quadrant, followed by sign bits. Decoding rebuilds the
//! coefficient magnitudes, restores signs, multiplies by the digitizing scale
//! and runs the inverse H-transform. Coefficients are held as `i64`; a
//! corrupt stream can still push them past that range, so the transform
//! wraps instead of overflowing.
//!
//! Within this module `nx` counts rows (the slow axis) and `ny` is the row
//! length, matching the order the stream stores them in.

use alloc::vec;
use alloc::vec::Vec;

use crate::bits::BitReader;
use crate::error::{Error, Result};

/// Two-byte marker written ahead of the stream header.
pub const MAGIC: [u8; 2] = [0xDD, 0x99];

const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 3;

/// Values of the four-bit Huffman codes `0b1000..=0b1100`.
const HUFFMAN_4: [u8; 5] = [3, 5, 10, 12, 15];
/// Values of the five-bit Huffman codes `0b11010..=0b11110`.
const HUFFMAN_5: [u8; 5] = [6, 7, 9, 11, 13];

/// A decoded HCompress tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Number of rows.
    pub nx: usize,
    /// Row length.
    pub ny: usize,
    /// Digitizing scale stored in the stream.
    pub scale: i32,
    /// Reconstructed pixels, row-major.
    pub values: Vec<i64>,
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Decode one HCompress stream holding a tile of `npix` pixels.
///
/// The leading [`MAGIC`] marker is optional. The stream dimensions must
/// multiply to `npix`; this is checked before anything is allocated.
pub fn decompress(input: &[u8], npix: usize) -> Result<Decoded> {
    let body = input.strip_prefix(&MAGIC[..]).unwrap_or(input);
    if body.len() < HEADER_LEN {
        return Err(Error::TruncatedStream);
    }
    let nx = read_i32(&body[0..]);
    let ny = read_i32(&body[4..]);
    let scale = read_i32(&body[8..]);
    let sumall = i64::from_be_bytes([
        body[12], body[13], body[14], body[15], body[16], body[17], body[18], body[19],
    ]);
    let nbitplanes = [body[20], body[21], body[22]];
    if nx < 0 || ny < 0 {
        return Err(Error::TileGeometry("negative HCompress dimensions"));
    }
    let (nx, ny) = (nx as usize, ny as usize);
    if nx.checked_mul(ny) != Some(npix) {
        return Err(Error::TileGeometry(
            "HCompress stream size does not match the tile",
        ));
    }

    let mut values = vec![0i64; npix];
    let mut reader = BitReader::new(&body[HEADER_LEN..]);
    decode_coefficients(&mut reader, &mut values, nx, ny, nbitplanes)?;
    if let Some(first) = values.first_mut() {
        *first = sumall;
    }

    undigitize(&mut values, scale);
    hinv(&mut values, nx, ny);

    Ok(Decoded {
        nx,
        ny,
        scale,
        values,
    })
}

/// Rebuild coefficient magnitudes from the four quadrants, then apply the
/// sign bits.
fn decode_coefficients(
    reader: &mut BitReader<'_>,
    a: &mut [i64],
    nx: usize,
    ny: usize,
    nbitplanes: [u8; 3],
) -> Result<()> {
    let nx2 = (nx + 1) / 2;
    let ny2 = (ny + 1) / 2;

    decode_quadrant(reader, a, ny, 0, nx2, ny2, nbitplanes[0])?;
    decode_quadrant(reader, a, ny, ny2, nx2, ny / 2, nbitplanes[1])?;
    decode_quadrant(reader, a, ny, ny * nx2, nx / 2, ny2, nbitplanes[1])?;
    decode_quadrant(reader, a, ny, ny * nx2 + ny2, nx / 2, ny / 2, nbitplanes[2])?;

    if reader.read_bits(4)? != 0 {
        return Err(Error::CorruptBitplane);
    }

    // Sign bits start on a fresh byte.
    reader.restart();
    for v in a.iter_mut() {
        if *v > 0 && reader.read_bit()? {
            *v = -*v;
        }
    }
    Ok(())
}

/// Decode the bit planes of one `nqx` x `nqy` quadrant whose top-left
/// element sits at `origin` in an array with row stride `stride`.
fn decode_quadrant(
    reader: &mut BitReader<'_>,
    a: &mut [i64],
    stride: usize,
    origin: usize,
    nqx: usize,
    nqy: usize,
    nbitplanes: u8,
) -> Result<()> {
    if nbitplanes > 63 {
        return Err(Error::CorruptBitplane);
    }
    let log2n = ceil_log2(nqx.max(nqy));
    let cells = ((nqx + 1) / 2) * ((nqy + 1) / 2);

    for bit in (0..nbitplanes as u32).rev() {
        let codes = match reader.read_bits(4)? {
            // Plane stored directly, one nybble per 2x2 block.
            0x0 => {
                let mut codes = vec![0u8; cells];
                for c in codes.iter_mut() {
                    *c = reader.read_bits(4)? as u8;
                }
                codes
            }
            0xF => quadtree(reader, nqx, nqy, log2n)?,
            _ => return Err(Error::CorruptBitplane),
        };
        insert_bitplane(&codes, nqx, nqy, a, stride, origin, bit);
    }
    Ok(())
}

/// Expand a quadtree-coded bit plane down to one four-bit code per 2x2 block
/// of the quadrant.
fn quadtree(reader: &mut BitReader<'_>, nqx: usize, nqy: usize, log2n: u32) -> Result<Vec<u8>> {
    let mut level = vec![read_huffman(reader)?];
    let (mut nx, mut ny) = (1usize, 1usize);
    let (mut nfx, mut nfy) = (nqx, nqy);
    let mut c = 1usize << log2n;

    // Level sizes follow n[k-1] = (n[k] + 1) / 2 up from the full quadrant.
    for _ in 1..log2n {
        c >>= 1;
        nx <<= 1;
        ny <<= 1;
        if nfx <= c {
            nx -= 1;
        } else {
            nfx -= c;
        }
        if nfy <= c {
            ny -= 1;
        } else {
            nfy -= c;
        }
        level = expand(reader, &level, nx, ny)?;
    }
    Ok(level)
}

#[inline]
fn quadrant_bit(code: u8, i: usize, j: usize) -> u8 {
    (code >> (3 - 2 * (i & 1) - (j & 1))) & 1
}

/// Spread each coarse code over a 2x2 block of the `nx` x `ny` fine level,
/// then replace every non-zero fine cell (last to first) with the next
/// Huffman code.
fn expand(reader: &mut BitReader<'_>, coarse: &[u8], nx: usize, ny: usize) -> Result<Vec<u8>> {
    let cy = (ny + 1) / 2;
    let mut fine = vec![0u8; nx * ny];
    for i in 0..nx {
        for j in 0..ny {
            fine[i * ny + j] = quadrant_bit(coarse[(i / 2) * cy + j / 2], i, j);
        }
    }
    for cell in fine.iter_mut().rev() {
        if *cell != 0 {
            *cell = read_huffman(reader)?;
        }
    }
    Ok(fine)
}

/// Set bit `bit` of every quadrant element whose 2x2 block code marks it.
fn insert_bitplane(
    codes: &[u8],
    nqx: usize,
    nqy: usize,
    a: &mut [i64],
    stride: usize,
    origin: usize,
    bit: u32,
) {
    let cy = (nqy + 1) / 2;
    let plane = 1i64 << bit;
    for i in 0..nqx {
        let row = origin + i * stride;
        for j in 0..nqy {
            if quadrant_bit(codes[(i / 2) * cy + j / 2], i, j) != 0 {
                a[row + j] |= plane;
            }
        }
    }
}

/// Read one fixed-Huffman coded four-bit quadrant value.
fn read_huffman(reader: &mut BitReader<'_>) -> Result<u8> {
    let mut c = reader.read_bits(3)?;
    if c < 4 {
        return Ok(1 << c);
    }
    c = (c << 1) | reader.read_bits(1)?;
    if (8..=12).contains(&c) {
        return Ok(HUFFMAN_4[(c - 8) as usize]);
    }
    c = (c << 1) | reader.read_bits(1)?;
    if (26..=30).contains(&c) {
        return Ok(HUFFMAN_5[(c - 26) as usize]);
    }
    c = (c << 1) | reader.read_bits(1)?;
    Ok(if c == 62 { 0 } else { 14 })
}

fn undigitize(a: &mut [i64], scale: i32) {
    if scale <= 1 {
        return;
    }
    let scale = scale as i64;
    for v in a.iter_mut() {
        *v = v.wrapping_mul(scale);
    }
}

/// Interleave the first and second halves of the `n` elements found at
/// `start`, `start + stride`, ... so the first half lands on even positions.
fn unshuffle(a: &mut [i64], start: usize, n: usize, stride: usize, tmp: &mut Vec<i64>) {
    let half = (n + 1) / 2;
    tmp.clear();
    tmp.extend((half..n).map(|k| a[start + k * stride]));
    for k in (0..half).rev() {
        a[start + 2 * k * stride] = a[start + k * stride];
    }
    for (k, &v) in tmp.iter().enumerate() {
        a[start + (2 * k + 1) * stride] = v;
    }
}

/// Round `v` to the multiple `mask` keeps, away from zero for positive
/// values.
#[inline]
fn round_to(v: i64, prnd: i64, nrnd: i64, mask: i64) -> i64 {
    v.wrapping_add(if v >= 0 { prnd } else { nrnd }) & mask
}

/// Move `v` toward zero by `bits`.
#[inline]
fn toward_zero(v: i64, bits: i64) -> i64 {
    if v >= 0 {
        v.wrapping_sub(bits)
    } else {
        v.wrapping_add(bits)
    }
}

/// Inverse H-transform of an `nx` x `ny` coefficient array, in place.
pub fn hinv(a: &mut [i64], nx: usize, ny: usize) {
    let nmax = nx.max(ny);
    let log2n = ceil_log2(nmax);
    if log2n == 0 || a.is_empty() {
        return;
    }

    let mut tmp = Vec::with_capacity((nmax + 1) / 2);

    let mut shift = 1;
    let mut bit0: i64 = 1 << (log2n - 1);
    let mut bit1 = bit0 << 1;
    let bit2 = bit0 << 2;
    let mut mask0 = -bit0;
    let mut mask1 = mask0 << 1;
    let mask2 = mask0 << 2;
    let mut prnd0 = bit0 >> 1;
    let mut prnd1 = bit1 >> 1;
    let prnd2 = bit2 >> 1;
    let mut nrnd0 = prnd0 - 1;
    let mut nrnd1 = prnd1 - 1;
    let nrnd2 = prnd2 - 1;

    // h0 becomes a multiple of bit2.
    a[0] = a[0].wrapping_add(if a[0] >= 0 { prnd2 } else { nrnd2 }) & mask2;

    let (mut nxtop, mut nytop) = (1usize, 1usize);
    let (mut nxf, mut nyf) = (nx, ny);
    let mut c = 1usize << log2n;

    for k in (0..log2n).rev() {
        c >>= 1;
        nxtop <<= 1;
        nytop <<= 1;
        if nxf <= c {
            nxtop -= 1;
        } else {
            nxf -= c;
        }
        if nyf <= c {
            nytop -= 1;
        } else {
            nyf -= c;
        }

        // Last pass divides by 4 and has no negative rounding.
        if k == 0 {
            nrnd0 = 0;
            shift = 2;
        }

        for i in 0..nxtop {
            unshuffle(a, ny * i, nytop, 1, &mut tmp);
        }
        for j in 0..nytop {
            unshuffle(a, j, nxtop, ny, &mut tmp);
        }

        let oddx = nxtop % 2;
        let oddy = nytop % 2;

        for i in (0..nxtop - oddx).step_by(2) {
            let mut s00 = ny * i;
            let mut s10 = s00 + ny;
            for _ in (0..nytop - oddy).step_by(2) {
                let h0 = a[s00];
                let hc = round_to(a[s10 + 1], prnd0, nrnd0, mask0);

                // bit0 of hc moves into hx and hy
                let lowbit0 = hc & bit0;
                let hx = toward_zero(round_to(a[s10], prnd1, nrnd1, mask1), lowbit0);
                let hy = toward_zero(round_to(a[s00 + 1], prnd1, nrnd1, mask1), lowbit0);

                // bits 0 and 1 of hc, hx, hy move into h0
                let lowbit1 = (hc ^ hx ^ hy) & bit1;
                let h0 = if h0 < 0 && lowbit0 == 0 {
                    h0.wrapping_add(lowbit1)
                } else {
                    h0.wrapping_add(lowbit0).wrapping_sub(lowbit1)
                };

                let (sum, diff) = (h0.wrapping_add(hc), h0.wrapping_sub(hc));
                let (plus, minus) = (hx.wrapping_add(hy), hx.wrapping_sub(hy));
                a[s10 + 1] = sum.wrapping_add(plus) >> shift;
                a[s10] = diff.wrapping_add(minus) >> shift;
                a[s00 + 1] = diff.wrapping_sub(minus) >> shift;
                a[s00] = sum.wrapping_sub(plus) >> shift;
                s00 += 2;
                s10 += 2;
            }

            if oddy > 0 {
                let hx = round_to(a[s10], prnd1, nrnd1, mask1);
                let h0 = toward_zero(a[s00], hx & bit1);
                a[s10] = h0.wrapping_add(hx) >> shift;
                a[s00] = h0.wrapping_sub(hx) >> shift;
            }
        }

        if oddx > 0 {
            let mut s00 = ny * (nxtop - 1);
            for _ in (0..nytop - oddy).step_by(2) {
                let hy = round_to(a[s00 + 1], prnd1, nrnd1, mask1);
                let h0 = toward_zero(a[s00], hy & bit1);
                a[s00 + 1] = h0.wrapping_add(hy) >> shift;
                a[s00] = h0.wrapping_sub(hy) >> shift;
                s00 += 2;
            }
            if oddy > 0 {
                a[s00] >>= shift;
            }
        }

        bit1 = bit0;
        bit0 >>= 1;
        mask1 = mask0;
        mask0 >>= 1;
        prnd1 = prnd0;
        prnd0 >>= 1;
        nrnd1 = nrnd0;
        nrnd0 = prnd0 - 1;
    }
}
