//! Restoring floating-point pixels from quantized integers.
//!
//! Float images are stored as integers `i` with a per-tile scale and zero
//! point. Subtractive dithering adds a reproducible pseudo-random offset
//! drawn from a fixed 10000-entry sequence, indexed by tile number and
//! `ZDITHER0`.

use alloc::vec::Vec;

/// Length of the dither sequence.
pub const N_RANDOM: usize = 10_000;

/// Integer written for pixels that were exactly zero under
/// `SUBTRACTIVE_DITHER_2`.
pub const ZERO_VALUE: i64 = -2_147_483_646;

/// How integer tile samples map back to floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantization {
    /// `value * scale + zero`.
    #[default]
    NoDither,
    /// `(value - r + 0.5) * scale + zero` with `r` from the dither sequence.
    SubtractiveDither1,
    /// As `SubtractiveDither1`, with [`ZERO_VALUE`] restored to exactly 0.
    SubtractiveDither2,
}

impl Quantization {
    /// Parse a `ZQUANTIZ` value.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "NO_DITHER" | "NONE" => Some(Quantization::NoDither),
            "SUBTRACTIVE_DITHER_1" => Some(Quantization::SubtractiveDither1),
            "SUBTRACTIVE_DITHER_2" => Some(Quantization::SubtractiveDither2),
            _ => None,
        }
    }

    pub fn is_dithered(self) -> bool {
        !matches!(self, Quantization::NoDither)
    }
}

/// Generate the dither sequence (Park-Miller minimal standard generator).
pub fn random_sequence() -> Vec<f32> {
    const A: f64 = 16807.0;
    const M: f64 = 2147483647.0;
    let mut seed = 1.0f64;
    let mut values = Vec::with_capacity(N_RANDOM);
    for _ in 0..N_RANDOM {
        let temp = A * seed;
        seed = temp - M * libm::trunc(temp / M);
        values.push((seed / M) as f32);
    }
    values
}

/// Per-tile dequantization settings.
#[derive(Debug, Clone, Copy)]
pub struct Dequantize<'a> {
    pub method: Quantization,
    pub scale: f64,
    pub zero: f64,
    /// Integer marking undefined pixels, decoded as NaN.
    pub blank: Option<i64>,
    /// Zero-based tile index.
    pub tile_index: usize,
    /// `ZDITHER0`.
    pub dither_seed: i64,
    /// Output of [`random_sequence`]; may be empty when not dithering.
    pub random: &'a [f32],
}

impl Dequantize<'_> {
    /// Convert `values` to physical floats, handing each to `emit` in order.
    pub fn apply(&self, values: &[i64], mut emit: impl FnMut(usize, f64)) {
        if !self.method.is_dithered() || self.random.len() < N_RANDOM {
            for (i, &v) in values.iter().enumerate() {
                let out = if Some(v) == self.blank {
                    f64::NAN
                } else {
                    v as f64 * self.scale + self.zero
                };
                emit(i, out);
            }
            return;
        }

        let offset = (self.tile_index as i64)
            .wrapping_add(self.dither_seed)
            .wrapping_sub(1);
        let mut iseed = offset.rem_euclid(N_RANDOM as i64) as usize;
        let mut next = (self.random[iseed] * 500.0) as usize;

        for (i, &v) in values.iter().enumerate() {
            let out = if Some(v) == self.blank {
                f64::NAN
            } else if self.method == Quantization::SubtractiveDither2 && v == ZERO_VALUE {
                0.0
            } else {
                (v as f64 - self.random[next] as f64 + 0.5) * self.scale + self.zero
            };
            emit(i, out);

            next += 1;
            if next == N_RANDOM {
                iseed = (iseed + 1) % N_RANDOM;
                next = (self.random[iseed] * 500.0) as usize;
            }
        }
    }
}
