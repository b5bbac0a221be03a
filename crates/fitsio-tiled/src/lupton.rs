//! Inverse asinh ("Lupton") scaling.
//!
//! Images written with `BSOFTEN`/`BOFFSET` store `asinh`-compressed
//! magnitudes; the physical flux is
//! `boffset + bsoften * (exp(c) - exp(-c))` with
//! `c = (bzero + bscale * p) / (0.4 * ln 10)`.

use crate::header::{card_float_value, card_integer_value, Card};
use crate::pixel::{read_integer, read_pixel, BitDepth, PixelBuffer};

/// Scaling constants for the asinh stage, read once per image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LuptonParameters {
    pub bzero: f64,
    pub bscale: f64,
    pub boffset: f64,
    pub bsoften: f64,
    /// Integer sentinel for undefined pixels (`BLANK`).
    pub blank: Option<i64>,
}

impl LuptonParameters {
    /// Parameters from the header, present only when both `BSOFTEN` and
    /// `BOFFSET` are set.
    pub fn from_cards(cards: &[Card]) -> Option<Self> {
        let bsoften = card_float_value(cards, "BSOFTEN")?;
        let boffset = card_float_value(cards, "BOFFSET")?;
        Some(LuptonParameters {
            bzero: card_float_value(cards, "BZERO").unwrap_or(0.0),
            bscale: card_float_value(cards, "BSCALE").unwrap_or(1.0),
            boffset,
            bsoften,
            blank: card_integer_value(cards, "BLANK"),
        })
    }

    /// Map one stored value to flux.
    pub fn apply(&self, p: f64) -> f32 {
        if p.is_nan() {
            return f32::NAN;
        }
        let c = (self.bzero + self.bscale * p) / (0.4 * core::f64::consts::LN_10);
        (self.boffset + self.bsoften * (libm::exp(c) - libm::exp(-c))) as f32
    }

    /// Rescale a whole image into a new 32-bit float buffer.
    pub fn rescale(&self, input: &PixelBuffer) -> PixelBuffer {
        let mut out = PixelBuffer::zeroed(BitDepth::F32, &input.axes);
        let n = input.depth.bytes();
        for (src, dst) in input.bytes.chunks_exact(n).zip(out.bytes.chunks_exact_mut(4)) {
            let blank = !input.depth.is_float() && Some(read_integer(src, n)) == self.blank;
            let value = if blank {
                f32::NAN
            } else {
                self.apply(read_pixel(src, input.depth))
            };
            dst.copy_from_slice(&value.to_be_bytes());
        }
        log::debug!(
            "asinh rescale of {} pixels (bsoften {}, boffset {})",
            input.len(),
            self.bsoften,
            self.boffset
        );
        out
    }
}
