//! Single-pixel big-endian encoding and the output pixel buffer.
//!
//! FITS stores all binary data in big-endian (most-significant byte first)
//! format. Every pixel in a [`PixelBuffer`] is kept in that on-disk layout so
//! decoded tiles can be byte-copied straight into place.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::image::{decode_pixels, ImageData};

/// Pixel representation selected by BITPIX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl BitDepth {
    pub fn from_bitpix(bitpix: i64) -> Result<Self> {
        match bitpix {
            8 => Ok(BitDepth::U8),
            16 => Ok(BitDepth::I16),
            32 => Ok(BitDepth::I32),
            64 => Ok(BitDepth::I64),
            -32 => Ok(BitDepth::F32),
            -64 => Ok(BitDepth::F64),
            other => Err(Error::InvalidBitpix(other)),
        }
    }

    pub const fn bitpix(self) -> i64 {
        match self {
            BitDepth::U8 => 8,
            BitDepth::I16 => 16,
            BitDepth::I32 => 32,
            BitDepth::I64 => 64,
            BitDepth::F32 => -32,
            BitDepth::F64 => -64,
        }
    }

    /// Bytes per pixel.
    pub const fn bytes(self) -> usize {
        match self {
            BitDepth::U8 => 1,
            BitDepth::I16 => 2,
            BitDepth::I32 | BitDepth::F32 => 4,
            BitDepth::I64 | BitDepth::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, BitDepth::F32 | BitDepth::F64)
    }
}

/// Read one pixel from the start of `buf` as a physical `f64`.
#[inline]
pub fn read_pixel(buf: &[u8], depth: BitDepth) -> f64 {
    match depth {
        BitDepth::F32 => f32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        BitDepth::F64 => f64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]),
        _ => read_integer(buf, depth.bytes()) as f64,
    }
}

/// Read a big-endian integer `width` bytes wide. One-byte values are
/// unsigned, wider ones two's complement.
#[inline]
pub fn read_integer(buf: &[u8], width: usize) -> i64 {
    match width {
        1 => buf[0] as i64,
        2 => i16::from_be_bytes([buf[0], buf[1]]) as i64,
        4 => i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as i64,
        _ => i64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]),
    }
}

/// Write an integer, truncating it to the pixel width. Float depths store
/// the converted value.
#[inline]
pub fn write_integer(buf: &mut [u8], depth: BitDepth, value: i64) {
    match depth {
        BitDepth::U8 => buf[0] = value as u8,
        BitDepth::I16 => buf[..2].copy_from_slice(&(value as i16).to_be_bytes()),
        BitDepth::I32 => buf[..4].copy_from_slice(&(value as i32).to_be_bytes()),
        BitDepth::I64 => buf[..8].copy_from_slice(&value.to_be_bytes()),
        BitDepth::F32 => buf[..4].copy_from_slice(&(value as f32).to_be_bytes()),
        BitDepth::F64 => buf[..8].copy_from_slice(&(value as f64).to_be_bytes()),
    }
}

/// Write a physical value. Integer depths round half away from zero and
/// saturate at the type's range.
#[inline]
pub fn write_pixel(buf: &mut [u8], depth: BitDepth, value: f64) {
    match depth {
        BitDepth::F32 => buf[..4].copy_from_slice(&(value as f32).to_be_bytes()),
        BitDepth::F64 => buf[..8].copy_from_slice(&value.to_be_bytes()),
        BitDepth::U8 => buf[0] = libm::round(value) as u8,
        BitDepth::I16 => buf[..2].copy_from_slice(&(libm::round(value) as i16).to_be_bytes()),
        BitDepth::I32 => buf[..4].copy_from_slice(&(libm::round(value) as i32).to_be_bytes()),
        BitDepth::I64 => buf[..8].copy_from_slice(&(libm::round(value) as i64).to_be_bytes()),
    }
}

/// A fully assembled image in big-endian, row-major order.
///
/// `axes` follows FITS order: `axes[0]` is the row length, `axes[1]` the
/// number of rows, and any further axes stack planes.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub depth: BitDepth,
    pub axes: Vec<usize>,
    pub bytes: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer covering every axis.
    pub fn zeroed(depth: BitDepth, axes: &[usize]) -> Self {
        let pixels = if axes.is_empty() {
            0
        } else {
            axes.iter().product()
        };
        PixelBuffer {
            depth,
            axes: axes.to_vec(),
            bytes: vec![0u8; pixels * depth.bytes()],
        }
    }

    pub fn width(&self) -> usize {
        self.axes.first().copied().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        match self.axes.len() {
            0 => 0,
            1 => 1,
            _ => self.axes[1],
        }
    }

    /// Number of stacked planes (product of axes beyond the second).
    pub fn planes(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().skip(2).product()
        }
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.depth.bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Physical value of the pixel at linear `index`.
    pub fn get(&self, index: usize) -> Option<f64> {
        let n = self.depth.bytes();
        self.bytes
            .get(index * n..(index + 1) * n)
            .map(|b| read_pixel(b, self.depth))
    }

    /// Convert to native-endian typed pixels.
    pub fn to_image_data(&self) -> ImageData {
        decode_pixels(&self.bytes, self.depth)
    }
}
