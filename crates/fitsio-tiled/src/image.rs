//! Typed views of decoded pixels.

use alloc::vec::Vec;

use bytemuck::pod_collect_to_vec;

use crate::pixel::BitDepth;

/// Image pixel data in native byte order, typed by BITPIX.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ImageData {
    pub fn len(&self) -> usize {
        match self {
            ImageData::U8(v) => v.len(),
            ImageData::I16(v) => v.len(),
            ImageData::I32(v) => v.len(),
            ImageData::I64(v) => v.len(),
            ImageData::F32(v) => v.len(),
            ImageData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode a contiguous big-endian byte slice into typed pixels.
pub fn decode_pixels(raw: &[u8], depth: BitDepth) -> ImageData {
    match depth {
        BitDepth::U8 => ImageData::U8(raw.to_vec()),
        BitDepth::I16 => {
            let mut pixels: Vec<i16> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i16::from_be(*v);
            }
            ImageData::I16(pixels)
        }
        BitDepth::I32 => {
            let mut pixels: Vec<i32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i32::from_be(*v);
            }
            ImageData::I32(pixels)
        }
        BitDepth::I64 => {
            let mut pixels: Vec<i64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i64::from_be(*v);
            }
            ImageData::I64(pixels)
        }
        BitDepth::F32 => {
            let mut pixels: Vec<f32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f32::from_bits(u32::from_be(v.to_bits()));
            }
            ImageData::F32(pixels)
        }
        BitDepth::F64 => {
            let mut pixels: Vec<f64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f64::from_bits(u64::from_be(v.to_bits()));
            }
            ImageData::F64(pixels)
        }
    }
}
