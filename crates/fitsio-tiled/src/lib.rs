//! Decoder for FITS images stored with the tiled image compression
//! convention.
//!
//! A compressed image lives in a binary table extension (`ZIMAGE = T`): every
//! table row holds one tile, compressed with one of `NOCOMPRESS`, `RICE_1`,
//! `GZIP_1`, `GZIP_2` or `HCOMPRESS_1`. [`tiled::decompress`] takes the parsed
//! header cards and the table's data segment and reassembles the full image.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod bits;

pub mod compression;
pub mod error;
pub mod gzip;
pub mod hcompress;
pub mod header;
pub mod image;
pub mod lupton;
pub mod pixel;
pub mod quantize;
pub mod rice;
pub mod table;
pub mod tiled;
pub mod value;

#[cfg(feature = "array")]
pub mod array;

pub use compression::{Algorithm, CompressionHeader};
pub use error::{Error, Result};
pub use pixel::{BitDepth, PixelBuffer};
pub use tiled::{decompress, DecodeOptions, DecodedImage, TileDecoder, TilePolicy};
