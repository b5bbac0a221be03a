use alloc::vec::Vec;

use ndarray::{Array, ArrayD};

use crate::error::{Error, Result};
use crate::pixel::PixelBuffer;

impl PixelBuffer {
    /// Physical pixel values as an array indexed slowest axis first
    /// (`[plane, row, column]`).
    pub fn to_array(&self) -> Result<ArrayD<f64>> {
        let shape: Vec<usize> = self.axes.iter().rev().copied().collect();
        let n = self.depth.bytes();
        let values: Vec<f64> = (0..self.len())
            .map(|i| crate::pixel::read_pixel(&self.bytes[i * n..], self.depth))
            .collect();
        Array::from_shape_vec(shape, values)
            .map_err(|_| Error::TileGeometry("pixel count does not match the image axes"))
    }
}
