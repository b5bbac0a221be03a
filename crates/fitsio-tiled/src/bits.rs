//! MSB-first bit input shared by the Rice and HCompress decoders.

use crate::error::{Error, Result};

/// Position of the most significant 1-bit for each byte value 0..255.
const NONZERO_COUNT: [u32; 256] = [
    0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

/// Reads bits most-significant first and never past the end of its slice.
///
/// The buffer only ever holds `nbits` unread bits in its low end; whole bytes
/// are pulled in on demand.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    nbits: u32,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            buffer: 0,
            nbits: 0,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let byte = *self.data.get(self.pos).ok_or(Error::TruncatedStream)?;
        self.pos += 1;
        self.buffer = (self.buffer << 8) | byte as u64;
        self.nbits += 8;
        Ok(())
    }

    /// Read `n` bits (at most 32).
    pub(crate) fn read_bits(&mut self, n: u32) -> Result<u32> {
        debug_assert!(n <= 32);
        while self.nbits < n {
            self.refill()?;
        }
        self.nbits -= n;
        let value = (self.buffer >> self.nbits) & ((1u64 << n) - 1);
        self.buffer &= (1u64 << self.nbits) - 1;
        Ok(value as u32)
    }

    pub(crate) fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Count zero bits up to and including the terminating one bit, returning
    /// the number of zeros.
    pub(crate) fn read_unary(&mut self) -> Result<u32> {
        let mut zeros = 0u32;
        // After any read fewer than 8 bits remain buffered, so the buffer
        // always indexes the table.
        while self.buffer == 0 {
            zeros = zeros.saturating_add(self.nbits);
            self.nbits = 0;
            self.refill()?;
        }
        let top = NONZERO_COUNT[self.buffer as usize];
        zeros = zeros.saturating_add(self.nbits - top);
        self.nbits = top - 1;
        self.buffer &= (1u64 << self.nbits) - 1;
        Ok(zeros)
    }

    /// Drop any partially consumed byte so the next read starts on a byte
    /// boundary.
    pub(crate) fn restart(&mut self) {
        self.buffer = 0;
        self.nbits = 0;
    }
}
