//! Streaming Gorilla encoder.
//!
//! Per sample after the first, with `X = previous_bits ^ current_bits`:
//! - `X == 0`: a single `0` bit.
//! - `X` fits the current window exactly: `1 0` then the window bits.
//! - otherwise: `1 1`, 5 bits of leading zeros, 6 bits of meaningful
//!   length (64 written as 0), then the meaningful bits. The window becomes
//!   `(leading_zeros, length)`.

use crate::bits::BitWriter;
use crate::error::{Error, Result};
use crate::{LEADING_ZERO_BITS, LENGTH_BITS, MAX_LEADING_ZEROS};

/// Window of meaningful bits shared by consecutive XORs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub leading_zeros: u32,
    pub length: u32,
}

impl Window {
    /// Window describing the non-zero XOR `x`.
    pub(crate) fn of(x: u64) -> Self {
        let leading_zeros = x.leading_zeros().min(MAX_LEADING_ZEROS);
        let trailing_zeros = x.trailing_zeros();
        Self {
            leading_zeros,
            length: 64 - leading_zeros - trailing_zeros,
        }
    }

    pub(crate) fn trailing_zeros(&self) -> u32 {
        64 - self.leading_zeros - self.length
    }
}

/// Incremental compressor. `compress` may be called repeatedly; the output is
/// the concatenation of every call.
#[derive(Debug, Default)]
pub struct Compressor {
    writer: BitWriter,
    previous: Option<u64>,
    window: Window,
    count: usize,
    finalized: bool,
}

impl Compressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples accepted so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn compress(&mut self, values: &[f64]) -> Result<()> {
        if self.finalized {
            return Err(Error::AlreadyFinalized);
        }
        for &value in values {
            self.push(value);
        }
        Ok(())
    }

    fn push(&mut self, value: f64) {
        let bits = value.to_bits();
        match self.previous {
            None => self.writer.write_bits(bits, 64),
            Some(prev) => self.encode_xor(prev ^ bits),
        }
        self.previous = Some(bits);
        self.count += 1;
    }

    fn encode_xor(&mut self, x: u64) {
        if x == 0 {
            self.writer.write_bit(false);
            return;
        }
        self.writer.write_bit(true);

        let window = Window::of(x);
        if self.window.length != 0 && window == self.window {
            self.writer.write_bit(false);
        } else {
            self.writer.write_bit(true);
            self.writer
                .write_bits(u64::from(window.leading_zeros), LEADING_ZERO_BITS);
            // 64 does not fit in 6 bits; a zero length never occurs for x != 0.
            self.writer
                .write_bits(u64::from(window.length % 64), LENGTH_BITS);
            self.window = window;
        }
        let meaningful = x >> window.trailing_zeros();
        self.writer.write_bits(meaningful, window.length as u8);
    }

    /// Flush and return the block. Calling it twice is an error.
    pub fn finalize(&mut self) -> Result<Vec<u8>> {
        if self.finalized {
            return Err(Error::AlreadyFinalized);
        }
        self.finalized = true;
        #[cfg(feature = "tracing")]
        tracing::trace!(
            samples = self.count,
            bits = self.writer.bit_len(),
            "gorilla block finalized"
        );
        Ok(std::mem::take(&mut self.writer).finish())
    }
}

/// Compress `values` into a single block.
pub fn compress(values: &[f64]) -> Vec<u8> {
    let mut c = Compressor::new();
    for &value in values {
        c.push(value);
    }
    c.writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_big_endian_first_value() {
        let block = compress(&[1.5]);
        assert_eq!(block, 1.5f64.to_be_bytes().to_vec());
    }

    #[test]
    fn repeated_values_cost_one_bit() {
        let block = compress(&[2.0; 9]);
        // 8 header bytes + 8 zero bits
        assert_eq!(block.len(), 9);
        assert_eq!(block[8], 0);
    }

    #[test]
    fn finalize_twice_fails() {
        let mut c = Compressor::new();
        c.compress(&[1.0, 2.0]).unwrap();
        c.finalize().unwrap();
        assert_eq!(c.finalize(), Err(Error::AlreadyFinalized));
        assert_eq!(c.compress(&[3.0]), Err(Error::AlreadyFinalized));
    }

    #[test]
    fn window_caps_leading_zeros() {
        let w = Window::of(1);
        assert_eq!(w.leading_zeros, 31);
        assert_eq!(w.length, 33);
        assert_eq!(w.trailing_zeros(), 0);
        let full = Window::of(u64::MAX);
        assert_eq!((full.leading_zeros, full.length), (0, 64));
    }
}
