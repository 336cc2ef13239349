//! MSB-first bit writer/reader.
//!
//! Bits fill each byte from the most significant end. The writer only emits
//! the bytes it has touched; a partial final byte is zero-padded.

/// Accumulates bits into a byte buffer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buffer: Vec<u8>,
    current: u8,
    /// Bits already used in `current` (0..=7).
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current |= 1 << (7 - self.used);
        }
        self.used += 1;
        if self.used == 8 {
            self.buffer.push(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    /// Write the low `count` bits of `value`, highest first.
    pub fn write_bits(&mut self, value: u64, count: u8) {
        debug_assert!(count <= 64);
        if self.used == 0 {
            // byte-aligned fast path
            let mut remaining = count;
            while remaining >= 8 {
                remaining -= 8;
                self.buffer.push((value >> remaining) as u8);
            }
            for i in (0..remaining).rev() {
                self.write_bit((value >> i) & 1 == 1);
            }
            return;
        }
        for i in (0..count).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Total bits written so far.
    pub fn bit_len(&self) -> usize {
        self.buffer.len() * 8 + self.used as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bit_len() == 0
    }

    /// Flush the partial byte (if any) and return the buffer.
    pub fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.buffer.push(self.current);
        }
        self.buffer
    }
}

/// Sequential reader over an MSB-first bit stream.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    buffer: &'a [u8],
    byte: usize,
    bit: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            byte: 0,
            bit: 0,
        }
    }

    /// Next bit, or `None` at end of stream.
    pub fn read_bit(&mut self) -> Option<bool> {
        let byte = *self.buffer.get(self.byte)?;
        let bit = (byte >> (7 - self.bit)) & 1 == 1;
        self.bit += 1;
        if self.bit == 8 {
            self.bit = 0;
            self.byte += 1;
        }
        Some(bit)
    }

    /// Next `count` bits as the low bits of a `u64`, or `None` if the stream
    /// ends first.
    pub fn read_bits(&mut self, count: u8) -> Option<u64> {
        debug_assert!(count <= 64);
        let mut value = 0u64;
        for _ in 0..count {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Some(value)
    }

    pub fn remaining_bits(&self) -> usize {
        (self.buffer.len().saturating_sub(self.byte)) * 8 - self.bit as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msb_first_layout() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bits(0b0101, 4);
        assert_eq!(w.bit_len(), 5);
        assert_eq!(w.finish(), vec![0b1010_1000]);
    }

    #[test]
    fn aligned_and_unaligned_writes_agree() {
        let value = 0xDEAD_BEEF_0123_4567u64;
        let mut aligned = BitWriter::new();
        aligned.write_bits(value, 64);
        let bytes = aligned.finish();
        assert_eq!(bytes, value.to_be_bytes().to_vec());

        let mut w = BitWriter::new();
        w.write_bit(false);
        w.write_bits(value, 64);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bit(), Some(false));
        assert_eq!(r.read_bits(64), Some(value));
    }

    #[test]
    fn reader_reports_end() {
        let bytes = [0xFFu8];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(6), Some(0b111111));
        assert_eq!(r.remaining_bits(), 2);
        assert_eq!(r.read_bits(3), None);
    }
}
