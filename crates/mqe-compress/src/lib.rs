#![forbid(unsafe_code)]
//! mqe-compress: Gorilla XOR compression for blocks of `f64` samples.
//!
//! Block layout: bytes 0..8 hold the first sample as a big-endian IEEE-754
//! double; the remainder is an MSB-first bit stream of XOR-encoded deltas.
//! Blocks carry no length prefix, so the decoder is told how many samples to
//! read. Round-trips are bit-exact, NaN payloads and infinities included.

pub mod bits;
pub mod decode;
pub mod encode;
pub mod error;

pub use decode::decompress;
pub use encode::{compress, Compressor};
pub use error::{Error, Result};

/// Bits used to store the leading-zero count of a window.
pub(crate) const LEADING_ZERO_BITS: u8 = 5;
/// Bits used to store the meaningful length of a window (64 is written as 0).
pub(crate) const LENGTH_BITS: u8 = 6;
/// Largest leading-zero count representable in `LEADING_ZERO_BITS`.
pub(crate) const MAX_LEADING_ZEROS: u32 = (1 << LEADING_ZERO_BITS) - 1;
