//! Gorilla decoder. The block carries no sample count, so the caller supplies
//! it; running out of bits before that count is reached is `Truncated`.

use crate::bits::BitReader;
use crate::encode::Window;
use crate::error::{Error, Result};
use crate::{LEADING_ZERO_BITS, LENGTH_BITS};

/// Decode `expected` samples from `block`.
pub fn decompress(block: &[u8], expected: usize) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(expected);
    if expected == 0 {
        return Ok(out);
    }
    let mut reader = BitReader::new(block);
    let truncated = |decoded: usize| Error::Truncated { decoded, expected };

    let mut previous = reader.read_bits(64).ok_or_else(|| truncated(0))?;
    out.push(f64::from_bits(previous));

    let mut window = Window::default();
    while out.len() < expected {
        let decoded = out.len();
        let changed = reader.read_bit().ok_or_else(|| truncated(decoded))?;
        if changed {
            let new_window = reader.read_bit().ok_or_else(|| truncated(decoded))?;
            if new_window {
                let leading_zeros = reader
                    .read_bits(LEADING_ZERO_BITS)
                    .ok_or_else(|| truncated(decoded))? as u32;
                let length = match reader
                    .read_bits(LENGTH_BITS)
                    .ok_or_else(|| truncated(decoded))?
                {
                    0 => 64,
                    n => n as u32,
                };
                if leading_zeros + length > 64 {
                    return Err(Error::Corrupt(format!(
                        "window of {length} bits after {leading_zeros} leading zeros"
                    )));
                }
                window = Window {
                    leading_zeros,
                    length,
                };
            } else if window.length == 0 {
                return Err(Error::Corrupt(
                    "window reuse before any window was established".into(),
                ));
            }
            let meaningful = reader
                .read_bits(window.length as u8)
                .ok_or_else(|| truncated(decoded))?;
            previous ^= meaningful << window.trailing_zeros();
        }
        out.push(f64::from_bits(previous));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{compress, Compressor};

    fn assert_bit_identical(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert_eq!(x.to_bits(), y.to_bits(), "{x} != {y}");
        }
    }

    #[test]
    fn round_trip_sample_block() {
        let input = [1.0, 1.3, 1.4, 1.5, 1.6, 2.0, 2.1, 1.1, 1.2, 1.2, 1.2, 0.4];
        let block = compress(&input);
        assert_bit_identical(&decompress(&block, input.len()).unwrap(), &input);
    }

    #[test]
    fn round_trip_special_values() {
        let input = [
            0.0,
            -0.0,
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::from_bits(0x7ff8_0000_0000_0001),
            f64::MIN_POSITIVE,
            1.79e-308,
            f64::MAX,
            -1.0,
            1.0,
        ];
        let block = compress(&input);
        assert_bit_identical(&decompress(&block, input.len()).unwrap(), &input);
    }

    #[test]
    fn sequential_compress_calls_concatenate() {
        let parts: [&[f64]; 3] = [&[1.0, 2.0], &[], &[2.0, 3.5, -7.25]];
        let mut c = Compressor::new();
        for p in parts {
            c.compress(p).unwrap();
        }
        let block = c.finalize().unwrap();
        let all: Vec<f64> = parts.concat();
        assert_eq!(block, compress(&all));
        assert_bit_identical(&decompress(&block, all.len()).unwrap(), &all);
    }

    #[test]
    fn single_value_and_empty() {
        assert_eq!(decompress(&compress(&[42.0]), 1).unwrap(), vec![42.0]);
        assert!(decompress(&[], 0).unwrap().is_empty());
        assert!(compress(&[]).is_empty());
    }

    #[test]
    fn truncated_block_is_an_error() {
        let input = [1.0, 2.0, 3.0, 4.0];
        let block = compress(&input);
        let err = decompress(&block[..9], input.len()).unwrap_err();
        assert!(matches!(err, Error::Truncated { expected: 4, .. }));
        assert_eq!(
            decompress(&block[..4], 1).unwrap_err(),
            Error::Truncated {
                decoded: 0,
                expected: 1
            }
        );
    }

    #[test]
    fn reuse_without_window_is_corrupt() {
        // header, then `1 0` with no window ever established
        let mut block = 1.0f64.to_be_bytes().to_vec();
        block.push(0b1000_0000);
        assert!(matches!(decompress(&block, 2), Err(Error::Corrupt(_))));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn arbitrary_bit_patterns_round_trip(
                raw in proptest::collection::vec(any::<u64>(), 0..64),
            ) {
                let input: Vec<f64> = raw.iter().copied().map(f64::from_bits).collect();
                let decoded = decompress(&compress(&input), input.len()).unwrap();
                let bits: Vec<u64> = decoded.iter().map(|v| v.to_bits()).collect();
                prop_assert_eq!(bits, raw);
            }

            #[test]
            fn slowly_varying_series_round_trip(
                start in -1e6f64..1e6,
                steps in proptest::collection::vec(-1.0f64..1.0, 1..128),
            ) {
                let input: Vec<f64> = steps
                    .iter()
                    .scan(start, |acc, d| { *acc += d; Some(*acc) })
                    .collect();
                let decoded = decompress(&compress(&input), input.len()).unwrap();
                prop_assert_eq!(decoded, input);
            }
        }
    }
}
