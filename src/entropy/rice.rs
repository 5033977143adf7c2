//! Adaptive Golomb-Rice coding of signed residual blocks.
//!
//! Wire format (MSB-first bit stream, zero-padded to a whole byte):
//! residuals are zig-zag mapped to unsigned values and coded in blocks
//! of `block_size`. Each block opens with a k field (3, 4 or 5 bits
//! wide for `byte_pix` 1, 2 or 4); the field's all-ones value
//! (`byte_pix * 8 - 1`) marks an escaped block stored at full
//! `byte_pix * 8`-bit width. Any other k is followed, per value, by the
//! quotient `v >> k` in unary (one-bits closed by a zero) and the k
//! low-order bits of `v`. A final short block carries its own k over
//! the shorter run; the stream does not record the residual count, the
//! decoder is told it.

use crate::codec::{BlockCode, RiceCompressOption};
use crate::entropy::bitio::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Map a signed residual onto the non-negative integers, preserving
/// magnitude order: 0→0, −1→1, 1→2, −2→3, …
#[inline]
pub fn zigzag(value: i32) -> u32 {
    ((value as u32) << 1) ^ ((value >> 31) as u32)
}

/// Inverse of [`zigzag`].
#[inline]
pub fn unzigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Field widths fixed by `byte_pix`.
struct Layout {
    k_bits: u32,
    k_escape: u32,
    value_bits: u32,
}

impl Layout {
    fn for_option(option: &RiceCompressOption) -> Result<Layout> {
        let k_bits = match option.byte_pix() {
            1 => 3,
            2 => 4,
            4 => 5,
            other => {
                return Err(Error::config(format!(
                    "unsupported bytes per element {other}"
                )))
            }
        };
        let value_bits = (option.byte_pix() * 8) as u32;
        Ok(Layout {
            k_bits,
            k_escape: value_bits - 1,
            value_bits,
        })
    }
}

/// Smallest k minimising `k·n + Σ(v >> k)` over one block.
fn best_k(mapped: &[u32], k_count: u32) -> u32 {
    let n = mapped.len() as u64;
    let mut best = 0u32;
    let mut best_cost = mapped.iter().map(|&v| u64::from(v)).sum::<u64>();
    for k in 1..k_count {
        let cost = u64::from(k) * n + mapped.iter().map(|&v| u64::from(v >> k)).sum::<u64>();
        if cost < best_cost {
            best = k;
            best_cost = cost;
        }
    }
    best
}

//─────────────────────────────── ENCODER ────────────────────────────────

#[derive(Debug, Clone)]
pub struct RiceEncoder {
    option: RiceCompressOption,
}

impl RiceEncoder {
    pub fn new(option: RiceCompressOption) -> Self {
        RiceEncoder { option }
    }

    /// Encode residuals into a byte stream.
    pub fn encode(&self, residuals: &[i32]) -> Result<Vec<u8>> {
        Ok(self.encode_blocks(residuals)?.0)
    }

    /// Encode residuals and report the per-block coding decisions.
    pub fn encode_blocks(&self, residuals: &[i32]) -> Result<(Vec<u8>, Vec<BlockCode>)> {
        let layout = Layout::for_option(&self.option)?;
        let block_size = self.option.block_size();
        let escape_limit = self.option.escape_limit();

        let mut writer = BitWriter::with_capacity(residuals.len() * self.option.byte_pix() / 2 + 8);
        let mut codes = Vec::with_capacity(residuals.len().div_ceil(block_size));
        let mut mapped = Vec::with_capacity(block_size);

        for block in residuals.chunks(block_size) {
            mapped.clear();
            mapped.extend(block.iter().copied().map(zigzag));

            if layout.value_bits < 32 {
                if let Some(&v) = mapped.iter().find(|&&v| v >> layout.value_bits != 0) {
                    return Err(Error::config(format!(
                        "residual {} does not fit {} bytes per element",
                        unzigzag(v),
                        self.option.byte_pix()
                    )));
                }
            }

            let k = best_k(&mapped, layout.k_escape);
            let max_quotient = mapped.iter().map(|&v| v >> k).max().unwrap_or(0);
            if max_quotient >= escape_limit {
                writer.write_bits(layout.k_escape, layout.k_bits);
                for &v in &mapped {
                    writer.write_bits(v, layout.value_bits);
                }
                codes.push(BlockCode::Escape);
            } else {
                writer.write_bits(k, layout.k_bits);
                for &v in &mapped {
                    writer.write_unary(v >> k);
                    writer.write_bits(v, k);
                }
                codes.push(BlockCode::Rice(k as u8));
            }
        }

        Ok((writer.finish(), codes))
    }
}

//─────────────────────────────── DECODER ────────────────────────────────

#[derive(Debug, Clone)]
pub struct RiceDecoder {
    option: RiceCompressOption,
}

impl RiceDecoder {
    pub fn new(option: RiceCompressOption) -> Self {
        RiceDecoder { option }
    }

    /// Decode exactly `count` residuals from `stream`.
    pub fn decode(&self, stream: &[u8], count: usize) -> Result<Vec<i32>> {
        let layout = Layout::for_option(&self.option)?;
        let block_size = self.option.block_size();
        let quotient_limit = self.option.escape_limit() - 1;

        let mut reader = BitReader::new(stream);
        let mut out = Vec::with_capacity(count);

        while out.len() < count {
            let n = block_size.min(count - out.len());
            let k = reader.read_bits(layout.k_bits)?;
            if k == layout.k_escape {
                for _ in 0..n {
                    let v = reader.read_bits(layout.value_bits)?;
                    out.push(unzigzag(v));
                }
            } else {
                for _ in 0..n {
                    let quotient = reader.read_unary(quotient_limit)?;
                    if k > 0 && u64::from(quotient) << k > u64::from(u32::MAX) {
                        return Err(Error::codec(
                            reader.byte_offset(),
                            "quotient overflows the element width",
                        ));
                    }
                    let remainder = reader.read_bits(k)?;
                    out.push(unzigzag((quotient << k) | remainder));
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec_pair(option: &RiceCompressOption) -> (RiceEncoder, RiceDecoder) {
        (
            RiceEncoder::new(option.clone()),
            RiceDecoder::new(option.clone()),
        )
    }

    fn roundtrip(residuals: &[i32], option: &RiceCompressOption) -> Vec<BlockCode> {
        let (encoder, decoder) = codec_pair(option);
        let (stream, codes) = encoder.encode_blocks(residuals).unwrap();
        let decoded = decoder.decode(&stream, residuals.len()).unwrap();
        assert_eq!(decoded, residuals);
        codes
    }

    #[test]
    fn zigzag_matches_the_documented_mapping() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
        assert_eq!(zigzag(2), 4);
        assert_eq!(zigzag(i32::MAX), u32::MAX - 1);
        assert_eq!(zigzag(i32::MIN), u32::MAX);
        for v in [0, 1, -1, 123_456, -123_456, i32::MAX, i32::MIN] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }

    #[test]
    fn all_zero_block_compresses_to_one_bit_per_value() {
        let option = RiceCompressOption::new();
        let residuals = vec![0i32; 64];
        let (encoder, _) = codec_pair(&option);
        let stream = encoder.encode(&residuals).unwrap();
        // two blocks: 5-bit header + 32 unary terminators each
        assert_eq!(stream.len(), (2 * (5 + 32) + 7) / 8);
        roundtrip(&residuals, &option);
    }

    #[test]
    fn all_negative_roundtrip() {
        let option = RiceCompressOption::new();
        let residuals: Vec<i32> = (1..=80).map(|v| -v).collect();
        let codes = roundtrip(&residuals, &option);
        assert!(codes.iter().all(|c| matches!(c, BlockCode::Rice(_))));
    }

    #[test]
    fn extreme_magnitudes_roundtrip() {
        // a uniformly huge block is still Rice-codable with a large k
        let option = RiceCompressOption::new();
        let mut residuals = vec![i32::MAX, i32::MIN, 0, -1, 1];
        residuals.resize(32, i32::MAX);
        roundtrip(&residuals, &option);
    }

    #[test]
    fn extreme_value_amid_zeros_escapes() {
        let option = RiceCompressOption::new();
        let mut residuals = vec![0i32; 31];
        residuals.push(i32::MAX);
        let codes = roundtrip(&residuals, &option);
        assert_eq!(codes, vec![BlockCode::Escape]);
    }

    #[test]
    fn single_outlier_escapes_the_block() {
        let option = RiceCompressOption::new();
        let mut residuals = vec![0i32; 31];
        residuals.push(1_000_000);
        let codes = roundtrip(&residuals, &option);
        assert_eq!(codes, vec![BlockCode::Escape]);
    }

    #[test]
    fn small_residuals_stay_rice_coded() {
        let option = RiceCompressOption::new();
        let residuals: Vec<i32> = (0..96).map(|i| (i % 7) - 3).collect();
        let codes = roundtrip(&residuals, &option);
        assert_eq!(codes.len(), 3);
        assert!(codes.iter().all(|c| matches!(c, BlockCode::Rice(_))));
    }

    #[test]
    fn partial_final_block_uses_its_own_parameter() {
        let option = RiceCompressOption::new();
        // 32 small values, then 8 large ones in the short tail block
        let mut residuals: Vec<i32> = (0..32).map(|i| i % 3).collect();
        residuals.extend((0..8).map(|i| 5_000 + i));
        let codes = roundtrip(&residuals, &option);
        assert_eq!(codes.len(), 2);
        let (BlockCode::Rice(first), BlockCode::Rice(second)) = (codes[0], codes[1]) else {
            panic!("expected two rice-coded blocks, got {codes:?}");
        };
        assert!(second > first);
    }

    #[test]
    fn two_byte_elements_roundtrip() {
        let mut option = RiceCompressOption::new();
        option.set_byte_pix(2).unwrap();
        let residuals: Vec<i32> = (-40..40).map(|v| v * 100).collect();
        roundtrip(&residuals, &option);
    }

    #[test]
    fn residual_too_wide_for_element_is_rejected() {
        let mut option = RiceCompressOption::new();
        option.set_byte_pix(1).unwrap();
        let encoder = RiceEncoder::new(option);
        let err = encoder.encode(&[4_000]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn truncated_stream_reports_offset() {
        let option = RiceCompressOption::new();
        let residuals: Vec<i32> = (0..64).map(|i| i * 11).collect();
        let (encoder, decoder) = codec_pair(&option);
        let stream = encoder.encode(&residuals).unwrap();

        let err = decoder.decode(&stream[..stream.len() / 2], 64).unwrap_err();
        match err {
            Error::Codec { offset, .. } => assert!(offset <= stream.len() / 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn empty_input_produces_empty_stream() {
        let option = RiceCompressOption::new();
        let (encoder, decoder) = codec_pair(&option);
        let (stream, codes) = encoder.encode_blocks(&[]).unwrap();
        assert!(stream.is_empty());
        assert!(codes.is_empty());
        assert!(decoder.decode(&stream, 0).unwrap().is_empty());
    }
}
