//! Float→integer tile quantization with reproducible dithering.
//!
//! A tile of `f32` samples maps to `i32` residuals through
//! `round((sample - zero) / scale + dither)`. Zero is the midpoint of
//! the tile's value range; scale is either the configured quantization
//! level or derived from a robust noise estimate. Dithering is lossy by
//! design: the decoder subtracts the identical offset, so the residual
//! quantization step stays the only error source.
//!
//! The dither stream is part of the wire contract so independent
//! implementations stay bit-compatible: SplitMix64 seeded with
//! `dither_seed XOR tile_index`, one draw per pixel position in
//! row-major order (null pixels consume a draw too), each 64-bit output
//! mapped to an offset in the open interval (-0.5, 0.5) as
//! `((z >> 11) + 0.5) / 2^53 - 0.5`.

use ndarray::{Array2, ArrayView2};

use crate::codec::options::QuantizeOption;
use crate::error::{Error, Result};

/// Reserved residual for null pixels; never produced when quantizing a
/// finite sample.
pub const NULL_RESIDUAL: i32 = i32::MIN + 1;

/// Ratio between the estimated background noise and the quantization
/// step when `quantize_level` asks for an automatic scale.
const DEFAULT_NOISE_RATIO: f64 = 4.0;

/// Median absolute successive difference of Gaussian noise, relative to
/// its standard deviation: sqrt(2) * probit(0.75).
const MEDIAN_DIFF_PER_SIGMA: f64 = 0.9539;

//──────────────────────────── DITHER STREAM ─────────────────────────────

/// Deterministic dither offsets for one tile.
#[derive(Debug, Clone)]
pub struct DitherStream {
    state: u64,
}

impl DitherStream {
    pub fn new(dither_seed: i64, tile_index: usize) -> Self {
        DitherStream {
            state: (dither_seed as u64) ^ (tile_index as u64),
        }
    }

    /// Next offset in (-0.5, 0.5).
    pub fn next_offset(&mut self) -> f64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // the half-step keeps the offset strictly inside the open interval
        (((z >> 11) as f64) + 0.5) / (1u64 << 53) as f64 - 0.5
    }
}

//────────────────────────────── QUANTIZER ───────────────────────────────

/// Output of [`Quantizer::quantize`]: residuals in row-major order plus
/// the scale/zero pair needed to invert them.
#[derive(Debug, Clone)]
pub struct Quantization {
    pub residuals: Vec<i32>,
    pub scale: f64,
    pub zero: f64,
}

#[derive(Debug, Clone)]
pub struct Quantizer {
    option: QuantizeOption,
}

impl Quantizer {
    pub fn new(option: QuantizeOption) -> Self {
        Quantizer { option }
    }

    fn is_null(&self, sample: f32) -> bool {
        if !self.option.check_null() {
            return false;
        }
        let null = self.option.null_value();
        sample == null || (sample.is_nan() && null.is_nan())
    }

    fn dither(&self, tile_index: usize) -> Option<DitherStream> {
        let seed = self.option.dither_seed();
        (seed >= 0).then(|| DitherStream::new(seed, tile_index))
    }

    /// Quantize one tile. `tile_index` is the tile's position in the
    /// image's row-major tile grid and keys the dither stream.
    pub fn quantize(&self, tile: ArrayView2<'_, f32>, tile_index: usize) -> Result<Quantization> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut valid = 0usize;
        for &v in tile.iter() {
            if self.is_null(v) {
                continue;
            }
            if !v.is_finite() {
                return Err(Error::quantization(format!(
                    "non-finite sample {v} with null handling disabled"
                )));
            }
            min = min.min(v as f64);
            max = max.max(v as f64);
            valid += 1;
        }

        let mut dither = self.dither(tile_index);
        let mut residuals = Vec::with_capacity(tile.len());

        if valid == 0 {
            // every pixel is null: nothing to scale
            for _ in 0..tile.len() {
                if let Some(d) = dither.as_mut() {
                    d.next_offset();
                }
                residuals.push(NULL_RESIDUAL);
            }
            return Ok(Quantization {
                residuals,
                scale: 1.0,
                zero: 0.0,
            });
        }

        let (scale, zero) = if min == max {
            // constant tile: residuals are exactly zero under unit scale
            (1.0, min)
        } else {
            let zero = 0.5 * (min + max);
            let level = self.option.quantize_level();
            let scale = if level > 0.0 {
                level
            } else {
                let sigma = self.noise_sigma(tile);
                if sigma == 0.0 {
                    1.0
                } else {
                    let ratio = if level < 0.0 { -level } else { DEFAULT_NOISE_RATIO };
                    sigma / ratio
                }
            };
            (scale, zero)
        };

        if !scale.is_finite() || scale <= 0.0 || !zero.is_finite() {
            return Err(Error::quantization(format!(
                "degenerate scale {scale} / zero {zero} for tile"
            )));
        }

        for &v in tile.iter() {
            let offset = dither.as_mut().map_or(0.0, DitherStream::next_offset);
            if self.is_null(v) {
                residuals.push(NULL_RESIDUAL);
                continue;
            }
            let r = ((v as f64 - zero) / scale + offset).round();
            if r < i32::MIN as f64 || r > i32::MAX as f64 {
                return Err(Error::quantization(format!(
                    "sample {v} quantizes outside the 32-bit residual range at scale {scale}"
                )));
            }
            let r = r as i32;
            if self.option.check_null() && r == NULL_RESIDUAL {
                return Err(Error::quantization(
                    "residual collides with the null sentinel",
                ));
            }
            residuals.push(r);
        }

        Ok(Quantization {
            residuals,
            scale,
            zero,
        })
    }

    /// Invert [`Self::quantize`] given the stored scale/zero pair.
    pub fn dequantize(
        &self,
        residuals: &[i32],
        scale: f64,
        zero: f64,
        shape: (usize, usize),
        tile_index: usize,
    ) -> Result<Array2<f32>> {
        let (rows, cols) = shape;
        if residuals.len() != rows * cols {
            return Err(Error::config(format!(
                "{} residuals do not fill a {rows}x{cols} tile",
                residuals.len()
            )));
        }

        let mut dither = self.dither(tile_index);
        let mut out = Vec::with_capacity(residuals.len());
        for &r in residuals {
            let offset = dither.as_mut().map_or(0.0, DitherStream::next_offset);
            if self.option.check_null() && r == NULL_RESIDUAL {
                out.push(self.option.null_value());
                continue;
            }
            out.push(((r as f64 - offset) * scale + zero) as f32);
        }

        Array2::from_shape_vec(shape, out).map_err(|e| Error::config(e.to_string()))
    }

    /// Robust background-noise estimate: median absolute difference of
    /// row-wise neighbouring samples, rescaled to a Gaussian sigma.
    fn noise_sigma(&self, tile: ArrayView2<'_, f32>) -> f64 {
        let mut diffs = Vec::with_capacity(tile.len());
        for row in tile.rows() {
            let mut prev: Option<f64> = None;
            for &v in row {
                if self.is_null(v) {
                    prev = None;
                    continue;
                }
                let v = v as f64;
                if let Some(p) = prev {
                    diffs.push((v - p).abs());
                }
                prev = Some(v);
            }
        }
        if diffs.is_empty() {
            return 0.0;
        }
        let mid = diffs.len() / 2;
        let (_, median, _) = diffs.select_nth_unstable_by(mid, f64::total_cmp);
        *median / MEDIAN_DIFF_PER_SIGMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn plain_quantizer() -> Quantizer {
        Quantizer::new(QuantizeOption::new())
    }

    #[test]
    fn constant_tile_uses_unit_scale() {
        let tile = Array2::from_elem((4, 4), 100.0f32);
        let q = plain_quantizer().quantize(tile.view(), 0).unwrap();
        assert_eq!(q.scale, 1.0);
        assert_eq!(q.zero, 100.0);
        assert!(q.residuals.iter().all(|&r| r == 0));

        let back = plain_quantizer()
            .dequantize(&q.residuals, q.scale, q.zero, (4, 4), 0)
            .unwrap();
        assert!(back.iter().all(|&v| v == 100.0));
    }

    #[test]
    fn roundtrip_stays_within_half_a_step() {
        let tile = array![
            [10.0f32, 10.4, 11.2, 9.7],
            [10.9, 10.1, 9.5, 10.6],
            [11.4, 9.9, 10.2, 10.8],
        ];
        let mut option = QuantizeOption::new();
        option.set_quantize_level(0.25).unwrap();
        let quantizer = Quantizer::new(option);

        let q = quantizer.quantize(tile.view(), 3).unwrap();
        assert_eq!(q.scale, 0.25);
        let back = quantizer
            .dequantize(&q.residuals, q.scale, q.zero, (3, 4), 3)
            .unwrap();
        for (&a, &b) in tile.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 0.125 + 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn automatic_scale_tracks_noise() {
        // sawtooth with a step of 0.2 on top of a slow ramp
        let tile = Array2::from_shape_fn((8, 8), |(r, c)| {
            (r as f32) * 0.01 + ((c % 5) as f32) * 0.2
        });
        let q = plain_quantizer().quantize(tile.view(), 0).unwrap();
        assert!(q.scale > 0.0 && q.scale < 0.2);

        let back = plain_quantizer()
            .dequantize(&q.residuals, q.scale, q.zero, (8, 8), 0)
            .unwrap();
        for (&a, &b) in tile.iter().zip(back.iter()) {
            assert!((a - b).abs() as f64 <= q.scale / 2.0 + 1e-6);
        }
    }

    #[test]
    fn dithering_is_reproducible_per_tile_index() {
        let tile = Array2::from_shape_fn((6, 6), |(r, c)| (r * 6 + c) as f32 * 0.3);
        let mut option = QuantizeOption::new();
        option.set_dither_seed(7).set_quantize_level(0.5).unwrap();
        let quantizer = Quantizer::new(option);

        let first = quantizer.quantize(tile.view(), 11).unwrap();
        let second = quantizer.quantize(tile.view(), 11).unwrap();
        assert_eq!(first.residuals, second.residuals);

        // a different tile index keys a different dither stream
        let mut a = DitherStream::new(7, 11);
        let mut b = DitherStream::new(7, 12);
        let left: Vec<f64> = (0..4).map(|_| a.next_offset()).collect();
        let right: Vec<f64> = (0..4).map(|_| b.next_offset()).collect();
        assert_ne!(left, right);
    }

    #[test]
    fn dither_subtraction_keeps_the_error_bound() {
        let tile = Array2::from_shape_fn((5, 7), |(r, c)| 50.0 + (r as f32) * 1.3 - (c as f32) * 0.7);
        let mut option = QuantizeOption::new();
        option.set_dither_seed(123).set_quantize_level(0.5).unwrap();
        let quantizer = Quantizer::new(option);

        let q = quantizer.quantize(tile.view(), 4).unwrap();
        let back = quantizer
            .dequantize(&q.residuals, q.scale, q.zero, (5, 7), 4)
            .unwrap();
        for (&a, &b) in tile.iter().zip(back.iter()) {
            assert!((a - b).abs() <= 0.25 + 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn null_sentinel_roundtrips_exactly() {
        let tile = array![[1.0f32, f32::NAN], [3.0, 4.0]];
        let mut option = QuantizeOption::new();
        option.set_check_null(true).set_quantize_level(0.5).unwrap();
        let quantizer = Quantizer::new(option);

        let q = quantizer.quantize(tile.view(), 0).unwrap();
        assert_eq!(q.residuals[1], NULL_RESIDUAL);

        let back = quantizer
            .dequantize(&q.residuals, q.scale, q.zero, (2, 2), 0)
            .unwrap();
        assert!(back[[0, 1]].is_nan());
        assert!((back[[1, 1]] - 4.0).abs() <= 0.25 + 1e-4);
    }

    #[test]
    fn nan_without_null_handling_is_an_error() {
        let tile = array![[1.0f32, f32::NAN]];
        let err = plain_quantizer().quantize(tile.view(), 0).unwrap_err();
        assert!(matches!(err, Error::Quantization(_)));
    }

    #[test]
    fn all_null_tile_quantizes_to_sentinels() {
        let tile = Array2::from_elem((3, 3), f32::NAN);
        let mut option = QuantizeOption::new();
        option.set_check_null(true);
        let quantizer = Quantizer::new(option);

        let q = quantizer.quantize(tile.view(), 0).unwrap();
        assert_eq!(q.scale, 1.0);
        assert_eq!(q.zero, 0.0);
        assert!(q.residuals.iter().all(|&r| r == NULL_RESIDUAL));

        let back = quantizer
            .dequantize(&q.residuals, q.scale, q.zero, (3, 3), 0)
            .unwrap();
        assert!(back.iter().all(|v| v.is_nan()));
    }
}
