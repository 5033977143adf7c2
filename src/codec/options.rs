//! Configuration options for the tile compression pipeline.
//!
//! Options are plain owned values: `Clone` produces a fully independent
//! deep copy (owned sub-options included), so every worker thread holds
//! its own option graph while tiles compress in parallel. Capability
//! queries ([`CompressOption::as_rice`] / [`CompressOption::as_quantize`])
//! stand in for downcasts: a caller holding a `&dyn CompressOption` asks
//! for the facet it needs and a composite option delegates the query to
//! the sub-option that satisfies it.

use crate::error::{Error, Result};

/// Default residuals per Rice block.
pub const DEFAULT_BLOCK_SIZE: usize = 32;

/// Default bytes per encoded residual element.
pub const DEFAULT_BYTE_PIX: usize = 4;

/// Default tile geometry when none has been configured yet.
const DEFAULT_TILE_DIM: usize = 32;

/// Tile-geometry contract shared by every compression option.
pub trait CompressOption: Send + Sync {
    fn tile_width(&self) -> usize;
    fn tile_height(&self) -> usize;
    fn set_tile_width(&mut self, width: usize) -> Result<()>;
    fn set_tile_height(&mut self, height: usize) -> Result<()>;

    /// Independent deep copy for handing to another worker.
    fn duplicate(&self) -> Box<dyn CompressOption>;

    /// Entropy-coder facet, if this option graph carries one.
    fn as_rice(&self) -> Option<&RiceCompressOption> {
        None
    }

    /// Quantizer facet, if this option graph carries one.
    fn as_quantize(&self) -> Option<&QuantizeOption> {
        None
    }
}

fn check_dim(name: &'static str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::config(format!("{name} must be positive")));
    }
    Ok(value)
}

//───────────────────────────── RICE OPTION ──────────────────────────────

/// Knobs of the adaptive Rice entropy coder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiceCompressOption {
    tile_width: usize,
    tile_height: usize,
    block_size: usize,
    byte_pix: usize,
    escape_limit: Option<u32>,
}

impl RiceCompressOption {
    pub fn new() -> Self {
        RiceCompressOption {
            tile_width: DEFAULT_TILE_DIM,
            tile_height: DEFAULT_TILE_DIM,
            block_size: DEFAULT_BLOCK_SIZE,
            byte_pix: DEFAULT_BYTE_PIX,
            escape_limit: None,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn byte_pix(&self) -> usize {
        self.byte_pix
    }

    /// Largest quotient a Rice-coded block may contain before the whole
    /// block escapes to fixed-width storage.
    pub fn escape_limit(&self) -> u32 {
        self.escape_limit
            .unwrap_or((self.byte_pix * 8) as u32)
    }

    pub fn set_tile_width(&mut self, width: usize) -> Result<&mut Self> {
        self.tile_width = check_dim("tile width", width)?;
        Ok(self)
    }

    pub fn set_tile_height(&mut self, height: usize) -> Result<&mut Self> {
        self.tile_height = check_dim("tile height", height)?;
        Ok(self)
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<&mut Self> {
        if block_size == 0 {
            return Err(Error::config("block size must be positive"));
        }
        self.block_size = block_size;
        Ok(self)
    }

    pub fn set_byte_pix(&mut self, byte_pix: usize) -> Result<&mut Self> {
        match byte_pix {
            1 | 2 | 4 => {
                self.byte_pix = byte_pix;
                Ok(self)
            }
            other => Err(Error::config(format!(
                "unsupported bytes per element {other}, expected 1, 2 or 4"
            ))),
        }
    }

    /// Override the escape bound; `None` restores the `byte_pix * 8`
    /// default.
    pub fn set_escape_limit(&mut self, limit: Option<u32>) -> Result<&mut Self> {
        if limit == Some(0) {
            return Err(Error::config("escape limit must be positive"));
        }
        self.escape_limit = limit;
        Ok(self)
    }
}

impl Default for RiceCompressOption {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressOption for RiceCompressOption {
    fn tile_width(&self) -> usize {
        self.tile_width
    }

    fn tile_height(&self) -> usize {
        self.tile_height
    }

    fn set_tile_width(&mut self, width: usize) -> Result<()> {
        RiceCompressOption::set_tile_width(self, width)?;
        Ok(())
    }

    fn set_tile_height(&mut self, height: usize) -> Result<()> {
        RiceCompressOption::set_tile_height(self, height)?;
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn CompressOption> {
        Box::new(self.clone())
    }

    fn as_rice(&self) -> Option<&RiceCompressOption> {
        Some(self)
    }
}

//─────────────────────────── QUANTIZE OPTION ────────────────────────────

/// Knobs of the float→integer quantizer.
#[derive(Debug, Clone)]
pub struct QuantizeOption {
    tile_width: usize,
    tile_height: usize,
    dither_seed: i64,
    quantize_level: f64,
    check_null: bool,
    null_value: f32,
}

impl QuantizeOption {
    pub fn new() -> Self {
        QuantizeOption {
            tile_width: DEFAULT_TILE_DIM,
            tile_height: DEFAULT_TILE_DIM,
            dither_seed: -1,
            quantize_level: 0.0,
            check_null: false,
            null_value: f32::NAN,
        }
    }

    /// Dither seed; negative disables dithering.
    pub fn dither_seed(&self) -> i64 {
        self.dither_seed
    }

    /// Explicit quantization step when positive; zero or negative asks
    /// for a scale derived from the tile's noise estimate.
    pub fn quantize_level(&self) -> f64 {
        self.quantize_level
    }

    pub fn check_null(&self) -> bool {
        self.check_null
    }

    /// Sentinel sample treated as null when [`Self::check_null`] is set.
    pub fn null_value(&self) -> f32 {
        self.null_value
    }

    pub fn set_tile_width(&mut self, width: usize) -> Result<&mut Self> {
        self.tile_width = check_dim("tile width", width)?;
        Ok(self)
    }

    pub fn set_tile_height(&mut self, height: usize) -> Result<&mut Self> {
        self.tile_height = check_dim("tile height", height)?;
        Ok(self)
    }

    pub fn set_dither_seed(&mut self, seed: i64) -> &mut Self {
        self.dither_seed = seed;
        self
    }

    pub fn set_quantize_level(&mut self, level: f64) -> Result<&mut Self> {
        if !level.is_finite() {
            return Err(Error::config("quantize level must be finite"));
        }
        self.quantize_level = level;
        Ok(self)
    }

    pub fn set_check_null(&mut self, check_null: bool) -> &mut Self {
        self.check_null = check_null;
        self
    }

    pub fn set_null_value(&mut self, null_value: f32) -> &mut Self {
        self.null_value = null_value;
        self
    }
}

impl Default for QuantizeOption {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for QuantizeOption {
    fn eq(&self, other: &Self) -> bool {
        self.tile_width == other.tile_width
            && self.tile_height == other.tile_height
            && self.dither_seed == other.dither_seed
            && self.quantize_level == other.quantize_level
            && self.check_null == other.check_null
            // the NaN sentinel compares by bit pattern
            && self.null_value.to_bits() == other.null_value.to_bits()
    }
}

impl CompressOption for QuantizeOption {
    fn tile_width(&self) -> usize {
        self.tile_width
    }

    fn tile_height(&self) -> usize {
        self.tile_height
    }

    fn set_tile_width(&mut self, width: usize) -> Result<()> {
        QuantizeOption::set_tile_width(self, width)?;
        Ok(())
    }

    fn set_tile_height(&mut self, height: usize) -> Result<()> {
        QuantizeOption::set_tile_height(self, height)?;
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn CompressOption> {
        Box::new(self.clone())
    }

    fn as_quantize(&self) -> Option<&QuantizeOption> {
        Some(self)
    }
}

//─────────────────────────── COMPOSITE OPTION ───────────────────────────

/// Composite option for the quantize-then-Rice pipeline.
///
/// Owns one [`QuantizeOption`] and one [`RiceCompressOption`]; the tile
/// geometry on the owned Rice option always equals the outer geometry,
/// so the two halves of the pipeline never disagree on tile shape. All
/// mutation goes through this type to keep that invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizeRiceCompressOption {
    quantize: QuantizeOption,
    rice: RiceCompressOption,
}

impl QuantizeRiceCompressOption {
    pub fn new() -> Self {
        QuantizeRiceCompressOption {
            quantize: QuantizeOption::new(),
            rice: RiceCompressOption::new(),
        }
    }

    pub fn quantize(&self) -> &QuantizeOption {
        &self.quantize
    }

    pub fn rice(&self) -> &RiceCompressOption {
        &self.rice
    }

    pub fn set_tile_width(&mut self, width: usize) -> Result<&mut Self> {
        self.quantize.set_tile_width(width)?;
        self.rice.set_tile_width(width)?;
        Ok(self)
    }

    pub fn set_tile_height(&mut self, height: usize) -> Result<&mut Self> {
        self.quantize.set_tile_height(height)?;
        self.rice.set_tile_height(height)?;
        Ok(self)
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<&mut Self> {
        self.rice.set_block_size(block_size)?;
        Ok(self)
    }

    pub fn set_byte_pix(&mut self, byte_pix: usize) -> Result<&mut Self> {
        self.rice.set_byte_pix(byte_pix)?;
        Ok(self)
    }

    pub fn set_escape_limit(&mut self, limit: Option<u32>) -> Result<&mut Self> {
        self.rice.set_escape_limit(limit)?;
        Ok(self)
    }

    pub fn set_dither_seed(&mut self, seed: i64) -> &mut Self {
        self.quantize.set_dither_seed(seed);
        self
    }

    pub fn set_quantize_level(&mut self, level: f64) -> Result<&mut Self> {
        self.quantize.set_quantize_level(level)?;
        Ok(self)
    }

    pub fn set_check_null(&mut self, check_null: bool) -> &mut Self {
        self.quantize.set_check_null(check_null);
        self
    }

    pub fn set_null_value(&mut self, null_value: f32) -> &mut Self {
        self.quantize.set_null_value(null_value);
        self
    }
}

impl Default for QuantizeRiceCompressOption {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressOption for QuantizeRiceCompressOption {
    fn tile_width(&self) -> usize {
        self.quantize.tile_width()
    }

    fn tile_height(&self) -> usize {
        self.quantize.tile_height()
    }

    fn set_tile_width(&mut self, width: usize) -> Result<()> {
        QuantizeRiceCompressOption::set_tile_width(self, width)?;
        Ok(())
    }

    fn set_tile_height(&mut self, height: usize) -> Result<()> {
        QuantizeRiceCompressOption::set_tile_height(self, height)?;
        Ok(())
    }

    fn duplicate(&self) -> Box<dyn CompressOption> {
        Box::new(self.clone())
    }

    fn as_rice(&self) -> Option<&RiceCompressOption> {
        // the outer option has no Rice facet of its own
        Some(&self.rice)
    }

    fn as_quantize(&self) -> Option<&QuantizeOption> {
        Some(&self.quantize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opt = QuantizeRiceCompressOption::new();
        assert_eq!(opt.rice().block_size(), 32);
        assert_eq!(opt.rice().byte_pix(), 4);
        assert_eq!(opt.rice().escape_limit(), 32);
        assert_eq!(opt.quantize().dither_seed(), -1);
        assert_eq!(opt.quantize().quantize_level(), 0.0);
        assert!(!opt.quantize().check_null());
        assert!(opt.quantize().null_value().is_nan());
    }

    #[test]
    fn geometry_stays_in_sync() {
        let mut opt = QuantizeRiceCompressOption::new();
        opt.set_tile_width(100).unwrap().set_tile_height(7).unwrap();

        assert_eq!(opt.tile_width(), 100);
        assert_eq!(opt.tile_height(), 7);
        assert_eq!(opt.rice().tile_width(), 100);
        assert_eq!(opt.rice().tile_height(), 7);
        assert_eq!(opt.quantize().tile_width(), 100);
    }

    #[test]
    fn copies_are_independent() {
        let mut original = QuantizeRiceCompressOption::new();
        original.set_tile_width(64).unwrap();
        original.set_block_size(16).unwrap();

        let mut copy = original.clone();
        copy.set_tile_width(8).unwrap();
        copy.set_block_size(4).unwrap();
        copy.set_dither_seed(99);

        assert_eq!(original.tile_width(), 64);
        assert_eq!(original.rice().tile_width(), 64);
        assert_eq!(original.rice().block_size(), 16);
        assert_eq!(original.quantize().dither_seed(), -1);
        assert_eq!(copy.rice().tile_width(), 8);
    }

    #[test]
    fn copy_of_copy_equals_copy() {
        let mut opt = QuantizeRiceCompressOption::new();
        opt.set_quantize_level(0.25).unwrap().set_check_null(true);
        let first = opt.clone();
        let second = first.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_bad_values() {
        let mut rice = RiceCompressOption::new();
        assert!(rice.set_byte_pix(3).is_err());
        assert!(rice.set_tile_width(0).is_err());
        assert!(rice.set_block_size(0).is_err());
        assert!(rice.set_escape_limit(Some(0)).is_err());

        let mut quant = QuantizeOption::new();
        assert!(quant.set_quantize_level(f64::NAN).is_err());
    }

    #[test]
    fn capability_queries_delegate() {
        let composite = QuantizeRiceCompressOption::new();
        assert!(composite.as_rice().is_some());
        assert!(composite.as_quantize().is_some());

        let rice = RiceCompressOption::new();
        assert!(rice.as_rice().is_some());
        assert!(rice.as_quantize().is_none());

        // queries survive type erasure and duplication
        let boxed: Box<dyn CompressOption> = composite.duplicate();
        assert_eq!(boxed.as_rice().unwrap().block_size(), 32);
        assert_eq!(boxed.as_quantize().unwrap().dither_seed(), -1);
    }

    #[test]
    fn escape_limit_tracks_byte_pix() {
        let mut rice = RiceCompressOption::new();
        rice.set_byte_pix(2).unwrap();
        assert_eq!(rice.escape_limit(), 16);
        rice.set_escape_limit(Some(48)).unwrap();
        assert_eq!(rice.escape_limit(), 48);
        rice.set_escape_limit(None).unwrap();
        assert_eq!(rice.escape_limit(), 16);
    }
}
