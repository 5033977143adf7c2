//────────────────────────────── PARAMETERS ──────────────────────────────

//! Per-tile derived compression parameters (kept outside the bit-stream).
//!
//! `CompressParameters` bridges the quantizer and the entropy coder: it
//! is built in a second phase, after both option objects exist, and
//! snapshots the values each side needs from the other. Neither option
//! type refers to the other one.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::codec::options::{QuantizeOption, RiceCompressOption};
use crate::codec::CodecParams;
use crate::error::{Error, Result};

/// Wire byte marking an escaped block in a serialized parameter record.
const ESCAPE_CODE: u8 = 0xFF;

/// Entropy-coding choice recorded for one residual block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCode {
    /// Adaptive Rice parameter k.
    Rice(u8),
    /// Block stored at full element width.
    Escape,
}

/// Values computed while compressing one tile: the quantizer's
/// scale/zero pair and the Rice parameter chosen per block, together
/// with the option snapshots the stream was written under.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressParameters {
    scale: f64,
    zero: f64,
    dither_seed: i64,
    block_size: usize,
    byte_pix: usize,
    block_codes: Vec<BlockCode>,
}

impl CompressParameters {
    /// Second-phase constructor: snapshots the knobs both options
    /// contribute. Scale and zero start at the lossless identity and
    /// are filled in by the compressor.
    pub fn derive(quantize: &QuantizeOption, rice: &RiceCompressOption) -> Self {
        CompressParameters {
            scale: 1.0,
            zero: 0.0,
            dither_seed: quantize.dither_seed(),
            block_size: rice.block_size(),
            byte_pix: rice.byte_pix(),
            block_codes: Vec::new(),
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn zero(&self) -> f64 {
        self.zero
    }

    pub fn dither_seed(&self) -> i64 {
        self.dither_seed
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn byte_pix(&self) -> usize {
        self.byte_pix
    }

    /// Per-block coding decisions, in block order.
    pub fn block_codes(&self) -> &[BlockCode] {
        &self.block_codes
    }

    pub(crate) fn record_quantization(&mut self, scale: f64, zero: f64) {
        self.scale = scale;
        self.zero = zero;
    }

    pub(crate) fn record_block_codes(&mut self, block_codes: Vec<BlockCode>) {
        self.block_codes = block_codes;
    }
}

impl CodecParams for CompressParameters {
    fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(33 + self.block_codes.len());
        out.write_f64::<LittleEndian>(self.scale)?;
        out.write_f64::<LittleEndian>(self.zero)?;
        out.write_i64::<LittleEndian>(self.dither_seed)?;
        out.write_u32::<LittleEndian>(self.block_size as u32)?;
        out.write_u8(self.byte_pix as u8)?;
        out.write_u32::<LittleEndian>(self.block_codes.len() as u32)?;
        for code in &self.block_codes {
            out.write_u8(match code {
                BlockCode::Rice(k) => *k,
                BlockCode::Escape => ESCAPE_CODE,
            })?;
        }
        Ok(out)
    }

    fn read(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);
        let truncated =
            |cur: &Cursor<&[u8]>| Error::codec(cur.position() as usize, "truncated parameter record");

        let scale = cur.read_f64::<LittleEndian>().map_err(|_| truncated(&cur))?;
        let zero = cur.read_f64::<LittleEndian>().map_err(|_| truncated(&cur))?;
        let dither_seed = cur.read_i64::<LittleEndian>().map_err(|_| truncated(&cur))?;
        let block_size = cur.read_u32::<LittleEndian>().map_err(|_| truncated(&cur))? as usize;
        let byte_pix = cur.read_u8().map_err(|_| truncated(&cur))? as usize;
        let count = cur.read_u32::<LittleEndian>().map_err(|_| truncated(&cur))? as usize;

        if !matches!(byte_pix, 1 | 2 | 4) {
            return Err(Error::codec(
                cur.position() as usize,
                format!("parameter record carries unsupported byte_pix {byte_pix}"),
            ));
        }

        let mut block_codes = Vec::with_capacity(count);
        for _ in 0..count {
            let byte = cur.read_u8().map_err(|_| truncated(&cur))?;
            block_codes.push(match byte {
                ESCAPE_CODE => BlockCode::Escape,
                k => BlockCode::Rice(k),
            });
        }

        Ok(CompressParameters {
            scale,
            zero,
            dither_seed,
            block_size,
            byte_pix,
            block_codes,
        })
    }
}
