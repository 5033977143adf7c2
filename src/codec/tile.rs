//! Tile-level orchestration: quantize, Rice-encode, raw fallback, and
//! the parallel whole-image grid.
//!
//! Public API
//! ----------
//! * [`TileCompressor`] / [`TileDecompressor`] – one tile at a time.
//! * [`compress_image`] / [`decompress_image`] – full tile grid with
//!   length-prefixed per-tile framing of the derived parameters.
//!
//! A tile stream opens with a one-byte tag: [`TAG_RICE`] for quantized
//! Rice-coded residuals, [`TAG_RAW`] for verbatim little-endian pixels.
//! The raw path caps worst-case expansion at the tag byte and is chosen
//! by size comparison, never as error recovery.

use std::cmp;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

use crate::codec::options::QuantizeRiceCompressOption;
use crate::codec::params::CompressParameters;
use crate::codec::quantize::Quantizer;
use crate::codec::{Codec, CodecParams, CompressOption};
use crate::entropy::rice::{RiceDecoder, RiceEncoder};
use crate::error::{Error, Result};

/// Storage tag: quantized Rice-coded residuals.
pub const TAG_RICE: u8 = 0x01;

/// Storage tag: verbatim little-endian f32 pixels.
pub const TAG_RAW: u8 = 0x00;

//───────────────────────────── SINGLE TILE ──────────────────────────────

/// One compressed tile plus the parameters derived while producing it.
#[derive(Debug, Clone)]
pub struct CompressedTile {
    pub data: Vec<u8>,
    pub parameters: CompressParameters,
}

pub struct TileCompressor {
    options: QuantizeRiceCompressOption,
}

impl TileCompressor {
    pub fn new(options: QuantizeRiceCompressOption) -> Self {
        TileCompressor { options }
    }

    pub fn options(&self) -> &QuantizeRiceCompressOption {
        &self.options
    }

    /// Compress one tile. `tile_index` is the tile's position in the
    /// image's row-major tile grid and keys the dither stream.
    pub fn compress(
        &self,
        tile: ArrayView2<'_, f32>,
        tile_index: usize,
    ) -> Result<CompressedTile> {
        let mut parameters =
            CompressParameters::derive(self.options.quantize(), self.options.rice());

        let quantizer = Quantizer::new(self.options.quantize().clone());
        let quantized = quantizer.quantize(tile, tile_index)?;

        let encoder = RiceEncoder::new(self.options.rice().clone());
        let (payload, codes) = encoder.encode_blocks(&quantized.residuals)?;
        parameters.record_quantization(quantized.scale, quantized.zero);
        parameters.record_block_codes(codes);

        let raw_len = tile.len() * std::mem::size_of::<f32>();
        let mut data = Vec::with_capacity(1 + payload.len().min(raw_len));
        if payload.len() >= raw_len {
            data.push(TAG_RAW);
            for &v in tile.iter() {
                data.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            data.push(TAG_RICE);
            data.extend_from_slice(&payload);
        }

        Ok(CompressedTile { data, parameters })
    }
}

pub struct TileDecompressor {
    options: QuantizeRiceCompressOption,
}

impl TileDecompressor {
    pub fn new(options: QuantizeRiceCompressOption) -> Self {
        TileDecompressor { options }
    }

    pub fn options(&self) -> &QuantizeRiceCompressOption {
        &self.options
    }

    /// Decompress one tile of `shape` (rows, cols). `parameters` is the
    /// record produced by [`TileCompressor::compress`], recovered from
    /// the caller's metadata channel; the values snapshotted there, not
    /// the current option state, drive the decode.
    pub fn decompress(
        &self,
        stream: &[u8],
        shape: (usize, usize),
        tile_index: usize,
        parameters: &CompressParameters,
    ) -> Result<Array2<f32>> {
        let (rows, cols) = shape;
        let count = rows * cols;
        let Some((&tag, payload)) = stream.split_first() else {
            return Err(Error::codec(0, "empty tile stream"));
        };

        match tag {
            TAG_RICE => {
                let mut rice = self.options.rice().clone();
                rice.set_block_size(parameters.block_size())?;
                rice.set_byte_pix(parameters.byte_pix())?;
                let decoder = RiceDecoder::new(rice);
                let residuals = decoder.decode(payload, count)?;

                let mut quantize = self.options.quantize().clone();
                quantize.set_dither_seed(parameters.dither_seed());
                let quantizer = Quantizer::new(quantize);
                quantizer.dequantize(
                    &residuals,
                    parameters.scale(),
                    parameters.zero(),
                    shape,
                    tile_index,
                )
            }
            TAG_RAW => {
                if payload.len() != count * std::mem::size_of::<f32>() {
                    return Err(Error::codec(
                        stream.len(),
                        format!(
                            "raw tile payload holds {} bytes, a {rows}x{cols} tile needs {}",
                            payload.len(),
                            count * std::mem::size_of::<f32>()
                        ),
                    ));
                }
                let pixels = payload
                    .chunks_exact(4)
                    .map(|chunk| {
                        let mut bytes = [0u8; 4];
                        bytes.copy_from_slice(chunk);
                        f32::from_le_bytes(bytes)
                    })
                    .collect();
                Array2::from_shape_vec(shape, pixels).map_err(|e| Error::config(e.to_string()))
            }
            other => Err(Error::Format {
                found: other,
                expected: "quantized-Rice or raw tile",
            }),
        }
    }
}

//────────────────────────────── TILE GRID ───────────────────────────────

/// Top-left corners of the row-major tile grid covering `shape`.
fn tile_grid(shape: (usize, usize), tile_height: usize, tile_width: usize) -> Vec<(usize, usize)> {
    let (height, width) = shape;
    (0..height)
        .step_by(tile_height)
        .flat_map(|r| (0..width).step_by(tile_width).map(move |c| (r, c)))
        .collect()
}

/// Compress a full image tile by tile, in parallel. Each tile record is
/// framed as two length-prefixed fields: the serialized
/// [`CompressParameters`] and the tile payload.
pub fn compress_image(
    data: ArrayView2<'_, f32>,
    options: &QuantizeRiceCompressOption,
) -> Result<Vec<u8>> {
    let (height, width) = data.dim();
    let tile_height = options.tile_height();
    let tile_width = options.tile_width();
    let tiles = tile_grid((height, width), tile_height, tile_width);

    let encoded: Vec<CompressedTile> = tiles
        .par_iter()
        .enumerate()
        .map(|(index, &(r, c))| {
            // every worker compresses with its own copy of the option graph
            let compressor = TileCompressor::new(options.clone());
            let r_end = cmp::min(r + tile_height, height);
            let c_end = cmp::min(c + tile_width, width);
            compressor.compress(data.slice(s![r..r_end, c..c_end]), index)
        })
        .collect::<Result<_>>()?;

    let mut stream = Vec::new();
    for tile in encoded {
        let params_bytes = tile.parameters.serialize()?;
        stream.write_u32::<LittleEndian>(params_bytes.len() as u32)?;
        stream.extend_from_slice(&params_bytes);
        stream.write_u32::<LittleEndian>(tile.data.len() as u32)?;
        stream.extend_from_slice(&tile.data);
    }
    Ok(stream)
}

/// Inverse of [`compress_image`] for an image of `shape` (rows, cols).
pub fn decompress_image(
    stream: &[u8],
    shape: (usize, usize),
    options: &QuantizeRiceCompressOption,
) -> Result<Array2<f32>> {
    let (height, width) = shape;
    let tile_height = options.tile_height();
    let tile_width = options.tile_width();
    let tiles = tile_grid(shape, tile_height, tile_width);

    // slice the stream into per-tile records before the parallel decode
    let mut cur = Cursor::new(stream);
    let read_prefixed = |cur: &mut Cursor<&[u8]>| -> Result<&[u8]> {
        let len = cur.read_u32::<LittleEndian>()? as usize;
        let start = cur.position() as usize;
        let end = start + len;
        if end > stream.len() {
            return Err(Error::codec(
                start,
                "tile record extends past the end of the stream",
            ));
        }
        cur.set_position(end as u64);
        Ok(&stream[start..end])
    };

    let mut records = Vec::with_capacity(tiles.len());
    for _ in &tiles {
        let params_bytes = read_prefixed(&mut cur)?;
        let payload = read_prefixed(&mut cur)?;
        records.push((params_bytes, payload));
    }

    let decoded: Vec<((usize, usize), Array2<f32>)> = tiles
        .into_par_iter()
        .zip(records.into_par_iter())
        .enumerate()
        .map(|(index, ((r, c), (params_bytes, payload)))| {
            let parameters = CompressParameters::read(params_bytes)?;
            let decompressor = TileDecompressor::new(options.clone());
            let r_end = cmp::min(r + tile_height, height);
            let c_end = cmp::min(c + tile_width, width);
            let tile = decompressor.decompress(
                payload,
                (r_end - r, c_end - c),
                index,
                &parameters,
            )?;
            Ok(((r, c), tile))
        })
        .collect::<Result<_>>()?;

    // single-threaded stitch
    let mut out = Array2::<f32>::zeros((height, width));
    for ((r, c), tile) in decoded {
        let (rows, cols) = tile.dim();
        out.slice_mut(s![r..r + rows, c..c + cols]).assign(&tile);
    }
    Ok(out)
}

//──────────────────────────── CODEC ADAPTER ─────────────────────────────

/// Whole-image quantize-then-Rice codec behind the [`Codec`] seam that
/// sibling entropy coders share.
#[derive(Debug, Clone)]
pub struct QuantizeRiceCodec {
    options: QuantizeRiceCompressOption,
}

impl QuantizeRiceCodec {
    pub fn new(options: QuantizeRiceCompressOption) -> Self {
        QuantizeRiceCodec { options }
    }

    pub fn options(&self) -> &QuantizeRiceCompressOption {
        &self.options
    }
}

impl Codec for QuantizeRiceCodec {
    type SourceType = f32;

    fn compress(&self, data: ArrayView2<f32>) -> Result<Vec<u8>> {
        compress_image(data, &self.options)
    }

    fn decompress(&self, stream: &[u8], shape: (usize, usize)) -> Result<Array2<f32>> {
        decompress_image(stream, shape, &self.options)
    }
}
