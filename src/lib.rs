//! ricepack – tile compression for scientific image arrays.
//! -------------------------------------------------------------
//! Floating-point tiles are quantized to integer residuals
//! (optionally with reproducible subtractive dithering) and
//! entropy-coded by an adaptive block-wise Rice coder; tiles that
//! refuse to shrink are stored verbatim behind a one-byte tag.
//! -------------------------------------------------------------

mod codec;
pub mod entropy;
mod error;

pub use crate::codec::{
    compress_image, decompress_image, BlockCode, Codec, CodecParams, CompressOption,
    CompressParameters, CompressedTile, DitherStream, Quantization, QuantizeOption,
    QuantizeRiceCodec, QuantizeRiceCompressOption, Quantizer, RiceCompressOption, TileCompressor,
    TileDecompressor, DEFAULT_BLOCK_SIZE, DEFAULT_BYTE_PIX, NULL_RESIDUAL, TAG_RAW, TAG_RICE,
};
pub use crate::entropy::{RiceDecoder, RiceEncoder};
pub use crate::error::{Error, Result};

#[cfg(feature = "python")]
mod pybindings;
