use ndarray::{Array2, ArrayView2};

use crate::error::Result;

mod options;
mod params;
mod quantize;
mod tile;

pub use options::{
    CompressOption, QuantizeOption, QuantizeRiceCompressOption, RiceCompressOption,
    DEFAULT_BLOCK_SIZE, DEFAULT_BYTE_PIX,
};
pub use params::{BlockCode, CompressParameters};
pub use quantize::{DitherStream, Quantization, Quantizer, NULL_RESIDUAL};
pub use tile::{
    compress_image, decompress_image, CompressedTile, QuantizeRiceCodec, TileCompressor,
    TileDecompressor, TAG_RAW, TAG_RICE,
};

/// One-shot codec over a full 2-D image.
///
/// Sibling entropy coders implement this trait (and drive their own
/// [`CompressOption`] graph) so callers can swap algorithms without
/// branching on a concrete type.
pub trait Codec: Send + Sync {
    type SourceType: Copy + 'static;

    /// Compress the full 2-D data array into one byte stream.
    fn compress(&self, data: ArrayView2<Self::SourceType>) -> Result<Vec<u8>>;

    /// Decompress `stream` back to an array of shape `shape` (rows, cols).
    fn decompress(&self, stream: &[u8], shape: (usize, usize)) -> Result<Array2<Self::SourceType>>;
}

/// Codec parameters that live outside the bit stream: serializable to
/// bytes for the caller's metadata channel, and readable back from it.
pub trait CodecParams: Send + Sync {
    /// Serialize the parameters into a `Vec<u8>`.
    fn serialize(&self) -> Result<Vec<u8>>;

    /// Read (deserialize) the parameters from a byte slice.
    fn read(data: &[u8]) -> Result<Self>
    where
        Self: Sized;
}
