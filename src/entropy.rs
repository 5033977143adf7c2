//! Entropy coding of integer residual streams.

mod bitio;
pub mod rice;

pub use rice::{RiceDecoder, RiceEncoder};
