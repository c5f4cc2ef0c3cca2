//! Error types for matrix and wire operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("matrix dimension mismatch: A is {0}x{1}, B is {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),

    #[error("matrix data has {len} elements, expected {rows}x{cols}")]
    Shape { rows: usize, cols: usize, len: usize },

    #[error("matrix dimensions must be positive, got {0}x{1} by {1}x{2}")]
    Empty(usize, usize, usize),

    #[error("product of {0}x{1} elements exceeds limit")]
    TooLarge(usize, usize),

    #[error("unknown multiplication strategy: {0}")]
    UnknownStrategy(String),

    #[error("frame decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
}
