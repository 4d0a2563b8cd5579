//! Error types for tsaug_core.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by batch and transform operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Shape mismatch between tensors.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A batch has no target tensor where one is required.
    #[error("Batch has no targets")]
    MissingTargets,

    /// Transform error.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// Tensor data could not be read back to the host.
    #[error("Tensor data error: {0}")]
    DataReadError(String),
}
