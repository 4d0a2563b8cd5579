//! Error types for training.

use thiserror::Error;

/// Result type alias for training operations.
pub type Result<T> = std::result::Result<T, TrainError>;

/// Errors that can occur during training.
#[derive(Error, Debug)]
pub enum TrainError {
    /// The instance weight table does not cover the dataset.
    #[error("Weight table mismatch: expected {expected} weights (train + valid), got {got}")]
    WeightTableMismatch {
        /// Train size plus valid size.
        expected: usize,
        /// Length of the supplied table.
        got: usize,
    },

    /// The loss function has no reduction mode to switch.
    #[error("Loss function {0} does not expose a reduction mode")]
    MissingReduction(String),

    /// A callback or learner was configured with invalid arguments.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Loss computation failed.
    #[error("Loss error: {0}")]
    LossError(String),

    /// A piece of fit state was read before it was populated.
    #[error("Missing fit state: {0}")]
    MissingState(&'static str),

    /// Callback error.
    #[error("Callback error: {0}")]
    CallbackError(String),

    /// Data error.
    #[error("Data error: {0}")]
    DataError(#[from] tsaug_data::DataError),

    /// Core error.
    #[error("Core error: {0}")]
    CoreError(#[from] tsaug_core::CoreError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}
