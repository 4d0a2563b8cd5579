//! # tsaug_core
//!
//! Core types shared by the tsaug callback crates.
//!
//! This crate provides:
//! - [`Seed`] for deterministic, per-call random streams
//! - [`TSShape`], [`TSTensor`] and [`TSBatch`] for `(B, V, L)` batches
//! - [`Transform`] for batch augmentations and the optional [`Magnitude`]
//!   capability that schedulers query
//! - [`SharingStrategy`] for the process-wide tensor sharing setting
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsaug_core::{apply_all, Split, Transform};
//!
//! let picked: Vec<&dyn Transform<B>> = vec![&noise, &scale];
//! let view = apply_all(&picked, batch, Split::Train)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod seed;
mod sharing;
mod split;
mod tensor;
mod transform;

pub use error::{CoreError, Result};
pub use seed::Seed;
pub use sharing::{init_sharing_strategy, sharing_strategy, SharingStrategy};
pub use split::Split;
pub use tensor::{index_tensor, read_f32, TSBatch, TSShape, TSTensor};
pub use transform::{apply_all, Identity, Magnitude, Transform};

/// Backend type aliases for convenience
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;
}
