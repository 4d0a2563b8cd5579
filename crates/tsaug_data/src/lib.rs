//! # tsaug_data
//!
//! Datasets and dataloaders that remember where every sample came from.
//!
//! Each [`TSDataLoader`] keeps `split_idxs`, the stable index of every
//! position of its split in the original dataset, and each batch carries the
//! (shuffled) split positions it was drawn from. Together they let callbacks
//! map a batch back to per-instance tables such as loss weights.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsaug_data::{TSDataset, TSDataLoaders};
//! use tsaug_core::Seed;
//!
//! let dls = TSDataLoaders::from_splits(&dataset, &train_idxs, &valid_idxs)?
//!     .batch_size(32)
//!     .seed(Seed::new(42))
//!     .build()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod dataset;
mod error;
mod loader;

pub use dataset::TSDataset;
pub use error::{DataError, Result};
pub use loader::{
    LoadedBatch, TSDataLoader, TSDataLoaderBuilder, TSDataLoaderIter, TSDataLoaders,
    TSDataLoadersBuilder,
};
