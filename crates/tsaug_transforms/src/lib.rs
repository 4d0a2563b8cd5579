//! # tsaug_transforms
//!
//! Batch augmentations for `(B, V, L)` time series.
//!
//! Every augmentation except [`TSHorizontalFlip`] exposes its strength through
//! the [`Magnitude`](tsaug_core::Magnitude) capability, so a scheduler can
//! ramp it over training, and leaves the batch untouched when the magnitude is
//! zero or negative. All of them run on the training split only.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsaug_transforms::{TSMagScale, TSGaussianNoise};
//! use tsaug_core::{Seed, Split, Transform};
//!
//! let scale = TSMagScale::new(0.5).with_seed(Seed::new(1));
//! let batch = scale.apply(batch, Split::Train)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod augment;

pub use augment::*;
