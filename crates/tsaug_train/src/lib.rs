//! # tsaug_train
//!
//! Learner, callback system and augmentation-aware callbacks for tsaug.
//!
//! This crate provides:
//! - [`Learner`] driving the fit loop and its events
//! - [`Callback`] trait, [`CallbackList`] and [`CallbackContext`]
//! - Loss strategies with a switchable [`Reduction`] and the
//!   [`PerInstanceLoss`] decorator
//! - Schedule functions ([`sched_lin`], [`sched_cos`], ...)
//! - Callbacks: [`TransformScheduler`], [`UBDAug`],
//!   [`WeightedPerSampleLoss`], [`ShowGraph`], [`GamblersCallback`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use tsaug_train::{sched_cos, Learner, MSELossFlat, TransformScheduler, UBDAug, UBDAugConfig};
//!
//! let ubd = UBDAug::new(pool, UBDAugConfig { n: 2, c: 4, s: 2, seed: Some(0) })?;
//! let mut learner = Learner::new(model, dls, MSELossFlat::new(), &device)
//!     .add_callback(ubd)
//!     .add_callback(TransformScheduler::new(sched_cos(1.0, 0.0)));
//!
//! learner.fit(10, |model, loss, lr| step(model, loss, lr))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod callback;
pub mod error;
pub mod learner;
pub mod losses;
pub mod metrics;
pub mod plot;
pub mod recorder;
pub mod schedule;

pub use callback::{
    BatchModel, Callback, CallbackContext, CallbackList, Event, FitState, GamblersCallback,
    SampleSelection, ShowGraph, ShowGraphConfig, TransformScheduler, UBDAug, UBDAugConfig,
    WeightedPerSampleLoss,
};
pub use error::{Result, TrainError};
pub use learner::{Learner, LearnerConfig};
pub use losses::{CrossEntropyLossFlat, FnLoss, LossFunc, MSELossFlat, PerInstanceLoss, Reduction};
pub use metrics::{Accuracy, Metric, MAE, MSE};
pub use plot::AsciiPlot;
pub use recorder::{EpochValues, Recorder};
pub use schedule::{combine_scheds, sched_cos, sched_exp, sched_lin, sched_no, sched_poly, ScheduleFn};
