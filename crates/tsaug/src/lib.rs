//! # tsaug
//!
//! Augmentation-aware training callbacks for time series deep learning.
//!
//! tsaug bundles the pieces needed to train with scheduled and loss-guided
//! augmentation:
//!
//! - **Data handling**: datasets and dataloaders that keep original indices
//! - **Transforms**: magnitude-driven batch augmentations
//! - **Training**: a learner with a full event cycle and switchable losses
//! - **Callbacks**: magnitude scheduling, upper-bound augmentation,
//!   per-instance loss weighting and terminal loss plots
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tsaug::prelude::*;
//!
//! let dls = TSDataLoaders::builder(train_ds, valid_ds)
//!     .batch_size(32)
//!     .seed(Seed::new(42))
//!     .build()?;
//!
//! let pool: Vec<Box<dyn Transform<B>>> = vec![
//!     Box::new(TSMagScale::new(0.5)),
//!     Box::new(TSGaussianNoise::new(0.1)),
//!     Box::new(TSCutOut::new(0.2)),
//! ];
//! let ubd = UBDAug::new(pool, UBDAugConfig { n: 2, c: 4, s: 2, seed: Some(0) })?;
//!
//! let mut learner = Learner::new(model, dls, CrossEntropyLossFlat::new(), &device)
//!     .add_callback(ubd)
//!     .add_callback(ShowGraph::new());
//! learner.fit(25, step)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub use tsaug_core as core;
pub use tsaug_data as data;
pub use tsaug_train as train;
pub use tsaug_transforms as transforms;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use tsaug::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use tsaug_core::{Magnitude, Seed, SharingStrategy, Split, TSBatch, TSShape, TSTensor, Transform};

    // Data
    pub use tsaug_data::{TSDataLoader, TSDataLoaders, TSDataset};

    // Transforms
    pub use tsaug_transforms::{
        TSCutOut, TSGaussianNoise, TSHorizontalFlip, TSMagAddNoise, TSMagMulNoise, TSMagScale,
    };

    // Training
    pub use tsaug_train::{
        combine_scheds, sched_cos, sched_exp, sched_lin, sched_no, sched_poly, Accuracy,
        BatchModel, Callback, CallbackContext, CrossEntropyLossFlat, GamblersCallback, Learner,
        LearnerConfig, LossFunc, MSELossFlat, PerInstanceLoss, Reduction, ShowGraph,
        TransformScheduler, UBDAug, UBDAugConfig, WeightedPerSampleLoss, MAE, MSE,
    };
}

/// All module for importing everything.
pub mod all {
    pub use super::prelude::*;

    // Additional exports
    pub use tsaug_core::{apply_all, backend, init_sharing_strategy, read_f32, sharing_strategy, Identity};
    pub use tsaug_data::{LoadedBatch, TSDataLoaderBuilder, TSDataLoadersBuilder};
    pub use tsaug_train::{
        AsciiPlot, CallbackList, EpochValues, Event, FitState, FnLoss, Metric, Recorder,
        SampleSelection, ScheduleFn, ShowGraphConfig, TrainError,
    };
    pub use tsaug_transforms::MagnitudeConfig;
}
