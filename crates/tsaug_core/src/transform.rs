//! Transform trait and the magnitude capability.

use burn::prelude::*;

use crate::error::Result;
use crate::split::Split;
use crate::tensor::TSBatch;

/// Strength parameter of an augmentation.
///
/// Transforms opt into magnitude scheduling by implementing this trait and
/// returning `Some(self)` from [`Transform::as_magnitude_mut`]. Schedulers
/// discover and rescale magnitudes through that accessor only.
pub trait Magnitude {
    /// Current magnitude.
    fn magnitude(&self) -> f32;

    /// Overwrite the magnitude.
    fn set_magnitude(&mut self, magnitude: f32);
}

/// A transform applied to whole batches.
///
/// Transforms are owned by the learner's batch pipeline or by a callback's
/// candidate pool. They take `&self` so the same instance can be applied
/// several times per batch.
///
/// # Example
///
/// ```rust,ignore
/// use tsaug_core::{Magnitude, Split, TSBatch, Transform, Result};
///
/// struct Shift { magnitude: f32 }
///
/// impl Magnitude for Shift {
///     fn magnitude(&self) -> f32 { self.magnitude }
///     fn set_magnitude(&mut self, m: f32) { self.magnitude = m }
/// }
///
/// impl<B: Backend> Transform<B> for Shift {
///     fn apply(&self, batch: TSBatch<B>, _split: Split) -> Result<TSBatch<B>> {
///         let x = batch.x.clone().into_inner() + self.magnitude;
///         Ok(batch.with_inputs(TSTensor::new(x)?))
///     }
///     fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> { Some(self) }
/// }
/// ```
pub trait Transform<B: Backend>: Send + Sync {
    /// Apply the transform to a batch.
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>>;

    /// Name of this transform for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether the transform runs for the given split.
    fn should_apply(&self, _split: Split) -> bool {
        true
    }

    /// Read access to the magnitude capability through a shared reference.
    ///
    /// Optional. Override it next to [`Transform::as_magnitude_mut`] when
    /// callers need to inspect magnitudes without mutable access.
    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        None
    }

    /// Write access to the magnitude capability, if supported.
    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        None
    }
}

/// Apply borrowed transforms in order, skipping those that opt out of `split`.
pub fn apply_all<B: Backend>(
    transforms: &[&dyn Transform<B>],
    mut batch: TSBatch<B>,
    split: Split,
) -> Result<TSBatch<B>> {
    for transform in transforms {
        if transform.should_apply(split) {
            batch = transform.apply(batch, split)?;
        }
    }
    Ok(batch)
}

/// Identity transform that passes data through unchanged.
#[derive(Debug, Clone, Default)]
pub struct Identity;

impl<B: Backend> Transform<B> for Identity {
    fn apply(&self, batch: TSBatch<B>, _split: Split) -> Result<TSBatch<B>> {
        Ok(batch)
    }

    fn name(&self) -> &str {
        "Identity"
    }
}
