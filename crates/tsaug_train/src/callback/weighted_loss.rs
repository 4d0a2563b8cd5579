use burn::prelude::*;

use super::{Callback, CallbackContext};
use crate::error::{Result, TrainError};
use crate::losses::{PerInstanceLoss, Reduction};

/// Weights each sample's loss by a fixed per-instance table.
///
/// The table is indexed by original dataset index over train and valid
/// together, so its length must equal the combined size of both splits. For
/// the duration of the fit the loss function is wrapped in a
/// [`PerInstanceLoss`]; the original loss and its reduction come back when
/// the fit ends.
#[derive(Debug, Clone)]
pub struct WeightedPerSampleLoss {
    weights: Vec<f32>,
    reduction: Option<Reduction>,
    installed: bool,
}

impl WeightedPerSampleLoss {
    /// Create the callback from a weight table.
    pub fn new(weights: Vec<f32>) -> Self {
        Self {
            weights,
            reduction: None,
            installed: false,
        }
    }

    /// The weight table.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }
}

impl<B: Backend> Callback<B> for WeightedPerSampleLoss {
    fn before_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        let expected = ctx.n_train() + ctx.n_valid();
        if self.weights.len() != expected {
            return Err(TrainError::WeightTableMismatch {
                expected,
                got: self.weights.len(),
            });
        }

        let loss = ctx.loss_func_mut()?;
        let reduction = loss
            .reduction()
            .ok_or_else(|| TrainError::MissingReduction(loss.name().to_string()))?;
        loss.set_reduction(Reduction::None)?;

        let inner = ctx
            .loss_func
            .take()
            .ok_or(TrainError::MissingState("loss function"))?;
        let name = inner.name().to_string();
        ctx.loss_func = Some(Box::new(PerInstanceLoss::new(inner)?));
        self.reduction = Some(reduction);
        self.installed = true;

        tracing::info!(
            "WeightedPerSampleLoss: weighting {} over {} instances",
            name,
            expected
        );
        Ok(())
    }

    fn before_batch(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if !self.installed {
            return Ok(());
        }
        let weights = ctx
            .original_batch_idxs()?
            .into_iter()
            .map(|idx| {
                self.weights.get(idx).copied().ok_or_else(|| {
                    TrainError::Other(format!(
                        "dataset index {idx} outside weight table of {}",
                        self.weights.len()
                    ))
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        ctx.loss_func_mut()?.set_instance_weights(weights)
    }

    fn after_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if !std::mem::take(&mut self.installed) {
            return Ok(());
        }
        let Some(mut current) = ctx.loss_func.take() else {
            tracing::warn!("WeightedPerSampleLoss: loss slot was emptied during the fit");
            return Ok(());
        };

        match current.take_inner() {
            Some(mut inner) => {
                let restored = match self.reduction.take() {
                    Some(reduction) => inner.set_reduction(reduction),
                    None => Ok(()),
                };
                ctx.loss_func = Some(inner);
                restored
            }
            None => {
                tracing::warn!(
                    "WeightedPerSampleLoss: expected the weighting wrapper, found {}; leaving it in place",
                    current.name()
                );
                ctx.loss_func = Some(current);
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "WeightedPerSampleLoss"
    }
}
