use std::fmt;

use burn::prelude::*;
use rand::seq::index::sample as sample_indices;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tsaug_core::{apply_all, index_tensor, read_f32, Seed, Split, TSBatch, TSTensor, Transform};

use super::{BatchModel, Callback, CallbackContext};
use crate::error::{Result, TrainError};
use crate::losses::{LossFunc, Reduction};

/// Configuration for [`UBDAug`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UBDAugConfig {
    /// Transforms composed into each candidate view.
    pub n: usize,
    /// Candidate views generated per sample.
    pub c: usize,
    /// Views kept per sample.
    pub s: usize,
    /// Seed for transform sampling.
    pub seed: Option<u64>,
}

impl Default for UBDAugConfig {
    fn default() -> Self {
        Self {
            n: 2,
            c: 4,
            s: 1,
            seed: None,
        }
    }
}

/// Retained views of one sample after the last batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSelection {
    /// `(candidate round, loss)` of each kept view, hardest first.
    pub retained: Vec<(usize, f32)>,
    /// Highest loss among the views that were dropped.
    pub max_discarded: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
struct Scored {
    candidate: usize,
    loss: f32,
}

/// Merge `new` into the running top-`s` of one sample.
///
/// Sorting is stable and descending, so an equal loss never displaces a view
/// that arrived earlier. NaN sorts above every number. Returns the highest
/// loss pushed out of the selection.
fn merge_top(kept: &mut Vec<Scored>, new: Scored, s: usize) -> Option<f32> {
    kept.push(new);
    kept.sort_by(|a, b| b.loss.total_cmp(&a.loss));
    kept.drain(s.min(kept.len())..)
        .map(|d| d.loss)
        .max_by(f32::total_cmp)
}

/// Uncertainty-based data augmentation.
///
/// For every training batch, `C` candidate views are built by applying `N`
/// randomly chosen pool transforms in sequence. Each view is scored with the
/// per-sample loss of the current model, and the `S` views with the highest
/// loss per sample replace the batch. With `S > 1` the batch grows to
/// `batch * S` rows laid out sample-major, and targets are repeated to match.
///
/// Validation batches pass through unchanged.
pub struct UBDAug<B: Backend> {
    pool: Vec<Box<dyn Transform<B>>>,
    config: UBDAugConfig,
    rng: ChaCha8Rng,
    last_selection: Vec<SampleSelection>,
}

impl<B: Backend> UBDAug<B> {
    /// Create the callback from a transform pool.
    ///
    /// `n` is clamped to the pool size and `s` to `1..=c`.
    pub fn new(pool: Vec<Box<dyn Transform<B>>>, config: UBDAugConfig) -> Result<Self> {
        if pool.is_empty() {
            return Err(TrainError::InvalidConfig(
                "UBDAug needs at least one candidate transform".to_string(),
            ));
        }
        if config.c == 0 {
            return Err(TrainError::InvalidConfig(
                "UBDAug needs at least one candidate view (c >= 1)".to_string(),
            ));
        }

        let config = UBDAugConfig {
            n: config.n.min(pool.len()),
            s: config.s.clamp(1, config.c),
            ..config
        };
        let seed = config.seed.map(Seed::new).unwrap_or_else(Seed::from_entropy);
        Ok(Self {
            pool,
            config,
            rng: seed.to_rng(),
            last_selection: Vec::new(),
        })
    }

    /// Effective configuration after clamping.
    pub fn config(&self) -> UBDAugConfig {
        self.config
    }

    /// Names of the pool transforms.
    pub fn transform_names(&self) -> Vec<&str> {
        self.pool.iter().map(|t| t.name()).collect()
    }

    /// Per-sample selection of the most recent training batch.
    pub fn last_selection(&self) -> &[SampleSelection] {
        &self.last_selection
    }

    fn score_candidates(
        &mut self,
        model: &dyn BatchModel<B>,
        loss_func: &dyn LossFunc<B>,
        batch: &TSBatch<B>,
        targets: &Tensor<B, 2>,
    ) -> Result<(Tensor<B, 3>, Vec<SampleSelection>)> {
        let bs = batch.batch_size();
        let [_, vars, len] = batch.x.shape().as_array();
        let s = self.config.s;

        let mut views: Vec<Option<Tensor<B, 3>>> = Vec::with_capacity(self.config.c);
        let mut kept: Vec<Vec<Scored>> = vec![Vec::with_capacity(s + 1); bs];
        let mut discarded: Vec<Option<f32>> = vec![None; bs];

        for candidate in 0..self.config.c {
            let picked = sample_indices(&mut self.rng, self.pool.len(), self.config.n).into_vec();
            let tfms: Vec<&dyn Transform<B>> = picked.iter().map(|&i| self.pool[i].as_ref()).collect();
            let view = apply_all(&tfms, batch.clone(), Split::Train)?;

            let pred = model.forward_no_grad(view.x.inner().clone());
            let losses = read_f32(loss_func.forward(pred, targets.clone())?)?;
            if losses.len() != bs {
                return Err(TrainError::LossError(format!(
                    "UBDAug expected {} per-sample losses, got {}",
                    bs,
                    losses.len()
                )));
            }

            views.push(Some(view.x.into_inner()));
            for (i, &loss) in losses.iter().enumerate() {
                if let Some(out) = merge_top(&mut kept[i], Scored { candidate, loss }, s) {
                    let worst = discarded[i].get_or_insert(out);
                    if out.total_cmp(worst).is_gt() {
                        *worst = out;
                    }
                }
            }

            for (id, slot) in views.iter_mut().enumerate() {
                if slot.is_some() && !kept.iter().flatten().any(|k| k.candidate == id) {
                    *slot = None;
                }
            }
        }

        let mut rows = Vec::with_capacity(bs * s);
        for (i, sample) in kept.iter().enumerate() {
            for k in sample {
                let view = views[k.candidate]
                    .as_ref()
                    .ok_or(TrainError::MissingState("retained candidate view"))?;
                rows.push(view.clone().slice([i..i + 1, 0..vars, 0..len]));
            }
        }

        let selection = kept
            .into_iter()
            .zip(discarded)
            .map(|(sample, max_discarded)| SampleSelection {
                retained: sample.iter().map(|k| (k.candidate, k.loss)).collect(),
                max_discarded,
            })
            .collect();
        Ok((Tensor::cat(rows, 0), selection))
    }
}

impl<B: Backend> fmt::Display for UBDAug<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UBDAug([{}])", self.transform_names().join(", "))
    }
}

impl<B: Backend> Callback<B> for UBDAug<B> {
    fn before_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        let loss = ctx.loss_func()?;
        let reduction = loss
            .reduction()
            .ok_or_else(|| TrainError::MissingReduction(loss.name().to_string()))?;
        tracing::info!(
            "{}: N={} C={} S={} (loss reduction {})",
            self,
            self.config.n,
            self.config.c,
            self.config.s,
            reduction
        );
        Ok(())
    }

    fn before_batch(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if !ctx.training {
            return Ok(());
        }
        let model = ctx.model;
        let batch = ctx.batch()?.clone();
        if batch.batch_size() == 0 {
            return Ok(());
        }
        let targets = batch.targets()?.clone();
        let original = {
            let loss = ctx.loss_func()?;
            loss.reduction()
                .ok_or_else(|| TrainError::MissingReduction(loss.name().to_string()))?
        };

        ctx.loss_func_mut()?.set_reduction(Reduction::None)?;
        let scored = match ctx.loss_func() {
            Ok(loss) => self.score_candidates(model, loss, &batch, &targets),
            Err(e) => Err(e),
        };
        let restored = ctx.loss_func_mut()?.set_reduction(original);
        let (x, selection) = scored?;
        restored?;

        let s = self.config.s;
        let targets = if s > 1 {
            let repeated: Vec<usize> = (0..batch.batch_size())
                .flat_map(|i| std::iter::repeat(i).take(s))
                .collect();
            targets.select(0, index_tensor::<B>(&repeated, &batch.device()))
        } else {
            targets
        };

        tracing::debug!(
            "UBDAug: batch {} expanded from {} to {} rows",
            ctx.iter,
            batch.batch_size(),
            x.dims()[0]
        );
        self.last_selection = selection;
        ctx.batch = Some(TSBatch::with_target(TSTensor::new(x)?, targets)?);
        Ok(())
    }

    fn name(&self) -> &str {
        "UBDAug"
    }
}
