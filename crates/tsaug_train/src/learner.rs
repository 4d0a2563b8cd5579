//! Learner driving the fit loop and its callback events.

use std::collections::HashMap;

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tsaug_core::{init_sharing_strategy, read_f32, sharing_strategy, SharingStrategy, Split, TSBatch, Transform};
use tsaug_data::{LoadedBatch, TSDataLoaders};

use crate::callback::{BatchModel, Callback, CallbackContext, CallbackList, Event, FitState};
use crate::error::{Result, TrainError};
use crate::losses::LossFunc;
use crate::metrics::Metric;
use crate::recorder::{EpochValues, Recorder};

/// Configuration for the Learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Learning rate handed to the step function.
    pub lr: f64,
    /// Process-wide sharing strategy to initialise at fit start.
    pub sharing_strategy: Option<SharingStrategy>,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            sharing_strategy: None,
        }
    }
}

/// Learner manages model training.
///
/// The learner owns the model, dataloaders, loss function, batch transform
/// pipeline and callbacks. Gradient handling stays with the caller: `fit`
/// hands every training loss to a step function that updates the model.
///
/// # Example
///
/// ```rust,ignore
/// let mut learner = Learner::new(model, dls, MSELossFlat::new(), &device)
///     .add_batch_tfm(TSMagScale::new(0.5))
///     .add_callback(TransformScheduler::new(sched_cos(1.0, 0.0)));
///
/// learner.fit(10, |model, loss, lr| {
///     let grads = GradientsParams::from_grads(loss.backward(), model);
///     *model = optim.step(lr, model.clone(), grads);
///     Ok(())
/// })?;
/// ```
pub struct Learner<B: Backend, M: BatchModel<B>> {
    model: M,
    dls: TSDataLoaders,
    loss_func: Option<Box<dyn LossFunc<B>>>,
    batch_tfms: Vec<Box<dyn Transform<B>>>,
    callbacks: CallbackList<B>,
    metrics: Vec<Box<dyn Metric<B>>>,
    recorder: Recorder,
    config: LearnerConfig,
    device: B::Device,
    lr_finder: bool,
    gather_preds: bool,
}

impl<B: Backend, M: BatchModel<B>> Learner<B, M> {
    /// Create a new Learner.
    pub fn new<L: LossFunc<B> + 'static>(model: M, dls: TSDataLoaders, loss_func: L, device: &B::Device) -> Self {
        Self {
            model,
            dls,
            loss_func: Some(Box::new(loss_func)),
            batch_tfms: Vec::new(),
            callbacks: CallbackList::new(),
            metrics: Vec::new(),
            recorder: Recorder::new(),
            config: LearnerConfig::default(),
            device: device.clone(),
            lr_finder: false,
            gather_preds: false,
        }
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: LearnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a callback.
    #[must_use]
    pub fn add_callback<C: Callback<B> + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add(callback);
        self
    }

    /// Add a metric computed on every validation pass.
    #[must_use]
    pub fn add_metric<T: Metric<B> + 'static>(mut self, metric: T) -> Self {
        self.metrics.push(Box::new(metric));
        self
    }

    /// Append a transform to the batch pipeline.
    #[must_use]
    pub fn add_batch_tfm<T: Transform<B> + 'static>(mut self, tfm: T) -> Self {
        self.batch_tfms.push(Box::new(tfm));
        self
    }

    /// Replace the batch pipeline.
    #[must_use]
    pub fn with_batch_tfms(mut self, tfms: Vec<Box<dyn Transform<B>>>) -> Self {
        self.batch_tfms = tfms;
        self
    }

    /// Mark fits as a learning rate search.
    #[must_use]
    pub fn with_lr_finder(mut self, lr_finder: bool) -> Self {
        self.lr_finder = lr_finder;
        self
    }

    /// Mark fits as prediction gathering.
    #[must_use]
    pub fn with_gather_preds(mut self, gather_preds: bool) -> Self {
        self.gather_preds = gather_preds;
        self
    }

    /// The model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// The model, mutably.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Consume the learner and return the model.
    pub fn into_model(self) -> M {
        self.model
    }

    /// Dataloaders.
    pub fn dls(&self) -> &TSDataLoaders {
        &self.dls
    }

    /// The loss function, if present.
    pub fn loss_func(&self) -> Option<&dyn LossFunc<B>> {
        self.loss_func.as_deref()
    }

    /// The batch transform pipeline.
    pub fn batch_tfms(&self) -> &[Box<dyn Transform<B>>] {
        &self.batch_tfms
    }

    /// Registered callbacks.
    pub fn callbacks(&self) -> &CallbackList<B> {
        &self.callbacks
    }

    /// History of the last fit.
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Configuration.
    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Train for `n_epochs`.
    ///
    /// `step` receives the model, the loss of every training batch and the
    /// learning rate. `after_fit` runs even when a hook, the loss or `step`
    /// fails; the first error is returned after it. The loss function and
    /// batch pipeline are handed back to the learner in either case.
    pub fn fit<S>(&mut self, n_epochs: usize, mut step: S) -> Result<()>
    where
        S: FnMut(&mut M, Tensor<B, 1>, f64) -> Result<()>,
    {
        if let Some(strategy) = self.config.sharing_strategy {
            init_sharing_strategy(strategy);
        }

        let mut state = FitState::new(n_epochs, self.dls.train().n_batches());
        state.lr = self.config.lr;
        state.train_split_idxs = self.dls.train().split_idxs().to_vec();
        state.valid_split_idxs = self.dls.valid().split_idxs().to_vec();
        state.loss_func = self.loss_func.take();
        state.batch_tfms = std::mem::take(&mut self.batch_tfms);
        state.lr_finder = self.lr_finder;
        state.gather_preds = self.gather_preds;

        tracing::info!(
            "Starting fit: {} epochs x {} batches ({} train / {} valid samples, sharing strategy {:?})",
            n_epochs,
            state.n_iter,
            state.n_train(),
            state.n_valid(),
            sharing_strategy()
        );
        tracing::debug!("Callbacks: {:?}", self.callbacks.names());

        let result = self.run_fit(&mut state, &mut step);
        let after = emit(&mut self.callbacks, &self.model, &mut state, Event::AfterFit);

        self.loss_func = state.loss_func.take();
        self.batch_tfms = std::mem::take(&mut state.batch_tfms);
        self.recorder = std::mem::take(&mut state.recorder);

        match &result {
            Ok(()) => tracing::info!("Fit finished after {} training steps", state.train_iter),
            Err(e) => tracing::warn!("Fit aborted in epoch {}: {}", state.epoch, e),
        }
        result.and(after)
    }

    fn run_fit<S>(&mut self, state: &mut FitState<B>, step: &mut S) -> Result<()>
    where
        S: FnMut(&mut M, Tensor<B, 1>, f64) -> Result<()>,
    {
        emit(&mut self.callbacks, &self.model, state, Event::BeforeFit)?;

        for epoch in 0..state.n_epochs {
            state.epoch = epoch;
            emit(&mut self.callbacks, &self.model, state, Event::BeforeEpoch)?;

            state.training = true;
            emit(&mut self.callbacks, &self.model, state, Event::BeforeTrain)?;
            let mut train_total = 0.0f64;
            let mut train_rows = 0usize;
            for (iter, item) in self.dls.train().iter::<B>(epoch, &self.device).enumerate() {
                state.iter = iter;
                let LoadedBatch { batch, idxs } = item?;
                let rows = idxs.len();
                let batch = apply_pipeline(&state.batch_tfms, batch, Split::Train)?;
                let outcome = one_batch(
                    &mut self.callbacks,
                    &mut self.model,
                    state,
                    batch,
                    idxs,
                    Some(&mut *step),
                )?;
                if let Some((loss, _, _)) = outcome {
                    train_total += f64::from(loss) * rows as f64;
                    train_rows += rows;
                }
            }
            emit(&mut self.callbacks, &self.model, state, Event::AfterTrain)?;
            let train_loss = if train_rows > 0 {
                (train_total / train_rows as f64) as f32
            } else {
                f32::NAN
            };
            state.train_loss = Some(train_loss);

            state.training = false;
            emit(&mut self.callbacks, &self.model, state, Event::BeforeValidate)?;
            let mut valid_total = 0.0f64;
            let mut valid_rows = 0usize;
            let mut preds = Vec::new();
            let mut targets = Vec::new();
            for (iter, item) in self.dls.valid().iter::<B>(epoch, &self.device).enumerate() {
                state.iter = iter;
                let LoadedBatch { batch, idxs } = item?;
                let rows = idxs.len();
                let batch = apply_pipeline(&state.batch_tfms, batch, Split::Valid)?;
                let outcome = one_batch::<B, M, S>(
                    &mut self.callbacks,
                    &mut self.model,
                    state,
                    batch,
                    idxs,
                    None,
                )?;
                if let Some((loss, pred, target)) = outcome {
                    valid_total += f64::from(loss) * rows as f64;
                    valid_rows += rows;
                    preds.push(pred);
                    targets.push(target);
                }
            }
            emit(&mut self.callbacks, &self.model, state, Event::AfterValidate)?;

            state.valid_loss = (valid_rows > 0).then(|| (valid_total / valid_rows as f64) as f32);
            state.metrics = if preds.is_empty() {
                HashMap::new()
            } else {
                let preds = Tensor::cat(preds, 0);
                let targets = Tensor::cat(targets, 0);
                let mut metrics = HashMap::new();
                for metric in &self.metrics {
                    metrics.insert(metric.name().to_string(), metric.compute(&preds, &targets)?);
                }
                metrics
            };
            state.recorder.values.push(EpochValues {
                epoch,
                train_loss,
                valid_loss: state.valid_loss,
                metrics: state.metrics.clone(),
            });

            tracing::info!(
                "Epoch {}/{}: train_loss={:.4}, valid_loss={}",
                epoch + 1,
                state.n_epochs,
                train_loss,
                state
                    .valid_loss
                    .map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
            );
            emit(&mut self.callbacks, &self.model, state, Event::AfterEpoch)?;

            if state.stop_training {
                tracing::info!("Stopping after epoch {}", epoch + 1);
                break;
            }
        }
        Ok(())
    }
}

fn emit<B: Backend, M: BatchModel<B>>(
    callbacks: &mut CallbackList<B>,
    model: &M,
    state: &mut FitState<B>,
    event: Event,
) -> Result<()> {
    let mut ctx = CallbackContext::new(model, state);
    callbacks.run(event, &mut ctx)
}

fn apply_pipeline<B: Backend>(
    tfms: &[Box<dyn Transform<B>>],
    mut batch: TSBatch<B>,
    split: Split,
) -> Result<TSBatch<B>> {
    for tfm in tfms {
        if tfm.should_apply(split) {
            batch = tfm.apply(batch, split)?;
        }
    }
    Ok(batch)
}

/// Run one batch through the events. Returns the loss value with the final
/// prediction and targets, or `None` when a callback skipped the batch.
fn one_batch<B, M, S>(
    callbacks: &mut CallbackList<B>,
    model: &mut M,
    state: &mut FitState<B>,
    batch: TSBatch<B>,
    idxs: Vec<usize>,
    step: Option<&mut S>,
) -> Result<Option<(f32, Tensor<B, 2>, Tensor<B, 2>)>>
where
    B: Backend,
    M: BatchModel<B>,
    S: FnMut(&mut M, Tensor<B, 1>, f64) -> Result<()>,
{
    state.batch = Some(batch);
    state.batch_idxs = idxs;
    state.pred = None;
    state.loss = None;
    state.skip_batch = false;
    emit(callbacks, &*model, state, Event::BeforeBatch)?;

    let mut outcome = None;
    if !state.skip_batch {
        let batch = state.batch()?;
        let x = batch.x.inner().clone();
        let target = batch.targets()?.clone();
        let pred = if state.training {
            model.forward(x)
        } else {
            model.forward_no_grad(x)
        };
        state.pred = Some(pred.clone());
        emit(callbacks, &*model, state, Event::AfterPred)?;

        let pred = state.pred.clone().ok_or(TrainError::MissingState("prediction"))?;
        let loss = state.loss_func()?.forward(pred, target.clone())?;
        state.loss = Some(loss);
        emit(callbacks, &*model, state, Event::AfterLoss)?;

        let loss = state.loss.clone().ok_or(TrainError::MissingState("loss"))?;
        let value = read_f32(loss.clone())?
            .first()
            .copied()
            .ok_or_else(|| TrainError::LossError("loss is empty".to_string()))?;
        if state.training {
            state.recorder.losses.push(value);
        }
        if let Some(step) = step {
            step(model, loss, state.lr)?;
        }

        let pred = state.pred.clone().ok_or(TrainError::MissingState("prediction"))?;
        outcome = Some((value, pred, target));
    }

    if state.training {
        state.train_iter += 1;
    }
    emit(callbacks, &*model, state, Event::AfterBatch)?;
    Ok(outcome)
}
