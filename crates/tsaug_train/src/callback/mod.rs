//! Callback system for training.
//!
//! Callbacks observe and modify the fit loop at fixed events. Every hook gets
//! a [`CallbackContext`], which reads as the learner's [`FitState`] and also
//! carries a shared borrow of the model.

mod gamblers;
mod show_graph;
mod transform_scheduler;
mod ubdaug;
mod weighted_loss;

pub use gamblers::GamblersCallback;
pub use show_graph::{ShowGraph, ShowGraphConfig};
pub use transform_scheduler::TransformScheduler;
pub use ubdaug::{SampleSelection, UBDAug, UBDAugConfig};
pub use weighted_loss::WeightedPerSampleLoss;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

use burn::prelude::*;
use tsaug_core::{TSBatch, Transform};

use crate::error::{Result, TrainError};
use crate::losses::LossFunc;
use crate::recorder::Recorder;

/// A model the learner can run on a batch of series.
pub trait BatchModel<B: Backend> {
    /// Forward pass producing `[batch, out]`.
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2>;

    /// Forward pass outside the autodiff graph.
    fn forward_no_grad(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        self.forward(x.detach()).detach()
    }
}

impl<B, F> BatchModel<B> for F
where
    B: Backend,
    F: Fn(Tensor<B, 3>) -> Tensor<B, 2>,
{
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        self(x)
    }
}

/// Mutable state of a running fit.
pub struct FitState<B: Backend> {
    /// Current epoch (0-indexed).
    pub epoch: usize,
    /// Number of epochs requested.
    pub n_epochs: usize,
    /// Batch index within the current phase.
    pub iter: usize,
    /// Training batches per epoch.
    pub n_iter: usize,
    /// Training batches processed so far across the fit.
    pub train_iter: usize,
    /// Whether the current phase is training.
    pub training: bool,
    /// Learning rate.
    pub lr: f64,
    /// Current batch.
    pub batch: Option<TSBatch<B>>,
    /// Positions of the current batch rows within their split.
    pub batch_idxs: Vec<usize>,
    /// Training position to original dataset index.
    pub train_split_idxs: Vec<usize>,
    /// Validation position to original dataset index.
    pub valid_split_idxs: Vec<usize>,
    /// Prediction of the current batch.
    pub pred: Option<Tensor<B, 2>>,
    /// Loss of the current batch.
    pub loss: Option<Tensor<B, 1>>,
    /// Mean training loss of the last finished training phase.
    pub train_loss: Option<f32>,
    /// Mean validation loss of the last finished validation phase.
    pub valid_loss: Option<f32>,
    /// Metrics of the last finished validation phase.
    pub metrics: HashMap<String, f32>,
    /// History of the fit.
    pub recorder: Recorder,
    /// Loss function slot.
    pub loss_func: Option<Box<dyn LossFunc<B>>>,
    /// Batch transform pipeline.
    pub batch_tfms: Vec<Box<dyn Transform<B>>>,
    /// Set to end the fit after the current epoch.
    pub stop_training: bool,
    /// Set in `before_batch` to skip forward and step for the batch.
    pub skip_batch: bool,
    /// The fit is a learning rate search.
    pub lr_finder: bool,
    /// The fit is only gathering predictions.
    pub gather_preds: bool,
}

impl<B: Backend> FitState<B> {
    /// Create state for a fit of `n_epochs` epochs of `n_iter` batches.
    pub fn new(n_epochs: usize, n_iter: usize) -> Self {
        Self {
            epoch: 0,
            n_epochs,
            iter: 0,
            n_iter,
            train_iter: 0,
            training: false,
            lr: 1e-3,
            batch: None,
            batch_idxs: Vec::new(),
            train_split_idxs: Vec::new(),
            valid_split_idxs: Vec::new(),
            pred: None,
            loss: None,
            train_loss: None,
            valid_loss: None,
            metrics: HashMap::new(),
            recorder: Recorder::new(),
            loss_func: None,
            batch_tfms: Vec::new(),
            stop_training: false,
            skip_batch: false,
            lr_finder: false,
            gather_preds: false,
        }
    }

    /// Training set size.
    pub fn n_train(&self) -> usize {
        self.train_split_idxs.len()
    }

    /// Validation set size.
    pub fn n_valid(&self) -> usize {
        self.valid_split_idxs.len()
    }

    /// Total training steps of the fit.
    pub fn total_steps(&self) -> usize {
        self.n_iter * self.n_epochs
    }

    /// Current batch.
    pub fn batch(&self) -> Result<&TSBatch<B>> {
        self.batch.as_ref().ok_or(TrainError::MissingState("batch"))
    }

    /// Loss function in the slot.
    pub fn loss_func(&self) -> Result<&dyn LossFunc<B>> {
        self.loss_func
            .as_deref()
            .ok_or(TrainError::MissingState("loss function"))
    }

    /// Loss function in the slot, mutably.
    pub fn loss_func_mut(&mut self) -> Result<&mut (dyn LossFunc<B> + 'static)> {
        self.loss_func
            .as_deref_mut()
            .ok_or(TrainError::MissingState("loss function"))
    }

    /// Original dataset indices of the current batch rows.
    pub fn original_batch_idxs(&self) -> Result<Vec<usize>> {
        let map = if self.training {
            &self.train_split_idxs
        } else {
            &self.valid_split_idxs
        };
        self.batch_idxs
            .iter()
            .map(|&pos| {
                map.get(pos).copied().ok_or_else(|| {
                    TrainError::Other(format!(
                        "batch position {pos} outside split of {} items",
                        map.len()
                    ))
                })
            })
            .collect()
    }
}

/// What a callback sees during a hook.
pub struct CallbackContext<'a, B: Backend> {
    /// The model, read-only.
    pub model: &'a dyn BatchModel<B>,
    /// The learner's fit state.
    pub state: &'a mut FitState<B>,
}

impl<'a, B: Backend> CallbackContext<'a, B> {
    /// Bundle a model and state.
    pub fn new(model: &'a dyn BatchModel<B>, state: &'a mut FitState<B>) -> Self {
        Self { model, state }
    }
}

impl<B: Backend> Deref for CallbackContext<'_, B> {
    type Target = FitState<B>;

    fn deref(&self) -> &Self::Target {
        self.state
    }
}

impl<B: Backend> DerefMut for CallbackContext<'_, B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.state
    }
}

/// Fit loop events, in the order they can fire within one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Once before training starts.
    BeforeFit,
    /// Start of each epoch.
    BeforeEpoch,
    /// Start of the training phase.
    BeforeTrain,
    /// Before the forward pass of a batch.
    BeforeBatch,
    /// After the forward pass.
    AfterPred,
    /// After the loss computation.
    AfterLoss,
    /// End of a batch.
    AfterBatch,
    /// End of the training phase.
    AfterTrain,
    /// Start of the validation phase.
    BeforeValidate,
    /// End of the validation phase.
    AfterValidate,
    /// End of each epoch.
    AfterEpoch,
    /// Once after training, whatever the outcome.
    AfterFit,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Event::BeforeFit => "before_fit",
            Event::BeforeEpoch => "before_epoch",
            Event::BeforeTrain => "before_train",
            Event::BeforeBatch => "before_batch",
            Event::AfterPred => "after_pred",
            Event::AfterLoss => "after_loss",
            Event::AfterBatch => "after_batch",
            Event::AfterTrain => "after_train",
            Event::BeforeValidate => "before_validate",
            Event::AfterValidate => "after_validate",
            Event::AfterEpoch => "after_epoch",
            Event::AfterFit => "after_fit",
        };
        f.write_str(name)
    }
}

/// Trait for training callbacks.
pub trait Callback<B: Backend>: Send + Sync {
    /// Called once before training starts.
    fn before_fit(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the start of each epoch.
    fn before_epoch(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the start of the training phase.
    fn before_train(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called before the forward pass of each batch.
    fn before_batch(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called after the forward pass.
    fn after_pred(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called after the loss is computed.
    fn after_loss(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the end of each batch.
    fn after_batch(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the end of the training phase.
    fn after_train(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the start of the validation phase.
    fn before_validate(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the end of the validation phase.
    fn after_validate(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called at the end of each epoch.
    fn after_epoch(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Called once after training, also when the fit failed.
    fn after_fit(&mut self, _ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        Ok(())
    }

    /// Callback name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A collection of callbacks run in registration order.
pub struct CallbackList<B: Backend> {
    callbacks: Vec<Box<dyn Callback<B>>>,
}

impl<B: Backend> Default for CallbackList<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> CallbackList<B> {
    /// Create an empty callback list.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a callback.
    pub fn add<C: Callback<B> + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Add a boxed callback.
    pub fn push(&mut self, callback: Box<dyn Callback<B>>) {
        self.callbacks.push(callback);
    }

    /// Number of callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Callback names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    /// Dispatch `event` to every callback.
    ///
    /// The first error stops the dispatch, except for [`Event::AfterFit`],
    /// which reaches every callback and returns the first error afterwards.
    pub fn run(&mut self, event: Event, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        let mut first_err = None;
        for cb in &mut self.callbacks {
            let result = match event {
                Event::BeforeFit => cb.before_fit(ctx),
                Event::BeforeEpoch => cb.before_epoch(ctx),
                Event::BeforeTrain => cb.before_train(ctx),
                Event::BeforeBatch => cb.before_batch(ctx),
                Event::AfterPred => cb.after_pred(ctx),
                Event::AfterLoss => cb.after_loss(ctx),
                Event::AfterBatch => cb.after_batch(ctx),
                Event::AfterTrain => cb.after_train(ctx),
                Event::BeforeValidate => cb.before_validate(ctx),
                Event::AfterValidate => cb.after_validate(ctx),
                Event::AfterEpoch => cb.after_epoch(ctx),
                Event::AfterFit => cb.after_fit(ctx),
            };
            if let Err(e) = result {
                tracing::debug!("{} failed in {}: {}", cb.name(), event, e);
                if event != Event::AfterFit {
                    return Err(e);
                }
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Probe {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<Event>,
    }

    impl Probe {
        fn record(&self, event: Event) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, event));
            if self.fail_on == Some(event) {
                return Err(TrainError::CallbackError(format!("{} failed", self.tag)));
            }
            Ok(())
        }
    }

    impl Callback<TestBackend> for Probe {
        fn before_fit(&mut self, _ctx: &mut CallbackContext<'_, TestBackend>) -> Result<()> {
            self.record(Event::BeforeFit)
        }

        fn after_fit(&mut self, _ctx: &mut CallbackContext<'_, TestBackend>) -> Result<()> {
            self.record(Event::AfterFit)
        }

        fn name(&self) -> &str {
            self.tag
        }
    }

    fn probes(fail_first_on: Option<Event>) -> (CallbackList<TestBackend>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = CallbackList::new();
        list.add(Probe {
            tag: "a",
            log: log.clone(),
            fail_on: fail_first_on,
        });
        list.add(Probe {
            tag: "b",
            log: log.clone(),
            fail_on: None,
        });
        (list, log)
    }

    #[test]
    fn test_dispatch_order() {
        let (mut list, log) = probes(None);
        let mut state = FitState::<TestBackend>::new(1, 1);
        let model = mean_model;
        let mut ctx = CallbackContext::new(&model, &mut state);

        list.run(Event::BeforeFit, &mut ctx).unwrap();
        list.run(Event::AfterBatch, &mut ctx).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:before_fit", "b:before_fit"]);
        assert_eq!(list.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_first_error_stops_dispatch() {
        let (mut list, log) = probes(Some(Event::BeforeFit));
        let mut state = FitState::<TestBackend>::new(1, 1);
        let model = mean_model;
        let mut ctx = CallbackContext::new(&model, &mut state);

        assert!(list.run(Event::BeforeFit, &mut ctx).is_err());
        assert_eq!(*log.lock().unwrap(), vec!["a:before_fit"]);
    }

    #[test]
    fn test_after_fit_reaches_every_callback() {
        let (mut list, log) = probes(Some(Event::AfterFit));
        let mut state = FitState::<TestBackend>::new(1, 1);
        let model = mean_model;
        let mut ctx = CallbackContext::new(&model, &mut state);

        let err = list.run(Event::AfterFit, &mut ctx).unwrap_err();
        assert!(matches!(err, TrainError::CallbackError(msg) if msg == "a failed"));
        assert_eq!(*log.lock().unwrap(), vec!["a:after_fit", "b:after_fit"]);
    }

    #[test]
    fn test_original_batch_idxs_follow_phase() {
        let mut state = FitState::<TestBackend>::new(1, 1);
        state.train_split_idxs = vec![4, 2, 0];
        state.valid_split_idxs = vec![1, 3];
        state.batch_idxs = vec![1, 0];

        state.training = true;
        assert_eq!(state.original_batch_idxs().unwrap(), vec![2, 4]);
        state.training = false;
        assert_eq!(state.original_batch_idxs().unwrap(), vec![3, 1]);

        state.batch_idxs = vec![5];
        assert!(state.original_batch_idxs().is_err());
    }

    #[test]
    fn test_context_derefs_to_state() {
        let mut state = FitState::<TestBackend>::new(3, 5);
        let model = mean_model;
        let mut ctx = CallbackContext::new(&model, &mut state);
        ctx.train_iter = 7;
        assert_eq!(ctx.total_steps(), 15);
        assert!(ctx.batch().is_err());
        assert!(ctx.loss_func().is_err());
        drop(ctx);
        assert_eq!(state.train_iter, 7);
    }

    #[test]
    fn test_closure_model_no_grad() {
        let batch = constant_batch(&[1.0, 2.0], 2, 3);
        let model = mean_model;
        let out = BatchModel::forward_no_grad(&model, batch.x.inner().clone());
        assert_eq!(tsaug_core::read_f32(out).unwrap(), vec![1.0, 1.0, 2.0, 2.0]);
    }
}
