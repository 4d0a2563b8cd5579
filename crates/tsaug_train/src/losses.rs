//! Loss strategies with a switchable reduction mode.
//!
//! Losses operate on flat predictions `[batch, out]` and targets
//! `[batch, target_dim]`. With [`Reduction::None`] they return one value per
//! sample (`[batch]`); otherwise a single-element tensor (`[1]`).

use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use serde::{Deserialize, Serialize};
use tsaug_core::{index_tensor, read_f32};

use crate::error::{Result, TrainError};

/// How per-sample losses are aggregated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// Keep one loss per sample.
    None,
    /// Average over the batch.
    #[default]
    Mean,
    /// Sum over the batch.
    Sum,
}

impl Reduction {
    /// Aggregate a per-sample loss vector.
    pub fn reduce<B: Backend>(self, per_sample: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            Reduction::None => per_sample,
            Reduction::Mean => per_sample.mean(),
            Reduction::Sum => per_sample.sum(),
        }
    }
}

impl std::fmt::Display for Reduction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Reduction::None => "none",
            Reduction::Mean => "mean",
            Reduction::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// A loss function the learner (and callbacks) can reconfigure.
pub trait LossFunc<B: Backend>: Send + Sync {
    /// Compute the loss for a batch.
    fn forward(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Tensor<B, 1>>;

    /// Current reduction mode, or `None` if the loss has no reduction attribute.
    fn reduction(&self) -> Option<Reduction> {
        None
    }

    /// Switch the reduction mode.
    fn set_reduction(&mut self, _reduction: Reduction) -> Result<()> {
        Err(TrainError::MissingReduction(self.name().to_string()))
    }

    /// Install per-sample weights for the next forward (decorators only).
    fn set_instance_weights(&mut self, _weights: Vec<f32>) -> Result<()> {
        Err(TrainError::LossError(format!(
            "{} does not accept instance weights",
            self.name()
        )))
    }

    /// Detach and return the wrapped loss (decorators only).
    fn take_inner(&mut self) -> Option<Box<dyn LossFunc<B>>> {
        None
    }

    /// Loss name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

fn check_rows(pred_rows: usize, target_rows: usize) -> Result<()> {
    if pred_rows != target_rows {
        return Err(TrainError::LossError(format!(
            "prediction has {pred_rows} rows but target has {target_rows}"
        )));
    }
    Ok(())
}

/// Mean squared error over the flattened output dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MSELossFlat {
    reduction: Reduction,
}

impl MSELossFlat {
    /// Create an MSE loss with mean reduction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reduction mode.
    #[must_use]
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }
}

impl<B: Backend> LossFunc<B> for MSELossFlat {
    fn forward(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let [rows, cols] = pred.dims();
        let [target_rows, target_cols] = target.dims();
        check_rows(rows, target_rows)?;
        if cols != target_cols {
            return Err(TrainError::LossError(format!(
                "prediction has {cols} columns but target has {target_cols}"
            )));
        }

        let per_sample = (pred - target).powf_scalar(2.0).mean_dim(1).reshape([rows]);
        Ok(self.reduction.reduce(per_sample))
    }

    fn reduction(&self) -> Option<Reduction> {
        Some(self.reduction)
    }

    fn set_reduction(&mut self, reduction: Reduction) -> Result<()> {
        self.reduction = reduction;
        Ok(())
    }

    fn name(&self) -> &str {
        "MSELossFlat"
    }
}

/// Cross entropy on logits `[batch, n_classes]`.
///
/// Targets hold the class index as a float in column 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossEntropyLossFlat {
    reduction: Reduction,
}

impl CrossEntropyLossFlat {
    /// Create a cross entropy loss with mean reduction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reduction mode.
    #[must_use]
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }
}

impl<B: Backend> LossFunc<B> for CrossEntropyLossFlat {
    fn forward(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let [rows, n_classes] = pred.dims();
        let [target_rows, _] = target.dims();
        check_rows(rows, target_rows)?;

        let device = pred.device();
        let mut classes = Vec::with_capacity(rows);
        for class in read_f32(target.slice([0..rows, 0..1]))? {
            if class < 0.0 || class.round() as usize >= n_classes {
                return Err(TrainError::LossError(format!(
                    "class index {class} out of range for {n_classes} classes"
                )));
            }
            classes.push(class.round() as usize);
        }

        let index = index_tensor::<B>(&classes, &device).reshape([rows, 1]);
        let picked = log_softmax(pred, 1).gather(1, index);
        let per_sample = picked.neg().reshape([rows]);
        Ok(self.reduction.reduce(per_sample))
    }

    fn reduction(&self) -> Option<Reduction> {
        Some(self.reduction)
    }

    fn set_reduction(&mut self, reduction: Reduction) -> Result<()> {
        self.reduction = reduction;
        Ok(())
    }

    fn name(&self) -> &str {
        "CrossEntropyLossFlat"
    }
}

/// A closure loss with no reduction attribute.
pub struct FnLoss<F> {
    name: String,
    f: F,
}

impl<F> FnLoss<F> {
    /// Wrap a closure.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<B, F> LossFunc<B> for FnLoss<F>
where
    B: Backend,
    F: Fn(Tensor<B, 2>, Tensor<B, 2>) -> Tensor<B, 1> + Send + Sync,
{
    fn forward(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        Ok((self.f)(pred, target))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decorator applying per-instance weights to a wrapped loss.
///
/// The wrapped loss is kept at [`Reduction::None`]. A reduced forward returns
/// `sum(loss_i * w_i / sum(w))`; with the decorator itself switched to
/// `Reduction::None` the raw per-sample losses are returned unweighted.
pub struct PerInstanceLoss<B: Backend> {
    inner: Option<Box<dyn LossFunc<B>>>,
    weights: Option<Vec<f32>>,
    mode: Reduction,
}

impl<B: Backend> PerInstanceLoss<B> {
    /// Wrap `inner`, switching it to per-sample output.
    pub fn new(mut inner: Box<dyn LossFunc<B>>) -> Result<Self> {
        inner.set_reduction(Reduction::None)?;
        Ok(Self {
            inner: Some(inner),
            weights: None,
            mode: Reduction::Sum,
        })
    }

    /// Weights installed for the next forward.
    pub fn weights(&self) -> Option<&[f32]> {
        self.weights.as_deref()
    }

    /// Expand `weights` to `rows` entries, repeating each weight k times when
    /// the batch was expanded k-fold.
    fn expand(weights: &[f32], rows: usize) -> Result<Vec<f32>> {
        if weights.len() == rows {
            return Ok(weights.to_vec());
        }
        if weights.is_empty() || rows % weights.len() != 0 {
            return Err(TrainError::LossError(format!(
                "{rows} per-sample losses cannot be matched to {} weights",
                weights.len()
            )));
        }
        let k = rows / weights.len();
        Ok(weights
            .iter()
            .flat_map(|&w| std::iter::repeat(w).take(k))
            .collect())
    }
}

impl<B: Backend> LossFunc<B> for PerInstanceLoss<B> {
    fn forward(&self, pred: Tensor<B, 2>, target: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let inner = self
            .inner
            .as_ref()
            .ok_or(TrainError::MissingState("wrapped loss"))?;
        let per_sample = inner.forward(pred, target)?;
        if self.mode == Reduction::None {
            return Ok(per_sample);
        }

        let weights = self.weights.as_ref().ok_or_else(|| {
            TrainError::LossError("instance weights were not set before forward".to_string())
        })?;
        let [rows] = per_sample.dims();
        let weights = Self::expand(weights, rows)?;
        let total: f32 = weights.iter().sum();
        if total == 0.0 {
            return Err(TrainError::LossError(
                "instance weights sum to zero".to_string(),
            ));
        }

        let normalized: Vec<f32> = weights.iter().map(|w| w / total).collect();
        let device = per_sample.device();
        let w = Tensor::<B, 1>::from_floats(normalized.as_slice(), &device);
        Ok((per_sample * w).sum())
    }

    fn reduction(&self) -> Option<Reduction> {
        Some(self.mode)
    }

    fn set_reduction(&mut self, reduction: Reduction) -> Result<()> {
        self.mode = reduction;
        Ok(())
    }

    fn set_instance_weights(&mut self, weights: Vec<f32>) -> Result<()> {
        self.weights = Some(weights);
        Ok(())
    }

    fn take_inner(&mut self) -> Option<Box<dyn LossFunc<B>>> {
        self.inner.take()
    }

    fn name(&self) -> &str {
        "PerInstanceLoss"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tensor2(values: &[f32], rows: usize, cols: usize) -> Tensor<TestBackend, 2> {
        let device = Default::default();
        Tensor::<TestBackend, 1>::from_floats(values, &device).reshape([rows, cols])
    }

    #[test]
    fn test_mse_reductions() {
        let pred = tensor2(&[1.0, 1.0, 3.0, 3.0], 2, 2);
        let target = tensor2(&[0.0, 0.0, 0.0, 0.0], 2, 2);

        let none = MSELossFlat::new().with_reduction(Reduction::None);
        let per_sample = read_f32(none.forward(pred.clone(), target.clone()).unwrap()).unwrap();
        assert_eq!(per_sample, vec![1.0, 9.0]);

        let mean = read_f32(MSELossFlat::new().forward(pred.clone(), target.clone()).unwrap()).unwrap();
        assert!((mean[0] - 5.0).abs() < 1e-6);

        let sum = MSELossFlat::new().with_reduction(Reduction::Sum);
        let total = read_f32(sum.forward(pred, target).unwrap()).unwrap();
        assert!((total[0] - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_mse_shape_mismatch() {
        let loss = MSELossFlat::new();
        let result = LossFunc::<TestBackend>::forward(
            &loss,
            tensor2(&[0.0; 4], 2, 2),
            tensor2(&[0.0; 3], 3, 1),
        );
        assert!(matches!(result, Err(TrainError::LossError(_))));
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let loss = CrossEntropyLossFlat::new().with_reduction(Reduction::None);
        let pred = tensor2(&[0.0; 6], 2, 3);
        let target = tensor2(&[0.0, 2.0], 2, 1);
        let values = read_f32(loss.forward(pred, target).unwrap()).unwrap();
        let expected = 3.0f32.ln();
        for v in values {
            assert!((v - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cross_entropy_prefers_correct_class() {
        let loss = CrossEntropyLossFlat::new().with_reduction(Reduction::None);
        let pred = tensor2(&[4.0, 0.0, 0.0, 4.0], 2, 2);
        let target = tensor2(&[0.0, 0.0], 2, 1);
        let values = read_f32(loss.forward(pred, target).unwrap()).unwrap();
        assert!(values[0] < values[1]);
    }

    #[test]
    fn test_cross_entropy_rejects_bad_class() {
        let loss = CrossEntropyLossFlat::new();
        let result = LossFunc::<TestBackend>::forward(
            &loss,
            tensor2(&[0.0; 4], 2, 2),
            tensor2(&[0.0, 5.0], 2, 1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fn_loss_has_no_reduction() {
        let mut loss = FnLoss::new("l1", |p: Tensor<TestBackend, 2>, t: Tensor<TestBackend, 2>| {
            (p - t).abs().mean()
        });
        assert_eq!(LossFunc::<TestBackend>::reduction(&loss), None);
        let err = LossFunc::<TestBackend>::set_reduction(&mut loss, Reduction::None).unwrap_err();
        assert!(matches!(err, TrainError::MissingReduction(name) if name == "l1"));
    }

    #[test]
    fn test_per_instance_uniform_weights_equal_mean() {
        let pred = tensor2(&[1.0, 2.0, 3.0, 4.0], 4, 1);
        let target = tensor2(&[0.0; 4], 4, 1);

        let mean = read_f32(MSELossFlat::new().forward(pred.clone(), target.clone()).unwrap()).unwrap();

        let mut weighted = PerInstanceLoss::<TestBackend>::new(Box::new(MSELossFlat::new())).unwrap();
        weighted.set_instance_weights(vec![1.0; 4]).unwrap();
        let value = read_f32(weighted.forward(pred, target).unwrap()).unwrap();
        assert!((value[0] - mean[0]).abs() < 1e-5);
    }

    #[test]
    fn test_per_instance_weights_select() {
        let pred = tensor2(&[1.0, 3.0], 2, 1);
        let target = tensor2(&[0.0; 2], 2, 1);
        let mut weighted = PerInstanceLoss::<TestBackend>::new(Box::new(MSELossFlat::new())).unwrap();
        weighted.set_instance_weights(vec![0.0, 2.0]).unwrap();
        let value = read_f32(weighted.forward(pred, target).unwrap()).unwrap();
        assert!((value[0] - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_per_instance_repeats_weights_for_expanded_batch() {
        // Rows 0,1 belong to sample 0 and rows 2,3 to sample 1.
        let pred = tensor2(&[1.0, 1.0, 2.0, 2.0], 4, 1);
        let target = tensor2(&[0.0; 4], 4, 1);
        let mut weighted = PerInstanceLoss::<TestBackend>::new(Box::new(MSELossFlat::new())).unwrap();
        weighted.set_instance_weights(vec![1.0, 0.0]).unwrap();
        let value = read_f32(weighted.forward(pred, target).unwrap()).unwrap();
        assert!((value[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_per_instance_errors() {
        let pred = tensor2(&[1.0, 3.0], 2, 1);
        let target = tensor2(&[0.0; 2], 2, 1);
        let mut weighted = PerInstanceLoss::<TestBackend>::new(Box::new(MSELossFlat::new())).unwrap();

        assert!(weighted.forward(pred.clone(), target.clone()).is_err());

        weighted.set_instance_weights(vec![0.0, 0.0]).unwrap();
        assert!(weighted.forward(pred.clone(), target.clone()).is_err());

        weighted.set_instance_weights(vec![1.0, 1.0, 1.0]).unwrap();
        assert!(weighted.forward(pred, target).is_err());
    }

    #[test]
    fn test_per_instance_unwrap_returns_inner() {
        let mut weighted = PerInstanceLoss::<TestBackend>::new(Box::new(MSELossFlat::new())).unwrap();
        let inner = weighted.take_inner().unwrap();
        assert_eq!(inner.name(), "MSELossFlat");
        assert_eq!(inner.reduction(), Some(Reduction::None));
        assert!(weighted.take_inner().is_none());
    }

    #[test]
    fn test_per_instance_requires_reduction() {
        let inner = FnLoss::new("raw", |p: Tensor<TestBackend, 2>, _t: Tensor<TestBackend, 2>| {
            p.sum()
        });
        assert!(PerInstanceLoss::<TestBackend>::new(Box::new(inner)).is_err());
    }

    #[test]
    fn test_reduction_serde() {
        let json = serde_json::to_string(&Reduction::None).unwrap();
        assert_eq!(json, "\"none\"");
        let back: Reduction = serde_json::from_str("\"sum\"").unwrap();
        assert_eq!(back, Reduction::Sum);
    }
}
