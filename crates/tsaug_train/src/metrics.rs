//! Validation metrics.

use burn::prelude::*;
use tsaug_core::read_f32;

use crate::error::{Result, TrainError};

/// A metric computed from predictions and targets of a whole validation pass.
pub trait Metric<B: Backend>: Send + Sync {
    /// Compute the metric.
    fn compute(&self, preds: &Tensor<B, 2>, targets: &Tensor<B, 2>) -> Result<f32>;

    /// Metric name.
    fn name(&self) -> &str;

    /// Whether higher is better.
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Classification accuracy.
///
/// Predictions are scores `[batch, n_classes]`. Targets are either class
/// indices in a single column or one-hot rows.
#[derive(Debug, Clone, Default)]
pub struct Accuracy;

fn argmax_rows(values: &[f32], cols: usize) -> Vec<usize> {
    values
        .chunks(cols.max(1))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, best_v), (i, &v)| {
                    if v > best_v {
                        (i, v)
                    } else {
                        (best, best_v)
                    }
                })
                .0
        })
        .collect()
}

impl<B: Backend> Metric<B> for Accuracy {
    fn compute(&self, preds: &Tensor<B, 2>, targets: &Tensor<B, 2>) -> Result<f32> {
        let [rows, cols] = preds.dims();
        let [target_rows, target_cols] = targets.dims();
        if rows != target_rows {
            return Err(TrainError::Other(format!(
                "accuracy: {rows} predictions for {target_rows} targets"
            )));
        }
        if rows == 0 {
            return Ok(0.0);
        }

        let predicted = argmax_rows(&read_f32(preds.clone())?, cols);
        let target_values = read_f32(targets.clone())?;
        let expected: Vec<usize> = if target_cols == 1 {
            target_values.iter().map(|v| v.round().max(0.0) as usize).collect()
        } else {
            argmax_rows(&target_values, target_cols)
        };

        let correct = predicted
            .iter()
            .zip(&expected)
            .filter(|(p, t)| p == t)
            .count();
        Ok(correct as f32 / rows as f32)
    }

    fn name(&self) -> &str {
        "accuracy"
    }
}

fn scalar<B: Backend>(value: Tensor<B, 1>) -> Result<f32> {
    read_f32(value)?
        .first()
        .copied()
        .ok_or_else(|| TrainError::Other("metric produced no value".to_string()))
}

/// Mean squared error.
#[derive(Debug, Clone, Default)]
pub struct MSE;

impl<B: Backend> Metric<B> for MSE {
    fn compute(&self, preds: &Tensor<B, 2>, targets: &Tensor<B, 2>) -> Result<f32> {
        let diff = preds.clone() - targets.clone();
        scalar((diff.clone() * diff).mean())
    }

    fn name(&self) -> &str {
        "mse"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}

/// Mean absolute error.
#[derive(Debug, Clone, Default)]
pub struct MAE;

impl<B: Backend> Metric<B> for MAE {
    fn compute(&self, preds: &Tensor<B, 2>, targets: &Tensor<B, 2>) -> Result<f32> {
        let diff = preds.clone() - targets.clone();
        scalar(diff.abs().mean())
    }

    fn name(&self) -> &str {
        "mae"
    }

    fn higher_is_better(&self) -> bool {
        false
    }
}
