//! Training history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Values recorded at the end of one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpochValues {
    /// Epoch index.
    pub epoch: usize,
    /// Mean training loss.
    pub train_loss: f32,
    /// Mean validation loss, if a validation pass ran.
    pub valid_loss: Option<f32>,
    /// Metrics computed on the validation pass.
    pub metrics: HashMap<String, f32>,
}

/// Losses and metrics kept by the learner across a fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recorder {
    /// Loss of every training batch, in order.
    pub losses: Vec<f32>,
    /// One entry per finished epoch.
    pub values: Vec<EpochValues>,
}

impl Recorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validation losses of finished epochs that ran a validation pass.
    pub fn valid_losses(&self) -> Vec<f32> {
        self.values.iter().filter_map(|v| v.valid_loss).collect()
    }

    /// Mean training loss of each finished epoch.
    pub fn train_losses(&self) -> Vec<f32> {
        self.values.iter().map(|v| v.train_loss).collect()
    }

    /// History of a single metric.
    pub fn metric(&self, name: &str) -> Vec<f32> {
        self.values
            .iter()
            .filter_map(|v| v.metrics.get(name).copied())
            .collect()
    }

    /// Names of all recorded metrics, sorted.
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .values
            .iter()
            .flat_map(|v| v.metrics.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.losses.clear();
        self.values.clear();
    }
}
