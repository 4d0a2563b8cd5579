use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Callback, CallbackContext};
use crate::error::Result;
use crate::plot::AsciiPlot;
use crate::recorder::Recorder;

/// Configuration for [`ShowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowGraphConfig {
    /// Plot recorded metrics when the fit ends.
    pub plot_metrics: bool,
    /// Include per-epoch losses in the final plots.
    pub final_losses: bool,
    /// Plot width in characters.
    pub width: usize,
    /// Plot height in characters.
    pub height: usize,
}

impl Default for ShowGraphConfig {
    fn default() -> Self {
        Self {
            plot_metrics: true,
            final_losses: false,
            width: 60,
            height: 12,
        }
    }
}

type Bounds = ((f64, f64), (f64, f64));

/// Draws training and validation losses in the terminal after every epoch.
///
/// Training losses are plotted per batch. Validation losses are placed at the
/// training iteration reached when each training phase ended. The x axis
/// spans the iterations projected for the whole fit. Fits run as a learning
/// rate search or to gather predictions are not plotted.
#[derive(Debug, Clone, Default)]
pub struct ShowGraph {
    config: ShowGraphConfig,
    nb_batches: Vec<usize>,
    enabled: bool,
    last_bounds: Option<Bounds>,
    last_render: Option<String>,
}

impl ShowGraph {
    /// Create with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a config.
    pub fn from_config(config: ShowGraphConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Plot metrics when the fit ends.
    #[must_use]
    pub fn with_plot_metrics(mut self, plot_metrics: bool) -> Self {
        self.config.plot_metrics = plot_metrics;
        self
    }

    /// Include losses in the final plots.
    #[must_use]
    pub fn with_final_losses(mut self, final_losses: bool) -> Self {
        self.config.final_losses = final_losses;
        self
    }

    /// Set the plot size in characters.
    #[must_use]
    pub fn with_size(mut self, width: usize, height: usize) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> ShowGraphConfig {
        self.config
    }

    /// Training iteration reached at the end of each training phase.
    pub fn nb_batches(&self) -> &[usize] {
        &self.nb_batches
    }

    /// `(x_bounds, y_bounds)` of the last loss plot.
    pub fn last_bounds(&self) -> Option<Bounds> {
        self.last_bounds
    }

    /// Text of the last rendered plot.
    pub fn last_render(&self) -> Option<&str> {
        self.last_render.as_deref()
    }

    fn loss_bounds(&self, recorder: &Recorder, n_epochs: usize, valid: &[(f64, f64)]) -> Bounds {
        let first = self.nb_batches.first().copied().unwrap_or(0);
        let remaining = n_epochs.saturating_sub(self.nb_batches.len());
        let x_max = (remaining * first + recorder.losses.len()) as f64;

        let values = recorder
            .losses
            .iter()
            .map(|&l| f64::from(l))
            .chain(valid.iter().map(|p| p.1))
            .filter(|v| v.is_finite());
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let (lo, hi) = if lo > hi { (0.0, 1.0) } else { (lo, hi) };
        let margin = if hi > lo { 0.05 * (hi - lo) } else { 0.05 * hi.abs().max(1.0) };
        ((0.0, x_max), (lo - margin, hi + margin))
    }

    fn plot_final(&self, recorder: &Recorder) -> String {
        let mut out = String::new();
        let epochs = |values: Vec<f32>| -> Vec<(f64, f64)> {
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i as f64, f64::from(v)))
                .collect()
        };

        if self.config.final_losses && !recorder.values.is_empty() {
            let plot = AsciiPlot::new("losses")
                .with_size(self.config.width, self.config.height)
                .with_series("train", '*', epochs(recorder.train_losses()))
                .with_series("valid", 'o', epochs(recorder.valid_losses()));
            out.push_str(&plot.render());
        }
        for name in recorder.metric_names() {
            let plot = AsciiPlot::new(name.clone())
                .with_size(self.config.width, self.config.height)
                .with_series(name.clone(), '*', epochs(recorder.metric(&name)));
            out.push_str(&plot.render());
        }
        out
    }
}

impl<B: Backend> Callback<B> for ShowGraph {
    fn before_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        self.enabled = !(ctx.lr_finder || ctx.gather_preds);
        self.nb_batches.clear();
        self.last_bounds = None;
        if !self.enabled {
            tracing::debug!("ShowGraph: disabled for this fit");
        }
        Ok(())
    }

    fn after_train(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if self.enabled {
            self.nb_batches.push(ctx.train_iter);
        }
        Ok(())
    }

    fn after_epoch(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let recorder = &ctx.recorder;
        let train: Vec<(f64, f64)> = recorder
            .losses
            .iter()
            .enumerate()
            .map(|(i, &l)| (i as f64, f64::from(l)))
            .collect();
        let valid: Vec<(f64, f64)> = recorder
            .values
            .iter()
            .zip(&self.nb_batches)
            .filter_map(|(v, &it)| v.valid_loss.map(|l| (it as f64, f64::from(l))))
            .collect();

        let (x_bounds, y_bounds) = self.loss_bounds(recorder, ctx.n_epochs, &valid);
        let plot = AsciiPlot::new(format!("Losses / epoch: {}/{}", ctx.epoch + 1, ctx.n_epochs))
            .with_size(self.config.width, self.config.height)
            .with_x_bounds(x_bounds.0, x_bounds.1)
            .with_y_bounds(y_bounds.0, y_bounds.1)
            .with_series("train", '*', train)
            .with_series("valid", 'o', valid);
        let text = plot.render();
        print!("{text}");

        self.last_bounds = Some((x_bounds, y_bounds));
        self.last_render = Some(text);
        Ok(())
    }

    fn after_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if self.enabled && self.config.plot_metrics {
            let text = self.plot_final(&ctx.recorder);
            if !text.is_empty() {
                print!("{text}");
                self.last_render = Some(text);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "ShowGraph"
    }
}
