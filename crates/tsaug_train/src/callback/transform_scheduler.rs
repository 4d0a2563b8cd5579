use std::fmt;

use burn::prelude::*;
use tsaug_core::Transform;

use super::{Callback, CallbackContext};
use crate::error::Result;
use crate::plot::AsciiPlot;
use crate::schedule::ScheduleFn;

/// Rescales the magnitude of every pipeline transform along a schedule.
///
/// At fit start the multiplier sequence `schedule(i / (T - 1))` is computed
/// for the `T` training steps of the fit, and every batch transform exposing
/// a magnitude is recorded with its original value. Training batch `k` runs
/// with `original * multiplier[k]`. Originals are restored when the fit ends,
/// including fits that stop early or fail.
///
/// # Example
///
/// ```rust,ignore
/// use tsaug_train::{sched_lin, TransformScheduler};
///
/// learner.add_callback(TransformScheduler::new(sched_lin(0.0, 1.0)));
/// ```
pub struct TransformScheduler {
    schedule: ScheduleFn,
    show_plot: bool,
    multipliers: Vec<f64>,
    /// Pipeline position and original magnitude of each tracked transform.
    tracked: Vec<(usize, f32)>,
    plotted: bool,
}

impl TransformScheduler {
    /// Create a scheduler driven by `schedule`.
    pub fn new(schedule: ScheduleFn) -> Self {
        Self {
            schedule,
            show_plot: false,
            multipliers: Vec::new(),
            tracked: Vec::new(),
            plotted: false,
        }
    }

    /// Plot the multiplier curve once, when the first fit ends.
    #[must_use]
    pub fn with_plot(mut self, show_plot: bool) -> Self {
        self.show_plot = show_plot;
        self
    }

    /// Multipliers computed at the start of the last fit.
    pub fn multipliers(&self) -> &[f64] {
        &self.multipliers
    }

    /// Number of transforms currently under schedule.
    pub fn n_tracked(&self) -> usize {
        self.tracked.len()
    }

    /// The schedule function.
    pub fn schedule(&self) -> &ScheduleFn {
        &self.schedule
    }

    /// Render the multiplier curve.
    pub fn render_plot(&self) -> String {
        let points = self
            .multipliers
            .iter()
            .enumerate()
            .map(|(i, &m)| (i as f64, m))
            .collect();
        AsciiPlot::new(format!("magnitude multiplier: {}", self.schedule))
            .with_series("multiplier", '*', points)
            .render()
    }

    fn rescale<B: Backend>(&self, tfms: &mut [Box<dyn Transform<B>>], multiplier: f64) {
        for &(idx, original) in &self.tracked {
            if let Some(m) = tfms.get_mut(idx).and_then(|t| t.as_magnitude_mut()) {
                m.set_magnitude((f64::from(original) * multiplier) as f32);
            }
        }
    }

    fn restore<B: Backend>(&mut self, tfms: &mut [Box<dyn Transform<B>>]) {
        for (idx, original) in self.tracked.drain(..) {
            match tfms.get_mut(idx).and_then(|t| t.as_magnitude_mut()) {
                Some(m) => m.set_magnitude(original),
                None => tracing::warn!(
                    "TransformScheduler: transform at position {} disappeared before restore",
                    idx
                ),
            }
        }
    }
}

impl fmt::Display for TransformScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransformScheduler({})", self.schedule)
    }
}

impl<B: Backend> Callback<B> for TransformScheduler {
    fn before_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        let total = ctx.total_steps();
        self.multipliers = self.schedule.sample(total);
        self.tracked = ctx
            .batch_tfms
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, t)| t.as_magnitude_mut().map(|m| (idx, m.magnitude())))
            .collect();

        if self.tracked.is_empty() {
            tracing::debug!("TransformScheduler: no transform exposes a magnitude");
            return Ok(());
        }

        tracing::info!(
            "TransformScheduler: tracking {} transforms over {} steps with {}",
            self.tracked.len(),
            total,
            self.schedule
        );
        if let Some(&first) = self.multipliers.first() {
            self.rescale(&mut ctx.batch_tfms, first);
        }
        Ok(())
    }

    fn after_batch(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if !ctx.training || self.tracked.is_empty() {
            return Ok(());
        }
        if let Some(&multiplier) = self.multipliers.get(ctx.train_iter) {
            tracing::debug!(
                "TransformScheduler: step {} multiplier {:.4}",
                ctx.train_iter,
                multiplier
            );
            self.rescale(&mut ctx.batch_tfms, multiplier);
        }
        Ok(())
    }

    fn after_fit(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        if self.show_plot && !self.plotted && !self.multipliers.is_empty() {
            print!("{}", self.render_plot());
            self.plotted = true;
        }
        self.restore(&mut ctx.batch_tfms);
        Ok(())
    }

    fn name(&self) -> &str {
        "TransformScheduler"
    }
}
