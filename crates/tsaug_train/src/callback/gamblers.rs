use burn::prelude::*;

use super::{Callback, CallbackContext};
use crate::error::{Result, TrainError};

/// Drops the abstention column of a gambler's loss model after the loss is
/// computed, so metrics only see class scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct GamblersCallback;

impl GamblersCallback {
    /// Create the callback.
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Callback<B> for GamblersCallback {
    fn after_loss(&mut self, ctx: &mut CallbackContext<'_, B>) -> Result<()> {
        let Some(pred) = ctx.pred.take() else {
            return Ok(());
        };
        let [rows, cols] = pred.dims();
        if cols < 2 {
            ctx.pred = Some(pred);
            return Err(TrainError::CallbackError(format!(
                "GamblersCallback needs an abstention column, prediction has {cols} column(s)"
            )));
        }
        ctx.pred = Some(pred.slice([0..rows, 0..cols - 1]));
        Ok(())
    }

    fn name(&self) -> &str {
        "GamblersCallback"
    }
}
