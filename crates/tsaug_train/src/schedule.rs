//! Schedule functions mapping training progress to a multiplier.
//!
//! A schedule is evaluated on a progress fraction in `[0, 1]`; values outside
//! that range are clamped before evaluation.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, TrainError};

/// A named progress-to-multiplier function.
#[derive(Clone)]
pub struct ScheduleFn {
    name: String,
    f: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
}

impl ScheduleFn {
    /// Wrap an arbitrary function.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    /// Evaluate at progress `pct`.
    pub fn eval(&self, pct: f64) -> f64 {
        let pct = if pct.is_nan() { 0.0 } else { pct.clamp(0.0, 1.0) };
        (self.f)(pct)
    }

    /// Schedule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample the schedule at `steps` evenly spaced points covering `[0, 1]`.
    ///
    /// A single step is evaluated at progress 0.
    pub fn sample(&self, steps: usize) -> Vec<f64> {
        if steps <= 1 {
            return (0..steps).map(|_| self.eval(0.0)).collect();
        }
        let last = (steps - 1) as f64;
        (0..steps).map(|i| self.eval(i as f64 / last)).collect()
    }
}

impl fmt::Debug for ScheduleFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleFn").field("name", &self.name).finish()
    }
}

impl fmt::Display for ScheduleFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Linear from `start` to `end`.
pub fn sched_lin(start: f64, end: f64) -> ScheduleFn {
    ScheduleFn::new(format!("sched_lin({start}, {end})"), move |pct| {
        start + pct * (end - start)
    })
}

/// Cosine annealing from `start` to `end`.
pub fn sched_cos(start: f64, end: f64) -> ScheduleFn {
    ScheduleFn::new(format!("sched_cos({start}, {end})"), move |pct| {
        start + (1.0 + (PI * (1.0 - pct)).cos()) * (end - start) / 2.0
    })
}

/// Exponential from `start` to `end`. Both must be non-zero with equal sign.
pub fn sched_exp(start: f64, end: f64) -> ScheduleFn {
    ScheduleFn::new(format!("sched_exp({start}, {end})"), move |pct| {
        start * (end / start).powf(pct)
    })
}

/// Constant `start`.
pub fn sched_no(start: f64, _end: f64) -> ScheduleFn {
    ScheduleFn::new(format!("sched_no({start})"), move |_| start)
}

/// Polynomial from `start` to `end` with exponent `power`.
pub fn sched_poly(start: f64, end: f64, power: f64) -> ScheduleFn {
    ScheduleFn::new(
        format!("sched_poly({start}, {end}, {power})"),
        move |pct| start + (end - start) * pct.powf(power),
    )
}

/// Chain schedules over consecutive phases of training.
///
/// `pcts[i]` is the fraction of training covered by `scheds[i]`; the
/// fractions must be positive and sum to 1. Each phase sees its own local
/// progress in `[0, 1]`.
pub fn combine_scheds(pcts: &[f64], scheds: Vec<ScheduleFn>) -> Result<ScheduleFn> {
    if pcts.is_empty() || pcts.len() != scheds.len() {
        return Err(TrainError::InvalidConfig(format!(
            "combine_scheds needs one fraction per schedule, got {} fractions and {} schedules",
            pcts.len(),
            scheds.len()
        )));
    }
    if pcts.iter().any(|&p| !(p > 0.0)) {
        return Err(TrainError::InvalidConfig(
            "combine_scheds fractions must be positive".to_string(),
        ));
    }
    let total: f64 = pcts.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(TrainError::InvalidConfig(format!(
            "combine_scheds fractions must sum to 1, got {total}"
        )));
    }

    let mut bounds = Vec::with_capacity(pcts.len() + 1);
    bounds.push(0.0);
    let mut acc = 0.0;
    for p in pcts {
        acc += p;
        bounds.push(acc);
    }

    let name = format!(
        "combine_scheds([{}])",
        scheds
            .iter()
            .map(ScheduleFn::name)
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(ScheduleFn::new(name, move |pct| {
        let last = scheds.len() - 1;
        let idx = (0..=last).rev().find(|&i| pct >= bounds[i]).unwrap_or(0);
        let span = bounds[idx + 1] - bounds[idx];
        let local = ((pct - bounds[idx]) / span).clamp(0.0, 1.0);
        scheds[idx].eval(local)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_endpoints() {
        let scheds = [
            (sched_lin(0.0, 1.0), 0.0, 1.0),
            (sched_cos(1.0, 0.0), 1.0, 0.0),
            (sched_exp(1.0, 0.01), 1.0, 0.01),
            (sched_poly(2.0, 1.0, 2.0), 2.0, 1.0),
            (sched_no(0.7, 0.0), 0.7, 0.7),
        ];
        for (s, start, end) in scheds {
            assert!(close(s.eval(0.0), start), "{s} at 0");
            assert!(close(s.eval(1.0), end), "{s} at 1");
        }
    }

    #[test]
    fn test_cos_midpoint() {
        let s = sched_cos(0.0, 2.0);
        assert!(close(s.eval(0.5), 1.0));
    }

    #[test]
    fn test_clamps_progress() {
        let s = sched_lin(0.0, 1.0);
        assert!(close(s.eval(-3.0), 0.0));
        assert!(close(s.eval(7.0), 1.0));
        assert!(close(s.eval(f64::NAN), 0.0));
    }

    #[test]
    fn test_sample_endpoints_and_length() {
        for sched in [sched_lin(0.0, 1.0), sched_cos(1.0, 0.2), sched_exp(0.5, 2.0)] {
            for steps in [2usize, 3, 10, 57] {
                let mult = sched.sample(steps);
                assert_eq!(mult.len(), steps);
                assert!(close(mult[0], sched.eval(0.0)));
                assert!(close(mult[steps - 1], sched.eval(1.0)));
            }
        }
    }

    #[test]
    fn test_sample_single_and_empty() {
        let s = sched_lin(0.25, 1.0);
        assert_eq!(s.sample(1), vec![0.25]);
        assert!(s.sample(0).is_empty());
    }

    #[test]
    fn test_combine_phases() {
        let s = combine_scheds(&[0.25, 0.75], vec![sched_lin(0.0, 1.0), sched_lin(1.0, 0.0)]).unwrap();
        assert!(close(s.eval(0.0), 0.0));
        assert!(close(s.eval(0.125), 0.5));
        assert!(close(s.eval(0.25), 1.0));
        assert!(close(s.eval(0.625), 0.5));
        assert!(close(s.eval(1.0), 0.0));
    }

    #[test]
    fn test_combine_validation() {
        assert!(combine_scheds(&[], vec![]).is_err());
        assert!(combine_scheds(&[0.5], vec![sched_no(1.0, 1.0), sched_no(1.0, 1.0)]).is_err());
        assert!(combine_scheds(&[0.5, 0.4], vec![sched_no(1.0, 1.0), sched_no(1.0, 1.0)]).is_err());
        assert!(combine_scheds(&[1.5, -0.5], vec![sched_no(1.0, 1.0), sched_no(1.0, 1.0)]).is_err());
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(sched_lin(0.0, 1.0).to_string(), "sched_lin(0, 1)");
    }
}
