//! Time series batch augmentations.
//!
//! Randomness is drawn on the host from a per-call ChaCha8 stream, so a
//! transform built with a fixed seed replays the same sequence of
//! augmentations across runs while still varying from call to call.

use std::sync::atomic::{AtomicU64, Ordering};

use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use tsaug_core::{Magnitude, Result, Seed, Split, TSBatch, TSTensor, Transform};

/// Per-call random stream.
struct CallRng {
    seed: Seed,
    calls: AtomicU64,
}

impl CallRng {
    fn new(seed: Seed) -> Self {
        Self {
            seed,
            calls: AtomicU64::new(0),
        }
    }

    fn next_rng(&self) -> ChaCha8Rng {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        self.seed.derive_index(call).to_rng()
    }
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut impl Rng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Run `f` over each sample's `V * L` values and rebuild the batch.
fn map_samples<B: Backend>(batch: TSBatch<B>, mut f: impl FnMut(&mut [f32])) -> Result<TSBatch<B>> {
    let shape = batch.x.shape();
    let device = batch.device();
    let mut values = batch.x.to_values()?;

    let per_sample = shape.sample_numel();
    if per_sample > 0 {
        for sample in values.chunks_mut(per_sample) {
            f(sample);
        }
    }

    let x = TSTensor::from_values(&values, shape, &device)?;
    Ok(batch.with_inputs(x))
}

/// Decide whether a call leaves the batch unchanged.
fn passthrough(split: Split, magnitude: f32, p: f32, rng: &mut impl Rng) -> bool {
    split.is_eval() || magnitude <= 0.0 || rng.gen::<f32>() > p
}

/// Configuration shared by the magnitude-driven augmentations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeConfig {
    /// Augmentation strength; `<= 0` disables the transform.
    pub magnitude: f32,
    /// Probability of augmenting a given batch.
    pub p: f32,
}

impl MagnitudeConfig {
    /// Config with the given magnitude, always applied.
    #[must_use]
    pub const fn new(magnitude: f32) -> Self {
        Self { magnitude, p: 1.0 }
    }
}

macro_rules! magnitude_transform {
    ($(#[$doc:meta])* $name:ident, $label:literal, $default:expr) => {
        $(#[$doc])*
        pub struct $name {
            config: MagnitudeConfig,
            rng: CallRng,
        }

        impl $name {
            #[doc = concat!("Create a new `", $label, "` with the given magnitude.")]
            #[must_use]
            pub fn new(magnitude: f32) -> Self {
                Self::from_config(MagnitudeConfig::new(magnitude))
            }

            /// Create from config.
            #[must_use]
            pub fn from_config(config: MagnitudeConfig) -> Self {
                Self {
                    config,
                    rng: CallRng::new(Seed::from_entropy()),
                }
            }

            /// Set the probability of augmenting a batch.
            #[must_use]
            pub fn with_probability(mut self, p: f32) -> Self {
                self.config.p = p;
                self
            }

            /// Set the random seed.
            #[must_use]
            pub fn with_seed(mut self, seed: Seed) -> Self {
                self.rng = CallRng::new(seed);
                self
            }

            /// Current configuration.
            #[must_use]
            pub fn config(&self) -> MagnitudeConfig {
                self.config
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new($default)
            }
        }

        impl Magnitude for $name {
            fn magnitude(&self) -> f32 {
                self.config.magnitude
            }

            fn set_magnitude(&mut self, magnitude: f32) {
                self.config.magnitude = magnitude;
            }
        }
    };
}

magnitude_transform!(
    /// Adds Gaussian noise scaled by each sample's standard deviation.
    ///
    /// `x + N(0, 1) * magnitude * std(x)`
    TSGaussianNoise,
    "TSGaussianNoise",
    0.5
);

magnitude_transform!(
    /// Adds zero-mean Gaussian noise with standard deviation `magnitude`.
    TSMagAddNoise,
    "TSMagAddNoise",
    1.0
);

magnitude_transform!(
    /// Multiplies each value by `1 + N(0, 1) * magnitude`.
    TSMagMulNoise,
    "TSMagMulNoise",
    0.1
);

magnitude_transform!(
    /// Scales each sample by a factor drawn from `[1 - magnitude, 1 + magnitude]`.
    TSMagScale,
    "TSMagScale",
    0.5
);

magnitude_transform!(
    /// Zeroes a random window covering `magnitude` of each sample's length.
    TSCutOut,
    "TSCutOut",
    0.05
);

impl<B: Backend> Transform<B> for TSGaussianNoise {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, self.config.magnitude, self.config.p, &mut rng) {
            return Ok(batch);
        }

        let magnitude = self.config.magnitude;
        map_samples(batch, |sample| {
            let n = sample.len() as f32;
            let mean = sample.iter().sum::<f32>() / n;
            let std = (sample.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n).sqrt();
            for v in sample.iter_mut() {
                *v += gaussian(&mut rng) * magnitude * std;
            }
        })
    }

    fn name(&self) -> &str {
        "TSGaussianNoise"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }

    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        Some(self)
    }

    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        Some(self)
    }
}

impl<B: Backend> Transform<B> for TSMagAddNoise {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, self.config.magnitude, self.config.p, &mut rng) {
            return Ok(batch);
        }

        let magnitude = self.config.magnitude;
        map_samples(batch, |sample| {
            for v in sample.iter_mut() {
                *v += gaussian(&mut rng) * magnitude;
            }
        })
    }

    fn name(&self) -> &str {
        "TSMagAddNoise"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }

    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        Some(self)
    }

    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        Some(self)
    }
}

impl<B: Backend> Transform<B> for TSMagMulNoise {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, self.config.magnitude, self.config.p, &mut rng) {
            return Ok(batch);
        }

        let magnitude = self.config.magnitude;
        map_samples(batch, |sample| {
            for v in sample.iter_mut() {
                *v *= 1.0 + gaussian(&mut rng) * magnitude;
            }
        })
    }

    fn name(&self) -> &str {
        "TSMagMulNoise"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }

    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        Some(self)
    }

    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        Some(self)
    }
}

impl<B: Backend> Transform<B> for TSMagScale {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, self.config.magnitude, self.config.p, &mut rng) {
            return Ok(batch);
        }

        let magnitude = self.config.magnitude;
        map_samples(batch, |sample| {
            let scale = 1.0 + rng.gen_range(-1.0f32..=1.0) * magnitude;
            for v in sample.iter_mut() {
                *v *= scale;
            }
        })
    }

    fn name(&self) -> &str {
        "TSMagScale"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }

    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        Some(self)
    }

    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        Some(self)
    }
}

impl<B: Backend> Transform<B> for TSCutOut {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, self.config.magnitude, self.config.p, &mut rng) {
            return Ok(batch);
        }

        let shape = batch.x.shape();
        let seq_len = shape.len();
        let window = ((self.config.magnitude.min(1.0) * seq_len as f32).round() as usize).min(seq_len);
        if window == 0 {
            return Ok(batch);
        }

        map_samples(batch, |sample| {
            let start = rng.gen_range(0..=seq_len - window);
            for var in sample.chunks_mut(seq_len) {
                var[start..start + window].fill(0.0);
            }
        })
    }

    fn name(&self) -> &str {
        "TSCutOut"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }

    fn as_magnitude(&self) -> Option<&dyn Magnitude> {
        Some(self)
    }

    fn as_magnitude_mut(&mut self) -> Option<&mut dyn Magnitude> {
        Some(self)
    }
}

/// Reverses the time axis of every sample.
///
/// Has no magnitude, so schedulers leave it alone.
pub struct TSHorizontalFlip {
    p: f32,
    rng: CallRng,
}

impl TSHorizontalFlip {
    /// Create a flip applied to every batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            p: 1.0,
            rng: CallRng::new(Seed::from_entropy()),
        }
    }

    /// Set the probability of flipping a batch.
    #[must_use]
    pub fn with_probability(mut self, p: f32) -> Self {
        self.p = p;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.rng = CallRng::new(seed);
        self
    }
}

impl Default for TSHorizontalFlip {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Transform<B> for TSHorizontalFlip {
    fn apply(&self, batch: TSBatch<B>, split: Split) -> Result<TSBatch<B>> {
        let mut rng = self.rng.next_rng();
        if passthrough(split, 1.0, self.p, &mut rng) {
            return Ok(batch);
        }

        let seq_len = batch.x.shape().len();
        if seq_len == 0 {
            return Ok(batch);
        }
        map_samples(batch, |sample| {
            for var in sample.chunks_mut(seq_len) {
                var.reverse();
            }
        })
    }

    fn name(&self) -> &str {
        "TSHorizontalFlip"
    }

    fn should_apply(&self, split: Split) -> bool {
        split.is_train()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use tsaug_core::TSShape;

    type TestBackend = NdArray;

    fn ramp_batch(batch: usize, vars: usize, len: usize) -> TSBatch<TestBackend> {
        let device = Default::default();
        let values: Vec<f32> = (0..batch * vars * len).map(|v| 1.0 + v as f32).collect();
        TSBatch::new(TSTensor::from_values(&values, TSShape::new(batch, vars, len), &device).unwrap())
    }

    fn values(batch: &TSBatch<TestBackend>) -> Vec<f32> {
        batch.x.to_values().unwrap()
    }

    #[test]
    fn test_zero_magnitude_is_identity() {
        let input = ramp_batch(3, 2, 8);
        let expected = values(&input);

        let noise = TSMagAddNoise::new(0.0).with_seed(Seed::new(1));
        let out = noise.apply(input, Split::Train).unwrap();
        assert_eq!(values(&out), expected);
    }

    #[test]
    fn test_eval_split_is_identity() {
        let input = ramp_batch(2, 1, 6);
        let expected = values(&input);

        let scale = TSMagScale::new(0.9).with_seed(Seed::new(2));
        let out = scale.apply(input, Split::Valid).unwrap();
        assert_eq!(values(&out), expected);
        assert!(!<TSMagScale as Transform<TestBackend>>::should_apply(&scale, Split::Valid));
    }

    #[test]
    fn test_mag_scale_stays_in_range() {
        let input = ramp_batch(8, 2, 5);
        let before = values(&input);
        let scale = TSMagScale::new(0.25).with_seed(Seed::new(3));
        let after = values(&scale.apply(input, Split::Train).unwrap());

        for (sample_before, sample_after) in before.chunks(10).zip(after.chunks(10)) {
            let factor = sample_after[0] / sample_before[0];
            assert!((0.75 - 1e-5..=1.25 + 1e-5).contains(&factor));
            for (b, a) in sample_before.iter().zip(sample_after) {
                assert!((a - b * factor).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_cutout_zeroes_window() {
        let input = ramp_batch(4, 3, 10);
        let cut = TSCutOut::new(0.3).with_seed(Seed::new(4));
        let out = values(&cut.apply(input, Split::Train).unwrap());

        for sample in out.chunks(30) {
            let zeros = sample.iter().filter(|v| **v == 0.0).count();
            assert_eq!(zeros, 3 * 3);
        }
    }

    #[test]
    fn test_flip_twice_restores() {
        let input = ramp_batch(2, 2, 7);
        let expected = values(&input);
        let flip = TSHorizontalFlip::new();

        let once = flip.apply(input, Split::Train).unwrap();
        assert_ne!(values(&once), expected);
        let twice = flip.apply(once, Split::Train).unwrap();
        assert_eq!(values(&twice), expected);
    }

    #[test]
    fn test_seeded_calls_replay_but_vary() {
        let a = TSMagMulNoise::new(0.2).with_seed(Seed::new(5));
        let b = TSMagMulNoise::new(0.2).with_seed(Seed::new(5));

        let a1 = values(&a.apply(ramp_batch(2, 1, 4), Split::Train).unwrap());
        let b1 = values(&b.apply(ramp_batch(2, 1, 4), Split::Train).unwrap());
        assert_eq!(a1, b1);

        let a2 = values(&a.apply(ramp_batch(2, 1, 4), Split::Train).unwrap());
        assert_ne!(a1, a2);
    }

    #[test]
    fn test_gaussian_noise_scales_with_sample_std() {
        let device = Default::default();
        let flat = TSBatch::<TestBackend>::new(
            TSTensor::from_values(&[2.0; 8], TSShape::new(2, 1, 4), &device).unwrap(),
        );
        let noise = TSGaussianNoise::new(1.0).with_seed(Seed::new(6));
        let out = values(&noise.apply(flat, Split::Train).unwrap());
        assert_eq!(out, vec![2.0; 8]);
    }

    #[test]
    fn test_magnitude_capability() {
        let mut t = TSMagAddNoise::new(0.4);
        let m = Transform::<TestBackend>::as_magnitude_mut(&mut t).unwrap();
        m.set_magnitude(m.magnitude() * 0.5);
        assert!((t.config().magnitude - 0.2).abs() < 1e-6);

        let mut flip = TSHorizontalFlip::new();
        assert!(Transform::<TestBackend>::as_magnitude_mut(&mut flip).is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = MagnitudeConfig { magnitude: 0.3, p: 0.5 };
        let json = serde_json::to_string(&config).unwrap();
        let restored: MagnitudeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
        assert_eq!(TSCutOut::from_config(config).config(), config);
    }
}
