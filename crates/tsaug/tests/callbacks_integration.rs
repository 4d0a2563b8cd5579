//! Integration tests for the augmentation callbacks.
//!
//! Each test runs complete fits over synthetic data and inspects the state
//! the learner hands back.

use std::sync::{Arc, Mutex};

use burn::prelude::*;
use burn_ndarray::NdArray;
use ndarray::{Array2, Array3};

use tsaug::prelude::*;
use tsaug_train::{FnLoss, Result, TrainError};

type TestBackend = NdArray;
type Model = fn(Tensor<TestBackend, 3>) -> Tensor<TestBackend, 2>;

/// Mean of each variable over time.
fn mean_model(x: Tensor<TestBackend, 3>) -> Tensor<TestBackend, 2> {
    let [b, v, _] = x.dims();
    x.mean_dim(2).reshape([b, v])
}

/// Create synthetic series whose target is a multiple of their mean.
fn create_synthetic_data(n_samples: usize, seq_len: usize, seed: u64) -> (Array3<f32>, Array2<f32>) {
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array3::from_shape_fn((n_samples, 1, seq_len), |(i, _, t)| {
        (i as f32) * 0.25 + (t as f32 / seq_len as f32) + rng.gen::<f32>() * 0.1
    });
    let y = Array2::from_shape_fn((n_samples, 1), |(i, _)| {
        let row = x.slice(ndarray::s![i, 0, ..]);
        2.0 * row.sum() / seq_len as f32
    });
    (x, y)
}

fn dataloaders(n_train: usize, n_valid: usize, batch_size: usize) -> TSDataLoaders {
    let (x_train, y_train) = create_synthetic_data(n_train, 16, 1);
    let (x_valid, y_valid) = create_synthetic_data(n_valid, 16, 2);
    let train_ds = TSDataset::from_arrays(x_train, Some(y_train)).expect("Failed to create train dataset");
    let valid_ds = TSDataset::from_arrays(x_valid, Some(y_valid)).expect("Failed to create valid dataset");

    TSDataLoaders::builder(train_ds, valid_ds)
        .batch_size(batch_size)
        .shuffle_train(false)
        .seed(Seed::new(42))
        .build()
        .expect("Failed to create dataloaders")
}

fn learner(dls: TSDataLoaders) -> Learner<TestBackend, Model> {
    let device = Default::default();
    Learner::<TestBackend, Model>::new(mean_model, dls, MSELossFlat::new(), &device)
}

fn noise_pool() -> Vec<Box<dyn Transform<TestBackend>>> {
    vec![
        Box::new(TSMagScale::new(0.3).with_seed(Seed::new(1))),
        Box::new(TSMagAddNoise::new(0.2).with_seed(Seed::new(2))),
        Box::new(TSMagMulNoise::new(0.2).with_seed(Seed::new(3))),
        Box::new(TSGaussianNoise::new(0.1).with_seed(Seed::new(4))),
    ]
}

/// What a probe saw after each prediction.
#[derive(Debug, Clone, PartialEq)]
struct Seen {
    training: bool,
    rows: usize,
    target_rows: usize,
    magnitude: Option<f32>,
}

/// Records batch shapes and the first pipeline magnitude after each prediction.
struct Probe {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Probe {
    fn new() -> (Self, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Self { seen: seen.clone() }, seen)
    }
}

impl Callback<TestBackend> for Probe {
    fn after_pred(&mut self, ctx: &mut CallbackContext<'_, TestBackend>) -> Result<()> {
        let batch = ctx.batch()?;
        let pred_rows = ctx.pred.as_ref().map_or(0, |p| p.dims()[0]);
        assert_eq!(pred_rows, batch.batch_size());
        let seen = Seen {
            training: ctx.training,
            rows: batch.batch_size(),
            target_rows: batch.targets()?.dims()[0],
            magnitude: ctx
                .batch_tfms
                .first()
                .and_then(|t| t.as_magnitude())
                .map(|m| m.magnitude()),
        };
        self.seen.lock().unwrap().push(seen);
        Ok(())
    }

    fn name(&self) -> &str {
        "Probe"
    }
}

fn first_magnitude(learner: &Learner<TestBackend, Model>) -> f32 {
    learner.batch_tfms()[0].as_magnitude().unwrap().magnitude()
}

#[test]
fn test_scheduler_ramps_and_restores_after_full_fit() {
    let (probe, seen) = Probe::new();
    let mut learner = learner(dataloaders(8, 4, 4))
        .add_batch_tfm(TSMagScale::new(0.5).with_seed(Seed::new(9)))
        .add_batch_tfm(TSCutOut::new(0.4).with_seed(Seed::new(10)))
        .add_callback(TransformScheduler::new(sched_lin(0.0, 1.0)))
        .add_callback(probe);

    learner.fit(3, |_, _, _| Ok(())).unwrap();

    let train: Vec<f32> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.training)
        .filter_map(|s| s.magnitude)
        .collect();
    // 3 epochs x 2 batches: multipliers k / 5.
    assert_eq!(train.len(), 6);
    for (k, magnitude) in train.iter().enumerate() {
        assert!((magnitude - 0.5 * k as f32 / 5.0).abs() < 1e-6, "step {k}: {magnitude}");
    }

    assert_eq!(first_magnitude(&learner), 0.5);
    assert_eq!(learner.batch_tfms()[1].as_magnitude().unwrap().magnitude(), 0.4);
}

#[test]
fn test_scheduler_restores_after_aborted_fit() {
    let mut learner = learner(dataloaders(12, 4, 4))
        .add_batch_tfm(TSMagScale::new(0.5).with_seed(Seed::new(9)))
        .add_callback(TransformScheduler::new(sched_cos(1.0, 0.0)));

    let mut calls = 0;
    let result = learner.fit(4, |_, _, _| {
        calls += 1;
        if calls == 5 {
            return Err(TrainError::Other("interrupted".to_string()));
        }
        Ok(())
    });

    assert!(matches!(result, Err(TrainError::Other(msg)) if msg == "interrupted"));
    assert_eq!(calls, 5);
    assert_eq!(first_magnitude(&learner), 0.5);
}

#[test]
fn test_ubdaug_expands_training_batches_only() {
    let ubd = UBDAug::new(
        noise_pool(),
        UBDAugConfig {
            n: 2,
            c: 4,
            s: 2,
            seed: Some(0),
        },
    )
    .unwrap();
    let (probe, seen) = Probe::new();
    let mut learner = learner(dataloaders(10, 6, 4)).add_callback(ubd).add_callback(probe);

    learner.fit(1, |_, loss, _| {
        assert_eq!(loss.dims(), [1]);
        Ok(())
    })
    .unwrap();

    let seen = seen.lock().unwrap();
    let train: Vec<(usize, usize)> = seen.iter().filter(|s| s.training).map(|s| (s.rows, s.target_rows)).collect();
    let valid: Vec<usize> = seen.iter().filter(|s| !s.training).map(|s| s.rows).collect();
    // Batches of 4, 4 and 2 samples, two views each.
    assert_eq!(train, vec![(8, 8), (8, 8), (4, 4)]);
    assert_eq!(valid, vec![4, 2]);

    let loss = learner.loss_func().unwrap();
    assert_eq!(loss.reduction(), Some(Reduction::Mean));
}

#[test]
fn test_uniform_instance_weights_match_plain_loss() {
    let mut plain = learner(dataloaders(6, 3, 3));
    plain.fit(2, |_, _, _| Ok(())).unwrap();

    let mut weighted = learner(dataloaders(6, 3, 3)).add_callback(WeightedPerSampleLoss::new(vec![1.0; 9]));
    weighted.fit(2, |_, _, _| Ok(())).unwrap();

    let a = &plain.recorder().losses;
    let b = &weighted.recorder().losses;
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert!((x - y).abs() < 1e-4, "{x} vs {y}");
    }

    let loss = weighted.loss_func().unwrap();
    assert_eq!(loss.name(), "MSELossFlat");
    assert_eq!(loss.reduction(), Some(Reduction::Mean));
}

#[test]
fn test_weight_table_mismatch_fails_before_any_batch() {
    let (probe, seen) = Probe::new();
    let mut learner = learner(dataloaders(6, 3, 3))
        .add_callback(WeightedPerSampleLoss::new(vec![1.0; 8]))
        .add_callback(probe);

    let mut steps = 0;
    let err = learner
        .fit(1, |_, _, _| {
            steps += 1;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, TrainError::WeightTableMismatch { expected: 9, got: 8 }));
    assert_eq!(steps, 0);
    assert!(seen.lock().unwrap().is_empty());
    let loss = learner.loss_func().unwrap();
    assert_eq!(loss.name(), "MSELossFlat");
    assert_eq!(loss.reduction(), Some(Reduction::Mean));
}

#[test]
fn test_ubdaug_with_instance_weights() {
    let ubd = UBDAug::new(
        noise_pool(),
        UBDAugConfig {
            n: 1,
            c: 3,
            s: 3,
            seed: Some(5),
        },
    )
    .unwrap();
    let weights: Vec<f32> = (0..12).map(|i| 1.0 + i as f32).collect();
    let mut learner = learner(dataloaders(8, 4, 4))
        .add_callback(ubd)
        .add_callback(WeightedPerSampleLoss::new(weights))
        .add_callback(TransformScheduler::new(sched_no(1.0, 1.0)))
        .add_callback(ShowGraph::new().with_plot_metrics(false));

    learner.fit(2, |_, _, _| Ok(())).unwrap();

    let recorder = learner.recorder();
    assert_eq!(recorder.losses.len(), 4);
    assert!(recorder.losses.iter().all(|l| l.is_finite()));
    assert!(recorder.valid_losses().iter().all(|l| l.is_finite()));

    let loss = learner.loss_func().unwrap();
    assert_eq!(loss.name(), "MSELossFlat");
    assert_eq!(loss.reduction(), Some(Reduction::Mean));
}

#[test]
fn test_gamblers_drops_abstention_column() {
    let device = Default::default();
    let with_abstain: Model = |x| {
        let pred = mean_model(x);
        let abstain = pred.zeros_like();
        Tensor::cat(vec![pred, abstain], 1)
    };
    let gamblers_loss = FnLoss::new("gamblers", |pred: Tensor<TestBackend, 2>, target: Tensor<TestBackend, 2>| {
        let [rows, _] = pred.dims();
        let diff = pred.slice([0..rows, 0..1]) - target;
        (diff.clone() * diff).mean()
    });
    let mut learner = Learner::<TestBackend, Model>::new(with_abstain, dataloaders(4, 2, 2), gamblers_loss, &device)
        .add_callback(GamblersCallback::new())
        .add_metric(MAE);

    learner.fit(1, |_, _, _| Ok(())).unwrap();
    let epoch = &learner.recorder().values[0];
    assert!(epoch.metrics["mae"].is_finite());
    assert!(learner.recorder().losses.iter().all(|l| l.is_finite()));
}
