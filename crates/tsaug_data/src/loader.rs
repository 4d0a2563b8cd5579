//! Dataloaders that track original dataset indices.

use burn::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::dataset::TSDataset;
use crate::error::{DataError, Result};
use tsaug_core::{Seed, Split, TSBatch, TSShape, TSTensor};

/// A batch together with the split positions its rows were drawn from.
#[derive(Debug, Clone)]
pub struct LoadedBatch<B: Backend> {
    /// The tensors.
    pub batch: TSBatch<B>,
    /// Position of each row within the loader's split (shuffled order).
    pub idxs: Vec<usize>,
}

/// A dataloader over one split.
///
/// `split_idxs[p]` is the index in the original (pre-split) dataset of the
/// sample at split position `p`.
///
/// ```rust,ignore
/// let loader = TSDataLoader::builder(train_ds)
///     .batch_size(32)
///     .shuffle(true)
///     .seed(Seed::new(42))
///     .build()?;
///
/// for item in loader.iter::<B>(epoch, &device) {
///     let LoadedBatch { batch, idxs } = item?;
/// }
/// ```
pub struct TSDataLoader {
    dataset: TSDataset,
    split_idxs: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Seed,
    split: Split,
}

impl TSDataLoader {
    /// Create a new dataloader builder.
    #[must_use]
    pub fn builder(dataset: TSDataset) -> TSDataLoaderBuilder {
        TSDataLoaderBuilder::new(dataset)
    }

    /// The dataset served by this loader.
    #[must_use]
    pub fn dataset(&self) -> &TSDataset {
        &self.dataset
    }

    /// Original dataset index of every split position.
    #[must_use]
    pub fn split_idxs(&self) -> &[usize] {
        &self.split_idxs
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per pass.
    #[must_use]
    pub fn n_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the loader has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// The split this loader serves.
    #[must_use]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Iterate over the batches of one pass.
    ///
    /// The shuffle order depends on the loader seed and `epoch`, so every
    /// epoch sees a different but reproducible order.
    #[must_use]
    pub fn iter<B: Backend>(&self, epoch: usize, device: &B::Device) -> TSDataLoaderIter<'_, B> {
        TSDataLoaderIter::new(self, epoch, device.clone())
    }
}

/// Builder for [`TSDataLoader`].
pub struct TSDataLoaderBuilder {
    dataset: TSDataset,
    split_idxs: Option<Vec<usize>>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: Option<Seed>,
    split: Split,
}

impl TSDataLoaderBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(dataset: TSDataset) -> Self {
        Self {
            dataset,
            split_idxs: None,
            batch_size: 32,
            shuffle: false,
            drop_last: false,
            seed: None,
            split: Split::Train,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling.
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Enable or disable dropping the last incomplete batch.
    #[must_use]
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the data split type.
    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Set the original dataset index of each sample. Defaults to `0..len`.
    #[must_use]
    pub fn split_idxs(mut self, split_idxs: Vec<usize>) -> Self {
        self.split_idxs = Some(split_idxs);
        self
    }

    /// Build the dataloader.
    pub fn build(self) -> Result<TSDataLoader> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidBatchSize(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.dataset.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        let split_idxs = self
            .split_idxs
            .unwrap_or_else(|| (0..self.dataset.len()).collect());
        if split_idxs.len() != self.dataset.len() {
            return Err(DataError::InvalidShape(format!(
                "{} split indices for {} samples",
                split_idxs.len(),
                self.dataset.len()
            )));
        }

        Ok(TSDataLoader {
            dataset: self.dataset,
            split_idxs,
            batch_size: self.batch_size,
            shuffle: self.shuffle,
            drop_last: self.drop_last,
            seed: self.seed.unwrap_or_else(Seed::from_entropy),
            split: self.split,
        })
    }
}

/// Iterator over the batches of a [`TSDataLoader`].
pub struct TSDataLoaderIter<'a, B: Backend> {
    loader: &'a TSDataLoader,
    device: B::Device,
    order: Vec<usize>,
    current_batch: usize,
    n_batches: usize,
}

impl<'a, B: Backend> TSDataLoaderIter<'a, B> {
    fn new(loader: &'a TSDataLoader, epoch: usize, device: B::Device) -> Self {
        let mut order: Vec<usize> = (0..loader.dataset.len()).collect();

        if loader.shuffle {
            let mut rng: ChaCha8Rng = loader.seed.derive_index(epoch as u64).to_rng();
            order.shuffle(&mut rng);
        }

        Self {
            loader,
            device,
            order,
            current_batch: 0,
            n_batches: loader.n_batches(),
        }
    }

    fn create_batch(&self, positions: &[usize]) -> Result<TSBatch<B>> {
        let dataset = &self.loader.dataset;
        let shape = TSShape::new(positions.len(), dataset.n_vars(), dataset.seq_len());

        let mut x_flat = Vec::with_capacity(shape.numel());
        let mut y_flat = dataset
            .target_dim()
            .map(|t| Vec::with_capacity(positions.len() * t));

        for &pos in positions {
            let (x_sample, y_sample) = dataset.get(pos)?;
            x_flat.extend(x_sample.iter().copied());
            if let (Some(ys), Some(y)) = (y_flat.as_mut(), y_sample) {
                ys.extend(y.iter().copied());
            }
        }

        let x = TSTensor::from_values(&x_flat, shape, &self.device)?;

        match (y_flat, dataset.target_dim()) {
            (Some(ys), Some(t)) => {
                let y = Tensor::<B, 1>::from_floats(ys.as_slice(), &self.device)
                    .reshape([positions.len(), t]);
                Ok(TSBatch::with_target(x, y)?)
            }
            _ => Ok(TSBatch::new(x)),
        }
    }
}

impl<B: Backend> Iterator for TSDataLoaderIter<'_, B> {
    type Item = Result<LoadedBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_batch >= self.n_batches {
            return None;
        }

        let start = self.current_batch * self.loader.batch_size;
        let end = std::cmp::min(start + self.loader.batch_size, self.order.len());
        let idxs = self.order[start..end].to_vec();
        self.current_batch += 1;

        Some(self.create_batch(&idxs).map(|batch| LoadedBatch { batch, idxs }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.n_batches - self.current_batch;
        (remaining, Some(remaining))
    }
}

impl<B: Backend> ExactSizeIterator for TSDataLoaderIter<'_, B> {}

/// Paired dataloaders for training and validation.
pub struct TSDataLoaders {
    train: TSDataLoader,
    valid: TSDataLoader,
}

impl TSDataLoaders {
    /// Builder over separate train and valid datasets.
    ///
    /// Original indices are `0..n_train` for train and
    /// `n_train..n_train + n_valid` for valid.
    #[must_use]
    pub fn builder(train: TSDataset, valid: TSDataset) -> TSDataLoadersBuilder {
        let n_train = train.len();
        let n_valid = valid.len();
        TSDataLoadersBuilder::new(
            train,
            valid,
            (0..n_train).collect(),
            (n_train..n_train + n_valid).collect(),
        )
    }

    /// Builder that splits one dataset by original indices.
    pub fn from_splits(
        dataset: &TSDataset,
        train_idxs: &[usize],
        valid_idxs: &[usize],
    ) -> Result<TSDataLoadersBuilder> {
        Ok(TSDataLoadersBuilder::new(
            dataset.subset(train_idxs)?,
            dataset.subset(valid_idxs)?,
            train_idxs.to_vec(),
            valid_idxs.to_vec(),
        ))
    }

    /// Training dataloader.
    #[must_use]
    pub fn train(&self) -> &TSDataLoader {
        &self.train
    }

    /// Validation dataloader.
    #[must_use]
    pub fn valid(&self) -> &TSDataLoader {
        &self.valid
    }

    /// Total number of samples over both splits.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.train.len() + self.valid.len()
    }
}

/// Builder for [`TSDataLoaders`].
pub struct TSDataLoadersBuilder {
    train: TSDataset,
    valid: TSDataset,
    train_idxs: Vec<usize>,
    valid_idxs: Vec<usize>,
    batch_size: usize,
    shuffle_train: bool,
    seed: Option<Seed>,
}

impl TSDataLoadersBuilder {
    fn new(train: TSDataset, valid: TSDataset, train_idxs: Vec<usize>, valid_idxs: Vec<usize>) -> Self {
        Self {
            train,
            valid,
            train_idxs,
            valid_idxs,
            batch_size: 32,
            shuffle_train: true,
            seed: None,
        }
    }

    /// Set the batch size for both loaders.
    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Enable or disable shuffling for the training loader.
    #[must_use]
    pub fn shuffle_train(mut self, shuffle: bool) -> Self {
        self.shuffle_train = shuffle;
        self
    }

    /// Set the random seed.
    #[must_use]
    pub fn seed(mut self, seed: Seed) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the dataloaders.
    pub fn build(self) -> Result<TSDataLoaders> {
        let seed = self.seed.unwrap_or_else(Seed::from_entropy);

        let train = TSDataLoader::builder(self.train)
            .batch_size(self.batch_size)
            .shuffle(self.shuffle_train)
            .seed(seed.derive("train"))
            .split(Split::Train)
            .split_idxs(self.train_idxs)
            .build()?;

        let valid = TSDataLoader::builder(self.valid)
            .batch_size(self.batch_size)
            .shuffle(false)
            .seed(seed.derive("valid"))
            .split(Split::Valid)
            .split_idxs(self.valid_idxs)
            .build()?;

        tracing::debug!(
            "Built dataloaders: {} train / {} valid samples, batch size {}",
            train.len(),
            valid.len(),
            self.batch_size
        );
        Ok(TSDataLoaders { train, valid })
    }
}
