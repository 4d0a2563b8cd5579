//! In-memory time series dataset.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{DataError, Result};

/// A dataset of `(N, V, L)` inputs with optional `(N, T)` targets.
///
/// ```rust,ignore
/// use tsaug_data::TSDataset;
/// use ndarray::{Array2, Array3};
///
/// let ds = TSDataset::from_arrays(Array3::zeros((100, 3, 50)), Some(Array2::zeros((100, 1))))?;
/// ```
#[derive(Debug, Clone)]
pub struct TSDataset {
    x: Array3<f32>,
    y: Option<Array2<f32>>,
}

impl TSDataset {
    /// Create a dataset, checking that inputs and targets agree on `N`.
    pub fn from_arrays(x: Array3<f32>, y: Option<Array2<f32>>) -> Result<Self> {
        let n_samples = x.shape()[0];

        if let Some(ref targets) = y {
            if targets.shape()[0] != n_samples {
                return Err(DataError::InvalidShape(format!(
                    "x has {} samples but y has {} samples",
                    n_samples,
                    targets.shape()[0]
                )));
            }
        }

        Ok(Self { x, y })
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.shape()[0]
    }

    /// Whether the dataset has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of variables.
    #[must_use]
    pub fn n_vars(&self) -> usize {
        self.x.shape()[1]
    }

    /// Sequence length.
    #[must_use]
    pub fn seq_len(&self) -> usize {
        self.x.shape()[2]
    }

    /// Target width, if the dataset has targets.
    #[must_use]
    pub fn target_dim(&self) -> Option<usize> {
        self.y.as_ref().map(|y| y.shape()[1])
    }

    /// Input and target views of one sample.
    pub fn get(&self, index: usize) -> Result<(ArrayView2<'_, f32>, Option<ArrayView1<'_, f32>>)> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfBounds {
                index,
                length: self.len(),
            });
        }

        let x = self.x.index_axis(Axis(0), index);
        let y = self.y.as_ref().map(|y| y.index_axis(Axis(0), index));
        Ok((x, y))
    }

    /// Copy the samples at `indices` into a new dataset, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(DataError::IndexOutOfBounds {
                index: bad,
                length: self.len(),
            });
        }

        let x = self.x.select(Axis(0), indices);
        let y = self.y.as_ref().map(|y| y.select(Axis(0), indices));
        Ok(Self { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize) -> TSDataset {
        let x = Array3::from_shape_fn((n, 2, 4), |(i, _, _)| i as f32);
        let y = Array2::from_shape_fn((n, 1), |(i, _)| i as f32);
        TSDataset::from_arrays(x, Some(y)).unwrap()
    }

    #[test]
    fn test_dataset_shape() {
        let ds = dataset(10);
        assert_eq!(ds.len(), 10);
        assert_eq!(ds.n_vars(), 2);
        assert_eq!(ds.seq_len(), 4);
        assert_eq!(ds.target_dim(), Some(1));
    }

    #[test]
    fn test_mismatched_targets_rejected() {
        let x = Array3::zeros((3, 1, 2));
        let y = Array2::zeros((4, 1));
        assert!(TSDataset::from_arrays(x, Some(y)).is_err());
    }

    #[test]
    fn test_subset_keeps_order() {
        let ds = dataset(10);
        let sub = ds.subset(&[7, 2]).unwrap();
        assert_eq!(sub.len(), 2);
        let (x, y) = sub.get(0).unwrap();
        assert_eq!(x[[0, 0]], 7.0);
        assert_eq!(y.unwrap()[0], 7.0);
        assert!(matches!(
            ds.subset(&[10]),
            Err(DataError::IndexOutOfBounds { index: 10, length: 10 })
        ));
    }
}
