//! Time series tensor and batch types.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape metadata for `(B, V, L)` time series tensors.
///
/// ```rust
/// use tsaug_core::TSShape;
///
/// let shape = TSShape::new(32, 3, 100);
/// assert_eq!(shape.numel(), 9600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TSShape {
    batch: usize,
    vars: usize,
    len: usize,
}

impl TSShape {
    /// Create a shape from batch size, variable count and sequence length.
    #[must_use]
    pub const fn new(batch: usize, vars: usize, len: usize) -> Self {
        Self { batch, vars, len }
    }

    /// Number of samples.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Number of variables/channels.
    #[must_use]
    pub const fn vars(&self) -> usize {
        self.vars
    }

    /// Sequence length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether any dimension is zero.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch == 0 || self.vars == 0 || self.len == 0
    }

    /// Total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.batch * self.vars * self.len
    }

    /// Elements per sample (`V * L`).
    #[must_use]
    pub const fn sample_numel(&self) -> usize {
        self.vars * self.len
    }

    /// Dimensions as an array.
    #[must_use]
    pub const fn as_array(&self) -> [usize; 3] {
        [self.batch, self.vars, self.len]
    }
}

/// Read a tensor back to the host as `f32` values in row-major order.
pub fn read_f32<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::DataReadError(format!("{e:?}")))
}

/// Build a 1D integer index tensor.
pub fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let ints: Vec<i32> = indices.iter().map(|&i| i as i32).collect();
    Tensor::<B, 1, Int>::from_ints(ints.as_slice(), device)
}

/// A Burn tensor with `(B, V, L)` shape metadata.
#[derive(Debug, Clone)]
pub struct TSTensor<B: Backend> {
    inner: Tensor<B, 3>,
    shape: TSShape,
}

impl<B: Backend> TSTensor<B> {
    /// Wrap a 3D tensor of shape `(batch, vars, len)`.
    pub fn new(tensor: Tensor<B, 3>) -> Result<Self> {
        let dims = tensor.dims();
        Ok(Self {
            inner: tensor,
            shape: TSShape::new(dims[0], dims[1], dims[2]),
        })
    }

    /// Build a tensor from host values laid out row-major.
    pub fn from_values(values: &[f32], shape: TSShape, device: &B::Device) -> Result<Self> {
        if values.len() != shape.numel() {
            return Err(CoreError::ShapeMismatch(format!(
                "{} values cannot fill shape {:?}",
                values.len(),
                shape.as_array()
            )));
        }
        let tensor = Tensor::<B, 1>::from_floats(values, device).reshape(shape.as_array());
        Self::new(tensor)
    }

    /// Shape metadata.
    #[must_use]
    pub const fn shape(&self) -> TSShape {
        self.shape
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.shape.batch()
    }

    /// Reference to the underlying tensor.
    #[must_use]
    pub const fn inner(&self) -> &Tensor<B, 3> {
        &self.inner
    }

    /// Consume and return the underlying tensor.
    #[must_use]
    pub fn into_inner(self) -> Tensor<B, 3> {
        self.inner
    }

    /// Device of the tensor.
    pub fn device(&self) -> B::Device {
        self.inner.device()
    }

    /// Copy the values back to the host.
    pub fn to_values(&self) -> Result<Vec<f32>> {
        read_f32(self.inner.clone())
    }
}

/// A batch of time series inputs with optional targets.
///
/// This is what the learner hands to callbacks as the current batch.
#[derive(Debug, Clone)]
pub struct TSBatch<B: Backend> {
    /// Input tensor (B, V, L).
    pub x: TSTensor<B>,
    /// Optional target tensor (B, T).
    pub y: Option<Tensor<B, 2>>,
}

impl<B: Backend> TSBatch<B> {
    /// Create a batch with inputs only.
    pub fn new(x: TSTensor<B>) -> Self {
        Self { x, y: None }
    }

    /// Create a batch with inputs and targets of matching batch size.
    pub fn with_target(x: TSTensor<B>, y: Tensor<B, 2>) -> Result<Self> {
        let y_batch = y.dims()[0];
        if x.batch() != y_batch {
            return Err(CoreError::ShapeMismatch(format!(
                "x batch size {} != y batch size {}",
                x.batch(),
                y_batch
            )));
        }
        Ok(Self { x, y: Some(y) })
    }

    /// Batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.x.batch()
    }

    /// Device of the inputs.
    pub fn device(&self) -> B::Device {
        self.x.device()
    }

    /// Targets, or [`CoreError::MissingTargets`].
    pub fn targets(&self) -> Result<&Tensor<B, 2>> {
        self.y.as_ref().ok_or(CoreError::MissingTargets)
    }

    /// Keep the same targets but swap the inputs.
    pub fn with_inputs(self, x: TSTensor<B>) -> Self {
        Self { x, y: self.y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_shape_accessors() {
        let shape = TSShape::new(4, 2, 5);
        assert_eq!(shape.batch(), 4);
        assert_eq!(shape.sample_numel(), 10);
        assert!(!shape.is_empty());
        assert!(TSShape::new(0, 2, 5).is_empty());
    }

    #[test]
    fn test_from_values_roundtrip() {
        let device = Default::default();
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let x = TSTensor::<TestBackend>::from_values(&values, TSShape::new(2, 2, 3), &device).unwrap();
        assert_eq!(x.shape().as_array(), [2, 2, 3]);
        assert_eq!(x.to_values().unwrap(), values);
    }

    #[test]
    fn test_from_values_rejects_wrong_length() {
        let device = Default::default();
        let err = TSTensor::<TestBackend>::from_values(&[1.0; 5], TSShape::new(2, 1, 3), &device);
        assert!(matches!(err, Err(CoreError::ShapeMismatch(_))));
    }

    #[test]
    fn test_batch_target_mismatch() {
        let device = Default::default();
        let x = TSTensor::<TestBackend>::from_values(&[0.0; 6], TSShape::new(2, 1, 3), &device).unwrap();
        let y = Tensor::<TestBackend, 2>::zeros([3, 1], &device);
        assert!(TSBatch::with_target(x.clone(), y).is_err());
        assert!(matches!(TSBatch::new(x).targets(), Err(CoreError::MissingTargets)));
    }
}
