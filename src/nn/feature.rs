//! Tensors paired with their logical dims

use crate::autograd::Tensor;
use crate::error::{Error, Result};

/// A flat tensor plus the memory-order dims it represents
#[derive(Debug, Clone)]
pub struct FeatureMap {
    pub tensor: Tensor,
    pub dims: Vec<usize>,
}

impl FeatureMap {
    /// Pair `tensor` with `dims`
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if the dims do not cover the tensor exactly.
    pub fn new(tensor: Tensor, dims: Vec<usize>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if expected != tensor.len() {
            return Err(Error::ShapeMismatch {
                expected: dims,
                got: vec![tensor.len()],
            });
        }
        Ok(Self { tensor, dims })
    }

    /// Input map with no gradient tracking
    pub fn from_vec(data: Vec<f32>, dims: Vec<usize>) -> Result<Self> {
        Self::new(Tensor::from_vec(data, false), dims)
    }

    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensor.is_empty()
    }

    /// Same data seen as `[batch, features]`
    pub fn flatten(self) -> Self {
        let batch = self.dims.first().copied().unwrap_or(1).max(1);
        let features = self.tensor.len() / batch;
        Self {
            tensor: self.tensor,
            dims: vec![batch, features],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_must_cover_tensor() {
        assert!(FeatureMap::from_vec(vec![0.0; 12], vec![1, 3, 2, 2]).is_ok());
        let err = FeatureMap::from_vec(vec![0.0; 10], vec![1, 3, 2, 2]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_flatten_keeps_batch() {
        let map = FeatureMap::from_vec(vec![0.0; 24], vec![2, 3, 2, 2]).unwrap();
        assert_eq!(map.flatten().dims, vec![2, 12]);
    }
}
