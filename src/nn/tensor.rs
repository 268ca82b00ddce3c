//! A minimal tensor type.
//!
//! Tensors are the inputs and outputs of the neural networks: N-dimensional arrays of `f32`,
//! stored contiguously in row-major order.

use std::fmt;

use tract_onnx::prelude as tract;

/// An owned, row-major tensor of `f32` values.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor from a shape and row-major element data.
    ///
    /// # Panics
    ///
    /// Panics if the number of elements implied by `shape` does not match `data.len()`.
    pub fn from_vec(shape: Vec<usize>, data: Vec<f32>) -> Self {
        let elements: usize = shape.iter().product();
        assert_eq!(
            elements,
            data.len(),
            "tensor of shape {:?} needs {} elements, got {}",
            shape,
            elements,
            data.len()
        );
        Self { shape, data }
    }

    /// Creates a tensor by invoking a closure with the index of every element, in row-major order.
    pub fn from_array_shape_fn<const N: usize>(
        shape: [usize; N],
        mut f: impl FnMut([usize; N]) -> f32,
    ) -> Self {
        let len = shape.iter().product();
        let mut data = Vec::with_capacity(len);
        let mut index = [0; N];
        for _ in 0..len {
            data.push(f(index));

            for dim in (0..N).rev() {
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }

        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns all elements in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Indexes into the leading dimensions of the tensor, returning the remaining elements.
    ///
    /// For a tensor of shape `[1, 2016, 18]`, `index(&[0, 5])` returns the 18 values of row 5.
    ///
    /// # Panics
    ///
    /// Panics if `prefix` has more entries than the tensor has dimensions, or if an index is out of
    /// bounds.
    pub fn index(&self, prefix: &[usize]) -> &[f32] {
        assert!(
            prefix.len() <= self.shape.len(),
            "index {:?} has too many dimensions for tensor of shape {:?}",
            prefix,
            self.shape
        );

        let mut offset = 0;
        for (dim, (&i, &size)) in prefix.iter().zip(&self.shape).enumerate() {
            assert!(
                i < size,
                "index {} out of bounds for dimension {} of size {}",
                i,
                dim,
                size
            );
            offset = offset * size + i;
        }

        let len: usize = self.shape[prefix.len()..].iter().product();
        &self.data[offset * len..][..len]
    }

    pub(super) fn to_tract(&self) -> anyhow::Result<tract::Tensor> {
        Ok(tract::Tensor::from_shape(&self.shape, &self.data)?)
    }

    pub(super) fn from_tract(tensor: &tract::Tensor) -> anyhow::Result<Self> {
        let data = tensor.as_slice::<f32>()?.to_vec();
        Ok(Self::from_vec(tensor.shape().to_vec(), data))
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{:?}", self.shape)
    }
}
