//! Minimal row-major tensor for probability data
//!
//! The decode pipeline deals with two tensor shapes: stacked per-step
//! distributions `[steps, batch, extended_vocab]` consumed by the loss
//! evaluator, and per-beam attention matrices `[steps, source_width]`
//! consumed by UNK replacement and the attention dump. Both are dense,
//! row-major, and never resized after construction.

use std::fmt;

use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::error::{ApuntarError, Result};

/// Dense N-dimensional array in row-major order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor<T: Num> {
    /// Flattened data in row-major order
    data: Vec<T>,
    /// Shape of the tensor
    shape: Vec<usize>,
}

impl<T: Num + Clone> Tensor<T> {
    /// Create a new tensor from a vector and shape
    ///
    /// # Errors
    ///
    /// Returns `Err` if the shape is empty, contains zero, or doesn't
    /// match the data size.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if shape.is_empty() {
            return Err(ApuntarError::InvalidShape {
                reason: "Shape cannot be empty".to_string(),
            });
        }

        if shape.contains(&0) {
            return Err(ApuntarError::InvalidShape {
                reason: "Shape dimensions cannot be zero".to_string(),
            });
        }

        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(ApuntarError::DataShapeMismatch {
                data_size: data.len(),
                shape: shape.clone(),
                expected,
            });
        }

        Ok(Self { data, shape })
    }

    /// Create a tensor filled with zeros
    ///
    /// # Errors
    ///
    /// Returns `Err` if the shape is empty or contains zero.
    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let size: usize = shape.iter().product();
        Self::from_vec(shape, vec![T::zero(); size])
    }

    /// Get the shape of the tensor
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the number of dimensions
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get a reference to the flattened data
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Get one row of a 2-D tensor
    ///
    /// For an attention matrix `[steps, width]` this is the attention
    /// distribution of one decode step.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the tensor is not 2-D or the row is out of range.
    pub fn row(&self, row: usize) -> Result<&[T]> {
        if self.shape.len() != 2 {
            return Err(ApuntarError::InvalidShape {
                reason: format!(
                    "row access requires a 2-D tensor, got {}-D",
                    self.shape.len()
                ),
            });
        }
        if row >= self.shape[0] {
            return Err(ApuntarError::InvalidShape {
                reason: format!("row {row} out of range for {} rows", self.shape[0]),
            });
        }
        let width = self.shape[1];
        Ok(&self.data[row * width..(row + 1) * width])
    }

    /// Get a single element of a 3-D tensor
    ///
    /// Used by the loss evaluator to index stacked distributions as
    /// `[step, example, extended_id]`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the tensor is not 3-D or an index is out of range.
    pub fn at3(&self, i: usize, j: usize, k: usize) -> Result<&T> {
        if self.shape.len() != 3 {
            return Err(ApuntarError::InvalidShape {
                reason: format!("at3 requires a 3-D tensor, got {}-D", self.shape.len()),
            });
        }
        let (d0, d1, d2) = (self.shape[0], self.shape[1], self.shape[2]);
        if i >= d0 || j >= d1 || k >= d2 {
            return Err(ApuntarError::InvalidShape {
                reason: format!("index [{i}, {j}, {k}] out of range for shape [{d0}, {d1}, {d2}]"),
            });
        }
        Ok(&self.data[(i * d1 + j) * d2 + k])
    }

    /// Crop a 2-D tensor to its top-left `[rows, cols]` corner
    ///
    /// Attention matrices are padded to the batch maximum in both
    /// dimensions; before dumping they must be cropped to the actual
    /// predicted and source lengths.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the tensor is not 2-D or the requested corner
    /// exceeds the tensor.
    pub fn crop(&self, rows: usize, cols: usize) -> Result<Self> {
        if self.shape.len() != 2 {
            return Err(ApuntarError::InvalidShape {
                reason: format!("crop requires a 2-D tensor, got {}-D", self.shape.len()),
            });
        }
        if rows == 0 || cols == 0 {
            return Err(ApuntarError::InvalidShape {
                reason: "crop target dimensions cannot be zero".to_string(),
            });
        }
        if rows > self.shape[0] || cols > self.shape[1] {
            return Err(ApuntarError::InvalidShape {
                reason: format!(
                    "crop [{rows}, {cols}] exceeds tensor shape {:?}",
                    self.shape
                ),
            });
        }

        let width = self.shape[1];
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            data.extend_from_slice(&self.data[r * width..r * width + cols]);
        }
        Self::from_vec(vec![rows, cols], data)
    }
}

impl<T: Num + fmt::Display> fmt::Display for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor(shape={:?})", self.shape)
    }
}
