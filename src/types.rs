use ndarray::{Array2, ArrayView2};

use crate::{LayerErr, Result};

/// Anything whose axes can be checked against a node's shape annotation.
pub trait Shaped {
    /// Returns the batch's axes, `None` if it has no single shape.
    fn shape(&self) -> Option<&[usize]>;
}

impl Shaped for Array2<f32> {
    fn shape(&self) -> Option<&[usize]> {
        Some(Array2::shape(self))
    }
}

impl Shaped for Vec<Array2<f32>> {
    fn shape(&self) -> Option<&[usize]> {
        None
    }
}

/// A batch of variable-length sequences stored as one buffer of rows plus the length of each
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Ragged {
    data: Array2<f32>,
    lengths: Vec<usize>,
}

impl Ragged {
    /// Creates a new `Ragged`.
    ///
    /// # Arguments
    /// * `data` - The rows of every sequence, concatenated.
    /// * `lengths` - The amount of rows of each sequence.
    ///
    /// # Returns
    /// A new `Ragged` or an error if the lengths don't add up to the amount of rows.
    pub fn new(data: Array2<f32>, lengths: Vec<usize>) -> Result<Self> {
        let total: usize = lengths.iter().sum();
        if total != data.nrows() {
            return Err(LayerErr::ShapeMismatch {
                what: "ragged lengths",
                got: total,
                expected: data.nrows(),
            });
        }

        Ok(Self { data, lengths })
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Returns the amount of sequences in the batch.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn into_parts(self) -> (Array2<f32>, Vec<usize>) {
        (self.data, self.lengths)
    }
}

impl Shaped for Ragged {
    fn shape(&self) -> Option<&[usize]> {
        Some(self.data.shape())
    }
}
