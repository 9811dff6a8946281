use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut, Dimension};

use crate::{Result, initialization::fans};

/// The numeric backend every node computes with.
///
/// Nodes share a single backend and only read from it: implementations must be pure functions of
/// their arguments, except for the random state consumed by the `*_fill` methods.
pub trait Ops {
    /// Computes the batched linear transform `x · wᵗ + b`.
    ///
    /// # Arguments
    /// * `w` - The weights, shaped `(nO, nI)`.
    /// * `b` - The biases, shaped `(nO,)`.
    /// * `x` - The input batch, shaped `(nB, nI)`.
    ///
    /// # Returns
    /// The output batch, shaped `(nB, nO)`.
    fn affine(&self, w: ArrayView2<f32>, b: ArrayView1<f32>, x: ArrayView2<f32>) -> Array2<f32>;

    /// Sums the outer products of the rows of `a` and `b` over the batch axis.
    ///
    /// # Arguments
    /// * `a` - Shaped `(nB, nO)`.
    /// * `b` - Shaped `(nB, nI)`.
    ///
    /// # Returns
    /// The summed outer products, shaped `(nO, nI)`.
    fn batch_outer(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32>;

    /// Computes `a · bᵗ`, the dot product of every row of `a` with every row of `b`.
    fn batch_dot(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32>;

    /// Concatenates sequences along the rows, putting `pad` zero rows before every non-empty
    /// sequence and after the last one.
    ///
    /// # Returns
    /// The flattened rows or an error if the sequences have different widths.
    fn flatten(&self, xs: &[Array2<f32>], pad: usize) -> Result<Array2<f32>>;

    /// Splits rows produced by `flatten` back into sequences.
    ///
    /// # Arguments
    /// * `x` - The flattened rows.
    /// * `lengths` - The amount of rows of each sequence.
    /// * `pad` - The amount of padding rows `flatten` was called with.
    ///
    /// # Returns
    /// One array per length or an error if the rows aren't consumed exactly.
    fn unflatten(&self, x: ArrayView2<f32>, lengths: &[usize], pad: usize)
    -> Result<Vec<Array2<f32>>>;

    /// Adds `src` into `dst` elementwise, both slices must have the same length.
    fn accumulate(&self, dst: &mut [f32], src: &[f32]);

    /// Fills the view with samples of `U(low, high)`.
    fn uniform_fill<D: Dimension>(&self, view: ArrayViewMut<f32, D>, low: f32, high: f32)
    -> Result<()>;

    /// Fills the view with samples of `N(mean, std_dev)`.
    fn normal_fill<D: Dimension>(
        &self,
        view: ArrayViewMut<f32, D>,
        mean: f32,
        std_dev: f32,
    ) -> Result<()>;

    /// Xavier uniform initialization, the range is computed from the fans of the view's shape.
    ///
    /// Empty views are left untouched.
    fn xavier_init<D: Dimension>(&self, view: ArrayViewMut<f32, D>) -> Result<()> {
        if view.is_empty() {
            return Ok(());
        }

        let (fan_in, fan_out) = fans(view.shape());
        let range = (6. / (fan_in + fan_out) as f32).sqrt();
        self.uniform_fill(view, -range, range)
    }
}
