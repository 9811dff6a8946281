use std::cell::RefCell;

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut, Axis, Dimension, linalg, s};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};
use rayon::prelude::*;

use super::Ops;
use crate::{LayerErr, Result};

/// The reference `Ops` backend, running on the CPU.
///
/// Matrix products go through `ndarray`'s `general_mat_mul`, slicing ragged batches and
/// accumulating gradients are spread over the rayon thread pool.
#[derive(Debug)]
pub struct CpuOps {
    rng: RefCell<StdRng>,
}

impl CpuOps {
    /// Creates a new `CpuOps` seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: RefCell::new(StdRng::from_os_rng()),
        }
    }

    /// Creates a new `CpuOps` with a reproducible random state.
    ///
    /// # Arguments
    /// * `seed` - The seed for the parameter initializers.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn fill<D, S>(&self, mut view: ArrayViewMut<f32, D>, distribution: S)
    where
        D: Dimension,
        S: Distribution<f32>,
    {
        let mut rng = self.rng.borrow_mut();
        view.map_inplace(|v| *v = distribution.sample(&mut *rng));
    }
}

impl Default for CpuOps {
    fn default() -> Self {
        Self::new()
    }
}

impl Ops for CpuOps {
    fn affine(&self, w: ArrayView2<f32>, b: ArrayView1<f32>, x: ArrayView2<f32>) -> Array2<f32> {
        let mut y = Array2::zeros((x.nrows(), w.nrows()));
        linalg::general_mat_mul(1.0, &x, &w.t(), 0.0, &mut y);
        y += &b;
        y
    }

    fn batch_outer(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros((a.ncols(), b.ncols()));
        linalg::general_mat_mul(1.0, &a.t(), &b, 0.0, &mut out);
        out
    }

    fn batch_dot(&self, a: ArrayView2<f32>, b: ArrayView2<f32>) -> Array2<f32> {
        let mut out = Array2::zeros((a.nrows(), b.nrows()));
        linalg::general_mat_mul(1.0, &a, &b.t(), 0.0, &mut out);
        out
    }

    fn flatten(&self, xs: &[Array2<f32>], pad: usize) -> Result<Array2<f32>> {
        let Some(first) = xs.first() else {
            return Ok(Array2::zeros((0, 0)));
        };

        let ncols = first.ncols();
        let padding = Array2::zeros((pad, ncols));
        let mut views = Vec::with_capacity(xs.len() * 2 + 1);

        for x in xs.iter().filter(|x| x.nrows() != 0) {
            if pad > 0 {
                views.push(padding.view());
            }
            views.push(x.view());
        }

        if views.is_empty() {
            return Ok(Array2::zeros((0, ncols)));
        }
        if pad > 0 {
            views.push(padding.view());
        }

        Ok(ndarray::concatenate(Axis(0), &views)?)
    }

    fn unflatten(
        &self,
        x: ArrayView2<f32>,
        lengths: &[usize],
        pad: usize,
    ) -> Result<Vec<Array2<f32>>> {
        let mut cursor = 0;
        let mut spans = Vec::with_capacity(lengths.len());

        for &len in lengths {
            if pad > 0 && len != 0 {
                cursor += pad;
            }
            spans.push(cursor..cursor + len);
            cursor += len;
        }

        if pad > 0 && cursor != 0 {
            cursor += pad;
        }

        if cursor != x.nrows() {
            return Err(LayerErr::ShapeMismatch {
                what: "unflattened rows",
                got: cursor,
                expected: x.nrows(),
            });
        }

        let seqs = spans
            .into_par_iter()
            .map(|span| x.slice(s![span, ..]).to_owned())
            .collect();

        Ok(seqs)
    }

    fn accumulate(&self, dst: &mut [f32], src: &[f32]) {
        dst.par_iter_mut()
            .zip(src.par_iter())
            .for_each(|(d, s)| *d += *s);
    }

    fn uniform_fill<D: Dimension>(
        &self,
        view: ArrayViewMut<f32, D>,
        low: f32,
        high: f32,
    ) -> Result<()> {
        self.fill(view, Uniform::new(low, high)?);
        Ok(())
    }

    fn normal_fill<D: Dimension>(
        &self,
        view: ArrayViewMut<f32, D>,
        mean: f32,
        std_dev: f32,
    ) -> Result<()> {
        self.fill(view, Normal::new(mean, std_dev)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, array};

    use super::*;

    #[test]
    fn affine_is_x_wt_plus_b() {
        let ops = CpuOps::seeded(0);
        let w = array![[1., 0., 2.], [0., 1., -1.]];
        let b = array![0.5, -0.5];
        let x = array![[1., 2., 3.], [0., 0., 1.]];

        let y = ops.affine(w.view(), b.view(), x.view());

        let expected: Array2<f32> = array![[7.5, -1.5], [2.5, -1.5]];
        assert_eq!(y, expected);
    }

    #[test]
    fn batch_outer_sums_over_batch() {
        let ops = CpuOps::seeded(0);
        let a = array![[1., 2.], [3., 4.]];
        let b = array![[1., 0., 1.], [0., 1., 0.]];

        let out = ops.batch_outer(a.view(), b.view());

        let expected: Array2<f32> = array![[1., 3., 1.], [2., 4., 2.]];
        assert_eq!(out, expected);
    }

    #[test]
    fn batch_dot_is_a_bt() {
        let ops = CpuOps::seeded(0);
        let a = array![[1., 2.]];
        let b = array![[3., 4.], [5., 6.], [0., 1.]];

        let expected: Array2<f32> = array![[11., 17., 2.]];
        assert_eq!(ops.batch_dot(a.view(), b.view()), expected);
    }

    #[test]
    fn flatten_pads_around_sequences() {
        let ops = CpuOps::seeded(0);
        let xs: Vec<Array2<f32>> = vec![array![[1.], [2.]], Array2::zeros((0, 1)), array![[3.]]];

        let flat = ops.flatten(&xs, 1).unwrap();
        let expected: Array2<f32> = array![[0.], [1.], [2.], [0.], [3.], [0.]];
        assert_eq!(flat, expected);

        let seqs = ops.unflatten(flat.view(), &[2, 0, 1], 1).unwrap();
        assert_eq!(seqs, xs);
    }

    #[test]
    fn flatten_rejects_mixed_widths() {
        let ops = CpuOps::seeded(0);
        let xs: Vec<Array2<f32>> = vec![Array2::zeros((1, 2)), Array2::zeros((1, 3))];

        assert!(matches!(ops.flatten(&xs, 0), Err(LayerErr::Layout(_))));
    }

    #[test]
    fn unflatten_must_consume_every_row() {
        let ops = CpuOps::seeded(0);
        let x: Array2<f32> = Array2::zeros((5, 2));

        let err = ops.unflatten(x.view(), &[2, 2], 0).unwrap_err();
        assert!(matches!(
            err,
            LayerErr::ShapeMismatch {
                got: 4,
                expected: 5,
                ..
            }
        ));
    }

    #[test]
    fn accumulate_adds() {
        let ops = CpuOps::seeded(0);
        let mut dst = [1f32, 2., 3.];
        ops.accumulate(&mut dst, &[1., 1., 1.]);
        ops.accumulate(&mut dst, &[0.5, 0., -3.]);

        assert_eq!(dst, [2.5, 3., 1.]);
    }

    #[test]
    fn seeded_fills_are_reproducible() {
        let mut a = Array1::<f32>::zeros(16);
        let mut b = Array1::<f32>::zeros(16);

        CpuOps::seeded(7).normal_fill(a.view_mut(), 0., 1.).unwrap();
        CpuOps::seeded(7).normal_fill(b.view_mut(), 0., 1.).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn xavier_stays_in_range() {
        let ops = CpuOps::seeded(42);
        let mut w = Array2::<f32>::zeros((10, 20));
        ops.xavier_init(w.view_mut()).unwrap();

        let range = (6. / 30f32).sqrt();
        assert!(w.iter().all(|v| v.abs() <= range));
        assert!(w.iter().any(|&v| v != 0.));
    }

    #[test]
    fn invalid_ranges_fail() {
        let ops = CpuOps::seeded(0);
        let mut w = Array1::<f32>::zeros(3);

        assert!(matches!(
            ops.uniform_fill(w.view_mut(), 1., -1.),
            Err(LayerErr::Init(_))
        ));
        assert!(matches!(
            ops.normal_fill(w.view_mut(), 0., f32::NAN),
            Err(LayerErr::Init(_))
        ));
    }
}
