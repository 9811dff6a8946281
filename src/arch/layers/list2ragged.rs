use std::rc::Rc;

use ndarray::Array2;

use super::ragged2list::check_lengths;
use crate::{
    Result,
    arch::{Backprop, Description, Model, hooks},
    ops::Ops,
    types::Ragged,
};

/// Joins a list of sequences into a single ragged batch.
pub type List2Ragged<O> = Model<O, Vec<Array2<f32>>, Ragged>;

/// Creates a `List2Ragged` layer, the inverse of `ragged2list`.
pub fn list2ragged<O: Ops>(ops: Rc<O>) -> Result<List2Ragged<O>> {
    let desc = Description::new().on_init(hooks::alloc_if_able);
    Model::new("list2ragged", ops, desc, forward, &[])
}

fn forward<O: Ops>(
    model: &mut List2Ragged<O>,
    xs: Vec<Array2<f32>>,
) -> Result<(Ragged, Backprop<'_, Ragged, Vec<Array2<f32>>>)> {
    let lengths: Vec<_> = xs.iter().map(|x| x.nrows()).collect();
    let y = Ragged::new(model.ops().flatten(&xs, 0)?, lengths.clone())?;

    let backprop: Backprop<'_, _, _> = Box::new(move |dy: Ragged| {
        let dxs = model.ops().unflatten(dy.data(), &lengths, 0)?;
        check_lengths(&dxs, dy.lengths())?;
        Ok(dxs)
    });

    Ok((y, backprop))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{LayerErr, ops::CpuOps};

    #[test]
    fn joins_and_splits() {
        let mut model = list2ragged(Rc::new(CpuOps::seeded(0))).unwrap();
        let xs = vec![array![[1f32], [2.]], array![[3f32]]];

        let (y, backprop) = model.begin_update(xs.clone()).unwrap();
        assert_eq!(y.lengths(), [2, 1]);
        assert_eq!(y.data(), array![[1f32], [2.], [3.]]);

        assert_eq!(backprop(y).unwrap(), xs);
    }

    #[test]
    fn gradients_must_keep_the_lengths() {
        let mut model = list2ragged(Rc::new(CpuOps::seeded(0))).unwrap();
        let xs = vec![Array2::zeros((2, 1)), Array2::zeros((1, 1))];

        let (_, backprop) = model.begin_update(xs).unwrap();
        let dy = Ragged::new(Array2::zeros((3, 1)), vec![1, 2]).unwrap();

        assert!(matches!(
            backprop(dy).unwrap_err(),
            LayerErr::ShapeMismatch { .. }
        ));
    }
}
