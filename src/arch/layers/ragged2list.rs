use std::rc::Rc;

use ndarray::Array2;

use crate::{
    LayerErr, Result,
    arch::{Backprop, Description, Model, hooks},
    ops::Ops,
    types::Ragged,
};

/// Splits a ragged batch into one array per sequence.
pub type Ragged2List<O> = Model<O, Ragged, Vec<Array2<f32>>>;

/// Creates a `Ragged2List` layer, it has no parameters.
pub fn ragged2list<O: Ops>(ops: Rc<O>) -> Result<Ragged2List<O>> {
    let desc = Description::new().on_init(hooks::alloc_if_able);
    Model::new("ragged2list", ops, desc, forward, &[])
}

fn forward<O: Ops>(
    model: &mut Ragged2List<O>,
    x: Ragged,
) -> Result<(Vec<Array2<f32>>, Backprop<'_, Vec<Array2<f32>>, Ragged>)> {
    let (data, lengths) = x.into_parts();
    let xs = model.ops().unflatten(data.view(), &lengths, 0)?;
    let ncols = data.ncols();

    let backprop: Backprop<'_, _, _> = Box::new(move |dxs: Vec<Array2<f32>>| {
        check_lengths(&dxs, &lengths)?;

        // An empty list has no width of its own, keep the one of the forward batch.
        let data = if dxs.is_empty() {
            Array2::zeros((0, ncols))
        } else {
            model.ops().flatten(&dxs, 0)?
        };

        Ragged::new(data, lengths)
    });

    Ok((xs, backprop))
}

/// Checks that the sequences have exactly the given lengths.
pub(super) fn check_lengths(xs: &[Array2<f32>], lengths: &[usize]) -> Result<()> {
    if xs.len() != lengths.len() {
        return Err(LayerErr::ShapeMismatch {
            what: "sequences",
            got: xs.len(),
            expected: lengths.len(),
        });
    }

    match xs.iter().zip(lengths).find(|(x, len)| x.nrows() != **len) {
        Some((x, &len)) => Err(LayerErr::ShapeMismatch {
            what: "sequence length",
            got: x.nrows(),
            expected: len,
        }),
        None => Ok(()),
    }
}
