//! Lifecycle hooks shared by every layer type.

use super::Model;
use crate::{LayerErr, Result, ops::Ops};

/// The name of the batch dimension, never given positionally.
pub const BATCH_DIM: &str = "nB";

/// Resolves the node's dimensions from the positional constructor arguments.
///
/// Arguments map onto the declared dimensions in order, skipping the batch dimension. A `None`
/// argument leaves its dimension to be inferred from data.
///
/// # Returns
/// An error if there are more arguments than dimensions or a dimension is already set to a
/// different value.
pub fn set_dims_if_given<O: Ops, In, Out>(
    model: &mut Model<O, In, Out>,
    args: &[Option<usize>],
) -> Result<()> {
    let names: Vec<_> = model
        .description()
        .dims()
        .iter()
        .map(|dim| dim.name)
        .filter(|&name| name != BATCH_DIM)
        .collect();

    if args.len() > names.len() {
        return Err(LayerErr::ShapeMismatch {
            what: "positional dimensions",
            got: args.len(),
            expected: names.len(),
        });
    }

    for (name, arg) in names.into_iter().zip(args) {
        if let Some(value) = *arg {
            model.set_dim(name, value)?;
        }
    }

    Ok(())
}

/// Allocates the node's parameters if every dimension is already known.
pub fn alloc_if_able<O: Ops, In, Out>(
    model: &mut Model<O, In, Out>,
    _: &[Option<usize>],
) -> Result<()> {
    model.allocate()?;
    Ok(())
}
