use std::rc::Rc;

use log::debug;
use ndarray::{Array2, ArrayView1, Axis, Ix1, Ix2};

use crate::{
    Result,
    arch::{Backprop, Description, Model, check_shape, hooks},
    config::AffineConfig,
    ops::Ops,
};

/// A fully connected layer, `y = x · Wᵗ + b`.
pub type Affine<O> = Model<O, Array2<f32>, Array2<f32>>;

/// Creates an affine layer with the default initializers.
///
/// # Arguments
/// * `ops` - The numeric backend.
/// * `output_size` - `nO`, inferred from the labels given to `initialize` if `None`.
/// * `input_size` - `nI`, inferred from the first batch if `None`.
///
/// # Returns
/// The layer, already allocated if both sizes were given.
pub fn affine<O: Ops>(
    ops: Rc<O>,
    output_size: Option<usize>,
    input_size: Option<usize>,
) -> Result<Affine<O>> {
    let config = AffineConfig {
        output_size,
        input_size,
        ..AffineConfig::default()
    };

    affine_with(ops, &config)
}

/// Creates an affine layer from its configuration.
pub fn affine_with<O: Ops>(ops: Rc<O>, config: &AffineConfig) -> Result<Affine<O>> {
    let desc = Description::new()
        .dim("nB", "Batch size")
        .dim("nO", "Output size")
        .dim("nI", "Input size")
        .weights("W", "Weights matrix", &["nO", "nI"], config.weights_init)
        .biases_with("b", "Bias vector", &["nO"], config.bias_init)
        .input(&["nB", "nI"])
        .output(&["nB", "nO"])
        .on_init(hooks::set_dims_if_given)
        .on_init(hooks::alloc_if_able)
        .on_data(infer_dims);

    Model::new(
        "affine",
        ops,
        desc,
        forward,
        &[config.output_size, config.input_size],
    )
}

/// Takes `nI` from the batch and `nO` from the largest label, then allocates if it can.
fn infer_dims<O: Ops>(
    model: &mut Affine<O>,
    x: &Array2<f32>,
    labels: Option<ArrayView1<usize>>,
) -> Result<()> {
    if model.dim("nI").is_none() {
        model.set_dim("nI", x.ncols())?;
        debug!(model = model.name(), input_size = x.ncols(); "inferred input size");
    }

    if model.dim("nO").is_none() {
        if let Some(&max) = labels.as_ref().and_then(|labels| labels.iter().max()) {
            model.set_dim("nO", max + 1)?;
            debug!(model = model.name(), output_size = max + 1; "inferred output size");
        }
    }

    model.allocate()?;
    Ok(())
}

fn forward<O: Ops>(
    model: &mut Affine<O>,
    x: Array2<f32>,
) -> Result<(Array2<f32>, Backprop<'_, Array2<f32>, Array2<f32>>)> {
    let y = model.ops().affine(
        model.param::<Ix2>("W")?,
        model.param::<Ix1>("b")?,
        x.view(),
    );
    let out_shape = [y.nrows(), y.ncols()];

    let backprop: Backprop<'_, _, _> = Box::new(move |dy: Array2<f32>| {
        check_shape("output gradient", dy.shape(), &out_shape)?;

        let dw = model.ops().batch_outer(dy.view(), x.view());
        let db = dy.sum_axis(Axis(0));
        let dx = model
            .ops()
            .batch_dot(dy.view(), model.param::<Ix2>("W")?.reversed_axes());

        model.accumulate_grad("W", dw.view())?;
        model.accumulate_grad("b", db.view())?;

        Ok(dx)
    });

    Ok((y, backprop))
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{LayerErr, initialization::ParamInit, ops::CpuOps};

    fn ones(output_size: usize, input_size: usize) -> Affine<CpuOps> {
        let config = AffineConfig {
            output_size: Some(output_size),
            input_size: Some(input_size),
            weights_init: ParamInit::Const { value: 1. },
            bias_init: ParamInit::Const { value: 0.5 },
        };

        affine_with(Rc::new(CpuOps::seeded(0)), &config).unwrap()
    }

    #[test]
    fn both_sizes_are_honoured() {
        let model = affine(Rc::new(CpuOps::seeded(0)), Some(3), Some(5)).unwrap();

        assert_eq!(model.dim("nO"), Some(3));
        assert_eq!(model.dim("nI"), Some(5));
        assert_eq!(model.param::<Ix2>("W").unwrap().shape(), [3, 5]);
        assert_eq!(model.param::<Ix1>("b").unwrap().shape(), [3]);
    }

    #[test]
    fn forward_and_backward() {
        let mut model = ones(2, 3);
        let x = array![[1., 2., 3.], [0., 1., 0.]];

        let (y, backprop) = model.begin_update(x).unwrap();
        assert_eq!(y, array![[6.5f32, 6.5], [1.5, 1.5]]);

        let dx = backprop(array![[1., 0.], [0., 2.]]).unwrap();
        assert_eq!(dx, array![[1f32, 1., 1.], [2., 2., 2.]]);

        assert_eq!(
            model.grad::<Ix2>("W").unwrap(),
            array![[1f32, 2., 3.], [0., 2., 0.]]
        );
        assert_eq!(model.grad::<Ix1>("b").unwrap(), array![1f32, 2.]);
    }

    #[test]
    fn wrong_output_gradients_are_rejected() {
        let mut model = ones(2, 3);

        let (_, backprop) = model.begin_update(Array2::zeros((4, 3))).unwrap();
        let err = backprop(Array2::zeros((4, 3))).unwrap_err();

        assert!(matches!(
            err,
            LayerErr::ShapeMismatch {
                what: "output gradient",
                got: 3,
                expected: 2
            }
        ));
        assert!(model.grad::<Ix2>("W").unwrap().iter().all(|&v| v == 0.));
    }

    #[test]
    fn output_size_needs_labels() {
        let mut model = affine(Rc::new(CpuOps::seeded(0)), None, None).unwrap();

        let err = model.predict(Array2::zeros((2, 4))).unwrap_err();
        match err {
            LayerErr::NotReady { missing, .. } => assert_eq!(missing, ["nO"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(model.dim("nI"), Some(4));
    }
}
