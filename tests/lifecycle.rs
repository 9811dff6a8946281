use std::rc::Rc;

use lazy_layers::{
    LayerErr, Result,
    arch::{Backprop, Description, Model, ParamKind, hooks},
    initialization::ParamInit,
    layers,
    ops::{CpuOps, Ops},
};
use ndarray::{Array2, ArrayView1, Ix1, Ix2, array};

/// A bias free layer whose output size must always be given, `y = x · Wᵗ`.
type Linear = Model<CpuOps, Array2<f32>, Array2<f32>>;

fn linear_forward(
    model: &mut Linear,
    x: Array2<f32>,
) -> Result<(Array2<f32>, Backprop<'_, Array2<f32>, Array2<f32>>)> {
    let y = model.ops().batch_dot(x.view(), model.param::<Ix2>("W")?);

    let backprop: Backprop<'_, _, _> = Box::new(move |dy: Array2<f32>| {
        let dw = model.ops().batch_outer(dy.view(), x.view());
        model.accumulate_grad("W", dw.view())?;
        Ok(dy.dot(&model.param::<Ix2>("W")?))
    });

    Ok((y, backprop))
}

fn infer_input(model: &mut Linear, x: &Array2<f32>, _: Option<ArrayView1<usize>>) -> Result<()> {
    model.set_dim("nI", x.ncols())?;
    model.allocate()?;
    Ok(())
}

fn linear(args: &[Option<usize>], lazy: bool) -> Result<Linear> {
    let mut desc = Description::new()
        .dim("nB", "Batch size")
        .dim("nO", "Output size")
        .dim("nI", "Input size")
        .weights("W", "Weights", &["nO", "nI"], ParamInit::Const { value: 1. })
        .input(&["nB", "nI"])
        .on_init(hooks::set_dims_if_given)
        .on_init(hooks::alloc_if_able);

    if lazy {
        desc = desc.on_data(infer_input);
    }

    Model::new("linear", Rc::new(CpuOps::seeded(0)), desc, linear_forward, args)
}

#[test]
fn descriptions_are_inspectable() {
    let model = layers::affine(Rc::new(CpuOps::seeded(0)), None, None).unwrap();
    let desc = model.description();

    let dims: Vec<_> = desc.dims().iter().map(|dim| dim.name).collect();
    assert_eq!(dims, ["nB", "nO", "nI"]);

    let params: Vec<_> = desc
        .params()
        .iter()
        .map(|param| (param.name, param.kind, param.shape.clone()))
        .collect();
    assert_eq!(
        params,
        [
            ("W", ParamKind::Weights, vec!["nO", "nI"]),
            ("b", ParamKind::Biases, vec!["nO"]),
        ]
    );
    assert_eq!(desc.input_axes(), Some(&["nB", "nI"][..]));
    assert_eq!(desc.output_axes(), Some(&["nB", "nO"][..]));
}

#[test]
fn custom_layers_share_the_lifecycle() {
    let mut model = linear(&[Some(2)], true).unwrap();
    assert!(!model.is_allocated());

    let (y, backprop) = model.begin_update(array![[1., 2., 3.]]).unwrap();
    assert_eq!(y, array![[6f32, 6.]]);

    let dx = backprop(array![[1., 1.]]).unwrap();
    assert_eq!(dx, array![[2f32, 2., 2.]]);
    assert_eq!(
        model.grad::<Ix2>("W").unwrap(),
        array![[1f32, 2., 3.], [1., 2., 3.]]
    );
}

#[test]
fn unallocated_without_data_hooks() {
    let mut model = linear(&[Some(2)], false).unwrap();

    let err = model.predict(Array2::zeros((1, 3))).unwrap_err();
    assert!(matches!(err, LayerErr::NotAllocated { .. }));
    assert!(err.to_string().contains("linear"));
}

#[test]
fn not_ready_lists_the_missing_dims() {
    let mut model = linear(&[], true).unwrap();

    match model.predict(Array2::zeros((1, 3))).unwrap_err() {
        LayerErr::NotReady { model: name, missing } => {
            assert_eq!(name, "linear");
            assert_eq!(missing, ["nO"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(model.dim("nI"), Some(3));
}

#[test]
fn too_many_positional_sizes() {
    let err = linear(&[Some(1), Some(2), Some(3)], false).err();
    assert!(matches!(
        err,
        Some(LayerErr::ShapeMismatch {
            what: "positional dimensions",
            got: 3,
            expected: 2
        })
    ));
}

#[test]
fn dims_freeze_after_allocation() {
    let mut model = linear(&[Some(2), Some(3)], false).unwrap();

    assert!(model.set_dim("nO", 2).is_ok());
    assert!(matches!(
        model.set_dim("nO", 5),
        Err(LayerErr::ShapeMismatch { what: "nO", .. })
    ));
    assert!(matches!(
        model.set_dim("nB", 8),
        Err(LayerErr::Frozen { dim: "nB", .. })
    ));
}

#[test]
fn optimizers_write_through_param_mut() {
    let mut model = linear(&[Some(1), Some(2)], false).unwrap();

    model.param_mut::<Ix2>("W").unwrap().fill(3.);
    model.grad_mut::<Ix2>("W").unwrap().fill(1.);

    assert_eq!(model.predict(array![[1., 1.]]).unwrap(), array![[6f32]]);
    assert_eq!(model.grad::<Ix2>("W").unwrap(), array![[1f32, 1.]]);
}

#[test]
fn unknown_parameters() {
    let model = linear(&[Some(1), Some(2)], false).unwrap();

    assert!(matches!(
        model.param::<Ix2>("V"),
        Err(LayerErr::NotFound { name: "V" })
    ));
    assert!(matches!(model.param::<Ix1>("W"), Err(LayerErr::Layout(_))));
}
