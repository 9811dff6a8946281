use std::{env, rc::Rc};

use anyhow::Context;
use lazy_layers::{
    config::{AffineConfig, RunConfig},
    layers,
    ops::CpuOps,
};
use log::info;
use ndarray::{Array1, Array2, Ix1, Ix2};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

const INPUT_SIZE: usize = 8;
const CLASSES: usize = 10;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => RunConfig::from_path(&path).with_context(|| format!("loading {path}"))?,
        None => RunConfig {
            seed: None,
            batch_size: 4,
            layer: AffineConfig::default(),
        },
    };
    info!("running with {config:?}");

    let (ops, mut rng) = match config.seed {
        Some(seed) => (CpuOps::seeded(seed), StdRng::seed_from_u64(seed)),
        None => (CpuOps::new(), StdRng::from_os_rng()),
    };

    let input_size = config.layer.input_size.unwrap_or(INPUT_SIZE);
    let classes = config.layer.output_size.unwrap_or(CLASSES);

    let x = Array2::from_shape_simple_fn((config.batch_size, input_size), || {
        rng.sample::<f32, _>(StandardNormal)
    });
    let labels = Array1::from_shape_simple_fn(config.batch_size, || rng.random_range(0..classes));

    let mut model = layers::affine_with(Rc::new(ops), &config.layer)?;
    model
        .initialize(&x, Some(labels.view()))
        .context("initializing the affine layer")?;
    info!(
        "{} allocated with nI = {:?}, nO = {:?}, {} parameters",
        model.name(),
        model.dim("nI"),
        model.dim("nO"),
        model.capacity().unwrap_or_default()
    );

    let (y, backprop) = model.begin_update(x)?;
    info!("forward output shape: {:?}", y.shape());

    let dy = Array2::ones(y.raw_dim());
    let dx = backprop(dy)?;
    info!("input gradient shape: {:?}", dx.shape());

    let dw = model.grad::<Ix2>("W")?;
    let db = model.grad::<Ix1>("b")?;
    info!(
        "gradient norms: dW = {:.4}, db = {:.4}",
        dw.iter().map(|v| v * v).sum::<f32>().sqrt(),
        db.iter().map(|v| v * v).sum::<f32>().sqrt()
    );

    Ok(())
}
