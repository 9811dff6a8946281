use std::rc::Rc;

use log::{debug, trace};
use ndarray::{ArrayView, ArrayView1, ArrayViewMut, Dimension as NdDimension};

use super::describe::{Description, Dimension};
use crate::{LayerErr, Result, memory::Memory, ops::Ops, types::Shaped};

/// Computes the gradient with respect to the input of a single forward call.
///
/// Calling it accumulates the node's parameter gradients as a side effect.
pub type Backprop<'m, Out, In> = Box<dyn FnOnce(Out) -> Result<In> + 'm>;

/// Runs a node forward and returns its output along with the matching [`Backprop`].
pub type ForwardFn<O, In, Out> =
    for<'m> fn(&'m mut Model<O, In, Out>, In) -> Result<(Out, Backprop<'m, Out, In>)>;

/// The parameters of an allocated node and their gradient accumulators.
///
/// Both arenas hold the same names and shapes but never share a buffer.
#[derive(Debug)]
struct Params {
    weights: Memory,
    grads: Memory,
}

/// A named, composable unit transforming `In` batches into `Out` batches.
///
/// A node starts unallocated. Its parameters get allocated, all at once, as soon as every
/// dimension they depend on is resolved, either from the constructor arguments or from the
/// first batch of data. From then on its dimensions are frozen.
pub struct Model<O, In, Out> {
    name: String,
    ops: Rc<O>,
    dims: Vec<(Dimension, Option<usize>)>,
    desc: Description<O, In, Out>,
    params: Option<Params>,
    forward: ForwardFn<O, In, Out>,
}

impl<O: Ops, In, Out> Model<O, In, Out> {
    /// Creates a new `Model` and fires its on-init hooks.
    ///
    /// # Arguments
    /// * `name` - A tag for logging and error reporting.
    /// * `ops` - The numeric backend, shared with other nodes.
    /// * `desc` - The layer's dimensions, parameters and hooks.
    /// * `forward` - The layer's forward computation.
    /// * `args` - Positional dimension sizes, `None` for the ones to infer later.
    ///
    /// # Returns
    /// The new node or the first error raised by a hook.
    pub fn new(
        name: impl Into<String>,
        ops: Rc<O>,
        desc: Description<O, In, Out>,
        forward: ForwardFn<O, In, Out>,
        args: &[Option<usize>],
    ) -> Result<Self> {
        let dims = desc.dims().iter().map(|&dim| (dim, None)).collect();
        let mut model = Self {
            name: name.into(),
            ops,
            dims,
            desc,
            params: None,
            forward,
        };

        for hook in model.desc.init_hooks() {
            trace!(model = model.name.as_str(); "running init hook");
            hook(&mut model, args)?;
        }

        Ok(model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &O {
        &self.ops
    }

    pub fn description(&self) -> &Description<O, In, Out> {
        &self.desc
    }

    /// Returns the value of a dimension, `None` if it's unresolved or undeclared.
    pub fn dim(&self, name: &str) -> Option<usize> {
        self.dims
            .iter()
            .find(|(dim, _)| dim.name == name)
            .and_then(|&(_, value)| value)
    }

    /// Resolves a dimension.
    ///
    /// Setting a dimension to the value it already has is a no-op.
    ///
    /// # Returns
    /// An error if the dimension isn't declared, was resolved to a different value or the node
    /// is already allocated.
    pub fn set_dim(&mut self, name: &'static str, value: usize) -> Result<()> {
        let allocated = self.params.is_some();
        let Some((_, slot)) = self.dims.iter_mut().find(|(dim, _)| dim.name == name) else {
            return Err(LayerErr::NotFound { name });
        };

        match *slot {
            Some(current) if current == value => Ok(()),
            Some(current) => Err(LayerErr::ShapeMismatch {
                what: name,
                got: value,
                expected: current,
            }),
            None if allocated => Err(LayerErr::Frozen {
                model: self.name.clone(),
                dim: name,
            }),
            None => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    /// Returns the unresolved dimensions the parameters depend on, in declaration order.
    pub fn missing_dims(&self) -> Vec<&'static str> {
        self.dims
            .iter()
            .filter(|(dim, value)| value.is_none() && self.is_required(dim.name))
            .map(|(dim, _)| dim.name)
            .collect()
    }

    pub fn is_allocated(&self) -> bool {
        self.params.is_some()
    }

    /// Returns the amount of values in the parameter arena, `None` while unallocated.
    pub fn capacity(&self) -> Option<usize> {
        self.params.as_ref().map(|params| params.weights.capacity())
    }

    /// Allocates and initializes every declared parameter, if every dimension they depend on is
    /// resolved.
    ///
    /// It's safe to call this any amount of times, parameters are only allocated and initialized
    /// once.
    ///
    /// # Returns
    /// Whether the node ends up allocated.
    pub fn allocate(&mut self) -> Result<bool> {
        if self.params.is_some() {
            return Ok(true);
        }

        let mut shapes = Vec::with_capacity(self.desc.params().len());
        for param in self.desc.params() {
            let mut shape = Vec::with_capacity(param.shape.len());

            for &axis in &param.shape {
                let Some(&(_, value)) = self.dims.iter().find(|(dim, _)| dim.name == axis) else {
                    return Err(LayerErr::NotFound { name: axis });
                };
                let Some(value) = value else {
                    trace!(model = self.name.as_str(), dim = axis; "can't allocate yet");
                    return Ok(false);
                };
                shape.push(value);
            }

            shapes.push(shape);
        }

        let capacity = shapes.iter().map(|shape| shape.iter().product::<usize>()).sum();
        let mut weights = Memory::new(capacity);
        let mut grads = Memory::new(capacity);

        for (param, shape) in self.desc.params().iter().zip(&shapes) {
            weights.allocate(param.name, shape)?;
            grads.allocate(param.name, shape)?;
        }

        for param in self.desc.params() {
            trace!(model = self.name.as_str(), param = param.name; "initializing parameter");
            param.init.apply(weights.get_mut(param.name)?, &*self.ops)?;
        }

        debug!(model = self.name.as_str(), capacity = capacity; "allocated parameters");
        self.params = Some(Params { weights, grads });

        Ok(true)
    }

    /// Gives a view of a parameter.
    pub fn param<D: NdDimension>(&self, name: &'static str) -> Result<ArrayView<'_, f32, D>> {
        let view = self.allocated()?.weights.get(name)?;
        Ok(view.into_dimensionality::<D>()?)
    }

    /// Gives a mutable view of a parameter, for the external optimizer.
    pub fn param_mut<D: NdDimension>(
        &mut self,
        name: &'static str,
    ) -> Result<ArrayViewMut<'_, f32, D>> {
        let view = self.allocated_mut()?.weights.get_mut(name)?;
        Ok(view.into_dimensionality::<D>()?)
    }

    /// Gives a view of a parameter's accumulated gradient.
    pub fn grad<D: NdDimension>(&self, name: &'static str) -> Result<ArrayView<'_, f32, D>> {
        let view = self.allocated()?.grads.get(name)?;
        Ok(view.into_dimensionality::<D>()?)
    }

    pub fn grad_mut<D: NdDimension>(
        &mut self,
        name: &'static str,
    ) -> Result<ArrayViewMut<'_, f32, D>> {
        let view = self.allocated_mut()?.grads.get_mut(name)?;
        Ok(view.into_dimensionality::<D>()?)
    }

    /// Adds `delta` into a parameter's gradient.
    ///
    /// # Returns
    /// An error if the node is unallocated or `delta` doesn't have the parameter's shape.
    pub fn accumulate_grad<D: NdDimension>(
        &mut self,
        name: &'static str,
        delta: ArrayView<f32, D>,
    ) -> Result<()> {
        let ops = Rc::clone(&self.ops);
        let grads = &mut self.allocated_mut()?.grads;
        check_shape(name, delta.shape(), grads.shape(name)?)?;

        let dst = grads.slice_mut(name)?;
        match delta.as_slice() {
            Some(src) => ops.accumulate(dst, src),
            None => ops.accumulate(dst, &delta.iter().copied().collect::<Vec<_>>()),
        }

        Ok(())
    }

    /// Zeroes out every gradient accumulator, a no-op while unallocated.
    pub fn zero_grad(&mut self) {
        if let Some(params) = &mut self.params {
            params.grads.zero();
        }
    }

    fn allocated(&self) -> Result<&Params> {
        self.params.as_ref().ok_or_else(|| LayerErr::NotAllocated {
            model: self.name.clone(),
        })
    }

    fn allocated_mut(&mut self) -> Result<&mut Params> {
        self.params.as_mut().ok_or_else(|| LayerErr::NotAllocated {
            model: self.name.clone(),
        })
    }

    fn is_required(&self, name: &str) -> bool {
        self.desc
            .params()
            .iter()
            .any(|param| param.shape.contains(&name))
    }

    fn not_ready(&self) -> LayerErr {
        LayerErr::NotReady {
            model: self.name.clone(),
            missing: self.missing_dims(),
        }
    }

    fn run_data_hooks(&mut self, x: &In, labels: Option<ArrayView1<usize>>) -> Result<()> {
        for hook in self.desc.data_hooks() {
            trace!(model = self.name.as_str(); "running data hook");
            hook(self, x, labels)?;
        }

        Ok(())
    }
}

impl<O: Ops, In: Shaped, Out: Shaped> Model<O, In, Out> {
    /// Shows the node a batch of data, and optionally its labels, so it can infer its missing
    /// dimensions and allocate.
    ///
    /// # Returns
    /// An error if the data doesn't fit the node or dimensions are still missing afterwards.
    pub fn initialize(&mut self, x: &In, labels: Option<ArrayView1<usize>>) -> Result<()> {
        self.validate_input(x)?;
        self.run_data_hooks(x, labels)?;

        if self.is_allocated() {
            Ok(())
        } else {
            Err(self.not_ready())
        }
    }

    /// Runs the node forward without any gradient bookkeeping.
    pub fn predict(&mut self, x: In) -> Result<Out> {
        let (y, _) = self.begin_update(x)?;
        Ok(y)
    }

    /// Runs the node forward.
    ///
    /// An unallocated node with on-data hooks initializes itself from `x` first.
    ///
    /// # Returns
    /// The output and the closure that backpropagates a gradient of that output.
    pub fn begin_update(&mut self, x: In) -> Result<(Out, Backprop<'_, Out, In>)> {
        self.validate_input(&x)?;
        self.ensure_allocated(&x)?;

        // Dimensions are frozen from here on, resolve the output axes before lending the node.
        let output = self.annotation(self.desc.output_axes());
        let forward = self.forward;
        let (y, backprop) = forward(self, x)?;

        if let Some(axes) = &output {
            check_axes("output", axes, y.shape())?;
        }

        Ok((y, backprop))
    }

    fn ensure_allocated(&mut self, x: &In) -> Result<()> {
        if self.is_allocated() {
            return Ok(());
        }

        if !self.desc.has_data_hooks() {
            return Err(LayerErr::NotAllocated {
                model: self.name.clone(),
            });
        }

        self.run_data_hooks(x, None)?;

        if self.is_allocated() {
            Ok(())
        } else {
            Err(self.not_ready())
        }
    }

    fn validate_input(&self, x: &In) -> Result<()> {
        match self.annotation(self.desc.input_axes()) {
            Some(axes) => check_axes("input", &axes, x.shape()),
            None => Ok(()),
        }
    }

    /// Pairs every annotated axis with the value of its dimension, if resolved.
    fn annotation(
        &self,
        axes: Option<&[&'static str]>,
    ) -> Option<Vec<(&'static str, Option<usize>)>> {
        axes.map(|axes| axes.iter().map(|&axis| (axis, self.dim(axis))).collect())
    }
}

/// Checks a batch's shape against an annotation, axes of unresolved dimensions match anything.
///
/// # Returns
/// A `RankMismatch` if the amount of axes differs, or a `ShapeMismatch` naming the first
/// resolved dimension the batch disagrees with.
fn check_axes(
    what: &'static str,
    axes: &[(&'static str, Option<usize>)],
    shape: Option<&[usize]>,
) -> Result<()> {
    let Some(shape) = shape else {
        return Ok(());
    };

    if shape.len() != axes.len() {
        return Err(LayerErr::RankMismatch {
            what,
            got: shape.len(),
            expected: axes.len(),
        });
    }

    for (&(axis, dim), &got) in axes.iter().zip(shape) {
        match dim {
            Some(expected) if expected != got => {
                return Err(LayerErr::ShapeMismatch {
                    what: axis,
                    got,
                    expected,
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Checks that two shapes are equal.
///
/// # Returns
/// A `RankMismatch` if they have different amount of axes, or a `ShapeMismatch` for the first
/// axis where they differ.
pub(crate) fn check_shape(what: &'static str, got: &[usize], expected: &[usize]) -> Result<()> {
    if got.len() != expected.len() {
        return Err(LayerErr::RankMismatch {
            what,
            got: got.len(),
            expected: expected.len(),
        });
    }

    match got.iter().zip(expected).find(|(g, e)| g != e) {
        Some((&got, &expected)) => Err(LayerErr::ShapeMismatch {
            what,
            got,
            expected,
        }),
        None => Ok(()),
    }
}
