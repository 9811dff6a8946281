use ndarray::ArrayView1;

use super::Model;
use crate::{Result, initialization::ParamInit};

/// Hook fired once at construction, receives the positional dimension arguments.
pub type InitHook<O, In, Out> = fn(&mut Model<O, In, Out>, &[Option<usize>]) -> Result<()>;

/// Hook fired on data while the node is unallocated, receives the input and optionally the labels.
pub type DataHook<O, In, Out> =
    fn(&mut Model<O, In, Out>, &In, Option<ArrayView1<usize>>) -> Result<()>;

/// A named size that may be unknown until data is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub name: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weights,
    Biases,
}

/// A learnable tensor whose shape is expressed in terms of dimension names.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: ParamKind,
    pub shape: Vec<&'static str>,
    pub init: ParamInit,
}

/// The declarative table of a layer type: its dimensions, parameters, shape annotations and
/// lifecycle hooks.
///
/// Hooks of the same kind run in the order they were added.
pub struct Description<O, In, Out> {
    dims: Vec<Dimension>,
    params: Vec<Param>,
    input: Option<Vec<&'static str>>,
    output: Option<Vec<&'static str>>,
    on_init: Vec<InitHook<O, In, Out>>,
    on_data: Vec<DataHook<O, In, Out>>,
}

impl<O, In, Out> Description<O, In, Out> {
    /// Creates an empty `Description`.
    pub fn new() -> Self {
        Self {
            dims: Vec::new(),
            params: Vec::new(),
            input: None,
            output: None,
            on_init: Vec::new(),
            on_data: Vec::new(),
        }
    }

    pub fn dim(mut self, name: &'static str, label: &'static str) -> Self {
        self.dims.push(Dimension { name, label });
        self
    }

    /// Declares a weights tensor.
    ///
    /// # Arguments
    /// * `name` - The name the tensor is allocated under.
    /// * `label` - A human readable description.
    /// * `shape` - The dimension names of each axis.
    /// * `init` - How to fill the tensor once allocated.
    pub fn weights(
        self,
        name: &'static str,
        label: &'static str,
        shape: &[&'static str],
        init: ParamInit,
    ) -> Self {
        self.param(name, label, ParamKind::Weights, shape, init)
    }

    /// Declares a zero initialized biases tensor.
    pub fn biases(self, name: &'static str, label: &'static str, shape: &[&'static str]) -> Self {
        self.biases_with(name, label, shape, ParamInit::Zeros)
    }

    pub fn biases_with(
        self,
        name: &'static str,
        label: &'static str,
        shape: &[&'static str],
        init: ParamInit,
    ) -> Self {
        self.param(name, label, ParamKind::Biases, shape, init)
    }

    /// Annotates the expected input axes, e.g. `["nB", "nI"]`.
    pub fn input(mut self, axes: &[&'static str]) -> Self {
        self.input = Some(axes.to_vec());
        self
    }

    pub fn output(mut self, axes: &[&'static str]) -> Self {
        self.output = Some(axes.to_vec());
        self
    }

    pub fn on_init(mut self, hook: InitHook<O, In, Out>) -> Self {
        self.on_init.push(hook);
        self
    }

    pub fn on_data(mut self, hook: DataHook<O, In, Out>) -> Self {
        self.on_data.push(hook);
        self
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn input_axes(&self) -> Option<&[&'static str]> {
        self.input.as_deref()
    }

    pub fn output_axes(&self) -> Option<&[&'static str]> {
        self.output.as_deref()
    }

    pub(super) fn init_hooks(&self) -> Vec<InitHook<O, In, Out>> {
        self.on_init.clone()
    }

    pub(super) fn data_hooks(&self) -> Vec<DataHook<O, In, Out>> {
        self.on_data.clone()
    }

    pub(super) fn has_data_hooks(&self) -> bool {
        !self.on_data.is_empty()
    }

    fn param(
        mut self,
        name: &'static str,
        label: &'static str,
        kind: ParamKind,
        shape: &[&'static str],
        init: ParamInit,
    ) -> Self {
        self.params.push(Param {
            name,
            label,
            kind,
            shape: shape.to_vec(),
            init,
        });
        self
    }
}

impl<O, In, Out> Default for Description<O, In, Out> {
    fn default() -> Self {
        Self::new()
    }
}
