use ndarray::ArrayViewMutD;
use serde::{Deserialize, Serialize};

use crate::{Result, ops::Ops};

/// How a parameter tensor gets its initial values.
///
/// The distributions that depend on the layer's size compute their fans from the shape of the
/// tensor being initialized, see [`fans`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamInit {
    /// Leaves the zeroed arena values untouched.
    #[default]
    Zeros,
    Const {
        value: f32,
    },
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
    /// `U(-√(6 / (fan_in + fan_out)), √(6 / (fan_in + fan_out)))`.
    XavierUniform,
    /// `N(0, √(2 / (fan_in + fan_out)))`.
    Xavier,
    /// `N(0, √(2 / fan_in))`.
    Kaiming,
    /// `N(0, √(1 / fan_in))`.
    Lecun,
    /// `U(-√(3 / fan_in), √(3 / fan_in))`.
    LecunUniform,
}

impl ParamInit {
    /// Writes the initial values into the parameter.
    ///
    /// # Arguments
    /// * `view` - The parameter's region of the arena.
    /// * `ops` - The backend providing the random state.
    ///
    /// # Returns
    /// An error if the distribution's parameters are invalid. Empty tensors are left untouched.
    pub fn apply<O: Ops>(self, mut view: ArrayViewMutD<f32>, ops: &O) -> Result<()> {
        // A zero sized axis makes the fans degenerate and there's nothing to fill anyway.
        if view.is_empty() {
            return Ok(());
        }

        let (fan_in, fan_out) = fans(view.shape());

        match self {
            ParamInit::Zeros => view.fill(0.0),
            ParamInit::Const { value } => view.fill(value),
            ParamInit::Uniform { low, high } => ops.uniform_fill(view, low, high)?,
            ParamInit::Normal { mean, std_dev } => ops.normal_fill(view, mean, std_dev)?,
            ParamInit::XavierUniform => ops.xavier_init(view)?,
            ParamInit::Xavier => {
                let std_dev = (2. / (fan_in + fan_out) as f32).sqrt();
                ops.normal_fill(view, 0., std_dev)?;
            }
            ParamInit::Kaiming => {
                let std_dev = (2. / fan_in as f32).sqrt();
                ops.normal_fill(view, 0., std_dev)?;
            }
            ParamInit::Lecun => {
                let std_dev = (1. / fan_in as f32).sqrt();
                ops.normal_fill(view, 0., std_dev)?;
            }
            ParamInit::LecunUniform => {
                let range = (3. / fan_in as f32).sqrt();
                ops.uniform_fill(view, -range, range)?;
            }
        }

        Ok(())
    }
}

/// Computes the fans of a parameter tensor.
///
/// The leading axis is the output axis, every other axis counts towards the input. A vector is
/// both its own input and output.
///
/// # Returns
/// A tuple containing `(fan_in, fan_out)`.
pub fn fans(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, *n),
        [fan_out, rest @ ..] => (rest.iter().product(), *fan_out),
    }
}
