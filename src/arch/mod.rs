mod describe;
pub mod hooks;
pub mod layers;
mod model;

pub use describe::{DataHook, Description, Dimension, InitHook, Param, ParamKind};
pub(crate) use model::check_shape;
pub use model::{Backprop, ForwardFn, Model};
