use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The result type used in the entire layers library.
pub type Result<T> = std::result::Result<T, LayerErr>;

/// The layers library's error type.
///
/// Every variant is a caller or programmer error, none of them are transient.
#[derive(Debug)]
pub enum LayerErr {
    /// An axis or length doesn't match what the node expects.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The input has a different number of axes than its annotation.
    RankMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The backend couldn't lay out an array with the requested shape.
    Layout(ndarray::ShapeError),
    /// An arena allocation exceeded the planned capacity.
    Capacity {
        name: &'static str,
        requested: usize,
        available: usize,
    },
    AlreadyAllocated {
        name: &'static str,
    },
    NotFound {
        name: &'static str,
    },
    /// The node has no parameters and no way of inferring its dimensions.
    NotAllocated {
        model: String,
    },
    /// The node tried to infer its dimensions from data and some are still missing.
    NotReady {
        model: String,
        missing: Vec<&'static str>,
    },
    /// Tried to set a dimension after the node's parameters were allocated.
    Frozen {
        model: String,
        dim: &'static str,
    },
    Init(String),
}

impl Display for LayerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            LayerErr::RankMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "rank mismatch for {what}: got {got} axes, expected {expected}"
            ),
            LayerErr::Layout(e) => write!(f, "layout error: {e}"),
            LayerErr::Capacity {
                name,
                requested,
                available,
            } => write!(
                f,
                "can't allocate {requested} values for {name}, only {available} left in the arena"
            ),
            LayerErr::AlreadyAllocated { name } => {
                write!(f, "{name} is already allocated in the arena")
            }
            LayerErr::NotFound { name } => write!(f, "{name} was never declared or allocated"),
            LayerErr::NotAllocated { model } => write!(
                f,
                "{model} has no allocated parameters and can't infer its dimensions from data"
            ),
            LayerErr::NotReady { model, missing } => write!(
                f,
                "{model} is not ready, unresolved dimensions: {}",
                missing.join(", ")
            ),
            LayerErr::Frozen { model, dim } => {
                write!(f, "{model} is allocated, dimension {dim} can't change")
            }
            LayerErr::Init(msg) => write!(f, "parameter initialization failed: {msg}"),
        }
    }
}

impl Error for LayerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LayerErr::Layout(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ndarray::ShapeError> for LayerErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::Layout(value)
    }
}

impl From<NormalError> for LayerErr {
    fn from(value: NormalError) -> Self {
        Self::Init(value.to_string())
    }
}

impl From<UniformError> for LayerErr {
    fn from(value: UniformError) -> Self {
        Self::Init(value.to_string())
    }
}
