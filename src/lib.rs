//! Composable neural network layers whose parameters are allocated lazily, once the shapes of
//! the data they are fed are known.

pub mod arch;
pub mod config;
pub mod error;
pub mod initialization;
pub mod memory;
pub mod ops;
pub mod types;

pub use arch::layers;
pub use error::{LayerErr, Result};
