use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{LayerErr, initialization::ParamInit};

/// The configuration of an affine layer.
///
/// Unset sizes are inferred from the first batch of data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineConfig {
    #[serde(default)]
    pub output_size: Option<usize>,
    #[serde(default)]
    pub input_size: Option<usize>,
    #[serde(default = "default_weights_init")]
    pub weights_init: ParamInit,
    #[serde(default)]
    pub bias_init: ParamInit,
}

impl Default for AffineConfig {
    fn default() -> Self {
        Self {
            output_size: None,
            input_size: None,
            weights_init: default_weights_init(),
            bias_init: ParamInit::Zeros,
        }
    }
}

fn default_weights_init() -> ParamInit {
    ParamInit::XavierUniform
}

fn default_batch_size() -> usize {
    4
}

/// The configuration of a demo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// The seed of the backend's random state, taken from the OS if missing.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub layer: AffineConfig,
}

/// An error while loading a configuration.
#[derive(Debug)]
pub enum ConfigErr {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(LayerErr),
}

impl std::fmt::Display for ConfigErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErr::Io(e) => write!(f, "failed to read config: {e}"),
            ConfigErr::Parse(e) => write!(f, "failed to parse config: {e}"),
            ConfigErr::Invalid(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigErr::Io(e) => Some(e),
            ConfigErr::Parse(e) => Some(e),
            ConfigErr::Invalid(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigErr {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl RunConfig {
    /// Parses a `RunConfig` from a json string.
    ///
    /// # Returns
    /// The configuration or an error if it's malformed or has a zero batch size.
    pub fn from_json(json: &str) -> Result<Self, ConfigErr> {
        let config: Self = serde_json::from_str(json)?;

        if config.batch_size == 0 {
            return Err(ConfigErr::Invalid(LayerErr::ShapeMismatch {
                what: "batch_size",
                got: 0,
                expected: 1,
            }));
        }

        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigErr> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
