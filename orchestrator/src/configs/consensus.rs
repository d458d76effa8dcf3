use std::{fs, path::Path};

use anderson::AndersonConfig;
use comms::{VarMap, specs::worker::WorkerSpec};
use serde::Deserialize;

use crate::{error::OrchestratorError, stopping::StoppingConfig};

/// Everything a consensus solve needs, as read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusConfig {
    /// The workers in node order.
    pub workers: Vec<WorkerConfig>,
    pub initial_xbar: VarMap,
    pub max_iter: usize,
    #[serde(default)]
    pub acceleration: Option<AccelerationConfig>,
    #[serde(default)]
    pub stopping: StoppingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// `host:port` of a listening worker.
    pub addr: String,
    pub spec: WorkerSpec,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AccelerationConfig {
    pub window: usize,
    pub max_iter: usize,
    #[serde(default = "default_rcond")]
    pub rcond: f64,
}

fn default_rcond() -> f64 {
    AndersonConfig::DEFAULT_RCOND
}

impl ConsensusConfig {
    /// Reads a configuration file.
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the file is not valid JSON for this schema,
    /// and `Io` when it cannot be read.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, OrchestratorError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, OrchestratorError> {
        serde_json::from_str(raw).map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))
    }
}
