use std::{
    collections::HashSet,
    net::{SocketAddr, ToSocketAddrs},
};

use anderson::AndersonConfig;
use comms::specs::worker::WorkerSpec;

use super::ConsensusConfig;
use crate::{error::OrchestratorError, state::ConsensusState, stopping::StoppingRule};

/// A validated consensus solve, ready to be handed to a `Session`.
pub struct Plan {
    pub workers: Vec<(SocketAddr, WorkerSpec)>,
    pub state: ConsensusState,
    pub max_iter: usize,
    pub acceleration: Option<AndersonConfig>,
    pub rule: Box<dyn StoppingRule>,
}

#[derive(Debug, Default)]
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Validates `config` and turns it into a `Plan`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for any inconsistency, and `ConnectionFailed`
    /// when a worker address cannot be resolved.
    pub fn adapt(&self, config: ConsensusConfig) -> Result<Plan, OrchestratorError> {
        self.validate(&config)?;

        let acceleration = config
            .acceleration
            .map(|acc| AndersonConfig::new(acc.window, acc.max_iter, acc.rcond))
            .transpose()
            .map_err(|e| OrchestratorError::InvalidConfig(format!("acceleration: {e}")))?;

        let ownership: Vec<_> = config
            .workers
            .iter()
            .map(|worker| worker.spec.solver.variables())
            .collect();
        let state = ConsensusState::zeroed(config.initial_xbar, &ownership)
            .map_err(|e| OrchestratorError::InvalidConfig(format!("initial_xbar: {e}")))?;

        let workers: Vec<(SocketAddr, WorkerSpec)> = config
            .workers
            .into_iter()
            .enumerate()
            .map(|(i, worker)| Ok((self.resolve(i, &worker.addr)?, worker.spec)))
            .collect::<Result<_, OrchestratorError>>()?;

        Ok(Plan {
            workers,
            state,
            max_iter: config.max_iter,
            acceleration,
            rule: config.stopping.build(),
        })
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate(&self, config: &ConsensusConfig) -> Result<(), OrchestratorError> {
        if config.workers.is_empty() {
            return Err(OrchestratorError::InvalidConfig(
                "at least one worker is required".into(),
            ));
        }

        if config.max_iter < 1 {
            return Err(OrchestratorError::InvalidConfig(
                "max_iter must be >= 1".into(),
            ));
        }

        let mut node_ids = HashSet::new();
        for (i, worker) in config.workers.iter().enumerate() {
            let rho = worker.spec.rho;
            if !(rho.is_finite() && rho > 0.0) {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "worker[{i}]: rho must be positive and finite, got {rho}"
                )));
            }

            if !node_ids.insert(worker.spec.node_id) {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "worker[{i}]: node_id {} is repeated",
                    worker.spec.node_id
                )));
            }
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Addresses
    // -------------------------------------------------------------------------

    fn resolve(&self, i: usize, addr: &str) -> Result<SocketAddr, OrchestratorError> {
        addr.to_socket_addrs()
            .map_err(|e| OrchestratorError::ConnectionFailed {
                addr: format!("worker[{i}]"),
                source: e,
            })?
            .next()
            .ok_or_else(|| {
                OrchestratorError::InvalidConfig(format!("worker[{i}]: could not resolve address"))
            })
    }
}
