pub mod average;
pub mod codec;
pub mod configs;
pub mod error;
mod orchestrator;
mod session;
pub mod state;
pub mod stopping;

use configs::{Adapter, ConsensusConfig};

pub use error::OrchestratorError;
pub use orchestrator::{ConsensusMap, ConsensusOrchestrator, ConsensusOutcome};
pub use session::Session;
pub use state::ConsensusState;
pub use stopping::{ResidualSet, StoppingRule};

/// Connects to every worker of `config` and runs the consensus solve to completion.
///
/// # Errors
/// Returns an `OrchestratorError` if the config is invalid, connecting to any
/// worker fails or any step of the solve fails.
pub fn solve(config: ConsensusConfig) -> Result<ConsensusOutcome, OrchestratorError> {
    log::info!("adapting configs");
    let plan = Adapter::new().adapt(config)?;

    log::info!("connecting to {} worker(s)", plan.workers.len());
    let mut session = Session::new(plan.workers, plan.rule)?;
    session.run(plan.state, plan.max_iter, plan.acceleration.as_ref())
}
