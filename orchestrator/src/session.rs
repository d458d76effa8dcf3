use std::net::SocketAddr;

use anderson::AndersonConfig;
use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg},
    specs::worker::WorkerSpec,
};
use log::info;
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Runtime,
};

use crate::{
    error::OrchestratorError,
    orchestrator::{ConsensusOrchestrator, ConsensusOutcome},
    state::ConsensusState,
    stopping::StoppingRule,
};

type NetRx = OnoReceiver<OwnedReadHalf>;
type NetTx = OnoSender<OwnedWriteHalf>;

/// A consensus solve over networked workers.
/// It lets its owner drive the entire system from a single instance.
pub struct Session {
    runtime: Runtime,
    orchestrator: ConsensusOrchestrator<OwnedReadHalf, OwnedWriteHalf>,
}

impl Session {
    /// Creates a new `Session`, bootstrapping every worker.
    ///
    /// # Arguments
    /// * `workers` - The network address of every worker and the spec to create it with,
    ///   in the order their duals appear in the consensus state.
    /// * `rule` - The stopping rule of the solve.
    ///
    /// # Returns
    /// A new `Session` instance.
    ///
    /// # Errors
    /// Fails when the runtime cannot be built or a worker cannot be reached.
    pub fn new(
        workers: Vec<(SocketAddr, WorkerSpec)>,
        rule: Box<dyn StoppingRule>,
    ) -> Result<Self, OrchestratorError> {
        let runtime = Runtime::new()?;
        let channels = runtime.block_on(Self::create_workers(workers))?;
        let orchestrator = ConsensusOrchestrator::new(channels, rule);

        Ok(Self {
            runtime,
            orchestrator,
        })
    }

    /// Runs the solve to completion, blocking the calling thread.
    ///
    /// # Arguments
    /// * `state` - The starting consensus point and duals.
    /// * `max_iter` - Maximum amount of outer iterations.
    /// * `acceleration` - Parameters of the accelerated runs, if any.
    ///
    /// # Returns
    /// The final state together with the residual history.
    pub fn run(
        &mut self,
        state: ConsensusState,
        max_iter: usize,
        acceleration: Option<&AndersonConfig>,
    ) -> Result<ConsensusOutcome, OrchestratorError> {
        self.runtime
            .block_on(self.orchestrator.run(state, max_iter, acceleration))
    }

    /// Tries to reach the workers and create them using the given specifications.
    ///
    /// # Arguments
    /// * `workers` - The network address and the specification of each worker.
    ///
    /// # Returns
    /// The communication channels or an error if failed to do so.
    async fn create_workers(
        workers: Vec<(SocketAddr, WorkerSpec)>,
    ) -> Result<Vec<(NetRx, NetTx)>, OrchestratorError> {
        let mut channels = Vec::with_capacity(workers.len());

        for (addr, spec) in workers {
            let (rx, mut tx) = Self::open_channel(addr)
                .await
                .map_err(|source| OrchestratorError::ConnectionFailed {
                    addr: addr.to_string(),
                    source,
                })?;

            info!(worker_id = spec.node_id; "creating worker at {addr}");
            let msg = Msg::Control(Command::CreateWorker(spec));
            tx.send(&msg).await?;
            channels.push((rx, tx));
        }

        Ok(channels)
    }

    /// Creates a communication channel with some entity through its network address.
    ///
    /// # Arguments
    /// * `addr` - The network address of some node.
    ///
    /// # Returns
    /// A communication channel or an io error if failed to do so.
    async fn open_channel(addr: SocketAddr) -> std::io::Result<(NetRx, NetTx)> {
        let stream = TcpStream::connect(addr).await?;
        let (rx, tx) = stream.into_split();
        Ok(comms::channel(rx, tx))
    }
}
