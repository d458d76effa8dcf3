use std::borrow::Cow;

use anderson::{AndersonConfig, Evaluation, FixedPointMap, accelerate};
use comms::{
    OnoReceiver, OnoSender, VarMap,
    msg::{Msg, Payload, ResidualContribution},
};
use futures::future;
use log::{debug, info};
use ndarray::Array1;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    average::{ProxResult, average},
    codec::{self, ShapeTable},
    error::OrchestratorError,
    state::ConsensusState,
    stopping::{ResidualSet, StoppingRule},
};

/// The orchestrator's end of the channel to one worker.
struct WorkerLink<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    worker_id: usize,
    rx: OnoReceiver<R>,
    tx: OnoSender<W>,
    rx_buf: Vec<u8>,
}

impl<R, W> WorkerLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, payload: Payload<'_>) -> Result<(), OrchestratorError> {
        self.tx.send(&Msg::Data(payload)).await?;
        Ok(())
    }

    /// Receives the next data payload, anything else is fatal for the step.
    async fn recv(&mut self, expected: &'static str) -> Result<Payload<'_>, OrchestratorError> {
        match self.rx.recv_into(&mut self.rx_buf).await? {
            Msg::Data(payload) => Ok(payload),
            Msg::Err(detail) => Err(OrchestratorError::WorkerError {
                worker_id: self.worker_id,
                msg: detail.into_owned(),
            }),
            other => Err(OrchestratorError::ProtocolViolation {
                worker_id: self.worker_id,
                expected,
                got: other.kind(),
            }),
        }
    }

    async fn recv_residual(&mut self) -> Result<ResidualContribution, OrchestratorError> {
        let worker_id = self.worker_id;
        match self.recv("data/residual").await? {
            Payload::Residual(residual) => Ok(residual),
            other => Err(violation(worker_id, "data/residual", &other)),
        }
    }

    async fn recv_prox(&mut self) -> Result<ProxResult, OrchestratorError> {
        let worker_id = self.worker_id;
        match self.recv("data/prox").await? {
            Payload::Prox {
                status,
                rho,
                values,
            } => Ok(ProxResult {
                worker_id,
                status,
                rho,
                values: values.into_owned(),
            }),
            other => Err(violation(worker_id, "data/prox", &other)),
        }
    }

    async fn recv_dual(&mut self) -> Result<VarMap, OrchestratorError> {
        let worker_id = self.worker_id;
        match self.recv("data/dual").await? {
            Payload::Dual(dual) => Ok(dual.into_owned()),
            other => Err(violation(worker_id, "data/dual", &other)),
        }
    }
}

fn violation(worker_id: usize, expected: &'static str, got: &Payload<'_>) -> OrchestratorError {
    OrchestratorError::ProtocolViolation {
        worker_id,
        expected,
        got: got.kind(),
    }
}

/// The final state of a consensus solve and the residuals of every outer iteration.
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    pub state: ConsensusState,
    pub residuals: Vec<ResidualSet>,
}

/// Drives the consensus protocol over one channel per worker.
///
/// Every step is a barrier: each of its four exchanges waits for all the
/// workers before the next one starts.
pub struct ConsensusOrchestrator<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    links: Vec<WorkerLink<R, W>>,
    rule: Box<dyn StoppingRule>,
    iteration: usize,
}

impl<R, W> ConsensusOrchestrator<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a new `ConsensusOrchestrator`.
    ///
    /// # Arguments
    /// * `channels` - One channel per worker, worker `i` owning `duals[i]` of the state.
    /// * `rule` - Decides when the residuals are small enough.
    ///
    /// # Returns
    /// A new orchestrator instance.
    pub fn new(channels: Vec<(OnoReceiver<R>, OnoSender<W>)>, rule: Box<dyn StoppingRule>) -> Self {
        let links = channels
            .into_iter()
            .enumerate()
            .map(|(worker_id, (rx, tx))| WorkerLink {
                worker_id,
                rx,
                tx,
                rx_buf: Vec::new(),
            })
            .collect();

        Self {
            links,
            rule,
            iteration: 0,
        }
    }

    pub fn workers(&self) -> usize {
        self.links.len()
    }

    /// Amount of steps performed so far, which is also the next step's number.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Performs one consensus iteration on a flat state.
    ///
    /// # Arguments
    /// * `x` - The flat consensus point and duals.
    /// * `table` - The layout of `x`.
    ///
    /// # Returns
    /// The flat state after the iteration, laid out as `table` says, and the
    /// residuals measured at `x`.
    ///
    /// # Errors
    /// Fails on layout errors, I/O errors, worker errors, protocol violations
    /// and whenever a worker's proximal step is infeasible or unbounded.
    pub async fn step(
        &mut self,
        x: &Array1<f64>,
        table: &ShapeTable,
    ) -> Result<(Array1<f64>, ResidualSet), OrchestratorError> {
        let state = codec::unflatten(x, table)?;
        if state.nodes() != self.links.len() {
            return Err(OrchestratorError::InvalidConfig(format!(
                "state has duals for {} nodes, {} workers are connected",
                state.nodes(),
                self.links.len()
            )));
        }

        let iteration = self.iteration;
        self.iteration += 1;

        let xbar = &state.xbar;
        future::try_join_all(self.links.iter_mut().zip(&state.duals).map(|(link, dual)| {
            link.send(Payload::Scatter {
                iteration,
                xbar: Cow::Borrowed(xbar),
                dual: Cow::Borrowed(dual),
            })
        }))
        .await?;

        let contributions =
            future::try_join_all(self.links.iter_mut().map(WorkerLink::recv_residual)).await?;
        let residuals = ResidualSet::gather(contributions, self.rule.as_ref());
        info!(
            iteration = iteration,
            primal = residuals.primal,
            dual = residuals.dual,
            stopped = residuals.stopped;
            "residuals"
        );

        let results = future::try_join_all(self.links.iter_mut().map(WorkerLink::recv_prox)).await?;
        let xbar = average(&results)?;

        future::try_join_all(
            self.links
                .iter_mut()
                .map(|link| link.send(Payload::Consensus(Cow::Borrowed(&xbar)))),
        )
        .await?;

        let duals = future::try_join_all(self.links.iter_mut().map(WorkerLink::recv_dual)).await?;
        debug!(iteration = iteration; "step done");

        let next = codec::flatten_with(&ConsensusState::new(xbar, duals), table)?;
        Ok((next, residuals))
    }

    /// Solves the consensus problem starting from `state`.
    ///
    /// Every outer iteration is either a single step or, when `acceleration`
    /// is given, a whole accelerated run whose fixed point map is the step.
    /// The loop ends after `max_iter` outer iterations or as soon as an outer
    /// iteration other than the first one reports `stopped`.
    ///
    /// # Errors
    /// Propagates the first error of any step, the in-flight iteration being lost.
    pub async fn run(
        &mut self,
        state: ConsensusState,
        max_iter: usize,
        acceleration: Option<&AndersonConfig>,
    ) -> Result<ConsensusOutcome, OrchestratorError> {
        let (mut x, table) = codec::flatten(&state);
        let mut residuals = Vec::with_capacity(max_iter);

        for i in 0..max_iter {
            let report = match acceleration {
                Some(config) => {
                    let mut map = ConsensusMap::new(&mut *self, &table);
                    let run = accelerate(&mut map, x, *config).await?;
                    debug!(outer = i, evaluations = run.evaluations; "accelerated run done");
                    x = run.x;
                    run.report
                }
                None => {
                    let (next, report) = self.step(&x, &table).await?;
                    x = next;
                    report
                }
            };

            residuals.push(report);
            if i > 0 && report.stopped {
                info!(outer = i, steps = self.iteration; "converged");
                break;
            }
        }

        Ok(ConsensusOutcome {
            state: codec::unflatten(&x, &table)?,
            residuals,
        })
    }
}

/// The orchestrator step seen as a fixed point map over flat states.
pub struct ConsensusMap<'a, R: AsyncRead + Unpin, W: AsyncWrite + Unpin> {
    orchestrator: &'a mut ConsensusOrchestrator<R, W>,
    table: &'a ShapeTable,
}

impl<'a, R, W> ConsensusMap<'a, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(orchestrator: &'a mut ConsensusOrchestrator<R, W>, table: &'a ShapeTable) -> Self {
        Self {
            orchestrator,
            table,
        }
    }
}

impl<R, W> FixedPointMap for ConsensusMap<'_, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    type Report = ResidualSet;
    type Error = OrchestratorError;

    async fn eval(&mut self, x: &Array1<f64>) -> Result<Evaluation<ResidualSet>, OrchestratorError> {
        let (value, residuals) = self.orchestrator.step(x, self.table).await?;
        Ok(Evaluation {
            value,
            report: residuals,
            stopped: residuals.stopped,
        })
    }

    fn signals_stop(&self) -> bool {
        true
    }
}
