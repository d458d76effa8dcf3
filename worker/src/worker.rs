use std::{borrow::Cow, io};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Msg, Payload, SolveStatus},
};
use log::{debug, info, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};
use tokio_util::sync::CancellationToken;

use crate::{
    context::ProxContext,
    error::{Result, WorkerErr},
    solver::Solver,
    state::State,
};

/// A consensus participant driving its side of the orchestrator protocol.
pub struct Worker {
    node_id: usize,
    solver: Box<dyn Solver>,
    ctx: ProxContext,
}

impl Worker {
    /// Creates a new `Worker` whose context starts at zero consensus and dual values.
    ///
    /// # Args
    /// * `node_id` - Identifier used for observability.
    /// * `rho` - The step size of this node's proximal penalty.
    /// * `solver` - The local subproblem.
    ///
    /// # Returns
    /// A new worker instance.
    pub fn new(node_id: usize, rho: f64, solver: Box<dyn Solver>) -> Self {
        let ctx = ProxContext::new(rho, &solver.variables());
        Self {
            node_id,
            solver,
            ctx,
        }
    }

    pub fn node_id(&self) -> usize {
        self.node_id
    }

    /// Runs the worker's state machine until the orchestrator hangs up or
    /// `cancel` fires.
    ///
    /// A protocol violation is reported to the orchestrator with an error
    /// frame before returning.
    ///
    /// # Args
    /// * `rx` - Receiving end of the orchestrator channel.
    /// * `tx` - Sending end of the orchestrator channel.
    /// * `cancel` - Token checked between every exchange.
    ///
    /// # Returns
    /// Returns `Ok(())` on teardown.
    ///
    /// # Errors
    /// Returns `WorkerErr` on I/O failures, protocol violations or a failed solve.
    pub async fn run<R, W>(
        self,
        mut rx: OnoReceiver<R>,
        mut tx: OnoSender<W>,
        cancel: CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let node_id = self.node_id;
        let ret = self.drive(&mut rx, &mut tx, &cancel).await;

        if let Err(e) = &ret {
            if !matches!(e, WorkerErr::Io(_)) {
                warn!(worker_id = node_id; "stopping on {e}");
                let msg = Msg::Err(Cow::Owned(e.to_string()));
                if let Err(send_err) = tx.send(&msg).await {
                    debug!(worker_id = node_id; "could not report the failure: {send_err}");
                }
            }
        }

        ret
    }

    async fn drive<R, W>(
        self,
        rx: &mut OnoReceiver<R>,
        tx: &mut OnoSender<W>,
        cancel: &CancellationToken,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let Self {
            node_id,
            mut solver,
            mut ctx,
        } = self;

        let mut rx_buf = Vec::new();
        let mut iteration = 0;
        let mut state = State::AwaitScatter;

        loop {
            if cancel.is_cancelled() {
                info!(worker_id = node_id, iteration = iteration; "cancelled");
                return Ok(());
            }

            let current = state.name();
            state = match state {
                State::AwaitScatter => {
                    let msg = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        msg = rx.recv_into(&mut rx_buf) => msg,
                    };

                    match msg {
                        Ok(Msg::Data(Payload::Scatter {
                            iteration: it,
                            xbar,
                            dual,
                        })) => {
                            iteration = it;
                            debug!(worker_id = node_id, iteration = it; "received scatter");
                            State::ComputeResidual {
                                xbar: ctx.pick(it, &xbar)?,
                                dual: ctx.pick(it, &dual)?,
                            }
                        }
                        Ok(other) => return Err(unexpected(iteration, current, &other)),
                        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                            info!(worker_id = node_id; "orchestrator hung up");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                State::ComputeResidual { xbar, dual } => {
                    let residual = ctx.residual(&xbar, &dual);
                    ctx.stage(xbar, dual);
                    State::SendResidual(residual)
                }
                State::SendResidual(residual) => {
                    tx.send(&Msg::Data(Payload::Residual(residual))).await?;
                    State::Solve
                }
                State::Solve => {
                    let (solver_back, ctx_back, solution) = task::spawn_blocking(move || {
                        let solution = solver.solve(&ctx);
                        (solver, ctx, solution)
                    })
                    .await?;

                    solver = solver_back;
                    ctx = ctx_back;

                    match solution.status {
                        SolveStatus::Optimal => ctx.accept(iteration, &solution.values)?,
                        SolveStatus::OptimalInaccurate => {
                            warn!(worker_id = node_id, iteration = iteration; "proximal step may be inaccurate");
                            ctx.accept(iteration, &solution.values)?;
                        }
                        status => {
                            warn!(worker_id = node_id, iteration = iteration; "proximal step is {}", status.as_str());
                        }
                    }

                    State::SendResult(solution)
                }
                State::SendResult(solution) => {
                    let msg = Msg::Data(Payload::Prox {
                        status: solution.status,
                        rho: ctx.rho(),
                        values: Cow::Borrowed(&solution.values),
                    });

                    tx.send(&msg).await?;
                    State::AwaitXbar
                }
                State::AwaitXbar => {
                    let msg = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        msg = rx.recv_into(&mut rx_buf) => msg?,
                    };

                    match msg {
                        Msg::Data(Payload::Consensus(xbar)) => {
                            State::UpdateDual(ctx.pick(iteration, &xbar)?)
                        }
                        other => return Err(unexpected(iteration, current, &other)),
                    }
                }
                State::UpdateDual(xbar) => State::SendDual(ctx.update_dual(iteration, &xbar)?),
                State::SendDual(dual) => {
                    tx.send(&Msg::Data(Payload::Dual(Cow::Borrowed(&dual))))
                        .await?;
                    debug!(worker_id = node_id, iteration = iteration; "iteration done");
                    State::AwaitScatter
                }
            };
        }
    }
}

fn unexpected(iteration: usize, state: &'static str, got: &Msg<'_>) -> WorkerErr {
    if let Msg::Err(detail) = got {
        warn!("orchestrator reported an error: {detail}");
    }

    WorkerErr::UnexpectedMessage {
        iteration,
        state,
        got: got.kind(),
    }
}
