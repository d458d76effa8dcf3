use std::fmt;

use anderson::AccelErr;
use comms::msg::SolveStatus;

use crate::codec::CodecErr;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before connecting.
    InvalidConfig(String),
    /// Failed to connect to a worker.
    ConnectionFailed {
        addr: String,
        source: std::io::Error,
    },
    /// A worker reported an unrecoverable error with an error frame.
    WorkerError { worker_id: usize, msg: String },
    /// A worker's proximal step was infeasible or unbounded, the whole step is aborted.
    InfeasibleOrUnbounded {
        worker_id: usize,
        status: SolveStatus,
    },
    /// A worker answered out of protocol order.
    ProtocolViolation {
        worker_id: usize,
        expected: &'static str,
        got: &'static str,
    },
    /// The flat vector and the consensus state disagree on layout.
    Codec(CodecErr),
    /// The accelerator rejected its parameters or the map's output.
    Accel(AccelErr),
    /// An underlying I/O error not covered by the above variants.
    Io(std::io::Error),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::ConnectionFailed { addr, source } => {
                write!(f, "connection failed to {addr}: {source}")
            }
            Self::WorkerError { worker_id, msg } => {
                write!(f, "worker {worker_id} error: {msg}")
            }
            Self::InfeasibleOrUnbounded { worker_id, status } => {
                write!(f, "worker {worker_id} proximal step is {}", status.as_str())
            }
            Self::ProtocolViolation {
                worker_id,
                expected,
                got,
            } => write!(
                f,
                "worker {worker_id} violated the protocol: expected {expected}, got {got}"
            ),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Accel(e) => write!(f, "accelerator error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::Codec(e) => Some(e),
            Self::Accel(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecErr> for OrchestratorError {
    fn from(e: CodecErr) -> Self {
        Self::Codec(e)
    }
}

impl From<AccelErr> for OrchestratorError {
    fn from(e: AccelErr) -> Self {
        Self::Accel(e)
    }
}
