use std::{error::Error, fmt, io};

use comms::VarId;
use tokio::task::JoinError;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Worker runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    UnexpectedMessage {
        iteration: usize,
        state: &'static str,
        got: &'static str,
    },
    MissingVariable {
        iteration: usize,
        id: VarId,
    },
    ShapeMismatch {
        iteration: usize,
        id: VarId,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Join(JoinError),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::UnexpectedMessage {
                iteration,
                state,
                got,
            } => write!(
                f,
                "unexpected message at iteration {iteration} while in {state}: got {got}"
            ),
            WorkerErr::MissingVariable { iteration, id } => {
                write!(f, "variable {id} missing at iteration {iteration}")
            }
            WorkerErr::ShapeMismatch {
                iteration,
                id,
                got,
                expected,
            } => write!(
                f,
                "variable {id} shape mismatch at iteration {iteration}: got {got:?}, expected {expected:?}"
            ),
            WorkerErr::Join(e) => write!(f, "solver task failed: {e}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Join(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<JoinError> for WorkerErr {
    fn from(value: JoinError) -> Self {
        Self::Join(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
