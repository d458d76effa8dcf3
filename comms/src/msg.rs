use std::{borrow::Cow, io};

use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::{Deserialize, Serialize, specs::worker::WorkerSpec, tensor::VarMap};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR: Header = 0;
const CONTROL: Header = 1;
const DATA: Header = 2;

/// Outcome reported by a `Solver` for one proximal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SerdeSerialize, SerdeDeserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Optimal,
    OptimalInaccurate,
    Infeasible,
    Unbounded,
}

impl SolveStatus {
    /// Whether this status must abort the averaging step it takes part in.
    pub fn is_fatal(self) -> bool {
        matches!(self, SolveStatus::Infeasible | SolveStatus::Unbounded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::OptimalInaccurate => "optimal_inaccurate",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
        }
    }
}

/// A node's share of the stopping criteria for one iteration.
///
/// Every field is a sum of squares over the variables the node owns, except
/// `size` which counts their scalars.
#[derive(Debug, Clone, Copy, Default, PartialEq, SerdeSerialize, SerdeDeserialize)]
pub struct ResidualContribution {
    pub primal: f64,
    pub dual: f64,
    pub x: f64,
    pub xbar: f64,
    pub u: f64,
    pub size: usize,
}

impl std::ops::AddAssign for ResidualContribution {
    fn add_assign(&mut self, rhs: Self) {
        self.primal += rhs.primal;
        self.dual += rhs.dual;
        self.x += rhs.x;
        self.xbar += rhs.xbar;
        self.u += rhs.u;
        self.size += rhs.size;
    }
}

impl std::iter::Sum for ResidualContribution {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// One variant per exchange of a consensus iteration, in protocol order.
#[derive(Debug, SerdeSerialize, SerdeDeserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload<'a> {
    /// Orchestrator -> worker: the consensus point and this node's duals.
    Scatter {
        iteration: usize,
        xbar: Cow<'a, VarMap>,
        dual: Cow<'a, VarMap>,
    },
    /// Worker -> orchestrator: residuals measured before re-solving.
    Residual(ResidualContribution),
    /// Worker -> orchestrator: the outcome of the proximal step.
    Prox {
        status: SolveStatus,
        rho: f64,
        values: Cow<'a, VarMap>,
    },
    /// Orchestrator -> worker: the freshly averaged consensus point.
    Consensus(Cow<'a, VarMap>),
    /// Worker -> orchestrator: the updated duals.
    Dual(Cow<'a, VarMap>),
}

impl Payload<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Scatter { .. } => "data/scatter",
            Payload::Residual(_) => "data/residual",
            Payload::Prox { .. } => "data/prox",
            Payload::Consensus(_) => "data/consensus",
            Payload::Dual(_) => "data/dual",
        }
    }
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, SerdeSerialize, SerdeDeserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    CreateWorker(WorkerSpec),
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of the message kind, used for logging and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::CreateWorker(_)) => "control/create_worker",
            Msg::Data(payload) => payload.kind(),
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        let body = match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR.to_be_bytes());
                return Some(e.as_bytes());
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL.to_be_bytes());
                serde_json::to_writer(&mut *buf, cmd)
            }
            Msg::Data(payload) => {
                buf.extend_from_slice(&DATA.to_be_bytes());
                serde_json::to_writer(&mut *buf, payload)
            }
        };

        // Writing into a `Vec` cannot fail for these types, keep the frame well formed regardless.
        if let Err(e) = body {
            buf.truncate(crate::LEN_TYPE_SIZE);
            buf.extend_from_slice(&ERR.to_be_bytes());
            buf.extend_from_slice(format!("failed to encode {}: {e}", self.kind()).as_bytes());
        }

        None
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut kind = [0; HEADER_SIZE];
        kind.copy_from_slice(kind_buf);

        match Header::from_be_bytes(kind) {
            ERR => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL => Ok(Self::Control(serde_json::from_slice(rest)?)),
            DATA => Ok(Self::Data(serde_json::from_slice(rest)?)),
            kind => Self::invalid_kind(kind),
        }
    }
}
