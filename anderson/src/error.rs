use std::{error::Error, fmt};

/// The anderson module's result type.
pub type Result<T> = std::result::Result<T, AccelErr>;

/// Accelerator failures.
#[derive(Debug, Clone, PartialEq)]
pub enum AccelErr {
    InvalidWindow(usize),
    InvalidMaxIter(usize),
    InvalidRcond(f64),
    DimensionMismatch { got: usize, expected: usize },
}

impl fmt::Display for AccelErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelErr::InvalidWindow(window) => {
                write!(f, "window must be >= 1, got {window}")
            }
            AccelErr::InvalidMaxIter(max_iter) => {
                write!(f, "max_iter must be >= 1, got {max_iter}")
            }
            AccelErr::InvalidRcond(rcond) => write!(f, "rcond must be >= 1, got {rcond}"),
            AccelErr::DimensionMismatch { got, expected } => write!(
                f,
                "fixed point map returned {got} values, expected {expected}"
            ),
        }
    }
}

impl Error for AccelErr {}
