mod accel;
mod config;
mod error;
mod history;
mod map;
pub mod qr;

pub use accel::{Accelerated, Accelerator, accelerate};
pub use config::AndersonConfig;
pub use error::{AccelErr, Result};
pub use map::{Evaluation, FixedPointMap, FnMap};
