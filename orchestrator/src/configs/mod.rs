mod adapter;
mod consensus;

pub use adapter::{Adapter, Plan};
pub use consensus::{AccelerationConfig, ConsensusConfig, WorkerConfig};
