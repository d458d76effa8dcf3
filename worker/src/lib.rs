pub mod builder;
pub mod context;
pub mod error;
pub mod solver;
pub mod state;
pub mod worker;

pub use builder::WorkerBuilder;
pub use context::{ProxContext, ProxVar};
pub use error::WorkerErr;
pub use solver::{QuadraticSolver, Solution, Solver};
pub use worker::Worker;
