use comms::specs::worker::{SolverSpec, WorkerSpec};

use crate::{
    Worker,
    solver::{QuadraticSolver, Solver},
};

pub struct WorkerBuilder;

impl WorkerBuilder {
    /// Builds a `Worker` from a `WorkerSpec`.
    ///
    /// # Args
    /// * `spec` - Bootstrap specification received from the orchestrator.
    ///
    /// # Returns
    /// A fully initialized `Worker` instance.
    pub fn build(spec: WorkerSpec) -> Worker {
        let solver: Box<dyn Solver> = match spec.solver {
            SolverSpec::Quadratic { weight, targets } => {
                Box::new(QuadraticSolver::new(weight, targets))
            }
        };

        Worker::new(spec.node_id, spec.rho, solver)
    }
}
