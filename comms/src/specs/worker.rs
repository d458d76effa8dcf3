use serde::{Deserialize, Serialize};

use crate::tensor::{VarId, VarMap};

/// Wire-level bootstrap specification for a worker instance.
///
/// This type is exchanged over the network during worker bootstrap, before
/// the first consensus iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Node identifier assigned by the orchestrator.
    pub node_id: usize,
    /// Step size of this node's proximal penalty.
    pub rho: f64,
    /// The local subproblem the node solves.
    pub solver: SolverSpec,
}

/// Local subproblem selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverSpec {
    /// `(weight / 2) * sum ||x_id - target_id||^2` over every target.
    Quadratic { weight: f64, targets: VarMap },
}

impl SolverSpec {
    /// The variables (and their shapes) owned by a node running this subproblem.
    pub fn variables(&self) -> Vec<(VarId, Vec<usize>)> {
        match self {
            SolverSpec::Quadratic { targets, .. } => targets
                .iter()
                .map(|(id, value)| (id, value.shape().to_vec()))
                .collect(),
        }
    }
}
