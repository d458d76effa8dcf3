use comms::{VarId, VarMap, msg::SolveStatus};

use crate::context::ProxContext;

/// The outcome of one proximal step.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// The primal values by variable id, may be incomplete when `status` is fatal.
    pub values: VarMap,
}

/// A node's local subproblem.
///
/// `solve` minimizes `f(x) + (rho / 2) * ||x - xbar - dual / rho||^2` over
/// the owned variables, reading `rho`, `xbar` and `dual` from the context.
pub trait Solver: Send {
    /// The owned variable ids together with their shapes.
    fn variables(&self) -> Vec<(VarId, Vec<usize>)>;

    fn solve(&mut self, ctx: &ProxContext) -> Solution;
}

/// `f(x) = (weight / 2) * sum ||x_id - target_id||^2`, solved in closed form.
#[derive(Debug, Clone)]
pub struct QuadraticSolver {
    weight: f64,
    targets: VarMap,
}

impl QuadraticSolver {
    pub fn new(weight: f64, targets: VarMap) -> Self {
        Self { weight, targets }
    }
}

impl Solver for QuadraticSolver {
    fn variables(&self) -> Vec<(VarId, Vec<usize>)> {
        self.targets
            .iter()
            .map(|(id, target)| (id, target.shape().to_vec()))
            .collect()
    }

    fn solve(&mut self, ctx: &ProxContext) -> Solution {
        let denom = self.weight + ctx.rho();
        if !(denom > 0.0) {
            return Solution {
                status: SolveStatus::Unbounded,
                values: VarMap::new(),
            };
        }

        let values = self
            .targets
            .iter()
            .filter_map(|(id, target)| {
                let var = ctx.get(id)?;
                let x = (target * self.weight + &var.xbar * ctx.rho() + &var.dual) / denom;
                Some((id, x))
            })
            .collect();

        Solution {
            status: SolveStatus::Optimal,
            values,
        }
    }
}
