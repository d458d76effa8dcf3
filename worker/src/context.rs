use comms::{VarId, VarMap, msg::ResidualContribution};
use ndarray::ArrayD;

use crate::error::{Result, WorkerErr};

/// The local view of one owned variable.
#[derive(Debug, Clone)]
pub struct ProxVar {
    /// The last accepted local primal value, `None` before the first solve.
    pub x: Option<ArrayD<f64>>,
    /// The consensus value of the current iteration.
    pub xbar: ArrayD<f64>,
    /// The dual value of the current iteration.
    pub dual: ArrayD<f64>,
}

/// Everything a node's proximal step depends on, keyed by variable id.
///
/// The context is owned by the node, only a shared reference is ever handed
/// to its `Solver`.
#[derive(Debug, Clone, Default)]
pub struct ProxContext {
    rho: f64,
    vars: Vec<(VarId, ProxVar)>,
}

fn squares(a: &ArrayD<f64>) -> f64 {
    a.iter().map(|v| v * v).sum()
}

impl ProxContext {
    /// Creates a new `ProxContext` with zeroed consensus and dual values and
    /// no local primal values.
    ///
    /// # Arguments
    /// * `rho` - The node's step size.
    /// * `variables` - The owned variable ids and their shapes.
    pub fn new(rho: f64, variables: &[(VarId, Vec<usize>)]) -> Self {
        let vars = variables
            .iter()
            .map(|(id, shape)| {
                let var = ProxVar {
                    x: None,
                    xbar: ArrayD::zeros(shape.as_slice()),
                    dual: ArrayD::zeros(shape.as_slice()),
                };

                (*id, var)
            })
            .collect();

        Self { rho, vars }
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn get(&self, id: VarId) -> Option<&ProxVar> {
        self.vars
            .iter()
            .find_map(|(key, var)| (*key == id).then_some(var))
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &ProxVar)> {
        self.vars.iter().map(|(id, var)| (*id, var))
    }

    /// Copies the owned entries out of `map`, checking their shapes.
    ///
    /// Entries of variables owned by other nodes are ignored.
    ///
    /// # Errors
    /// Fails when an owned variable is missing from `map` or has a different shape.
    pub(crate) fn pick(&self, iteration: usize, map: &VarMap) -> Result<VarMap> {
        self.vars
            .iter()
            .map(|(id, var)| {
                let value = map.get(*id).ok_or(WorkerErr::MissingVariable {
                    iteration,
                    id: *id,
                })?;

                if value.shape() != var.xbar.shape() {
                    return Err(WorkerErr::ShapeMismatch {
                        iteration,
                        id: *id,
                        got: value.shape().to_vec(),
                        expected: var.xbar.shape().to_vec(),
                    });
                }

                Ok((*id, value.clone()))
            })
            .collect()
    }

    /// Measures this node's residuals against the incoming consensus point,
    /// before anything local changes.
    ///
    /// `xbar` and `dual` must come out of [`ProxContext::pick`].
    pub(crate) fn residual(&self, xbar: &VarMap, dual: &VarMap) -> ResidualContribution {
        let mut res = ResidualContribution::default();

        for ((id, var), new_xbar) in self.iter().zip(xbar.iter().map(|(_, v)| v)) {
            res.primal += match &var.x {
                Some(x) => squares(&(new_xbar - x)),
                None => squares(new_xbar),
            };
            res.dual += squares(&((&var.xbar - new_xbar) * self.rho));
            res.x += var.x.as_ref().map(squares).unwrap_or_default();
            res.xbar += squares(new_xbar);
            res.u += dual.get(id).map(squares).unwrap_or_default();
            res.size += new_xbar.len();
        }

        res
    }

    /// Replaces the consensus and dual values with the incoming ones.
    pub(crate) fn stage(&mut self, xbar: VarMap, mut dual: VarMap) {
        for ((id, var), (_, new_xbar)) in self.vars.iter_mut().zip(xbar) {
            var.xbar = new_xbar;
            if let Some(new_dual) = dual.get_mut(*id) {
                std::mem::swap(&mut var.dual, new_dual);
            }
        }
    }

    /// Takes the solved primal values as the new local values.
    ///
    /// # Errors
    /// Fails when an owned variable is missing from `values` or has a
    /// different shape, in which case nothing is updated.
    pub(crate) fn accept(&mut self, iteration: usize, values: &VarMap) -> Result<()> {
        let picked = self.pick(iteration, values)?;
        for ((_, var), (_, x)) in self.vars.iter_mut().zip(picked) {
            var.x = Some(x);
        }

        Ok(())
    }

    /// Applies `dual += rho * (xbar - x)` for every owned variable.
    ///
    /// # Returns
    /// The updated dual values.
    ///
    /// # Errors
    /// Fails when there is no local value to update against.
    pub(crate) fn update_dual(&mut self, iteration: usize, xbar: &VarMap) -> Result<VarMap> {
        let rho = self.rho;
        let mut out = VarMap::new();

        for ((id, var), (_, new_xbar)) in self.vars.iter_mut().zip(xbar.iter()) {
            let x = var.x.as_ref().ok_or(WorkerErr::MissingVariable {
                iteration,
                id: *id,
            })?;

            var.dual.scaled_add(rho, &(new_xbar - x));
            out.insert(*id, var.dual.clone());
        }

        Ok(out)
    }
}
