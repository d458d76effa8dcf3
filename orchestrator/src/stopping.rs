use comms::msg::ResidualContribution;
use serde::Deserialize;

/// The global residuals of one consensus iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResidualSet {
    /// Sum of squares of the consensus gap across every node.
    pub primal: f64,
    /// Sum of squares of the rho-scaled consensus change across every node.
    pub dual: f64,
    pub stopped: bool,
}

impl ResidualSet {
    /// Sums the nodes' contributions and lets `rule` decide on them.
    pub fn gather<I>(contributions: I, rule: &dyn StoppingRule) -> Self
    where
        I: IntoIterator<Item = ResidualContribution>,
    {
        let total: ResidualContribution = contributions.into_iter().sum();
        Self {
            primal: total.primal,
            dual: total.dual,
            stopped: rule.should_stop(&total),
        }
    }
}

/// Decides whether a consensus solve has converged.
pub trait StoppingRule: Send + Sync {
    /// # Arguments
    /// * `total` - Every node's contribution to the current iteration, summed.
    fn should_stop(&self, total: &ResidualContribution) -> bool;
}

/// Iterates until the iteration budget runs out.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl StoppingRule for Never {
    fn should_stop(&self, _total: &ResidualContribution) -> bool {
        false
    }
}

/// Stops when both residual norms fall below fixed tolerances.
#[derive(Debug, Clone, Copy)]
pub struct Absolute {
    pub primal: f64,
    pub dual: f64,
}

impl StoppingRule for Absolute {
    fn should_stop(&self, total: &ResidualContribution) -> bool {
        total.primal.sqrt() <= self.primal && total.dual.sqrt() <= self.dual
    }
}

/// Stops when both residual norms fall below tolerances scaled by the
/// problem size and by the magnitude of the iterates.
#[derive(Debug, Clone, Copy)]
pub struct Relative {
    pub eps_abs: f64,
    pub eps_rel: f64,
}

impl StoppingRule for Relative {
    fn should_stop(&self, total: &ResidualContribution) -> bool {
        let base = (total.size as f64).sqrt() * self.eps_abs;
        let eps_primal = base + self.eps_rel * total.x.sqrt().max(total.xbar.sqrt());
        let eps_dual = base + self.eps_rel * total.u.sqrt();

        total.primal.sqrt() <= eps_primal && total.dual.sqrt() <= eps_dual
    }
}

/// Stopping rule selection as found in configuration files.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum StoppingConfig {
    #[default]
    Never,
    Absolute {
        primal: f64,
        dual: f64,
    },
    Relative {
        eps_abs: f64,
        eps_rel: f64,
    },
}

impl StoppingConfig {
    pub fn build(self) -> Box<dyn StoppingRule> {
        match self {
            StoppingConfig::Never => Box::new(Never),
            StoppingConfig::Absolute { primal, dual } => Box::new(Absolute { primal, dual }),
            StoppingConfig::Relative { eps_abs, eps_rel } => {
                Box::new(Relative { eps_abs, eps_rel })
            }
        }
    }
}
