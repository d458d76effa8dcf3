use comms::{VarMap, msg::ResidualContribution};

use crate::solver::Solution;

/// Where a worker stands within one consensus iteration.
///
/// Every state carries the data the next transition needs, the cycle being
/// `AwaitScatter -> ComputeResidual -> SendResidual -> Solve -> SendResult ->
/// AwaitXbar -> UpdateDual -> SendDual -> AwaitScatter`.
#[derive(Debug)]
pub enum State {
    AwaitScatter,
    ComputeResidual { xbar: VarMap, dual: VarMap },
    SendResidual(ResidualContribution),
    Solve,
    SendResult(Solution),
    AwaitXbar,
    UpdateDual(VarMap),
    SendDual(VarMap),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::AwaitScatter => "await_scatter",
            State::ComputeResidual { .. } => "compute_residual",
            State::SendResidual(_) => "send_residual",
            State::Solve => "solve",
            State::SendResult(_) => "send_result",
            State::AwaitXbar => "await_xbar",
            State::UpdateDual(_) => "update_dual",
            State::SendDual(_) => "send_dual",
        }
    }
}
