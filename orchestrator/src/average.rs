use std::collections::HashMap;

use comms::{VarId, VarMap, msg::SolveStatus};
use ndarray::ArrayD;

use crate::{codec::CodecErr, error::OrchestratorError};

/// A node's answer to a proximal step.
#[derive(Debug, Clone)]
pub struct ProxResult {
    pub worker_id: usize,
    pub status: SolveStatus,
    pub rho: f64,
    pub values: VarMap,
}

/// Computes the new consensus point out of every node's proximal values.
///
/// Each id gets the rho-weighted mean of the values reported for it. An id
/// reported by a single node takes that node's values as they are.
///
/// # Errors
/// Fails with `InfeasibleOrUnbounded` when any node's step failed, in which
/// case nothing is averaged, and with a codec error when two nodes report
/// different shapes for the same id.
pub fn average(results: &[ProxResult]) -> Result<VarMap, OrchestratorError> {
    if let Some(failed) = results.iter().find(|res| res.status.is_fatal()) {
        return Err(OrchestratorError::InfeasibleOrUnbounded {
            worker_id: failed.worker_id,
            status: failed.status,
        });
    }

    let mut order: Vec<VarId> = Vec::new();
    let mut contributors: HashMap<VarId, Vec<(f64, &ArrayD<f64>)>> = HashMap::new();

    for res in results {
        for (id, value) in res.values.iter() {
            let entry = contributors.entry(id).or_insert_with(|| {
                order.push(id);
                Vec::new()
            });

            if let Some((_, first)) = entry.first() {
                if first.shape() != value.shape() {
                    return Err(CodecErr::ShapeMismatch {
                        id,
                        got: value.shape().to_vec(),
                        expected: first.shape().to_vec(),
                    }
                    .into());
                }
            }

            entry.push((res.rho, value));
        }
    }

    let mut xbar = VarMap::new();
    for id in order {
        let Some(values) = contributors.remove(&id) else {
            continue;
        };

        let mean = match values.as_slice() {
            [(_, only)] => (*only).clone(),
            [(rho, first), rest @ ..] => {
                let mut acc = *first * *rho;
                let mut total = *rho;
                for (rho, value) in rest {
                    acc.scaled_add(*rho, *value);
                    total += *rho;
                }

                acc / total
            }
            [] => continue,
        };

        xbar.insert(id, mean);
    }

    Ok(xbar)
}
