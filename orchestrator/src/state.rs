use comms::{VarId, VarMap};
use ndarray::ArrayD;

use crate::codec::CodecErr;

/// The shared consensus point plus every node's duals.
///
/// `duals[i]` holds node `i`'s dual values for the ids it owns, in the order
/// the node declared them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsensusState {
    pub xbar: VarMap,
    pub duals: Vec<VarMap>,
}

impl ConsensusState {
    pub fn new(xbar: VarMap, duals: Vec<VarMap>) -> Self {
        Self { xbar, duals }
    }

    /// Creates the starting state of a solve: the caller's `xbar` and zero duals.
    ///
    /// # Arguments
    /// * `xbar` - The initial consensus point.
    /// * `ownership` - Per node, the owned ids and their shapes.
    ///
    /// # Errors
    /// Fails when a node owns an id `xbar` lacks, or declares a shape that
    /// differs from `xbar`'s, or when an id of `xbar` has no owner.
    pub fn zeroed(xbar: VarMap, ownership: &[Vec<(VarId, Vec<usize>)>]) -> Result<Self, CodecErr> {
        let mut duals = Vec::with_capacity(ownership.len());

        for (node, owned) in ownership.iter().enumerate() {
            let mut dual = VarMap::new();

            for (id, shape) in owned {
                let value = xbar.get(*id).ok_or(CodecErr::MissingVariable {
                    node: Some(node),
                    id: *id,
                })?;

                if value.shape() != shape.as_slice() {
                    return Err(CodecErr::ShapeMismatch {
                        id: *id,
                        got: shape.clone(),
                        expected: value.shape().to_vec(),
                    });
                }

                dual.insert(*id, ArrayD::zeros(shape.as_slice()));
            }

            duals.push(dual);
        }

        if let Some(orphan) = xbar
            .ids()
            .find(|id| !duals.iter().any(|dual| dual.contains(*id)))
        {
            return Err(CodecErr::Unowned { id: orphan });
        }

        Ok(Self { xbar, duals })
    }

    /// Amount of participating nodes.
    pub fn nodes(&self) -> usize {
        self.duals.len()
    }
}
