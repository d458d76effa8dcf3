use std::{error::Error, fmt};

use comms::{VarId, VarMap};
use ndarray::{Array1, ArrayD, IxDyn};

use crate::state::ConsensusState;

/// Layout disagreements between a flat vector, its shape table and a state.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecErr {
    LengthMismatch {
        got: usize,
        expected: usize,
    },
    NodeCountMismatch {
        got: usize,
        expected: usize,
    },
    /// `node` is `None` for the consensus section.
    MissingVariable {
        node: Option<usize>,
        id: VarId,
    },
    UnexpectedVariables {
        node: Option<usize>,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        id: VarId,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    Unowned {
        id: VarId,
    },
}

impl fmt::Display for CodecErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecErr::LengthMismatch { got, expected } => {
                write!(f, "vector has {got} values, layout needs {expected}")
            }
            CodecErr::NodeCountMismatch { got, expected } => {
                write!(f, "state has {got} nodes, layout has {expected}")
            }
            CodecErr::MissingVariable { node: None, id } => {
                write!(f, "variable {id} missing from the consensus point")
            }
            CodecErr::MissingVariable { node: Some(node), id } => {
                write!(f, "variable {id} missing from node {node}")
            }
            CodecErr::UnexpectedVariables {
                node: None,
                got,
                expected,
            } => write!(f, "consensus point has {got} variables, layout has {expected}"),
            CodecErr::UnexpectedVariables {
                node: Some(node),
                got,
                expected,
            } => write!(f, "node {node} has {got} variables, layout has {expected}"),
            CodecErr::ShapeMismatch { id, got, expected } => {
                write!(f, "variable {id} has shape {got:?}, expected {expected:?}")
            }
            CodecErr::Unowned { id } => write!(f, "variable {id} is owned by no node"),
        }
    }
}

impl Error for CodecErr {}

/// One array's slot within a flat vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: VarId,
    pub shape: Vec<usize>,
}

impl Segment {
    fn len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// The layout of a flat vector: the consensus section, then one section per node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShapeTable {
    xbar: Vec<Segment>,
    duals: Vec<Vec<Segment>>,
}

impl ShapeTable {
    /// Records the layout of `state`.
    pub fn of(state: &ConsensusState) -> Self {
        Self {
            xbar: segments(&state.xbar),
            duals: state.duals.iter().map(segments).collect(),
        }
    }

    pub fn xbar(&self) -> &[Segment] {
        &self.xbar
    }

    pub fn duals(&self) -> &[Vec<Segment>] {
        &self.duals
    }

    pub fn nodes(&self) -> usize {
        self.duals.len()
    }

    /// Length of the flat vectors following this layout.
    pub fn len(&self) -> usize {
        self.xbar
            .iter()
            .chain(self.duals.iter().flatten())
            .map(Segment::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn segments(map: &VarMap) -> Vec<Segment> {
    map.iter()
        .map(|(id, value)| Segment {
            id,
            shape: value.shape().to_vec(),
        })
        .collect()
}

/// Flattens `state` following its own insertion order.
///
/// Every array is laid out row-major, consensus values first and then each
/// node's duals in node order.
///
/// # Returns
/// The flat vector together with the table that inverts it.
pub fn flatten(state: &ConsensusState) -> (Array1<f64>, ShapeTable) {
    let table = ShapeTable::of(state);
    let mut flat = Vec::with_capacity(table.len());

    for map in std::iter::once(&state.xbar).chain(&state.duals) {
        for (_, value) in map {
            flat.extend(value.iter().copied());
        }
    }

    (Array1::from(flat), table)
}

/// Flattens `state` following an existing `table`, whatever the state's own order is.
///
/// # Errors
/// Fails when `state` holds other ids, other shapes or another amount of
/// nodes than `table` describes.
pub fn flatten_with(state: &ConsensusState, table: &ShapeTable) -> Result<Array1<f64>, CodecErr> {
    if state.duals.len() != table.duals.len() {
        return Err(CodecErr::NodeCountMismatch {
            got: state.duals.len(),
            expected: table.duals.len(),
        });
    }

    let mut flat = Vec::with_capacity(table.len());
    let sections = std::iter::once((None, &state.xbar, &table.xbar)).chain(
        state
            .duals
            .iter()
            .zip(&table.duals)
            .enumerate()
            .map(|(node, (map, segments))| (Some(node), map, segments)),
    );

    for (node, map, segments) in sections {
        if map.len() != segments.len() {
            return Err(CodecErr::UnexpectedVariables {
                node,
                got: map.len(),
                expected: segments.len(),
            });
        }

        for Segment { id, shape } in segments {
            let value = map
                .get(*id)
                .ok_or(CodecErr::MissingVariable { node, id: *id })?;

            if value.shape() != shape.as_slice() {
                return Err(CodecErr::ShapeMismatch {
                    id: *id,
                    got: value.shape().to_vec(),
                    expected: shape.clone(),
                });
            }

            flat.extend(value.iter().copied());
        }
    }

    Ok(Array1::from(flat))
}

/// Rebuilds the state `table` describes out of a flat vector.
///
/// # Errors
/// Fails when `flat`'s length is not the one `table` requires.
pub fn unflatten(flat: &Array1<f64>, table: &ShapeTable) -> Result<ConsensusState, CodecErr> {
    let expected = table.len();
    if flat.len() != expected {
        return Err(CodecErr::LengthMismatch {
            got: flat.len(),
            expected,
        });
    }

    let mut values = flat.iter().copied();
    let mut section = |segments: &[Segment]| -> Result<VarMap, CodecErr> {
        segments
            .iter()
            .map(|segment| {
                let data: Vec<f64> = values.by_ref().take(segment.len()).collect();
                let value = ArrayD::from_shape_vec(IxDyn(&segment.shape), data).map_err(|_| {
                    CodecErr::ShapeMismatch {
                        id: segment.id,
                        got: vec![segment.len()],
                        expected: segment.shape.clone(),
                    }
                })?;
                Ok((segment.id, value))
            })
            .collect()
    };

    let xbar = section(table.xbar.as_slice())?;
    let duals = table
        .duals
        .iter()
        .map(|segments| section(segments.as_slice()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConsensusState { xbar, duals })
}
