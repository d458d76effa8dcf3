//! Variable values exchanged between the orchestrator and the workers.
//!
//! Every value is an n-dimensional `f64` array keyed by a problem-wide
//! variable id. On the wire a `VarMap` is a JSON object whose keys are the ids
//! (rendered as strings by the JSON encoder) and whose values are nested lists,
//! a 0-dimensional array being a bare number.

use std::{fmt, slice};

use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, Visitor},
    ser::{SerializeMap, SerializeSeq},
};

/// Unique identifier of a problem variable.
pub type VarId = u64;

/// An insertion ordered map from variable id to its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarMap {
    entries: Vec<(VarId, ArrayD<f64>)>,
}

impl VarMap {
    /// Creates a new empty `VarMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `id`.
    ///
    /// Replacing an existing id keeps its original position.
    ///
    /// # Returns
    /// The previous value stored under `id`, if any.
    pub fn insert(&mut self, id: VarId, value: ArrayD<f64>) -> Option<ArrayD<f64>> {
        match self.get_mut(id) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((id, value));
                None
            }
        }
    }

    pub fn get(&self, id: VarId) -> Option<&ArrayD<f64>> {
        self.entries
            .iter()
            .find_map(|(key, value)| (*key == id).then_some(value))
    }

    pub fn get_mut(&mut self, id: VarId) -> Option<&mut ArrayD<f64>> {
        self.entries
            .iter_mut()
            .find_map(|(key, value)| (*key == id).then_some(value))
    }

    pub fn contains(&self, id: VarId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Iterates the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &ArrayD<f64>)> {
        self.entries.iter().map(|(id, value)| (*id, value))
    }

    /// Total amount of scalars held across all entries.
    pub fn num_elements(&self) -> usize {
        self.entries.iter().map(|(_, value)| value.len()).sum()
    }

    /// Sum of squares of every scalar held across all entries.
    pub fn sum_squares(&self) -> f64 {
        self.entries
            .iter()
            .flat_map(|(_, value)| value.iter())
            .map(|v| v * v)
            .sum()
    }
}

impl FromIterator<(VarId, ArrayD<f64>)> for VarMap {
    fn from_iter<I: IntoIterator<Item = (VarId, ArrayD<f64>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (id, value) in iter {
            map.insert(id, value);
        }

        map
    }
}

impl IntoIterator for VarMap {
    type Item = (VarId, ArrayD<f64>);
    type IntoIter = std::vec::IntoIter<(VarId, ArrayD<f64>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a VarMap {
    type Item = &'a (VarId, ArrayD<f64>);
    type IntoIter = slice::Iter<'a, (VarId, ArrayD<f64>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Serializes an array view as nested lists.
struct Nested<'a>(ArrayViewD<'a, f64>);

impl Serialize for Nested<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.ndim() == 0 {
            let value = self.0.iter().next().copied().unwrap_or_default();
            return serializer.serialize_f64(value);
        }

        let len = self.0.len_of(Axis(0));
        let mut seq = serializer.serialize_seq(Some(len))?;
        for sub in self.0.outer_iter() {
            seq.serialize_element(&Nested(sub))?;
        }

        seq.end()
    }
}

/// The parsed, not yet validated, form of a nested list.
#[derive(Deserialize)]
#[serde(untagged)]
enum NestedValue {
    Scalar(f64),
    List(Vec<NestedValue>),
}

impl NestedValue {
    /// Infers the shape by descending through the first element of every level.
    fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut cur = self;
        while let NestedValue::List(items) = cur {
            shape.push(items.len());
            match items.first() {
                Some(first) => cur = first,
                None => break,
            }
        }

        shape
    }

    fn collect(self, shape: &[usize], out: &mut Vec<f64>) -> Result<(), String> {
        match (self, shape.split_first()) {
            (NestedValue::Scalar(v), None) => {
                out.push(v);
                Ok(())
            }
            (NestedValue::List(items), Some((&len, rest))) if items.len() == len => {
                items.into_iter().try_for_each(|item| item.collect(rest, out))
            }
            (NestedValue::List(items), Some((&len, _))) => Err(format!(
                "ragged nested list, expected {len} elements and got {}",
                items.len()
            )),
            (NestedValue::Scalar(_), Some(_)) => {
                Err("ragged nested list, found a number where a list was expected".into())
            }
            (NestedValue::List(_), None) => {
                Err("ragged nested list, found a list where a number was expected".into())
            }
        }
    }

    fn into_array(self) -> Result<ArrayD<f64>, String> {
        let shape = self.shape();
        let mut data = Vec::with_capacity(shape.iter().product());
        self.collect(&shape, &mut data)?;
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| e.to_string())
    }
}

impl Serialize for VarMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (id, value) in &self.entries {
            map.serialize_entry(id, &Nested(value.view()))?;
        }

        map.end()
    }
}

struct VarMapVisitor;

impl<'de> Visitor<'de> for VarMapVisitor {
    type Value = VarMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map from variable id to a nested list of numbers")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = VarMap::new();
        while let Some((id, value)) = access.next_entry::<VarId, NestedValue>()? {
            let value = value.into_array().map_err(de::Error::custom)?;
            if map.insert(id, value).is_some() {
                return Err(de::Error::custom(format!("duplicate variable id {id}")));
            }
        }

        Ok(map)
    }
}

impl<'de> Deserialize<'de> for VarMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(VarMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr0, arr1, arr2};

    use super::*;

    #[test]
    fn nested_lists_keep_shapes() {
        let mut map = VarMap::new();
        map.insert(7, arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn());
        map.insert(3, arr0(0.25).into_dyn());
        map.insert(11, arr1(&[-1.5]).into_dyn());

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"7":[[1.0,2.0,3.0],[4.0,5.0,6.0]],"3":0.25,"11":[-1.5]}"#);

        let back: VarMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
        assert_eq!(back.ids().collect::<Vec<_>>(), vec![7, 3, 11]);
    }

    #[test]
    fn ragged_lists_are_rejected() {
        let err = serde_json::from_str::<VarMap>(r#"{"1":[[1.0,2.0],[3.0]]}"#).unwrap_err();
        assert!(err.to_string().contains("ragged"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        assert!(serde_json::from_str::<VarMap>(r#"{"1":1.0,"1":2.0}"#).is_err());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut map: VarMap = [(1, arr0(1.0).into_dyn()), (2, arr0(2.0).into_dyn())]
            .into_iter()
            .collect();

        let old = map.insert(1, arr0(5.0).into_dyn());
        assert_eq!(old, Some(arr0(1.0).into_dyn()));
        assert_eq!(map.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(map.sum_squares(), 29.0);
        assert_eq!(map.num_elements(), 2);
    }
}
