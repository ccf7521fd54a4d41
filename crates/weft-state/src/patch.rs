//! Patch containers.
//!
//! A [`Patch`] is an ordered list of operations applied as one transaction.
//! [`AppliedPatch`] is what a successful transaction leaves behind: the
//! inverse of every mutating op, in application order.

use crate::PatchOp;
use serde::{Deserialize, Serialize};

/// An ordered list of operations applied atomically.
///
/// Serializes as a plain JSON array, the patch wire format.
///
/// # Examples
///
/// ```
/// use weft_state::Patch;
/// use serde_json::json;
///
/// let patch: Patch = serde_json::from_value(json!([
///     {"op": "add", "path": "/users/-", "value": {"id": 1}}
/// ])).unwrap();
/// assert_eq!(patch.len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_ops(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    /// Add an operation (builder).
    #[inline]
    pub fn with_op(mut self, op: PatchOp) -> Self {
        self.ops.push(op);
        self
    }

    #[inline]
    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    #[inline]
    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    #[inline]
    pub fn into_ops(self) -> Vec<PatchOp> {
        self.ops
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PatchOp> {
        self.ops.iter()
    }

    /// Parse the JSON wire format.
    pub fn from_json(raw: &str) -> crate::WeftResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl FromIterator<PatchOp> for Patch {
    fn from_iter<I: IntoIterator<Item = PatchOp>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Patch {
    type Item = PatchOp;
    type IntoIter = std::vec::IntoIter<PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a PatchOp;
    type IntoIter = std::slice::Iter<'a, PatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Record of a successfully applied patch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppliedPatch {
    applied: usize,
    inverse: Vec<PatchOp>,
}

impl AppliedPatch {
    pub(crate) fn new(applied: usize, inverse: Vec<PatchOp>) -> Self {
        Self { applied, inverse }
    }

    /// Number of ops applied, `test` ops included.
    #[inline]
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Inverse of each mutating op, in the order the ops were applied.
    #[inline]
    pub fn inverse(&self) -> &[PatchOp] {
        &self.inverse
    }

    /// A patch that undoes this one (inverses in reverse order).
    pub fn undo_patch(&self) -> Patch {
        self.inverse.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pointer;
    use serde_json::json;

    #[test]
    fn test_patch_builder() {
        let patch = Patch::new()
            .with_op(PatchOp::replace(Pointer::parse("/a").unwrap(), 1))
            .with_op(PatchOp::remove(Pointer::parse("/b").unwrap()));
        assert_eq!(patch.len(), 2);
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_patch_is_a_json_array() {
        let patch = Patch::new().with_op(PatchOp::test(Pointer::parse("/a").unwrap(), json!(0)));
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!([{"op": "test", "path": "/a", "value": 0}])
        );
    }

    #[test]
    fn test_from_json_reports_serialization_error() {
        let err = Patch::from_json("{\"op\": \"add\"}").unwrap_err();
        assert!(matches!(err, crate::WeftError::Serialization(_)));
    }

    #[test]
    fn test_undo_patch_reverses_inverses() {
        let first = PatchOp::remove(Pointer::parse("/a").unwrap());
        let second = PatchOp::remove(Pointer::parse("/b").unwrap());
        let applied = AppliedPatch::new(2, vec![first.clone(), second.clone()]);
        assert_eq!(applied.undo_patch().into_ops(), vec![second, first]);
    }
}
