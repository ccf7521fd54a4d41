//! Patch operations.
//!
//! Each operation is one atomic instruction of a transactional patch, in the
//! JSON-Patch wire shape `{"op": ..., "path": ..., "value": ...}`.

use crate::Pointer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert into an array (shifting later elements), append at `-`, or set
    /// an object key.
    Add { path: Pointer, value: Value },

    /// Delete the value at the location. The location must exist.
    Remove { path: Pointer },

    /// Overwrite the value at the location. The location must exist.
    Replace { path: Pointer, value: Value },

    /// Assert the value at the location deep-equals `value`. Never mutates.
    Test { path: Pointer, value: Value },
}

impl PatchOp {
    #[inline]
    pub fn add(path: Pointer, value: impl Into<Value>) -> Self {
        PatchOp::Add {
            path,
            value: value.into(),
        }
    }

    #[inline]
    pub fn remove(path: Pointer) -> Self {
        PatchOp::Remove { path }
    }

    #[inline]
    pub fn replace(path: Pointer, value: impl Into<Value>) -> Self {
        PatchOp::Replace {
            path,
            value: value.into(),
        }
    }

    #[inline]
    pub fn test(path: Pointer, value: impl Into<Value>) -> Self {
        PatchOp::Test {
            path,
            value: value.into(),
        }
    }

    /// The location this operation targets.
    #[inline]
    pub fn path(&self) -> &Pointer {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Test { path, .. } => path,
        }
    }

    /// Wire name of the operation.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Remove { .. } => "remove",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Test { .. } => "test",
        }
    }

    /// Whether applying this op can change the tree.
    #[inline]
    pub fn is_mutating(&self) -> bool {
        !matches!(self, PatchOp::Test { .. })
    }
}
