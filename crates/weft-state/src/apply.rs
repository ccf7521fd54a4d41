//! Transactional patch application.
//!
//! Ops are applied one by one against the live [`Tree`], so every successful
//! op notifies through the tree's change hook as usual. The inverse of each
//! mutating op is pushed on an undo stack; on the first failure the stack is
//! replayed in reverse and the patch reports [`PatchFailure`].

use crate::{
    AppliedPatch, NodeKind, Patch, PatchOp, Path, Pointer, Seg, Tree, WeftError,
    WeftResult, APPEND_MARKER,
};
use crate::path::parse_array_index;
use serde_json::Value;
use thiserror::Error;

/// Outcome of undoing a partially applied patch.
#[derive(Debug, Clone, PartialEq)]
pub enum Rollback {
    /// Every inverse applied; the tree is back to its pre-patch state.
    Complete { undone: usize },
    /// At least one inverse failed. The tree may be inconsistent.
    Failed {
        undone: usize,
        errors: Vec<WeftError>,
    },
}

impl Rollback {
    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, Rollback::Complete { .. })
    }
}

/// A patch that failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("patch op #{index} ({}) failed: {error}", .op.name())]
pub struct PatchFailure {
    /// Position of the failing op in the patch.
    pub index: usize,
    pub op: PatchOp,
    #[source]
    pub error: WeftError,
    pub rollback: Rollback,
}

/// Apply `patch` to the whole tree.
pub fn apply_patch(tree: &mut Tree, patch: &Patch) -> Result<AppliedPatch, PatchFailure> {
    apply_patch_at(tree, &Path::root(), patch)
}

/// Apply `patch` with every pointer resolved relative to `base`.
pub fn apply_patch_at(
    tree: &mut Tree,
    base: &Path,
    patch: &Patch,
) -> Result<AppliedPatch, PatchFailure> {
    let mut undo: Vec<(usize, PatchOp)> = Vec::new();

    for (index, op) in patch.iter().enumerate() {
        match apply_op(tree, base, op) {
            Ok(Some(inverse)) => undo.push((index, inverse)),
            Ok(None) => {}
            Err(error) => {
                tracing::debug!(
                    op_index = index,
                    op = op.name(),
                    error = %error,
                    "patch op failed, rolling back"
                );
                let rollback = roll_back(tree, base, &undo);
                return Err(PatchFailure {
                    index,
                    op: op.clone(),
                    error,
                    rollback,
                });
            }
        }
    }

    Ok(AppliedPatch::new(
        patch.len(),
        undo.into_iter().map(|(_, inverse)| inverse).collect(),
    ))
}

/// Replay inverses in reverse. A failing step is logged and recorded; the
/// remaining steps are still attempted.
fn roll_back(tree: &mut Tree, base: &Path, undo: &[(usize, PatchOp)]) -> Rollback {
    let mut undone = 0;
    let mut errors = Vec::new();

    for (index, inverse) in undo.iter().rev() {
        match apply_op(tree, base, inverse) {
            Ok(_) => undone += 1,
            Err(error) => {
                tracing::error!(
                    op_index = *index,
                    inverse = inverse.name(),
                    path = %inverse.path(),
                    error = %error,
                    "rollback step failed, state may be inconsistent"
                );
                errors.push(WeftError::rollback_failed(*index, error));
            }
        }
    }

    if errors.is_empty() {
        Rollback::Complete { undone }
    } else {
        Rollback::Failed { undone, errors }
    }
}

/// Where a pointer lands: its parent container and the terminal token.
struct Target<'p> {
    parent: Path,
    kind: NodeKind,
    token: &'p str,
}

impl Target<'_> {
    fn key_path(&self) -> Path {
        self.parent.child(Seg::key(self.token))
    }

    fn index_path(&self, index: usize) -> Path {
        self.parent.child(Seg::Index(index))
    }
}

fn resolve<'p>(tree: &Tree, base: &Path, pointer: &'p Pointer) -> WeftResult<Target<'p>> {
    let Some((parents, token)) = pointer.split_last() else {
        return Err(WeftError::invalid_pointer(
            pointer,
            "the empty pointer cannot be mutated",
        ));
    };
    let mut parent = base.clone();
    for token in parents {
        parent.push(Seg::key(token.as_str()));
    }
    let kind = tree
        .node(&parent)
        .and_then(|id| tree.kind(id))
        .ok_or_else(|| WeftError::path_not_found(pointer))?;
    Ok(Target {
        parent,
        kind,
        token,
    })
}

fn array_len(tree: &Tree, parent: &Path) -> usize {
    tree.node(parent).map(|id| tree.len(id)).unwrap_or(0)
}

/// Apply one op, returning its inverse (none for `test`).
fn apply_op(tree: &mut Tree, base: &Path, op: &PatchOp) -> WeftResult<Option<PatchOp>> {
    match op {
        PatchOp::Test { path, value } => {
            let actual = if path.is_root() {
                tree.get(base)
            } else {
                let target = resolve(tree, base, path)?;
                match target.kind {
                    NodeKind::Object => tree.get(&target.key_path()),
                    NodeKind::Array => parse_array_index(target.token)
                        .and_then(|i| tree.get(&target.index_path(i))),
                }
            };
            let actual = actual.ok_or_else(|| WeftError::path_not_found(path))?;
            if &actual != value {
                return Err(WeftError::test_mismatch(path, value.clone(), actual));
            }
            Ok(None)
        }

        PatchOp::Add { path, value } => {
            let target = resolve(tree, base, path)?;
            match target.kind {
                NodeKind::Object => {
                    let previous = tree.set(&target.key_path(), value.clone())?;
                    Ok(Some(match previous {
                        Some(old) => PatchOp::replace(path.clone(), old),
                        None => PatchOp::remove(path.clone()),
                    }))
                }
                NodeKind::Array => {
                    let len = array_len(tree, &target.parent);
                    if target.token == APPEND_MARKER {
                        tree.set(&target.index_path(len), value.clone())?;
                        return Ok(Some(PatchOp::remove(path.with_last(len.to_string()))));
                    }
                    let index = parse_array_index(target.token)
                        .ok_or_else(|| WeftError::invalid_pointer(path, "expected an array index"))?;
                    if index > len {
                        return Err(WeftError::index_out_of_bounds(path, index, len));
                    }
                    tree.insert(&target.index_path(index), value.clone())?;
                    Ok(Some(PatchOp::remove(path.with_last(index.to_string()))))
                }
            }
        }

        PatchOp::Remove { path } => {
            let target = resolve(tree, base, path)?;
            let location = existing(tree, &target, path)?;
            let removed = tree.remove(&location)?;
            Ok(Some(PatchOp::add(path.clone(), removed)))
        }

        PatchOp::Replace { path, value } => {
            let target = resolve(tree, base, path)?;
            let location = existing(tree, &target, path)?;
            let previous = tree
                .set(&location, value.clone())?
                .unwrap_or(Value::Null);
            Ok(Some(PatchOp::replace(path.clone(), previous)))
        }
    }
}

/// Tree path of a location that must already exist.
fn existing(tree: &Tree, target: &Target<'_>, pointer: &Pointer) -> WeftResult<Path> {
    let location = match target.kind {
        NodeKind::Object => target.key_path(),
        NodeKind::Array => {
            let len = array_len(tree, &target.parent);
            match parse_array_index(target.token) {
                Some(index) if index < len => target.index_path(index),
                Some(index) => return Err(WeftError::index_out_of_bounds(pointer, index, len)),
                None => return Err(WeftError::path_not_found(pointer)),
            }
        }
    };
    if tree.entry(&location).is_none() {
        return Err(WeftError::path_not_found(pointer));
    }
    Ok(location)
}
