//! Namespaced observable state.
//!
//! A [`Store`] is a cheap handle to one shared [`Tree`]. The tree root is a
//! plain object holding the application state under the namespace key; the
//! root stays unwrapped so the whole state can be swapped without
//! notifications. Every path taken or returned by the store is relative to
//! the namespace.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use weft_state::{
    apply_patch_at, AppliedPatch, ChangeHook, Entry, NodeKind, Patch, PatchFailure, Path, Tree,
    WeftResult,
};

/// Shared handle to the observable state tree.
#[derive(Clone)]
pub struct Store {
    tree: Rc<RefCell<Tree>>,
    namespace: Path,
}

impl Store {
    /// Build a store holding `state` under `namespace`, fully wrapped.
    pub fn new(namespace: impl Into<String>, state: Value) -> Self {
        let namespace: String = namespace.into();
        let mut root = Map::new();
        root.insert(namespace.clone(), state);
        let mut tree = Tree::from_object(root);
        tree.proxify();
        Self {
            tree: Rc::new(RefCell::new(tree)),
            namespace: Path::root().key(namespace),
        }
    }

    /// Namespace prefix of every change path the tree reports.
    pub fn namespace(&self) -> &Path {
        &self.namespace
    }

    pub(crate) fn set_hook(&self, hook: ChangeHook) {
        self.tree.borrow_mut().set_hook(hook);
    }

    fn absolute(&self, path: &Path) -> Path {
        self.namespace.join(path)
    }

    // ------------------------------------------------------------------
    // Reads (untracked)
    // ------------------------------------------------------------------

    /// Plain-value snapshot at `path`.
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.tree.borrow().get(&self.absolute(path))
    }

    /// Plain-value snapshot of the whole application state.
    pub fn snapshot(&self) -> Value {
        self.get(&Path::root()).unwrap_or(Value::Null)
    }

    pub(crate) fn entry(&self, path: &Path) -> Option<Entry> {
        self.tree.borrow().entry(&self.absolute(path))
    }

    pub(crate) fn snapshot_entry(&self, entry: &Entry) -> Value {
        self.tree.borrow().snapshot(entry)
    }

    /// Kind, child count and keys of the container at `path`.
    pub(crate) fn container(&self, path: &Path) -> Option<(NodeKind, Vec<String>)> {
        let tree = self.tree.borrow();
        let id = tree.node(&self.absolute(path))?;
        Some((tree.kind(id)?, tree.keys(id)))
    }

    /// Whether the container at `path` is wrapped.
    pub fn is_observed(&self, path: &Path) -> bool {
        let tree = self.tree.borrow();
        tree.node(&self.absolute(path))
            .is_some_and(|id| tree.is_wrapped(id))
    }

    // ------------------------------------------------------------------
    // Writes (intercepted)
    // ------------------------------------------------------------------

    /// Write `value` at `path`; returns the previous value.
    pub fn set(&self, path: &Path, value: Value) -> WeftResult<Option<Value>> {
        self.tree.borrow_mut().set(&self.absolute(path), value)
    }

    /// Insert into an array at `path`'s index, shifting later elements.
    pub fn insert(&self, path: &Path, value: Value) -> WeftResult<()> {
        self.tree.borrow_mut().insert(&self.absolute(path), value)
    }

    /// Append to the array at `path`; returns the new index.
    pub fn push(&self, path: &Path, value: Value) -> WeftResult<usize> {
        self.tree.borrow_mut().push(&self.absolute(path), value)
    }

    /// Remove the value at `path`.
    pub fn remove(&self, path: &Path) -> WeftResult<Value> {
        self.tree.borrow_mut().remove(&self.absolute(path))
    }

    /// Apply a patch with pointers relative to the namespace.
    pub fn apply_patch(&self, patch: &Patch) -> Result<AppliedPatch, PatchFailure> {
        let result = apply_patch_at(&mut self.tree.borrow_mut(), &self.namespace, patch);
        if let Err(failure) = &result {
            tracing::warn!(
                op_index = failure.index,
                error = %failure.error,
                rolled_back = failure.rollback.is_complete(),
                "patch rejected"
            );
        }
        result
    }

    /// Swap the whole application state. Never notifies.
    pub fn replace_state(&self, state: Value) -> WeftResult<()> {
        let mut tree = self.tree.borrow_mut();
        tree.set(&self.namespace, state)?;
        let wrapped = tree.proxify();
        tracing::debug!(newly_wrapped = wrapped, "replaced application state");
        Ok(())
    }

    /// Wrap any container that is not observed yet.
    pub fn proxify(&self) -> usize {
        self.tree.borrow_mut().proxify()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.namespace.to_string())
            .field("state", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_state::{path, PatchOp, Pointer};

    fn recorded(store: &Store) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        store.set_hook(Rc::new(move |p: &Path| sink.borrow_mut().push(p.to_string())));
        seen
    }

    #[test]
    fn test_paths_are_relative_to_namespace() {
        let store = Store::new("app", json!({"count": 0}));
        let seen = recorded(&store);
        store.set(&path!("count"), json!(1)).unwrap();
        assert_eq!(store.get(&path!("count")), Some(json!(1)));
        assert_eq!(*seen.borrow(), vec!["app.count"]);
    }

    #[test]
    fn test_replace_state_is_silent_and_observed() {
        let store = Store::new("app", json!({"count": 0}));
        let seen = recorded(&store);
        store.replace_state(json!({"user": {"name": "a"}})).unwrap();
        assert!(seen.borrow().is_empty());
        assert!(store.is_observed(&path!("user")));

        store.set(&path!("user", "name"), json!("b")).unwrap();
        assert_eq!(*seen.borrow(), vec!["app.user.name"]);
    }

    #[test]
    fn test_patch_pointers_are_relative_to_namespace() {
        let store = Store::new("app", json!({"users": []}));
        let patch = Patch::new().with_op(PatchOp::add(Pointer::parse("/users/-").unwrap(), 1));
        store.apply_patch(&patch).unwrap();
        assert_eq!(store.snapshot(), json!({"users": [1]}));
    }
}
