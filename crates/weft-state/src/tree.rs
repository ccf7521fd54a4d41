//! Observable state tree.
//!
//! The tree stores every container (object or array) in an arena slot and
//! refers to it by [`NodeId`], the node's identity. Plain JSON enters the tree
//! only through explicit ingestion, which splits it into [`Entry::Scalar`]
//! leaves and [`Entry::Node`] containers.
//!
//! Each slot carries a *wrapped* flag. Writes go through the tree's methods,
//! and a write whose parent node is wrapped is intercepted: unless it stores
//! the same value again, the fully-qualified path of the written property is
//! reported to the change hook. The root node is never wrapped, so the host
//! can replace the root wholesale without notifications.
//!
//! Every node has exactly one owner. A subtree that is overwritten, removed or
//! replaced is released to a free list and its slots are reused by later
//! allocations, so a released [`NodeId`] may come back naming a new node.

use crate::{value_type_name, Path, Seg, WeftError, WeftResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Callback receiving the fully-qualified path of every intercepted change.
pub type ChangeHook = Rc<dyn Fn(&Path)>;

/// Identity of a container node: its arena slot index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value held by a container: a scalar leaf or a child container.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    /// `null`, boolean, number or string.
    Scalar(Value),
    /// A container node.
    Node(NodeId),
}

impl Entry {
    #[inline]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Entry::Node(id) => Some(*id),
            Entry::Scalar(_) => None,
        }
    }

    /// Same-value check used to suppress notifications: scalars compare by
    /// value, containers by identity. A fresh container value is never equal.
    fn is_same_as(&self, incoming: &Value) -> bool {
        match (self, incoming) {
            (_, Value::Array(_) | Value::Object(_)) => false,
            (Entry::Scalar(old), new) => old == new,
            (Entry::Node(_), _) => false,
        }
    }
}

/// Shape of a container node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Object,
    Array,
}

impl NodeKind {
    fn name(self) -> &'static str {
        match self {
            NodeKind::Object => "object",
            NodeKind::Array => "array",
        }
    }
}

#[derive(Debug)]
enum Children {
    Object(BTreeMap<String, Entry>),
    Array(Vec<Entry>),
}

#[derive(Debug)]
struct Slot {
    children: Children,
    wrapped: bool,
}

/// Arena-backed state tree with mutation interception.
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<NodeId>,
    root: NodeId,
    hook: Option<ChangeHook>,
}

impl Tree {
    /// Create a tree whose root is an empty object.
    pub fn new() -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            hook: None,
        };
        tree.root = tree.alloc(Children::Object(BTreeMap::new()), false);
        tree
    }

    /// Ingest a plain value as the root. The root must be a container.
    ///
    /// Nothing is wrapped yet; call [`Tree::proxify`] to start observing.
    pub fn from_value(value: Value) -> WeftResult<Self> {
        let mut tree = Self::new();
        tree.replace_root(value)?;
        Ok(tree)
    }

    /// Ingest an object as the root. Nothing is wrapped yet.
    pub fn from_object(map: Map<String, Value>) -> Self {
        let mut tree = Self::new();
        let children = map
            .into_iter()
            .map(|(k, v)| (k, tree.ingest(v, false)))
            .collect();
        let root = tree.alloc(Children::Object(children), false);
        let old = std::mem::replace(&mut tree.root, root);
        tree.release(Entry::Node(old));
        tree
    }

    /// Install the change hook.
    pub fn set_hook(&mut self, hook: ChangeHook) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) {
        self.hook = None;
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Size of the arena, live and released slots together.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Released slots waiting for reuse.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    /// Wrap every descendant container of the root that is not wrapped yet.
    ///
    /// Returns the number of newly wrapped nodes; a second call on an
    /// unchanged tree returns 0.
    pub fn proxify(&mut self) -> usize {
        let newly = self.wrap_descendants(self.root);
        tracing::debug!(newly_wrapped = newly, "proxified state tree");
        newly
    }

    /// Wrap `id` and its descendants, returning the same identity.
    ///
    /// Wrapping is idempotent. The root itself is never wrapped; asking for it
    /// wraps its descendants only.
    pub fn wrap(&mut self, id: NodeId) -> NodeId {
        if id != self.root {
            if let Some(slot) = self.slots.get_mut(id.index()) {
                slot.wrapped = true;
            }
        }
        self.wrap_descendants(id);
        id
    }

    /// Whether a node is wrapped.
    pub fn is_wrapped(&self, id: NodeId) -> bool {
        self.slots.get(id.index()).is_some_and(|slot| slot.wrapped)
    }

    /// Number of wrapped nodes reachable from the root.
    pub fn wrapped_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if self.is_wrapped(id) {
                count += 1;
            }
            stack.extend(self.child_nodes(id));
        }
        count
    }

    fn wrap_descendants(&mut self, id: NodeId) -> usize {
        let mut newly = 0;
        let mut stack = self.child_nodes(id);
        while let Some(child) = stack.pop() {
            let slot = &mut self.slots[child.index()];
            if !slot.wrapped {
                slot.wrapped = true;
                newly += 1;
            }
            stack.extend(self.child_nodes(child));
        }
        newly
    }

    fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        match &self.slots[id.index()].children {
            Children::Object(map) => map.values().filter_map(Entry::as_node).collect(),
            Children::Array(items) => items.iter().filter_map(Entry::as_node).collect(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Kind of a node.
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.slots.get(id.index()).map(|slot| match slot.children {
            Children::Object(_) => NodeKind::Object,
            Children::Array(_) => NodeKind::Array,
        })
    }

    /// Number of children of a node.
    pub fn len(&self, id: NodeId) -> usize {
        match self.slots.get(id.index()).map(|slot| &slot.children) {
            Some(Children::Object(map)) => map.len(),
            Some(Children::Array(items)) => items.len(),
            None => 0,
        }
    }

    /// Child keys of a node; array positions are stringified.
    pub fn keys(&self, id: NodeId) -> Vec<String> {
        match self.slots.get(id.index()).map(|slot| &slot.children) {
            Some(Children::Object(map)) => map.keys().cloned().collect(),
            Some(Children::Array(items)) => (0..items.len()).map(|i| i.to_string()).collect(),
            None => Vec::new(),
        }
    }

    /// The child entry of `id` under `seg`.
    pub fn child(&self, id: NodeId, seg: &Seg) -> Option<&Entry> {
        match &self.slots.get(id.index())?.children {
            Children::Object(map) => match seg {
                Seg::Key(k) => map.get(k),
                Seg::Index(i) => map.get(&i.to_string()),
            },
            Children::Array(items) => seg.as_index().and_then(|i| items.get(i)),
        }
    }

    /// The entry at `path`; the empty path is the root node.
    pub fn entry(&self, path: &Path) -> Option<Entry> {
        let mut current = Entry::Node(self.root);
        for seg in path {
            let id = current.as_node()?;
            current = self.child(id, seg)?.clone();
        }
        Some(current)
    }

    /// The container node at `path`, if the location holds one.
    pub fn node(&self, path: &Path) -> Option<NodeId> {
        self.entry(path).and_then(|entry| entry.as_node())
    }

    /// Plain-value snapshot of the location at `path`.
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.entry(path).map(|entry| self.snapshot(&entry))
    }

    /// Plain-value snapshot of an entry.
    pub fn snapshot(&self, entry: &Entry) -> Value {
        match entry {
            Entry::Scalar(v) => v.clone(),
            Entry::Node(id) => self.snapshot_node(*id),
        }
    }

    /// Plain-value snapshot of the whole tree.
    pub fn to_value(&self) -> Value {
        self.snapshot_node(self.root)
    }

    fn snapshot_node(&self, id: NodeId) -> Value {
        match &self.slots[id.index()].children {
            Children::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, entry)| (k.clone(), self.snapshot(entry)))
                    .collect::<Map<String, Value>>(),
            ),
            Children::Array(items) => {
                Value::Array(items.iter().map(|entry| self.snapshot(entry)).collect())
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the root wholesale. Never notifies; the new descendants stay
    /// unwrapped until the next [`Tree::proxify`].
    pub fn replace_root(&mut self, value: Value) -> WeftResult<()> {
        let children = match value {
            Value::Object(map) => Children::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.ingest(v, false)))
                    .collect(),
            ),
            Value::Array(items) => {
                Children::Array(items.into_iter().map(|v| self.ingest(v, false)).collect())
            }
            other => {
                return Err(WeftError::type_mismatch(
                    "<root>",
                    "object or array",
                    value_type_name(&other),
                ))
            }
        };
        let root = self.alloc(children, false);
        let old = std::mem::replace(&mut self.root, root);
        self.release(Entry::Node(old));
        Ok(())
    }

    /// Write `value` at `path`, returning the previous value if there was one.
    ///
    /// On an object this sets the key. On an array the index must be within
    /// bounds, or equal to the length to append.
    pub fn set(&mut self, path: &Path, value: Value) -> WeftResult<Option<Value>> {
        let (parent, seg, parent_path) = self.locate_parent(path)?;
        let wrapped = self.is_wrapped(parent);
        let mut changes = Vec::new();

        let previous = match self.kind(parent) {
            Some(NodeKind::Object) => {
                let key = seg.to_string();
                let old = self.object(parent).get(&key).cloned();
                if wrapped && !old.as_ref().is_some_and(|e| e.is_same_as(&value)) {
                    changes.push(parent_path.child(key.clone()));
                    if old.is_none() {
                        changes.push(parent_path.clone());
                    }
                }
                let entry = self.ingest(value, wrapped);
                self.object_mut(parent).insert(key, entry);
                old
            }
            _ => {
                let index = self.array_index(parent, &seg, path)?;
                let len = self.array(parent).len();
                let entry_path = parent_path.child(Seg::Index(index));
                if index < len {
                    let old = self.array(parent)[index].clone();
                    if wrapped && !old.is_same_as(&value) {
                        changes.push(entry_path);
                    }
                    let entry = self.ingest(value, wrapped);
                    self.array_mut(parent)[index] = entry;
                    Some(old)
                } else if index == len {
                    if wrapped {
                        changes.push(entry_path);
                        changes.push(parent_path.clone());
                    }
                    let entry = self.ingest(value, wrapped);
                    self.array_mut(parent).push(entry);
                    None
                } else {
                    return Err(WeftError::index_out_of_bounds(path, index, len));
                }
            }
        };

        let previous = previous.map(|entry| {
            let value = self.snapshot(&entry);
            self.release(entry);
            value
        });
        self.emit(changes);
        Ok(previous)
    }

    /// Insert into the array holding `path`'s last segment, shifting later
    /// elements right. The index may equal the length.
    pub fn insert(&mut self, path: &Path, value: Value) -> WeftResult<()> {
        let (parent, seg, parent_path) = self.locate_parent(path)?;
        self.expect_kind(parent, NodeKind::Array, &parent_path)?;
        let index = self.array_index(parent, &seg, path)?;
        let len = self.array(parent).len();
        if index > len {
            return Err(WeftError::index_out_of_bounds(path, index, len));
        }
        let wrapped = self.is_wrapped(parent);
        let entry = self.ingest(value, wrapped);
        self.array_mut(parent).insert(index, entry);

        if wrapped {
            let mut changes: Vec<Path> = (index..=len)
                .map(|i| parent_path.child(Seg::Index(i)))
                .collect();
            changes.push(parent_path);
            self.emit(changes);
        }
        Ok(())
    }

    /// Append to the array at `path`, returning the new element's index.
    pub fn push(&mut self, path: &Path, value: Value) -> WeftResult<usize> {
        let id = self
            .node(path)
            .ok_or_else(|| WeftError::path_not_found(path))?;
        self.expect_kind(id, NodeKind::Array, path)?;
        let wrapped = self.is_wrapped(id);
        let entry = self.ingest(value, wrapped);
        let items = self.array_mut(id);
        items.push(entry);
        let index = items.len() - 1;
        if wrapped {
            self.emit(vec![path.child(Seg::Index(index)), path.clone()]);
        }
        Ok(index)
    }

    /// Remove the value at `path`, returning it. The location must exist.
    pub fn remove(&mut self, path: &Path) -> WeftResult<Value> {
        let (parent, seg, parent_path) = self.locate_parent(path)?;
        let wrapped = self.is_wrapped(parent);
        let mut changes = Vec::new();

        let removed = match self.kind(parent) {
            Some(NodeKind::Object) => {
                let key = seg.to_string();
                let removed = self
                    .object_mut(parent)
                    .remove(&key)
                    .ok_or_else(|| WeftError::path_not_found(path))?;
                if wrapped {
                    changes.push(parent_path.child(key));
                    changes.push(parent_path);
                }
                removed
            }
            _ => {
                let index = self.array_index(parent, &seg, path)?;
                let len = self.array(parent).len();
                if index >= len {
                    return Err(WeftError::index_out_of_bounds(path, index, len));
                }
                let removed = self.array_mut(parent).remove(index);
                if wrapped {
                    changes.extend((index..len).map(|i| parent_path.child(Seg::Index(i))));
                    changes.push(parent_path);
                }
                removed
            }
        };

        let value = self.snapshot(&removed);
        self.release(removed);
        self.emit(changes);
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn alloc(&mut self, children: Children, wrapped: bool) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.slots[id.index()] = Slot { children, wrapped };
            return id;
        }
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { children, wrapped });
        id
    }

    /// Return a detached entry's subtree slots to the free list.
    fn release(&mut self, entry: Entry) {
        let Entry::Node(id) = entry else { return };
        let mut stack = vec![id];
        let mut released = 0usize;
        while let Some(id) = stack.pop() {
            let slot = &mut self.slots[id.index()];
            let children = std::mem::replace(&mut slot.children, Children::Array(Vec::new()));
            slot.wrapped = false;
            match children {
                Children::Object(map) => stack.extend(map.into_values().filter_map(|e| e.as_node())),
                Children::Array(items) => stack.extend(items.into_iter().filter_map(|e| e.as_node())),
            }
            self.free.push(id);
            released += 1;
        }
        tracing::trace!(released, "released detached nodes");
    }

    /// Convert a plain value into an entry, allocating nodes for containers.
    fn ingest(&mut self, value: Value, wrapped: bool) -> Entry {
        match value {
            Value::Object(map) => {
                let children = map
                    .into_iter()
                    .map(|(k, v)| (k, self.ingest(v, wrapped)))
                    .collect();
                Entry::Node(self.alloc(Children::Object(children), wrapped))
            }
            Value::Array(items) => {
                let children = items.into_iter().map(|v| self.ingest(v, wrapped)).collect();
                Entry::Node(self.alloc(Children::Array(children), wrapped))
            }
            scalar => Entry::Scalar(scalar),
        }
    }

    fn emit(&self, changes: Vec<Path>) {
        if changes.is_empty() {
            return;
        }
        if let Some(hook) = self.hook.clone() {
            for path in &changes {
                tracing::trace!(path = %path, "state change intercepted");
                hook(path);
            }
        }
    }

    /// Resolve the parent container of `path` and its terminal segment.
    fn locate_parent(&self, path: &Path) -> WeftResult<(NodeId, Seg, Path)> {
        let parent_path = path
            .parent()
            .ok_or_else(|| WeftError::invalid_pointer(path, "the root cannot be written in place"))?;
        let seg = path
            .last()
            .cloned()
            .ok_or_else(|| WeftError::path_not_found(path))?;
        let parent = self
            .node(&parent_path)
            .ok_or_else(|| WeftError::path_not_found(path))?;
        Ok((parent, seg, parent_path))
    }

    fn array_index(&self, id: NodeId, seg: &Seg, path: &Path) -> WeftResult<usize> {
        self.expect_kind(id, NodeKind::Array, path)?;
        seg.as_index()
            .ok_or_else(|| WeftError::type_mismatch(path, "array index", "key"))
    }

    fn expect_kind(&self, id: NodeId, expected: NodeKind, path: &Path) -> WeftResult<()> {
        match self.kind(id) {
            Some(kind) if kind == expected => Ok(()),
            Some(kind) => Err(WeftError::type_mismatch(path, expected.name(), kind.name())),
            None => Err(WeftError::path_not_found(path)),
        }
    }

    // Callers check the kind first; a mismatch here is an arena bug.
    fn object(&self, id: NodeId) -> &BTreeMap<String, Entry> {
        match &self.slots[id.index()].children {
            Children::Object(map) => map,
            Children::Array(_) => unreachable!("node {id} is not an object"),
        }
    }

    fn object_mut(&mut self, id: NodeId) -> &mut BTreeMap<String, Entry> {
        match &mut self.slots[id.index()].children {
            Children::Object(map) => map,
            Children::Array(_) => unreachable!("node {id} is not an object"),
        }
    }

    fn array(&self, id: NodeId) -> &Vec<Entry> {
        match &self.slots[id.index()].children {
            Children::Array(items) => items,
            Children::Object(_) => unreachable!("node {id} is not an array"),
        }
    }

    fn array_mut(&mut self, id: NodeId) -> &mut Vec<Entry> {
        match &mut self.slots[id.index()].children {
            Children::Array(items) => items,
            Children::Object(_) => unreachable!("node {id} is not an array"),
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("slots", &self.slots.len())
            .field("value", &self.to_value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;
    use std::cell::RefCell;

    fn observed(value: Value) -> (Tree, Rc<RefCell<Vec<String>>>) {
        let mut tree = Tree::from_value(value).unwrap();
        tree.proxify();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        tree.set_hook(Rc::new(move |p: &Path| sink.borrow_mut().push(p.to_string())));
        (tree, seen)
    }

    #[test]
    fn test_proxify_skips_root_and_wraps_descendants() {
        let mut tree = Tree::from_value(json!({"a": {"b": [1, {"c": 2}]}, "n": 1})).unwrap();
        assert_eq!(tree.wrapped_count(), 0);
        assert_eq!(tree.proxify(), 3);
        assert!(!tree.is_wrapped(tree.root()));
        assert!(tree.is_wrapped(tree.node(&path!("a")).unwrap()));
        assert!(tree.is_wrapped(tree.node(&path!("a", "b", 1usize)).unwrap()));
    }

    #[test]
    fn test_proxify_is_idempotent() {
        let mut tree = Tree::from_value(json!({"a": {"b": {}}})).unwrap();
        assert_eq!(tree.proxify(), 2);
        let before = tree.node(&path!("a")).unwrap();
        assert_eq!(tree.proxify(), 0);
        assert_eq!(tree.wrap(before), before);
        assert_eq!(tree.node(&path!("a")).unwrap(), before);
        assert_eq!(tree.wrapped_count(), 2);
    }

    #[test]
    fn test_write_notifies_full_path() {
        let (mut tree, seen) = observed(json!({"app": {"count": 0}}));
        tree.set(&path!("app", "count"), json!(1)).unwrap();
        assert_eq!(*seen.borrow(), vec!["app.count"]);
    }

    #[test]
    fn test_same_value_write_is_silent() {
        let (mut tree, seen) = observed(json!({"app": {"count": 1, "name": "x"}}));
        tree.set(&path!("app", "count"), json!(1)).unwrap();
        tree.set(&path!("app", "name"), json!("x")).unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(tree.get(&path!("app", "count")), Some(json!(1)));
    }

    #[test]
    fn test_container_write_always_notifies() {
        let (mut tree, seen) = observed(json!({"app": {"user": {"name": "a"}}}));
        tree.set(&path!("app", "user"), json!({"name": "a"})).unwrap();
        assert_eq!(*seen.borrow(), vec!["app.user"]);
    }

    #[test]
    fn test_root_writes_never_notify() {
        let (mut tree, seen) = observed(json!({"app": {}}));
        tree.set(&path!("other"), json!(1)).unwrap();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_new_container_under_wrapped_parent_is_wrapped() {
        let (mut tree, _) = observed(json!({"app": {}}));
        tree.set(&path!("app", "user"), json!({"profile": {"name": "a"}})).unwrap();
        let profile = tree.node(&path!("app", "user", "profile")).unwrap();
        assert!(tree.is_wrapped(profile));
    }

    #[test]
    fn test_new_container_under_root_waits_for_proxify() {
        let (mut tree, _) = observed(json!({"app": {}}));
        tree.set(&path!("extra"), json!({"x": {}})).unwrap();
        let extra = tree.node(&path!("extra")).unwrap();
        assert!(!tree.is_wrapped(extra));
        assert_eq!(tree.proxify(), 2);
        assert!(tree.is_wrapped(extra));
    }

    #[test]
    fn test_new_key_reports_container_too() {
        let (mut tree, seen) = observed(json!({"app": {"user": {}}}));
        tree.set(&path!("app", "user", "name"), json!("a")).unwrap();
        assert_eq!(*seen.borrow(), vec!["app.user.name", "app.user"]);
    }

    #[test]
    fn test_insert_reports_shifted_indices() {
        let (mut tree, seen) = observed(json!({"app": {"xs": [1, 2]}}));
        tree.insert(&path!("app", "xs", 0usize), json!(0)).unwrap();
        assert_eq!(tree.get(&path!("app", "xs")), Some(json!([0, 1, 2])));
        assert_eq!(
            *seen.borrow(),
            vec!["app.xs.0", "app.xs.1", "app.xs.2", "app.xs"]
        );
    }

    #[test]
    fn test_push_and_remove() {
        let (mut tree, seen) = observed(json!({"app": {"xs": []}}));
        let index = tree.push(&path!("app", "xs"), json!({"id": 1})).unwrap();
        assert_eq!(index, 0);
        assert_eq!(*seen.borrow(), vec!["app.xs.0", "app.xs"]);

        seen.borrow_mut().clear();
        let removed = tree.remove(&path!("app", "xs", 0usize)).unwrap();
        assert_eq!(removed, json!({"id": 1}));
        assert_eq!(*seen.borrow(), vec!["app.xs.0", "app.xs"]);
    }

    #[test]
    fn test_numeric_key_segments_address_arrays() {
        let (mut tree, _) = observed(json!({"app": {"xs": [1, 2]}}));
        tree.set(&Path::parse_dotted("app.xs.1"), json!(5)).unwrap();
        assert_eq!(tree.get(&path!("app", "xs")), Some(json!([1, 5])));
    }

    #[test]
    fn test_write_errors() {
        let (mut tree, _) = observed(json!({"app": {"xs": [1], "n": 1}}));
        assert!(matches!(
            tree.set(&path!("app", "missing", "x"), json!(1)),
            Err(WeftError::PathNotFound { .. })
        ));
        assert!(matches!(
            tree.set(&path!("app", "xs", 5usize), json!(1)),
            Err(WeftError::IndexOutOfBounds { index: 5, len: 1, .. })
        ));
        assert!(matches!(
            tree.push(&path!("app", "n"), json!(1)),
            Err(WeftError::PathNotFound { .. })
        ));
        assert!(matches!(
            tree.remove(&path!("app", "nope")),
            Err(WeftError::PathNotFound { .. })
        ));
        assert!(matches!(
            tree.set(&Path::root(), json!({})),
            Err(WeftError::InvalidPointer { .. })
        ));
    }

    #[test]
    fn test_repeated_container_writes_reuse_slots() {
        let (mut tree, _) = observed(json!({"app": {"todos": []}}));
        let todos = path!("app", "todos");
        for i in 0..2 {
            tree.set(&todos, json!([{"id": i}])).unwrap();
        }
        let settled = tree.slot_count();
        for i in 0..1_000 {
            tree.set(&todos, json!([{"id": i}])).unwrap();
        }
        assert_eq!(tree.slot_count(), settled);
        assert_eq!(tree.get(&todos), Some(json!([{"id": 999}])));
        assert!(tree.is_wrapped(tree.node(&path!("app", "todos", 0usize)).unwrap()));
    }

    #[test]
    fn test_removed_subtree_is_released() {
        let (mut tree, _) = observed(json!({"app": {"user": {"tags": ["a"]}}}));
        let before = tree.free_count();
        tree.remove(&path!("app", "user")).unwrap();
        assert_eq!(tree.free_count(), before + 2);

        let slots = tree.slot_count();
        tree.set(&path!("app", "other"), json!({"xs": []})).unwrap();
        assert_eq!(tree.slot_count(), slots);
        assert_eq!(tree.free_count(), before);
        assert_eq!(tree.get(&path!("app", "other")), Some(json!({"xs": []})));
    }

    #[test]
    fn test_replace_root_releases_previous_root() {
        let mut tree = Tree::from_value(json!({"a": {"b": {}}})).unwrap();
        tree.replace_root(json!({"c": {"d": {}}})).unwrap();
        assert_eq!(tree.free_count(), 3);
        let slots = tree.slot_count();
        tree.replace_root(json!({"e": {"f": {}}})).unwrap();
        assert_eq!(tree.slot_count(), slots);
        assert_eq!(tree.to_value(), json!({"e": {"f": {}}}));
    }

    #[test]
    fn test_replace_root_requires_container() {
        let mut tree = Tree::new();
        assert!(matches!(
            tree.replace_root(json!(3)),
            Err(WeftError::TypeMismatch { .. })
        ));
        tree.replace_root(json!({"a": 1})).unwrap();
        assert_eq!(tree.to_value(), json!({"a": 1}));
    }
}
