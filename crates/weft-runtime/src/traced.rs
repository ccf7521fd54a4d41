//! Read-tracking state accessor.
//!
//! A [`Traced`] points at one position in a [`Store`] for the duration of a
//! single pass. Every read appends the dotted path it touched to a
//! [`ReadLog`]; after a render the log becomes the render's subscriptions.
//! Child containers come back as nested accessors, so only fields that are
//! actually dereferenced get recorded.

use crate::Store;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashSet;
use weft_state::{Entry, Path, PathKey, Seg, WeftError, WeftResult};

/// Ordered, de-duplicated set of paths read during one pass.
#[derive(Debug, Default)]
pub struct ReadLog {
    inner: RefCell<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    order: Vec<PathKey>,
    seen: HashSet<PathKey>,
}

impl ReadLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a path; returns `false` if it was already present.
    pub fn record(&self, key: PathKey) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.seen.contains(&key) {
            return false;
        }
        inner.seen.insert(key.clone());
        inner.order.push(key);
        true
    }

    /// Recorded paths in first-read order.
    pub fn paths(&self) -> Vec<PathKey> {
        self.inner.borrow().order.clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().seen.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().order.is_empty()
    }
}

/// Whether an accessor may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Writes fail with [`WeftError::ReadOnly`]. Used for render passes.
    ReadOnly,
    /// Writes go through the observed tree. Used for init code.
    ReadWrite,
}

/// Result of reading a child.
#[derive(Debug)]
pub enum Read<'a> {
    /// A scalar.
    Value(Value),
    /// A container, as a nested accessor.
    Node(Traced<'a>),
}

impl<'a> Read<'a> {
    /// The value, snapshotting a container.
    pub fn into_value(self) -> Value {
        match self {
            Read::Value(v) => v,
            Read::Node(node) => node.store.get(&node.path).unwrap_or(Value::Null),
        }
    }

    pub fn as_node(&self) -> Option<&Traced<'a>> {
        match self {
            Read::Node(node) => Some(node),
            Read::Value(_) => None,
        }
    }

    pub fn into_node(self) -> Option<Traced<'a>> {
        match self {
            Read::Node(node) => Some(node),
            Read::Value(_) => None,
        }
    }
}

/// Path-tracking accessor over a [`Store`].
#[derive(Debug, Clone)]
pub struct Traced<'a> {
    store: &'a Store,
    path: Path,
    log: &'a ReadLog,
    mode: AccessMode,
}

impl<'a> Traced<'a> {
    /// Accessor over the whole application state.
    pub fn new(store: &'a Store, log: &'a ReadLog, mode: AccessMode) -> Self {
        Self {
            store,
            path: Path::root(),
            log,
            mode,
        }
    }

    /// Position of this accessor, relative to the namespace.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    // The namespace root records the empty key, which adding or removing a
    // top-level key notifies.
    fn track(&self, path: &Path) {
        let key = path.to_key();
        tracing::trace!(path = %key, "state read");
        self.log.record(key);
    }

    fn nested(&self, path: Path) -> Traced<'a> {
        Traced {
            store: self.store,
            path,
            log: self.log,
            mode: self.mode,
        }
    }

    fn read(&self, path: Path) -> Option<Read<'a>> {
        self.track(&path);
        match self.store.entry(&path)? {
            Entry::Scalar(v) => Some(Read::Value(v)),
            Entry::Node(_) => Some(Read::Node(self.nested(path))),
        }
    }

    /// Read a child.
    pub fn get(&self, seg: impl Into<Seg>) -> Option<Read<'a>> {
        self.read(self.path.child(seg))
    }

    /// Read a descendant, recording every intermediate path on the way.
    pub fn at(&self, path: &Path) -> Option<Read<'a>> {
        let mut current = self.path.clone();
        for seg in path {
            current.push(seg.clone());
            self.track(&current);
        }
        match self.store.entry(&current)? {
            Entry::Scalar(v) => Some(Read::Value(v)),
            Entry::Node(_) => Some(Read::Node(self.nested(current))),
        }
    }

    /// Read a child as a plain value.
    pub fn value(&self, seg: impl Into<Seg>) -> Option<Value> {
        self.get(seg).map(Read::into_value)
    }

    /// Number of children; records this container's own path.
    pub fn len(&self) -> usize {
        self.track(&self.path);
        self.store
            .container(&self.path)
            .map_or(0, |(_, keys)| keys.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child keys; records this container's own path.
    pub fn keys(&self) -> Vec<String> {
        self.track(&self.path);
        self.store
            .container(&self.path)
            .map(|(_, keys)| keys)
            .unwrap_or_default()
    }

    /// Every child, recording this container and each child path.
    pub fn items(&self) -> Vec<(String, Read<'a>)> {
        self.keys()
            .into_iter()
            .filter_map(|key| {
                let seg = Seg::key(key.clone());
                self.get(seg).map(|read| (key, read))
            })
            .collect()
    }

    /// Plain-value snapshot of this position; records its own path.
    pub fn snapshot(&self) -> Value {
        self.track(&self.path);
        self.store
            .entry(&self.path)
            .map(|entry| self.store.snapshot_entry(&entry))
            .unwrap_or(Value::Null)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn writable(&self, target: &Path) -> WeftResult<()> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::ReadOnly => {
                tracing::error!(
                    path = %target,
                    "write attempted through a read-only state accessor"
                );
                Err(WeftError::read_only(target))
            }
        }
    }

    /// Write a child; returns the previous value.
    pub fn set(&self, seg: impl Into<Seg>, value: impl Into<Value>) -> WeftResult<Option<Value>> {
        let target = self.path.child(seg);
        self.writable(&target)?;
        self.store.set(&target, value.into())
    }

    /// Insert into this array at `index`, shifting later elements.
    pub fn insert(&self, index: usize, value: impl Into<Value>) -> WeftResult<()> {
        let target = self.path.child(Seg::Index(index));
        self.writable(&target)?;
        self.store.insert(&target, value.into())
    }

    /// Append to this array; returns the new index.
    pub fn push(&self, value: impl Into<Value>) -> WeftResult<usize> {
        self.writable(&self.path)?;
        self.store.push(&self.path, value.into())
    }

    /// Remove a child; returns it.
    pub fn remove(&self, seg: impl Into<Seg>) -> WeftResult<Value> {
        let target = self.path.child(seg);
        self.writable(&target)?;
        self.store.remove(&target)
    }
}
