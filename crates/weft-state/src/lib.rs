//! Observable state tree for the weft runtime.
//!
//! This crate holds the data side of the reactive engine:
//!
//! - [`Tree`]: an arena of container nodes with per-node wrap flags. Writes to
//!   a wrapped node report the fully-qualified path of the change to a hook.
//! - [`Path`] / [`PathKey`]: locations in the tree and their dotted keys.
//! - [`Pointer`], [`PatchOp`], [`Patch`]: the JSON patch wire format.
//! - [`apply_patch`]: transactional application with rollback on failure.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use serde_json::json;
//! use weft_state::{apply_patch, path, Patch, Path, Tree};
//!
//! let mut tree = Tree::from_value(json!({"app": {"users": []}})).unwrap();
//! tree.proxify();
//!
//! let changed = Rc::new(RefCell::new(Vec::new()));
//! let sink = changed.clone();
//! tree.set_hook(Rc::new(move |p: &Path| sink.borrow_mut().push(p.to_key())));
//!
//! let patch = Patch::from_json(r#"[{"op": "add", "path": "/app/users/-", "value": {"id": 1}}]"#).unwrap();
//! let applied = apply_patch(&mut tree, &patch).unwrap();
//!
//! assert_eq!(tree.get(&path!("app", "users")), Some(json!([{"id": 1}])));
//! assert_eq!(applied.inverse()[0].path().to_string(), "/app/users/0");
//! assert_eq!(changed.borrow()[0], "app.users.0");
//! ```

mod apply;
mod error;
mod op;
mod patch;
mod path;
mod pointer;
mod tree;

pub use apply::{apply_patch, apply_patch_at, PatchFailure, Rollback};
pub use error::{value_type_name, WeftError, WeftResult};
pub use op::PatchOp;
pub use patch::{AppliedPatch, Patch};
pub use path::{Path, PathKey, Seg};
pub use pointer::{Pointer, APPEND_MARKER};
pub use tree::{ChangeHook, Entry, NodeId, NodeKind, Tree};
