//! Component collaborators: factories, scopes, elements and binders.

use crate::{Runtime, Store, Traced};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Error type returned by user callbacks.
pub type BoxError = Box<dyn std::error::Error>;

/// Render callback, run on every trigger while the instance is active.
pub type RenderFn = Box<dyn FnMut(&RenderScope<'_>) -> Result<(), BoxError>>;

/// Init callback, run once at mount; produces the render callback.
pub type InitFn = Box<dyn FnOnce(&InitScope<'_>) -> Result<RenderFn, BoxError>>;

/// Component factory: builds the init callback for one instance.
pub type Factory = Rc<dyn Fn(&Store, &Value) -> InitFn>;

/// Box a render closure.
pub fn render_fn<F>(f: F) -> RenderFn
where
    F: FnMut(&RenderScope<'_>) -> Result<(), BoxError> + 'static,
{
    Box::new(f)
}

/// Box an init closure.
pub fn init_fn<F>(f: F) -> InitFn
where
    F: FnOnce(&InitScope<'_>) -> Result<RenderFn, BoxError> + 'static,
{
    Box::new(f)
}

/// Identity of a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct InstanceId(pub(crate) u64);

impl InstanceId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Mounted, init not finished.
    Uninitialized,
    /// Init succeeded; renders on every trigger.
    Active,
    /// Init failed; never renders.
    Static,
}

/// The UI element a component instance renders into.
pub trait Element {
    /// Flag the element as showing a failed render.
    fn mark_errored(&self, _message: &str) {}

    /// Remove the failure flag.
    fn clear_errored(&self) {}
}

/// Element that ignores error marks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullElement;

impl Element for NullElement {}

/// Binding engine invoked after each successful render.
///
/// Reads it makes through `scope.state` are tracked like the render's own.
pub trait Binder {
    fn bind(&self, element: &dyn Element, scope: &RenderScope<'_>) -> Result<(), BoxError>;
}

/// What an init callback sees.
pub struct InitScope<'a> {
    /// Read/write accessor over the application state.
    pub state: Traced<'a>,
    pub detail: &'a Value,
    pub element: &'a dyn Element,
    pub instance: InstanceId,
    pub runtime: &'a Runtime,
}

/// What a render callback sees.
pub struct RenderScope<'a> {
    /// Read-only accessor; every read becomes a subscription.
    pub state: Traced<'a>,
    pub detail: &'a Value,
    pub element: &'a dyn Element,
    pub instance: InstanceId,
}

/// Component factories keyed by type name.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Store, &Value) -> InitFn + 'static,
    {
        self.factories.insert(name.into(), Rc::new(factory));
    }

    pub fn get(&self, name: &str) -> Option<Factory> {
        self.factories.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut registry = ComponentRegistry::new();
        registry.register("counter", |_store, _detail| {
            init_fn(|_scope| Ok(render_fn(|_scope| Ok(()))))
        });
        assert!(registry.contains("counter"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["counter"]);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Phase::Static).unwrap(), "static");
        assert_eq!(serde_json::to_value(InstanceId(7)).unwrap(), 7);
    }
}
