//! Component instances and their render lifecycle.
//!
//! Each mounted instance runs its init callback once. A successful init makes
//! the instance [`Phase::Active`]; every later trigger runs its render
//! callback inside an error boundary with a fresh read-only accessor and a
//! fresh [`ReadLog`]. The paths the render (and the binder) read become the
//! instance's subscriptions. A failed init leaves the instance
//! [`Phase::Static`] for good.

use crate::boundary::{element_hook, guard, ErrorContext, FailedStage};
use crate::component::{
    Binder, ComponentRegistry, Element, InitFn, InitScope, InstanceId, Phase, RenderFn,
    RenderScope,
};
use crate::dispatch::{DispatchStats, Dispatcher, FlushReport};
use crate::scheduler::{FrameScheduler, Scheduler};
use crate::{AccessMode, ReadLog, RuntimeConfig, RuntimeError, RuntimeResult, Store, Traced};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use weft_state::{Path, PathKey};

struct Instance {
    component: String,
    element: Rc<dyn Element>,
    detail: Rc<Value>,
    phase: Phase,
    // Taken out while the render runs.
    render: Option<RenderFn>,
}

/// Summary of one mounted instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub component: String,
    pub phase: Phase,
    pub errored: bool,
    pub subscriptions: Vec<PathKey>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    store: Store,
    dispatcher: Dispatcher,
    components: RefCell<ComponentRegistry>,
    instances: RefCell<BTreeMap<InstanceId, Instance>>,
    next_instance: Cell<u64>,
    errors: RefCell<BTreeMap<InstanceId, ErrorContext>>,
    binder: RefCell<Option<Rc<dyn Binder>>>,
    debug_attached: Cell<bool>,
}

/// The reactive runtime: state, dispatch and mounted components.
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning runtime handle, for callbacks that outlive a borrow.
#[derive(Clone)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Build a runtime over `state`, scheduling flushes on `scheduler`.
    pub fn new(config: RuntimeConfig, state: Value, scheduler: Rc<dyn Scheduler>) -> Self {
        let store = Store::new(config.namespace.clone(), state);
        let inner = Rc::new_cyclic(|weak: &Weak<RuntimeInner>| {
            let flush_weak = weak.clone();
            let flush_task: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(inner) = flush_weak.upgrade() {
                    Runtime { inner }.flush();
                }
            });
            RuntimeInner {
                dispatcher: Dispatcher::new(store.namespace().clone(), scheduler, flush_task),
                store: store.clone(),
                config,
                components: RefCell::new(ComponentRegistry::new()),
                instances: RefCell::new(BTreeMap::new()),
                next_instance: Cell::new(1),
                errors: RefCell::new(BTreeMap::new()),
                binder: RefCell::new(None),
                debug_attached: Cell::new(false),
            }
        });

        let hook_weak = Rc::downgrade(&inner);
        store.set_hook(Rc::new(move |path: &Path| {
            if let Some(inner) = hook_weak.upgrade() {
                inner.dispatcher.notify(path);
            }
        }));

        Self { inner }
    }

    /// Build a runtime driven by a [`FrameScheduler`] the caller runs.
    pub fn with_frame_scheduler(config: RuntimeConfig, state: Value) -> (Self, Rc<FrameScheduler>) {
        let scheduler = Rc::new(FrameScheduler::new());
        (Self::new(config, state, scheduler.clone()), scheduler)
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a component factory under `name`.
    pub fn register_component<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Store, &Value) -> InitFn + 'static,
    {
        self.inner.components.borrow_mut().register(name, factory);
    }

    /// Install the binding engine run after every successful render.
    pub fn set_binder(&self, binder: Rc<dyn Binder>) {
        *self.inner.binder.borrow_mut() = Some(binder);
    }

    // ------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------

    /// Mount a registered component.
    pub fn mount(
        &self,
        component: &str,
        element: Rc<dyn Element>,
        detail: Value,
    ) -> RuntimeResult<InstanceId> {
        let factory = self
            .inner
            .components
            .borrow()
            .get(component)
            .ok_or_else(|| RuntimeError::UnknownComponent(component.to_string()))?;
        let init = factory(&self.inner.store, &detail);
        Ok(self.mount_with(component, element, detail, init))
    }

    /// Mount an instance with an explicit init callback.
    ///
    /// A failed init is recorded as an [`ErrorContext`]; the instance still
    /// gets an id, in [`Phase::Static`].
    pub fn mount_with(
        &self,
        component: impl Into<String>,
        element: Rc<dyn Element>,
        detail: Value,
        init: InitFn,
    ) -> InstanceId {
        let component = component.into();
        let id = InstanceId(self.inner.next_instance.get());
        self.inner.next_instance.set(id.0 + 1);
        let detail = Rc::new(detail);
        self.inner.instances.borrow_mut().insert(
            id,
            Instance {
                component: component.clone(),
                element: element.clone(),
                detail: detail.clone(),
                phase: Phase::Uninitialized,
                render: None,
            },
        );
        tracing::debug!(instance = %id, component = %component, "mounting component");

        let log = ReadLog::new();
        let outcome = {
            let scope = InitScope {
                state: Traced::new(&self.inner.store, &log, AccessMode::ReadWrite),
                detail: &detail,
                element: element.as_ref(),
                instance: id,
                runtime: self,
            };
            guard(|| init(&scope))
        };

        match outcome {
            Ok(render) => {
                if let Some(instance) = self.inner.instances.borrow_mut().get_mut(&id) {
                    instance.phase = Phase::Active;
                    instance.render = Some(render);
                }
                if self.inner.config.render_on_mount {
                    // Failures are captured as error contexts.
                    let _ = self.render_instance(id);
                }
            }
            Err(message) => {
                if let Some(instance) = self.inner.instances.borrow_mut().get_mut(&id) {
                    instance.phase = Phase::Static;
                }
                tracing::error!(
                    instance = %id,
                    component = %component,
                    error = %message,
                    "component init failed, instance left static"
                );
                element_hook(id, || element.mark_errored(&message));
                let error = RuntimeError::InitFailure {
                    component: component.clone(),
                    message,
                };
                self.record_error(id, component, FailedStage::Init, error, element);
            }
        }
        id
    }

    /// Run `f`, then drop the notifications it queued if configured to.
    pub fn setup<R>(&self, f: impl FnOnce(&Runtime) -> R) -> R {
        let out = f(self);
        if self.inner.config.suppress_setup_notifications {
            self.inner.dispatcher.discard_pending();
        }
        out
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Run the pending batch now.
    pub fn flush(&self) -> FlushReport {
        self.inner.dispatcher.flush(&mut |id| {
            // Failures are captured as error contexts.
            let _ = self.render_instance(id);
        })
    }

    /// Render an instance outside of a flush.
    pub fn rerender(&self, id: InstanceId) -> RuntimeResult<()> {
        self.render_instance(id)
    }

    fn render_instance(&self, id: InstanceId) -> RuntimeResult<()> {
        let (mut render, element, detail, component) = {
            let mut instances = self.inner.instances.borrow_mut();
            let instance = instances
                .get_mut(&id)
                .ok_or(RuntimeError::UnknownInstance(id))?;
            match instance.phase {
                Phase::Active => {}
                Phase::Static => {
                    tracing::warn!(
                        instance = %id,
                        component = %instance.component,
                        "static instance is never rendered"
                    );
                    return Ok(());
                }
                Phase::Uninitialized => return Ok(()),
            }
            let Some(render) = instance.render.take() else {
                tracing::warn!(
                    instance = %id,
                    component = %instance.component,
                    "render already running for this instance, skipped"
                );
                return Ok(());
            };
            (
                render,
                instance.element.clone(),
                instance.detail.clone(),
                instance.component.clone(),
            )
        };

        let log = ReadLog::new();
        let binder = self.inner.binder.borrow().clone();
        let outcome = {
            let scope = RenderScope {
                state: Traced::new(&self.inner.store, &log, AccessMode::ReadOnly),
                detail: &detail,
                element: element.as_ref(),
                instance: id,
            };
            guard(|| {
                render(&scope)?;
                if let Some(binder) = &binder {
                    binder.bind(element.as_ref(), &scope)?;
                }
                Ok(())
            })
        };

        if let Some(instance) = self.inner.instances.borrow_mut().get_mut(&id) {
            instance.render = Some(render);
        }

        match outcome {
            Ok(()) => {
                for key in log.paths() {
                    self.inner.dispatcher.register(key, id);
                }
                if self.inner.errors.borrow_mut().remove(&id).is_some() {
                    tracing::debug!(instance = %id, component = %component, "component recovered");
                }
                element_hook(id, || element.clear_errored());
                Ok(())
            }
            Err(message) => {
                tracing::warn!(
                    instance = %id,
                    component = %component,
                    error = %message,
                    "render failed"
                );
                element_hook(id, || element.mark_errored(&message));
                let error = RuntimeError::RenderFailure {
                    component: component.clone(),
                    instance: id,
                    message,
                };
                self.record_error(id, component, FailedStage::Render, error.clone(), element);
                Err(error)
            }
        }
    }

    fn record_error(
        &self,
        id: InstanceId,
        component: String,
        stage: FailedStage,
        error: RuntimeError,
        element: Rc<dyn Element>,
    ) {
        let weak = self.downgrade();
        let retry = Rc::new(move || match weak.upgrade() {
            Some(runtime) => runtime.rerender(id),
            None => Err(RuntimeError::UnknownInstance(id)),
        });
        let context = ErrorContext::new(
            id,
            component,
            stage,
            error,
            self.inner.store.clone(),
            element,
            retry,
        );
        self.inner.errors.borrow_mut().insert(id, context);
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// The captured failure of an instance, if any.
    pub fn error(&self, id: InstanceId) -> Option<ErrorContext> {
        self.inner.errors.borrow().get(&id).cloned()
    }

    /// Every captured failure, by instance id.
    pub fn errors(&self) -> Vec<ErrorContext> {
        self.inner.errors.borrow().values().cloned().collect()
    }

    /// Drop an instance's captured failure and its element mark.
    pub fn clear_error(&self, id: InstanceId) -> bool {
        let removed = self.inner.errors.borrow_mut().remove(&id);
        match removed {
            Some(context) => {
                element_hook(id, || context.element.clear_errored());
                tracing::debug!(instance = %id, "error cleared");
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn phase(&self, id: InstanceId) -> Option<Phase> {
        self.inner.instances.borrow().get(&id).map(|i| i.phase)
    }

    pub fn instances(&self) -> Vec<InstanceInfo> {
        let errors = self.inner.errors.borrow();
        self.inner
            .instances
            .borrow()
            .iter()
            .map(|(id, instance)| InstanceInfo {
                id: *id,
                component: instance.component.clone(),
                phase: instance.phase,
                errored: errors.contains_key(id),
                subscriptions: self.inner.dispatcher.paths_of(*id),
            })
            .collect()
    }

    /// Keys an instance is subscribed to.
    pub fn subscriptions_of(&self, id: InstanceId) -> Vec<PathKey> {
        self.inner.dispatcher.paths_of(id)
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.dispatcher.stats()
    }

    pub fn last_flush(&self) -> Option<FlushReport> {
        self.inner.dispatcher.last_flush()
    }

    pub(crate) fn try_attach_debug(&self) -> bool {
        !self.inner.debug_attached.replace(true)
    }

    pub(crate) fn detach_debug(&self) {
        self.inner.debug_attached.set(false);
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("instances", &self.inner.instances.borrow().len())
            .field("errors", &self.inner.errors.borrow().len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{init_fn, render_fn, NullElement};
    use serde_json::json;
    use weft_state::path;

    fn element() -> Rc<dyn Element> {
        Rc::new(NullElement)
    }

    fn counting(runs: Rc<Cell<usize>>, key: &'static str) -> InitFn {
        init_fn(move |_| {
            Ok(render_fn(move |scope| {
                runs.set(runs.get() + 1);
                scope.state.value(key);
                Ok(())
            }))
        })
    }

    #[test]
    fn test_mount_renders_and_subscribes() {
        let (runtime, _) = Runtime::with_frame_scheduler(RuntimeConfig::default(), json!({"count": 0}));
        let runs = Rc::new(Cell::new(0));
        let id = runtime.mount_with("counter", element(), Value::Null, counting(runs.clone(), "count"));

        assert_eq!(runs.get(), 1);
        assert_eq!(runtime.phase(id), Some(Phase::Active));
        assert_eq!(runtime.subscriptions_of(id), vec![PathKey::new("count")]);
    }

    #[test]
    fn test_render_on_mount_can_be_disabled() {
        let config = RuntimeConfig::default().with_render_on_mount(false);
        let (runtime, _) = Runtime::with_frame_scheduler(config, json!({"count": 0}));
        let runs = Rc::new(Cell::new(0));
        let id = runtime.mount_with("counter", element(), Value::Null, counting(runs.clone(), "count"));
        assert_eq!(runs.get(), 0);
        assert!(runtime.subscriptions_of(id).is_empty());

        runtime.rerender(id).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_unknown_component_and_instance() {
        let (runtime, _) = Runtime::with_frame_scheduler(RuntimeConfig::default(), json!({}));
        assert_eq!(
            runtime.mount("nope", element(), Value::Null).unwrap_err(),
            RuntimeError::UnknownComponent("nope".into())
        );
        assert_eq!(
            runtime.rerender(InstanceId(42)).unwrap_err(),
            RuntimeError::UnknownInstance(InstanceId(42))
        );
    }

    #[test]
    fn test_reentrant_render_is_skipped() {
        let (runtime, _) = Runtime::with_frame_scheduler(RuntimeConfig::default(), json!({}));
        let nested: Rc<RefCell<Option<RuntimeResult<()>>>> = Rc::new(RefCell::new(None));
        let slot = nested.clone();
        let weak = runtime.downgrade();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        runtime.mount_with(
            "loop",
            element(),
            Value::Null,
            init_fn(move |_| {
                Ok(render_fn(move |scope| {
                    counter.set(counter.get() + 1);
                    if let Some(runtime) = weak.upgrade() {
                        *slot.borrow_mut() = Some(runtime.rerender(scope.instance));
                    }
                    Ok(())
                }))
            }),
        );
        assert_eq!(runs.get(), 1);
        assert_eq!(*nested.borrow(), Some(Ok(())));
    }

    #[test]
    fn test_init_writes_go_through() {
        let (runtime, scheduler) =
            Runtime::with_frame_scheduler(RuntimeConfig::default(), json!({"seeded": false}));
        runtime.mount_with(
            "seeder",
            element(),
            Value::Null,
            init_fn(|scope| {
                scope.state.set("seeded", true)?;
                Ok(render_fn(|_| Ok(())))
            }),
        );
        assert_eq!(runtime.store().get(&path!("seeded")), Some(json!(true)));
        assert_eq!(scheduler.pending(), 1);
    }
}
