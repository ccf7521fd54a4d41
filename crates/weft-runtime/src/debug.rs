//! Developer introspection.
//!
//! A [`DebugRegistry`] is attached to one runtime explicitly and detaches when
//! dropped. It reads snapshots of instances, subscriptions and captured
//! failures, and can only change things through [`DebugRegistry::rerender`],
//! [`DebugRegistry::retry`] and [`DebugRegistry::clear_error`].

use crate::boundary::{ErrorContext, FailedStage};
use crate::dispatch::{DispatchStats, FlushReport};
use crate::lifecycle::InstanceInfo;
use crate::{InstanceId, Runtime, RuntimeError, RuntimeResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use weft_state::PathKey;

/// A captured failure, as plain data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSnapshot {
    pub instance: InstanceId,
    pub component: String,
    pub stage: FailedStage,
    pub message: String,
}

impl From<&ErrorContext> for ErrorSnapshot {
    fn from(context: &ErrorContext) -> Self {
        Self {
            instance: context.instance,
            component: context.component.clone(),
            stage: context.stage,
            message: context.message(),
        }
    }
}

/// Everything the registry can see, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub namespace: String,
    pub state: Value,
    pub instances: Vec<InstanceInfo>,
    pub subscriptions: BTreeMap<PathKey, Vec<InstanceId>>,
    pub errors: Vec<ErrorSnapshot>,
    pub pending: Vec<PathKey>,
    pub stats: DispatchStats,
    pub last_flush: Option<FlushReport>,
}

/// Explicitly attached introspection handle. At most one per runtime.
#[derive(Debug)]
pub struct DebugRegistry {
    runtime: Runtime,
}

impl DebugRegistry {
    /// Attach to `runtime`; fails if another registry is attached.
    pub fn attach(runtime: &Runtime) -> RuntimeResult<Self> {
        if !runtime.try_attach_debug() {
            return Err(RuntimeError::DebugAlreadyAttached);
        }
        tracing::debug!("debug registry attached");
        Ok(Self {
            runtime: runtime.clone(),
        })
    }

    pub fn instances(&self) -> Vec<InstanceInfo> {
        self.runtime.instances()
    }

    pub fn subscriptions(&self) -> BTreeMap<PathKey, Vec<InstanceId>> {
        self.runtime.dispatcher().subscriptions()
    }

    pub fn errors(&self) -> Vec<ErrorSnapshot> {
        self.runtime.errors().iter().map(ErrorSnapshot::from).collect()
    }

    /// Full failure context, including the component's store and element.
    pub fn error_context(&self, id: InstanceId) -> Option<ErrorContext> {
        self.runtime.error(id)
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        let dispatcher = self.runtime.dispatcher();
        DebugSnapshot {
            namespace: self.runtime.config().namespace.clone(),
            state: self.runtime.store().snapshot(),
            instances: self.instances(),
            subscriptions: self.subscriptions(),
            errors: self.errors(),
            pending: dispatcher.pending_paths(),
            stats: dispatcher.stats(),
            last_flush: dispatcher.last_flush(),
        }
    }

    pub fn rerender(&self, id: InstanceId) -> RuntimeResult<()> {
        self.runtime.rerender(id)
    }

    /// Invoke the retry callback of a captured failure.
    pub fn retry(&self, id: InstanceId) -> RuntimeResult<()> {
        match self.runtime.error(id) {
            Some(context) => context.retry(),
            None => Ok(()),
        }
    }

    pub fn clear_error(&self, id: InstanceId) -> bool {
        self.runtime.clear_error(id)
    }
}

impl Drop for DebugRegistry {
    fn drop(&mut self) {
        self.runtime.detach_debug();
        tracing::debug!("debug registry detached");
    }
}
