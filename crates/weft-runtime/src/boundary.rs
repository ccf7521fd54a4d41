//! Error boundary around user callbacks.

use crate::component::{BoxError, Element};
use crate::{InstanceId, RuntimeError, Store};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Run `f`, turning both an `Err` and a panic into an error message.
pub(crate) fn guard<T>(f: impl FnOnce() -> Result<T, BoxError>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

/// Run an element callback; a panic is logged against `instance` instead of
/// unwinding into the caller.
pub(crate) fn element_hook(instance: InstanceId, hook: impl FnOnce()) {
    let outcome = guard(|| {
        hook();
        Ok(())
    });
    if let Err(message) = outcome {
        tracing::error!(instance = %instance, error = %message, "element callback failed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Which callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedStage {
    Init,
    Render,
}

/// Captured failure of one component instance.
///
/// Lives until the next successful render of the instance or an explicit
/// clear.
#[derive(Clone)]
pub struct ErrorContext {
    pub instance: InstanceId,
    pub component: String,
    pub stage: FailedStage,
    pub error: RuntimeError,
    /// The state the component works on.
    pub store: Store,
    pub element: Rc<dyn Element>,
    retry: Rc<dyn Fn() -> Result<(), RuntimeError>>,
}

impl ErrorContext {
    pub(crate) fn new(
        instance: InstanceId,
        component: String,
        stage: FailedStage,
        error: RuntimeError,
        store: Store,
        element: Rc<dyn Element>,
        retry: Rc<dyn Fn() -> Result<(), RuntimeError>>,
    ) -> Self {
        Self {
            instance,
            component,
            stage,
            error,
            store,
            element,
            retry,
        }
    }

    /// Re-run the failed instance's render.
    pub fn retry(&self) -> Result<(), RuntimeError> {
        (self.retry)()
    }

    /// Error message without the component prefix.
    pub fn message(&self) -> String {
        match &self.error {
            RuntimeError::InitFailure { message, .. }
            | RuntimeError::RenderFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Debug for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorContext")
            .field("instance", &self.instance)
            .field("component", &self.component)
            .field("stage", &self.stage)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_passes_success_through() {
        assert_eq!(guard(|| Ok(3)), Ok(3));
    }

    #[test]
    fn test_guard_reports_errors() {
        let result: Result<(), String> = guard(|| Err("bad input".into()));
        assert_eq!(result, Err("bad input".to_string()));
    }

    #[test]
    fn test_guard_catches_panics() {
        let result: Result<(), String> = guard(|| panic!("exploded"));
        assert_eq!(result, Err("panicked: exploded".to_string()));

        let code = 7;
        let result: Result<(), String> = guard(|| panic!("code {code}"));
        assert_eq!(result, Err("panicked: code 7".to_string()));
    }
}
