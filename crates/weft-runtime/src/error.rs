//! Error types for the runtime.

use crate::InstanceId;
use thiserror::Error;
use weft_state::WeftError;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// No factory is registered under the component name.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// No mounted instance has this id.
    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    /// The init callback of a component failed or panicked.
    #[error("init of component `{component}` failed: {message}")]
    InitFailure { component: String, message: String },

    /// A render callback failed or panicked.
    #[error("render of component `{component}` (instance {instance}) failed: {message}")]
    RenderFailure {
        component: String,
        instance: InstanceId,
        message: String,
    },

    /// A debug registry is already attached to this runtime.
    #[error("a debug registry is already attached")]
    DebugAlreadyAttached,

    /// State tree error.
    #[error(transparent)]
    State(#[from] WeftError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors_are_transparent() {
        let err: RuntimeError = WeftError::path_not_found("count").into();
        assert_eq!(err.to_string(), "path not found: count");
    }

    #[test]
    fn test_render_failure_display() {
        let err = RuntimeError::RenderFailure {
            component: "counter".into(),
            instance: InstanceId(3),
            message: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "render of component `counter` (instance 3) failed: boom"
        );
    }
}
