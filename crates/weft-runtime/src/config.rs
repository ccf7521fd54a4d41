use crate::RuntimeResult;
use serde::{Deserialize, Serialize};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Key under the root that holds the application state.
    ///
    /// Change paths are matched against subscriptions relative to it.
    pub namespace: String,
    /// Discard notifications queued while [`Runtime::setup`] runs.
    ///
    /// [`Runtime::setup`]: crate::Runtime::setup
    pub suppress_setup_notifications: bool,
    /// Run the first render as part of mounting.
    pub render_on_mount: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            suppress_setup_notifications: true,
            render_on_mount: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> RuntimeResult<Self> {
        Ok(serde_json::from_str(raw).map_err(weft_state::WeftError::from)?)
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn with_suppress_setup_notifications(mut self, suppress: bool) -> Self {
        self.suppress_setup_notifications = suppress;
        self
    }

    #[must_use]
    pub fn with_render_on_mount(mut self, render: bool) -> Self {
        self.render_on_mount = render;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.namespace, "app");
        assert!(config.suppress_setup_notifications);
        assert!(config.render_on_mount);
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = RuntimeConfig::from_json(r#"{"namespace": "store"}"#).unwrap();
        assert_eq!(config, RuntimeConfig::default().with_namespace("store"));
    }

    #[test]
    fn test_from_json_rejects_bad_types() {
        let err = RuntimeConfig::from_json(r#"{"render_on_mount": "yes"}"#).unwrap_err();
        assert!(matches!(
            err,
            crate::RuntimeError::State(weft_state::WeftError::Serialization(_))
        ));
    }
}
