//! Error types for weft-state operations.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for weft-state operations.
pub type WeftResult<T> = Result<T, WeftError>;

/// Errors that can occur while reading, writing or patching the state tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeftError {
    /// The location, or its parent chain, does not exist.
    #[error("path not found: {path}")]
    PathNotFound {
        /// Pointer or dotted path that failed to resolve.
        path: String,
    },

    /// A `test` patch operation found a different value.
    #[error("test failed at {path}: expected {expected}, found {actual}")]
    TestMismatch {
        path: String,
        expected: Value,
        actual: Value,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at {path}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// A container of a different kind was expected at the location.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Malformed pointer, or a pointer that cannot be used for the operation.
    #[error("invalid pointer `{pointer}`: {reason}")]
    InvalidPointer {
        pointer: String,
        reason: &'static str,
    },

    /// A write was attempted through a read-only accessor.
    #[error("write attempted through read-only state accessor at {path}")]
    ReadOnly { path: String },

    /// Undoing a previously applied operation failed; the tree may be left
    /// inconsistent.
    #[error("rollback of op #{index} failed: {source}")]
    RollbackFailed {
        /// Index of the original op whose inverse failed.
        index: usize,
        #[source]
        source: Box<WeftError>,
    },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl WeftError {
    #[inline]
    pub fn path_not_found(path: impl ToString) -> Self {
        WeftError::PathNotFound {
            path: path.to_string(),
        }
    }

    #[inline]
    pub fn test_mismatch(path: impl ToString, expected: Value, actual: Value) -> Self {
        WeftError::TestMismatch {
            path: path.to_string(),
            expected,
            actual,
        }
    }

    #[inline]
    pub fn index_out_of_bounds(path: impl ToString, index: usize, len: usize) -> Self {
        WeftError::IndexOutOfBounds {
            path: path.to_string(),
            index,
            len,
        }
    }

    #[inline]
    pub fn type_mismatch(path: impl ToString, expected: &'static str, found: &'static str) -> Self {
        WeftError::TypeMismatch {
            path: path.to_string(),
            expected,
            found,
        }
    }

    #[inline]
    pub fn invalid_pointer(pointer: impl ToString, reason: &'static str) -> Self {
        WeftError::InvalidPointer {
            pointer: pointer.to_string(),
            reason,
        }
    }

    #[inline]
    pub fn read_only(path: impl ToString) -> Self {
        WeftError::ReadOnly {
            path: path.to_string(),
        }
    }

    #[inline]
    pub fn rollback_failed(index: usize, source: WeftError) -> Self {
        WeftError::RollbackFailed {
            index,
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for WeftError {
    fn from(err: serde_json::Error) -> Self {
        WeftError::Serialization(err.to_string())
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = WeftError::path_not_found("/missing/b");
        assert_eq!(err.to_string(), "path not found: /missing/b");

        let err = WeftError::test_mismatch("/a", json!(1), json!(2));
        assert_eq!(err.to_string(), "test failed at /a: expected 1, found 2");
    }

    #[test]
    fn test_rollback_failed_keeps_source() {
        let err = WeftError::rollback_failed(2, WeftError::path_not_found("/x"));
        assert!(err.to_string().contains("op #2"));
        assert!(err.to_string().contains("/x"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_value_type_name() {
        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(42)), "number");
        assert_eq!(value_type_name(&json!("hello")), "string");
        assert_eq!(value_type_name(&json!([1, 2, 3])), "array");
        assert_eq!(value_type_name(&json!({"a": 1})), "object");
    }
}
