//! Error types for the alarm manager.
//!
//! All errors are strongly typed using thiserror so callers can pattern
//! match on specific failure conditions instead of parsing strings.

use thiserror::Error;

/// Validation errors raised while constructing or admitting domain objects.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A template or rule id was empty.
    #[error("id cannot be empty")]
    EmptyId,

    /// A metric path did not match any recognized grammar.
    #[error("metric path '{path}' is not well-formed")]
    MalformedMetricPath {
        /// Offending path.
        path: String,
    },

    /// A condition tree referenced an unknown operator/type tag.
    #[error("unknown condition type: {type_tag}")]
    UnknownConditionType {
        /// Offending tag.
        type_tag: String,
    },

    /// An action list referenced an unknown operator/type tag.
    #[error("unknown action type: {type_tag}")]
    UnknownActionType {
        /// Offending tag.
        type_tag: String,
    },

    /// A required field was missing from an admin request body.
    #[error("required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A threshold or numeric field failed to parse.
    #[error("invalid numeric value for '{field}': {value}")]
    InvalidNumber {
        /// Field name.
        field: String,
        /// Raw value that failed to parse.
        value: String,
    },
}

/// Errors raised by the relational storage layer (templates, conditions,
/// actions, events).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Row kind, e.g. "template".
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The underlying sqlite backend returned an error.
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A stored row failed to deserialize into its domain type.
    #[error("corrupt row in {table}: {reason}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// Human-readable reason.
        reason: String,
    },
}

/// Errors raised while evaluating conditions or executing actions.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A bound resource could not produce a value (e.g. unknown metric path).
    #[error("resource '{resource}' produced no value")]
    ResourceUnavailable {
        /// Resource/metric name.
        resource: String,
    },

    /// An action sink rejected the event it was asked to record.
    #[error("action '{action}' failed: {reason}")]
    ActionFailed {
        /// Action kind.
        action: &'static str,
        /// Failure reason.
        reason: String,
    },
}

/// Top-level error type for the alarm manager crate.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Input validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Evaluation/execution failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl ManagerError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error (caller's fault, not retryable).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for alarm manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = ValidationError::MalformedMetricPath {
            path: "###".to_string(),
        };
        assert!(err.to_string().contains("###"));
    }

    #[test]
    fn storage_not_found_display() {
        let err = StorageError::NotFound {
            kind: "template",
            id: "cpu-high".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("template"));
        assert!(msg.contains("cpu-high"));
    }

    #[test]
    fn manager_error_from_validation() {
        let err: ManagerError = ValidationError::EmptyId.into();
        assert!(err.is_validation());
    }

    #[test]
    fn manager_error_internal() {
        let err = ManagerError::internal("unexpected state");
        assert!(matches!(err, ManagerError::Internal { .. }));
        assert!(err.to_string().contains("unexpected state"));
    }
}
