use thiserror::Error;

/// Core error type for the Quiver workbench
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed or missing input from the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Entity ID does not resolve
    #[error("{0} not found")]
    NotFound(String),

    /// Caller lacks the required role on the workspace
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No authenticated user in the request context
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Storage uniqueness or foreign-key violation
    #[error("Constraint violated on {columns}: {message}")]
    ConstraintViolated {
        /// Offending column set as reported by the storage engine
        columns: String,
        /// Engine-provided detail message
        message: String,
    },

    /// Deadline expired in the evaluator, HTTP dispatch or stream delivery
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Caller cancelled the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Expression syntax or type error, or a failed built-in
    #[error("Evaluation error: {0}")]
    EvaluationError(String),

    /// Everything else; surfaced opaquely and logged
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a `NotFound` carrying a kind name and an id.
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("{} {}", kind, id))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("serialization: {}", err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Internal(format!("io: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                CoreError::InvalidArgument("empty batch".to_string()),
                "Invalid argument: empty batch",
            ),
            (
                CoreError::not_found("workspace", "wk_123"),
                "workspace wk_123 not found",
            ),
            (
                CoreError::PermissionDenied("not an owner".to_string()),
                "Permission denied: not an owner",
            ),
            (
                CoreError::Timeout("assertion batch".to_string()),
                "Timeout: assertion batch",
            ),
            (
                CoreError::EvaluationError("unexpected token".to_string()),
                "Evaluation error: unexpected token",
            ),
            (
                CoreError::Internal("oops".to_string()),
                "Internal error: oops",
            ),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_constraint_violated_display() {
        let err = CoreError::ConstraintViolated {
            columns: "environments.workspace_id, environments.name".to_string(),
            message: "UNIQUE constraint failed".to_string(),
        };
        assert!(err.to_string().contains("environments.name"));
        assert!(err.to_string().contains("UNIQUE"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::Internal(msg) => assert!(msg.contains("serialization")),
            _ => panic!("Expected Internal variant"),
        }
    }
}
