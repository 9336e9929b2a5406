//! Core error types for KICKOFF.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A value does not expose the start capability
    #[error("Item {index} ({label}) does not expose a start capability")]
    MissingCapability {
        /// Position of the offending item in the input sequence
        index: usize,
        /// Label of the offending item
        label: String,
    },

    /// Validation error
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Parse error
    #[error("Parse error: {message}")]
    ParseError { message: String },
}

impl CoreError {
    /// Shorthand for a validation failure on a named field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised by a single item's start capability.
///
/// The processor records these against the item instead of propagating them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    /// The item reported a failure
    #[error("Start failed: {0}")]
    Failed(String),

    /// The item panicked while starting
    #[error("Start panicked: {0}")]
    Panicked(String),

    /// The item was already started and cannot be started again
    #[error("Already started")]
    AlreadyStarted,

    /// The item could not spawn its own thread
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

impl StartError {
    /// Build a failure from any displayable cause
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self::Failed(cause.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::MissingCapability {
            index: 3,
            label: "Note".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Item 3 (Note) does not expose a start capability"
        );

        let err = CoreError::validation("max_items", "must be positive");
        assert_eq!(
            format!("{}", err),
            "Validation failed for max_items: must be positive"
        );
    }

    #[test]
    fn test_start_error_display() {
        assert_eq!(
            format!("{}", StartError::failed("boom")),
            "Start failed: boom"
        );
        assert_eq!(format!("{}", StartError::AlreadyStarted), "Already started");
        assert!(format!("{}", StartError::Panicked("bad".into())).contains("bad"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::validation("window", "zero");
        let err2 = CoreError::validation("window", "zero");
        assert_eq!(err1, err2);

        let err3 = CoreError::ParseError {
            message: "eof".to_string(),
        };
        assert_ne!(err1, err3);
    }
}
