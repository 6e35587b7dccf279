//! Error types for the datex engine.
//!
//! Configuration problems get their own struct error because they carry the
//! name of the component that rejected its options; everything that can go
//! wrong while a transaction is in flight funnels into [`DatexError`].

use thiserror::Error;

/// Error raised when a component rejects its configuration during `open`.
#[derive(Debug, Clone, Error)]
#[error("{component}: {message}")]
pub struct ConfigurationError {
    /// The component that rejected its configuration.
    pub component: String,
    /// What was wrong with it.
    pub message: String,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Reports a required option that was absent.
    #[must_use]
    pub fn missing_option(component: impl Into<String>, option: &str) -> Self {
        Self::new(component, format!("missing required option '{option}'"))
    }

    /// Reports an option that was present but unusable.
    #[must_use]
    pub fn invalid_option(component: impl Into<String>, option: &str, reason: &str) -> Self {
        Self::new(component, format!("invalid option '{option}': {reason}"))
    }
}

/// The main error type for datex operations.
#[derive(Debug, Error)]
pub enum DatexError {
    /// A component rejected its configuration.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A validator failed hard on a record.
    #[error("validation failed on field '{field}': {message}")]
    Validation {
        /// Field the validator was watching.
        field: String,
        /// The validator's description of the failure.
        message: String,
    },

    /// A reader, transform, writer or task failed mid-stream.
    #[error("{component} failed: {message}")]
    Processing {
        /// The component that failed.
        component: String,
        /// What went wrong.
        message: String,
    },

    /// A remote endpoint or resource could not be reached.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The persistent context store is already claimed by another run.
    #[error("persistent context '{0}' is locked by another run")]
    PersistenceConflict(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatexError {
    /// Wraps a mid-stream component failure.
    #[must_use]
    pub fn processing(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processing {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Wraps a hard validation failure.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True when the error came from component configuration.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// A specialized `Result` type for datex operations.
pub type DatexResult<T> = Result<T, DatexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::missing_option("read", "source");
        assert_eq!(err.to_string(), "read: missing required option 'source'");

        let err = ConfigurationError::invalid_option("write", "target", "not a path");
        assert_eq!(err.to_string(), "write: invalid option 'target': not a path");
    }

    #[test]
    fn test_configuration_converts_into_datex_error() {
        let err: DatexError = ConfigurationError::new("validate", "bad pattern").into();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "configuration error: validate: bad pattern"
        );
    }

    #[test]
    fn test_validation_display_names_field() {
        let err = DatexError::validation("model", "Model cannot be empty");
        assert_eq!(
            err.to_string(),
            "validation failed on field 'model': Model cannot be empty"
        );
    }

    #[test]
    fn test_processing_display_names_component() {
        let err = DatexError::processing("writer", "disk full");
        assert_eq!(err.to_string(), "writer failed: disk full");
    }
}
