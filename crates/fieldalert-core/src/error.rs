//! Error types for FieldAlert operations.
//!
//! This module defines [`AlertError`], the error enum shared by every
//! FieldAlert crate. Failures inside the polling pipeline are absorbed and
//! logged where they happen ("retry next tick"); the variants here exist so
//! that each layer can say precisely what went wrong before it does so.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::AlertKind;

/// Result type alias using [`AlertError`].
pub type Result<T> = std::result::Result<T, AlertError>;

/// Error type for all FieldAlert operations.
#[derive(Debug, Error)]
pub enum AlertError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// JSON parsing error
    #[error("JSON parse error in {context}: {message}")]
    JsonParse {
        context: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // =========================================================================
    // Alert Pipeline Errors
    // =========================================================================
    /// The alert record store could not be reached
    #[error("Failed to fetch {kind} alerts: {message}")]
    FetchFailure { kind: AlertKind, message: String },

    /// A listener or broadcast registration was refused by the host
    #[error("Permission denied for {operation}: {message}")]
    PermissionFailure { operation: String, message: String },

    /// An alert record had an unparseable timestamp or identifier
    #[error("Malformed alert record {file}: {message}")]
    MalformedRecord { file: String, message: String },

    /// The engine was shut down before the request could be handled
    #[error("Alert engine is not running")]
    EngineStopped,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in FieldAlert)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AlertError {
    // =========================================================================
    // Constructor helpers for common error patterns
    // =========================================================================

    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a JSON parse error
    pub fn json_parse(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::JsonParse {
            context: context.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a fetch failure for one alert kind
    pub fn fetch(kind: AlertKind, message: impl Into<String>) -> Self {
        Self::FetchFailure {
            kind,
            message: message.into(),
        }
    }

    /// Create a permission failure
    pub fn permission(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PermissionFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a malformed record error
    pub fn malformed(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if the next poll tick may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailure { .. } | Self::MalformedRecord { .. } | Self::Io { .. }
        )
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the operator or integrator
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Pass --config with a path to an alert YAML file"),
            Self::ConfigInvalid { .. } => Some("Check YAML syntax - try 'fieldalert check-config'"),
            Self::FetchFailure { .. } => Some("The alert store will be retried on the next tick"),
            Self::PermissionFailure { .. } => {
                Some("Alerts still arrive by polling; grant the listener permission to restore foreground hand-off")
            }
            Self::EngineStopped => Some("Start the engine again after login"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_error() {
        let err = AlertError::config_not_found("/etc/fieldalert.yaml");
        assert!(err.to_string().contains("Configuration not found"));
        assert!(err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_fetch_failure_is_recoverable() {
        let err = AlertError::fetch(AlertKind::Sos, "connection reset");
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("sos"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_permission_failure_not_recoverable() {
        let err = AlertError::permission("foreground listener", "denied");
        assert!(!err.is_recoverable());
        assert!(!err.is_config_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_malformed_record_message() {
        let err = AlertError::malformed("100_2_3_202401011200.json", "bad time");
        assert_eq!(
            err.to_string(),
            "Malformed alert record 100_2_3_202401011200.json: bad time"
        );
    }
}
