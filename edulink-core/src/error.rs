//! Error type shared by every EduLink crate
//!
//! Structured variants carry an [`ErrorContext`] so a failure can be traced
//! through the logs and explained to the user with a recovery hint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, warn};

pub type EdulinkResult<T> = Result<T, EdulinkError>;

/// Diagnostic details attached to every structured [`EdulinkError`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlates log lines belonging to one failure
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// Subsystem that raised the error, e.g. `session_controller`
    pub component: String,
    pub operation: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Hints shown to the user by the CLI
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_owned(),
            operation: None,
            metadata: BTreeMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_owned());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_owned());
        self
    }
}

/// Main error type for the EduLink session layer
#[derive(Error, Debug)]
pub enum EdulinkError {
    /// Read, write or remove failure on the persistent key-value store
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        key: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl EdulinkError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            EdulinkError::Storage { context, .. } => Some(context),
            EdulinkError::Config { context, .. } => Some(context),
            EdulinkError::Network { context, .. } => Some(context),
            EdulinkError::Authentication { context, .. } => Some(context),
            EdulinkError::Validation { context, .. } => Some(context),
            EdulinkError::Timeout { context, .. } => Some(context),
            EdulinkError::Internal { context, .. } => Some(context),
            EdulinkError::Io(_) | EdulinkError::Serialization(_) => None,
        }
    }

    /// Whether retrying the same call can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Server-side failures are worth another attempt, client errors are not
            EdulinkError::Network { status, .. } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => true,
            },
            EdulinkError::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Suggested pause before retrying, `None` when retrying is pointless
    pub fn retry_delay_ms(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }
        match self {
            EdulinkError::Network { .. } => Some(1000),
            EdulinkError::Timeout { .. } => Some(2000),
            _ => None,
        }
    }

    /// Whether this error came from the persistent key-value store
    pub fn is_storage(&self) -> bool {
        matches!(self, EdulinkError::Storage { .. })
    }

    /// Emit the error through `tracing`
    ///
    /// Storage, network and timeout failures are expected in the field and go
    /// out at `warn`; everything else is an `error`.
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str()).unwrap_or("-");

        match self {
            EdulinkError::Storage { key, .. } => warn!(
                error_id,
                key = key.as_deref().unwrap_or("-"),
                error = %self,
                "Session store call failed"
            ),
            EdulinkError::Network { status, .. } => warn!(
                error_id,
                status = ?status,
                error = %self,
                "Session API unreachable or failing"
            ),
            EdulinkError::Timeout { duration_ms, .. } => warn!(
                error_id,
                duration_ms,
                error = %self,
                "Operation timed out"
            ),
            EdulinkError::Config { .. } | EdulinkError::Validation { .. } => {
                error!(error_id, error = %self, "Rejected invalid input")
            }
            _ => error!(error_id, error = %self, "Unexpected failure"),
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $key:expr, $component:expr) => {
        $crate::EdulinkError::Storage {
            message: $msg.to_string(),
            key: Some($key.to_string()),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $key:expr, $component:expr, $source:expr) => {
        $crate::EdulinkError::Storage {
            message: $msg.to_string(),
            key: Some($key.to_string()),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::EdulinkError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'edulink config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::EdulinkError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! authentication_error {
    ($msg:expr, $component:expr) => {
        $crate::EdulinkError::Authentication {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the email address and password")
                .with_suggestion("Sign in again to obtain a fresh token"),
        }
    };
}
