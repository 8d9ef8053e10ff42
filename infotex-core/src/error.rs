//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions and
//! user-facing messages for the session layer and the HTTP client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type InfotexResult<T> = Result<T, InfotexError>;

/// Message shown to the user whenever an action needs a session and none exists.
pub const UNAUTHENTICATED_MESSAGE: &str = "debes iniciar sesión para continuar";

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the InfoTex client
#[derive(Error, Debug)]
pub enum InfotexError {
    /// No usable session exists for an action that requires one.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        message: String,
        context: ErrorContext,
    },

    /// The server rejected the supplied credentials.
    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<String>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
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

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
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

impl InfotexError {
    /// Build the error surfaced when an action needs a session and none exists
    pub fn unauthenticated(component: &str) -> Self {
        InfotexError::Unauthenticated {
            message: UNAUTHENTICATED_MESSAGE.to_string(),
            context: ErrorContext::new(component).with_suggestion("Log in and try again"),
        }
    }

    /// Build an HTTP status error
    pub fn http(status: u16, message: impl Into<String>, body: Option<String>) -> Self {
        InfotexError::Http {
            status,
            message: message.into(),
            body,
            context: ErrorContext::new("http").with_suggestion(match status {
                401 => "Log in again to obtain a fresh session",
                403 => "Check that the account has access to this resource",
                404 => "Verify the requested path",
                _ => "Check network connectivity and API status",
            }),
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            InfotexError::Unauthenticated { context, .. } => Some(context),
            InfotexError::Authentication { context, .. } => Some(context),
            InfotexError::Http { context, .. } => Some(context),
            InfotexError::Network { context, .. } => Some(context),
            InfotexError::Storage { context, .. } => Some(context),
            InfotexError::Config { context, .. } => Some(context),
            InfotexError::Validation { context, .. } => Some(context),
            InfotexError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            InfotexError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server answered 401
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            InfotexError::Network { .. } => true,
            InfotexError::Http { status, .. } => *status == 401 || *status >= 500,
            InfotexError::Storage { .. } => true,
            _ => false,
        }
    }

    /// Message suitable for showing to the person using the application
    pub fn user_message(&self) -> String {
        match self {
            InfotexError::Unauthenticated { message, .. }
            | InfotexError::Authentication { message, .. }
            | InfotexError::Http { message, .. }
            | InfotexError::Validation { message, .. } => message.clone(),
            InfotexError::Network { .. } => {
                "No se pudo conectar con el servidor".to_string()
            }
            _ => "Ocurrió un error inesperado".to_string(),
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            InfotexError::Internal { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            InfotexError::Config { .. } | InfotexError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            InfotexError::Network { .. } | InfotexError::Storage { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Network or storage error (may be recoverable)"
                );
            }
            _ => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Request failed"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::InfotexError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::InfotexError::Storage {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! network_error {
    ($msg:expr, $component:expr) => {
        $crate::InfotexError::Network {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and API status"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::InfotexError::Network {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check network connectivity and API status"),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::InfotexError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'infotex config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::InfotexError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}
