//! Error types and handling for linkyd
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for linkyd operations
pub type Result<T> = std::result::Result<T, LinkydError>;

/// Main error type for linkyd
#[derive(Debug, Error)]
pub enum LinkydError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The EDF API answered with an explicit error code
    #[error("Upstream error {code}: {description}")]
    Upstream { code: String, description: String },

    /// Network or unexpected failures while talking to the EDF API
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// A refresh was requested while another one is still in flight
    #[error("Refresh already in progress")]
    Busy,

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl LinkydError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new upstream error from an API error payload
    pub fn upstream<S: Into<String>>(code: S, description: S) -> Self {
        Self::Upstream {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        Self::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Whether the remote API itself rejected the request
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream { .. })
    }
}

impl From<std::io::Error> for LinkydError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LinkydError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LinkydError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for LinkydError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<chrono::ParseError> for LinkydError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Validation {
            field: "datetime".to_string(),
            message: err.to_string(),
        }
    }
}
