// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport failed
    #[error("WebSocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extraction template error
    #[error("Template error: {0}")]
    Template(String),

    /// DevTools endpoint cannot be reached. Fatal for a run.
    #[error("Cannot reach DevTools endpoint {endpoint}: {message}")]
    Connectivity { endpoint: String, message: String },

    /// No open page matched the template's URL pattern. Fatal for a run.
    #[error("No page matching '{pattern}' found; open the target feed in the attached browser")]
    PageNotFound { pattern: String },

    /// Script evaluation failed on the remote page.
    #[error("Evaluation failed ({context}): {message}")]
    Evaluate { context: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a template error.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    /// Create a connectivity error.
    pub fn connectivity(endpoint: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Connectivity {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Create an evaluation error with context.
    pub fn evaluate(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Evaluate {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error aborts a run (as opposed to degrading one round).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Connectivity { .. } | AppError::PageNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_fatal() {
        assert!(AppError::connectivity("http://localhost:9222", "refused").is_fatal());
        assert!(
            AppError::PageNotFound {
                pattern: "x\\.com".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn evaluation_errors_are_not_fatal() {
        assert!(!AppError::evaluate("extract", "timed out").is_fatal());
        assert!(!AppError::template("missing item_selector").is_fatal());
    }
}
