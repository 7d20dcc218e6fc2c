// src/error.rs

//! Unified error handling for the stock watcher.

use std::fmt;

use thiserror::Error;

/// Result type alias for watcher operations.
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

    /// A JSON value had an unexpected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The page could not be rendered into an inspectable document
    #[error("Render error for {url}: {message}")]
    Render { url: String, message: String },

    /// The server answered with a status that means "try again later"
    #[error("Navigation to {url} failed with HTTP {status}")]
    Navigation { url: String, status: u16 },

    /// The render did not finish in time
    #[error("Timed out after {secs}s rendering {url}")]
    Timeout { url: String, secs: u64 },

    /// The messaging channel refused or failed to deliver a message
    #[error("Notification delivery failed: {0}")]
    Notify(String),
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

    /// Create a render error for a URL.
    pub fn render(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Render {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification delivery error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    /// Whether the failure came from reaching or rendering the page and is
    /// worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_)
                | Self::Io(_)
                | Self::Render { .. }
                | Self::Navigation { .. }
                | Self::Timeout { .. }
        )
    }
}
