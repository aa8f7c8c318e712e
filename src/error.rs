// src/error.rs

//! Unified error handling for the prober and consumer.

use std::fmt;

use thiserror::Error;

/// Result type alias for prober operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request failed outside a probe
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Database query or connection failed
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A message could not be handed to the bus
    #[error("Publish to '{topic}' failed: {message}")]
    Publish { topic: String, message: String },

    /// Message bus transport error
    #[error("Bus error: {0}")]
    Bus(String),

    /// A consumed message is malformed
    #[error("Malformed message: {0}")]
    Message(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a publish error for a topic.
    pub fn publish(topic: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.to_string(),
        }
    }

    /// Create a bus transport error.
    pub fn bus(message: impl fmt::Display) -> Self {
        Self::Bus(message.to_string())
    }

    /// Create a malformed message error.
    pub fn message(message: impl fmt::Display) -> Self {
        Self::Message(message.to_string())
    }
}
