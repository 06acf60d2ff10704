//! Core error types for fivlo-core.
//!
//! Only [`ValidationError`] ever reaches a caller of the session engine.
//! Transport and reward failures are absorbed at the controller boundary
//! and logged; they exist here so transports can report what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fivlo-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session creation or restore was rejected
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote session API errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejections raised synchronously when a session is created or restored.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Goal label is blank
    #[error("goal label must not be empty")]
    EmptyGoal,

    /// Time Attack session without any step
    #[error("a time attack session needs at least one step")]
    EmptyStepList,

    /// A phase would never tick
    #[error("duration of '{phase}' must be greater than zero")]
    ZeroDuration { phase: String },

    /// The engine already holds a session that has not finished or been reset
    #[error("a session is already live (status: {status})")]
    SessionAlreadyLive { status: String },

    /// A snapshot that breaks the session invariants
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Remote session API failures. Never thrown to the UI.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Remote capability disabled
    #[error("remote session API is unavailable (offline mode)")]
    Offline,

    /// Request could not be sent or timed out
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Base URL or endpoint could not be built
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key does not exist in the configuration tree
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory could not be determined or created
    #[error("config directory unavailable: {0}")]
    DirUnavailable(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
