//! Error types for blockcache operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all blockcache crates. Uses `thiserror` for derive macros.
//!
//! Not every failure is an error here. A stale cache entry is an ordinary
//! cache miss (`Ok(None)`), and querying an unknown block yields an empty or
//! absent value rather than an `Err`.

use thiserror::Error;

/// Errors that can occur in blockcache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Content not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing content store failed.
    #[error("Content store error: {0}")]
    ContentStore(String),

    /// The cache store failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A transformer is applied to a structure it never collected data for.
    #[error("Transformer '{transformer}' has no collected version stamp")]
    MissingVersion {
        /// Name of the transformer.
        transformer: String,
    },

    /// A transformer cannot be registered.
    #[error("Invalid transformer '{name}': {reason}")]
    InvalidTransformer {
        /// Name of the transformer.
        name: String,
        /// Why registration was refused.
        reason: String,
    },

    /// A requested transformer is not registered.
    #[error("Unknown transformer: {0}")]
    UnknownTransformer(String),

    /// A transformer's collect or apply step failed.
    #[error("Transformer '{name}' failed: {message}")]
    Transformer {
        /// Name of the failing transformer.
        name: String,
        /// Failure description.
        message: String,
    },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a content store error.
    pub fn content_store(msg: impl Into<String>) -> Self {
        Self::ContentStore(msg.into())
    }

    /// Create a cache store error.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a missing version error for the named transformer.
    pub fn missing_version(transformer: impl Into<String>) -> Self {
        Self::MissingVersion {
            transformer: transformer.into(),
        }
    }

    /// Create an invalid transformer error.
    pub fn invalid_transformer(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTransformer {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a transformer failure.
    pub fn transformer(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transformer {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error originated inside a transformer.
    pub fn is_transformer_failure(&self) -> bool {
        matches!(self, Self::Transformer { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using blockcache's Error type.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================
