// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wagate gateway.

use thiserror::Error;

/// The primary error type used across all Wagate crates.
#[derive(Debug, Error)]
pub enum WagateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent-store errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Durable-log I/O errors (append, fsync, read).
    #[error("journal error: {source}")]
    Journal {
        #[from]
        source: std::io::Error,
    },

    /// Upstream socket errors (connection failure, send failure, protocol).
    #[error("upstream error: {message}")]
    Upstream {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook delivery errors (request build failure, non-2xx response).
    #[error("webhook error: {message}")]
    Webhook {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Inbound message failed validation before the durable log.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A session operation requires an open connection.
    #[error("session not connected: {0}")]
    NotConnected(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WagateError {
    /// Shorthand for an [`WagateError::Upstream`] without a source.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`WagateError::Storage`] from a plain message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            source: message.into().into(),
        }
    }
}
