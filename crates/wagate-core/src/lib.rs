// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wagate gateway.
//!
//! This crate provides the normalized message model, the durable-log record
//! envelope, tenant configuration types, the shared error type, and the
//! trait seams (store, upstream socket, notifier) the other workspace
//! crates implement or consume.

pub mod error;
pub mod model;
pub mod tenant;
pub mod traits;

pub use error::WagateError;
pub use model::{
    correlation_id, idempotency_key, is_group_jid, jid_to_e164, to_jid, Chat, ChatPatch,
    IngestRecord, MediaContent, MessageAnchor, MessageContent, MessageInfo, StoredMessage,
};
pub use tenant::{BusinessInfo, Webhook};
pub use traits::{
    ConnectionState, ConnectionUpdate, IngestSink, MessageStore, Notifier, NullNotifier,
    SentMessage,
    UpstreamBusinessProfile, UpstreamChat, UpstreamConnection, UpstreamConnector,
    UpstreamContact, UpstreamEvent, UpstreamSocket,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_variants_construct() {
        let _config = WagateError::Config("bad key".into());
        let _storage = WagateError::storage("no such table");
        let _journal = WagateError::Journal {
            source: std::io::Error::other("disk full"),
        };
        let _upstream = WagateError::upstream("socket closed");
        let _webhook = WagateError::Webhook {
            message: "503".into(),
            source: None,
        };
        let _invalid = WagateError::InvalidMessage("missing id".into());
        let _not_connected = WagateError::NotConnected("alice".into());
        let _timeout = WagateError::Timeout {
            duration: std::time::Duration::from_secs(300),
        };
        let _internal = WagateError::Internal("unreachable".into());
    }

    #[test]
    fn error_display_includes_context() {
        let err = WagateError::NotConnected("alice".into());
        assert_eq!(err.to_string(), "session not connected: alice");

        let err = WagateError::storage("database is locked");
        assert!(err.to_string().contains("database is locked"));
    }
}
