// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam to the upstream chat-network client library.
//!
//! The gateway never speaks the wire protocol itself: a [`UpstreamConnector`]
//! builds a connection from a credential directory, yielding a socket handle
//! for outbound operations and an event stream for everything inbound.
//! Message payloads arrive as loose JSON ([`serde_json::Value`]); only the
//! session layer's normalizer interprets them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::WagateError;
use crate::model::MessageAnchor;

/// State of the upstream connection as reported by a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Close,
}

/// The `connection.update` event.
#[derive(Debug, Clone, Default)]
pub struct ConnectionUpdate {
    /// Pairing code, present while the account is unpaired.
    pub qr: Option<String>,
    pub connection: Option<ConnectionState>,
    /// Whether a close was caused by an upstream logout.
    pub logged_out: bool,
}

/// A chat as delivered by upstream sync events.
#[derive(Debug, Clone)]
pub struct UpstreamChat {
    pub jid: String,
    pub name: Option<String>,
    pub unread_count: Option<i64>,
    pub last_message_timestamp: Option<i64>,
}

/// A contact as delivered by upstream sync events.
#[derive(Debug, Clone)]
pub struct UpstreamContact {
    pub jid: String,
    pub name: Option<String>,
}

/// Business profile fields the upstream may expose for the own account.
#[derive(Debug, Clone, Default)]
pub struct UpstreamBusinessProfile {
    pub description: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub business_hours: Option<String>,
}

/// Events emitted by the upstream socket.
#[derive(Debug)]
pub enum UpstreamEvent {
    ConnectionUpdate(ConnectionUpdate),
    /// Credentials changed; the library persists them through its own callback.
    CredsUpdate,
    ChatsSet(Vec<UpstreamChat>),
    ChatsUpsert(Vec<UpstreamChat>),
    ContactsSet(Vec<UpstreamContact>),
    ContactsUpsert(Vec<UpstreamContact>),
    /// `messaging-history.set`: a history sync page.
    HistorySet {
        chats: Vec<UpstreamChat>,
        contacts: Vec<UpstreamContact>,
        messages: Vec<serde_json::Value>,
    },
    /// `messages.upsert`: live or appended messages.
    MessagesUpsert {
        kind: String,
        messages: Vec<serde_json::Value>,
    },
}

/// Result of a successful outbound send.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: String,
    /// Seconds since epoch.
    pub timestamp: i64,
}

/// Outbound operations on a live upstream connection.
#[async_trait]
pub trait UpstreamSocket: Send + Sync {
    /// Sends a text message to a JID.
    async fn send_text(&self, jid: &str, text: &str) -> Result<SentMessage, WagateError>;

    /// Checks whether a phone number exists on the network, returning its JID.
    async fn on_whatsapp(&self, digits: &str) -> Result<Option<String>, WagateError>;

    /// Logs the account out, invalidating the stored credentials.
    async fn logout(&self) -> Result<(), WagateError>;

    /// Business profile of a JID, when the account exposes one.
    async fn business_profile(
        &self,
        jid: &str,
    ) -> Result<Option<UpstreamBusinessProfile>, WagateError>;

    /// Status/about text of a JID.
    async fn fetch_status(&self, jid: &str) -> Result<Option<String>, WagateError>;

    /// Requests up to `count` messages older than the anchor.
    ///
    /// Results arrive asynchronously as history events, not as a return value.
    async fn fetch_message_history(
        &self,
        count: u32,
        anchor: &MessageAnchor,
    ) -> Result<(), WagateError>;

    /// The JID of the connected account, once known.
    fn self_jid(&self) -> Option<String>;
}

/// A live connection: the socket handle plus its event stream.
pub struct UpstreamConnection {
    pub socket: Arc<dyn UpstreamSocket>,
    pub events: mpsc::Receiver<UpstreamEvent>,
}

/// Factory for upstream connections, keyed by a credential directory.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Opens a connection using (or creating) credentials under `session_dir`.
    async fn connect(&self, session_dir: &Path) -> Result<UpstreamConnection, WagateError>;

    /// Whether `session_dir` holds usable credentials.
    fn has_credentials(&self, session_dir: &Path) -> bool;
}
