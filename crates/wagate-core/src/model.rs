// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The normalized message model and the durable-log record envelope.
//!
//! [`MessageInfo`] is the in-memory form of a chat message after the
//! session layer has normalized the loose upstream payload. The `kind`
//! field preserves the raw upstream discriminant (e.g. `conversation`,
//! `imageMessage`) while [`MessageContent`] is the typed sum over the
//! content families the gateway understands.

use serde::{Deserialize, Serialize};

/// Server suffix that marks a group chat JID.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Server suffix that marks an individual chat JID.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// A normalized chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    /// Opaque message id assigned by the upstream network.
    pub id: String,
    /// JID of the chat this message belongs to.
    pub from: String,
    /// True for outbound messages.
    pub from_me: bool,
    /// Seconds since epoch.
    pub timestamp: i64,
    /// Raw upstream discriminant tag (e.g. `conversation`, `imageMessage`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name of the sender at send time, when the upstream provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Typed content keyed by family.
    pub content: MessageContent,
}

impl MessageInfo {
    /// Whether the chat is a group, derived from the JID suffix.
    pub fn is_group(&self) -> bool {
        is_group_jid(&self.from)
    }
}

/// Typed message content, tagged by normalized family name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
        #[serde(rename = "contextInfo", skip_serializing_if = "Option::is_none")]
        context_info: Option<serde_json::Value>,
    },
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Document(MediaContent),
    Sticker(MediaContent),
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Contact {
        #[serde(rename = "displayName")]
        display_name: String,
        vcard: String,
    },
    /// Upstream kinds the gateway does not model pass through opaquely.
    Unhandled,
}

/// Shared fields of the media content families.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
}

/// One line of the durable ingestion log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    /// Deterministic key, unique per upstream message (`wa:<id>`).
    pub idempotency_key: String,
    /// Stable tracing id (`cid:<id>`, or `cid:<from>:<timestamp>` when the id is empty).
    pub correlation_id: String,
    /// Milliseconds since epoch at ingestion time.
    pub received_at: i64,
    /// The full normalized message.
    pub payload: MessageInfo,
}

impl IngestRecord {
    /// Wraps a message in the log envelope, stamping `received_at` with the
    /// given ingestion time in milliseconds.
    pub fn new(payload: MessageInfo, received_at: i64) -> Self {
        Self {
            idempotency_key: idempotency_key(&payload.id),
            correlation_id: correlation_id(&payload),
            received_at,
            payload,
        }
    }
}

/// The deterministic idempotency key for an upstream message id.
pub fn idempotency_key(id: &str) -> String {
    format!("wa:{id}")
}

/// The tracing correlation id for a message.
///
/// Falls back to chat + timestamp when the upstream id is empty.
pub fn correlation_id(msg: &MessageInfo) -> String {
    if msg.id.is_empty() {
        format!("cid:{}:{}", msg.from, msg.timestamp)
    } else {
        format!("cid:{}", msg.id)
    }
}

/// A chat row as stored and listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub jid: String,
    pub name: Option<String>,
    pub is_group: bool,
    pub unread_count: i64,
    pub last_message_timestamp: Option<i64>,
    pub last_message_text: Option<String>,
}

/// Partial chat update with merge semantics: only `Some` fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub name: Option<String>,
    pub is_group: Option<bool>,
    pub unread_count: Option<i64>,
    pub last_message_timestamp: Option<i64>,
    pub last_message_text: Option<String>,
}

impl ChatPatch {
    /// A patch carrying only a display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// A message row as stored and listed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub jid: String,
    pub from_me: bool,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub push_name: Option<String>,
    pub content: MessageContent,
}

/// The oldest stored message of a chat, used as the pagination anchor for
/// upstream history backfill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnchor {
    pub id: String,
    pub jid: String,
    pub from_me: bool,
    pub timestamp: i64,
}

/// Whether a JID addresses a group chat.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_JID_SUFFIX)
}

/// Derives the E.164 form of a JID: `+` followed by the digits before `@`.
///
/// Returns `None` when the JID carries no digits before the separator.
pub fn jid_to_e164(jid: &str) -> Option<String> {
    let local = jid.split('@').next().unwrap_or("");
    let digits: String = local.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("+{digits}"))
    }
}

/// Normalizes a recipient to a JID.
///
/// Values already containing `@` pass through; anything else is stripped to
/// digits and suffixed with the individual-chat server.
pub fn to_jid(recipient: &str) -> String {
    if recipient.contains('@') {
        recipient.to_string()
    } else {
        let digits: String = recipient.chars().filter(|c| c.is_ascii_digit()).collect();
        format!("{digits}{USER_JID_SUFFIX}")
    }
}
