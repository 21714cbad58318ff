// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent-store trait consumed by the ingestion workers, the tenant
//! sessions, and the REST collaborator.

use async_trait::async_trait;

use crate::error::WagateError;
use crate::model::{Chat, ChatPatch, IngestRecord, MessageAnchor, MessageInfo, StoredMessage};
use crate::tenant::{BusinessInfo, Webhook};

/// Idempotent chat/message persistence plus tenant-config accessors.
///
/// A message row for chat `j` requires a chat row for `j`: every message
/// write path upserts the chat before inserting the message. Duplicate
/// message ids are a no-op.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Merge-upserts a chat: only `Some` fields of the patch overwrite.
    async fn upsert_chat(&self, jid: &str, patch: &ChatPatch) -> Result<(), WagateError>;

    /// Bulk chat upsert in one transaction.
    async fn upsert_chats(&self, chats: &[(String, ChatPatch)]) -> Result<(), WagateError>;

    /// Persists one message: chat upsert first, then idempotent insert.
    async fn save_message(&self, msg: &MessageInfo) -> Result<(), WagateError>;

    /// Persists a batch of ingestion records in one transaction.
    ///
    /// Duplicates (by message id) are ignored; the whole batch either
    /// commits or fails.
    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), WagateError>;

    /// Lists chats descending by `last_message_timestamp`, nulls last.
    ///
    /// `before` is an exclusive timestamp cursor.
    async fn list_conversations(
        &self,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<Chat>, WagateError>;

    /// Lists a chat's messages descending by timestamp with an exclusive cursor.
    async fn list_messages(
        &self,
        jid: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<StoredMessage>, WagateError>;

    /// The oldest stored message of a chat, or `None` when the chat has none.
    async fn oldest_message_anchor(&self, jid: &str)
        -> Result<Option<MessageAnchor>, WagateError>;

    /// Whether the store is reachable.
    async fn ping(&self) -> bool;

    // --- Tenant webhook configuration ---

    async fn list_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError>;

    /// Only the webhooks with `is_active = true`.
    async fn active_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError>;

    async fn add_webhook(&self, username: &str, hook: &Webhook) -> Result<(), WagateError>;

    async fn remove_webhook(&self, username: &str, id: &str) -> Result<(), WagateError>;

    async fn set_webhook_active(
        &self,
        username: &str,
        id: &str,
        active: bool,
    ) -> Result<(), WagateError>;

    // --- Tenant exclusion list (E.164 strings) ---

    async fn excluded_numbers(&self, username: &str) -> Result<Vec<String>, WagateError>;

    async fn add_excluded_number(&self, username: &str, number: &str) -> Result<(), WagateError>;

    async fn remove_excluded_number(
        &self,
        username: &str,
        number: &str,
    ) -> Result<(), WagateError>;

    // --- Tenant business info ---

    async fn business_info(&self, username: &str) -> Result<Option<BusinessInfo>, WagateError>;

    async fn put_business_info(
        &self,
        username: &str,
        info: &BusinessInfo,
    ) -> Result<(), WagateError>;
}
