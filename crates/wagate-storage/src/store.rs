// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`MessageStore`] trait.

use async_trait::async_trait;
use tracing::debug;

use wagate_core::model::{
    Chat, ChatPatch, IngestRecord, MessageAnchor, MessageInfo, StoredMessage,
};
use wagate_core::tenant::{BusinessInfo, Webhook};
use wagate_core::{MessageStore, WagateError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed message store.
///
/// Wraps a [`Database`] handle and delegates all operations to the typed
/// query modules.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens (or creates) the store at `path` and runs migrations.
    pub async fn open(path: &str) -> Result<Self, WagateError> {
        let db = Database::open(path).await?;
        debug!(path, "sqlite store opened");
        Ok(Self { db })
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(&self) -> Result<(), WagateError> {
        self.db.close().await
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn upsert_chat(&self, jid: &str, patch: &ChatPatch) -> Result<(), WagateError> {
        queries::chats::upsert_chat(&self.db, jid, patch).await
    }

    async fn upsert_chats(&self, chats: &[(String, ChatPatch)]) -> Result<(), WagateError> {
        queries::chats::upsert_chats(&self.db, chats).await
    }

    async fn save_message(&self, msg: &MessageInfo) -> Result<(), WagateError> {
        queries::messages::save_message(&self.db, msg).await
    }

    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), WagateError> {
        queries::messages::save_messages_batch(&self.db, records).await
    }

    async fn list_conversations(
        &self,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<Chat>, WagateError> {
        queries::chats::list_conversations(&self.db, limit, before).await
    }

    async fn list_messages(
        &self,
        jid: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<StoredMessage>, WagateError> {
        queries::messages::list_messages(&self.db, jid, limit, before).await
    }

    async fn oldest_message_anchor(
        &self,
        jid: &str,
    ) -> Result<Option<MessageAnchor>, WagateError> {
        queries::messages::oldest_message_anchor(&self.db, jid).await
    }

    async fn ping(&self) -> bool {
        self.db
            .connection()
            .call(|conn| {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .is_ok()
    }

    async fn list_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError> {
        queries::tenants::list_webhooks(&self.db, username).await
    }

    async fn active_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError> {
        queries::tenants::active_webhooks(&self.db, username).await
    }

    async fn add_webhook(&self, username: &str, hook: &Webhook) -> Result<(), WagateError> {
        queries::tenants::add_webhook(&self.db, username, hook).await
    }

    async fn remove_webhook(&self, username: &str, id: &str) -> Result<(), WagateError> {
        queries::tenants::remove_webhook(&self.db, username, id).await
    }

    async fn set_webhook_active(
        &self,
        username: &str,
        id: &str,
        active: bool,
    ) -> Result<(), WagateError> {
        queries::tenants::set_webhook_active(&self.db, username, id, active).await
    }

    async fn excluded_numbers(&self, username: &str) -> Result<Vec<String>, WagateError> {
        queries::tenants::excluded_numbers(&self.db, username).await
    }

    async fn add_excluded_number(&self, username: &str, number: &str) -> Result<(), WagateError> {
        queries::tenants::add_excluded_number(&self.db, username, number).await
    }

    async fn remove_excluded_number(
        &self,
        username: &str,
        number: &str,
    ) -> Result<(), WagateError> {
        queries::tenants::remove_excluded_number(&self.db, username, number).await
    }

    async fn business_info(&self, username: &str) -> Result<Option<BusinessInfo>, WagateError> {
        queries::tenants::business_info(&self.db, username).await
    }

    async fn put_business_info(
        &self,
        username: &str,
        info: &BusinessInfo,
    ) -> Result<(), WagateError> {
        queries::tenants::put_business_info(&self.db, username, info).await
    }
}
