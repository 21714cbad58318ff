// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`MessageStore`] with scriptable failures.
//!
//! Tests can queue transient errors for upcoming batch calls, poison
//! individual message ids with a permanent error, or flip the store
//! unreachable for health checks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use wagate_core::model::{
    is_group_jid, Chat, ChatPatch, IngestRecord, MessageAnchor, MessageInfo, StoredMessage,
};
use wagate_core::tenant::{BusinessInfo, Webhook};
use wagate_core::{MessageStore, WagateError};

/// A deterministic in-memory message store for tests.
#[derive(Default)]
pub struct MockStore {
    chats: Mutex<HashMap<String, Chat>>,
    messages: Mutex<HashMap<String, MessageInfo>>,
    webhooks: Mutex<HashMap<String, Vec<Webhook>>>,
    exclusions: Mutex<HashMap<String, HashSet<String>>>,
    business: Mutex<HashMap<String, BusinessInfo>>,
    /// Errors returned (in order) by upcoming `save_messages_batch` calls.
    batch_failures: Mutex<VecDeque<String>>,
    /// Message ids that permanently fail with a non-transient error.
    poisoned: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    batch_calls: AtomicU64,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a failure for the next `save_messages_batch` call.
    pub fn fail_next_batch(&self, error: &str) {
        self.batch_failures
            .lock()
            .unwrap()
            .push_back(error.to_string());
    }

    /// Marks a message id as permanently failing.
    pub fn poison(&self, id: &str) {
        self.poisoned.lock().unwrap().insert(id.to_string());
    }

    /// Makes `ping` report the store as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of stored messages.
    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Whether a message id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.messages.lock().unwrap().contains_key(id)
    }

    /// Stored message by id.
    pub fn message(&self, id: &str) -> Option<MessageInfo> {
        self.messages.lock().unwrap().get(id).cloned()
    }

    /// Number of `save_messages_batch` calls observed.
    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn apply_chat_patch(&self, jid: &str, patch: &ChatPatch) {
        let mut chats = self.chats.lock().unwrap();
        let chat = chats.entry(jid.to_string()).or_insert_with(|| Chat {
            jid: jid.to_string(),
            name: None,
            is_group: is_group_jid(jid),
            unread_count: 0,
            last_message_timestamp: None,
            last_message_text: None,
        });
        if let Some(name) = &patch.name {
            chat.name = Some(name.clone());
        }
        if let Some(is_group) = patch.is_group {
            chat.is_group = is_group;
        }
        if let Some(unread) = patch.unread_count {
            chat.unread_count = unread;
        }
        if let Some(ts) = patch.last_message_timestamp {
            chat.last_message_timestamp = Some(ts);
        }
        if let Some(text) = &patch.last_message_text {
            chat.last_message_text = Some(text.clone());
        }
    }

    fn apply_message(&self, msg: &MessageInfo) {
        self.apply_chat_patch(
            &msg.from,
            &ChatPatch {
                last_message_timestamp: Some(msg.timestamp),
                ..ChatPatch::default()
            },
        );
        self.messages
            .lock()
            .unwrap()
            .entry(msg.id.clone())
            .or_insert_with(|| msg.clone());
    }
}

#[async_trait]
impl MessageStore for MockStore {
    async fn upsert_chat(&self, jid: &str, patch: &ChatPatch) -> Result<(), WagateError> {
        self.apply_chat_patch(jid, patch);
        Ok(())
    }

    async fn upsert_chats(&self, chats: &[(String, ChatPatch)]) -> Result<(), WagateError> {
        for (jid, patch) in chats {
            self.apply_chat_patch(jid, patch);
        }
        Ok(())
    }

    async fn save_message(&self, msg: &MessageInfo) -> Result<(), WagateError> {
        self.apply_message(msg);
        Ok(())
    }

    async fn save_messages_batch(&self, records: &[IngestRecord]) -> Result<(), WagateError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.batch_failures.lock().unwrap().pop_front() {
            return Err(WagateError::storage(&error));
        }
        {
            let poisoned = self.poisoned.lock().unwrap();
            if let Some(record) = records.iter().find(|r| poisoned.contains(&r.payload.id)) {
                return Err(WagateError::storage(format!(
                    "constraint violation: poisoned record {}",
                    record.payload.id
                )));
            }
        }

        for record in records {
            self.apply_message(&record.payload);
        }
        Ok(())
    }

    async fn list_conversations(
        &self,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<Chat>, WagateError> {
        let chats = self.chats.lock().unwrap();
        let mut listed: Vec<Chat> = chats
            .values()
            .filter(|c| match (before, c.last_message_timestamp) {
                (Some(cursor), Some(ts)) => ts < cursor,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();
        listed.sort_by(|a, b| match (a.last_message_timestamp, b.last_message_timestamp) {
            // Descending by timestamp, chats without one at the end.
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        listed.truncate(limit as usize);
        Ok(listed)
    }

    async fn list_messages(
        &self,
        jid: &str,
        limit: u32,
        before: Option<i64>,
    ) -> Result<Vec<StoredMessage>, WagateError> {
        let messages = self.messages.lock().unwrap();
        let mut listed: Vec<StoredMessage> = messages
            .values()
            .filter(|m| m.from == jid && before.is_none_or(|cursor| m.timestamp < cursor))
            .map(|m| StoredMessage {
                id: m.id.clone(),
                jid: m.from.clone(),
                from_me: m.from_me,
                timestamp: m.timestamp,
                kind: m.kind.clone(),
                push_name: m.push_name.clone(),
                content: m.content.clone(),
            })
            .collect();
        listed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        listed.truncate(limit as usize);
        Ok(listed)
    }

    async fn oldest_message_anchor(
        &self,
        jid: &str,
    ) -> Result<Option<MessageAnchor>, WagateError> {
        let messages = self.messages.lock().unwrap();
        Ok(messages
            .values()
            .filter(|m| m.from == jid)
            .min_by_key(|m| m.timestamp)
            .map(|m| MessageAnchor {
                id: m.id.clone(),
                jid: m.from.clone(),
                from_me: m.from_me,
                timestamp: m.timestamp,
            }))
    }

    async fn ping(&self) -> bool {
        !self.unreachable.load(Ordering::SeqCst)
    }

    async fn list_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn active_webhooks(&self, username: &str) -> Result<Vec<Webhook>, WagateError> {
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .get(username)
            .map(|hooks| hooks.iter().filter(|h| h.is_active).cloned().collect())
            .unwrap_or_default())
    }

    async fn add_webhook(&self, username: &str, hook: &Webhook) -> Result<(), WagateError> {
        let mut webhooks = self.webhooks.lock().unwrap();
        let hooks = webhooks.entry(username.to_string()).or_default();
        hooks.retain(|h| h.id != hook.id);
        hooks.push(hook.clone());
        Ok(())
    }

    async fn remove_webhook(&self, username: &str, id: &str) -> Result<(), WagateError> {
        if let Some(hooks) = self.webhooks.lock().unwrap().get_mut(username) {
            hooks.retain(|h| h.id != id);
        }
        Ok(())
    }

    async fn set_webhook_active(
        &self,
        username: &str,
        id: &str,
        active: bool,
    ) -> Result<(), WagateError> {
        if let Some(hooks) = self.webhooks.lock().unwrap().get_mut(username) {
            for hook in hooks.iter_mut().filter(|h| h.id == id) {
                hook.is_active = active;
            }
        }
        Ok(())
    }

    async fn excluded_numbers(&self, username: &str) -> Result<Vec<String>, WagateError> {
        let mut numbers: Vec<String> = self
            .exclusions
            .lock()
            .unwrap()
            .get(username)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        numbers.sort();
        Ok(numbers)
    }

    async fn add_excluded_number(&self, username: &str, number: &str) -> Result<(), WagateError> {
        self.exclusions
            .lock()
            .unwrap()
            .entry(username.to_string())
            .or_default()
            .insert(number.to_string());
        Ok(())
    }

    async fn remove_excluded_number(
        &self,
        username: &str,
        number: &str,
    ) -> Result<(), WagateError> {
        if let Some(set) = self.exclusions.lock().unwrap().get_mut(username) {
            set.remove(number);
        }
        Ok(())
    }

    async fn business_info(&self, username: &str) -> Result<Option<BusinessInfo>, WagateError> {
        Ok(self.business.lock().unwrap().get(username).cloned())
    }

    async fn put_business_info(
        &self,
        username: &str,
        info: &BusinessInfo,
    ) -> Result<(), WagateError> {
        self.business
            .lock()
            .unwrap()
            .insert(username.to_string(), info.clone());
        Ok(())
    }
}
