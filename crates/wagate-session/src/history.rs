// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History backfill after a reconnect.
//!
//! For each stored conversation the loop requests pages of older messages
//! anchored at the oldest locally stored message, waits for the inbound
//! history events to settle into the store, and stops when the anchor
//! fails to move backward or the page budget runs out. An anchor that
//! stalls because the upstream rate-limited us reads as "no more history";
//! that early stop is accepted.

use std::sync::Arc;

use tracing::{debug, warn};

use wagate_core::{MessageStore, UpstreamSocket};

use crate::settings::SessionSettings;

/// Conversations considered per backfill pass.
const CONVERSATION_PAGE: u32 = 1000;

/// Backfills every stored conversation, spacing chats apart.
pub async fn sync_all(
    username: &str,
    socket: Arc<dyn UpstreamSocket>,
    store: Arc<dyn MessageStore>,
    settings: &SessionSettings,
) {
    let chats = match store.list_conversations(CONVERSATION_PAGE, None).await {
        Ok(chats) => chats,
        Err(err) => {
            warn!(username, error = %err, "history backfill cannot list conversations");
            return;
        }
    };
    debug!(username, chats = chats.len(), "history backfill started");

    for chat in chats {
        sync_chat(username, &chat.jid, socket.clone(), store.clone(), settings).await;
        tokio::time::sleep(settings.history_chat_delay).await;
    }
    debug!(username, "history backfill finished");
}

/// Backfills one chat until the anchor stalls or the page budget runs out.
pub async fn sync_chat(
    username: &str,
    jid: &str,
    socket: Arc<dyn UpstreamSocket>,
    store: Arc<dyn MessageStore>,
    settings: &SessionSettings,
) {
    let Ok(Some(mut anchor)) = store.oldest_message_anchor(jid).await else {
        return;
    };

    for page in 0..settings.history_max_pages {
        if let Err(err) = socket
            .fetch_message_history(settings.history_page_size, &anchor)
            .await
        {
            warn!(username, jid, page, error = %err, "history fetch failed");
            return;
        }

        // Give the inbound history events time to land in the store.
        tokio::time::sleep(settings.history_settle).await;

        let Ok(Some(new_anchor)) = store.oldest_message_anchor(jid).await else {
            return;
        };
        if new_anchor.timestamp >= anchor.timestamp {
            debug!(username, jid, page, "anchor stalled, assuming no more history");
            return;
        }
        anchor = new_anchor;
    }
}
