// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence and listing.
//!
//! Every message write upserts its chat row first, inside the same
//! transaction, so the chat-before-message invariant holds even when a
//! batch fails midway. Message ids are primary keys; duplicate inserts
//! are ignored.

use rusqlite::params;
use wagate_core::model::{
    ChatPatch, IngestRecord, MessageAnchor, MessageContent, MessageInfo, StoredMessage,
};
use wagate_core::WagateError;

use crate::database::{map_tr_err, Database};
use crate::queries::chats;

/// The chat-row update implied by persisting a message.
fn chat_patch_for(msg: &MessageInfo) -> ChatPatch {
    ChatPatch {
        last_message_timestamp: Some(msg.timestamp),
        last_message_text: preview_text(&msg.content),
        ..ChatPatch::default()
    }
}

/// Short text shown in conversation listings.
fn preview_text(content: &MessageContent) -> Option<String> {
    match content {
        MessageContent::Text { text, .. } => Some(text.clone()),
        MessageContent::Image(media)
        | MessageContent::Video(media)
        | MessageContent::Audio(media)
        | MessageContent::Document(media)
        | MessageContent::Sticker(media) => media.caption.clone(),
        MessageContent::Location { name, .. } => name.clone(),
        MessageContent::Contact { display_name, .. } => Some(display_name.clone()),
        MessageContent::Unhandled => None,
    }
}

/// A message flattened into column values ahead of the blocking closure.
struct MessageRow {
    id: String,
    jid: String,
    from_me: bool,
    timestamp: i64,
    kind: String,
    push_name: Option<String>,
    content: String,
    patch: ChatPatch,
}

fn to_row(msg: &MessageInfo) -> Result<MessageRow, WagateError> {
    let content = serde_json::to_string(&msg.content)
        .map_err(|e| WagateError::Internal(format!("content serialization failed: {e}")))?;
    Ok(MessageRow {
        id: msg.id.clone(),
        jid: msg.from.clone(),
        from_me: msg.from_me,
        timestamp: msg.timestamp,
        kind: msg.kind.clone(),
        push_name: msg.push_name.clone(),
        content,
        patch: chat_patch_for(msg),
    })
}

fn apply_insert(conn: &rusqlite::Connection, row: &MessageRow) -> rusqlite::Result<()> {
    chats::apply_upsert(conn, &row.jid, &row.patch)?;
    conn.execute(
        "INSERT OR IGNORE INTO messages (id, jid, from_me, timestamp, type, push_name, content)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.id,
            row.jid,
            row.from_me,
            row.timestamp,
            row.kind,
            row.push_name,
            row.content,
        ],
    )?;
    Ok(())
}

/// Persists one message (chat upsert first, idempotent insert).
pub async fn save_message(db: &Database, msg: &MessageInfo) -> Result<(), WagateError> {
    let row = to_row(msg)?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            apply_insert(&tx, &row)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Persists a batch of ingestion records in one transaction.
pub async fn save_messages_batch(
    db: &Database,
    records: &[IngestRecord],
) -> Result<(), WagateError> {
    let rows = records
        .iter()
        .map(|r| to_row(&r.payload))
        .collect::<Result<Vec<_>, _>>()?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for row in &rows {
                apply_insert(&tx, row)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Lists a chat's messages descending by timestamp.
///
/// `before` is an exclusive cursor.
pub async fn list_messages(
    db: &Database,
    jid: &str,
    limit: u32,
    before: Option<i64>,
) -> Result<Vec<StoredMessage>, WagateError> {
    let jid = jid.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, jid, from_me, timestamp, type, push_name, content
                 FROM messages
                 WHERE jid = ?1 AND (?2 IS NULL OR timestamp < ?2)
                 ORDER BY timestamp DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![jid, before, limit], |row| {
                let content_json: String = row.get(6)?;
                Ok((
                    StoredMessage {
                        id: row.get(0)?,
                        jid: row.get(1)?,
                        from_me: row.get(2)?,
                        timestamp: row.get(3)?,
                        kind: row.get(4)?,
                        push_name: row.get(5)?,
                        content: MessageContent::Unhandled,
                    },
                    content_json,
                ))
            })?;
            let mut messages = Vec::new();
            for row in rows {
                let (mut msg, content_json) = row?;
                msg.content = serde_json::from_str(&content_json)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                messages.push(msg);
            }
            Ok(messages)
        })
        .await
        .map_err(map_tr_err)
}

/// The oldest stored message of a chat, used as the history-backfill anchor.
pub async fn oldest_message_anchor(
    db: &Database,
    jid: &str,
) -> Result<Option<MessageAnchor>, WagateError> {
    let jid = jid.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, jid, from_me, timestamp
                 FROM messages WHERE jid = ?1
                 ORDER BY timestamp ASC LIMIT 1",
            )?;
            let result = stmt.query_row(params![jid], |row| {
                Ok(MessageAnchor {
                    id: row.get(0)?,
                    jid: row.get(1)?,
                    from_me: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            });
            match result {
                Ok(anchor) => Ok(Some(anchor)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wagate_core::model::idempotency_key;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn text_message(id: &str, jid: &str, timestamp: i64, text: &str) -> MessageInfo {
        MessageInfo {
            id: id.to_string(),
            from: jid.to_string(),
            from_me: false,
            timestamp,
            kind: "conversation".to_string(),
            push_name: Some("Bob".to_string()),
            content: MessageContent::Text {
                text: text.to_string(),
                context_info: None,
            },
        }
    }

    fn record(msg: MessageInfo) -> IngestRecord {
        IngestRecord::new(msg, 1_700_000_000_000)
    }

    #[tokio::test]
    async fn save_message_creates_chat_row_first() {
        let (db, _dir) = setup_db().await;

        let msg = text_message("A1", "1555@s.whatsapp.net", 1_700_000_000, "hi");
        save_message(&db, &msg).await.unwrap();

        let chats = chats::list_conversations(&db, 10, None).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].jid, "1555@s.whatsapp.net");
        assert_eq!(chats[0].last_message_timestamp, Some(1_700_000_000));
        assert_eq!(chats[0].last_message_text.as_deref(), Some("hi"));

        let messages = list_messages(&db, "1555@s.whatsapp.net", 10, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "A1");
        assert_eq!(messages[0].kind, "conversation");
        match &messages[0].content {
            MessageContent::Text { text, .. } => assert_eq!(text, "hi"),
            other => panic!("expected text content, got {other:?}"),
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_message_id_is_a_noop() {
        let (db, _dir) = setup_db().await;

        let msg = text_message("A1", "1555@s.whatsapp.net", 100, "first");
        save_message(&db, &msg).await.unwrap();

        let mut dup = text_message("A1", "1555@s.whatsapp.net", 200, "second");
        dup.push_name = Some("Imposter".to_string());
        save_message(&db, &dup).await.unwrap();

        let messages = list_messages(&db, "1555@s.whatsapp.net", 10, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        match &messages[0].content {
            MessageContent::Text { text, .. } => assert_eq!(text, "first"),
            other => panic!("expected text content, got {other:?}"),
        }

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn batch_persists_all_and_ignores_duplicates() {
        let (db, _dir) = setup_db().await;

        let records: Vec<IngestRecord> = (0..10)
            .map(|i| {
                record(text_message(
                    &format!("M{i}"),
                    "1555@s.whatsapp.net",
                    100 + i,
                    &format!("msg {i}"),
                ))
            })
            .collect();
        save_messages_batch(&db, &records).await.unwrap();
        assert_eq!(records[0].idempotency_key, idempotency_key("M0"));

        // Re-persisting the same batch is absorbed by the primary key.
        save_messages_batch(&db, &records).await.unwrap();

        let messages = list_messages(&db, "1555@s.whatsapp.net", 50, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 10);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_messages_descending_with_cursor() {
        let (db, _dir) = setup_db().await;

        for i in 0..5 {
            save_message(
                &db,
                &text_message(&format!("M{i}"), "j@s.whatsapp.net", 100 + i, "x"),
            )
            .await
            .unwrap();
        }

        let all = list_messages(&db, "j@s.whatsapp.net", 10, None).await.unwrap();
        let timestamps: Vec<i64> = all.iter().map(|m| m.timestamp).collect();
        assert_eq!(timestamps, vec![104, 103, 102, 101, 100]);

        let page = list_messages(&db, "j@s.whatsapp.net", 2, Some(103))
            .await
            .unwrap();
        let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["M2", "M1"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn oldest_anchor_tracks_minimum_timestamp() {
        let (db, _dir) = setup_db().await;

        assert!(oldest_message_anchor(&db, "j@s.whatsapp.net")
            .await
            .unwrap()
            .is_none());

        save_message(&db, &text_message("M2", "j@s.whatsapp.net", 200, "later"))
            .await
            .unwrap();
        save_message(&db, &text_message("M1", "j@s.whatsapp.net", 100, "earlier"))
            .await
            .unwrap();

        let anchor = oldest_message_anchor(&db, "j@s.whatsapp.net")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(anchor.id, "M1");
        assert_eq!(anchor.timestamp, 100);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn media_preview_uses_caption() {
        let (db, _dir) = setup_db().await;

        let msg = MessageInfo {
            id: "IMG1".to_string(),
            from: "1555@s.whatsapp.net".to_string(),
            from_me: false,
            timestamp: 100,
            kind: "imageMessage".to_string(),
            push_name: None,
            content: MessageContent::Image(wagate_core::MediaContent {
                caption: Some("holiday".to_string()),
                mimetype: Some("image/jpeg".to_string()),
                ..Default::default()
            }),
        };
        save_message(&db, &msg).await.unwrap();

        let chats = chats::list_conversations(&db, 10, None).await.unwrap();
        assert_eq!(chats[0].last_message_text.as_deref(), Some("holiday"));

        db.close().await.unwrap();
    }
}
