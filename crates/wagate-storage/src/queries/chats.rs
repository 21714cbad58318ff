// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat upsert and conversation listing.
//!
//! Upserts carry merge semantics: only fields present in the patch
//! overwrite the stored row. `last_message_timestamp` is reconciled by
//! arrival order (COALESCE over the incoming value), so concurrent workers
//! writing the same chat settle on whichever write landed last.

use rusqlite::params;
use wagate_core::model::{is_group_jid, Chat, ChatPatch};
use wagate_core::WagateError;

use crate::database::{map_tr_err, Database};

/// Applies one merge-upsert on an open connection.
///
/// Shared by the chat and message write paths so a message insert can
/// guarantee its chat row inside the same transaction.
pub(crate) fn apply_upsert(
    conn: &rusqlite::Connection,
    jid: &str,
    patch: &ChatPatch,
) -> rusqlite::Result<()> {
    let is_group_insert = patch.is_group.unwrap_or_else(|| is_group_jid(jid));
    conn.execute(
        "INSERT INTO chats (jid, name, is_group, unread_count, last_message_timestamp, last_message_text)
         VALUES (?1, ?2, ?3, COALESCE(?4, 0), ?5, ?6)
         ON CONFLICT(jid) DO UPDATE SET
             name = COALESCE(?2, chats.name),
             is_group = COALESCE(?7, chats.is_group),
             unread_count = COALESCE(?4, chats.unread_count),
             last_message_timestamp = COALESCE(?5, chats.last_message_timestamp),
             last_message_text = COALESCE(?6, chats.last_message_text)",
        params![
            jid,
            patch.name,
            is_group_insert,
            patch.unread_count,
            patch.last_message_timestamp,
            patch.last_message_text,
            patch.is_group,
        ],
    )?;
    Ok(())
}

/// Merge-upserts a single chat.
pub async fn upsert_chat(db: &Database, jid: &str, patch: &ChatPatch) -> Result<(), WagateError> {
    let jid = jid.to_string();
    let patch = patch.clone();
    db.connection()
        .call(move |conn| {
            apply_upsert(conn, &jid, &patch)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Merge-upserts a set of chats in one transaction.
pub async fn upsert_chats(db: &Database, chats: &[(String, ChatPatch)]) -> Result<(), WagateError> {
    let chats = chats.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for (jid, patch) in &chats {
                apply_upsert(&tx, jid, patch)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Lists chats descending by `last_message_timestamp`, nulls last.
///
/// `before` is an exclusive cursor; rows at or after it are skipped.
pub async fn list_conversations(
    db: &Database,
    limit: u32,
    before: Option<i64>,
) -> Result<Vec<Chat>, WagateError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT jid, name, is_group, unread_count, last_message_timestamp, last_message_text
                 FROM chats
                 WHERE ?1 IS NULL OR last_message_timestamp < ?1
                 ORDER BY last_message_timestamp DESC NULLS LAST
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![before, limit], |row| {
                Ok(Chat {
                    jid: row.get(0)?,
                    name: row.get(1)?,
                    is_group: row.get(2)?,
                    unread_count: row.get(3)?,
                    last_message_timestamp: row.get(4)?,
                    last_message_text: row.get(5)?,
                })
            })?;
            let mut chats = Vec::new();
            for row in rows {
                chats.push(row?);
            }
            Ok(chats)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn upsert_merges_only_present_fields() {
        let (db, _dir) = setup_db().await;

        let full = ChatPatch {
            name: Some("Bob".to_string()),
            last_message_timestamp: Some(100),
            last_message_text: Some("hello".to_string()),
            ..ChatPatch::default()
        };
        upsert_chat(&db, "1555@s.whatsapp.net", &full).await.unwrap();

        // A patch without a name must not clear the stored one.
        let partial = ChatPatch {
            last_message_timestamp: Some(200),
            ..ChatPatch::default()
        };
        upsert_chat(&db, "1555@s.whatsapp.net", &partial)
            .await
            .unwrap();

        let chats = list_conversations(&db, 10, None).await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name.as_deref(), Some("Bob"));
        assert_eq!(chats[0].last_message_timestamp, Some(200));
        assert_eq!(chats[0].last_message_text.as_deref(), Some("hello"));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn is_group_derived_from_jid_suffix() {
        let (db, _dir) = setup_db().await;

        upsert_chat(&db, "123-456@g.us", &ChatPatch::default())
            .await
            .unwrap();
        upsert_chat(&db, "1555@s.whatsapp.net", &ChatPatch::default())
            .await
            .unwrap();

        let chats = list_conversations(&db, 10, None).await.unwrap();
        let group = chats.iter().find(|c| c.jid == "123-456@g.us").unwrap();
        let user = chats.iter().find(|c| c.jid == "1555@s.whatsapp.net").unwrap();
        assert!(group.is_group);
        assert!(!user.is_group);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conversations_order_descending_with_nulls_last() {
        let (db, _dir) = setup_db().await;

        for (jid, ts) in [("a@s.whatsapp.net", Some(100)), ("b@s.whatsapp.net", Some(300)), ("c@s.whatsapp.net", None), ("d@s.whatsapp.net", Some(200))] {
            let patch = ChatPatch {
                last_message_timestamp: ts,
                ..ChatPatch::default()
            };
            upsert_chat(&db, jid, &patch).await.unwrap();
        }

        let chats = list_conversations(&db, 10, None).await.unwrap();
        let jids: Vec<&str> = chats.iter().map(|c| c.jid.as_str()).collect();
        assert_eq!(
            jids,
            vec!["b@s.whatsapp.net", "d@s.whatsapp.net", "a@s.whatsapp.net", "c@s.whatsapp.net"]
        );

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conversations_cursor_is_strictly_less_than() {
        let (db, _dir) = setup_db().await;

        for (jid, ts) in [("a@s.whatsapp.net", 100), ("b@s.whatsapp.net", 300), ("d@s.whatsapp.net", 200)] {
            let patch = ChatPatch {
                last_message_timestamp: Some(ts),
                ..ChatPatch::default()
            };
            upsert_chat(&db, jid, &patch).await.unwrap();
        }

        let page = list_conversations(&db, 10, Some(300)).await.unwrap();
        let jids: Vec<&str> = page.iter().map(|c| c.jid.as_str()).collect();
        assert_eq!(jids, vec!["d@s.whatsapp.net", "a@s.whatsapp.net"]);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn bulk_upsert_is_transactional() {
        let (db, _dir) = setup_db().await;

        let chats = vec![
            (
                "a@s.whatsapp.net".to_string(),
                ChatPatch::named("Alice"),
            ),
            (
                "b@s.whatsapp.net".to_string(),
                ChatPatch::named("Bob"),
            ),
        ];
        upsert_chats(&db, &chats).await.unwrap();

        let listed = list_conversations(&db, 10, None).await.unwrap();
        assert_eq!(listed.len(), 2);

        db.close().await.unwrap();
    }
}
