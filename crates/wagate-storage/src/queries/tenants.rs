// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant configuration: webhooks, exclusion lists, business info.

use rusqlite::params;
use wagate_core::tenant::{BusinessInfo, Webhook};
use wagate_core::WagateError;

use crate::database::{map_tr_err, Database};

fn webhook_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Webhook> {
    Ok(Webhook {
        id: row.get(0)?,
        url: row.get(1)?,
        name: row.get(2)?,
        secret: row.get(3)?,
        is_active: row.get(4)?,
    })
}

/// Lists all webhooks of a tenant.
pub async fn list_webhooks(db: &Database, username: &str) -> Result<Vec<Webhook>, WagateError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, name, secret, is_active
                 FROM webhooks WHERE username = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![username], webhook_from_row)?;
            let mut hooks = Vec::new();
            for row in rows {
                hooks.push(row?);
            }
            Ok(hooks)
        })
        .await
        .map_err(map_tr_err)
}

/// Lists only the active webhooks of a tenant.
pub async fn active_webhooks(db: &Database, username: &str) -> Result<Vec<Webhook>, WagateError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, name, secret, is_active
                 FROM webhooks WHERE username = ?1 AND is_active = 1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![username], webhook_from_row)?;
            let mut hooks = Vec::new();
            for row in rows {
                hooks.push(row?);
            }
            Ok(hooks)
        })
        .await
        .map_err(map_tr_err)
}

/// Adds (or replaces) a webhook destination.
pub async fn add_webhook(db: &Database, username: &str, hook: &Webhook) -> Result<(), WagateError> {
    let username = username.to_string();
    let hook = hook.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO webhooks (id, username, url, name, secret, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![hook.id, username, hook.url, hook.name, hook.secret, hook.is_active],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Removes a webhook destination.
pub async fn remove_webhook(db: &Database, username: &str, id: &str) -> Result<(), WagateError> {
    let username = username.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM webhooks WHERE username = ?1 AND id = ?2",
                params![username, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Toggles a webhook's active flag.
pub async fn set_webhook_active(
    db: &Database,
    username: &str,
    id: &str,
    active: bool,
) -> Result<(), WagateError> {
    let username = username.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhooks SET is_active = ?3 WHERE username = ?1 AND id = ?2",
                params![username, id, active],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Lists a tenant's excluded numbers (E.164 strings).
pub async fn excluded_numbers(db: &Database, username: &str) -> Result<Vec<String>, WagateError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT number FROM excluded_numbers WHERE username = ?1 ORDER BY number",
            )?;
            let rows = stmt.query_map(params![username], |row| row.get(0))?;
            let mut numbers = Vec::new();
            for row in rows {
                numbers.push(row?);
            }
            Ok(numbers)
        })
        .await
        .map_err(map_tr_err)
}

/// Adds a number to a tenant's exclusion list.
pub async fn add_excluded_number(
    db: &Database,
    username: &str,
    number: &str,
) -> Result<(), WagateError> {
    let username = username.to_string();
    let number = number.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO excluded_numbers (username, number) VALUES (?1, ?2)",
                params![username, number],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Removes a number from a tenant's exclusion list.
pub async fn remove_excluded_number(
    db: &Database,
    username: &str,
    number: &str,
) -> Result<(), WagateError> {
    let username = username.to_string();
    let number = number.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM excluded_numbers WHERE username = ?1 AND number = ?2",
                params![username, number],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetches a tenant's business info, if stored.
pub async fn business_info(
    db: &Database,
    username: &str,
) -> Result<Option<BusinessInfo>, WagateError> {
    let username = username.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT name, working_hours, location_url, shipping_details,
                        instagram_url, website_url, mobile_numbers, last_updated
                 FROM business_info WHERE username = ?1",
            )?;
            let result = stmt.query_row(params![username], |row| {
                let mobile_numbers_json: String = row.get(6)?;
                Ok((
                    BusinessInfo {
                        name: row.get(0)?,
                        working_hours: row.get(1)?,
                        location_url: row.get(2)?,
                        shipping_details: row.get(3)?,
                        instagram_url: row.get(4)?,
                        website_url: row.get(5)?,
                        mobile_numbers: Vec::new(),
                        last_updated: row.get(7)?,
                    },
                    mobile_numbers_json,
                ))
            });
            match result {
                Ok((mut info, numbers_json)) => {
                    info.mobile_numbers = serde_json::from_str(&numbers_json)
                        .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                    Ok(Some(info))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Stores (replaces) a tenant's business info.
pub async fn put_business_info(
    db: &Database,
    username: &str,
    info: &BusinessInfo,
) -> Result<(), WagateError> {
    let username = username.to_string();
    let info = info.clone();
    let mobile_numbers = serde_json::to_string(&info.mobile_numbers)
        .map_err(|e| WagateError::Internal(format!("mobile numbers serialization failed: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO business_info
                     (username, name, working_hours, location_url, shipping_details,
                      instagram_url, website_url, mobile_numbers, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    username,
                    info.name,
                    info.working_hours,
                    info.location_url,
                    info.shipping_details,
                    info.instagram_url,
                    info.website_url,
                    mobile_numbers,
                    info.last_updated,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
