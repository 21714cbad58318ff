// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant webhook fan-out.
//!
//! `notify` fetches the tenant's active destinations, applies exclusion
//! filtering for `message.received`, and delivers to all destinations in
//! parallel with all-settled semantics: a failed destination is logged and
//! never cancels its peers. There is no retry at this layer; the durable
//! log is the source of truth for re-delivery decisions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use tracing::{debug, error, info, warn};

use wagate_core::model::jid_to_e164;
use wagate_core::tenant::Webhook;
use wagate_core::{MessageStore, Notifier, WagateError};

use crate::signature::signature_header;

/// Event name subject to exclusion filtering.
pub const EVENT_MESSAGE_RECEIVED: &str = "message.received";

/// HTTP dispatcher for tenant webhooks.
pub struct WebhookDispatcher {
    client: Client,
    store: Arc<dyn MessageStore>,
}

impl WebhookDispatcher {
    /// Builds the dispatcher with a rustls HTTP client.
    pub fn new(store: Arc<dyn MessageStore>) -> Result<Self, WagateError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WagateError::Webhook {
                message: "failed to build http client".to_string(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { client, store })
    }

    /// Whether the sender of a `message.received` payload is excluded.
    async fn is_excluded(&self, username: &str, data: &serde_json::Value) -> bool {
        let Some(from) = data
            .get("message")
            .and_then(|m| m.get("from"))
            .and_then(|f| f.as_str())
        else {
            return false;
        };
        let Some(number) = jid_to_e164(from) else {
            return false;
        };
        match self.store.excluded_numbers(username).await {
            Ok(numbers) => numbers.iter().any(|n| n == &number),
            Err(err) => {
                warn!(username, error = %err, "exclusion lookup failed, delivering anyway");
                false
            }
        }
    }

    async fn deliver_one(
        &self,
        username: &str,
        event: &str,
        timestamp: &str,
        data: &serde_json::Value,
        hook: &Webhook,
    ) {
        let payload = serde_json::json!({
            "event": event,
            "username": username,
            "timestamp": timestamp,
            "data": data,
            "webhook": {
                "id": hook.id,
                "name": hook.name,
                "url": hook.url,
            },
        });
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(err) => {
                error!(username, webhook_id = %hook.id, error = %err, "payload serialization failed");
                return;
            }
        };
        let signature = signature_header(&body, &hook.secret);
        let webhook_name = hook.name.clone().unwrap_or_default();

        let result = self
            .client
            .post(&hook.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Baileys-API-Webhook")
            .header("X-Event-Type", event)
            .header("X-Username", username)
            .header("X-Webhook-Id", &hook.id)
            .header("X-Webhook-Name", &webhook_name)
            .header("X-Signature", signature)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(
                    username,
                    event,
                    webhook_id = %hook.id,
                    webhook_name = %webhook_name,
                    "webhook delivered"
                );
            }
            Ok(response) => {
                warn!(
                    username,
                    event,
                    webhook_id = %hook.id,
                    status = %response.status(),
                    "webhook delivery failed"
                );
            }
            Err(err) => {
                warn!(
                    username,
                    event,
                    webhook_id = %hook.id,
                    error = %err,
                    "webhook request failed"
                );
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookDispatcher {
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value) {
        let hooks = match self.store.active_webhooks(username).await {
            Ok(hooks) => hooks,
            Err(err) => {
                error!(username, event, error = %err, "active webhook lookup failed");
                return;
            }
        };
        if hooks.is_empty() {
            return;
        }

        if event == EVENT_MESSAGE_RECEIVED && self.is_excluded(username, &data).await {
            debug!(username, "sender excluded, skipping webhook delivery");
            return;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let deliveries = hooks
            .iter()
            .map(|hook| self.deliver_one(username, event, &timestamp, &data, hook));
        futures::future::join_all(deliveries).await;
    }
}
