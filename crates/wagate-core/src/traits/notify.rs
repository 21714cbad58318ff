// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook notification seam.
//!
//! Sessions call a [`Notifier`] instead of naming the dispatcher (or the
//! manager) directly. Delivery failures are the notifier's problem: the
//! call never fails and never blocks session progress on a slow consumer.

use async_trait::async_trait;

/// Fan-out of a tenant event to its configured webhook destinations.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `event` with `data` to every active destination of `username`.
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value);
}

/// A notifier that drops every event. Useful in tests and for tenants
/// without webhook configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _username: &str, _event: &str, _data: serde_json::Value) {}
}
