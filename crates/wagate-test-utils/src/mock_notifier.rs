// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capturing [`Notifier`] for webhook assertions in session tests.

use std::sync::Mutex;

use async_trait::async_trait;

use wagate_core::Notifier;

/// One captured notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub username: String,
    pub event: String,
    pub data: serde_json::Value,
}

/// Notifier that records every event instead of delivering it.
#[derive(Default)]
pub struct MockNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured notifications in emission order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Captured notifications of one event type.
    pub fn of_event(&self, event: &str) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.event == event)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, username: &str, event: &str, data: serde_json::Value) {
        self.notifications.lock().unwrap().push(Notification {
            username: username.to_string(),
            event: event.to_string(),
            data,
        });
    }
}
