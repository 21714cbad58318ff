// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolved runtime settings for tenant sessions.

use std::time::Duration;

use wagate_config::SessionConfig;

/// Session timing and budget knobs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Consecutive reconnect failures before the session is wiped.
    pub max_reconnect_attempts: u32,
    /// How long `wait_for_qr` waits before resolving empty.
    pub qr_timeout: Duration,
    pub history_page_size: u32,
    pub history_max_pages: u32,
    /// Wait after a history request for inbound events to be persisted.
    pub history_settle: Duration,
    /// Delay between per-chat backfill passes.
    pub history_chat_delay: Duration,
}

impl SessionSettings {
    pub fn from_config(cfg: &SessionConfig) -> Self {
        Self {
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            qr_timeout: Duration::from_secs(cfg.qr_timeout_secs),
            history_page_size: cfg.history_page_size,
            history_max_pages: cfg.history_max_pages,
            history_settle: Duration::from_millis(cfg.history_settle_ms),
            history_chat_delay: Duration::from_millis(cfg.history_chat_delay_ms),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}
