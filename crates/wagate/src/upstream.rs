// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Placeholder upstream connector.
//!
//! The protocol bridge to the chat network is an external integration
//! linked at deployment time. Until one is wired into the composition
//! root, session connect attempts fail with a clear error while the rest
//! of the gateway (ingestion, replay, webhooks, ops surface) runs
//! normally.

use std::path::Path;

use async_trait::async_trait;

use wagate_core::{UpstreamConnection, UpstreamConnector, WagateError};

/// Connector used when no protocol bridge is configured.
pub struct UnconfiguredConnector;

#[async_trait]
impl UpstreamConnector for UnconfiguredConnector {
    async fn connect(&self, _session_dir: &Path) -> Result<UpstreamConnection, WagateError> {
        Err(WagateError::upstream(
            "no upstream connector configured; link a protocol bridge into the composition root",
        ))
    }

    fn has_credentials(&self, session_dir: &Path) -> bool {
        session_dir.join("creds.json").exists()
    }
}
