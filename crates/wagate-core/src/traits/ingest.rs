// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion seam.
//!
//! Sessions hand normalized messages to an [`IngestSink`] and move on; the
//! pipeline behind it owns durability, retry, and dead-lettering.

use async_trait::async_trait;

use crate::model::MessageInfo;

/// Entry point of the durable ingestion pipeline.
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Submits a message. Returns true once the record is durably accepted.
    async fn submit(&self, msg: MessageInfo) -> bool;
}
