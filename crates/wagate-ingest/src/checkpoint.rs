// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replay checkpoint: the byte offset up to which journal records have been
//! handed off to the queue.
//!
//! The checkpoint covers delivery-to-queue, not persistence. Replay after a
//! restart re-runs the idempotent upsert for anything past the checkpoint;
//! duplicates are absorbed at the store and poison records end in the DLQ.

use std::path::PathBuf;

use tracing::warn;
use wagate_core::WagateError;

/// Persisted byte offset into the durable log.
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the stored offset. Absent or unparseable files read as 0.
    pub async fn load(&self) -> u64 {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match contents.trim().parse::<u64>() {
                Ok(offset) => offset,
                Err(_) => {
                    warn!(path = %self.path.display(), "unparseable checkpoint, resetting to 0");
                    0
                }
            },
            Err(_) => 0,
        }
    }

    /// Atomically persists `offset` (write to temp, then rename).
    pub async fn save(&self, offset: u64) -> Result<(), WagateError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("offset.tmp");
        tokio::fs::write(&tmp, offset.to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
