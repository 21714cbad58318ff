// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The replay loop: tails the durable log from the checkpoint and feeds the
//! bounded queue.
//!
//! This is the single authoritative path from durable storage to the
//! persisters. The producer's direct enqueue is only an optimization; a
//! record that missed the queue is picked up here. Corrupted lines are
//! counted, skipped, and checkpointed past; they never stop the loop. A
//! checkpoint larger than the log (rotation, truncation) resets to 0 and
//! relies on store idempotency to absorb the re-delivery.

use std::sync::Arc;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use wagate_core::IngestRecord;

use crate::checkpoint::Checkpointer;
use crate::journal::Journal;
use crate::metrics::Metrics;
use crate::queue::BoundedQueue;
use crate::service::IngestSettings;

/// Long-running journal tailer.
pub(crate) struct ReplayLoop {
    pub journal: Arc<Journal>,
    pub checkpoint: Checkpointer,
    pub queue: Arc<BoundedQueue>,
    pub metrics: Arc<Metrics>,
    pub settings: Arc<IngestSettings>,
    pub cancel: CancellationToken,
}

impl ReplayLoop {
    pub async fn run(self) {
        let mut offset = self.checkpoint.load().await;
        let size = self.journal.size_bytes().await.unwrap_or(0);
        if offset > size {
            warn!(
                offset,
                size, "checkpoint past end of log, resetting to 0 and re-delivering"
            );
            offset = 0;
            self.save_checkpoint(offset).await;
        }
        self.metrics.set_checkpoint_offset(offset);
        info!(offset, "replay loop started");

        let mut reader = match self.journal.open_reader(offset).await {
            Ok(reader) => reader,
            Err(err) => {
                warn!(error = %err, "replay cannot open journal, stopping");
                return;
            }
        };
        let mut since_checkpoint: u64 = 0;
        let mut line = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            line.clear();
            let read = match reader.read_until(b'\n', &mut line).await {
                Ok(read) => read,
                Err(err) => {
                    warn!(error = %err, offset, "journal read failed, retrying");
                    tokio::time::sleep(self.settings.eof_poll).await;
                    continue;
                }
            };

            // EOF, or a partial tail line without its newline yet: hold the
            // offset, checkpoint what was consumed, and poll for growth.
            if read == 0 || line.last() != Some(&b'\n') {
                if since_checkpoint > 0 {
                    self.save_checkpoint(offset).await;
                    since_checkpoint = 0;
                }
                if self.sleep_cancelled(self.settings.eof_poll).await {
                    break;
                }
                let size = self.journal.size_bytes().await.unwrap_or(offset);
                if size <= offset {
                    if self.sleep_cancelled(self.settings.idle_poll).await {
                        break;
                    }
                }
                // Re-seek: the reader may have consumed a partial line.
                reader = match self.journal.open_reader(offset).await {
                    Ok(reader) => reader,
                    Err(err) => {
                        warn!(error = %err, "replay cannot reopen journal, stopping");
                        break;
                    }
                };
                continue;
            }

            let line_len = read as u64;
            match serde_json::from_slice::<IngestRecord>(&line) {
                Ok(record) => {
                    if !self.enqueue_blocking(record).await {
                        break; // cancelled while the queue was full
                    }
                    offset += line_len;
                    since_checkpoint += 1;
                    if since_checkpoint >= self.settings.checkpoint_interval {
                        self.save_checkpoint(offset).await;
                        since_checkpoint = 0;
                    }
                }
                Err(err) => {
                    self.metrics.incr_replay_parse_error();
                    self.metrics.record_error("replay_parse_error");
                    warn!(offset, error = %err, "skipping unparseable journal line");
                    offset += line_len;
                    self.save_checkpoint(offset).await;
                    since_checkpoint = 0;
                }
            }
        }

        self.save_checkpoint(offset).await;
        info!(offset, "replay loop stopped");
    }

    /// Enqueues with a bounded poll while the queue is full. Returns false
    /// when cancelled before the record was accepted.
    async fn enqueue_blocking(&self, mut record: IngestRecord) -> bool {
        loop {
            match self.queue.try_enqueue_reclaim(record) {
                Ok(()) => {
                    self.metrics.incr_enqueued();
                    return true;
                }
                Err(returned) => {
                    record = returned;
                    if self.sleep_cancelled(self.settings.enqueue_poll).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn save_checkpoint(&self, offset: u64) {
        if let Err(err) = self.checkpoint.save(offset).await {
            warn!(offset, error = %err, "checkpoint save failed");
        } else {
            self.metrics.set_checkpoint_offset(offset);
            debug!(offset, "checkpoint advanced");
        }
    }

    /// Sleeps unless cancelled first; true means cancelled.
    async fn sleep_cancelled(&self, duration: std::time::Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => false,
            () = self.cancel.cancelled() => true,
        }
    }
}
