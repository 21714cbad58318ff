// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-memory handoff from producers to the worker pool.
//!
//! FIFO, capacity-limited, multi-producer / multi-consumer. Producers use
//! the non-blocking [`BoundedQueue::try_enqueue`]; the queue is a
//! best-effort fast path and the durable log remains the source of truth.
//! Consumers share one receiver behind a mutex; order across consumers is
//! unspecified.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use wagate_core::IngestRecord;

/// Capacity-limited FIFO queue of ingestion records.
pub struct BoundedQueue {
    tx: mpsc::Sender<IngestRecord>,
    rx: Mutex<mpsc::Receiver<IngestRecord>>,
}

impl BoundedQueue {
    /// Creates a queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Non-blocking enqueue. Returns false when the queue is full or closed.
    pub fn try_enqueue(&self, item: IngestRecord) -> bool {
        self.tx.try_send(item).is_ok()
    }

    /// Non-blocking enqueue that hands the item back when it is not accepted.
    pub fn try_enqueue_reclaim(&self, item: IngestRecord) -> Result<(), IngestRecord> {
        self.tx.try_send(item).map_err(|err| match err {
            mpsc::error::TrySendError::Full(item)
            | mpsc::error::TrySendError::Closed(item) => item,
        })
    }

    /// Awaits the next item in enqueue order.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<IngestRecord> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Awaits the next item for at most `timeout`.
    ///
    /// Returns `None` on timeout or when the queue is closed and drained.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<IngestRecord> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Closes the queue: further enqueues fail, buffered items still drain.
    pub async fn close(&self) {
        let mut rx = self.rx.lock().await;
        rx.close();
    }

    /// Number of items currently buffered.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}
