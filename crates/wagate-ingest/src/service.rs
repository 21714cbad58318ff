// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition of the ingestion pipeline: journal, queue, worker pool,
//! replay loop, and metrics, behind one `enqueue_message` entry point.
//!
//! Acceptance is anchored on durability: the producer gets `Accepted` as
//! soon as the journal fsync completes, regardless of queue pressure or
//! downstream persistence. A full queue only delays a record until the
//! replay loop re-delivers it from the log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::task::JoinHandle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use async_trait::async_trait;
use wagate_config::IngestConfig;
use wagate_core::{IngestRecord, IngestSink, MessageInfo, MessageStore, WagateError};

use crate::checkpoint::Checkpointer;
use crate::dlq::DeadLetterLog;
use crate::journal::Journal;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::queue::BoundedQueue;
use crate::replay::ReplayLoop;
use crate::worker::Worker;

/// Resolved runtime settings for the pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub log_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub dlq_path: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_max_wait: Duration,
    pub workers: usize,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_max_horizon_ms: u64,
    pub checkpoint_interval: u64,
    pub enqueue_poll: Duration,
    pub eof_poll: Duration,
    pub idle_poll: Duration,
    pub ready_max_queue_depth: usize,
}

impl IngestSettings {
    /// Resolves settings from the config section and the data directory.
    pub fn from_config(cfg: &IngestConfig, data_dir: &str) -> Self {
        Self {
            log_path: cfg.resolved_log_path(data_dir),
            checkpoint_path: cfg.resolved_checkpoint_path(data_dir),
            dlq_path: cfg.resolved_dlq_path(data_dir),
            queue_capacity: cfg.queue_capacity,
            batch_size: cfg.batch_size,
            batch_max_wait: Duration::from_millis(cfg.batch_max_wait_ms),
            workers: cfg.workers,
            retry_base_ms: cfg.retry_base_ms,
            retry_max_ms: cfg.retry_max_ms,
            retry_max_attempts: cfg.retry_max_attempts,
            retry_max_horizon_ms: cfg.retry_max_horizon_ms,
            checkpoint_interval: cfg.checkpoint_interval,
            enqueue_poll: Duration::from_millis(cfg.enqueue_poll_ms),
            eof_poll: Duration::from_millis(cfg.eof_poll_ms),
            idle_poll: Duration::from_millis(cfg.idle_poll_ms),
            ready_max_queue_depth: cfg.resolved_ready_max_queue_depth(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default(), "./data")
    }
}

/// Why a message was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    InvalidMessage,
    LogAppendFailed,
}

/// Producer-visible result of `enqueue_message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// The record is durable in the journal.
    Accepted,
    Rejected(RejectReason),
}

impl Acceptance {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Acceptance::Accepted)
    }
}

/// Health report consumed by the REST collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub ok: bool,
    pub queue_depth: usize,
    pub counters: crate::metrics::Counters,
}

/// Readiness report consumed by the REST collaborator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyReport {
    pub ready: bool,
    pub queue_depth: usize,
    pub threshold: usize,
}

/// The ingestion pipeline.
pub struct IngestService {
    settings: Arc<IngestSettings>,
    journal: Arc<Journal>,
    queue: Arc<BoundedQueue>,
    dlq: Arc<DeadLetterLog>,
    metrics: Arc<Metrics>,
    store: Arc<dyn MessageStore>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl IngestService {
    /// Opens the journal and dead-letter log and builds the pipeline.
    ///
    /// Call [`IngestService::spawn`] afterwards to start workers and replay.
    pub async fn new(
        settings: IngestSettings,
        store: Arc<dyn MessageStore>,
    ) -> Result<Arc<Self>, WagateError> {
        let journal = Arc::new(Journal::open(&settings.log_path).await?);
        let dlq = Arc::new(DeadLetterLog::open(&settings.dlq_path).await?);
        let queue = Arc::new(BoundedQueue::new(settings.queue_capacity));

        Ok(Arc::new(Self {
            settings: Arc::new(settings),
            journal,
            queue,
            dlq,
            metrics: Arc::new(Metrics::new()),
            store,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Starts the worker pool and the replay loop.
    pub async fn spawn(&self) {
        let mut tasks = self.tasks.lock().await;

        for id in 0..self.settings.workers {
            let worker = Worker {
                id,
                queue: self.queue.clone(),
                store: self.store.clone(),
                dlq: self.dlq.clone(),
                metrics: self.metrics.clone(),
                settings: self.settings.clone(),
                cancel: self.cancel.clone(),
            };
            tasks.push(tokio::spawn(worker.run()));
        }

        let replay = ReplayLoop {
            journal: self.journal.clone(),
            checkpoint: Checkpointer::new(&self.settings.checkpoint_path),
            queue: self.queue.clone(),
            metrics: self.metrics.clone(),
            settings: self.settings.clone(),
            cancel: self.cancel.clone(),
        };
        tasks.push(tokio::spawn(replay.run()));

        info!(
            workers = self.settings.workers,
            queue_capacity = self.settings.queue_capacity,
            log = %self.settings.log_path.display(),
            "ingestion pipeline started"
        );
    }

    /// Validates, journals (fsync), and best-effort enqueues one message.
    pub async fn enqueue_message(&self, msg: MessageInfo) -> Acceptance {
        self.metrics.incr_received();

        if msg.id.is_empty() || msg.from.is_empty() {
            self.metrics.record_error("invalid_message");
            return Acceptance::Rejected(RejectReason::InvalidMessage);
        }

        let record = IngestRecord::new(msg, chrono::Utc::now().timestamp_millis());
        if let Err(err) = self.journal.append(&record).await {
            self.metrics.incr_log_append_failed();
            self.metrics.record_error("log_append_failed");
            error!(
                correlation_id = %record.correlation_id,
                error = %err,
                "journal append failed, rejecting message"
            );
            return Acceptance::Rejected(RejectReason::LogAppendFailed);
        }

        // Fast path only; the replay loop delivers from the log if this misses.
        if self.queue.try_enqueue(record) {
            self.metrics.incr_enqueued();
        }

        Acceptance::Accepted
    }

    /// Current queue depth.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Point-in-time metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.queue.depth())
    }

    /// Health: the store is reachable.
    pub async fn health(&self) -> HealthReport {
        let snap = self.snapshot();
        HealthReport {
            ok: self.store.ping().await,
            queue_depth: snap.queue_depth,
            counters: snap.counters,
        }
    }

    /// Readiness: the store is reachable and the queue is below threshold.
    pub async fn ready(&self) -> ReadyReport {
        let depth = self.queue.depth();
        let threshold = self.settings.ready_max_queue_depth;
        ReadyReport {
            ready: self.store.ping().await && depth < threshold,
            queue_depth: depth,
            threshold,
        }
    }

    /// Graceful shutdown: closes the queue, lets workers drain their current
    /// batch within the grace period, then cancels the replay loop.
    pub async fn shutdown(&self, grace: Duration) {
        info!("ingestion pipeline shutting down");
        self.queue.close().await;
        tokio::time::sleep(grace).await;
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                error!(error = %err, "pipeline task join failed");
            }
        }
        info!("ingestion pipeline stopped");
    }
}

#[async_trait]
impl IngestSink for IngestService {
    async fn submit(&self, msg: MessageInfo) -> bool {
        self.enqueue_message(msg).await.is_accepted()
    }
}
