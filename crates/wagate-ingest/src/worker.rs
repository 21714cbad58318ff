// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batching persister workers with split-on-failure isolation.
//!
//! Each worker accumulates records from the shared queue into a batch,
//! flushing at the size bound or when the oldest in-batch record ages past
//! the wait bound. A failed batch is bisected until the poisoned record is
//! isolated; transient failures are retried per record with jittered
//! backoff until the attempt or horizon budget runs out, after which the
//! record is dead-lettered with its diagnostic error.

use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use wagate_core::{IngestRecord, MessageStore};

use crate::dlq::DeadLetterLog;
use crate::metrics::Metrics;
use crate::queue::BoundedQueue;
use crate::retry::{backoff_delay, is_transient};
use crate::service::IngestSettings;

/// Recursion bound for batch bisection.
const MAX_SPLIT_DEPTH: u32 = 20;

/// One persister worker. Runs until the queue closes and drains.
pub(crate) struct Worker {
    pub id: usize,
    pub queue: Arc<BoundedQueue>,
    pub store: Arc<dyn MessageStore>,
    pub dlq: Arc<DeadLetterLog>,
    pub metrics: Arc<Metrics>,
    pub settings: Arc<IngestSettings>,
    pub cancel: CancellationToken,
}

impl Worker {
    pub async fn run(self) {
        debug!(worker = self.id, "persister worker started");
        loop {
            let cycle_started = Instant::now();
            let Some(batch) = self.next_batch().await else {
                break;
            };

            let busy_started = Instant::now();
            self.persist_batch(batch, 0).await;

            let total = cycle_started.elapsed();
            if !total.is_zero() {
                self.metrics.record_worker_utilization(
                    busy_started.elapsed().as_secs_f64() / total.as_secs_f64(),
                );
            }
        }
        debug!(worker = self.id, "persister worker stopped");
    }

    /// Accumulates the next batch: first record blocks, the rest arrive
    /// until the size bound or the age of the first record hits the wait
    /// bound. `None` once the queue is closed and drained.
    async fn next_batch(&self) -> Option<Vec<IngestRecord>> {
        let first = self.queue.pop().await?;
        let mut batch = vec![first];
        let deadline = Instant::now() + self.settings.batch_max_wait;

        while batch.len() < self.settings.batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.queue.pop_timeout(remaining).await {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        Some(batch)
    }

    /// Persists a batch, bisecting on failure to isolate poison records.
    fn persist_batch(&self, records: Vec<IngestRecord>, depth: u32) -> BoxFuture<'_, ()> {
        async move {
            let started = Instant::now();
            match self.store.save_messages_batch(&records).await {
                Ok(()) => {
                    self.metrics.record_latency(started.elapsed());
                    self.metrics.add_persisted(records.len() as u64);
                }
                Err(err) => {
                    let transient = is_transient(&err);
                    self.metrics.record_error(if transient {
                        "persist_transient"
                    } else {
                        "persist_poison"
                    });

                    if !transient || records.len() == 1 || depth >= MAX_SPLIT_DEPTH {
                        // A transient failure of a size-1 batch already counts
                        // as that record's first attempt; multi-record falls
                        // start their per-record attempts from scratch.
                        let prior_failures = u32::from(transient && records.len() == 1);
                        let error = err.to_string();
                        for record in records {
                            self.retry_record(record, prior_failures, error.clone()).await;
                        }
                    } else {
                        warn!(
                            worker = self.id,
                            batch = records.len(),
                            depth,
                            error = %err,
                            "batch persist failed, bisecting"
                        );
                        let mut left = records;
                        let right = left.split_off(left.len() / 2);
                        self.persist_batch(left, depth + 1).await;
                        self.persist_batch(right, depth + 1).await;
                    }
                }
            }
        }
        .boxed()
    }

    /// Retries one record with jittered exponential backoff until success,
    /// a poison error, or an exhausted attempt/horizon budget.
    ///
    /// `failures` counts store attempts that already failed for this record;
    /// every failed attempt is followed by a backoff before the next one.
    async fn retry_record(&self, record: IngestRecord, mut failures: u32, mut last_error: String) {
        loop {
            if failures > 0 {
                if failures >= self.settings.retry_max_attempts {
                    self.dead_letter(&record, &format!("retry attempts exhausted: {last_error}"))
                        .await;
                    return;
                }
                let age_ms = now_ms().saturating_sub(record.received_at);
                if age_ms >= self.settings.retry_max_horizon_ms as i64 {
                    self.dead_letter(&record, &format!("retry horizon exceeded: {last_error}"))
                        .await;
                    return;
                }

                self.metrics.incr_retried();
                let delay = backoff_delay(
                    failures - 1,
                    self.settings.retry_base_ms,
                    self.settings.retry_max_ms,
                );
                debug!(
                    worker = self.id,
                    correlation_id = %record.correlation_id,
                    failures,
                    delay_ms = delay.as_millis() as u64,
                    "transient persist failure, backing off"
                );
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = self.cancel.cancelled() => return,
                }
            }

            let started = Instant::now();
            match self
                .store
                .save_messages_batch(std::slice::from_ref(&record))
                .await
            {
                Ok(()) => {
                    self.metrics.record_latency(started.elapsed());
                    self.metrics.add_persisted(1);
                    return;
                }
                Err(err) => {
                    if !is_transient(&err) {
                        self.dead_letter(&record, &err.to_string()).await;
                        return;
                    }
                    failures += 1;
                    last_error = err.to_string();
                }
            }
        }
    }

    async fn dead_letter(&self, record: &IngestRecord, err: &str) {
        error!(
            worker = self.id,
            correlation_id = %record.correlation_id,
            error = err,
            "record dead-lettered"
        );
        self.metrics.incr_dead_lettered();
        if let Err(dlq_err) = self.dlq.append(record, err, now_ms()).await {
            error!(
                correlation_id = %record.correlation_id,
                error = %dlq_err,
                "dead-letter append failed"
            );
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
