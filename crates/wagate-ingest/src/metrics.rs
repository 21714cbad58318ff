// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pipeline counters, gauges, and latency samples exposed as snapshots.
//!
//! Counters are lock-free atomics; the latency window is bounded at 5000
//! samples and percentiles are computed on snapshot. Worker utilization is
//! an exponential moving average fed by the workers each batch cycle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

const LATENCY_WINDOW: usize = 5000;
const UTILIZATION_ALPHA: f64 = 0.2;

/// Shared metrics registry for the ingestion pipeline.
#[derive(Default)]
pub struct Metrics {
    received: AtomicU64,
    enqueued: AtomicU64,
    persisted: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    log_append_failed: AtomicU64,
    replay_parse_errors: AtomicU64,
    checkpoint_offset: AtomicU64,
    errors: Mutex<HashMap<String, u64>>,
    latencies_ms: Mutex<VecDeque<f64>>,
    worker_utilization: Mutex<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_persisted(&self, n: u64) {
        self.persisted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_log_append_failed(&self) {
        self.log_append_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_replay_parse_error(&self) {
        self.replay_parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_checkpoint_offset(&self, offset: u64) {
        self.checkpoint_offset.store(offset, Ordering::Relaxed);
    }

    /// Bumps the histogram bucket for an error reason.
    pub fn record_error(&self, reason: &str) {
        let mut errors = self.errors.lock().expect("metrics mutex poisoned");
        *errors.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Records one persistence latency sample, evicting the oldest past the window.
    pub fn record_latency(&self, elapsed: Duration) {
        let mut window = self.latencies_ms.lock().expect("metrics mutex poisoned");
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    /// Feeds one busy-fraction observation into the utilization moving average.
    pub fn record_worker_utilization(&self, busy_fraction: f64) {
        let mut ewma = self.worker_utilization.lock().expect("metrics mutex poisoned");
        *ewma = UTILIZATION_ALPHA * busy_fraction.clamp(0.0, 1.0) + (1.0 - UTILIZATION_ALPHA) * *ewma;
    }

    /// Current received count (used by tests and readiness reporting).
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn retried(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot; `queue_depth` is supplied by the owner of the queue.
    pub fn snapshot(&self, queue_depth: usize) -> MetricsSnapshot {
        let errors = self
            .errors
            .lock()
            .expect("metrics mutex poisoned")
            .clone();
        let (p50, p95, samples) = {
            let window = self.latencies_ms.lock().expect("metrics mutex poisoned");
            let mut sorted: Vec<f64> = window.iter().copied().collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            (
                percentile(&sorted, 0.50),
                percentile(&sorted, 0.95),
                sorted.len(),
            )
        };
        let worker_utilization = *self.worker_utilization.lock().expect("metrics mutex poisoned");

        MetricsSnapshot {
            counters: Counters {
                received: self.received.load(Ordering::Relaxed),
                enqueued: self.enqueued.load(Ordering::Relaxed),
                persisted: self.persisted.load(Ordering::Relaxed),
                retried: self.retried.load(Ordering::Relaxed),
                dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
                log_append_failed: self.log_append_failed.load(Ordering::Relaxed),
                replay_parse_errors: self.replay_parse_errors.load(Ordering::Relaxed),
            },
            errors,
            queue_depth,
            worker_utilization,
            persist_latency_p50_ms: p50,
            persist_latency_p95_ms: p95,
            latency_samples: samples,
            checkpoint_offset: self.checkpoint_offset.load(Ordering::Relaxed),
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    Some(sorted[rank])
}

/// Pipeline counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub received: u64,
    pub enqueued: u64,
    pub persisted: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub log_append_failed: u64,
    pub replay_parse_errors: u64,
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub counters: Counters,
    /// Error-reason histogram.
    pub errors: HashMap<String, u64>,
    pub queue_depth: usize,
    pub worker_utilization: f64,
    pub persist_latency_p50_ms: Option<f64>,
    pub persist_latency_p95_ms: Option<f64>,
    pub latency_samples: usize,
    pub checkpoint_offset: u64,
}
