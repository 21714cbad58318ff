// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable at-least-once message ingestion for the Wagate gateway.
//!
//! The pipeline: producers append to a fsynced journal (the source of
//! truth), a bounded queue hands records to batching persister workers with
//! split-on-failure isolation and jittered retry, a replay loop tails the
//! journal from a persisted checkpoint, and permanently failed records land
//! in a dead-letter log.

pub mod checkpoint;
pub mod dlq;
pub mod journal;
pub mod metrics;
pub mod queue;
pub mod replay;
pub mod retry;
pub mod service;
pub mod worker;

pub use checkpoint::Checkpointer;
pub use dlq::{DeadLetter, DeadLetterLog};
pub use journal::Journal;
pub use metrics::{Counters, Metrics, MetricsSnapshot};
pub use queue::BoundedQueue;
pub use service::{Acceptance, HealthReport, IngestService, IngestSettings, ReadyReport, RejectReason};
