// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wagate gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Wagate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WagateConfig {
    /// Process identity and data directory settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Ingestion pipeline settings.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Tenant session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Ops HTTP surface (health/ready/metrics).
    #[serde(default)]
    pub ops: OpsConfig,
}

/// Process identity and data directory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Base directory for the journal, checkpoint, DLQ, database, and
    /// per-tenant credential directories.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Ingestion pipeline configuration.
///
/// Paths default to files under the agent data directory; set them
/// explicitly (or via the `INGEST_*` environment variables) to relocate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Path to the durable ingestion log.
    #[serde(default)]
    pub log_path: Option<String>,

    /// Path to the replay checkpoint file.
    #[serde(default)]
    pub checkpoint_path: Option<String>,

    /// Path to the dead-letter log.
    #[serde(default)]
    pub dlq_path: Option<String>,

    /// Bounded queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Flush a worker batch at this many records.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush a worker batch when its oldest record is this old.
    #[serde(default = "default_batch_max_wait_ms")]
    pub batch_max_wait_ms: u64,

    /// Number of persister workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Base delay for jittered exponential retry backoff.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Cap on the exponential retry delay.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Per-record retry attempt budget.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Per-record retry wall-clock budget measured from `received_at`.
    #[serde(default = "default_retry_max_horizon_ms")]
    pub retry_max_horizon_ms: u64,

    /// Readiness threshold on queue depth; defaults to 90% of capacity.
    #[serde(default)]
    pub ready_max_queue_depth: Option<usize>,

    /// Checkpoint after this many replayed records (and at EOF).
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Replay back-off while the queue is full.
    #[serde(default = "default_enqueue_poll_ms")]
    pub enqueue_poll_ms: u64,

    /// Replay sleep after reaching EOF before re-checking the log size.
    #[serde(default = "default_eof_poll_ms")]
    pub eof_poll_ms: u64,

    /// Replay idle sleep when the log has not grown.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            checkpoint_path: None,
            dlq_path: None,
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            batch_max_wait_ms: default_batch_max_wait_ms(),
            workers: default_workers(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_max_horizon_ms: default_retry_max_horizon_ms(),
            ready_max_queue_depth: None,
            checkpoint_interval: default_checkpoint_interval(),
            enqueue_poll_ms: default_enqueue_poll_ms(),
            eof_poll_ms: default_eof_poll_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl IngestConfig {
    /// Durable log path, defaulting under `data_dir`.
    pub fn resolved_log_path(&self, data_dir: &str) -> PathBuf {
        self.log_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(data_dir).join("ingestion.log"))
    }

    /// Checkpoint path, defaulting under `data_dir`.
    pub fn resolved_checkpoint_path(&self, data_dir: &str) -> PathBuf {
        self.checkpoint_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(data_dir).join("ingestion.offset"))
    }

    /// Dead-letter log path, defaulting under `data_dir`.
    pub fn resolved_dlq_path(&self, data_dir: &str) -> PathBuf {
        self.dlq_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(data_dir).join("dlq.log"))
    }

    /// Readiness threshold, defaulting to 90% of the queue capacity.
    pub fn resolved_ready_max_queue_depth(&self) -> usize {
        self.ready_max_queue_depth
            .unwrap_or(self.queue_capacity * 9 / 10)
    }
}

fn default_queue_capacity() -> usize {
    5000
}

fn default_batch_size() -> usize {
    100
}

fn default_batch_max_wait_ms() -> u64 {
    250
}

fn default_workers() -> usize {
    2
}

fn default_retry_base_ms() -> u64 {
    100
}

fn default_retry_max_ms() -> u64 {
    5000
}

fn default_retry_max_attempts() -> u32 {
    10
}

fn default_retry_max_horizon_ms() -> u64 {
    600_000
}

fn default_checkpoint_interval() -> u64 {
    1000
}

fn default_enqueue_poll_ms() -> u64 {
    50
}

fn default_eof_poll_ms() -> u64 {
    200
}

fn default_idle_poll_ms() -> u64 {
    300
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file; defaults under the data directory.
    #[serde(default)]
    pub database_path: Option<String>,
}

impl StorageConfig {
    /// Database path, defaulting under `data_dir`.
    pub fn resolved_database_path(&self, data_dir: &str) -> PathBuf {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(data_dir).join("wagate.db"))
    }
}

/// Tenant session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Consecutive reconnect failures before the session is wiped.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// How long `wait_for_qr` waits before resolving empty.
    #[serde(default = "default_qr_timeout_secs")]
    pub qr_timeout_secs: u64,

    /// Messages requested per history backfill page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Backfill pages fetched per chat before giving up.
    #[serde(default = "default_history_max_pages")]
    pub history_max_pages: u32,

    /// Wait after a history request for inbound events to be persisted.
    #[serde(default = "default_history_settle_ms")]
    pub history_settle_ms: u64,

    /// Delay between per-chat backfill passes.
    #[serde(default = "default_history_chat_delay_ms")]
    pub history_chat_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            qr_timeout_secs: default_qr_timeout_secs(),
            history_page_size: default_history_page_size(),
            history_max_pages: default_history_max_pages(),
            history_settle_ms: default_history_settle_ms(),
            history_chat_delay_ms: default_history_chat_delay_ms(),
        }
    }
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_qr_timeout_secs() -> u64 {
    300
}

fn default_history_page_size() -> u32 {
    50
}

fn default_history_max_pages() -> u32 {
    6
}

fn default_history_settle_ms() -> u64 {
    500
}

fn default_history_chat_delay_ms() -> u64 {
    200
}

/// Ops HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpsConfig {
    /// Address to bind the ops listener to.
    #[serde(default = "default_ops_bind_address")]
    pub bind_address: String,

    /// Port for the ops listener.
    #[serde(default = "default_ops_port")]
    pub port: u16,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            bind_address: default_ops_bind_address(),
            port: default_ops_port(),
        }
    }
}

fn default_ops_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_ops_port() -> u16 {
    8090
}
