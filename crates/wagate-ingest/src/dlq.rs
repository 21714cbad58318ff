// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dead-letter log: append-only JSON lines of permanently failed
//! records, each carrying the record, the final error string, and the
//! dead-letter timestamp for operator triage.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use wagate_core::{IngestRecord, WagateError};

/// One dead-letter entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    #[serde(flatten)]
    pub record: IngestRecord,
    /// The error that exhausted the record's budget.
    pub error: String,
    /// Milliseconds since epoch.
    pub dead_lettered_at: i64,
}

/// Append-only dead-letter log.
pub struct DeadLetterLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DeadLetterLog {
    /// Opens (or creates) the dead-letter log at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WagateError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends one dead-lettered record.
    pub async fn append(
        &self,
        record: &IngestRecord,
        error: &str,
        dead_lettered_at: i64,
    ) -> Result<(), WagateError> {
        let entry = DeadLetter {
            record: record.clone(),
            error: error.to_string(),
            dead_lettered_at,
        };
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| WagateError::Internal(format!("dead letter serialization failed: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Reads all entries, skipping unparseable lines.
    pub async fn read_all(&self) -> Result<Vec<DeadLetter>, WagateError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// The log's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
