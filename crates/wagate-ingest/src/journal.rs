// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The durable ingestion log.
//!
//! A single append-only file of JSON lines, one [`IngestRecord`] per line,
//! fsynced before every append returns. The fsync-before-ack is the
//! at-least-once anchor: the in-memory queue is best-effort, the log is
//! authoritative. A partial final line (crash mid-append) is not a record;
//! the replay parser ignores it until its newline appears.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use wagate_core::{IngestRecord, WagateError};

/// Append-only durable log of ingestion records.
pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens (or creates) the journal at `path`, creating parent directories.
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

    /// Appends one record as a JSON line and fsyncs before returning.
    ///
    /// Returns only after the data is durable; any failure means the record
    /// was not accepted.
    pub async fn append(&self, record: &IngestRecord) -> Result<(), WagateError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| WagateError::Internal(format!("record serialization failed: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Current length of the log in bytes.
    pub async fn size_bytes(&self) -> Result<u64, WagateError> {
        let meta = tokio::fs::metadata(&self.path).await?;
        Ok(meta.len())
    }

    /// Opens a buffered reader positioned at `offset`.
    pub async fn open_reader(&self, offset: u64) -> Result<BufReader<File>, WagateError> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(BufReader::new(file))
    }

    /// The log's path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
