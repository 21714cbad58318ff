// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of tenant sessions.
//!
//! Sessions are created on demand the first time an operation names a
//! username, and re-created at startup for every tenant with credentials
//! on disk. The manager hands sessions their collaborators (store, ingest
//! sink, notifier); sessions never reach back into the manager.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wagate_core::{IngestSink, MessageStore, Notifier, UpstreamConnector};

use crate::session::{spawn_session, SessionParams, TenantHandle};
use crate::settings::SessionSettings;

/// Owns one session handle per tenant.
pub struct TenantManager {
    sessions_dir: PathBuf,
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn MessageStore>,
    ingest: Arc<dyn IngestSink>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    cancel: CancellationToken,
    sessions: Mutex<HashMap<String, TenantHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TenantManager {
    pub fn new(
        sessions_dir: impl Into<PathBuf>,
        connector: Arc<dyn UpstreamConnector>,
        store: Arc<dyn MessageStore>,
        ingest: Arc<dyn IngestSink>,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            connector,
            store,
            ingest,
            notifier,
            settings,
            cancel: CancellationToken::new(),
            sessions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The handle for a tenant, creating (and connecting) the session on
    /// first use.
    pub fn session(&self, username: &str) -> TenantHandle {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        if let Some(handle) = sessions.get(username) {
            return handle.clone();
        }

        info!(username, "creating tenant session");
        let (handle, task) = spawn_session(
            SessionParams {
                username: username.to_string(),
                session_dir: self.sessions_dir.join(username),
                connector: self.connector.clone(),
                store: self.store.clone(),
                ingest: self.ingest.clone(),
                notifier: self.notifier.clone(),
                settings: self.settings.clone(),
            },
            self.cancel.clone(),
        );
        self.tasks.lock().expect("task registry poisoned").push(task);
        sessions.insert(username.to_string(), handle.clone());
        handle
    }

    /// Waits for a tenant's pairing code with the configured timeout.
    ///
    /// Creates the session if needed; resolves `None` when the session
    /// connects without pairing or the timeout elapses.
    pub async fn wait_for_qr(&self, username: &str) -> Option<String> {
        let handle = self.session(username);
        handle.wait_for_qr(self.settings.qr_timeout).await
    }

    /// Whether a session is currently registered for the tenant.
    pub fn has_session(&self, username: &str) -> bool {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .contains_key(username)
    }

    /// Usernames with a registered session.
    pub fn usernames(&self) -> Vec<String> {
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Recreates sessions for every tenant with credentials on disk.
    ///
    /// Credentials under `<sessions_dir>/<username>/` are the durable
    /// backing that survives restarts.
    pub async fn auto_connect_all(&self) -> usize {
        let mut reconnected = 0;
        let mut entries = match tokio::fs::read_dir(&self.sessions_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(err) => {
                warn!(error = %err, "cannot scan sessions directory");
                return 0;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "sessions directory entry unreadable");
                    break;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(username) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.connector.has_credentials(&path) {
                continue;
            }
            info!(username, "auto-connecting discovered session");
            self.session(username);
            reconnected += 1;
        }
        reconnected
    }

    /// Stops every session task.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("task registry poisoned");
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "session task join failed");
            }
        }
        self.sessions
            .lock()
            .expect("session registry poisoned")
            .clear();
        info!("tenant sessions stopped");
    }
}
