// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock upstream connector and socket for deterministic session tests.
//!
//! Each `connect()` hands out a fresh event channel and socket; tests drive
//! the session by emitting events through the latest connection and assert
//! against the socket's captured outbound calls. Connecting writes a
//! `creds.json` marker into the session directory the way the real library
//! persists credentials through its save callback.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use wagate_core::model::MessageAnchor;
use wagate_core::traits::upstream::{
    UpstreamBusinessProfile, UpstreamConnection, UpstreamConnector, UpstreamEvent, UpstreamSocket,
};
use wagate_core::{SentMessage, WagateError};

/// File the mock library writes as its credential state.
pub const CREDS_FILE: &str = "creds.json";

/// Scriptable upstream connector.
#[derive(Default)]
pub struct MockConnector {
    senders: Mutex<Vec<mpsc::Sender<UpstreamEvent>>>,
    sockets: Mutex<Vec<Arc<MockSocket>>>,
    connects: AtomicU32,
    fail_connects: AtomicU32,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Emits an event on the most recent connection.
    ///
    /// Returns false when no connection exists or the session dropped its
    /// receiver.
    pub async fn emit(&self, event: UpstreamEvent) -> bool {
        let sender = self.senders.lock().unwrap().last().cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// The socket handed out by the most recent `connect()`.
    pub fn latest_socket(&self) -> Option<Arc<MockSocket>> {
        self.sockets.lock().unwrap().last().cloned()
    }

    /// How many times `connect()` was called.
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpstreamConnector for MockConnector {
    async fn connect(&self, session_dir: &Path) -> Result<UpstreamConnection, WagateError> {
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            self.connects.fetch_add(1, Ordering::SeqCst);
            return Err(WagateError::upstream("mock connect refused"));
        }

        std::fs::create_dir_all(session_dir)
            .map_err(|e| WagateError::upstream(format!("session dir: {e}")))?;
        std::fs::write(session_dir.join(CREDS_FILE), "{}")
            .map_err(|e| WagateError::upstream(format!("creds write: {e}")))?;

        let (tx, rx) = mpsc::channel(64);
        let socket = Arc::new(MockSocket::default());
        self.senders.lock().unwrap().push(tx);
        self.sockets.lock().unwrap().push(socket.clone());
        // Count only after the connection is observable, so tests that wait
        // on the counter can immediately emit events or script the socket.
        self.connects.fetch_add(1, Ordering::SeqCst);

        Ok(UpstreamConnection {
            socket,
            events: rx,
        })
    }

    fn has_credentials(&self, session_dir: &Path) -> bool {
        session_dir.join(CREDS_FILE).exists()
    }
}

/// Scriptable upstream socket capturing outbound calls.
#[derive(Default)]
pub struct MockSocket {
    sent: Mutex<Vec<(String, String)>>,
    next_send_id: AtomicU64,
    known_numbers: Mutex<HashMap<String, String>>,
    self_jid: Mutex<Option<String>>,
    profile: Mutex<Option<UpstreamBusinessProfile>>,
    status: Mutex<Option<String>>,
    history_requests: Mutex<Vec<(u32, MessageAnchor)>>,
}

impl MockSocket {
    /// Outbound text messages sent through this socket.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Registers a phone number as existing on the network.
    pub fn register_number(&self, digits: &str, jid: &str) {
        self.known_numbers
            .lock()
            .unwrap()
            .insert(digits.to_string(), jid.to_string());
    }

    pub fn set_self_jid(&self, jid: &str) {
        *self.self_jid.lock().unwrap() = Some(jid.to_string());
    }

    pub fn set_business_profile(&self, profile: UpstreamBusinessProfile) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    pub fn set_status(&self, status: &str) {
        *self.status.lock().unwrap() = Some(status.to_string());
    }

    /// History fetches requested through this socket.
    pub fn history_requests(&self) -> Vec<(u32, MessageAnchor)> {
        self.history_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamSocket for MockSocket {
    async fn send_text(&self, jid: &str, text: &str) -> Result<SentMessage, WagateError> {
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        let n = self.next_send_id.fetch_add(1, Ordering::SeqCst);
        Ok(SentMessage {
            id: format!("OUT{n}"),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    async fn on_whatsapp(&self, digits: &str) -> Result<Option<String>, WagateError> {
        Ok(self.known_numbers.lock().unwrap().get(digits).cloned())
    }

    async fn logout(&self) -> Result<(), WagateError> {
        Ok(())
    }

    async fn business_profile(
        &self,
        _jid: &str,
    ) -> Result<Option<UpstreamBusinessProfile>, WagateError> {
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn fetch_status(&self, _jid: &str) -> Result<Option<String>, WagateError> {
        Ok(self.status.lock().unwrap().clone())
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        anchor: &MessageAnchor,
    ) -> Result<(), WagateError> {
        self.history_requests
            .lock()
            .unwrap()
            .push((count, anchor.clone()));
        Ok(())
    }

    fn self_jid(&self) -> Option<String> {
        self.self_jid.lock().unwrap().clone()
    }
}
