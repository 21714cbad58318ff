// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant session: a state machine wrapping the upstream socket.
//!
//! Each session runs as one task that owns the socket and its event
//! stream. Callers talk to it through a [`TenantHandle`]: commands travel
//! over an mpsc channel with oneshot replies, state and the pairing code
//! are published on a watch channel. Upstream event handler failures are
//! logged and surfaced as an `error` webhook event; they never crash the
//! session or block ingestion.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wagate_core::model::{to_jid, ChatPatch, MessageContent, MessageInfo};
use wagate_core::traits::upstream::{
    ConnectionState, UpstreamChat, UpstreamContact, UpstreamEvent,
};
use wagate_core::{
    IngestSink, MessageStore, Notifier, SentMessage, UpstreamConnector, UpstreamSocket,
    WagateError,
};

use crate::history;
use crate::normalize;
use crate::settings::SessionSettings;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket.
    Idle,
    /// Socket created, awaiting the first connection event.
    Connecting,
    /// Upstream emitted a pairing code; waiting for the user to scan it.
    WaitingQr,
    /// `connection=open` observed.
    Connected,
    /// Transient disconnect, retrying.
    Reconnecting,
    /// Upstream logout or retry budget exhausted; credentials erased.
    LoggedOut,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::WaitingQr => write!(f, "waiting_qr"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Reconnecting => write!(f, "reconnecting"),
            SessionState::LoggedOut => write!(f, "logged_out"),
        }
    }
}

/// Published snapshot of a session.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Transient pairing code, present while unpaired.
    pub qr: Option<String>,
    pub reconnect_attempts: u32,
}

impl SessionStatus {
    fn initial() -> Self {
        Self {
            state: SessionState::Idle,
            qr: None,
            reconnect_attempts: 0,
        }
    }
}

/// Result of a number existence check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberCheck {
    pub exists: bool,
    pub jid: Option<String>,
}

pub(crate) enum Command {
    SendMessage {
        to: String,
        text: String,
        reply: oneshot::Sender<Result<SentMessage, WagateError>>,
    },
    CheckNumber {
        phone: String,
        reply: oneshot::Sender<Result<NumberCheck, WagateError>>,
    },
    Logout {
        reply: oneshot::Sender<Result<(), WagateError>>,
    },
    RefreshBusinessInfo {
        reply: oneshot::Sender<Result<(), WagateError>>,
    },
}

/// Caller-side handle to a running session task.
#[derive(Clone)]
pub struct TenantHandle {
    username: String,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
}

impl TenantHandle {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Waits for a pairing code.
    ///
    /// Resolves with the code once upstream emits one, or `None` when the
    /// session connects without pairing or the timeout elapses.
    pub async fn wait_for_qr(&self, timeout: Duration) -> Option<String> {
        let mut rx = self.status.clone();
        tokio::time::timeout(timeout, async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if let Some(qr) = snapshot.qr {
                    return Some(qr);
                }
                if snapshot.state == SessionState::Connected {
                    return None;
                }
                if rx.changed().await.is_err() {
                    return None;
                }
            }
        })
        .await
        .unwrap_or(None)
    }

    /// Sends a text message; requires the session to be connected.
    pub async fn send_message(
        &self,
        to: &str,
        text: &str,
    ) -> Result<SentMessage, WagateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendMessage {
                to: to.to_string(),
                text: text.to_string(),
                reply,
            })
            .await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?;
        rx.await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?
    }

    /// Checks whether a phone number exists on the network.
    pub async fn check_number(&self, phone: &str) -> Result<NumberCheck, WagateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::CheckNumber {
                phone: phone.to_string(),
                reply,
            })
            .await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?;
        rx.await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?
    }

    /// Logs out and erases credentials.
    pub async fn logout(&self) -> Result<(), WagateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Logout { reply })
            .await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?;
        rx.await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?
    }

    /// Re-pulls the upstream business profile into the store.
    pub async fn refresh_business_info(&self) -> Result<(), WagateError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::RefreshBusinessInfo { reply })
            .await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?;
        rx.await
            .map_err(|_| WagateError::Internal("session task stopped".into()))?
    }
}

/// Everything a session task needs at spawn time.
pub(crate) struct SessionParams {
    pub username: String,
    pub session_dir: PathBuf,
    pub connector: Arc<dyn UpstreamConnector>,
    pub store: Arc<dyn MessageStore>,
    pub ingest: Arc<dyn IngestSink>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: SessionSettings,
}

/// Spawns a session task and returns its handle.
pub(crate) fn spawn_session(
    params: SessionParams,
    cancel: CancellationToken,
) -> (TenantHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (status_tx, status_rx) = watch::channel(SessionStatus::initial());

    let handle = TenantHandle {
        username: params.username.clone(),
        commands: command_tx,
        status: status_rx,
    };

    let runner = SessionRunner {
        username: params.username,
        session_dir: params.session_dir,
        connector: params.connector,
        store: params.store,
        ingest: params.ingest,
        notifier: params.notifier,
        settings: params.settings,
        status: status_tx,
        commands: command_rx,
        socket: None,
        events: None,
        reconnect_attempts: 0,
        resume_backfill: false,
    };
    let task = tokio::spawn(runner.run(cancel));

    (handle, task)
}

enum Step {
    Cancelled,
    Command(Option<Command>),
    Event(Option<UpstreamEvent>),
}

struct SessionRunner {
    username: String,
    session_dir: PathBuf,
    connector: Arc<dyn UpstreamConnector>,
    store: Arc<dyn MessageStore>,
    ingest: Arc<dyn IngestSink>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    status: watch::Sender<SessionStatus>,
    commands: mpsc::Receiver<Command>,
    socket: Option<Arc<dyn UpstreamSocket>>,
    events: Option<mpsc::Receiver<UpstreamEvent>>,
    reconnect_attempts: u32,
    /// Set on a transient disconnect so the next open triggers backfill.
    resume_backfill: bool,
}

impl SessionRunner {
    async fn run(mut self, cancel: CancellationToken) {
        info!(username = %self.username, "session task started");
        if let Err(err) = self.initialize(false).await {
            warn!(username = %self.username, error = %err, "initial connect failed");
            self.report_error("initialize failed", &err).await;
        }

        loop {
            if let Some(mut events) = self.events.take() {
                let step = tokio::select! {
                    () = cancel.cancelled() => Step::Cancelled,
                    cmd = self.commands.recv() => Step::Command(cmd),
                    event = events.recv() => Step::Event(event),
                };
                // Restore before handling: handlers may replace or drop the
                // stream themselves.
                self.events = Some(events);
                match step {
                    Step::Cancelled | Step::Command(None) => break,
                    Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                    Step::Event(Some(event)) => self.handle_event(event).await,
                    Step::Event(None) => {
                        // The library dropped its event stream: treat as a
                        // transient close.
                        self.events = None;
                        self.on_close(false).await;
                    }
                }
            } else {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    },
                }
            }
        }
        info!(username = %self.username, "session task stopped");
    }

    // --- Lifecycle ---

    async fn initialize(&mut self, is_reconnecting: bool) -> Result<(), WagateError> {
        if is_reconnecting && !self.connector.has_credentials(&self.session_dir) {
            self.set_state(SessionState::Idle, None);
            return Err(WagateError::upstream("reconnect without credentials"));
        }

        if self.reconnect_attempts > self.settings.max_reconnect_attempts {
            warn!(
                username = %self.username,
                attempts = self.reconnect_attempts,
                "reconnect ceiling hit, wiping session"
            );
            self.force_logout("reconnect_limit").await;
            self.reconnect_attempts = 0;
        }

        self.set_state(SessionState::Connecting, None);
        match self.connector.connect(&self.session_dir).await {
            Ok(conn) => {
                self.socket = Some(conn.socket);
                self.events = Some(conn.events);
                Ok(())
            }
            Err(err) => {
                self.socket = None;
                self.events = None;
                self.set_state(SessionState::Idle, None);
                Err(err)
            }
        }
    }

    async fn on_open(&mut self) {
        self.reconnect_attempts = 0;
        self.set_state(SessionState::Connected, None);
        info!(username = %self.username, "session connected");

        self.notifier
            .notify(&self.username, "connection", json!({"status": "connected"}))
            .await;

        if let Err(err) = self.refresh_business_info().await {
            debug!(username = %self.username, error = %err, "business info refresh skipped");
        }

        if std::mem::take(&mut self.resume_backfill) {
            if let Some(socket) = self.socket.clone() {
                let username = self.username.clone();
                let store = self.store.clone();
                let settings = self.settings.clone();
                tokio::spawn(async move {
                    history::sync_all(&username, socket, store, &settings).await;
                });
            }
        }
    }

    async fn on_close(&mut self, logged_out: bool) {
        self.socket = None;
        self.events = None;

        if logged_out {
            info!(username = %self.username, "upstream reported logout, wiping credentials");
            self.force_logout("logged_out").await;
            self.reconnect_attempts = 0;
            self.set_state(SessionState::Idle, None);
            if let Err(err) = self.initialize(false).await {
                self.report_error("re-initialize after logout failed", &err).await;
            }
        } else {
            self.reconnect_attempts += 1;
            self.resume_backfill = true;
            self.set_state(SessionState::Reconnecting, None);
            warn!(
                username = %self.username,
                attempt = self.reconnect_attempts,
                "transient disconnect, reconnecting"
            );
            if let Err(err) = self.initialize(true).await {
                self.report_error("reconnect failed", &err).await;
            }
        }
    }

    async fn force_logout(&mut self, reason: &str) {
        self.socket = None;
        self.events = None;
        self.set_state(SessionState::LoggedOut, None);
        self.notifier
            .notify(
                &self.username,
                "connection",
                json!({"status": "logged_out", "reason": reason}),
            )
            .await;
        if let Err(err) = tokio::fs::remove_dir_all(&self.session_dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(username = %self.username, error = %err, "credential wipe failed");
            }
        }
    }

    // --- Events ---

    async fn handle_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::ConnectionUpdate(update) => {
                if let Some(qr) = update.qr {
                    debug!(username = %self.username, "pairing code received");
                    self.set_state(SessionState::WaitingQr, Some(qr));
                }
                match update.connection {
                    Some(ConnectionState::Open) => self.on_open().await,
                    Some(ConnectionState::Close) => self.on_close(update.logged_out).await,
                    None => {}
                }
            }
            UpstreamEvent::CredsUpdate => {
                // The library persists its own credential state.
                debug!(username = %self.username, "credentials updated");
            }
            UpstreamEvent::ChatsSet(chats) | UpstreamEvent::ChatsUpsert(chats) => {
                self.apply_chats(chats).await;
            }
            UpstreamEvent::ContactsSet(contacts) | UpstreamEvent::ContactsUpsert(contacts) => {
                self.apply_contacts(contacts).await;
            }
            UpstreamEvent::HistorySet {
                chats,
                contacts,
                messages,
            } => {
                self.apply_chats(chats).await;
                self.apply_contacts(contacts).await;
                for raw in &messages {
                    if normalize::is_protocol_message(raw) {
                        continue;
                    }
                    if let Some(msg) = normalize::normalize(raw) {
                        if !self.ingest.submit(msg).await {
                            warn!(username = %self.username, "history message not accepted");
                        }
                    }
                }
            }
            UpstreamEvent::MessagesUpsert { kind, messages } => {
                if kind != "notify" {
                    debug!(username = %self.username, kind = %kind, "ignoring non-notify upsert");
                    return;
                }
                for raw in &messages {
                    if normalize::is_protocol_message(raw) {
                        continue;
                    }
                    let Some(msg) = normalize::normalize(raw) else {
                        debug!(username = %self.username, "skipping unnormalizable message");
                        continue;
                    };
                    if !self.ingest.submit(msg.clone()).await {
                        warn!(
                            username = %self.username,
                            message_id = %msg.id,
                            "inbound message not accepted by ingest"
                        );
                    }
                    let business = self.store.business_info(&self.username).await.ok().flatten();
                    self.notifier
                        .notify(
                            &self.username,
                            "message.received",
                            json!({"message": msg, "business": business}),
                        )
                        .await;
                }
            }
        }
    }

    async fn apply_chats(&self, chats: Vec<UpstreamChat>) {
        if chats.is_empty() {
            return;
        }
        let patches: Vec<(String, ChatPatch)> = chats
            .into_iter()
            .map(|c| {
                (
                    c.jid,
                    ChatPatch {
                        name: c.name,
                        unread_count: c.unread_count,
                        last_message_timestamp: c.last_message_timestamp,
                        ..ChatPatch::default()
                    },
                )
            })
            .collect();
        if let Err(err) = self.store.upsert_chats(&patches).await {
            self.report_error("chat sync failed", &err).await;
        }
    }

    async fn apply_contacts(&self, contacts: Vec<UpstreamContact>) {
        for contact in contacts {
            let Some(name) = contact.name else { continue };
            if let Err(err) = self
                .store
                .upsert_chat(&contact.jid, &ChatPatch::named(name))
                .await
            {
                self.report_error("contact sync failed", &err).await;
            }
        }
    }

    // --- Commands ---

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SendMessage { to, text, reply } => {
                let _ = reply.send(self.send_text(&to, &text).await);
            }
            Command::CheckNumber { phone, reply } => {
                let _ = reply.send(self.check_number(&phone).await);
            }
            Command::Logout { reply } => {
                let result = match &self.socket {
                    Some(socket) => socket.logout().await,
                    None => Ok(()),
                };
                self.force_logout("user_logout").await;
                let _ = reply.send(result);
            }
            Command::RefreshBusinessInfo { reply } => {
                let _ = reply.send(self.refresh_business_info().await);
            }
        }
    }

    fn connected_socket(&self) -> Result<Arc<dyn UpstreamSocket>, WagateError> {
        if self.status.borrow().state != SessionState::Connected {
            return Err(WagateError::NotConnected(self.username.clone()));
        }
        self.socket
            .clone()
            .ok_or_else(|| WagateError::NotConnected(self.username.clone()))
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<SentMessage, WagateError> {
        let socket = self.connected_socket()?;
        let jid = to_jid(to);
        let sent = socket.send_text(&jid, text).await?;

        // Mirror the outbound message through the ingestion pipeline so it
        // is persisted and replayable like any inbound one.
        let msg = MessageInfo {
            id: sent.id.clone(),
            from: jid,
            from_me: true,
            timestamp: sent.timestamp,
            kind: "conversation".to_string(),
            push_name: None,
            content: MessageContent::Text {
                text: text.to_string(),
                context_info: None,
            },
        };
        if !self.ingest.submit(msg).await {
            warn!(
                username = %self.username,
                message_id = %sent.id,
                "outbound message not accepted by ingest"
            );
        }
        Ok(sent)
    }

    async fn check_number(&self, phone: &str) -> Result<NumberCheck, WagateError> {
        let socket = self.connected_socket()?;
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let jid = socket.on_whatsapp(&digits).await?;
        Ok(NumberCheck {
            exists: jid.is_some(),
            jid,
        })
    }

    async fn refresh_business_info(&self) -> Result<(), WagateError> {
        let socket = self.connected_socket()?;
        let Some(self_jid) = socket.self_jid() else {
            debug!(username = %self.username, "self jid unknown, skipping business refresh");
            return Ok(());
        };

        let mut info = self
            .store
            .business_info(&self.username)
            .await?
            .unwrap_or_default();

        match socket.business_profile(&self_jid).await {
            Ok(Some(profile)) => {
                if profile.business_hours.is_some() {
                    info.working_hours = profile.business_hours;
                }
                if profile.website.is_some() {
                    info.website_url = profile.website;
                }
                if profile.address.is_some() {
                    info.location_url = profile.address;
                }
                if info.name.is_none() {
                    info.name = profile.description;
                }
            }
            Ok(None) => {}
            Err(err) => debug!(username = %self.username, error = %err, "business profile unavailable"),
        }
        if let Ok(Some(status)) = socket.fetch_status(&self_jid).await {
            debug!(username = %self.username, status = %status, "account status fetched");
        }

        // The account's own number joins the advertised mobile numbers.
        let digits: String = self_jid
            .split('@')
            .next()
            .unwrap_or("")
            .split(':')
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() && !info.mobile_numbers.contains(&digits) {
            info.mobile_numbers.push(digits);
        }
        info.last_updated = Some(chrono::Utc::now().to_rfc3339());

        self.store.put_business_info(&self.username, &info).await
    }

    // --- Helpers ---

    fn set_state(&self, state: SessionState, qr: Option<String>) {
        let attempts = self.reconnect_attempts;
        self.status.send_modify(|status| {
            status.state = state;
            status.qr = qr;
            status.reconnect_attempts = attempts;
        });
    }

    async fn report_error(&self, context: &str, err: &WagateError) {
        error!(username = %self.username, error = %err, "{context}");
        self.notifier
            .notify(
                &self.username,
                "error",
                json!({"message": context, "detail": err.to_string()}),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wagate_core::traits::upstream::{ConnectionUpdate, UpstreamBusinessProfile};
    use wagate_core::MessageStore as _;
    use wagate_test_utils::{MockConnector, MockIngest, MockNotifier, MockStore, CREDS_FILE};

    struct Fixture {
        handle: TenantHandle,
        task: JoinHandle<()>,
        connector: Arc<MockConnector>,
        store: Arc<MockStore>,
        ingest: Arc<MockIngest>,
        notifier: Arc<MockNotifier>,
        cancel: CancellationToken,
        session_dir: PathBuf,
        _dir: tempfile::TempDir,
    }

    async fn fixture_with(settings: SessionSettings) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("sessions").join("alice");
        let connector = MockConnector::new();
        let store = Arc::new(MockStore::new());
        let ingest = Arc::new(MockIngest::new());
        let notifier = Arc::new(MockNotifier::new());
        let cancel = CancellationToken::new();

        let (handle, task) = spawn_session(
            SessionParams {
                username: "alice".to_string(),
                session_dir: session_dir.clone(),
                connector: connector.clone(),
                store: store.clone(),
                ingest: ingest.clone(),
                notifier: notifier.clone(),
                settings,
            },
            cancel.clone(),
        );

        let fixture = Fixture {
            handle,
            task,
            connector,
            store,
            ingest,
            notifier,
            cancel,
            session_dir,
            _dir: dir,
        };
        // Wait for the initial connect.
        wait_until(|| fixture.connector.connect_count() >= 1).await;
        fixture
    }

    async fn fixture() -> Fixture {
        fixture_with(SessionSettings {
            history_settle: Duration::from_millis(5),
            history_chat_delay: Duration::from_millis(1),
            ..SessionSettings::default()
        })
        .await
    }

    async fn wait_until<F: Fn() -> bool>(done: F) {
        let started = std::time::Instant::now();
        while !done() {
            if started.elapsed() > Duration::from_secs(2) {
                panic!("condition not reached in time");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn open_connection(f: &Fixture) {
        assert!(
            f.connector
                .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                    connection: Some(ConnectionState::Open),
                    ..ConnectionUpdate::default()
                }))
                .await
        );
        let handle = f.handle.clone();
        wait_until(move || handle.status().state == SessionState::Connected).await;
    }

    fn inbound_raw(id: &str, from: &str, text: &str) -> serde_json::Value {
        json!({
            "key": {"id": id, "remoteJid": from, "fromMe": false},
            "messageTimestamp": 1_700_000_000,
            "message": {"conversation": text},
            "pushName": "Bob",
        })
    }

    async fn shutdown(f: Fixture) {
        f.cancel.cancel();
        let _ = f.task.await;
    }

    #[tokio::test]
    async fn open_event_connects_and_notifies() {
        let f = fixture().await;
        assert_eq!(f.handle.status().state, SessionState::Connecting);

        open_connection(&f).await;

        let connections = f.notifier.of_event("connection");
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].data["status"], "connected");
        shutdown(f).await;
    }

    #[tokio::test]
    async fn qr_event_publishes_pairing_code() {
        let f = fixture().await;
        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                qr: Some("QR-CODE-1".to_string()),
                ..ConnectionUpdate::default()
            }))
            .await;

        let qr = f.handle.wait_for_qr(Duration::from_secs(2)).await;
        assert_eq!(qr.as_deref(), Some("QR-CODE-1"));
        assert_eq!(f.handle.status().state, SessionState::WaitingQr);
        shutdown(f).await;
    }

    #[tokio::test]
    async fn wait_for_qr_times_out_without_code() {
        let f = fixture().await;
        let qr = f.handle.wait_for_qr(Duration::from_millis(50)).await;
        assert!(qr.is_none());
        shutdown(f).await;
    }

    #[tokio::test]
    async fn wait_for_qr_resolves_empty_once_connected() {
        let f = fixture().await;
        let waiter = f.handle.clone();
        let wait = tokio::spawn(async move { waiter.wait_for_qr(Duration::from_secs(5)).await });

        open_connection(&f).await;
        assert!(wait.await.unwrap().is_none());
        shutdown(f).await;
    }

    #[tokio::test]
    async fn notify_upsert_ingests_and_fires_webhook() {
        let f = fixture().await;
        open_connection(&f).await;

        f.store
            .put_business_info(
                "alice",
                &wagate_core::BusinessInfo {
                    name: Some("Alice's Shop".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.connector
            .emit(UpstreamEvent::MessagesUpsert {
                kind: "notify".to_string(),
                messages: vec![
                    inbound_raw("A1", "1555@s.whatsapp.net", "hi"),
                    json!({
                        "key": {"id": "P1", "remoteJid": "1555@s.whatsapp.net"},
                        "message": {"protocolMessage": {"type": 0}},
                    }),
                ],
            })
            .await;

        let ingest = f.ingest.clone();
        wait_until(move || ingest.count() == 1).await;
        let submitted = f.ingest.submitted();
        assert_eq!(submitted[0].id, "A1");
        assert_eq!(submitted[0].kind, "conversation");

        let notifier = f.notifier.clone();
        wait_until(move || !notifier.of_event("message.received").is_empty()).await;
        let received = f.notifier.of_event("message.received");
        assert_eq!(received[0].data["message"]["id"], "A1");
        assert_eq!(received[0].data["business"]["name"], "Alice's Shop");
        shutdown(f).await;
    }

    #[tokio::test]
    async fn non_notify_upserts_are_ignored() {
        let f = fixture().await;
        open_connection(&f).await;

        f.connector
            .emit(UpstreamEvent::MessagesUpsert {
                kind: "append".to_string(),
                messages: vec![inbound_raw("A1", "1555@s.whatsapp.net", "hi")],
            })
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.ingest.count(), 0);
        assert!(f.notifier.of_event("message.received").is_empty());
        shutdown(f).await;
    }

    #[tokio::test]
    async fn history_set_upserts_chats_contacts_and_ingests() {
        let f = fixture().await;
        open_connection(&f).await;

        f.connector
            .emit(UpstreamEvent::HistorySet {
                chats: vec![UpstreamChat {
                    jid: "1555@s.whatsapp.net".to_string(),
                    name: Some("Bob".to_string()),
                    unread_count: Some(2),
                    last_message_timestamp: Some(1_700_000_000),
                }],
                contacts: vec![UpstreamContact {
                    jid: "1666@s.whatsapp.net".to_string(),
                    name: Some("Carol".to_string()),
                }],
                messages: vec![inbound_raw("H1", "1555@s.whatsapp.net", "old message")],
            })
            .await;

        let ingest = f.ingest.clone();
        wait_until(move || ingest.count() == 1).await;
        assert_eq!(f.ingest.submitted()[0].id, "H1");

        let chats = f.store.list_conversations(10, None).await.unwrap();
        assert!(chats.iter().any(|c| c.jid == "1555@s.whatsapp.net" && c.name.as_deref() == Some("Bob")));
        assert!(chats.iter().any(|c| c.jid == "1666@s.whatsapp.net" && c.name.as_deref() == Some("Carol")));

        // History messages do not fire message.received webhooks.
        assert!(f.notifier.of_event("message.received").is_empty());
        shutdown(f).await;
    }

    #[tokio::test]
    async fn send_message_requires_connection() {
        let f = fixture().await;
        let err = f.handle.send_message("15551234567", "hello").await.unwrap_err();
        assert!(matches!(err, WagateError::NotConnected(_)));
        shutdown(f).await;
    }

    #[tokio::test]
    async fn send_message_normalizes_jid_and_mirrors_outbound() {
        let f = fixture().await;
        open_connection(&f).await;

        let sent = f
            .handle
            .send_message("+1 (555) 123-4567", "hello")
            .await
            .unwrap();
        assert_eq!(sent.id, "OUT0");

        let socket = f.connector.latest_socket().unwrap();
        assert_eq!(
            socket.sent(),
            vec![("15551234567@s.whatsapp.net".to_string(), "hello".to_string())]
        );

        let ingest = f.ingest.clone();
        wait_until(move || ingest.count() == 1).await;
        let mirrored = &f.ingest.submitted()[0];
        assert!(mirrored.from_me);
        assert_eq!(mirrored.from, "15551234567@s.whatsapp.net");
        assert_eq!(mirrored.id, "OUT0");
        shutdown(f).await;
    }

    #[tokio::test]
    async fn check_number_resolves_existence() {
        let f = fixture().await;
        open_connection(&f).await;

        let socket = f.connector.latest_socket().unwrap();
        socket.register_number("15551234567", "15551234567@s.whatsapp.net");

        let found = f.handle.check_number("+1-555-123-4567").await.unwrap();
        assert!(found.exists);
        assert_eq!(found.jid.as_deref(), Some("15551234567@s.whatsapp.net"));

        let missing = f.handle.check_number("4917000000").await.unwrap();
        assert!(!missing.exists);
        assert!(missing.jid.is_none());
        shutdown(f).await;
    }

    #[tokio::test]
    async fn logout_wipes_credentials_and_stays_logged_out() {
        let f = fixture().await;
        open_connection(&f).await;
        assert!(f.session_dir.join(CREDS_FILE).exists());

        f.handle.logout().await.unwrap();

        assert_eq!(f.handle.status().state, SessionState::LoggedOut);
        assert!(!f.session_dir.exists());

        let connections = f.notifier.of_event("connection");
        let logged_out = connections
            .iter()
            .find(|n| n.data["status"] == "logged_out")
            .expect("logout notification");
        assert_eq!(logged_out.data["reason"], "user_logout");

        // No automatic re-initialize after an explicit logout.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.connector.connect_count(), 1);
        shutdown(f).await;
    }

    #[tokio::test]
    async fn upstream_logout_wipes_and_reinitializes_fresh() {
        let f = fixture().await;
        open_connection(&f).await;

        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                logged_out: true,
                ..ConnectionUpdate::default()
            }))
            .await;

        let connector = f.connector.clone();
        wait_until(move || connector.connect_count() == 2).await;
        // Fresh credentials were written by the new pairing attempt.
        let session_dir = f.session_dir.clone();
        wait_until(move || session_dir.join(CREDS_FILE).exists()).await;
        assert_eq!(f.handle.status().state, SessionState::Connecting);
        shutdown(f).await;
    }

    #[tokio::test]
    async fn transient_close_reconnects_and_triggers_backfill() {
        let f = fixture().await;
        open_connection(&f).await;

        // A stored conversation gives the backfill something to anchor on.
        f.store
            .save_message(&MessageInfo {
                id: "M1".to_string(),
                from: "1555@s.whatsapp.net".to_string(),
                from_me: false,
                timestamp: 100,
                kind: "conversation".to_string(),
                push_name: None,
                content: MessageContent::Text {
                    text: "old".to_string(),
                    context_info: None,
                },
            })
            .await
            .unwrap();

        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                ..ConnectionUpdate::default()
            }))
            .await;

        let connector = f.connector.clone();
        wait_until(move || connector.connect_count() == 2).await;

        // Second connection opens; the reconnect triggers history backfill.
        open_connection(&f).await;
        let connector = f.connector.clone();
        wait_until(move || {
            connector
                .latest_socket()
                .map(|s| !s.history_requests().is_empty())
                .unwrap_or(false)
        })
        .await;
        assert_eq!(f.handle.status().reconnect_attempts, 0, "reset after open");
        shutdown(f).await;
    }

    #[tokio::test]
    async fn reconnect_ceiling_forces_fresh_session() {
        let f = fixture_with(SessionSettings {
            max_reconnect_attempts: 1,
            history_settle: Duration::from_millis(5),
            history_chat_delay: Duration::from_millis(1),
            ..SessionSettings::default()
        })
        .await;
        open_connection(&f).await;

        // First transient close: attempt 1, within budget.
        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                ..ConnectionUpdate::default()
            }))
            .await;
        let connector = f.connector.clone();
        wait_until(move || connector.connect_count() == 2).await;

        // Second transient close: attempt 2 exceeds the ceiling of 1.
        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                ..ConnectionUpdate::default()
            }))
            .await;
        let connector = f.connector.clone();
        wait_until(move || connector.connect_count() == 3).await;

        let connections = f.notifier.of_event("connection");
        assert!(
            connections
                .iter()
                .any(|n| n.data["reason"] == "reconnect_limit"),
            "ceiling wipe notifies logged_out with reconnect_limit"
        );
        shutdown(f).await;
    }

    #[tokio::test]
    async fn reconnect_without_credentials_goes_idle() {
        let f = fixture().await;
        open_connection(&f).await;

        // Losing the credential directory makes a reconnect impossible.
        tokio::fs::remove_dir_all(&f.session_dir).await.unwrap();
        f.connector
            .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
                connection: Some(ConnectionState::Close),
                ..ConnectionUpdate::default()
            }))
            .await;

        let handle = f.handle.clone();
        wait_until(move || handle.status().state == SessionState::Idle).await;
        assert_eq!(f.connector.connect_count(), 1, "no reconnect without credentials");
        shutdown(f).await;
    }

    #[tokio::test]
    async fn connected_refresh_merges_business_profile() {
        let f = fixture().await;

        // Script the socket before the open event triggers the refresh.
        let socket = f.connector.latest_socket().unwrap();
        socket.set_self_jid("15559990000:7@s.whatsapp.net");
        socket.set_business_profile(UpstreamBusinessProfile {
            description: Some("Alice's Shop".to_string()),
            business_hours: Some("9-5".to_string()),
            website: Some("https://alice.example".to_string()),
            address: None,
        });

        f.store
            .put_business_info(
                "alice",
                &wagate_core::BusinessInfo {
                    location_url: Some("https://maps.example/alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        open_connection(&f).await;

        let started = std::time::Instant::now();
        loop {
            let refreshed = f
                .store
                .business_info("alice")
                .await
                .unwrap()
                .is_some_and(|i| i.last_updated.is_some());
            if refreshed {
                break;
            }
            if started.elapsed() > Duration::from_secs(2) {
                panic!("business info was not refreshed in time");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let info = f.store.business_info("alice").await.unwrap().unwrap();
        assert_eq!(info.name.as_deref(), Some("Alice's Shop"));
        assert_eq!(info.working_hours.as_deref(), Some("9-5"));
        assert_eq!(info.website_url.as_deref(), Some("https://alice.example"));
        // Fields the upstream did not provide are preserved.
        assert_eq!(
            info.location_url.as_deref(),
            Some("https://maps.example/alice")
        );
        // Device suffix is stripped from the self number.
        assert_eq!(info.mobile_numbers, vec!["15559990000"]);
        shutdown(f).await;
    }
}
