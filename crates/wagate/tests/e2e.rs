// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the complete gateway pipeline.
//!
//! Each test wires the real store, ingestion pipeline, and webhook
//! dispatcher against a mock upstream socket and a wiremock HTTP target.
//! Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use wagate_core::traits::upstream::{ConnectionState, ConnectionUpdate, UpstreamEvent};
use wagate_core::{IngestSink, MessageStore, Webhook};
use wagate_ingest::{IngestService, IngestSettings};
use wagate_session::{SessionSettings, SessionState, TenantManager};
use wagate_storage::SqliteStore;
use wagate_test_utils::MockConnector;
use wagate_webhook::{verify, WebhookDispatcher};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    store: Arc<SqliteStore>,
    ingest: Arc<IngestService>,
    manager: TenantManager,
    connector: Arc<MockConnector>,
    server: MockServer,
    dir: tempfile::TempDir,
}

fn fast_settings(dir: &std::path::Path) -> IngestSettings {
    IngestSettings {
        log_path: dir.join("ingestion.log"),
        checkpoint_path: dir.join("ingestion.offset"),
        dlq_path: dir.join("dlq.log"),
        queue_capacity: 256,
        batch_size: 20,
        batch_max_wait: Duration::from_millis(20),
        workers: 2,
        retry_base_ms: 5,
        retry_max_ms: 50,
        retry_max_attempts: 3,
        retry_max_horizon_ms: 60_000,
        checkpoint_interval: 50,
        enqueue_poll: Duration::from_millis(5),
        eof_poll: Duration::from_millis(10),
        idle_poll: Duration::from_millis(10),
        ready_max_queue_depth: 230,
    }
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let db_path = dir.path().join("wagate.db");
    let store = Arc::new(SqliteStore::open(db_path.to_str().unwrap()).await.unwrap());
    store
        .add_webhook(
            "alice",
            &Webhook {
                id: "wh-1".to_string(),
                url: format!("{}/hook", server.uri()),
                name: Some("crm".to_string()),
                secret: "s3cret-1".to_string(),
                is_active: true,
            },
        )
        .await
        .unwrap();

    let ingest = IngestService::new(fast_settings(dir.path()), store.clone())
        .await
        .unwrap();
    ingest.spawn().await;

    let notifier = Arc::new(WebhookDispatcher::new(store.clone()).unwrap());
    let connector = MockConnector::new();
    let manager = TenantManager::new(
        dir.path().join("sessions"),
        connector.clone(),
        store.clone(),
        ingest.clone() as Arc<dyn IngestSink>,
        notifier,
        SessionSettings {
            history_settle: Duration::from_millis(5),
            history_chat_delay: Duration::from_millis(1),
            ..SessionSettings::default()
        },
    );

    Harness {
        store,
        ingest,
        manager,
        connector,
        server,
        dir,
    }
}

async fn wait_until<F, Fut>(what: &str, done: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let started = std::time::Instant::now();
    loop {
        if done().await {
            return;
        }
        if started.elapsed() > Duration::from_secs(5) {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn connect_alice(h: &Harness) {
    let handle = h.manager.session("alice");
    let connector = &h.connector;
    wait_until("initial connect", || async {
        connector.connect_count() >= 1
    })
    .await;

    h.connector
        .emit(UpstreamEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(ConnectionState::Open),
            ..ConnectionUpdate::default()
        }))
        .await;

    wait_until("connected state", || async {
        handle.status().state == SessionState::Connected
    })
    .await;
}

fn event_type(request: &wiremock::Request) -> Option<String> {
    request
        .headers
        .get("X-Event-Type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn scenario_message(id: &str, from: &str, text: &str) -> serde_json::Value {
    json!({
        "key": {"id": id, "remoteJid": from, "fromMe": false},
        "messageTimestamp": 1_700_000_000,
        "message": {"conversation": text},
        "pushName": "Bob",
    })
}

// ---- Single-message happy path ----

#[tokio::test]
async fn message_flows_from_upstream_to_store_and_webhook() {
    let h = harness().await;
    connect_alice(&h).await;

    h.connector
        .emit(UpstreamEvent::MessagesUpsert {
            kind: "notify".to_string(),
            messages: vec![scenario_message("A1", "1555@s.whatsapp.net", "hi")],
        })
        .await;

    // The message reaches the store with its chat row.
    let store = &h.store;
    wait_until("message persisted", || async {
        !store
            .list_messages("1555@s.whatsapp.net", 10, None)
            .await
            .unwrap()
            .is_empty()
    })
    .await;

    let messages = h
        .store
        .list_messages("1555@s.whatsapp.net", 10, None)
        .await
        .unwrap();
    assert_eq!(messages[0].id, "A1");
    assert_eq!(messages[0].kind, "conversation");

    let chats = h.store.list_conversations(10, None).await.unwrap();
    let chat = chats
        .iter()
        .find(|c| c.jid == "1555@s.whatsapp.net")
        .expect("chat row exists");
    assert_eq!(chat.last_message_timestamp, Some(1_700_000_000));

    // Exactly one journal record for the message.
    let log = tokio::fs::read_to_string(h.dir.path().join("ingestion.log"))
        .await
        .unwrap();
    assert_eq!(
        log.lines()
            .filter(|l| l.contains(r#""idempotencyKey":"wa:A1""#))
            .count(),
        1
    );

    // The webhook fired with a verifiable signature.
    let server = &h.server;
    wait_until("webhook delivery", || async {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .any(|r| event_type(r) == Some("message.received".to_string()))
    })
    .await;

    let requests = h.server.received_requests().await.unwrap();
    let delivery = requests
        .iter()
        .find(|r| event_type(r) == Some("message.received".to_string()))
        .unwrap();
    let signature = delivery
        .headers
        .get("X-Signature")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(verify(&delivery.body, "s3cret-1", signature));

    let payload: serde_json::Value = serde_json::from_slice(&delivery.body).unwrap();
    assert_eq!(payload["event"], "message.received");
    assert_eq!(payload["username"], "alice");
    assert_eq!(payload["data"]["message"]["id"], "A1");
    assert_eq!(payload["data"]["message"]["content"]["text"], "hi");

    h.manager.shutdown().await;
    h.ingest.shutdown(Duration::from_millis(50)).await;
}

// ---- Exclusion filtering ----

#[tokio::test]
async fn excluded_sender_is_persisted_but_not_delivered() {
    let h = harness().await;
    h.store
        .add_excluded_number("alice", "+15551234567")
        .await
        .unwrap();
    connect_alice(&h).await;

    h.connector
        .emit(UpstreamEvent::MessagesUpsert {
            kind: "notify".to_string(),
            messages: vec![scenario_message("X1", "15551234567@s.whatsapp.net", "spam")],
        })
        .await;

    let store = &h.store;
    wait_until("message persisted", || async {
        !store
            .list_messages("15551234567@s.whatsapp.net", 10, None)
            .await
            .unwrap()
            .is_empty()
    })
    .await;

    // Give the dispatcher time to (not) deliver, then assert absence.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let requests = h.server.received_requests().await.unwrap();
    assert!(
        !requests
            .iter()
            .any(|r| event_type(r) == Some("message.received".to_string())),
        "no message.received webhook for an excluded sender"
    );

    h.manager.shutdown().await;
    h.ingest.shutdown(Duration::from_millis(50)).await;
}

// ---- Crash-replay ----

#[tokio::test]
async fn restart_replays_journal_into_the_store() {
    let dir = tempfile::tempdir().unwrap();

    // First process: journal 100 messages with no pipeline running, then
    // "crash" (drop everything before persistence).
    {
        let db_path = dir.path().join("wagate.db");
        let store = Arc::new(SqliteStore::open(db_path.to_str().unwrap()).await.unwrap());
        let ingest = IngestService::new(fast_settings(dir.path()), store.clone())
            .await
            .unwrap();
        for i in 0..100 {
            let accepted = ingest
                .submit(wagate_core::MessageInfo {
                    id: format!("M{i}"),
                    from: "1555@s.whatsapp.net".to_string(),
                    from_me: false,
                    timestamp: 1_700_000_000 + i,
                    kind: "conversation".to_string(),
                    push_name: None,
                    content: wagate_core::MessageContent::Text {
                        text: format!("msg {i}"),
                        context_info: None,
                    },
                })
                .await;
            assert!(accepted);
        }
        assert!(store
            .list_messages("1555@s.whatsapp.net", 200, None)
            .await
            .unwrap()
            .is_empty());
        store.close().await.unwrap();
    }

    // Restart: replay delivers everything exactly once.
    let db_path = dir.path().join("wagate.db");
    let store = Arc::new(SqliteStore::open(db_path.to_str().unwrap()).await.unwrap());
    let ingest = IngestService::new(fast_settings(dir.path()), store.clone())
        .await
        .unwrap();
    ingest.spawn().await;

    let store_check = &store;
    wait_until("replayed persistence", || async {
        store_check
            .list_messages("1555@s.whatsapp.net", 200, None)
            .await
            .unwrap()
            .len()
            == 100
    })
    .await;

    // Checkpoint settles at the final log size.
    let log_size = tokio::fs::metadata(dir.path().join("ingestion.log"))
        .await
        .unwrap()
        .len();
    let checkpoint_path = dir.path().join("ingestion.offset");
    wait_until("checkpoint at EOF", || async {
        tokio::fs::read_to_string(&checkpoint_path)
            .await
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            == Some(log_size)
    })
    .await;

    ingest.shutdown(Duration::from_millis(50)).await;
    store.close().await.unwrap();
}

// ---- Ops surface ----

#[tokio::test]
async fn ops_endpoints_report_health_ready_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wagate.db");
    let store = Arc::new(SqliteStore::open(db_path.to_str().unwrap()).await.unwrap());
    let ingest = IngestService::new(fast_settings(dir.path()), store.clone())
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = wagate::ops::router(ingest.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let health = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
    let body: serde_json::Value = health.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert!(body["counters"]["received"].is_u64());

    let ready = client.get(format!("{base}/ready")).send().await.unwrap();
    assert_eq!(ready.status(), 200);
    let body: serde_json::Value = ready.json().await.unwrap();
    assert_eq!(body["ready"], true);
    assert_eq!(body["threshold"], 230);

    let metrics = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), 200);
    let body: serde_json::Value = metrics.json().await.unwrap();
    assert_eq!(body["queueDepth"], 0);
    assert!(body["counters"]["persisted"].is_u64());
    assert!(body["checkpointOffset"].is_u64());

    store.close().await.unwrap();
}
