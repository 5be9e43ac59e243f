//! Store and chat backends against a mock HTTP server

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use speedwatch::{
    NormalizedRecord,
    error::NotificationError,
    notify::{Notifier, TelegramNotifier},
    reporter::{ErrorReporter, Forwarding},
    storage::{RecordStore, StorageError, events::EventsApiStore},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path, query_param},
};

fn record() -> NormalizedRecord {
    NormalizedRecord {
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        download_mbps: 100.0,
        upload_mbps: 50.0,
        ping_ms: 15.3,
        ping_jitter: Some(1.2),
        ping_low: None,
        ping_high: None,
        dns: [("google".to_string(), Some(8.25))].into_iter().collect(),
        isp: "ExampleISP".to_string(),
        ip: "203.0.113.5".to_string(),
    }
}

#[tokio::test]
async fn test_events_api_accepts_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v0/events"))
        .and(query_param("name", "speedtest"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(serde_json::json!({
            "download_mbps": 100.0,
            "upload_mbps": 50.0,
            "ping_ms": 15.3,
            "dns_google_ms": 8.25,
            "isp": "ExampleISP"
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_string(r#"{"successful_rows": 1, "quarantined_rows": 0}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = EventsApiStore::new(&server.uri(), "speedtest", "secret").unwrap();
    let ack = store.persist(&record()).await.unwrap();

    assert_eq!(ack.status, 202);
    assert_eq!(ack.accepted_rows, 1);
}

#[tokio::test]
async fn test_events_api_server_error_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let store = EventsApiStore::new(&server.uri(), "speedtest", "secret").unwrap();
    let result = store.persist(&record()).await;

    assert_matches!(result, Err(StorageError::Rejected { status: 500, body }) if body == "boom");
}

#[tokio::test]
async fn test_events_api_empty_body_is_not_an_acknowledgement() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let store = EventsApiStore::new(&server.uri(), "speedtest", "secret").unwrap();
    let result = store.persist(&record()).await;

    assert_matches!(
        result,
        Err(StorageError::EmptyAcknowledgement { status: 202, .. })
    );
}

#[tokio::test]
async fn test_events_api_quarantined_row_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_string(r#"{"successful_rows": 0, "quarantined_rows": 1}"#),
        )
        .mount(&server)
        .await;

    let store = EventsApiStore::new(&server.uri(), "speedtest", "secret").unwrap();

    assert_matches!(
        store.persist(&record()).await,
        Err(StorageError::EmptyAcknowledgement { .. })
    );
}

#[tokio::test]
async fn test_unreachable_store_is_connection_failure() {
    // nothing listens on port 1
    let store = EventsApiStore::new("http://127.0.0.1:1", "speedtest", "secret").unwrap();

    assert_matches!(
        store.persist(&record()).await,
        Err(StorageError::ConnectionFailed(_))
    );
}

#[tokio::test]
async fn test_truncated_acknowledgement_is_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buffer = [0u8; 4096];
        while !request.ends_with(b"}") {
            let read = socket.read(&mut buffer).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);
        }

        // announces 100 bytes, then hangs up after six
        socket
            .write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 100\r\n\r\n{\"succ")
            .await
            .unwrap();
    });

    let base_url = format!("http://{address}");
    let store = EventsApiStore::new(&base_url, "speedtest", "secret").unwrap();

    let message = assert_matches!(
        store.persist(&record()).await,
        Err(StorageError::ConnectionFailed(message)) => message
    );
    assert!(message.contains("response body"), "got: {message}");
}

#[tokio::test]
async fn test_telegram_message_is_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(serde_json::json!({
            "chat_id": "42",
            "text": "hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(&server.uri(), "TOKEN", "42");

    notifier.send("hello").await.unwrap();
}

#[tokio::test]
async fn test_telegram_rejection_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(&server.uri(), "TOKEN", "42");

    assert_matches!(
        notifier.send("hello").await,
        Err(NotificationError::Rejected { status: 401, .. })
    );
}

#[tokio::test]
async fn test_forwarded_error_is_sent_as_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok": true}"#))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = TelegramNotifier::new(&server.uri(), "TOKEN", "42");
    let reporter = ErrorReporter::new(Arc::new(notifier), true);

    // underscores are unbalanced Markdown and must reach the chat untouched
    let message = "Speed test failed during startup: STORE_TOKEN is not set";
    assert_matches!(reporter.report(message).await, Forwarding::Delivered);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body["text"], message);
    assert!(body.get("parse_mode").is_none(), "got: {body}");
}
