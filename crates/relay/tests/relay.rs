#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the relay HTTP surface: subscribe stream, publish
//! endpoint, and the join/leave lifecycle as seen over the wire.

use std::{net::SocketAddr, time::Duration};

use {bytes::Bytes, futures::StreamExt, tokio::net::TcpListener};

use hagchat_relay::{server::build_relay_app, state::RelayState};

/// Spin up a test relay on an ephemeral port, return the bound address.
async fn start_test_server() -> SocketAddr {
    let state = RelayState::new();
    let app = build_relay_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A subscriber's view of the push stream: buffers the chunked response body
/// and yields one parsed JSON record per line.
struct Subscriber {
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buf: Vec<u8>,
}

impl Subscriber {
    async fn connect(addr: SocketAddr, label: &str) -> Self {
        let resp = reqwest::get(format!("http://{addr}/stream?email={label}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        Self {
            stream: Box::pin(resp.bytes_stream()),
            buf: Vec::new(),
        }
    }

    async fn next_record(&mut self) -> serde_json::Value {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                return serde_json::from_slice(&line[..line.len() - 1]).unwrap();
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for a record")
                .expect("stream ended unexpectedly")
                .expect("stream read failed");
            self.buf.extend_from_slice(&chunk);
        }
    }
}

async fn publish(addr: SocketAddr, fields: &[(&str, &str)]) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/post"))
        .form(fields)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn health_endpoint_returns_json() {
    let addr = start_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["clients"], 0);
}

#[tokio::test]
async fn stream_rejects_missing_or_invalid_label() {
    let addr = start_test_server().await;

    let resp = reqwest::get(format!("http://{addr}/stream")).await.unwrap();
    assert_eq!(resp.status(), 400);

    // 31 bytes: over the limit.
    let long = "a".repeat(31);
    let resp = reqwest::get(format!("http://{addr}/stream?email={long}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = reqwest::get(format!("http://{addr}/stream?email=al%20ice"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn label_at_limit_is_accepted() {
    let addr = start_test_server().await;
    let label = "a".repeat(30);
    let mut sub = Subscriber::connect(addr, &label).await;
    let welcome = sub.next_record().await;
    assert_eq!(welcome["type"], "welcome");
}

#[tokio::test]
async fn publish_rejects_invalid_fields_with_zero_deliveries() {
    let addr = start_test_server().await;
    let mut alice = Subscriber::connect(addr, "alice").await;
    // Drain the welcome and alice's own join announcement.
    assert_eq!(alice.next_record().await["type"], "welcome");
    assert_eq!(alice.next_record().await["type"], "join");

    // Body with a space: rejected, nothing delivered.
    assert_eq!(
        publish(addr, &[("email", "bob"), ("text", "hi there")]).await,
        400
    );
    // Missing body.
    assert_eq!(publish(addr, &[("email", "bob")]).await, 400);
    // Invalid kind.
    assert_eq!(
        publish(addr, &[("email", "bob"), ("text", "hi"), ("type", "a b")]).await,
        400
    );

    // A valid publish goes through, and is the next thing alice sees —
    // nothing from the rejected attempts ever reached her stream.
    assert_eq!(publish(addr, &[("email", "bob"), ("text", "ping")]).await, 200);
    let record = alice.next_record().await;
    assert_eq!(
        record,
        serde_json::json!({"email": "bob", "text": "ping", "type": "text"})
    );
}

#[tokio::test]
async fn full_join_publish_leave_scenario() {
    let addr = start_test_server().await;

    let mut alice = Subscriber::connect(addr, "alice").await;
    let welcome = alice.next_record().await;
    assert_eq!(
        welcome,
        serde_json::json!({"text": "Welcome to hagenberg chat!", "type": "welcome"})
    );
    assert_eq!(
        alice.next_record().await,
        serde_json::json!({"text": "alice joined the chat.", "type": "join"})
    );

    let mut bob = Subscriber::connect(addr, "bob").await;
    assert_eq!(bob.next_record().await["type"], "welcome");
    assert_eq!(
        alice.next_record().await,
        serde_json::json!({"text": "bob joined the chat.", "type": "join"})
    );
    assert_eq!(
        bob.next_record().await,
        serde_json::json!({"text": "bob joined the chat.", "type": "join"})
    );

    // Publish with the kind omitted: defaults to "text", delivered to both.
    assert_eq!(publish(addr, &[("email", "bob"), ("text", "hi")]).await, 200);
    let expected = serde_json::json!({"email": "bob", "text": "hi", "type": "text"});
    assert_eq!(alice.next_record().await, expected);
    assert_eq!(bob.next_record().await, expected);

    // Bob's connection is forcibly closed; alice sees the leave.
    drop(bob);
    assert_eq!(
        alice.next_record().await,
        serde_json::json!({"text": "bob left the chat.", "type": "leave"})
    );

    // And the registry reflects the departure.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let json: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json["clients"] == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "bob never deregistered");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn custom_kind_is_passed_through() {
    let addr = start_test_server().await;
    let mut alice = Subscriber::connect(addr, "alice").await;
    alice.next_record().await;
    alice.next_record().await;

    assert_eq!(
        publish(addr, &[("email", "bob"), ("text", "brb"), ("type", "status")]).await,
        200
    );
    assert_eq!(
        alice.next_record().await,
        serde_json::json!({"email": "bob", "text": "brb", "type": "status"})
    );
}
