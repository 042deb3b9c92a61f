use std::{collections::HashMap, sync::Arc};

use {
    tokio::sync::{RwLock, mpsc},
    tokio_util::sync::CancellationToken,
};

use hagchat_protocol::{Message, SINK_BUFFER_MSGS};

// ── Client sink ──────────────────────────────────────────────────────────────

/// Per-connection delivery handle. The sending half lives in the registry;
/// the receiving half is owned by the connection's stream session.
#[derive(Debug)]
pub struct ClientSink {
    /// Registry identity for this connection.
    pub conn_id: String,
    /// Display label supplied at connect time, reused for the leave message.
    pub label: String,
    /// Bounded delivery buffer for this subscriber.
    sender: mpsc::Sender<Message>,
    /// Cancelled when the consumer is considered gone (buffer overflow or
    /// channel closed). The session observes this and tears down.
    closed: CancellationToken,
}

impl ClientSink {
    /// Create a sink and the receiver its session will drain.
    pub fn new(conn_id: String, label: String) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(SINK_BUFFER_MSGS);
        let sink = Arc::new(Self {
            conn_id,
            label,
            sender,
            closed: CancellationToken::new(),
        });
        (sink, receiver)
    }

    /// Offer a message to this subscriber. Never blocks: returns `false`
    /// when the buffer is full or the receiver is gone.
    pub fn enqueue(&self, msg: Message) -> bool {
        self.sender.try_send(msg).is_ok()
    }

    /// Mark this consumer as gone. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Closure signal for the owning session to select on.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

// ── Relay state ──────────────────────────────────────────────────────────────

/// Process-wide registry of connected sinks, constructed once at startup and
/// shared as `Arc<RelayState>` across request tasks. The single lock covers
/// add, remove, and snapshot as a group.
#[derive(Debug, Default)]
pub struct RelayState {
    clients: RwLock<HashMap<String, Arc<ClientSink>>>,
}

impl RelayState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new subscriber sink.
    pub async fn register_client(&self, sink: Arc<ClientSink>) {
        let conn_id = sink.conn_id.clone();
        self.clients.write().await.insert(conn_id, sink);
    }

    /// Remove a sink by connection id. Returns the removed sink if it was
    /// still present; a second removal for the same id is a no-op, which is
    /// what gates the leave announcement to exactly once.
    pub async fn remove_client(&self, conn_id: &str) -> Option<Arc<ClientSink>> {
        self.clients.write().await.remove(conn_id)
    }

    /// Point-in-time membership for fan-out. Sinks added afterwards miss the
    /// in-flight message; sinks removed afterwards harmlessly receive one
    /// extra that their tearing-down session discards.
    pub async fn snapshot(&self) -> Vec<Arc<ClientSink>> {
        self.clients.read().await.values().cloned().collect()
    }

    /// Number of connected subscribers.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
