use std::{convert::Infallible, sync::Arc, time::Instant};

use {
    bytes::Bytes,
    futures::Stream,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use hagchat_protocol::Message;

use crate::{
    broadcast::broadcast,
    state::{ClientSink, RelayState},
};

/// One subscriber connection's lifecycle: register, announce the join, pump
/// broadcast messages to the transport, then deregister and announce the
/// leave.
///
/// Teardown is driven by the sink's cancellation token, not by the response
/// body: a watchdog task spawned at connect awaits the token and performs
/// deregistration plus the leave announcement. Every way a session can end
/// resolves to that token — the broadcaster cancels it on buffer overflow
/// (a stalled transport may never poll the body again, so the body alone
/// cannot be trusted to observe this), and the guard's `Drop` cancels it
/// when the peer disconnects or a write fails.
pub struct StreamSession {
    conn_id: String,
    closed: CancellationToken,
}

impl StreamSession {
    /// Connect a new subscriber: build its sink, deliver the welcome message
    /// directly (before registration, so nothing can precede it), register,
    /// announce the join, and spawn the teardown watchdog.
    pub async fn connect(
        state: &Arc<RelayState>,
        label: String,
    ) -> (Self, mpsc::Receiver<Message>) {
        let conn_id = uuid::Uuid::new_v4().to_string();
        info!(conn_id = %conn_id, label = %label, "stream: new connection");

        let (sink, receiver) = ClientSink::new(conn_id.clone(), label.clone());
        // The buffer is fresh, so the direct welcome delivery cannot fail.
        sink.enqueue(Message::welcome());
        let closed = sink.closed();
        state.register_client(sink).await;
        broadcast(state, &Message::join(&label)).await;

        // Teardown watchdog: the first removal wins, so the racing closure
        // paths (overflow, write failure, peer disconnect) announce at most
        // one leave.
        let watchdog_state = Arc::clone(state);
        let watchdog_token = closed.clone();
        let watchdog_conn_id = conn_id.clone();
        let connected_at = Instant::now();
        tokio::spawn(async move {
            watchdog_token.cancelled().await;
            if watchdog_state.remove_client(&watchdog_conn_id).await.is_some() {
                info!(
                    conn_id = %watchdog_conn_id,
                    label = %label,
                    duration_secs = connected_at.elapsed().as_secs(),
                    "stream: connection closed"
                );
                broadcast(&watchdog_state, &Message::leave(&label)).await;
            }
        });

        let session = Self { conn_id, closed };
        (session, receiver)
    }

    /// Turn the session into the long-lived response body: one serialized
    /// JSON record per line, until the peer disconnects or the sink is
    /// closed. An idle session waits indefinitely.
    pub fn into_body_stream(
        self,
        mut receiver: mpsc::Receiver<Message>,
    ) -> impl Stream<Item = Result<Bytes, Infallible>> {
        async_stream::stream! {
            let session = self;
            loop {
                tokio::select! {
                    // Closure wins over buffered records.
                    biased;
                    _ = session.closed.cancelled() => {
                        debug!(conn_id = %session.conn_id, "stream: sink closed");
                        break;
                    },
                    next = receiver.recv() => match next {
                        Some(msg) => match serde_json::to_string(&msg) {
                            Ok(mut line) => {
                                line.push('\n');
                                yield Ok(Bytes::from(line));
                            },
                            // Skip this one record; the stream continues.
                            Err(e) => warn!(
                                conn_id = %session.conn_id,
                                error = %e,
                                "stream: failed to serialize message"
                            ),
                        },
                        None => break,
                    },
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        // Peer disconnect and write failure surface as the body stream being
        // dropped; resolve them to the token so the watchdog spawned at
        // connect performs the deregistration and leave announcement.
        self.closed.cancel();
    }
}
