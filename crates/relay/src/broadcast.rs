use std::sync::Arc;

use tracing::{debug, warn};

use hagchat_protocol::Message;

use crate::state::RelayState;

/// Fan one message out to every sink in the current registry snapshot.
///
/// Each offer is a non-blocking enqueue, so one full or closed sink never
/// delays delivery to the others. A failed offer marks that sink's consumer
/// as gone; its session tears down (and announces the leave) on its own. The
/// publisher gets no delivery feedback.
pub async fn broadcast(state: &Arc<RelayState>, msg: &Message) {
    let sinks = state.snapshot().await;
    debug!(kind = %msg.kind, clients = sinks.len(), "broadcasting message");
    for sink in sinks {
        if !sink.enqueue(msg.clone()) {
            warn!(
                conn_id = %sink.conn_id,
                label = %sink.label,
                "delivery buffer full or closed, dropping consumer"
            );
            sink.close();
        }
    }
}
