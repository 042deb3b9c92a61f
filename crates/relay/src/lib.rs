//! The relay core: connection registry, broadcast fan-out, and the
//! per-connection stream session, plus the axum server that exposes them.
//!
//! Layering, leaves first:
//! - [`state`] — the registry of connected delivery sinks.
//! - [`broadcast`] — fans one message out to every registered sink.
//! - [`stream`] — drives one subscriber connection through its lifecycle.
//! - [`server`] — HTTP routes (`/stream`, `/post`, `/health`).

pub mod broadcast;
pub mod server;
pub mod state;
pub mod stream;
