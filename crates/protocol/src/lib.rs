//! Relay wire protocol: the broadcast message record plus the validation
//! rules for its fields.
//!
//! The wire form is one JSON object per line, pushed over a long-lived
//! response: `{"email":"...","text":"...","type":"..."}`. Empty fields are
//! omitted. Field names on the wire (`email`, `text`, `type`) are the
//! external contract; the Rust names (`sender`, `body`, `kind`) are the
//! domain names.

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Maximum sender label length, in bytes.
pub const MAX_LABEL_BYTES: usize = 30;
/// Maximum message body (and kind tag) length, in bytes.
pub const MAX_BODY_BYTES: usize = 255;
/// Bounded capacity of each subscriber's delivery buffer. A consumer that
/// falls this many messages behind is treated as disconnected.
pub const SINK_BUFFER_MSGS: usize = 64;
/// Default listen port when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Body of the welcome message pushed to every new subscriber.
pub const WELCOME_TEXT: &str = "Welcome to hagenberg chat!";

// ── Message kinds ────────────────────────────────────────────────────────────

/// Well-known values for [`Message::kind`]. The field is a free-form tag;
/// publishers may supply their own.
pub mod kinds {
    pub const TEXT: &str = "text";
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const WELCOME: &str = "welcome";
}

// ── Message ──────────────────────────────────────────────────────────────────

/// One broadcast message. Immutable once constructed; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Display label of the publisher. Empty for system messages
    /// (welcome/join/leave), in which case it is omitted from the wire.
    #[serde(rename = "email", default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
    /// Message body.
    #[serde(rename = "text", default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Message kind tag.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
}

impl Message {
    /// A user-published message.
    pub fn text(sender: impl Into<String>, body: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            kind: kind.into(),
        }
    }

    /// The welcome message delivered directly to a new subscriber.
    pub fn welcome() -> Self {
        Self {
            sender: String::new(),
            body: WELCOME_TEXT.into(),
            kind: kinds::WELCOME.into(),
        }
    }

    /// The join announcement broadcast when `label` connects.
    pub fn join(label: &str) -> Self {
        Self {
            sender: String::new(),
            body: format!("{label} joined the chat."),
            kind: kinds::JOIN.into(),
        }
    }

    /// The leave announcement broadcast when `label` disconnects.
    pub fn leave(label: &str) -> Self {
        Self {
            sender: String::new(),
            body: format!("{label} left the chat."),
            kind: kinds::LEAVE.into(),
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Reason a label, body, or kind field was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("value is empty")]
    Empty,
    #[error("value is {len} bytes, limit is {limit}")]
    TooLong { limit: usize, len: usize },
    #[error("value contains whitespace")]
    IllegalWhitespace,
}

/// Space, tab, newline, and carriage return are rejected in every field.
fn has_illegal_whitespace(value: &str) -> bool {
    value.bytes().any(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}

fn validate(value: &str, limit: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty);
    }
    if value.len() > limit {
        return Err(ValidationError::TooLong {
            limit,
            len: value.len(),
        });
    }
    if has_illegal_whitespace(value) {
        return Err(ValidationError::IllegalWhitespace);
    }
    Ok(())
}

/// Validate a sender/display label (1–30 bytes, no whitespace).
pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    validate(label, MAX_LABEL_BYTES)
}

/// Validate a message body (1–255 bytes, no whitespace).
pub fn validate_body(body: &str) -> Result<(), ValidationError> {
    validate(body, MAX_BODY_BYTES)
}

/// Validate a kind tag. Same rule as the body.
pub fn validate_kind(kind: &str) -> Result<(), ValidationError> {
    validate(kind, MAX_BODY_BYTES)
}
