//! Broadcast frames and their event-stream encoding
//!
//! Every unit pushed to subscribers is a [`Frame`]. On the wire a frame is a
//! single server-sent event:
//!
//! ```text
//! data: {"content":"Hel"}\n\n      Token
//! data: [DONE]\n\n                 Done
//! data: {"error":"timeout"}\n\n    Error
//! ```

use std::fmt;

use serde_json::json;

/// Literal payload of the terminal success frame
pub const DONE_MARKER: &str = "[DONE]";

/// One unit of broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Incremental text fragment
    Token {
        /// Fragment text
        text: String,
    },
    /// The generation run finished normally
    Done,
    /// The generation run failed
    Error {
        /// Human-readable failure message
        message: String,
    },
}

impl Frame {
    /// Create a token frame
    pub fn token(text: impl Into<String>) -> Self {
        Self::Token { text: text.into() }
    }

    /// Create an error frame
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this frame ends a generation run
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }

    /// Payload carried in the event's `data:` field
    #[must_use]
    pub fn sse_data(&self) -> String {
        match self {
            Self::Token { text } => json!({ "content": text }).to_string(),
            Self::Done => DONE_MARKER.to_string(),
            Self::Error { message } => json!({ "error": message }).to_string(),
        }
    }

    /// Complete event text, including the blank-line terminator
    #[must_use]
    pub fn encode(&self) -> String {
        format!("data: {}\n\n", self.sse_data())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token { text } => write!(f, "token({} bytes)", text.len()),
            Self::Done => write!(f, "done"),
            Self::Error { message } => write!(f, "error({message})"),
        }
    }
}
