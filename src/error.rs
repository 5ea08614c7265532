//! Error taxonomy for a single listener.
//!
//! Propagation policy:
//! - `TransportError` and `AuthError` end the current session and
//!   send the listener back through the reconnect delay
//! - `ParseError` and `SinkError` are contained where they happen
//!   (logged + counted, frame dropped)
//!
//! Startup failures (config, credentials, sink init) are not part of
//! this taxonomy; they surface as `anyhow::Error` from `main`.

use thiserror::Error;

// ------------------------------------------------------------
// Transport
// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("connection closed by server: {0}")]
    Closed(String),

    #[error("stream ended")]
    StreamEnded,

    #[error("no inbound traffic for {0}s")]
    PongTimeout(u64),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(value))
    }
}

// ------------------------------------------------------------
// Session provisioning (signed REST)
// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Non-2xx answer. Clock-skew rejections land here too; they are
    /// reported, not retried.
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(value.to_string())
    }
}

// ------------------------------------------------------------
// Inbound frame normalization
// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("exchange reported error: {0}")]
    Exchange(String),

    #[error("undecodable binary frame ({0} bytes)")]
    Binary(usize),
}

// ------------------------------------------------------------
// Sink
// ------------------------------------------------------------
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

// ------------------------------------------------------------
// Session end
// ------------------------------------------------------------
//
// Why a connection session ended. Only these two classes escalate
// to the reconnect controller.
//
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}
