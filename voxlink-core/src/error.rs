//! Domain-specific error types for the VoxLink session layer.
//!
//! All fallible operations return `Result<T, VoxError>`.
//! Every variant maps onto one [`ErrorKind`], the coarse taxonomy surfaced
//! to callers through the event stream.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::ConnectionState;

/// The canonical error type for the VoxLink session layer.
#[derive(Debug, Error)]
pub enum VoxError {
    // ── Connection Errors ────────────────────────────────────────
    /// A connection attempt did not open within its deadline.
    #[error("connection attempt timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The underlying socket or channel failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay address could not be parsed or uses an unsupported scheme.
    #[error("invalid relay address: {0}")]
    InvalidAddress(String),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Protocol Errors ──────────────────────────────────────────
    /// A control payload was malformed or had an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The relay reported an error through the control plane.
    #[error("server error: {0}")]
    Server(String),

    // ── Audio Errors ─────────────────────────────────────────────
    /// A base64 audio payload could not be decoded.
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The audio payload could not be handled in its detected container.
    #[error("unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    /// A local I/O operation (recording, temporary playback file) failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    // ── Lifecycle Errors ─────────────────────────────────────────
    /// A send was attempted while the connection was not open.
    #[error("not connected (state: {state})")]
    NotConnected { state: ConnectionState },

    /// The reconnect budget is exhausted.
    #[error("gave up after {attempts} reconnect attempts")]
    MaxRetryExceeded { attempts: u32 },

    /// A state transition was requested from a state that does not allow it.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// The session was destroyed and accepts no further operations.
    #[error("session destroyed")]
    Destroyed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl VoxError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            Self::Transport(_) | Self::WebSocket(_) | Self::ChannelClosed | Self::Other(_) => {
                ErrorKind::TransportError
            }
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::Protocol(_) | Self::Json(_) | Self::Base64(_) | Self::InvalidTransition(_) => {
                ErrorKind::ProtocolError
            }
            Self::Server(_) => ErrorKind::Server,
            Self::UnsupportedAudioFormat(_) => ErrorKind::UnsupportedAudioFormat,
            Self::Io(_) => ErrorKind::Io,
            Self::NotConnected { .. } => ErrorKind::NotConnected,
            Self::MaxRetryExceeded { .. } => ErrorKind::MaxRetryExceeded,
            Self::Destroyed => ErrorKind::Destroyed,
        }
    }
}

// ── ErrorKind ─────────────────────────────────────────────────────

/// Coarse error taxonomy carried on events and in connection snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A connection attempt exceeded its deadline.
    ConnectionTimeout,
    /// Socket or channel failure.
    TransportError,
    /// Malformed control payload.
    ProtocolError,
    /// Undecodable audio container; playback falls back to a best effort.
    UnsupportedAudioFormat,
    /// A send was attempted outside the `Open` state.
    NotConnected,
    /// The retry budget is exhausted.
    MaxRetryExceeded,
    /// The relay address was rejected before any I/O.
    InvalidAddress,
    /// The relay sent an `error` control message.
    Server,
    /// Local file or device I/O failed.
    Io,
    /// The session no longer accepts operations.
    Destroyed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionTimeout => "ConnectionTimeout",
            Self::TransportError => "TransportError",
            Self::ProtocolError => "ProtocolError",
            Self::UnsupportedAudioFormat => "UnsupportedAudioFormat",
            Self::NotConnected => "NotConnected",
            Self::MaxRetryExceeded => "MaxRetryExceeded",
            Self::InvalidAddress => "InvalidAddress",
            Self::Server => "Server",
            Self::Io => "Io",
            Self::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

// ── SessionError ──────────────────────────────────────────────────

/// Cloneable error description delivered to event listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&VoxError> for SessionError {
    fn from(e: &VoxError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VoxError {
    fn from(s: String) -> Self {
        VoxError::Other(s)
    }
}

impl From<&str> for VoxError {
    fn from(s: &str) -> Self {
        VoxError::Other(s.to_string())
    }
}

impl From<url::ParseError> for VoxError {
    fn from(e: url::ParseError) -> Self {
        VoxError::InvalidAddress(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VoxError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VoxError::ChannelClosed
    }
}
