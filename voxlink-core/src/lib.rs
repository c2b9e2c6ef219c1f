//! # voxlink-core
//!
//! Session layer for the VoxLink voice-clip relay client.
//!
//! This crate contains:
//! - **Session**: `SessionHandle`, the connection owner with bounded
//!   exponential-backoff reconnects
//! - **State**: `ConnectionState` machine and the published `ConnectionSnapshot`
//! - **Codec**: `ControlCodec`, JSON control messages and inbound routing
//! - **Audio**: container detection, base64/binary transcoding, temp-file playback
//! - **Events**: `EventBus` with per-kind handlers and a broadcast stream
//! - **Transport**: the `Connector` seam and its WebSocket implementation
//! - **Error**: `VoxError`, a `thiserror` enum mapped onto `ErrorKind`

pub mod audio;
pub mod codec;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod reconnect;
pub mod session;
pub mod state;
pub mod timer;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{AudioFormat, AudioFrame, TempAudioFile};
pub use codec::{ControlCodec, Inbound};
pub use collaborator::{AddressProvider, AudioSink, MicrophoneSource, ProfileStore};
pub use config::{AudioWire, SessionConfig};
pub use error::{ErrorKind, SessionError, VoxError};
pub use event::{EventBus, EventKind, ListenerId, SessionEvent};
pub use message::{ControlKind, ControlMessage, Gender, LookingFor, Partner, Profile, StatsSnapshot};
pub use reconnect::ReconnectPolicy;
pub use session::SessionHandle;
pub use state::{ConnectionSnapshot, ConnectionState};
pub use transport::{
    Connector, Frame, Link, NORMAL_CLOSURE, Outbound, TransportEvent, WsConnector,
};
