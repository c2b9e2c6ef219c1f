//! Connection state machine owned by the session driver.
//!
//! Provides a `ConnectionState` enum that models the full lifecycle of
//! the relay connection, with validated transitions that return
//! `Result` instead of panicking.

use std::fmt;

use crate::error::VoxError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current state of the relay connection.
///
/// ```text
///              ┌──────────────────────────────┐
///              ▼                              │
///  Idle ──► Connecting ──► Open ──► Closing ──► Closed
///              │  ▲          │
///              │  │          ▼
///              │  └──── Reconnecting ──► Failed
///              └─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never connected, or returned here by `reset()`.
    #[default]
    Idle,

    /// A transport open is in flight, guarded by the connect timeout.
    Connecting,

    /// The transport is open; sends are accepted.
    Open,

    /// A caller-initiated close is being written.
    Closing,

    /// Closed on purpose. Terminal until the next explicit `connect()`.
    Closed,

    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,

    /// The retry budget is exhausted. Terminal until the next explicit `connect()`.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Reconnecting => "Reconnecting",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

impl ConnectionState {
    /// Returns `true` when sends are accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` while an attempt is in flight or established.
    ///
    /// `connect()` is a no-op in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` for the states that wait on an explicit `connect()`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Idle`, `Closed`, `Failed`, `Reconnecting`.
    pub fn begin_connect(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Idle | Self::Closed | Self::Failed | Self::Reconnecting => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition(
                "cannot connect: an attempt is already in flight or open",
            )),
        }
    }

    /// Transition to `Open`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_open(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Connecting => {
                *self = Self::Open;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition(
                "cannot open: not in Connecting state",
            )),
        }
    }

    /// Transition to `Closing`.
    ///
    /// Valid from: `Open`.
    pub fn begin_close(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Open => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition("cannot close: not in Open state")),
        }
    }

    /// Transition to `Closed`.
    ///
    /// Valid from: `Closing`, and from `Connecting`, `Open`, `Reconnecting`,
    /// `Failed` when the close is caller-initiated or the peer closed normally.
    pub fn finish_close(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Closing
            | Self::Connecting
            | Self::Open
            | Self::Reconnecting
            | Self::Failed => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition(
                "cannot finish close: nothing to close",
            )),
        }
    }

    /// Transition to `Reconnecting` after an abnormal closure.
    ///
    /// Valid from: `Connecting`, `Open`.
    pub fn begin_reconnect(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Connecting | Self::Open => {
                *self = Self::Reconnecting;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition(
                "cannot reconnect: no attempt was in flight",
            )),
        }
    }

    /// Transition to `Failed`.
    ///
    /// Valid from: `Connecting`, `Open`, `Reconnecting`.
    pub fn fail(&mut self) -> Result<(), VoxError> {
        match self {
            Self::Connecting | Self::Open | Self::Reconnecting => {
                *self = Self::Failed;
                Ok(())
            }
            _ => Err(VoxError::InvalidTransition(
                "cannot fail: not connecting, open or reconnecting",
            )),
        }
    }

    /// Force-reset to `Idle` regardless of current state.
    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

// ── Tests ────────────────────────────────────────────────────────
