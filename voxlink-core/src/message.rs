//! Control-plane message types.
//!
//! `ControlMessage` is the tagged union carried as JSON text frames. The
//! `type` field selects the variant; every variant is listed so dispatch
//! sites match exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Profile ──────────────────────────────────────────────────────

/// Self-description sent with a `find_match` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub age: u32,
    pub gender: Gender,
    pub looking_for: LookingFor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookingFor {
    Male,
    Female,
    Any,
}

// ── Partner ──────────────────────────────────────────────────────

/// The peer the relay matched us with.
///
/// Unknown fields are kept in `extra` so newer servers can add data
/// without breaking older clients.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

// ── StatsSnapshot ────────────────────────────────────────────────

/// Presence figures pushed by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub users_online: u64,
}

// ── ControlMessage ───────────────────────────────────────────────

/// Every message the control plane carries, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    // ── Server → client ──────────────────────────────────────────
    /// Greeting sent by the relay once the socket is accepted.
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A partner was found for our last `find_match`.
    MatchFound { partner: Partner },
    /// The current match ended.
    MatchEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// No partner is available right now.
    NoMatches,
    /// The partner's connection dropped.
    PartnerDisconnected,
    /// Presence update.
    StatsUpdate { stats: StatsSnapshot },
    /// The relay rejected something we did.
    Error { message: String },

    // ── Client → server ──────────────────────────────────────────
    /// Ask the relay to pair us with someone.
    FindMatch { profile: Profile },
    /// Leave the current match but keep the connection.
    EndMatch,
    /// Leave the relay; sent before a caller-initiated close.
    EndSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl ControlMessage {
    pub fn kind(&self) -> ControlKind {
        match self {
            Self::Connected { .. } => ControlKind::Connected,
            Self::MatchFound { .. } => ControlKind::MatchFound,
            Self::MatchEnded { .. } => ControlKind::MatchEnded,
            Self::NoMatches => ControlKind::NoMatches,
            Self::PartnerDisconnected => ControlKind::PartnerDisconnected,
            Self::StatsUpdate { .. } => ControlKind::StatsUpdate,
            Self::Error { .. } => ControlKind::Error,
            Self::FindMatch { .. } => ControlKind::FindMatch,
            Self::EndMatch => ControlKind::EndMatch,
            Self::EndSession { .. } => ControlKind::EndSession,
        }
    }

    /// `end_session` without a reason.
    pub fn end_session() -> Self {
        Self::EndSession { reason: None }
    }
}

// ── ControlKind ──────────────────────────────────────────────────

/// The `type` discriminator of a [`ControlMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Connected,
    MatchFound,
    MatchEnded,
    NoMatches,
    PartnerDisconnected,
    StatsUpdate,
    Error,
    FindMatch,
    EndMatch,
    EndSession,
}

impl ControlKind {
    pub const ALL: [ControlKind; 10] = [
        Self::Connected,
        Self::MatchFound,
        Self::MatchEnded,
        Self::NoMatches,
        Self::PartnerDisconnected,
        Self::StatsUpdate,
        Self::Error,
        Self::FindMatch,
        Self::EndMatch,
        Self::EndSession,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::MatchFound => "match_found",
            Self::MatchEnded => "match_ended",
            Self::NoMatches => "no_matches",
            Self::PartnerDisconnected => "partner_disconnected",
            Self::StatsUpdate => "stats_update",
            Self::Error => "error",
            Self::FindMatch => "find_match",
            Self::EndMatch => "end_match",
            Self::EndSession => "end_session",
        }
    }

    /// Look up a wire name. `None` for kinds this client does not know.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
