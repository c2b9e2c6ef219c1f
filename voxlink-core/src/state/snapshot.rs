//! Read-only view of the session, published after every driver step.

use url::Url;

use crate::error::ErrorKind;
use crate::message::{Partner, Profile, StatsSnapshot};
use crate::state::ConnectionState;

/// Everything a caller may want to render about the session.
///
/// Published through a `tokio::sync::watch` channel; the driver is the
/// only writer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionSnapshot {
    /// Relay address of the current or last attempt.
    pub address: Option<Url>,
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub retry_count: u32,
    pub last_error: Option<ErrorKind>,
    /// Current match, if any.
    pub partner: Option<Partner>,
    /// Profile sent with the last `find_match`.
    pub profile: Option<Profile>,
    pub stats: Option<StatsSnapshot>,
}
