//! Session tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectPolicy;

/// How outbound audio frames are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioWire {
    /// Native binary frames.
    #[default]
    Binary,
    /// Base64 text frames, for peers that cannot carry binary.
    Base64,
}

/// Configuration for one session.
///
/// Fields missing from a deserialized document fall back to
/// [`SessionConfig::from_env`], so a config file overrides the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default = "SessionConfig::from_env")]
pub struct SessionConfig {
    /// Deadline for a single transport open, in milliseconds.
    pub connect_timeout_ms: u64,
    /// First reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for any reconnect delay in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Consecutive failed attempts tolerated before giving up.
    pub max_retries: u32,
    /// Minimum length of a non-JSON text frame to be read as base64 audio.
    pub base64_audio_threshold: usize,
    /// Encoding for outbound audio.
    pub audio_wire: AudioWire,
    /// Capacity of each bounded event subscription.
    pub event_channel_capacity: usize,
    /// Capacity of the transport's inbound and outbound queues.
    pub transport_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 120_000,
            max_retries: 10,
            base64_audio_threshold: 1_000,
            audio_wire: AudioWire::Binary,
            event_channel_capacity: 64,
            transport_channel_capacity: 100,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.max_retries,
        )
    }

    /// Defaults overlaid with environment variables.
    ///
    /// - `VOXLINK_CONNECT_TIMEOUT`: connect timeout in ms
    /// - `VOXLINK_RECONNECT_BASE_DELAY`: first backoff delay in ms
    /// - `VOXLINK_RECONNECT_MAX_DELAY`: backoff cap in ms
    /// - `VOXLINK_MAX_RETRIES`: retry budget
    /// - `VOXLINK_AUDIO_WIRE`: "binary" or "base64"
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout_ms: env_or("VOXLINK_CONNECT_TIMEOUT", defaults.connect_timeout_ms),
            reconnect_base_delay_ms: env_or(
                "VOXLINK_RECONNECT_BASE_DELAY",
                defaults.reconnect_base_delay_ms,
            ),
            reconnect_max_delay_ms: env_or(
                "VOXLINK_RECONNECT_MAX_DELAY",
                defaults.reconnect_max_delay_ms,
            ),
            max_retries: env_or("VOXLINK_MAX_RETRIES", defaults.max_retries),
            audio_wire: match std::env::var("VOXLINK_AUDIO_WIRE")
                .as_deref()
                .map(str::to_lowercase)
            {
                Ok(ref s) if s == "base64" => AudioWire::Base64,
                Ok(ref s) if s == "binary" => AudioWire::Binary,
                _ => defaults.audio_wire,
            },
            ..defaults
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
