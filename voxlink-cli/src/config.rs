//! Client configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use voxlink_core::{Gender, LookingFor, SessionConfig};

/// Top-level configuration for the command-line client.
///
/// Precedence, lowest first: built-in defaults, `VOXLINK_*` environment
/// variables, the TOML file, command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Relay settings.
    pub network: NetworkConfig,
    /// Connection and reconnect tuning.
    pub session: SessionConfig,
    /// Profile sent with `find_match`.
    pub profile: ProfileConfig,
    /// Playback of received clips.
    pub audio: AudioConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Relay WebSocket URL.
    pub server_address: String,
    /// Ping interval in seconds; 0 disables keepalive.
    pub keepalive_secs: u64,
}

/// Matchmaking profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Empty means no stored profile; matchmaking is skipped.
    pub display_name: String,
    pub age: u32,
    pub gender: Gender,
    pub looking_for: LookingFor,
    /// Optional free-form location.
    pub location: String,
}

/// Playback of received clips.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Player command; the clip path is appended. Empty saves clips instead.
    pub player: Vec<String>,
    /// Where clips are saved when no player is configured.
    pub save_dir: String,
    /// Directory for temporary playback files; empty uses the system one.
    pub temp_dir: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            session: SessionConfig::from_env(),
            profile: ProfileConfig::default(),
            audio: AudioConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "ws://127.0.0.1:8080/ws".into(),
            keepalive_secs: 20,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            age: 18,
            gender: Gender::Other,
            looking_for: LookingFor::Any,
            location: String::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            player: Vec::new(),
            save_dir: "received".into(),
            temp_dir: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default config to `path`. Refuses to replace an existing
    /// file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        std::io::Write::write_all(&mut file, text.as_bytes())
    }
}

// ── Tests ────────────────────────────────────────────────────────
