//! # voxlink-cli
//!
//! Command-line VoxLink client. Connects to a relay, asks for a match with
//! the configured profile, sends recorded clips to the partner and plays
//! (or saves) the clips that come back.

pub mod config;
pub mod device;
