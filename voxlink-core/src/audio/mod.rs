//! Audio payload handling: container detection, wire transcoding and
//! materialized playback.
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | `format`    | Container detection and playback hints               |
//! | `frame`     | `AudioFrame`, the immutable clip passed around       |
//! | `transcode` | Binary / base64 wire conversions                     |
//! | `playback`  | Scoped temporary files for path-based sinks          |

pub mod format;
pub mod frame;
pub mod playback;
pub mod transcode;

pub use format::AudioFormat;
pub use frame::AudioFrame;
pub use playback::TempAudioFile;
