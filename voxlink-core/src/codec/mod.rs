//! Inbound routing and control-message serialization.
//!
//! Every transport frame goes through [`ControlCodec::decode`], which
//! separates control messages from audio:
//!
//! ```text
//! Binary ─────────────────────────────────────────► Audio
//! Text ──► JSON object with known `type` ─────────► Control
//!      ├─► JSON object with unknown `type` ───────► Unknown (dropped)
//!      ├─► not JSON, base64 ≥ threshold chars ────► Audio
//!      └─► anything else ─────────────────────────► ProtocolError
//! ```

use serde_json::Value;

use crate::audio::AudioFrame;
use crate::audio::transcode;
use crate::error::VoxError;
use crate::message::{ControlKind, ControlMessage};
use crate::transport::Frame;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Control(ControlMessage),
    Audio(AudioFrame),
    /// A well-formed envelope whose `type` this client does not know.
    Unknown { kind: String },
}

/// Stateless codec for the multiplexed channel.
#[derive(Debug, Clone, Copy)]
pub struct ControlCodec {
    base64_threshold: usize,
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl ControlCodec {
    pub fn new(base64_threshold: usize) -> Self {
        Self { base64_threshold }
    }

    pub fn base64_threshold(&self) -> usize {
        self.base64_threshold
    }

    /// Serialize a control message. Identical input yields identical bytes.
    pub fn encode(&self, message: &ControlMessage) -> Result<String, VoxError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encode straight into a transport frame.
    pub fn encode_frame(&self, message: &ControlMessage) -> Result<Frame, VoxError> {
        self.encode(message).map(Frame::Text)
    }

    /// Route an inbound frame.
    pub fn decode(&self, frame: Frame) -> Result<Inbound, VoxError> {
        match frame {
            Frame::Binary(data) => Ok(Inbound::Audio(transcode::from_binary(data))),
            Frame::Text(text) => self.decode_text(&text),
        }
    }

    /// Route an inbound text payload.
    pub fn decode_text(&self, text: &str) -> Result<Inbound, VoxError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => {
                let kind = match map.get("type") {
                    Some(Value::String(kind)) => kind.clone(),
                    Some(_) => return Err(VoxError::Protocol("`type` is not a string".into())),
                    None => return Err(VoxError::Protocol("missing `type` field".into())),
                };
                if ControlKind::from_wire(&kind).is_none() {
                    return Ok(Inbound::Unknown { kind });
                }
                serde_json::from_value(Value::Object(map))
                    .map(Inbound::Control)
                    .map_err(|e| VoxError::Protocol(format!("malformed `{kind}` message: {e}")))
            }
            Ok(_) => self.audio_fallback(text).unwrap_or_else(|| {
                Err(VoxError::Protocol(
                    "control payload is not a JSON object".into(),
                ))
            }),
            Err(e) => self
                .audio_fallback(text)
                .unwrap_or_else(|| Err(VoxError::Json(e))),
        }
    }

    fn audio_fallback(&self, text: &str) -> Option<Result<Inbound, VoxError>> {
        transcode::looks_like_base64_audio(text, self.base64_threshold)
            .then(|| transcode::from_base64_text(text).map(Inbound::Audio))
    }
}
