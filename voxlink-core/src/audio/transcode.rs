//! Conversions between audio frames and their two wire representations.
//!
//! Binary frames carry the payload as-is; text frames carry it as standard
//! base64. Both directions are pure: container detection only influences
//! playback hints, never the bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

use crate::audio::frame::AudioFrame;
use crate::config::AudioWire;
use crate::error::VoxError;
use crate::transport::Frame;

/// Encode raw bytes as standard base64.
pub fn encode_base64(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode standard base64. Surrounding whitespace is ignored.
pub fn decode_base64(text: &str) -> Result<Bytes, VoxError> {
    Ok(Bytes::from(BASE64.decode(text.trim())?))
}

/// Put an outbound frame on the wire in the requested representation.
pub fn to_wire(frame: &AudioFrame, wire: AudioWire) -> Frame {
    match wire {
        AudioWire::Binary => Frame::Binary(frame.data().clone()),
        AudioWire::Base64 => Frame::Text(encode_base64(frame.data())),
    }
}

/// A native binary frame received from the transport.
pub fn from_binary(data: Bytes) -> AudioFrame {
    AudioFrame::new(data)
}

/// Whether a text payload that failed JSON parsing should be read as
/// base64 audio.
///
/// The classifier is deliberately narrow: at least `threshold` characters
/// and nothing outside the standard base64 alphabet, padding, or line
/// breaks. Clips shorter than the threshold are never recognized this way;
/// senders that need them should use binary frames.
pub fn looks_like_base64_audio(text: &str, threshold: usize) -> bool {
    let trimmed = text.trim();
    trimmed.len() >= threshold
        && trimmed
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\r' | b'\n'))
}

/// Decode a base64 text payload into a frame.
pub fn from_base64_text(text: &str) -> Result<AudioFrame, VoxError> {
    let cleaned: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(AudioFrame::new(decode_base64(&cleaned)?))
}
