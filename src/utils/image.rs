//! Image transport helpers

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decode a base64 image payload.
///
/// Accepts both bare base64 and data URLs (`data:image/jpeg;base64,...`),
/// which browser canvases produce.
pub fn decode_base64_image(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };

    // Line-wrapped payloads are common from mobile clients
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(payload.as_bytes())
        .context("Invalid base64 image data")
}

/// Encode image bytes to base64
#[cfg(test)]
pub fn encode_base64_image(data: &[u8]) -> String {
    STANDARD.encode(data)
}
