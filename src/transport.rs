//! Base64 data-URI adapter for callers that move images around as strings.
//!
//! The codec itself works on encoded image bytes; this module only converts
//! between those bytes and `data:image/...;base64,` URIs.

use base64::{engine::general_purpose, Engine as _};

use crate::error::{Error, Result};

const BASE64_MARKER: &str = ";base64,";

/// Wrap encoded image bytes in a `data:` URI.
///
/// The MIME type is sniffed from the bytes.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the bytes are not a recognised image format.
pub fn to_data_uri(bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes).map_err(Error::Decode)?;
    let encoded = general_purpose::STANDARD.encode(bytes);
    Ok(format!(
        "data:{}{BASE64_MARKER}{encoded}",
        format.to_mime_type()
    ))
}

/// Decode a `data:image/...;base64,` URI, or a bare base64 string, to bytes.
///
/// # Errors
///
/// Returns [`Error::DataUri`] for a non-image or non-base64 data URI, or for
/// malformed base64.
pub fn from_data_uri(data: &str) -> Result<Vec<u8>> {
    let normalized = data.trim();

    let payload = if let Some(rest) = normalized.strip_prefix("data:") {
        if !rest.starts_with("image/") {
            return Err(Error::DataUri("not an image data URI".to_string()));
        }
        let start = rest
            .find(BASE64_MARKER)
            .ok_or_else(|| Error::DataUri("missing base64 marker".to_string()))?;
        &rest[start + BASE64_MARKER.len()..]
    } else {
        normalized
    };

    general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| Error::DataUri(format!("base64 decode failed: {e}")))
}
