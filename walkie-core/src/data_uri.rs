//! `data:<mime>;base64,<payload>` helpers for snapshot frames.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Split a base64 data URI into its media type and decoded bytes.
/// An empty media type defaults to `text/plain` as browsers do.
pub fn decode(uri: &str) -> Result<(String, Vec<u8>), DataUriError> {
    let rest = uri.strip_prefix("data:").ok_or(DataUriError::Scheme)?;
    let (meta, payload) = rest.split_once(',').ok_or(DataUriError::MissingComma)?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or(DataUriError::NotBase64)?;
    let mime = if mime.is_empty() { "text/plain" } else { mime };
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((mime.to_owned(), bytes))
}

/// File extension for common snapshot media types.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Media type guessed from a file extension (for sending snapshots from disk).
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataUriError {
    #[error("not a data URI")]
    Scheme,
    #[error("data URI has no payload separator")]
    MissingComma,
    #[error("only base64 data URIs are supported")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
