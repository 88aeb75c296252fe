//! Byte payload conversions for embedding assets as inline data URIs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// MIME type for a costume image extension.
pub fn image_mime(extension: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        other => format!("image/{}", other),
    }
}

/// MIME type for a sound extension.
pub fn audio_mime(extension: &str) -> String {
    match extension.to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg".to_string(),
        "" => "audio/wav".to_string(),
        other => format!("audio/{}", other),
    }
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, encode_base64(bytes))
}
