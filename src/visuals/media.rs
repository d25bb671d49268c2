use crate::error::{ReelError, Result};

use super::MediaKind;

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47])
}

fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP"
}

fn is_gif(bytes: &[u8]) -> bool {
    bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a")
}

/// File extension for downloaded media, from its magic bytes.
pub fn extension_for(bytes: &[u8], kind: MediaKind) -> &'static str {
    if is_jpeg(bytes) {
        ".jpg"
    } else if is_png(bytes) {
        ".png"
    } else if is_webp(bytes) {
        ".webp"
    } else if is_gif(bytes) {
        ".gif"
    } else {
        match kind {
            MediaKind::Image => ".jpg",
            MediaKind::Animated => ".gif",
        }
    }
}

/// Check that downloaded bytes are real media of the requested kind.
///
/// Stills must be JPEG, PNG or WebP; animations GIF or WebP. Files under
/// the kind's minimum size are rejected as placeholders.
pub fn validate_media(bytes: &[u8], kind: MediaKind) -> Result<&'static str> {
    let recognised = match kind {
        MediaKind::Image => is_jpeg(bytes) || is_png(bytes) || is_webp(bytes),
        MediaKind::Animated => is_gif(bytes) || is_webp(bytes),
    };
    if !recognised {
        return Err(ReelError::MediaValidation(format!(
            "unrecognised {kind} signature"
        )));
    }

    if bytes.len() < kind.min_bytes() {
        return Err(ReelError::MediaValidation(format!(
            "{kind} too small: {} bytes (min {})",
            bytes.len(),
            kind.min_bytes()
        )));
    }

    Ok(extension_for(bytes, kind))
}
