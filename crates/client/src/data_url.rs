//! Data URL encoding and media type detection.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Fallback media type when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Magic-byte prefixes for image formats a background can use.
const IMAGE_SIGNATURES: &[(&[u8], &str)] = &[
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    (b"<svg ", "image/svg+xml"),
    (b"<?xml", "image/svg+xml"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"BM", "image/bmp"),
];

/// Whether `locator` is already a self-contained data URL.
pub fn is_data_url(locator: &str) -> bool {
    locator
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Encode bytes as a base64 data URL.
pub fn encode_data_url(media_type: &str, data: &[u8]) -> String {
    format!("data:{media_type};base64,{}", STANDARD.encode(data))
}

/// Split a data URL into its media type and decoded bytes.
///
/// Handles `;base64` payloads and plain payloads without percent escapes.
/// Returns None if `locator` is not a well-formed data URL.
pub fn parse_data_url(locator: &str) -> Option<(String, Vec<u8>)> {
    if !is_data_url(locator) {
        return None;
    }
    let (meta, payload) = locator[5..].split_once(',')?;

    let mut params = meta.split(';').map(str::trim);
    let media_type = match params.next() {
        Some(mt) if !mt.is_empty() => mt.to_lowercase(),
        _ => "text/plain".to_string(),
    };
    let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        STANDARD.decode(payload.trim()).ok()?
    } else {
        if payload.contains('%') {
            return None;
        }
        payload.as_bytes().to_vec()
    };

    Some((media_type, data))
}

/// Determine the media type of image bytes.
///
/// Tries magic bytes first, then the file extension of `path`.
pub fn detect_media_type(data: &[u8], path: &str) -> String {
    if let Some(mt) = sniff(data) {
        return mt.to_string();
    }
    detect_media_type_by_file_name(path).to_string()
}

/// Pick the media type for a fetched body.
///
/// An `image/*` Content-Type header wins; otherwise the bytes are sniffed.
pub fn media_type_for(content_type: Option<&str>, data: &[u8], path: &str) -> String {
    let declared = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mt| mt.trim().to_lowercase());

    match declared {
        Some(mt) if mt.starts_with("image/") => mt,
        _ => detect_media_type(data, path),
    }
}

fn sniff(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if data.len() >= 12 && &data[4..8] == b"ftyp" && (&data[8..12] == b"avif" || &data[8..12] == b"avis") {
        return Some("image/avif");
    }
    IMAGE_SIGNATURES
        .iter()
        .find(|(sig, _)| data.starts_with(sig))
        .map(|(_, mt)| *mt)
}

/// Determines the media type based on file extension.
pub fn detect_media_type_by_file_name(filename: &str) -> &'static str {
    let lowered = filename.to_lowercase();
    let extension = lowered.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        _ => OCTET_STREAM,
    }
}
