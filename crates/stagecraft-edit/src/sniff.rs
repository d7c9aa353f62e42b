//! Magic-byte MIME detection for the image formats providers accept

/// Detect the MIME type of an image buffer from its magic bytes
///
/// Returns `None` when the buffer does not start like any supported format.
pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"\xff\xd8\xff") {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.starts_with(b"RIFF") && data.len() > 12 && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Detect the MIME type, defaulting to `image/png` for result buffers whose
/// format the upstream left unspecified
pub fn sniff_mime_or_png(data: &[u8]) -> &'static str {
    sniff_mime(data).unwrap_or("image/png")
}
