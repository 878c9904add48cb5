//! Supported media types.
//!
//! Uploads are restricted to a fixed allowlist of file extensions; the
//! same table supplies the `Content-Type` used both when creating the
//! multipart upload and when streaming the object back out.

/// Extension (lowercase, with leading dot) to content-type mapping.
pub const SUPPORTED_EXTENSIONS: &[(&str, &str)] = &[
    (".mp4", "video/mp4"),
    (".pdf", "application/pdf"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".webp", "image/webp"),
    (".mov", "video/quicktime"),
    (".avi", "video/x-msvideo"),
    (".mkv", "video/x-matroska"),
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
    (".m4a", "audio/mp4"),
];

/// Look up the content type for an extension such as `.mp4`.
/// The comparison is case-insensitive; returns None for unknown types.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    SUPPORTED_EXTENSIONS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| *content_type)
}

/// Extract the lowercased extension (including the dot) from a filename
/// or object key. Returns None when there is no extension.
pub fn extension_of(name: &str) -> Option<String> {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let dot = basename.rfind('.')?;
    if dot == 0 || dot + 1 == basename.len() {
        return None;
    }
    Some(basename[dot..].to_ascii_lowercase())
}
