/*!
 * Content Types
 * Filename extension and MIME type mapping for uploads and Finder info
 */

use mime::Mime;

/// Known extensions, preferred extension first for each type
const EXTENSIONS: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("text", "text/plain"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("csv", "text/csv"),
    ("pdf", "application/pdf"),
    ("ps", "application/postscript"),
    ("rtf", "application/rtf"),
    ("doc", "application/msword"),
    ("wiz", "application/msword"),
    ("xls", "application/vnd.ms-excel"),
    ("xlw", "application/vnd.ms-excel"),
    ("ppt", "application/vnd.ms-powerpoint"),
    ("pwz", "application/vnd.ms-powerpoint"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("eml", "message/rfc822"),
    ("mp3", "audio/mpeg"),
];

/// Extensions that exist but are never chosen when a suffix is added
const NEVER_PREFERRED: &[&str] = &["wiz", "xlw", "pwz"];

/// Finder file types by MIME essence
const OS_TYPES: &[(&str, &[u8; 4])] = &[
    ("application/pdf", b"PDF "),
    ("text/plain", b"TEXT"),
    ("text/html", b"HTML"),
    ("text/rtf", b"RTF "),
    ("application/rtf", b"RTF "),
    ("application/postscript", b"EPSF"),
    ("application/msword", b"W8BN"),
    ("application/vnd.ms-excel", b"XLS8"),
    ("application/vnd.ms-powerpoint", b"SLD8"),
    ("image/png", b"PNGf"),
    ("image/jpeg", b"JPEG"),
    ("image/gif", b"GIFf"),
    ("image/tiff", b"TIFF"),
];

fn essence(content_type: &str) -> String {
    content_type
        .parse::<Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| content_type.trim().to_ascii_lowercase())
}

fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Content type for an upload
///
/// A document's own apparent type wins over the extension; the repository
/// rejects `application/octet-stream`, so it is demoted to plain text.
#[must_use]
pub fn content_type_for(filename: &str, apparent: Option<&str>) -> String {
    let guessed = extension_of(filename)
        .and_then(|ext| EXTENSIONS.iter().find(|(e, _)| *e == ext))
        .map(|(_, ct)| (*ct).to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
    let ct = apparent.map(essence).unwrap_or(guessed);
    if ct == mime::APPLICATION_OCTET_STREAM.essence_str() {
        mime::TEXT_PLAIN.to_string()
    } else {
        ct
    }
}

/// Title whose suffix reflects its content type, e.g. `Readme` -> `Readme.txt`
#[must_use]
pub fn ensure_good_suffix(filename: &str, content_type: &str) -> String {
    let trimmed = filename.trim_end_matches([' ', '.']);
    let ct = essence(content_type);
    let candidates: Vec<&str> = EXTENSIONS
        .iter()
        .filter(|(_, t)| *t == ct)
        .map(|(e, _)| *e)
        .collect();
    let lower = trimmed.to_ascii_lowercase();
    if candidates.iter().any(|ext| lower.ends_with(&format!(".{}", ext))) {
        return trimmed.to_string();
    }
    let ext = candidates
        .iter()
        .find(|ext| !NEVER_PREFERRED.contains(ext))
        .copied()
        .unwrap_or("txt");
    format!("{}.{}", trimmed, ext)
}

/// Finder OSType for a MIME type, `TEXT` when unknown
#[must_use]
pub fn os_type_for(content_type: &str) -> [u8; 4] {
    let ct = essence(content_type);
    OS_TYPES
        .iter()
        .find(|(t, _)| *t == ct)
        .map(|(_, os)| **os)
        .unwrap_or(*b"TEXT")
}
