//! Coarse content types for extracted files, keyed by file extension.

use std::path::Path;

/// Fallback for extensions without a known type.
pub const UNKNOWN_MIME_TYPE: &str = "application/*";

/// Map a file extension (without the dot) to a content type.
///
/// Matching is case-sensitive: `"PNG"` is not an image here.
///
/// # Examples
///
/// ```
/// use zipstage::mime::resolve;
///
/// assert_eq!(resolve("pdf"), "application/pdf");
/// assert_eq!(resolve("css"), "text/plain");
/// assert_eq!(resolve("xyz"), "application/*");
/// ```
pub fn resolve(extension: &str) -> String {
    match extension {
        "png" | "jpg" | "jpeg" | "bmp" | "webp" | "gif" => format!("image/{}", extension),
        "mov" | "mp4" | "mpeg" | "ogg" => format!("video/{}", extension),
        "txt" | "rft" | "xml" | "css" => "text/plain".to_string(),
        "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" => {
            format!("application/{}", extension)
        }
        _ => {
            tracing::debug!(extension, "unknown extension");
            UNKNOWN_MIME_TYPE.to_string()
        }
    }
}

/// [`resolve`] applied to the extension of `path`.
pub fn resolve_path(path: &Path) -> String {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    resolve(extension)
}
