//! pathresolver.rs -- map a request path to a file under the document root.
//!
//! Pure string work. Nothing here touches the filesystem.
//! Normalization happens before the join, so no input can
//! climb out of the base directory.
//
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// Resolve a raw request path to a path under `base`.
///
/// `..` segments pop, `.` and empty segments vanish, and a path which
/// normalizes to the root becomes `default_document`.
pub fn resolve_path(base: &Path, raw: &str, default_document: &str) -> PathBuf {
    //  Drop query string and fragment.
    let raw = raw.split(['?', '#']).next().unwrap_or("");
    //  Encoded separators and dots get decoded before normalizing, not after.
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\0') => {}
            s => segments.push(s),
        }
    }
    let mut resolved = base.to_path_buf();
    if segments.is_empty() {
        resolved.push(default_document);
    } else {
        for segment in segments {
            resolved.push(segment);
        }
    }
    resolved
}
