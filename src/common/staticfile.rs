//! staticfile.rs -- open a resolved static file for streaming.
//!
//! The file is opened and checked *before* anyone commits to a 200.
//! The serving loop streams it afterwards.
//
use crate::error::EdictError;
use anyhow::anyhow;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

/// Open a static file. Regular files only.
///
/// Missing files, directories, and unreadable files are NotFound.
/// Anything stranger is Internal.
pub fn open_static(path: &Path) -> Result<File, EdictError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            return Err(match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::NotADirectory => {
                    log::info!("Static file {:?} not available: {}", path, e);
                    EdictError::NotFound(path.display().to_string())
                }
                _ => EdictError::Internal(anyhow!("Opening {:?}: {}", path, e)),
            });
        }
    };
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        log::info!("Static path {:?} is not a regular file", path);
        return Err(EdictError::NotFound(path.display().to_string()));
    }
    Ok(file)
}

/// MIME type from file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[test]
fn open_existing_and_missing() {
    use std::io::Read;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("hello.txt");
    std::fs::write(&path, "hello").expect("write");
    let mut file = open_static(&path).expect("should open");
    let mut s = String::new();
    file.read_to_string(&mut s).expect("read");
    assert_eq!(s, "hello");
    //  Missing
    let missing = open_static(&dir.path().join("nope.html"));
    assert!(matches!(missing, Err(EdictError::NotFound(_))));
    //  Directory
    let as_dir = open_static(dir.path());
    assert!(matches!(as_dir, Err(EdictError::NotFound(_))));
    //  Path through a file
    let through = open_static(&path.join("deeper"));
    assert!(matches!(through, Err(EdictError::NotFound(_))));
}

#[test]
fn content_types() {
    assert_eq!(content_type_for(Path::new("a/index.html")), "text/html; charset=utf-8");
    assert_eq!(content_type_for(Path::new("x.CSS")), "text/css");
    assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
}
