// src/filesystem/path.rs

//! Path sanitization for names coming from archives and URLs
//!
//! Source archives, zipped eggs and index links are untrusted. Their member
//! names and file names go through these helpers before touching disk.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize an archive member name
///
/// 1. Rejects `..` components
/// 2. Skips `.` components
/// 3. Strips leading slashes to make the path relative
/// 4. Rejects names that end up empty
///
/// ```
/// use eggsmith::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("foo-1.0/setup.py").unwrap(), PathBuf::from("foo-1.0/setup.py"));
/// assert_eq!(sanitize_path("/foo-1.0/setup.py").unwrap(), PathBuf::from("foo-1.0/setup.py"));
/// assert!(sanitize_path("foo-1.0/../../etc/passwd").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => return Err(Error::PathTraversal(path_str.to_string())),
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!("'{}' is empty after sanitization", path_str)));
    }
    Ok(normalized)
}

/// Join an untrusted member name onto an extraction root
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let joined = root.join(sanitize_path(path.as_ref())?);

    if let (Ok(canonical_root), Ok(canonical_joined)) = (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }
    Ok(joined)
}

/// Validate a single file name derived from a URL
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "File name contains a path separator: {}",
            name
        )));
    }
    if name == ".." || name == "." {
        return Err(Error::PathTraversal(format!("Invalid file name: {}", name)));
    }
    if name.is_empty() {
        return Err(Error::InvalidPath("Empty file name".to_string()));
    }
    Ok(name.to_string())
}
