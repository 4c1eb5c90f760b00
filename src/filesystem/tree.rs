// src/filesystem/tree.rs

//! Whole-tree operations: removal, copying and moving into place

use crate::error::Result;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Remove a file, symlink or directory tree
///
/// Symlinks are unlinked, never followed. Entries that cannot be removed
/// because they or their parent are read-only are made writable and
/// retried once. A missing path is not an error.
pub fn rmtree(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !meta.is_dir() || meta.file_type().is_symlink() {
        return remove_entry(path, false);
    }

    for entry in fs::read_dir(path)? {
        rmtree(&entry?.path())?;
    }
    remove_entry(path, true)
}

fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    let remove = |p: &Path| if is_dir { fs::remove_dir(p) } else { fs::remove_file(p) };
    match remove(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Retrying removal of {} after making it writable", path.display());
            if let Some(parent) = path.parent() {
                make_user_writable(parent)?;
            }
            if !fs::symlink_metadata(path)?.file_type().is_symlink() {
                make_user_writable(path)?;
            }
            remove(path)
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn make_user_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o700);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_user_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// Recursively copy `src` to a new directory `dest`
pub fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn symlink(link: &Path, target: &Path) -> io::Result<()> {
    fs::copy(link, target).map(|_| ())
}

/// Move `src` to `dest`, removing whatever `dest` held before
///
/// Both paths must be on the same filesystem so the final rename is atomic.
pub fn replace(src: &Path, dest: &Path) -> Result<()> {
    if fs::symlink_metadata(dest).is_ok() {
        rmtree(dest)?;
    }
    fs::rename(src, dest)?;
    Ok(())
}
