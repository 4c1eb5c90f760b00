// src/build/archive.rs

//! Archive extraction and patch application for source builds

use bzip2::read::BzDecoder;
use crate::error::{Error, Result};
use crate::filesystem::path::safe_join;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use tar::Archive;
use tracing::{debug, warn};
use xz2::read::XzDecoder;

/// Unpacks a downloaded artifact into a directory
pub trait Unpacker {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Native extraction of the archive formats found on package indexes
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveUnpacker;

impl Unpacker for ArchiveUnpacker {
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<()> {
        extract_archive(archive, dest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    TarGz,
    TarXz,
    TarBz2,
    Tar,
    Zip,
}

impl ArchiveFormat {
    fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Some(Self::TarXz)
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") || lower.ends_with(".tbz") {
            Some(Self::TarBz2)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") || lower.ends_with(".egg") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extract an archive to a destination directory
///
/// Supports: .tar.gz, .tgz, .tar.xz, .txz, .tar.bz2, .tbz2, .tar, .zip, .egg
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file_name = archive.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let format = ArchiveFormat::detect(file_name)
        .ok_or_else(|| Error::ParseError(format!("Unknown archive format: {file_name}")))?;
    debug!("Extracting {} into {}", archive.display(), dest.display());
    fs::create_dir_all(dest)?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        _ => {
            let file = File::open(archive)?;
            let reader: Box<dyn Read> = match format {
                ArchiveFormat::TarGz => Box::new(GzDecoder::new(file)),
                ArchiveFormat::TarXz => Box::new(XzDecoder::new(file)),
                ArchiveFormat::TarBz2 => Box::new(BzDecoder::new(file)),
                _ => Box::new(file),
            };
            extract_tar(Archive::new(reader), dest)
        }
    }
}

fn extract_tar<R: Read>(mut archive: Archive<R>, dest: &Path) -> Result<()> {
    archive.set_preserve_permissions(true);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_string_lossy().into_owned();
        if !entry.unpack_in(dest)? {
            return Err(Error::PathTraversal(member));
        }
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)
        .map_err(|e| Error::ParseError(format!("{}: {}", archive.display(), e)))?;

    for i in 0..zip.len() {
        let mut member = zip
            .by_index(i)
            .map_err(|e| Error::ParseError(format!("{}: {}", archive.display(), e)))?;
        let name = member.name().replace('\\', "/");
        let target = safe_join(dest, &name)?;

        if member.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut member, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = member.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(())
}

/// Apply one patch file to the source tree at `source_dir`
///
/// The patch is fed on standard input to `binary` run with `options`.
pub fn apply_patch(source_dir: &Path, patch_path: &Path, binary: &str, options: &[String]) -> Result<()> {
    let command = format!("{} {}", binary, options.join(" "));
    debug!("Applying {} with {} in {}", patch_path.display(), command, source_dir.display());

    let output = Command::new(binary)
        .args(options)
        .current_dir(source_dir)
        .stdin(Stdio::from(File::open(patch_path)?))
        .output()
        .map_err(|e| Error::CommandFailed {
            command: command.clone(),
            status: e.to_string(),
        })?;

    if !output.status.success() {
        warn!(
            "Failed to apply {}: {}",
            patch_path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(Error::CommandFailed {
            command,
            status: output.status.to_string(),
        });
    }
    Ok(())
}
