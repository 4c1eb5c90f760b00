// src/dist/metadata.rs

//! Egg metadata access
//!
//! Metadata lives in `EGG-INFO/` inside an unpacked or zipped egg, or
//! directly inside a `*.egg-info` directory for develop installs.

use crate::error::{Error, Result};
use crate::requirement::{Requirement, safe_extra};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REQUIRES: &str = "requires.txt";
pub const PKG_INFO: &str = "PKG-INFO";
pub const NAMESPACE_PACKAGES: &str = "namespace_packages.txt";
pub const DEPENDENCY_LINKS: &str = "dependency_links.txt";

/// Where a distribution's metadata files can be read from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataSource {
    /// Not available, e.g. a remote or source archive
    None,
    /// A directory holding the metadata files
    Directory(PathBuf),
    /// A zipped egg with an `EGG-INFO/` folder
    ZipEgg(PathBuf),
}

impl MetadataSource {
    /// Metadata of an egg file or directory
    pub fn for_egg(path: &Path) -> Self {
        if path.is_dir() {
            MetadataSource::Directory(path.join("EGG-INFO"))
        } else if path.is_file() {
            MetadataSource::ZipEgg(path.to_path_buf())
        } else {
            MetadataSource::None
        }
    }

    /// Read a metadata file, `None` if absent or unreadable
    pub fn read(&self, name: &str) -> Option<String> {
        match self {
            MetadataSource::None => None,
            MetadataSource::Directory(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    return None;
                }
                match std::fs::read(&path) {
                    Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        debug!("Cannot read {}: {}", path.display(), e);
                        None
                    }
                }
            }
            MetadataSource::ZipEgg(egg) => match read_zip_entry(egg, &format!("EGG-INFO/{}", name)) {
                Ok(content) => content,
                Err(e) => {
                    debug!("Cannot read {} from {}: {}", name, egg.display(), e);
                    None
                }
            },
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.read(name).is_some()
    }

    /// Non-blank, non-comment lines of a metadata file
    pub fn lines(&self, name: &str) -> Vec<String> {
        self.read(name)
            .map(|text| non_empty_lines(&text))
            .unwrap_or_default()
    }

    /// `Version:` header of `PKG-INFO`
    pub fn version(&self) -> Option<String> {
        let pkg_info = self.read(PKG_INFO)?;
        pkg_info.lines().find_map(|line| {
            line.strip_prefix("Version:")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

fn read_zip_entry(archive: &Path, entry: &str) -> Result<Option<String>> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| Error::ParseError(format!("{}: {}", archive.display(), e)))?;
    let mut member = match zip.by_name(entry) {
        Ok(member) => member,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(Error::ParseError(format!("{}: {}", archive.display(), e))),
    };
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Parse `requires.txt` for the given extras
///
/// Lines before the first section are unconditional. `[extra]` sections
/// apply when the extra is requested. Sections carrying a `:marker` are
/// skipped because markers are not evaluated.
pub fn parse_requires(text: &str, extras: &[String], project: &str) -> Result<Vec<Requirement>> {
    let mut requirements = Vec::new();
    let mut seen_extras: Vec<String> = Vec::new();
    let mut active = true;

    for line in non_empty_lines(text) {
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let (extra, marker) = match section.split_once(':') {
                Some((extra, marker)) => (extra.trim(), Some(marker.trim())),
                None => (section.trim(), None),
            };
            if let Some(marker) = marker {
                debug!("Skipping requirements of {} under marker '{}'", project, marker);
                active = false;
                continue;
            }
            let extra = safe_extra(extra);
            active = extras.contains(&extra);
            seen_extras.push(extra);
            continue;
        }
        if active {
            requirements.push(Requirement::parse(&line)?);
        }
    }

    for extra in extras {
        if !seen_extras.contains(extra) {
            warn!("{} has no such extra feature '{}'", project, extra);
        }
    }
    Ok(requirements)
}
