// src/cache/mod.rs

//! Network cache tier
//!
//! A best-effort cache sitting in front of index page fetches and artifact
//! downloads. Implementations report failures through [`CacheError`]; the
//! wrappers at the bottom of this module turn every error into a miss so a
//! broken or unreachable cache never fails an installation.
//!
//! Directory keys are derived from the source URL:
//!
//! - artifacts: `pypi-buildout-<md5>` for index-hosted URLs, otherwise
//!   `slapos-buildout-<md5>`
//! - index pages: `pypi-index-<md5>-<requirement>`

pub mod network;
pub mod signing;

pub use network::NetworkCache;
pub use signing::{CacheSigner, TrustedKeys};

use crate::hash::{Hash, md5_hex, verify_file};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors inside the cache tier; never surfaced to callers of the installer
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cache server answered {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Malformed directory entry: {0}")]
    Malformed(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Cached content hash mismatch: expected {expected}, got {actual}")]
    ContentMismatch { expected: String, actual: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// An index page as stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    /// Final URL the page was served from, for resolving relative links
    pub base: String,
    pub content: Vec<u8>,
}

/// A two-level artifact cache
///
/// `Ok(false)` / `Ok(None)` mean a clean miss. Any `Err` is treated as a
/// miss too, but logged.
pub trait CacheTier {
    /// Downloads can be attempted
    fn can_download(&self) -> bool;

    /// Uploads can be attempted
    fn can_upload(&self) -> bool;

    /// Write the cached artifact for `url` to `dest`
    fn download_artifact(&self, url: &str, dest: &Path) -> CacheResult<bool>;

    /// Store a freshly downloaded artifact
    fn upload_artifact(&self, url: &str, path: &Path) -> CacheResult<()>;

    /// Look up the index page fetched from `url` for `requirement`
    fn download_index(&self, url: &str, requirement: &str) -> CacheResult<Option<CachedPage>>;

    /// Store an index page fetched from `url` for `requirement`
    fn upload_index(&self, url: &str, requirement: &str, page: &CachedPage) -> CacheResult<()>;
}

/// Cache tier that never hits
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheTier for NoCache {
    fn can_download(&self) -> bool {
        false
    }

    fn can_upload(&self) -> bool {
        false
    }

    fn download_artifact(&self, _url: &str, _dest: &Path) -> CacheResult<bool> {
        Ok(false)
    }

    fn upload_artifact(&self, _url: &str, _path: &Path) -> CacheResult<()> {
        Err(CacheError::NotConfigured("upload"))
    }

    fn download_index(&self, _url: &str, _requirement: &str) -> CacheResult<Option<CachedPage>> {
        Ok(None)
    }

    fn upload_index(&self, _url: &str, _requirement: &str, _page: &CachedPage) -> CacheResult<()> {
        Err(CacheError::NotConfigured("upload"))
    }
}

/// Directory key for an artifact URL
pub fn directory_key(url: &str) -> String {
    let urlmd5 = md5_hex(url);
    if url.contains("pypi") {
        format!("pypi-buildout-{urlmd5}")
    } else {
        format!("slapos-buildout-{urlmd5}")
    }
}

/// Directory key for an index page fetched for a requirement
pub fn index_key(url: &str, requirement: &str) -> String {
    format!("pypi-index-{}-{}", md5_hex(url), requirement)
}

// =============================================================================
// Best-effort wrappers
// =============================================================================

/// Try to fetch `url` from the cache into `dest`
///
/// A hit is verified against `checksum`, or the checksum in the URL
/// fragment when none is given. A mismatch removes `dest` and counts as a
/// miss.
pub fn fetch_artifact(tier: &dyn CacheTier, url: &str, dest: &Path, checksum: Option<&Hash>) -> bool {
    if !tier.can_download() {
        return false;
    }
    debug!("Trying to download {} from network cache...", url);

    match tier.download_artifact(url, dest) {
        Ok(true) => {}
        Ok(false) => {
            info!("Cannot download {} from network cache.", url);
            return false;
        }
        Err(e) => {
            warn!("There was a problem downloading {} from network cache: {}", url, e);
            let _ = fs::remove_file(dest);
            return false;
        }
    }
    info!("Downloaded {} from network cache.", url);

    let expected = checksum.cloned().or_else(|| Hash::from_url_fragment(url));
    let Some(expected) = expected else {
        return true;
    };
    match verify_file(dest, &expected) {
        Ok(Ok(())) => true,
        Ok(Err(mismatch)) => {
            info!("Checksum mismatch downloading {} from network cache: {}", url, mismatch);
            let _ = fs::remove_file(dest);
            false
        }
        Err(e) => {
            warn!("Cannot verify {}: {}", dest.display(), e);
            let _ = fs::remove_file(dest);
            false
        }
    }
}

/// Push a downloaded artifact back to the cache
pub fn store_artifact(tier: &dyn CacheTier, url: &str, path: &Path) -> bool {
    if !tier.can_upload() {
        return false;
    }
    info!("Uploading {} into network cache.", url);
    tier.upload_artifact(url, path)
        .map_err(|e| warn!("Failed to upload {} into network cache: {}", url, e))
        .is_ok()
}

/// Look up a cached index page
pub fn fetch_index(tier: &dyn CacheTier, url: &str, requirement: &str) -> Option<CachedPage> {
    if !tier.can_download() {
        return None;
    }
    match tier.download_index(url, requirement) {
        Ok(Some(page)) => {
            info!("Downloaded {} from network cache.", url);
            Some(page)
        }
        Ok(None) => {
            debug!("{} for {} does not exist in network cache.", url, requirement);
            None
        }
        Err(e) => {
            warn!("There was a problem downloading {} from network cache: {}", url, e);
            None
        }
    }
}

/// Push an index page to the cache
pub fn store_index(tier: &dyn CacheTier, url: &str, requirement: &str, page: &CachedPage) -> bool {
    if !tier.can_upload() {
        return false;
    }
    info!("Uploading {} content into network cache.", url);
    tier.upload_index(url, requirement, page)
        .map_err(|e| warn!("Failed to upload {} into network cache: {}", url, e))
        .is_ok()
}
