// src/config.rs

//! Installer configuration
//!
//! One immutable [`InstallerConfig`] is handed to the installer at
//! construction. It can be built in code with the `with_*` helpers or
//! loaded from TOML:
//!
//! ```toml
//! dest = "eggs"
//! links = ["https://download.example.org/dist/"]
//! newest = false
//! allow_hosts = ["*.example.org"]
//!
//! [versions]
//! "zc.buildout" = "2.13.3"
//! six = "<2"
//!
//! [network_cache]
//! download_dir_url = "https://shadir.example.org"
//! download_cache_url = "https://shacache.example.org"
//! signature_certificate_list = ["base64 ed25519 public key"]
//! ```

use crate::error::{Error, Result};
use crate::requirement::VersionPins;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Index used when none is configured
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple";

/// Environment variable overriding the default index, for test isolation
pub const INDEX_URL_ENV: &str = "EGGSMITH_INDEX_URL";

/// Settings for the signed network cache
///
/// Each direction is active only when both of its URLs are set. Downloads
/// additionally need at least one trusted key, uploads a private key file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkCacheConfig {
    pub download_dir_url: Option<String>,
    pub download_cache_url: Option<String>,
    pub upload_dir_url: Option<String>,
    pub upload_cache_url: Option<String>,
    /// Trusted ed25519 public keys, base64 encoded
    pub signature_certificate_list: Vec<String>,
    /// TOML key file used to sign uploads
    pub signature_private_key_file: Option<PathBuf>,
    /// CA bundle for the directory service
    pub dir_ca_file: Option<PathBuf>,
    /// CA bundle for the content service
    pub cache_ca_file: Option<PathBuf>,
    pub dir_cert_file: Option<PathBuf>,
    pub dir_key_file: Option<PathBuf>,
    pub cache_cert_file: Option<PathBuf>,
    pub cache_key_file: Option<PathBuf>,
}

impl NetworkCacheConfig {
    pub fn download_enabled(&self) -> bool {
        self.download_dir_url.is_some() && self.download_cache_url.is_some()
    }

    pub fn upload_enabled(&self) -> bool {
        self.upload_dir_url.is_some() && self.upload_cache_url.is_some()
    }
}

/// Everything the installer needs to resolve and fetch distributions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Where fetched distributions are installed; `None` means offline
    pub dest: Option<PathBuf>,
    /// Find-links: pages, directories or archive URLs to scan
    pub links: Vec<String>,
    /// Package index URL; see [`InstallerConfig::index_url`]
    pub index: Option<String>,
    /// Extra directories searched for already installed distributions
    pub path: Vec<PathBuf>,
    /// Look for newer releases even when a local one satisfies
    pub newest: bool,
    /// `[versions]` pins
    pub versions: VersionPins,
    /// Follow `dependency_links.txt` of fetched distributions
    pub use_dependency_links: bool,
    /// Host glob patterns the index may contact
    pub allow_hosts: Vec<String>,
    /// Prefer final releases over prereleases
    pub prefer_final: bool,
    /// Persistent download directory
    pub download_cache: Option<PathBuf>,
    /// Use only the download cache as index
    pub install_from_cache: bool,
    /// Allow resolving versions that are not pinned
    pub allow_picked_versions: bool,
    /// Keep the required-by ledger even without debug logging
    pub store_required_by: bool,
    /// Tolerate version conflicts with the ambient environment while
    /// installing the orchestrator's own bootstrap set
    pub tolerate_bootstrap_conflicts: bool,
    /// Interpreter used for builds and bytecode compilation
    pub python: PathBuf,
    /// Only accept eggs tagged for this Python version (e.g. "3.11")
    pub python_version: Option<String>,
    pub network_cache: NetworkCacheConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            dest: None,
            links: Vec::new(),
            index: None,
            path: Vec::new(),
            newest: true,
            versions: VersionPins::new(),
            use_dependency_links: true,
            allow_hosts: vec!["*".to_string()],
            prefer_final: true,
            download_cache: None,
            install_from_cache: false,
            allow_picked_versions: true,
            store_required_by: false,
            tolerate_bootstrap_conflicts: false,
            python: PathBuf::from("python3"),
            python_version: None,
            network_cache: NetworkCacheConfig::default(),
        }
    }
}

impl InstallerConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Configured index, else `$EGGSMITH_INDEX_URL`, else the public index
    pub fn index_url(&self) -> String {
        self.index
            .clone()
            .or_else(|| std::env::var(INDEX_URL_ENV).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string())
    }

    pub fn with_dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn with_links<S: Into<String>>(mut self, links: impl IntoIterator<Item = S>) -> Self {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_path(mut self, path: Vec<PathBuf>) -> Self {
        self.path = path;
        self
    }

    pub fn with_versions(mut self, versions: VersionPins) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_newest(mut self, newest: bool) -> Self {
        self.newest = newest;
        self
    }

    pub fn with_prefer_final(mut self, prefer_final: bool) -> Self {
        self.prefer_final = prefer_final;
        self
    }

    pub fn with_allow_hosts<S: Into<String>>(mut self, hosts: impl IntoIterator<Item = S>) -> Self {
        self.allow_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_download_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_cache = Some(dir.into());
        self
    }

    pub fn with_network_cache(mut self, network_cache: NetworkCacheConfig) -> Self {
        self.network_cache = network_cache;
        self
    }
}
