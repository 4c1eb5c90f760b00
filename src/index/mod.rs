// src/index/mod.rs

//! Artifact index
//!
//! A [`PackageIndex`] discovers candidate distributions for projects by
//! reading a "simple" index (one page per project listing artifact links)
//! and any number of find-links (pages, local directories or direct
//! artifact URLs).
//!
//! Every URL goes through [`PackageIndex::process_url`]:
//!
//! 1. a URL already scanned is skipped unless it must be retrieved
//! 2. a URL naming a distribution is recorded as a candidate, no fetch
//! 3. otherwise the page is read (from the cache tier for pinned
//!    requirements, else live), its links are processed recursively, and
//!    pages under the index URL are mined for package pages
//!
//! Local paths take the [`PackageIndex::process_filename`] route instead.

pub mod client;
pub mod html;
pub mod registry;

pub use client::IndexClient;
pub use registry::IndexRegistry;

use crate::cache::{self, CacheTier, CachedPage};
use crate::dist::{Distribution, Location, egg_info_for_url, file_url_to_path, filename_from_url, has_url_scheme};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::hash::Hash;
use crate::requirement::{Requirement, safe_name};
use crate::version::Version;
use glob::Pattern;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Candidates discovered from one index URL plus find-links
pub struct PackageIndex {
    index_url: String,
    hosts: Vec<Pattern>,
    dists: Environment,
    scanned_urls: HashSet<String>,
    fetched_urls: HashSet<String>,
    /// Project key to package page URLs, in discovery order
    package_pages: HashMap<String, Vec<String>>,
    /// Find-links deferred until the first lookup; `None` once online
    to_scan: Option<Vec<String>>,
    current_requirement: String,
    client: Arc<IndexClient>,
    cache: Arc<dyn CacheTier>,
}

impl PackageIndex {
    /// Create an index
    ///
    /// `file://` index URLs are turned into local paths. Host patterns are
    /// shell-style globs matched against `host[:port]`; invalid patterns
    /// are dropped with a warning.
    pub fn new(
        index_url: &str,
        allow_hosts: &[String],
        python_version: Option<String>,
        client: Arc<IndexClient>,
        cache: Arc<dyn CacheTier>,
    ) -> Self {
        let mut index_url = match file_url_to_path(index_url) {
            Some(path) => path.to_string_lossy().into_owned(),
            None => index_url.to_string(),
        };
        if !index_url.ends_with('/') {
            index_url.push('/');
        }

        let hosts = allow_hosts
            .iter()
            .filter_map(|host| match Pattern::new(host) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!("Ignoring invalid allow-hosts pattern {:?}: {}", host, e);
                    None
                }
            })
            .collect();

        Self {
            index_url,
            hosts,
            dists: Environment::new(&[], python_version),
            scanned_urls: HashSet::new(),
            fetched_urls: HashSet::new(),
            package_pages: HashMap::new(),
            to_scan: Some(Vec::new()),
            current_requirement: String::new(),
            client,
            cache,
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    /// Candidates seen so far for a project, best first
    pub fn candidates(&self, project: &str) -> &[Distribution] {
        self.dists.get(project)
    }

    fn add(&mut self, dist: Distribution) {
        self.dists.add(dist);
    }

    /// Whether the index may contact `url`
    ///
    /// Local files are always allowed. A blocked URL is reported unless
    /// `suppress_warnings` is set.
    pub fn url_ok(&self, url: &str, suppress_warnings: bool) -> bool {
        if url.to_lowercase().starts_with("file:") {
            return true;
        }
        let netloc = url::Url::parse(url)
            .ok()
            .and_then(|u| {
                u.host_str().map(|host| match u.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                })
            })
            .unwrap_or_default();
        if self.hosts.iter().any(|pattern| pattern.matches(&netloc)) {
            return true;
        }
        if !suppress_warnings {
            warn!("Link to {} ***BLOCKED*** by --allow-hosts", url);
        }
        false
    }

    /// Evaluate a URL as a possible download, and read it when `retrieve`
    /// is set and it does not name a distribution itself
    pub fn process_url(&mut self, url: &str, retrieve: bool) {
        if self.scanned_urls.contains(url) && !retrieve {
            return;
        }
        self.scanned_urls.insert(url.to_string());

        if !has_url_scheme(url) {
            self.process_filename(Path::new(url), false);
            return;
        }

        let dists = Distribution::from_url(url);
        if !dists.is_empty() {
            if !self.url_ok(url, true) {
                return;
            }
            debug!("Found link: {}", url);
        }

        if !dists.is_empty() || !retrieve || self.fetched_urls.contains(url) {
            for dist in dists {
                self.add(dist);
            }
            return;
        }

        self.fetched_urls.insert(url.to_string());
        if !self.url_ok(url, true) {
            return;
        }
        info!("Reading {}", url);

        let Some((base, page)) = self.read_page(url) else {
            return;
        };
        for link in html::links(&base, &page) {
            self.process_url(&link, false);
        }
        if url.starts_with(&self.index_url) {
            self.process_index(url, &page);
        }
    }

    /// Read a page, through the cache tier when the current requirement
    /// pins a version
    ///
    /// Pages that are missing, not HTML or answered with any non-2xx status
    /// yield nothing and are never uploaded. Error bodies other than 404
    /// are dropped as well rather than mined for links.
    fn read_page(&mut self, url: &str) -> Option<(String, String)> {
        let requirement = self.current_requirement.clone();
        let pinned = requirement.contains("==");

        if pinned && let Some(cached) = cache::fetch_index(self.cache.as_ref(), url, &requirement) {
            self.fetched_urls.insert(cached.base.clone());
            return Some((cached.base, html::decode_page(&cached.content, Some("utf-8"))));
        }

        let page = match self.client.fetch_page(url) {
            Ok(page) => page,
            Err(e) => {
                warn!("Download error on {}: {} -- Some packages may not be found!", url, e);
                return None;
            }
        };
        self.fetched_urls.insert(page.url.clone());

        if !page.is_html() {
            return None;
        }
        if !page.is_success() {
            if page.status == 404 {
                debug!("Page {} not found", url);
            } else {
                warn!(
                    "Download error on {}: HTTP {} -- Some packages may not be found!",
                    url, page.status
                );
            }
            return None;
        }

        let text = html::decode_page(&page.body, html::charset(&page.content_type).as_deref());
        if pinned {
            let cached = CachedPage {
                base: page.url.clone(),
                content: text.as_bytes().to_vec(),
            };
            cache::store_index(self.cache.as_ref(), url, &requirement, &cached);
        }
        Some((page.url, text))
    }

    /// Record the distributions found at a local path
    ///
    /// A directory contributes its direct children.
    pub fn process_filename(&mut self, path: &Path, nested: bool) {
        if !path.exists() {
            warn!("Not found: {}", path.display());
            return;
        }

        if path.is_dir() && !nested {
            let real = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            let mut children: Vec<PathBuf> = match fs::read_dir(&real) {
                Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
                Err(e) => {
                    warn!("Cannot list {}: {}", real.display(), e);
                    return;
                }
            };
            children.sort();
            for child in children {
                self.process_filename(&child, true);
            }
        }

        let dists = Distribution::from_filename(path);
        if !dists.is_empty() {
            debug!("Found: {}", path.display());
            for dist in dists {
                self.add(dist);
            }
        }
    }

    /// Mine an index page for package pages, and read the external links
    /// of a package page
    pub fn process_index(&mut self, url: &str, page: &str) {
        for link in html::links(url, page) {
            self.scan_package_page(&link);
        }

        let Some((pkg, ver)) = self.scan_package_page(url) else {
            return;
        };
        for mut link in html::external_links(url, page) {
            let (base, fragment) = egg_info_for_url(&link);
            if base.ends_with(".py") && fragment.is_none() {
                if ver.is_empty() {
                    self.scan_all(Some(&format!(
                        "Page at {url} links to .py file(s) without version info; an index scan is required."
                    )));
                } else {
                    link.push_str(&format!("#egg={pkg}-{ver}"));
                }
            }
            self.scan_url(&link);
        }
    }

    /// Record `link` when it is a package page (`<index>/<pkg>/<ver>`)
    fn scan_package_page(&mut self, link: &str) -> Option<(String, String)> {
        let rest = link.strip_prefix(&self.index_url)?;
        let parts: Vec<String> = rest
            .split('/')
            .map(|part| urlencoding::decode(part).map_or_else(|_| part.to_string(), |p| p.into_owned()))
            .collect();
        if parts.len() != 2 || parts[1].contains('#') {
            return None;
        }

        let pkg = safe_name(&parts[0]);
        let ver = safe_version(&parts[1]);
        let pages = self.package_pages.entry(pkg.to_lowercase()).or_default();
        if !pages.iter().any(|p| p == link) {
            pages.push(link.to_string());
        }
        Some((to_filename(&pkg), to_filename(&ver)))
    }

    fn scan_url(&mut self, url: &str) {
        self.process_url(url, true);
    }

    fn scan_all(&mut self, message: Option<&str>) {
        if !self.fetched_urls.contains(&self.index_url) {
            if let Some(message) = message {
                warn!("{}", message);
            }
            info!("Scanning index of all packages (this may take a while)");
        }
        let index_url = self.index_url.clone();
        self.scan_url(&index_url);
    }

    fn has_package_pages(&self, key: &str) -> bool {
        self.package_pages.get(key).is_some_and(|pages| !pages.is_empty())
    }

    /// Scan the index pages that may list the requirement's project
    pub fn find_packages(&mut self, requirement: &Requirement) {
        self.current_requirement = requirement.to_string();
        let key = requirement.key().to_string();

        self.scan_url(&format!("{}{}/", self.index_url, requirement.name));
        if !self.has_package_pages(&key) {
            self.scan_url(&format!("{}{}/", self.index_url, requirement.project_name()));
        }
        if !self.has_package_pages(&key) {
            self.not_found_in_index(requirement);
        }

        let pages = self.package_pages.get(&key).cloned().unwrap_or_default();
        for url in pages {
            self.scan_url(&url);
        }
    }

    fn not_found_in_index(&mut self, requirement: &Requirement) {
        if self.candidates(requirement.key()).is_empty() {
            warn!(
                "Couldn't find index page for {:?} (maybe misspelled?)",
                requirement.name
            );
        } else {
            info!("Couldn't retrieve index page for {:?}", requirement.name);
        }
        self.scan_all(None);
    }

    /// Scan find-links now, or defer remote pages until the first lookup
    pub fn add_find_links<S: AsRef<str>>(&mut self, links: &[S]) {
        for link in links {
            let link = link.as_ref();
            let immediate = self.to_scan.is_none()
                || !has_url_scheme(link)
                || link.starts_with("file:")
                || !Distribution::from_url(link).is_empty();
            if immediate {
                self.scan_url(link);
            } else if let Some(deferred) = &mut self.to_scan {
                deferred.push(link.to_string());
            }
        }
    }

    /// Scan deferred find-links; from then on links are scanned on arrival
    pub fn prescan(&mut self) {
        if let Some(deferred) = self.to_scan.take() {
            for link in deferred {
                self.scan_url(&link);
            }
        }
    }

    /// Best known candidate satisfying the requirement, searching the
    /// index first
    pub fn obtain(&mut self, requirement: &Requirement) -> Option<Distribution> {
        self.current_requirement = requirement.to_string();
        self.prescan();
        self.find_packages(requirement);
        for dist in self.candidates(requirement.key()) {
            if dist.satisfies(requirement) {
                return Some(dist.clone());
            }
            debug!("{} does not match {}", requirement, dist);
        }
        None
    }

    /// Make a candidate's artifact available locally
    ///
    /// Local artifacts are returned in place. Remote ones are downloaded
    /// to `tmp`, verified against a checksum in the URL fragment.
    pub fn download(&self, location: &Location, tmp: &Path) -> Result<PathBuf> {
        match location {
            Location::Local(path) if path.exists() => Ok(path.clone()),
            Location::Local(path) => Err(Error::DownloadError(format!(
                "Not a URL or existing file: {}",
                path.display()
            ))),
            Location::Remote(url) => {
                if !self.url_ok(url, false) {
                    return Err(Error::DownloadError(format!(
                        "Download of {url} is not allowed by allow-hosts"
                    )));
                }
                let dest = tmp.join(download_name(url)?);
                let checksum = Hash::from_url_fragment(url);
                let bare = url.split('#').next().unwrap_or(url);
                self.client.download_file(bare, &dest, checksum.as_ref())?;
                Ok(dest)
            }
        }
    }
}

/// File name a remote artifact is saved under
pub fn download_name(url: &str) -> Result<String> {
    let mut name = filename_from_url(url);
    while name.contains("..") {
        name = name.replace("..", ".");
    }
    name = name.replace('\\', "_");
    if let Some(stem) = name.strip_suffix(".egg.zip") {
        name = format!("{stem}.egg");
    }
    if name.is_empty() {
        name = "__downloaded__".to_string();
    }
    sanitize_filename(&name)
}

fn safe_version(version: &str) -> String {
    let parsed = Version::parse(version);
    if parsed.is_legacy() {
        let spaced = version.replace(' ', ".");
        collapse_separators(&spaced)
    } else {
        parsed.normalized()
    }
}

fn collapse_separators(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '.' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }
    out
}

fn to_filename(name: &str) -> String {
    name.replace('-', "_")
}

/// Give `file://` links to directories a trailing slash so they are read
/// as listings
pub fn fix_file_links<S: AsRef<str>>(links: &[S]) -> Vec<String> {
    links
        .iter()
        .map(|link| {
            let link = link.as_ref();
            match file_url_to_path(link) {
                Some(path) if !link.ends_with('/') && path.is_dir() => format!("{link}/"),
                _ => link.to_string(),
            }
        })
        .collect()
}
