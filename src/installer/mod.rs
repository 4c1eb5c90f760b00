// src/installer/mod.rs

//! Requirement resolution and egg acquisition
//!
//! An [`Installer`] turns requirement strings into a [`WorkingSet`] of
//! distributions installed in its destination directory. Requirements
//! are resolved breadth-first. A dependency is only looked for remotely
//! when nothing local satisfies it, or when a newer release is wanted.
//!
//! # Acquisition order
//!
//! 1. Local distributions on the search path (develop installs win)
//! 2. The signed network cache, when configured
//! 3. The package index and find-links, with the artifact then offered
//!    back to the network cache

pub mod conflict;
pub mod report;

pub use conflict::VersionConflict;
pub use report::PickedVersions;

use crate::build::{BuildExt, PatchDirectives, Recompiler, SetupRunner, Toolchain, Unpacker, strip_patch_marker};
use crate::cache::{self, CacheTier, NetworkCache, NoCache};
use crate::config::InstallerConfig;
use crate::dist::{Distribution, Location, Precedence};
use crate::environment::{Environment, WorkingSet};
use crate::error::{Error, Result};
use crate::filesystem::{copy_tree, replace};
use crate::index::client::IndexClient;
use crate::index::registry::IndexRegistry;
use crate::index::{PackageIndex, download_name, fix_file_links};
use crate::requirement::Requirement;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{Level, debug, info, warn};

/// Outcome of one [`Installer::install`] call
#[derive(Debug, Clone)]
pub struct Installation {
    pub working_set: WorkingSet,
    /// Versions chosen without a pin during this call
    pub picked: PickedVersions,
}

/// Scratch space for downloads: the persistent download cache, or a
/// temporary directory removed on drop
pub(crate) enum Scratch {
    Cache(PathBuf),
    Temporary(TempDir),
}

impl Scratch {
    pub(crate) fn path(&self) -> &Path {
        match self {
            Scratch::Cache(path) => path,
            Scratch::Temporary(dir) => dir.path(),
        }
    }
}

/// Resolves requirements and installs the distributions they need
pub struct Installer {
    config: InstallerConfig,
    pub(crate) dest: Option<PathBuf>,
    download_cache: Option<PathBuf>,
    newest: bool,
    index_url: String,
    links: Vec<String>,
    pub(crate) env: Environment,
    registry: IndexRegistry,
    cache: Arc<dyn CacheTier>,
    pub(crate) toolchain: Toolchain,
    picked: PickedVersions,
    provenance: Vec<String>,
}

impl Installer {
    /// Set up an installer from configuration
    ///
    /// A network cache that cannot be initialised is reported and
    /// replaced by no cache at all.
    pub fn new(config: InstallerConfig) -> Result<Self> {
        let download_cache = config
            .download_cache
            .as_ref()
            .map(|dir| fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()));

        let (index_url, links) = if config.install_from_cache {
            let Some(dir) = &download_cache else {
                return Err(Error::ConfigError(
                    "install_from_cache set to true with no download cache".to_string(),
                ));
            };
            (dir.to_string_lossy().into_owned(), Vec::new())
        } else {
            let mut links = fix_file_links(&config.links);
            if let Some(dir) = &download_cache {
                let dir = dir.to_string_lossy().into_owned();
                if !links.contains(&dir) {
                    links.insert(0, dir);
                }
            }
            (config.index_url(), links)
        };

        let dest = config.dest.clone();
        let mut path = config.path.clone();
        if let Some(dest) = &dest
            && !path.contains(dest)
        {
            path.insert(0, dest.clone());
        }

        let cache = open_network_cache(&config);
        let registry = IndexRegistry::new(
            config.allow_hosts.clone(),
            config.python_version.clone(),
            Arc::clone(&cache),
        )?;

        Ok(Self {
            newest: config.newest && dest.is_some(),
            env: Environment::new(&path, config.python_version.clone()),
            toolchain: Toolchain::python(&config.python),
            dest,
            download_cache,
            index_url,
            links,
            registry,
            cache,
            picked: PickedVersions::new(),
            provenance: Vec::new(),
            config,
        })
    }

    /// Share indexes (and the pages they have read) with another installer
    pub fn with_registry(mut self, registry: IndexRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Hand back the index registry for reuse
    pub fn into_registry(self) -> IndexRegistry {
        self.registry
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheTier>) -> Self {
        self.registry.set_cache(Arc::clone(&cache));
        self.cache = cache;
        self
    }

    pub fn with_unpacker(mut self, unpacker: Box<dyn Unpacker>) -> Self {
        self.toolchain.unpacker = unpacker;
        self
    }

    pub fn with_setup_runner(mut self, setup: Box<dyn SetupRunner>) -> Self {
        self.toolchain.setup = setup;
        self
    }

    pub fn with_recompiler(mut self, recompiler: Box<dyn Recompiler>) -> Self {
        self.toolchain.recompiler = recompiler;
        self
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Find-links currently in effect, dependency links included
    pub fn links(&self) -> &[String] {
        &self.links
    }

    fn index(&mut self) -> &mut PackageIndex {
        self.registry.get(&self.index_url, &self.links)
    }

    pub(crate) fn registry_client(&self) -> Arc<IndexClient> {
        self.registry.client()
    }

    pub(crate) fn scratch(&self) -> Result<Scratch> {
        match &self.download_cache {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(Scratch::Cache(dir.clone()))
            }
            None => Ok(Scratch::Temporary(tempfile::Builder::new().suffix("get_dist").tempdir()?)),
        }
    }

    // =========================================================================
    // Constraints
    // =========================================================================

    /// Apply the `[versions]` pin for the requirement's project
    pub fn constrain(&self, requirement: &Requirement) -> Result<Requirement> {
        match self.config.versions.constrain(requirement) {
            Err(Error::IncompatibleConstraint {
                requirement,
                constraint,
                ..
            }) => {
                let provenance = self.version_conflict_information(&requirement_key(&requirement));
                info!("{}", provenance.join("\n  "));
                Err(Error::IncompatibleConstraint {
                    requirement,
                    constraint,
                    provenance,
                })
            }
            other => other,
        }
    }

    /// Pins and recorded requirement lines mentioning `name`
    pub fn version_conflict_information(&self, name: &str) -> Vec<String> {
        let name = name.to_lowercase();
        let mut lines = vec![format!("Version and requirements information containing {name}:")];
        if let Some(pin) = self.config.versions.get(&name) {
            lines.push(format!("[versions] constraint on {name}: {pin}"));
        }
        lines.extend(
            self.provenance
                .iter()
                .filter(|line| line.to_lowercase().contains(&name))
                .cloned(),
        );
        lines
    }

    // =========================================================================
    // Candidate selection
    // =========================================================================

    /// Decide whether a local distribution is good enough
    ///
    /// Returns the local distribution to use, or else the best candidate
    /// the index offers. Both are `None` when nothing is known.
    pub fn satisfied(
        &mut self,
        requirement: &Requirement,
        source_only: bool,
    ) -> (Option<Distribution>, Option<Distribution>) {
        let mut dists = self.env.matching(requirement);
        if dists.is_empty() {
            debug!(
                "We have no distributions for {} that satisfies '{}'.",
                requirement.project_name(),
                requirement
            );
            return (None, self.obtain(requirement, source_only));
        }

        if let Some(develop) = dists.iter().find(|d| d.precedence == Precedence::Develop) {
            debug!("We have a develop egg: {}", develop);
            return (Some(develop.clone()), None);
        }

        if requirement.is_exact_pin() {
            debug!("We have the distribution that satisfies '{}'.", requirement);
            return (Some(dists.swap_remove(0)), None);
        }

        if self.config.prefer_final {
            let finals: Vec<Distribution> = dists.iter().filter(|d| !d.version().is_prerelease()).cloned().collect();
            if !finals.is_empty() {
                dists = finals;
            }
        }

        let best_we_have = dists.swap_remove(0);
        if !self.newest {
            return (Some(best_we_have), None);
        }

        let Some(best_available) = self.obtain(requirement, source_only) else {
            debug!(
                "There are no distros available that meet '{}'.\nUsing our best, {}.",
                requirement, best_we_have
            );
            return (Some(best_we_have), None);
        };

        let have = best_we_have.version();
        let available = best_available.version();
        let upgrade = if self.config.prefer_final {
            match (available.is_prerelease(), have.is_prerelease()) {
                (false, false) => have < available,
                (false, true) => true,
                (true, true) => have < available,
                (true, false) => false,
            }
        } else {
            have < available
        };

        if upgrade {
            return (None, Some(best_available));
        }
        debug!("We have the best distribution that satisfies '{}'.", requirement);
        (Some(best_we_have), None)
    }

    /// Best candidate from the index
    ///
    /// Among the highest matching versions a candidate already in the
    /// download cache wins; otherwise the last in sort order.
    pub fn obtain(&mut self, requirement: &Requirement, source_only: bool) -> Option<Distribution> {
        let text = requirement.to_string();
        let stripped = strip_patch_marker(&text);
        let requirement = if stripped != text {
            Requirement::parse(&stripped).unwrap_or_else(|_| requirement.clone())
        } else {
            requirement.clone()
        };

        let index = self.index();
        index.obtain(&requirement)?;
        let mut dists: Vec<Distribution> = index
            .candidates(requirement.key())
            .iter()
            .filter(|d| d.satisfies(&requirement) && (!source_only || d.precedence == Precedence::Source))
            .cloned()
            .collect();

        if self.config.prefer_final {
            let finals: Vec<Distribution> = dists.iter().filter(|d| !d.version().is_prerelease()).cloned().collect();
            if !finals.is_empty() {
                dists = finals;
            }
        }

        let best_version = dists.iter().map(|d| d.version().clone()).max()?;
        let mut best: Vec<Distribution> = dists.into_iter().filter(|d| d.version() == &best_version).collect();
        if best.len() == 1 {
            return best.pop();
        }

        if let Some(cache_dir) = &self.download_cache
            && let Some(cached) = best.iter().find(|d| d.is_in_directory(cache_dir))
        {
            return Some(cached.clone());
        }

        best.sort();
        best.pop()
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Make a candidate's artifact available in `tmp`
    ///
    /// The network cache is tried first; a download from the index is
    /// offered back to it.
    pub fn fetch(&mut self, dist: &Distribution, tmp: &Path) -> Result<Distribution> {
        if let Some(cache_dir) = &self.download_cache
            && dist.is_in_directory(cache_dir)
        {
            return Ok(dist.clone());
        }

        let from_cache = match &dist.location {
            Location::Remote(url) => {
                let target = tmp.join(download_name(url)?);
                cache::fetch_artifact(self.cache.as_ref(), url, &target, None).then_some(target)
            }
            Location::Local(_) => None,
        };

        let mut new_location = match from_cache {
            Some(path) => path,
            None => {
                let location = dist.location.clone();
                let downloaded = self.index().download(&location, tmp)?;
                if let Location::Remote(url) = &dist.location {
                    cache::store_artifact(self.cache.as_ref(), url, &downloaded);
                }
                downloaded
            }
        };

        if self.download_cache.is_some()
            && dist.location.as_path().is_some_and(|p| same_file(p, &new_location))
            && new_location.is_file()
            && let Some(name) = new_location.file_name()
        {
            let copy = tmp.join(name);
            if !same_file(&copy, &new_location) {
                fs::copy(&new_location, &copy)?;
                new_location = copy;
            }
        }

        Ok(dist.with_location(Location::Local(new_location)))
    }

    /// Get distributions satisfying `requirement` into the destination
    fn get_dist(
        &mut self,
        requirement: &Requirement,
        ws: &mut WorkingSet,
        bootstrap: bool,
        patches: &PatchDirectives,
    ) -> Result<Vec<Distribution>> {
        let (existing, available) = self.satisfied(requirement, false);

        let dists = match existing {
            Some(dist) => vec![dist],
            None => {
                let Some(dest) = self.dest.clone() else {
                    return Err(Error::UserError(format!(
                        "We don't have a distribution for {requirement}\n\
                         and can't install one in offline (no-install) mode.\n"
                    )));
                };
                info!("Getting distribution for '{}'.", requirement);
                let Some(available) = available else {
                    return Err(Error::MissingDistribution(requirement.to_string()));
                };

                let scratch = self.scratch()?;
                let fetched = self.fetch(&available, scratch.path())?;
                let dists = if fetched.precedence == Precedence::Egg {
                    self.install_egg(&fetched, &dest)?
                } else {
                    let built = self.build_fetched(
                        &fetched,
                        &dest,
                        &BuildExt::default(),
                        patches.get(requirement.key()),
                    )?;
                    if bootstrap {
                        for dist in &built {
                            ws.add(dist.clone(), true);
                        }
                    }
                    built
                };
                drop(scratch);

                self.env.scan(&[&dest]);
                match self.env.best_match(requirement, ws) {
                    Ok(Some(dist)) => info!("Got {}.", dist),
                    Ok(None) => debug!("Nothing local matches '{}' after install", requirement),
                    Err(conflict) => debug!("{}", conflict),
                }
                dists
            }
        };

        if !self.config.install_from_cache && self.config.use_dependency_links {
            for dist in &dists {
                for link in dist.dependency_links() {
                    let link = link.trim().to_string();
                    if !link.is_empty() && !self.links.contains(&link) {
                        debug!("Adding find link '{}' from {}", link, dist);
                        self.links.push(link);
                    }
                }
            }
        }

        for dist in &dists {
            if dist.precedence == Precedence::Develop || requirement.is_exact_pin() {
                continue;
            }
            debug!("Picked: {} = {}", dist.project_name(), dist.version());
            self.picked.pick(dist.project_name(), dist.version().as_str());
            if !self.config.allow_picked_versions {
                return Err(Error::UserError(format!(
                    "Picked: {} = {}",
                    dist.project_name(),
                    dist.version()
                )));
            }
        }

        Ok(dists)
    }

    /// Place a fetched egg in `dest`, unpacking zipped ones
    fn install_egg(&self, egg: &Distribution, dest: &Path) -> Result<Vec<Distribution>> {
        let source = egg
            .location
            .as_path()
            .ok_or_else(|| Error::DownloadError(format!("{egg} was not fetched locally")))?;
        let name = source
            .file_name()
            .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?;
        let target = dest.join(name);

        fs::create_dir_all(dest)?;
        let staging = tempfile::Builder::new().prefix(".egg-").tempdir_in(dest)?;
        let staged = staging.path().join(name);
        if source.is_dir() {
            copy_tree(source, &staged)?;
        } else {
            self.toolchain.unpacker.unpack(source, &staged)?;
        }
        self.toolchain.recompiler.recompile(&staged)?;
        replace(&staged, &target)?;

        Ok(Environment::new(&[target], self.config.python_version.clone())
            .get(egg.project_name())
            .to_vec())
    }

    /// Namespace-package distributions that forget to require setuptools
    /// get it added
    fn maybe_add_setuptools(&mut self, ws: &mut WorkingSet, dist: &Distribution) -> Result<()> {
        if !dist.has_namespace_packages() {
            return Ok(());
        }
        if dist.requires(&[])?.iter().any(|r| r.key() == "setuptools") {
            return Ok(());
        }
        if dist.precedence == Precedence::Develop {
            warn!(
                "Develop distribution: {}\nuses namespace packages but the distribution does not require setuptools.",
                dist
            );
        }
        let requirement = self.constrain(&Requirement::unconstrained("setuptools"))?;
        if ws.find(&requirement)?.is_none() {
            for setuptools in self.get_dist(&requirement, ws, false, &PatchDirectives::default())? {
                ws.add(setuptools, false);
            }
        }
        Ok(())
    }

    fn log_requirement(&mut self, ws: &WorkingSet, requirement: &Requirement) {
        if !tracing::enabled!(Level::DEBUG) && !self.config.store_required_by {
            return;
        }
        for dist in ws.sorted() {
            let declares = dist
                .requires(&[])
                .map(|reqs| reqs.contains(requirement))
                .unwrap_or(false);
            if declares {
                debug!("  required by {}.", dist);
                self.picked
                    .add_required_by(requirement.key(), &dist.as_requirement().to_string());
            }
        }
    }

    fn acquire(
        &mut self,
        requirement: &Requirement,
        ws: &mut WorkingSet,
        bootstrap: bool,
        patches: &PatchDirectives,
    ) -> Result<Option<Distribution>> {
        if patches.contains(requirement.key()) {
            let built = self.build(&requirement.to_string(), &BuildExt::default(), patches)?;
            self.env.scan(&built);
        }
        let mut last = None;
        for dist in self.get_dist(requirement, ws, bootstrap, patches)? {
            ws.add(dist.clone(), false);
            self.maybe_add_setuptools(ws, &dist)?;
            last = Some(dist);
        }
        Ok(last)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Install `specs` and everything they require
    ///
    /// Dependencies are processed breadth-first; each distinct requirement
    /// is handled once, so cycles terminate. An existing working set can
    /// be passed in to extend it.
    pub fn install<S: AsRef<str>>(
        &mut self,
        specs: &[S],
        working_set: Option<WorkingSet>,
        patches: &PatchDirectives,
    ) -> Result<Installation> {
        let quoted: Vec<String> = specs.iter().map(|s| format!("'{}'", s.as_ref())).collect();
        debug!("Installing {}.", quoted.join(", "));
        self.provenance
            .push(format!("Base installation request: {}", quoted.join(", ")));

        let bootstrap = self.config.tolerate_bootstrap_conflicts;
        let requirements = specs
            .iter()
            .map(|spec| self.constrain(&Requirement::parse(spec.as_ref())?))
            .collect::<Result<Vec<_>>>()?;

        let mut ws = working_set.unwrap_or_default();
        for requirement in &requirements {
            self.acquire(requirement, &mut ws, bootstrap, patches)?;
        }

        let env = Environment::from_working_set(&ws);
        let mut queue: VecDeque<Requirement> = requirements.into_iter().rev().collect();
        let mut processed: HashSet<Requirement> = HashSet::new();
        let mut best: HashMap<String, Distribution> = HashMap::new();

        while let Some(current) = queue.pop_front() {
            let requirement = self.constrain(&current)?;
            if processed.contains(&requirement) {
                continue;
            }

            let mut dist = best.get(requirement.key()).cloned();
            if dist.is_none() {
                match env.best_match(&requirement, &ws) {
                    Ok(found) => dist = found,
                    Err(conflict) => {
                        debug!(
                            "Version conflict while processing requirement {} (constrained to {})",
                            current, requirement
                        );
                        if !bootstrap {
                            return Err(conflict.with_dependents(&ws).into());
                        }
                    }
                }
            }

            let dist = match dist {
                Some(dist) => dist,
                None => {
                    if self.dest.is_some() {
                        debug!("Getting required '{}'", requirement);
                    } else {
                        debug!("Adding required '{}'", requirement);
                    }
                    self.log_requirement(&ws, &requirement);
                    self.acquire(&requirement, &mut ws, bootstrap, patches)?
                        .ok_or_else(|| Error::MissingDistribution(requirement.to_string()))?
                }
            };

            if !dist.satisfies(&requirement) {
                let provenance = self.version_conflict_information(requirement.key());
                info!("{}", provenance.join("\n  "));
                return Err(VersionConflict::new(dist, requirement).with_dependents(&ws).into());
            }

            let extra = dist.requires(&requirement.extras)?;
            for dependency in extra.iter().rev() {
                self.provenance
                    .push(format!("Requirement of {current}: {dependency}"));
                queue.push_back(dependency.clone());
            }
            best.insert(requirement.key().to_string(), dist);
            processed.insert(requirement);
        }

        Ok(Installation {
            working_set: ws,
            picked: std::mem::take(&mut self.picked),
        })
    }
}

/// Install `specs` with a fresh installer
pub fn install<S: AsRef<str>>(specs: &[S], config: InstallerConfig, patches: &PatchDirectives) -> Result<Installation> {
    Installer::new(config)?.install(specs, None, patches)
}

/// Build `spec` from source with a fresh installer
pub fn build(spec: &str, config: InstallerConfig, build_ext: &BuildExt, patches: &PatchDirectives) -> Result<Vec<PathBuf>> {
    Installer::new(config)?.build(spec, build_ext, patches)
}

fn open_network_cache(config: &InstallerConfig) -> Arc<dyn CacheTier> {
    let nc = &config.network_cache;
    if !nc.download_enabled() && !nc.upload_enabled() {
        return Arc::new(NoCache);
    }
    match NetworkCache::from_config(nc) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Network cache disabled: {}", e);
            Arc::new(NoCache)
        }
    }
}

fn requirement_key(requirement: &str) -> String {
    Requirement::parse(requirement)
        .map(|r| r.key().to_string())
        .unwrap_or_else(|_| requirement.to_lowercase())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::VersionPins;

    fn offline(dir: &Path) -> Installer {
        let config = InstallerConfig::default()
            .with_path(vec![dir.to_path_buf()])
            .with_index(format!("file://{}/", dir.display()));
        Installer::new(config).unwrap()
    }

    #[test]
    fn test_install_from_cache_needs_cache() {
        let config = InstallerConfig {
            install_from_cache: true,
            ..InstallerConfig::default()
        };
        assert!(matches!(Installer::new(config), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_download_cache_is_first_link() {
        let dir = tempfile::tempdir().unwrap();
        let config = InstallerConfig::default()
            .with_links(["https://example.org/dist/"])
            .with_download_cache(dir.path());
        let installer = Installer::new(config).unwrap();
        let cache = fs::canonicalize(dir.path()).unwrap();
        assert_eq!(installer.links()[0], cache.to_string_lossy());
        assert_eq!(installer.links()[1], "https://example.org/dist/");
    }

    #[test]
    fn test_constraint_conflict_carries_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = offline(dir.path());
        installer.config.versions = VersionPins::from_iter([("six", "1.0")]);
        installer.provenance.push("Requirement of app: six>=2".to_string());

        let err = installer.constrain(&Requirement::parse("six>=2").unwrap()).unwrap_err();
        match err {
            Error::IncompatibleConstraint { provenance, .. } => {
                assert_eq!(provenance[0], "Version and requirements information containing six:");
                assert_eq!(provenance[1], "[versions] constraint on six: 1.0");
                assert_eq!(provenance[2], "Requirement of app: six>=2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_offline_has_no_newest() {
        let dir = tempfile::tempdir().unwrap();
        let installer = offline(dir.path());
        assert!(!installer.newest);
    }
}
