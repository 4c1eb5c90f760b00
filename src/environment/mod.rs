// src/environment/mod.rs

//! Distributions already present on local search paths

pub mod working_set;

pub use working_set::WorkingSet;

use crate::dist::{Distribution, Location};
use crate::installer::conflict::VersionConflict;
use crate::requirement::{Requirement, project_key};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project key to candidates, best first
#[derive(Debug, Clone, Default)]
pub struct Environment {
    python_version: Option<String>,
    distmap: HashMap<String, Vec<Distribution>>,
}

impl Environment {
    /// Scan every entry of `search_path`
    pub fn new(search_path: &[PathBuf], python_version: Option<String>) -> Self {
        let mut env = Environment {
            python_version,
            distmap: HashMap::new(),
        };
        env.scan(search_path);
        env
    }

    /// An environment holding exactly the working set's members
    pub fn from_working_set(ws: &WorkingSet) -> Self {
        let mut env = Environment::default();
        for dist in ws.iter() {
            env.add(dist.clone());
        }
        env
    }

    /// Add every distribution found on `paths`
    pub fn scan<P: AsRef<Path>>(&mut self, paths: &[P]) {
        for path in paths {
            for dist in find_distributions(path.as_ref()) {
                self.add(dist);
            }
        }
    }

    /// Add a distribution, keeping each project's list sorted best first
    ///
    /// Distributions built for another Python version are ignored.
    pub fn add(&mut self, dist: Distribution) -> bool {
        if !dist.is_compatible(self.python_version.as_deref()) {
            debug!("Ignoring {} built for Python {:?}", dist, dist.py_version);
            return false;
        }
        let dists = self.distmap.entry(dist.key().to_string()).or_default();
        if dists.contains(&dist) {
            return false;
        }
        dists.push(dist);
        dists.sort_by(|a, b| b.cmp(a));
        true
    }

    /// Candidates of a project, best first
    pub fn get(&self, project: &str) -> &[Distribution] {
        self.distmap
            .get(&project_key(project))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Candidates of the requirement's project satisfying it, best first
    pub fn matching(&self, requirement: &Requirement) -> Vec<Distribution> {
        self.get(requirement.key())
            .iter()
            .filter(|d| d.satisfies(requirement))
            .cloned()
            .collect()
    }

    pub fn projects(&self) -> impl Iterator<Item = &str> {
        self.distmap.keys().map(String::as_str)
    }

    /// The working set's member if present, else the best local candidate
    ///
    /// Fails when the working set already holds a version of the project
    /// that does not satisfy the requirement.
    pub fn best_match(
        &self,
        requirement: &Requirement,
        ws: &WorkingSet,
    ) -> std::result::Result<Option<Distribution>, VersionConflict> {
        if let Some(dist) = ws.find(requirement)? {
            return Ok(Some(dist.clone()));
        }
        Ok(self
            .get(requirement.key())
            .iter()
            .find(|d| d.satisfies(requirement))
            .cloned())
    }
}

/// Distributions found at one search path entry
///
/// An egg entry yields itself. A directory yields its eggs, the develop
/// installs described by `*.egg-info` children, and the targets of
/// `*.egg-link` pointers.
pub fn find_distributions(path: &Path) -> Vec<Distribution> {
    let is_egg = path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().to_lowercase().ends_with(".egg"));
    if is_egg {
        return Distribution::from_filename(path);
    }
    if !path.is_dir() {
        return Vec::new();
    }

    let mut entries = match fs::read_dir(path) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect::<Vec<_>>(),
        Err(e) => {
            debug!("Cannot scan {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    entries.sort();

    let mut found = Vec::new();
    for entry in entries {
        let name = entry
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".egg") {
            found.extend(Distribution::from_filename(&entry));
        } else if name.ends_with(".egg-info") {
            found.extend(Distribution::develop(path, &entry));
        } else if name.ends_with(".egg-link") {
            found.extend(follow_egg_link(path, &entry));
        }
    }
    found
}

fn follow_egg_link(base: &Path, link: &Path) -> Vec<Distribution> {
    let target = match fs::read_to_string(link) {
        Ok(content) => content.lines().map(str::trim).find(|l| !l.is_empty()).map(PathBuf::from),
        Err(e) => {
            debug!("Cannot read {}: {}", link.display(), e);
            None
        }
    };
    let Some(target) = target else {
        return Vec::new();
    };
    let target = base.join(target);

    let Ok(entries) = fs::read_dir(&target) else {
        debug!("Develop link {} points at missing {}", link.display(), target.display());
        return Vec::new();
    };
    let mut infos: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().to_lowercase().ends_with(".egg-info"))
        .collect();
    infos.sort();
    infos
        .iter()
        .filter_map(|info| Distribution::develop(&target, info))
        .collect()
}

/// Location of a distribution as a local path, if it has one
pub fn local_path(dist: &Distribution) -> Option<&Path> {
    match &dist.location {
        Location::Local(path) => Some(path),
        Location::Remote(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::Precedence;

    fn make_egg(dir: &Path, name: &str, version: &str, requires: &str) -> PathBuf {
        let egg = dir.join(format!("{}-{}-py3.11.egg", name, version));
        fs::create_dir_all(egg.join("EGG-INFO")).unwrap();
        fs::write(egg.join("EGG-INFO/requires.txt"), requires).unwrap();
        egg
    }

    #[test]
    fn test_scan_sorts_best_first() {
        let dir = tempfile::tempdir().unwrap();
        make_egg(dir.path(), "foo", "1.0", "");
        make_egg(dir.path(), "foo", "2.0a1", "");
        make_egg(dir.path(), "foo", "1.5", "bar\n");
        make_egg(dir.path(), "bar", "0.1", "");

        let env = Environment::new(&[dir.path().to_path_buf()], None);
        let versions: Vec<_> = env.get("Foo").iter().map(|d| d.version().to_string()).collect();
        assert_eq!(versions, vec!["2.0a1", "1.5", "1.0"]);
        assert_eq!(env.get("bar").len(), 1);
        assert_eq!(env.get("foo")[1].requires(&[]).unwrap()[0].name, "bar");
    }

    #[test]
    fn test_python_version_filter() {
        let dir = tempfile::tempdir().unwrap();
        make_egg(dir.path(), "foo", "1.0", "");
        let env = Environment::new(&[dir.path().to_path_buf()], Some("2.7".into()));
        assert!(env.get("foo").is_empty());
    }

    #[test]
    fn test_egg_link_develop() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src").join("foo");
        fs::create_dir_all(src.join("foo.egg-info")).unwrap();
        fs::write(src.join("foo.egg-info/PKG-INFO"), "Version: 0.1.dev0\n").unwrap();
        let develop_eggs = dir.path().join("develop-eggs");
        fs::create_dir(&develop_eggs).unwrap();
        fs::write(develop_eggs.join("foo.egg-link"), format!("{}\n.\n", src.display())).unwrap();

        let env = Environment::new(&[develop_eggs], None);
        let dists = env.get("foo");
        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].precedence, Precedence::Develop);
        assert_eq!(local_path(&dists[0]), Some(src.as_path()));
    }

    #[test]
    fn test_best_match_prefers_working_set() {
        let dir = tempfile::tempdir().unwrap();
        make_egg(dir.path(), "foo", "1.0", "");
        make_egg(dir.path(), "foo", "2.0", "");
        let env = Environment::new(&[dir.path().to_path_buf()], None);

        let mut ws = WorkingSet::new();
        let req = Requirement::parse("foo").unwrap();
        assert_eq!(env.best_match(&req, &ws).unwrap().unwrap().version().as_str(), "2.0");

        ws.add(env.get("foo")[1].clone(), false);
        assert_eq!(env.best_match(&req, &ws).unwrap().unwrap().version().as_str(), "1.0");

        let conflict = env.best_match(&Requirement::parse("foo>=2").unwrap(), &ws).unwrap_err();
        assert_eq!(conflict.existing.version().as_str(), "1.0");
    }
}
