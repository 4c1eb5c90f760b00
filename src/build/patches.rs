// src/build/patches.rs

//! Per-project patch directives applied before a source build

use crate::error::{Error, Result};
use crate::hash::{Hash, HashAlgorithm};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Marker embedded in the version of patched builds
pub const PATCH_MARKER: &str = "SlapOSPatched";

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[+\-]SlapOSPatched\d+").unwrap());

fn default_patch_binary() -> String {
    "patch".to_string()
}

fn default_patch_options() -> Vec<String> {
    vec!["-p0".to_string()]
}

/// Patches for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    /// Patch locations, each optionally suffixed with `#<md5>`
    pub patches: Vec<String>,
    #[serde(default = "default_patch_binary")]
    pub patch_binary: String,
    #[serde(default = "default_patch_options")]
    pub patch_options: Vec<String>,
    /// Revision baked into the version tag; defaults to the patch count
    #[serde(default)]
    pub patch_revision: Option<u32>,
}

impl PatchSet {
    pub fn new<S: Into<String>>(patches: impl IntoIterator<Item = S>) -> Self {
        Self {
            patches: patches.into_iter().map(Into::into).collect(),
            patch_binary: default_patch_binary(),
            patch_options: default_patch_options(),
            patch_revision: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.patch_binary = binary.into();
        self
    }

    /// Whitespace separated option string, as written in a recipe
    pub fn with_options(mut self, options: &str) -> Self {
        self.patch_options = options.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.patch_revision = Some(revision);
        self
    }

    pub fn revision(&self) -> u32 {
        self.patch_revision
            .unwrap_or_else(|| u32::try_from(self.patches.len()).unwrap_or(u32::MAX))
    }

    /// `egg_info` tag appended to the version of the patched build
    pub fn tag_build(&self) -> String {
        format!("+{}{:03}", PATCH_MARKER, self.revision())
    }

    /// Patch locations with their optional md5 checksums
    pub fn entries(&self) -> Result<Vec<(&str, Option<Hash>)>> {
        self.patches
            .iter()
            .map(|entry| match entry.split_once('#') {
                Some((url, md5)) if !md5.is_empty() => Hash::new(HashAlgorithm::Md5, md5)
                    .map(|hash| (url, Some(hash)))
                    .map_err(|e| Error::ParseError(format!("Bad checksum for patch {url}: {e}"))),
                Some((url, _)) => Ok((url, None)),
                None => Ok((entry.as_str(), None)),
            })
            .collect()
    }
}

/// Patch sets keyed by project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, PatchSet>", into = "BTreeMap<String, PatchSet>")]
pub struct PatchDirectives {
    sets: BTreeMap<String, PatchSet>,
}

impl PatchDirectives {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register patches for a project; the name may carry a version
    /// constraint, which is ignored
    pub fn insert(&mut self, project: &str, set: PatchSet) {
        self.sets.insert(patch_key(project), set);
    }

    pub fn get(&self, project: &str) -> Option<&PatchSet> {
        self.sets.get(&patch_key(project))
    }

    pub fn contains(&self, project: &str) -> bool {
        self.sets.contains_key(&patch_key(project))
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

impl From<BTreeMap<String, PatchSet>> for PatchDirectives {
    fn from(raw: BTreeMap<String, PatchSet>) -> Self {
        let mut directives = PatchDirectives::new();
        for (project, set) in raw {
            directives.insert(&project, set);
        }
        directives
    }
}

impl From<PatchDirectives> for BTreeMap<String, PatchSet> {
    fn from(directives: PatchDirectives) -> Self {
        directives.sets
    }
}

fn patch_key(spec: &str) -> String {
    let name = spec.split(['<', '>', '=', '!', '~', '[']).next().unwrap_or(spec);
    crate::requirement::project_key(name.trim())
}

/// Remove the patched-build marker from a requirement string
pub fn strip_patch_marker(requirement: &str) -> String {
    MARKER_RE.replace_all(requirement, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_defaults_to_patch_count() {
        let set = PatchSet::new(["a.patch", "b.patch"]);
        assert_eq!(set.tag_build(), "+SlapOSPatched002");
        assert_eq!(set.with_revision(12).tag_build(), "+SlapOSPatched012");
    }

    #[test]
    fn test_entries_split_checksum() {
        let md5 = "d41d8cd98f00b204e9800998ecf8427e";
        let set = PatchSet::new([format!("/p/fix.patch#{md5}"), "/p/other.patch".to_string()]);
        let entries = set.entries().unwrap();
        assert_eq!(entries[0].0, "/p/fix.patch");
        assert_eq!(entries[0].1.as_ref().unwrap().value, md5);
        assert_eq!(entries[1], ("/p/other.patch", None));

        let bad = PatchSet::new(["/p/fix.patch#nothex"]);
        assert!(matches!(bad.entries(), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_options_and_binary() {
        let set = PatchSet::new(["x"]).with_binary("gpatch").with_options("-p1  --forward");
        assert_eq!(set.patch_binary, "gpatch");
        assert_eq!(set.patch_options, vec!["-p1", "--forward"]);
    }

    #[test]
    fn test_directives_ignore_constraint() {
        let mut directives = PatchDirectives::new();
        directives.insert("Foo.Bar==1.0", PatchSet::new(["x"]));
        assert!(directives.contains("foo.bar"));
        assert!(directives.get("Foo.Bar").is_some());
        assert!(!directives.contains("baz"));
    }

    #[test]
    fn test_strip_marker() {
        assert_eq!(strip_patch_marker("foo==1.0+SlapOSPatched001"), "foo==1.0");
        assert_eq!(strip_patch_marker("foo==1.0-SlapOSPatched12"), "foo==1.0");
        assert_eq!(strip_patch_marker("foo>=1"), "foo>=1");
    }
}
