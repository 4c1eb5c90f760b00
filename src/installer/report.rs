// src/installer/report.rs

//! Versions chosen without a pin, and who asked for them

use crate::requirement::project_key;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Picked-versions ledger returned from each resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PickedVersions {
    picked: BTreeMap<String, String>,
    /// Project key to dependents
    required_by: BTreeMap<String, BTreeSet<String>>,
}

impl PickedVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `project` resolved to `version` without a pin
    pub fn pick(&mut self, project: &str, version: &str) {
        self.picked.insert(project.to_string(), version.to_string());
    }

    /// Record that `dependent` (as `name==version`) requires `project`
    ///
    /// Spellings of the same project share one entry.
    pub fn add_required_by(&mut self, project: &str, dependent: &str) {
        self.required_by
            .entry(project_key(project))
            .or_default()
            .insert(dependent.to_string());
    }

    pub fn picked(&self) -> impl Iterator<Item = (&str, &str)> {
        self.picked.iter().map(|(p, v)| (p.as_str(), v.as_str()))
    }

    pub fn get(&self, project: &str) -> Option<&str> {
        self.picked.get(project).map(String::as_str)
    }

    pub fn required_by(&self, project: &str) -> Option<&BTreeSet<String>> {
        self.required_by.get(&project_key(project))
    }

    pub fn is_empty(&self) -> bool {
        self.picked.is_empty() && self.required_by.is_empty()
    }

    /// Fold another call's ledger into this one
    pub fn merge(&mut self, other: &PickedVersions) {
        self.picked.extend(other.picked.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (requirement, dependents) in &other.required_by {
            self.required_by
                .entry(requirement.clone())
                .or_default()
                .extend(dependents.iter().cloned());
        }
    }

    /// Render as a `[versions]` section ready to pin the next run
    pub fn to_versions_section(&self) -> String {
        let mut out = String::from("[versions]\n");
        for (project, version) in &self.picked {
            if let Some(dependents) = self.required_by(project) {
                out.push_str("\n# Required by:\n");
                for dependent in dependents {
                    let _ = writeln!(out, "# {dependent}");
                }
            }
            let _ = writeln!(out, "{project} = {version}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_unions_ledgers() {
        let mut first = PickedVersions::new();
        first.pick("six", "1.16.0");
        first.add_required_by("six", "app==1.0");

        let mut second = PickedVersions::new();
        second.pick("attrs", "23.1.0");
        second.add_required_by("six", "lib==2.0");

        first.merge(&second);
        assert_eq!(first.get("attrs"), Some("23.1.0"));
        assert_eq!(first.required_by("six").unwrap().len(), 2);
    }

    #[test]
    fn test_versions_section() {
        let mut picked = PickedVersions::new();
        picked.pick("six", "1.16.0");
        picked.pick("attrs", "23.1.0");
        picked.add_required_by("six", "app==1.0");
        assert_eq!(
            picked.to_versions_section(),
            "[versions]\nattrs = 23.1.0\n\n# Required by:\n# app==1.0\nsix = 1.16.0\n"
        );
    }

    #[test]
    fn test_required_by_matches_any_spelling() {
        let mut picked = PickedVersions::new();
        picked.pick("Foo-Bar", "1.0");
        picked.add_required_by("Foo_Bar", "app==1.0");
        picked.add_required_by("FOO BAR", "lib==2.0");

        let dependents = picked.required_by("Foo-Bar").unwrap();
        assert_eq!(dependents.iter().collect::<Vec<_>>(), vec!["app==1.0", "lib==2.0"]);
        assert_eq!(
            picked.to_versions_section(),
            "[versions]\n\n# Required by:\n# app==1.0\n# lib==2.0\nFoo-Bar = 1.0\n"
        );
    }
}
