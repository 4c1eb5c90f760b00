// src/environment/working_set.rs

//! The resolved set of distributions, one per project

use crate::dist::{Distribution, Location};
use crate::installer::conflict::VersionConflict;
use crate::requirement::Requirement;
use std::collections::HashMap;

/// Ordered, conflict-checked distributions keyed by project
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    dists: Vec<Distribution>,
    by_key: HashMap<String, usize>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a distribution
    ///
    /// A project already present is left alone unless `replace` is set, in
    /// which case the new distribution takes its slot. Returns whether the
    /// set changed.
    pub fn add(&mut self, dist: Distribution, replace: bool) -> bool {
        match self.by_key.get(dist.key()) {
            Some(&index) if replace => {
                self.dists[index] = dist;
                true
            }
            Some(_) => false,
            None => {
                self.by_key.insert(dist.key().to_string(), self.dists.len());
                self.dists.push(dist);
                true
            }
        }
    }

    /// The member for the requirement's project
    ///
    /// Fails when that member does not satisfy the requirement.
    pub fn find(&self, requirement: &Requirement) -> Result<Option<&Distribution>, VersionConflict> {
        match self.get(requirement.key()) {
            Some(dist) if !dist.satisfies(requirement) => {
                Err(VersionConflict::new(dist.clone(), requirement.clone()))
            }
            found => Ok(found),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Distribution> {
        self.by_key.get(key).map(|&i| &self.dists[i])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Distribution> {
        self.dists.iter()
    }

    pub fn len(&self) -> usize {
        self.dists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dists.is_empty()
    }

    /// Locations in insertion order, for launcher generation
    pub fn locations(&self) -> Vec<Location> {
        self.dists.iter().map(|d| d.location.clone()).collect()
    }

    /// Members sorted by project then version
    pub fn sorted(&self) -> Vec<&Distribution> {
        let mut dists: Vec<&Distribution> = self.dists.iter().collect();
        dists.sort_by(|a, b| a.key().cmp(b.key()).then_with(|| a.cmp(b)));
        dists
    }
}

impl<'a> IntoIterator for &'a WorkingSet {
    type Item = &'a Distribution;
    type IntoIter = std::slice::Iter<'a, Distribution>;

    fn into_iter(self) -> Self::IntoIter {
        self.dists.iter()
    }
}
