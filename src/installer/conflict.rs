// src/installer/conflict.rs

//! Version conflicts detected while assembling a working set

use crate::dist::Distribution;
use crate::environment::WorkingSet;
use crate::requirement::Requirement;

/// An already-chosen distribution does not satisfy a later requirement
#[derive(Debug, Clone)]
pub struct VersionConflict {
    /// The distribution already in the working set
    pub existing: Distribution,
    /// The requirement it fails
    pub requirement: Requirement,
    /// Dependents that asked for the requirement
    pub required_by: Vec<String>,
}

impl VersionConflict {
    pub fn new(existing: Distribution, requirement: Requirement) -> Self {
        VersionConflict {
            existing,
            requirement,
            required_by: Vec::new(),
        }
    }

    /// Record a dependent, ignoring duplicates
    pub fn required_by(mut self, dependent: impl Into<String>) -> Self {
        let dependent = dependent.into();
        if !self.required_by.contains(&dependent) {
            self.required_by.push(dependent);
        }
        self
    }

    /// Add every working set member that declares the requirement
    pub fn with_dependents(mut self, ws: &WorkingSet) -> Self {
        for dist in ws.sorted() {
            let declares = dist
                .requires(&[])
                .map(|reqs| {
                    reqs.iter().any(|r| {
                        r == &self.requirement
                            || (r.key() == self.requirement.key() && !self.existing.satisfies(r))
                    })
                })
                .unwrap_or(false);
            if declares {
                self = self.required_by(dist.to_string());
            }
        }
        self
    }
}

impl std::fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "There is a version conflict.")?;
        write!(f, "We already have: {}", self.existing)?;
        for dependent in &self.required_by {
            write!(f, "\nbut {} requires '{}'.", dependent, self.requirement)?;
        }
        Ok(())
    }
}

impl std::error::Error for VersionConflict {}
