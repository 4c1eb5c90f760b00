// src/requirement/constraint.rs

//! Global `[versions]` pins applied on top of requirements

use super::{Requirement, project_key};
use crate::error::{Error, Result};
use crate::version::{Operator, Specifier, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version pins keyed by lower-cased project name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct VersionPins {
    pins: BTreeMap<String, String>,
}

impl VersionPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a project; the name is normalised to its lookup key
    pub fn insert(&mut self, project: &str, pin: impl Into<String>) {
        self.pins.insert(project_key(project), pin.into().trim().to_string());
    }

    pub fn get(&self, project: &str) -> Option<&str> {
        self.pins.get(&project_key(project)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pins.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Apply the pin for `requirement`'s project, if any
    ///
    /// An exact pin (`==X` or bare `X`) must be allowed by the requirement
    /// and replaces its clauses with `==X`. A relative pin (`<X`, `>=X`,
    /// `!=X`, `~=X`) is appended as one more clause without checking.
    pub fn constrain(&self, requirement: &Requirement) -> Result<Requirement> {
        match self.pins.get(requirement.key()) {
            Some(pin) => constrain(requirement, pin),
            None => Ok(requirement.clone()),
        }
    }
}

impl From<BTreeMap<String, String>> for VersionPins {
    fn from(raw: BTreeMap<String, String>) -> Self {
        let mut pins = VersionPins::new();
        for (project, pin) in raw {
            pins.insert(&project, pin);
        }
        pins
    }
}

impl From<VersionPins> for BTreeMap<String, String> {
    fn from(pins: VersionPins) -> Self {
        pins.pins
    }
}

impl<S: AsRef<str>, V: Into<String>> FromIterator<(S, V)> for VersionPins {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut pins = VersionPins::new();
        for (project, pin) in iter {
            pins.insert(project.as_ref(), pin);
        }
        pins
    }
}

/// Combine a requirement with a single pin string
pub fn constrain(requirement: &Requirement, pin: &str) -> Result<Requirement> {
    let pin = pin.trim();
    if pin.starts_with(['<', '>', '!', '~']) {
        let spec = Specifier::parse(pin).map_err(|_| Error::InvalidRequirement {
            input: pin.to_string(),
            reason: format!("invalid version constraint for {}", requirement.name),
        })?;
        let mut specs = requirement.specs.clone();
        if !specs.contains(&spec) {
            specs.push(spec);
        }
        return Ok(requirement.with_specs(specs));
    }

    let version = pin.strip_prefix("==").unwrap_or(pin).trim();
    if !requirement.satisfies(&Version::parse(version)) {
        return Err(Error::IncompatibleConstraint {
            requirement: requirement.to_string(),
            constraint: version.to_string(),
            provenance: Vec::new(),
        });
    }
    Ok(requirement.with_specs(vec![Specifier::new(Operator::Equal, version)]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(s: &str) -> Requirement {
        Requirement::parse(s).unwrap()
    }

    #[test]
    fn test_no_pin_is_identity() {
        let pins = VersionPins::new();
        let r = req("foo>=1");
        assert_eq!(pins.constrain(&r).unwrap(), r);
    }

    #[test]
    fn test_exact_pin_replaces_specs() {
        let pins: VersionPins = [("Foo", "1.5")].into_iter().collect();
        let constrained = pins.constrain(&req("foo>=1,<2")).unwrap();
        assert_eq!(constrained.exact_pin(), Some("1.5"));
        assert!(constrained.satisfies_str("1.5"));
        assert!(!constrained.satisfies_str("1.6"));
        assert!(!constrained.satisfies_str("1.4"));
    }

    #[test]
    fn test_exact_pin_with_operator() {
        let constrained = constrain(&req("foo"), "==2.0").unwrap();
        assert_eq!(constrained.to_string(), "foo==2.0");
    }

    #[test]
    fn test_incompatible_pin() {
        for pin in ["2.0", "==0.9", "1.0a1"] {
            let err = constrain(&req("foo>=1.0,<2"), pin).unwrap_err();
            match err {
                Error::IncompatibleConstraint {
                    requirement,
                    constraint,
                    ..
                } => {
                    assert_eq!(requirement, "foo<2,>=1.0");
                    assert_eq!(constraint, pin.trim_start_matches("=="));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_incompatible_message() {
        let err = constrain(&req("foo==1.0"), "1.1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The requirement ('foo==1.0') is not allowed by your [versions] constraint (1.1)"
        );
    }

    #[test]
    fn test_relative_pin_appends() {
        let constrained = constrain(&req("foo>=1.0"), "<3").unwrap();
        assert_eq!(constrained.specs.len(), 2);
        assert!(constrained.satisfies_str("2.9"));
        assert!(!constrained.satisfies_str("3.0"));

        // No exactness check for relative pins, even when disjoint.
        let disjoint = constrain(&req("foo>=5"), "<3").unwrap();
        assert!(!disjoint.satisfies_str("4"));
    }

    #[test]
    fn test_pins_lookup_is_case_insensitive() {
        let mut pins = VersionPins::new();
        pins.insert("Zope_Interface", "4.0");
        assert_eq!(pins.get("zope-interface"), Some("4.0"));
        assert_eq!(pins.constrain(&req("zope.interface")).unwrap().exact_pin(), None);
        assert_eq!(pins.constrain(&req("zope-interface")).unwrap().exact_pin(), Some("4.0"));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let pins: VersionPins = toml::from_str("Foo = \"1.0\"\nbar = \"<2\"\n").unwrap();
        assert_eq!(pins.get("foo"), Some("1.0"));
        assert_eq!(pins.get("BAR"), Some("<2"));
    }
}
