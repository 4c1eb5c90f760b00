// src/requirement/mod.rs

//! Requirement parsing and satisfaction
//!
//! A requirement names a project, optionally selects extras and restricts
//! acceptable versions with comma-separated clauses:
//!
//! ```text
//! zc.buildout
//! foo[bar,baz] >=1.0, <2
//! foo (==1.4.2)
//! foo>=1.0; python_version >= "3"
//! ```
//!
//! Project names compare case-insensitively after `safe_name` normalisation,
//! so `Foo_Bar` and `foo-bar` share the key `foo-bar`.

pub mod constraint;

pub use constraint::VersionPins;

use crate::error::{Error, Result};
use crate::version::{Operator, Specifier, Version};
use regex::Regex;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)").unwrap());
static UNSAFE_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.]+").unwrap());
static UNSAFE_EXTRA_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.-]+").unwrap());

/// Normalise a project name: runs of characters other than letters,
/// digits and `.` collapse to a single `-`
pub fn safe_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name, "-").into_owned()
}

/// Normalise an extra name
pub fn safe_extra(extra: &str) -> String {
    UNSAFE_EXTRA_CHARS.replace_all(extra, "_").to_lowercase()
}

/// Case-insensitive lookup key of a project
pub fn project_key(name: &str) -> String {
    safe_name(name).to_lowercase()
}

/// A parsed requirement
#[derive(Debug, Clone)]
pub struct Requirement {
    /// Project name as written
    pub name: String,
    key: String,
    pub extras: Vec<String>,
    pub specs: Vec<Specifier>,
    /// Environment marker, kept verbatim and never evaluated
    pub marker: Option<String>,
}

impl Requirement {
    /// Parse a requirement string
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRequirement {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (body, marker) = match input.split_once(';') {
            Some((body, marker)) => {
                let marker = marker.trim();
                if marker.is_empty() {
                    return Err(invalid("empty environment marker"));
                }
                (body.trim(), Some(marker.to_string()))
            }
            None => (input.trim(), None),
        };
        if body.is_empty() {
            return Err(invalid("empty requirement"));
        }

        let name = NAME_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| invalid("expected a project name"))?;
        let mut rest = body[name.len()..].trim_start();

        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let (inner, tail) = after
                .split_once(']')
                .ok_or_else(|| invalid("unterminated extras list"))?;
            for extra in inner.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !extra.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c)) {
                    return Err(invalid("invalid extra name"));
                }
                let extra = safe_extra(extra);
                if !extras.contains(&extra) {
                    extras.push(extra);
                }
            }
            extras.sort();
            rest = tail.trim_start();
        }

        if rest.starts_with('@') {
            return Err(invalid("direct URL references are not supported"));
        }

        if let Some(inner) = rest.strip_prefix('(') {
            rest = inner
                .trim_end()
                .strip_suffix(')')
                .ok_or_else(|| invalid("unbalanced parenthesis"))?;
        }

        let mut specs = Vec::new();
        if !rest.trim().is_empty() {
            for clause in rest.split(',') {
                let spec = Specifier::parse(clause).map_err(|_| {
                    invalid(&format!("invalid version clause '{}'", clause.trim()))
                })?;
                specs.push(spec);
            }
        }

        Ok(Requirement {
            name: name.to_string(),
            key: project_key(name),
            extras,
            specs,
            marker,
        })
    }

    /// `name==version`, built without re-parsing
    pub fn exact(name: &str, version: &str) -> Requirement {
        Requirement {
            name: name.to_string(),
            key: project_key(name),
            extras: Vec::new(),
            specs: vec![Specifier::new(Operator::Equal, version)],
            marker: None,
        }
    }

    /// Bare project requirement without clauses
    pub fn unconstrained(name: &str) -> Requirement {
        Requirement {
            name: name.to_string(),
            key: project_key(name),
            extras: Vec::new(),
            specs: Vec::new(),
            marker: None,
        }
    }

    /// Case-insensitive project key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `safe_name` of the project
    pub fn project_name(&self) -> String {
        safe_name(&self.name)
    }

    /// Whether a version satisfies every clause
    ///
    /// A requirement without clauses accepts any version.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.specs.iter().all(|spec| spec.contains(version))
    }

    /// Convenience wrapper over [`satisfies`](Self::satisfies) for version text
    pub fn satisfies_str(&self, version: &str) -> bool {
        self.satisfies(&Version::parse(version))
    }

    /// The pinned version when the only clause is `==X` (without wildcard)
    pub fn exact_pin(&self) -> Option<&str> {
        match self.specs.as_slice() {
            [spec] if spec.operator == Operator::Equal && !spec.wildcard => Some(&spec.version),
            _ => None,
        }
    }

    pub fn is_exact_pin(&self) -> bool {
        self.exact_pin().is_some()
    }

    /// True if any clause uses `==`
    pub fn has_equal_clause(&self) -> bool {
        self.specs.iter().any(|s| s.operator == Operator::Equal)
    }

    /// Conjunction of two requirements on the same project
    pub fn and(&self, other: &Requirement) -> Requirement {
        let mut combined = self.clone();
        for spec in &other.specs {
            if !combined.specs.contains(spec) {
                combined.specs.push(spec.clone());
            }
        }
        for extra in &other.extras {
            if !combined.extras.contains(extra) {
                combined.extras.push(extra.clone());
            }
        }
        combined.extras.sort();
        combined
    }

    /// Same project and extras, different clauses
    pub fn with_specs(&self, specs: Vec<Specifier>) -> Requirement {
        Requirement {
            specs,
            ..self.clone()
        }
    }

    fn sorted_specs(&self) -> Vec<String> {
        let mut specs: Vec<String> = self.specs.iter().map(|s| s.to_string()).collect();
        specs.sort();
        specs.dedup();
        specs
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.extras == other.extras
            && self.marker == other.marker
            && self.sorted_specs() == other.sorted_specs()
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.extras.hash(state);
        self.marker.hash(state);
        self.sorted_specs().hash(state);
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        f.write_str(&self.sorted_specs().join(","))?;
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Requirement::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_name() {
        let req = Requirement::parse("zc.buildout").unwrap();
        assert_eq!(req.name, "zc.buildout");
        assert_eq!(req.key(), "zc.buildout");
        assert!(req.specs.is_empty());
        assert!(req.satisfies_str("0.1"));
        assert!(req.satisfies_str("99.0a1"));
    }

    #[test]
    fn test_parse_extras_and_specs() {
        let req = Requirement::parse("Foo_Bar [tests, Docs] >=1.0, <2").unwrap();
        assert_eq!(req.key(), "foo-bar");
        assert_eq!(req.extras, vec!["docs", "tests"]);
        assert_eq!(req.specs.len(), 2);
        assert!(req.satisfies_str("1.5"));
        assert!(!req.satisfies_str("2.0"));
        assert!(!req.satisfies_str("0.9"));
        assert_eq!(req.to_string(), "Foo_Bar[docs,tests]<2,>=1.0");
    }

    #[test]
    fn test_parse_parenthesised() {
        let req = Requirement::parse("foo (==1.4.2)").unwrap();
        assert_eq!(req.exact_pin(), Some("1.4.2"));
        assert_eq!(req.to_string(), "foo==1.4.2");
    }

    #[test]
    fn test_parse_marker_is_kept() {
        let req = Requirement::parse("foo>=1.0; python_version >= \"3\"").unwrap();
        assert_eq!(req.marker.as_deref(), Some("python_version >= \"3\""));
        assert_eq!(req.specs.len(), 1);
    }

    #[test]
    fn test_invalid_requirements() {
        for input in ["", "  ", ">=1.0", "foo >=", "foo[bar", "foo (==1.0", "foo 1.0", "foo @ https://x"] {
            let err = Requirement::parse(input).unwrap_err();
            assert!(matches!(err, Error::InvalidRequirement { .. }), "{input}");
        }
    }

    #[test]
    fn test_exact_pin() {
        assert!(Requirement::parse("foo==1.0").unwrap().is_exact_pin());
        assert!(!Requirement::parse("foo==1.*").unwrap().is_exact_pin());
        assert!(!Requirement::parse("foo==1.0,!=0.9").unwrap().is_exact_pin());
        assert!(Requirement::parse("foo>=1,==1.2").unwrap().has_equal_clause());
    }

    #[test]
    fn test_equality_ignores_clause_order() {
        let a = Requirement::parse("foo>=1,<2").unwrap();
        let b = Requirement::parse("FOO<2, >=1").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_conjunction() {
        let a = Requirement::parse("foo>=1").unwrap();
        let b = Requirement::parse("foo[x]<2").unwrap();
        let both = a.and(&b);
        assert_eq!(both.extras, vec!["x"]);
        assert!(both.satisfies_str("1.5"));
        assert!(!both.satisfies_str("2.1"));
        assert!(!both.satisfies_str("0.5"));
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("foo_bar"), "foo-bar");
        assert_eq!(safe_name("foo  bar!!baz"), "foo-bar-baz");
        assert_eq!(project_key("Zope.Interface"), "zope.interface");
    }
}
