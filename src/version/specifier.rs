// src/version/specifier.rs

//! Single `(operator, version)` clauses of a requirement

use super::Version;
use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a version clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    /// `~=`
    Compatible,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `>`
    Greater,
    /// `===`
    Arbitrary,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Compatible => "~=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Arbitrary => "===",
        }
    }

    /// Longest operators first so prefixes do not shadow them
    const ALL: [Operator; 8] = [
        Operator::Arbitrary,
        Operator::Compatible,
        Operator::Equal,
        Operator::NotEqual,
        Operator::LessOrEqual,
        Operator::GreaterOrEqual,
        Operator::Less,
        Operator::Greater,
    ];
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A version clause such as `>=1.0` or `==2.*`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Specifier {
    pub operator: Operator,
    /// Version text as written, without any `.*` suffix
    pub version: String,
    /// `==X.*` / `!=X.*` prefix match
    pub wildcard: bool,
}

impl Specifier {
    pub fn new(operator: Operator, version: impl Into<String>) -> Self {
        Specifier {
            operator,
            version: version.into(),
            wildcard: false,
        }
    }

    /// Parse a clause like `>= 1.0`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| Error::InvalidRequirement {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let operator = Operator::ALL
            .iter()
            .copied()
            .find(|op| s.starts_with(op.as_str()))
            .ok_or_else(|| invalid("missing version operator"))?;

        let version = s[operator.as_str().len()..].trim();
        if version.is_empty() {
            return Err(invalid("missing version after operator"));
        }
        if version.contains(char::is_whitespace) || version.contains(',') {
            return Err(invalid("unexpected characters in version"));
        }

        let (version, wildcard) = match version.strip_suffix(".*") {
            Some(prefix) if matches!(operator, Operator::Equal | Operator::NotEqual) => {
                (prefix, true)
            }
            Some(_) => return Err(invalid("wildcards are only allowed with == and !=")),
            None => (version, false),
        };
        if version.is_empty() {
            return Err(invalid("missing version after operator"));
        }

        Ok(Specifier {
            operator,
            version: version.to_string(),
            wildcard,
        })
    }

    /// Whether `candidate` satisfies this clause
    ///
    /// Prereleases are always admissible; exclusive bounds still reject
    /// prereleases, post releases and local variants of the bound itself.
    pub fn contains(&self, candidate: &Version) -> bool {
        let spec = Version::parse(&self.version);
        match self.operator {
            Operator::Arbitrary => candidate.as_str().eq_ignore_ascii_case(&self.version),
            Operator::Equal => self.matches_equal(candidate, &spec),
            Operator::NotEqual => !self.matches_equal(candidate, &spec),
            Operator::LessOrEqual => candidate.public() <= spec,
            Operator::GreaterOrEqual => candidate.public() >= spec,
            Operator::Less => {
                if candidate.public() >= spec {
                    return false;
                }
                !(!spec.is_prerelease()
                    && candidate.is_prerelease()
                    && candidate.base() == spec.base())
            }
            Operator::Greater => {
                if candidate.cmp(&spec) != Ordering::Greater {
                    return false;
                }
                if !spec.is_postrelease()
                    && candidate.is_postrelease()
                    && candidate.base() == spec.base()
                {
                    return false;
                }
                !(candidate.has_local() && candidate.public() == spec)
            }
            Operator::Compatible => {
                let Some(release) = spec.release() else {
                    return false;
                };
                if release.release.len() < 2 || candidate.public() < spec {
                    return false;
                }
                let prefix = &release.release[..release.release.len() - 1];
                matches_prefix(candidate, release.epoch, prefix)
            }
        }
    }

    fn matches_equal(&self, candidate: &Version, spec: &Version) -> bool {
        if self.wildcard {
            return match spec.release() {
                Some(release) => matches_prefix(candidate, release.epoch, &release.release),
                None => false,
            };
        }
        if spec.has_local() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

/// Release-prefix match used by wildcards and `~=`
fn matches_prefix(candidate: &Version, epoch: u64, prefix: &[u64]) -> bool {
    let Some(release) = candidate.release() else {
        return false;
    };
    if release.epoch != epoch {
        return false;
    }
    (0..prefix.len()).all(|i| release.release.get(i).copied().unwrap_or(0) == prefix[i])
}

impl FromStr for Specifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Specifier::parse(s)
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator, self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}
