// src/version/mod.rs

//! Version parsing and ordering for Python distributions
//!
//! Versions follow PEP 440 (`[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`)
//! with the usual spelling aliases (`alpha`, `c`, `pre`, `rev`, `-N` post
//! releases, `_` and `-` separators). Strings that do not parse become
//! legacy versions, which sort before every PEP 440 version and are never
//! considered prereleases.

pub mod specifier;

pub use specifier::{Operator, Specifier};

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^\s*
        v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>[-_.]?(?P<pre_l>alpha|beta|preview|pre|rc|a|b|c)[-_.]?(?P<pre_n>[0-9]+)?)?
        (?P<post>(?:-(?P<post_n1>[0-9]+))|(?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?))?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .unwrap()
});

/// Prerelease phase, ordered alpha < beta < release candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreRelease {
    Alpha,
    Beta,
    Rc,
}

impl PreRelease {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreRelease::Alpha,
            "b" | "beta" => PreRelease::Beta,
            _ => PreRelease::Rc,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PreRelease::Alpha => "a",
            PreRelease::Beta => "b",
            PreRelease::Rc => "rc",
        }
    }
}

/// One dot-separated part of a local version label
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    // Declaration order matters: alphanumeric parts sort before numeric ones.
    Alpha(String),
    Num(u64),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSegment::Alpha(s) => f.write_str(s),
            LocalSegment::Num(n) => write!(f, "{}", n),
        }
    }
}

/// Parsed components of a PEP 440 version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreRelease, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Vec<LocalSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum PreKey {
    DevOnly,
    Pre(PreRelease, u64),
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum DevKey {
    Dev(u64),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct ReleaseKey {
    epoch: u64,
    release: Vec<u64>,
    pre: PreKey,
    post: Option<u64>,
    dev: DevKey,
    local: Option<Vec<LocalSegment>>,
}

impl Release {
    fn key(&self) -> ReleaseKey {
        let mut release = self.release.clone();
        while release.len() > 1 && release.last() == Some(&0) {
            release.pop();
        }
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (None, _, _) => PreKey::Final,
            (Some((phase, n)), _, _) => PreKey::Pre(phase, n),
        };
        let dev = match self.dev {
            Some(n) => DevKey::Dev(n),
            None => DevKey::None,
        };
        let local = if self.local.is_empty() {
            None
        } else {
            Some(self.local.clone())
        };
        ReleaseKey {
            epoch: self.epoch,
            release,
            pre,
            post: self.post,
            dev,
            local,
        }
    }

    fn public(&self) -> Release {
        Release {
            local: Vec::new(),
            ..self.clone()
        }
    }

    fn base(&self) -> Release {
        Release {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Release(Release),
    Legacy(Vec<String>),
}

/// A parsed, comparable distribution version
#[derive(Debug, Clone)]
pub struct Version {
    text: String,
    kind: Kind,
}

impl Version {
    /// Parse a version string
    ///
    /// Never fails: input that is not PEP 440 becomes a legacy version.
    /// Examples:
    /// - "1.0" → release [1, 0]
    /// - "1.0a1" → prerelease alpha 1
    /// - "1.0-r2" → post release 2
    /// - "2.1+slapospatched001" → local label
    /// - "2004d" → legacy
    pub fn parse(s: &str) -> Self {
        let text = s.trim().to_string();
        let kind = match parse_release(&text) {
            Some(release) => Kind::Release(release),
            None => Kind::Legacy(legacy_key(&text)),
        };
        Version { text, kind }
    }

    /// The string this version was parsed from
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// PEP 440 components, `None` for legacy versions
    pub fn release(&self) -> Option<&Release> {
        match &self.kind {
            Kind::Release(r) => Some(r),
            Kind::Legacy(_) => None,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self.kind, Kind::Legacy(_))
    }

    /// True for alpha, beta, release candidate and dev releases
    pub fn is_prerelease(&self) -> bool {
        match &self.kind {
            Kind::Release(r) => r.pre.is_some() || r.dev.is_some(),
            Kind::Legacy(_) => false,
        }
    }

    pub fn is_postrelease(&self) -> bool {
        matches!(&self.kind, Kind::Release(r) if r.post.is_some())
    }

    /// True when a local label (`+...`) is present
    pub fn has_local(&self) -> bool {
        matches!(&self.kind, Kind::Release(r) if !r.local.is_empty())
    }

    /// The version without its local label
    pub fn public(&self) -> Version {
        match &self.kind {
            Kind::Release(r) => Version::from_release(r.public()),
            Kind::Legacy(_) => self.clone(),
        }
    }

    /// Epoch and release only (`1.0rc1.post2` → `1.0`)
    pub fn base(&self) -> Version {
        match &self.kind {
            Kind::Release(r) => Version::from_release(r.base()),
            Kind::Legacy(_) => self.clone(),
        }
    }

    fn from_release(release: Release) -> Version {
        let text = normalized(&release);
        Version {
            text,
            kind: Kind::Release(release),
        }
    }

    /// Canonical PEP 440 spelling, or the original text for legacy versions
    pub fn normalized(&self) -> String {
        match &self.kind {
            Kind::Release(r) => normalized(r),
            Kind::Legacy(_) => self.text.clone(),
        }
    }
}

/// Whether a version string names a final (non-prerelease) release
pub fn is_final(version: &str) -> bool {
    !Version::parse(version).is_prerelease()
}

fn parse_number(s: Option<regex::Match<'_>>) -> Option<Option<u64>> {
    match s {
        Some(m) => m.as_str().parse::<u64>().ok().map(Some),
        None => Some(None),
    }
}

fn parse_release(text: &str) -> Option<Release> {
    let caps = VERSION_RE.captures(text)?;

    let epoch = parse_number(caps.name("epoch"))?.unwrap_or(0);
    let release = caps
        .name("release")?
        .as_str()
        .split('.')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    let pre = match caps.name("pre_l") {
        Some(label) => {
            let n = parse_number(caps.name("pre_n"))?.unwrap_or(0);
            Some((PreRelease::from_label(label.as_str()), n))
        }
        None => None,
    };

    let post = if caps.name("post").is_some() {
        let n1 = parse_number(caps.name("post_n1"))?;
        let n2 = parse_number(caps.name("post_n2"))?;
        Some(n1.or(n2).unwrap_or(0))
    } else {
        None
    };

    let dev = if caps.name("dev").is_some() {
        Some(parse_number(caps.name("dev_n"))?.unwrap_or(0))
    } else {
        None
    };

    let local = match caps.name("local") {
        Some(m) => m
            .as_str()
            .split(['-', '_', '.'])
            .map(|part| match part.parse::<u64>() {
                Ok(n) if part.chars().all(|c| c.is_ascii_digit()) => LocalSegment::Num(n),
                _ => LocalSegment::Alpha(part.to_ascii_lowercase()),
            })
            .collect(),
        None => Vec::new(),
    };

    Some(Release {
        epoch,
        release,
        pre,
        post,
        dev,
        local,
    })
}

fn normalized(r: &Release) -> String {
    let mut out = String::new();
    if r.epoch != 0 {
        out.push_str(&format!("{}!", r.epoch));
    }
    let parts: Vec<String> = r.release.iter().map(|n| n.to_string()).collect();
    out.push_str(&parts.join("."));
    if let Some((phase, n)) = r.pre {
        out.push_str(&format!("{}{}", phase.as_str(), n));
    }
    if let Some(n) = r.post {
        out.push_str(&format!(".post{}", n));
    }
    if let Some(n) = r.dev {
        out.push_str(&format!(".dev{}", n));
    }
    if !r.local.is_empty() {
        let local: Vec<String> = r.local.iter().map(|s| s.to_string()).collect();
        out.push('+');
        out.push_str(&local.join("."));
    }
    out
}

/// Sort key for strings that are not PEP 440, in the old setuptools manner
fn legacy_key(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens: Vec<String> = Vec::new();
    let mut chars = lower.chars().peekable();
    while let Some(&c) = chars.peek() {
        let mut token = String::new();
        if c.is_ascii_digit() {
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                token.push(d);
                chars.next();
            }
        } else if c.is_ascii_lowercase() {
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_lowercase()) {
                token.push(d);
                chars.next();
            }
        } else if c == '.' || c == '-' {
            token.push(c);
            chars.next();
        } else {
            while let Some(&d) = chars
                .peek()
                .filter(|d| !d.is_ascii_alphanumeric() && **d != '.' && **d != '-')
            {
                token.push(d);
                chars.next();
            }
        }
        tokens.push(token);
    }

    let mut parts: Vec<String> = Vec::new();
    let mapped = tokens.into_iter().filter_map(|token| {
        let token = match token.as_str() {
            "pre" | "preview" | "rc" => "c".to_string(),
            "-" => "final-".to_string(),
            "dev" => "@".to_string(),
            _ => token,
        };
        if token.is_empty() || token == "." {
            None
        } else if token.starts_with(|c: char| c.is_ascii_digit()) {
            Some(format!("{:0>8}", token))
        } else {
            Some(format!("*{}", token))
        }
    });

    for part in mapped.chain(std::iter::once("*final".to_string())) {
        if part.starts_with('*') {
            if part.as_str() < "*final" {
                while parts.last().is_some_and(|p| p == "*final-") {
                    parts.pop();
                }
            }
            while parts.last().is_some_and(|p| p == "00000000") {
                parts.pop();
            }
        }
        parts.push(part);
    }
    parts
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.kind {
            Kind::Release(r) => {
                1u8.hash(state);
                r.key().hash(state);
            }
            Kind::Legacy(key) => {
                0u8.hash(state);
                key.hash(state);
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.kind, &other.kind) {
            (Kind::Release(a), Kind::Release(b)) => a.key().cmp(&b.key()),
            (Kind::Legacy(a), Kind::Legacy(b)) => a.cmp(b),
            (Kind::Legacy(_), Kind::Release(_)) => Ordering::Less,
            (Kind::Release(_), Kind::Legacy(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}
