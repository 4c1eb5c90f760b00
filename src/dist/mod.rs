// src/dist/mod.rs

//! Concrete distributions and how they are recognised from names
//!
//! A distribution is one installable artifact of a project at a version:
//! an egg (unpacked directory or zip), a source archive, a checkout
//! advertised through an `#egg=` fragment, or a develop install pointing
//! at an editable source tree.

pub mod metadata;

pub use metadata::MetadataSource;

use crate::error::Result;
use crate::requirement::{Requirement, project_key, safe_name};
use crate::version::Version;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use url::Url;

static EGG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<name>[^-]+)(?:-(?P<ver>[^-]+)(?:-py(?P<pyver>[^-]+)(?:-(?P<plat>.+))?)?)?$")
        .unwrap()
});
static PY_VERSION_PART: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^py\d\.\d+$").unwrap());
static EGG_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^egg=([-A-Za-z0-9_.+!]+)$").unwrap());

/// Source archive extensions, longest first
pub const SOURCE_EXTENSIONS: [&str; 6] = [".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tar", ".zip"];

/// Trust ranking of a distribution kind
///
/// Ordered lowest to highest the way candidates of the same version are
/// ranked. Develop installs still win outright during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Precedence {
    /// Editable install (`.egg-link` / `.egg-info`)
    Develop,
    /// VCS checkout advertised by an `#egg=` fragment
    Checkout,
    /// Source archive needing a build
    Source,
    /// Prebuilt egg
    Egg,
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precedence::Develop => "develop",
            Precedence::Checkout => "checkout",
            Precedence::Source => "source",
            Precedence::Egg => "egg",
        };
        f.write_str(name)
    }
}

/// Physical location of a distribution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Location {
    Local(PathBuf),
    Remote(String),
}

impl Location {
    /// Interpret a link or path; `file://` URLs become local paths
    pub fn parse(s: &str) -> Location {
        if let Some(path) = file_url_to_path(s) {
            return Location::Local(path);
        }
        if has_url_scheme(s) {
            Location::Remote(s.to_string())
        } else {
            Location::Local(PathBuf::from(s))
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Location::Local(p) => Some(p),
            Location::Remote(_) => None,
        }
    }

    /// URL form used for cache keys and logging
    pub fn to_url_string(&self) -> String {
        match self {
            Location::Local(p) => match Url::from_file_path(p) {
                Ok(url) => url.to_string(),
                Err(()) => p.display().to_string(),
            },
            Location::Remote(url) => url.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Remote(url) => f.write_str(url),
        }
    }
}

/// True for `scheme:` prefixed strings such as `http://` or `file:`
pub fn has_url_scheme(s: &str) -> bool {
    match s.split_once(':') {
        Some((scheme, _)) => {
            scheme.len() > 1
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
        }
        None => false,
    }
}

/// Local path of a `file:` URL, fragment and query dropped
pub fn file_url_to_path(s: &str) -> Option<PathBuf> {
    if !s.starts_with("file:") {
        return None;
    }
    let mut url = Url::parse(s).ok()?;
    url.set_fragment(None);
    url.set_query(None);
    url.to_file_path().ok()
}

/// Percent-decoded basename and fragment of a link
pub fn egg_info_for_url(url: &str) -> (String, Option<String>) {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((u, f)) => (u, Some(f.to_string())),
        None => (url, None),
    };
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    let path = match Url::parse(without_query) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => without_query.to_string(),
    };
    let mut segments = path.rsplit('/');
    let mut base = decode(segments.next().unwrap_or(""));
    if base == "download" {
        if let Some(parent) = segments.next() {
            base = decode(parent);
        }
    }
    (base, fragment)
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// File name a link's content should be stored under
///
/// The last path segment, unless the URL ends in a bare `download` style
/// segment with no extension and carries an `#egg=` fragment, in which
/// case the egg name is used.
pub fn filename_from_url(url: &str) -> String {
    let (base, fragment) = egg_info_for_url(url);
    let has_extension = base.contains('.');
    if !has_extension {
        if let Some(name) = fragment.as_deref().and_then(egg_fragment_name) {
            return name.to_string();
        }
    }
    base
}

fn egg_fragment_name(fragment: &str) -> Option<&str> {
    EGG_FRAGMENT
        .captures(fragment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// One installable artifact of a project
#[derive(Debug, Clone)]
pub struct Distribution {
    project_name: String,
    key: String,
    version: Version,
    pub precedence: Precedence,
    pub location: Location,
    pub py_version: Option<String>,
    pub platform: Option<String>,
    metadata: MetadataSource,
}

impl Distribution {
    pub fn new(
        project_name: &str,
        version: &str,
        precedence: Precedence,
        location: Location,
    ) -> Distribution {
        let metadata = match (&location, precedence) {
            (Location::Local(path), Precedence::Egg) => MetadataSource::for_egg(path),
            _ => MetadataSource::None,
        };
        Distribution {
            project_name: safe_name(project_name),
            key: project_key(project_name),
            version: Version::parse(&version.replace('_', "-")),
            precedence,
            location,
            py_version: None,
            platform: None,
            metadata,
        }
    }

    /// Candidates named by a local file or directory
    pub fn from_filename(path: &Path) -> Vec<Distribution> {
        let Some(basename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Vec::new();
        };
        distros_for_location(Location::Local(path.to_path_buf()), &basename)
    }

    /// Candidates named by a link, including `#egg=name-version` checkouts
    pub fn from_url(url: &str) -> Vec<Distribution> {
        let (base, fragment) = egg_info_for_url(url);
        let location = Location::parse(url);
        let mut dists = distros_for_location(location.clone(), &base);
        if let Some(name) = fragment.as_deref().and_then(egg_fragment_name) {
            dists.extend(interpret_distro_name(location, name, Precedence::Checkout));
        }
        dists
    }

    /// A develop install described by a `*.egg-info` directory or file
    pub fn develop(location: &Path, egg_info: &Path) -> Option<Distribution> {
        let file_name = egg_info.file_name()?.to_string_lossy().into_owned();
        let stem = file_name.strip_suffix(".egg-info")?;
        let caps = EGG_NAME_RE.captures(stem)?;
        let name = caps.name("name")?.as_str();
        let metadata = if egg_info.is_dir() {
            MetadataSource::Directory(egg_info.to_path_buf())
        } else {
            MetadataSource::None
        };
        let version = match caps.name("ver") {
            Some(v) => v.as_str().to_string(),
            None => metadata.version().or_else(|| pkg_info_file_version(egg_info))?,
        };
        let mut dist = Distribution::new(
            name,
            &version,
            Precedence::Develop,
            Location::Local(location.to_path_buf()),
        );
        dist.py_version = caps.name("pyver").map(|m| m.as_str().to_string());
        dist.metadata = metadata;
        Some(dist)
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn metadata(&self) -> &MetadataSource {
        &self.metadata
    }

    /// The same distribution at another location
    ///
    /// Metadata is re-derived from the new location.
    pub fn with_location(&self, location: Location) -> Distribution {
        let metadata = match (&location, self.precedence) {
            (Location::Local(path), Precedence::Egg) => MetadataSource::for_egg(path),
            (Location::Local(_), Precedence::Develop) => self.metadata.clone(),
            _ => MetadataSource::None,
        };
        Distribution {
            location,
            metadata,
            ..self.clone()
        }
    }

    /// Whether this distribution is of the requirement's project and
    /// its version satisfies every clause
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        self.key == requirement.key() && requirement.satisfies(&self.version)
    }

    /// `name==version`
    pub fn as_requirement(&self) -> Requirement {
        Requirement::exact(&self.project_name, self.version.as_str())
    }

    /// Requirements declared in `requires.txt` for the given extras
    pub fn requires(&self, extras: &[String]) -> Result<Vec<Requirement>> {
        match self.metadata.read(metadata::REQUIRES) {
            Some(text) => metadata::parse_requires(&text, extras, &self.project_name),
            None => Ok(Vec::new()),
        }
    }

    /// Extra index URLs bundled with the distribution
    pub fn dependency_links(&self) -> Vec<String> {
        self.metadata.lines(metadata::DEPENDENCY_LINKS)
    }

    pub fn has_namespace_packages(&self) -> bool {
        self.metadata.has(metadata::NAMESPACE_PACKAGES)
    }

    /// Python version tag compatibility (`None` on either side accepts)
    pub fn is_compatible(&self, python_version: Option<&str>) -> bool {
        match (&self.py_version, python_version) {
            (Some(ours), Some(wanted)) => ours == wanted,
            _ => true,
        }
    }

    /// Whether the location lies directly inside `dir`
    pub fn is_in_directory(&self, dir: &Path) -> bool {
        match &self.location {
            Location::Local(path) => path.parent().is_some_and(|parent| same_path(parent, dir)),
            Location::Remote(_) => false,
        }
    }

    fn sort_key(&self) -> (&Version, Precedence, &str, &Location, &str, &str) {
        (
            &self.version,
            self.precedence,
            &self.key,
            &self.location,
            self.py_version.as_deref().unwrap_or(""),
            self.platform.as_deref().unwrap_or(""),
        )
    }
}

fn pkg_info_file_version(path: &Path) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    text.lines().find_map(|line| {
        line.strip_prefix("Version:")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Distribution {}

impl PartialOrd for Distribution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distribution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.project_name, self.version)
    }
}

/// Candidates recognisable from a basename at `location`
pub fn distros_for_location(location: Location, basename: &str) -> Vec<Distribution> {
    let basename = match basename.strip_suffix(".egg.zip") {
        Some(stem) => format!("{stem}.egg"),
        None => basename.to_string(),
    };

    if let Some(stem) = basename.strip_suffix(".egg") {
        if !stem.contains('-') {
            return Vec::new();
        }
        return egg_from_stem(location, stem).into_iter().collect();
    }

    for ext in SOURCE_EXTENSIONS {
        if let Some(stem) = basename.strip_suffix(ext) {
            return interpret_distro_name(location, stem, Precedence::Source);
        }
    }
    Vec::new()
}

fn egg_from_stem(location: Location, stem: &str) -> Option<Distribution> {
    let caps = EGG_NAME_RE.captures(stem)?;
    let name = caps.name("name")?.as_str();
    let version = caps.name("ver")?.as_str();
    let mut dist = Distribution::new(name, version, Precedence::Egg, location);
    dist.py_version = caps.name("pyver").map(|m| m.as_str().to_string());
    dist.platform = caps.name("plat").map(|m| m.as_str().to_string());
    Some(dist)
}

/// Every `name-version` split of an ambiguous basename
///
/// `foo-bar-1.0` yields `foo` at `bar-1.0` and `foo-bar` at `1.0`; the
/// wrong guesses are filtered later by project key.
pub fn interpret_distro_name(location: Location, basename: &str, precedence: Precedence) -> Vec<Distribution> {
    let parts: Vec<&str> = basename.split('-').collect();
    if parts.iter().skip(2).any(|p| PY_VERSION_PART.is_match(p)) {
        return Vec::new();
    }
    (1..parts.len())
        .filter_map(|split| {
            let name = parts[..split].join("-");
            let version = parts[split..].join("-");
            (!version.is_empty()).then(|| Distribution::new(&name, &version, precedence, location.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_egg_filename() {
        let dists = Distribution::from_filename(Path::new("/eggs/zc.buildout-2.0.1-py3.11.egg"));
        assert_eq!(dists.len(), 1);
        let dist = &dists[0];
        assert_eq!(dist.key(), "zc.buildout");
        assert_eq!(dist.version().as_str(), "2.0.1");
        assert_eq!(dist.py_version.as_deref(), Some("3.11"));
        assert_eq!(dist.precedence, Precedence::Egg);
        assert_eq!(dist.to_string(), "zc.buildout 2.0.1");
    }

    #[test]
    fn test_egg_filename_underscores() {
        let dists = Distribution::from_filename(Path::new("foo_bar-1.0_r1-py3.11-linux_x86_64.egg"));
        let dist = &dists[0];
        assert_eq!(dist.key(), "foo-bar");
        assert_eq!(dist.version().normalized(), "1.0.post1");
        assert_eq!(dist.platform.as_deref(), Some("linux_x86_64"));
    }

    #[test]
    fn test_egg_without_version_is_ignored() {
        assert!(Distribution::from_filename(Path::new("foo.egg")).is_empty());
    }

    #[test]
    fn test_sdist_splits() {
        let dists = Distribution::from_url("https://files.example/packages/foo-bar-1.0.tar.gz#md5=00");
        let pairs: Vec<_> = dists.iter().map(|d| (d.key().to_string(), d.version().to_string())).collect();
        assert_eq!(
            pairs,
            vec![("foo".to_string(), "bar-1.0".to_string()), ("foo-bar".to_string(), "1.0".to_string())]
        );
        assert!(dists.iter().all(|d| d.precedence == Precedence::Source));
        assert!(matches!(dists[0].location, Location::Remote(_)));
    }

    #[test]
    fn test_sdist_with_python_tag_rejected() {
        assert!(Distribution::from_filename(Path::new("foo-1.0-py2.7.zip")).is_empty());
    }

    #[test]
    fn test_egg_fragment_checkout() {
        let dists = Distribution::from_url("https://example.com/trunk#egg=foo-dev");
        assert_eq!(dists.len(), 1);
        assert_eq!(dists[0].precedence, Precedence::Checkout);
        assert_eq!(dists[0].key(), "foo");
    }

    #[test]
    fn test_file_url_is_local() {
        let dists = Distribution::from_url("file:///tmp/links/foo-1.0.zip");
        assert_eq!(dists[0].location, Location::Local(PathBuf::from("/tmp/links/foo-1.0.zip")));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://h/p/foo%201.0.tar.gz#md5=1"), "foo 1.0.tar.gz");
        assert_eq!(filename_from_url("https://h/foo/1.0/download#egg=foo-1.0"), "1.0");
        assert_eq!(filename_from_url("https://h/trunk/download#egg=foo-1.0"), "foo-1.0");
    }

    #[test]
    fn test_ordering_version_then_precedence() {
        let egg = Distribution::new("foo", "1.0", Precedence::Egg, Location::Local("/a".into()));
        let sdist = Distribution::new("foo", "1.0", Precedence::Source, Location::Local("/a".into()));
        let newer = Distribution::new("foo", "1.1", Precedence::Source, Location::Local("/a".into()));
        let mut dists = vec![newer.clone(), sdist.clone(), egg.clone()];
        dists.sort();
        assert_eq!(dists, vec![sdist, egg, newer]);
    }

    #[test]
    fn test_satisfies_and_as_requirement() {
        let dist = Distribution::new("Foo", "1.2", Precedence::Egg, Location::Local("/x".into()));
        assert!(dist.satisfies(&Requirement::parse("foo>=1").unwrap()));
        assert!(!dist.satisfies(&Requirement::parse("foo>=2").unwrap()));
        assert!(!dist.satisfies(&Requirement::parse("bar").unwrap()));
        assert_eq!(dist.as_requirement().to_string(), "Foo==1.2");
    }

    #[test]
    fn test_develop_from_egg_info() {
        let dir = tempfile::tempdir().unwrap();
        let info = dir.path().join("foo.egg-info");
        std::fs::create_dir(&info).unwrap();
        std::fs::write(info.join("PKG-INFO"), "Name: foo\nVersion: 0.3.dev0\n").unwrap();
        std::fs::write(info.join("requires.txt"), "bar\n").unwrap();

        let dist = Distribution::develop(dir.path(), &info).unwrap();
        assert_eq!(dist.precedence, Precedence::Develop);
        assert_eq!(dist.version().as_str(), "0.3.dev0");
        assert_eq!(dist.requires(&[]).unwrap()[0].name, "bar");
    }

    #[test]
    fn test_has_url_scheme() {
        assert!(has_url_scheme("https://x"));
        assert!(has_url_scheme("file:/tmp"));
        assert!(!has_url_scheme("/tmp/x"));
        assert!(!has_url_scheme("C:\\x"));
    }
}
