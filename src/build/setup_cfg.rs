// src/build/setup_cfg.rs

//! `setup.cfg` editing and `build_ext` options for source builds

use crate::error::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// RPATH entries kept verbatim instead of being made absolute
pub const RPATH_SPECIAL: [&str; 6] = ["$ORIGIN", "$LIB", "$PLATFORM", "${ORIGIN}", "${LIB}", "${PLATFORM}"];

/// Options written to the `[build_ext]` section of `setup.cfg`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildExt {
    options: BTreeMap<String, String>,
}

impl BuildExt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header directories, relative ones taken from `base`
    pub fn include_dirs<S: AsRef<str>>(self, base: &Path, dirs: &[S]) -> Self {
        let joined = join_paths(base, dirs, false);
        self.set("include-dirs", joined)
    }

    /// Library directories, relative ones taken from `base`
    pub fn library_dirs<S: AsRef<str>>(self, base: &Path, dirs: &[S]) -> Self {
        let joined = join_paths(base, dirs, false);
        self.set("library-dirs", joined)
    }

    /// Runtime library directories; loader tokens such as `$ORIGIN` stay
    /// relative
    pub fn rpath<S: AsRef<str>>(self, base: &Path, dirs: &[S]) -> Self {
        let joined = join_paths(base, dirs, true);
        self.set("rpath", joined)
    }

    pub fn swig(self, base: &Path, swig: &str) -> Self {
        let path = base.join(swig).to_string_lossy().into_owned();
        self.set("swig", path)
    }

    /// Boolean switch such as `debug`, `force` or `swig-cpp`; written only
    /// when on
    pub fn flag(self, key: &str, on: bool) -> Self {
        if on { self.set(key, "1") } else { self }
    }

    /// Option passed through unchanged (`define`, `libraries`, ...)
    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.options.insert(key.to_string(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

fn join_paths<S: AsRef<str>>(base: &Path, dirs: &[S], keep_special: bool) -> String {
    let joined: Vec<String> = dirs
        .iter()
        .map(|dir| dir.as_ref().trim())
        .filter(|dir| !dir.is_empty())
        .map(|dir| {
            if keep_special && RPATH_SPECIAL.iter().any(|token| dir.starts_with(token)) {
                dir.to_string()
            } else {
                base.join(dir).to_string_lossy().into_owned()
            }
        })
        .collect();
    joined.join(":")
}

/// Section name to option map, as merged into a config file
pub type Sections = BTreeMap<String, BTreeMap<String, String>>;

/// Merge `sections` into the INI file at `path`, creating it if missing
///
/// Existing options are replaced in place, new ones are appended to their
/// section and unknown sections are added at the end. Comments and
/// unrelated lines are kept.
pub fn edit_config(path: &Path, sections: &Sections) -> Result<()> {
    let original = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    fs::write(path, merge_ini(&original, sections))?;
    Ok(())
}

fn merge_ini(original: &str, sections: &Sections) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut pending: Sections = sections.clone();
    let mut current: Option<String> = None;

    let flush = |current: &Option<String>, pending: &mut Sections, out: &mut Vec<String>| {
        if let Some(name) = current
            && let Some(remaining) = pending.get_mut(name)
        {
            // keep a blank separator line after the section
            let trailing_blank = out.last().is_some_and(|l| l.trim().is_empty());
            let blank = if trailing_blank { out.pop() } else { None };
            for (key, value) in std::mem::take(remaining) {
                out.push(format!("{key} = {value}"));
            }
            out.extend(blank);
        }
    };

    for line in original.lines() {
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            flush(&current, &mut pending, &mut out);
            current = Some(name.trim().to_string());
            out.push(line.to_string());
            continue;
        }
        if let Some(section) = &current
            && let Some(options) = pending.get_mut(section)
            && let Some((key, _)) = trimmed.split_once(['=', ':'])
            && !trimmed.starts_with(['#', ';'])
        {
            let key = key.trim();
            if let Some(value) = options.remove(key) {
                out.push(format!("{key} = {value}"));
                continue;
            }
        }
        out.push(line.to_string());
    }
    flush(&current, &mut pending, &mut out);

    for (name, options) in pending {
        if options.is_empty() && original.contains(&format!("[{name}]")) {
            continue;
        }
        if out.last().is_some_and(|l| !l.trim().is_empty()) {
            out.push(String::new());
        }
        out.push(format!("[{name}]"));
        for (key, value) in options {
            out.push(format!("{key} = {value}"));
        }
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}
