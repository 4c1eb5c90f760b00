// tests/common/mod.rs

//! Shared fixtures for integration tests: eggs, source distributions and
//! stand-ins for the external Python tooling.

#![allow(dead_code)]

use eggsmith::build::{Recompiler, SetupRunner};
use eggsmith::{InstallerConfig, Installer};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A find-links directory, an empty local index and a destination
pub struct Sandbox {
    pub root: TempDir,
    pub links: PathBuf,
    pub index: PathBuf,
    pub dest: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let links = root.path().join("links");
        let index = root.path().join("index");
        let dest = root.path().join("eggs");
        for dir in [&links, &index, &dest] {
            fs::create_dir_all(dir).unwrap();
        }
        Self {
            root,
            links,
            index,
            dest,
        }
    }

    /// Online configuration reading only the sandbox
    pub fn config(&self) -> InstallerConfig {
        InstallerConfig::default()
            .with_dest(&self.dest)
            .with_links([self.links.to_string_lossy().into_owned()])
            .with_index(format!("file://{}", self.index.display()))
    }

    pub fn installer(&self) -> Installer {
        installer_with(self.config())
    }

    /// Names of the entries in the destination, sorted
    pub fn installed(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// An installer whose external tools are test doubles
pub fn installer_with(config: InstallerConfig) -> Installer {
    Installer::new(config)
        .unwrap()
        .with_setup_runner(Box::new(FakeSetup::default()))
        .with_recompiler(Box::new(NoopRecompiler))
}

/// Directory egg `<name>-<version>-py3.11.egg` with a requires.txt
pub fn make_egg(dir: &Path, name: &str, version: &str, requires: &[&str]) -> PathBuf {
    let egg = dir.join(format!("{name}-{version}-py3.11.egg"));
    let info = egg.join("EGG-INFO");
    fs::create_dir_all(&info).unwrap();
    fs::write(info.join("PKG-INFO"), format!("Name: {name}\nVersion: {version}\n")).unwrap();
    if !requires.is_empty() {
        fs::write(info.join("requires.txt"), requires.join("\n") + "\n").unwrap();
    }
    egg
}

/// Directory egg declaring namespace packages
pub fn make_namespace_egg(dir: &Path, name: &str, version: &str) -> PathBuf {
    let egg = make_egg(dir, name, version, &[]);
    fs::write(egg.join("EGG-INFO/namespace_packages.txt"), "ns\n").unwrap();
    egg
}

/// Zipped egg bytes, as served by an index
pub fn zip_egg_bytes(name: &str, version: &str, requires: &[&str]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts = zip::write::SimpleFileOptions::default();
    writer.start_file("EGG-INFO/PKG-INFO", opts).unwrap();
    writer
        .write_all(format!("Name: {name}\nVersion: {version}\n").as_bytes())
        .unwrap();
    if !requires.is_empty() {
        writer.start_file("EGG-INFO/requires.txt", opts).unwrap();
        writer.write_all(requires.join("\n").as_bytes()).unwrap();
    }
    writer.start_file(format!("{name}/__init__.py"), opts).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Source distribution `<name>-<version>.tar.gz` whose setup.py the
/// [`FakeSetup`] understands
pub fn make_sdist(dir: &Path, name: &str, version: &str) -> PathBuf {
    let path = dir.join(format!("{name}-{version}.tar.gz"));
    let encoder = GzEncoder::new(fs::File::create(&path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let setup = format!("name={name}\nversion={version}\n");
    let mut header = tar::Header::new_gnu();
    header.set_size(setup.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{name}-{version}/setup.py"), setup.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();
    path
}

/// What [`FakeSetup`] saw on each run
#[derive(Debug, Clone, Default)]
pub struct SetupCall {
    pub setup_dir: PathBuf,
    pub setup_cfg: Option<String>,
    pub patched: bool,
}

/// Turns a `name=`/`version=` setup.py into a directory egg, honouring
/// `tag_build` from setup.cfg
#[derive(Debug, Clone, Default)]
pub struct FakeSetup {
    pub calls: Arc<Mutex<Vec<SetupCall>>>,
    pub fail: bool,
}

impl FakeSetup {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl SetupRunner for FakeSetup {
    fn install(&self, setup_dir: &Path, dest: &Path) -> eggsmith::Result<()> {
        let setup_cfg = fs::read_to_string(setup_dir.join("setup.cfg")).ok();
        self.calls.lock().unwrap().push(SetupCall {
            setup_dir: setup_dir.to_path_buf(),
            setup_cfg: setup_cfg.clone(),
            patched: setup_dir.join("PATCHED").exists(),
        });
        if self.fail {
            return Err(eggsmith::Error::CommandFailed {
                command: "setup.py".to_string(),
                status: "exit status: 1".to_string(),
            });
        }

        let setup = fs::read_to_string(setup_dir.join("setup.py")).unwrap();
        let field = |key: &str| {
            setup
                .lines()
                .find_map(|l| l.strip_prefix(&format!("{key}=")).map(str::to_string))
                .unwrap()
        };
        let tag = setup_cfg
            .as_deref()
            .and_then(|cfg| cfg.lines().find_map(|l| l.strip_prefix("tag_build = ")))
            .unwrap_or("")
            .to_string();
        make_egg(dest, &field("name"), &format!("{}{}", field("version"), tag), &[]);
        Ok(())
    }

    fn develop(&self, setup: &Path, dest: &Path) -> eggsmith::Result<()> {
        let dir = setup.parent().unwrap();
        fs::write(dest.join("fake.egg-link"), format!("{}\n.", dir.display())).unwrap();
        Ok(())
    }
}

/// Leaves installed trees untouched
pub struct NoopRecompiler;

impl Recompiler for NoopRecompiler {
    fn recompile(&self, _tree: &Path) -> eggsmith::Result<()> {
        Ok(())
    }
}
