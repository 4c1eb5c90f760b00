// src/build/mod.rs

//! Source builds and develop installs
//!
//! A build unpacks a source distribution into scratch space, finds its
//! `setup.py`, applies patches, merges `setup.cfg` and hands the tree to
//! the [`SetupRunner`]. The eggs it produces are moved into the
//! destination directory and recompiled. Scratch space is owned by
//! [`tempfile::TempDir`] guards, so it is removed on every exit path.

pub mod archive;
pub mod patches;
pub mod setup;
pub mod setup_cfg;

pub use archive::{ArchiveUnpacker, Unpacker, apply_patch, extract_archive};
pub use patches::{PatchDirectives, PatchSet, strip_patch_marker};
pub use setup::{PyCompile, PythonSetup, Recompiler, SetupRunner};
pub use setup_cfg::{BuildExt, Sections, edit_config};

use crate::dist::{Distribution, file_url_to_path, has_url_scheme};
use crate::environment::find_distributions;
use crate::error::{Error, Result};
use crate::filesystem::replace;
use crate::index::client::copy_local;
use crate::installer::Installer;
use crate::requirement::Requirement;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// External collaborators used to turn artifacts into installed eggs
pub struct Toolchain {
    pub unpacker: Box<dyn Unpacker>,
    pub setup: Box<dyn SetupRunner>,
    pub recompiler: Box<dyn Recompiler>,
}

impl Toolchain {
    /// Native unpacking plus setuptools and `py_compile` from `python`
    pub fn python(python: &Path) -> Self {
        Self {
            unpacker: Box::new(ArchiveUnpacker),
            setup: Box::new(PythonSetup::new(python)),
            recompiler: Box::new(PyCompile::new(python)),
        }
    }
}

impl Installer {
    /// Build `spec` from source unless a matching egg is already present
    ///
    /// Returns the locations of the eggs produced, or of the existing one.
    pub fn build(&mut self, spec: &str, build_ext: &BuildExt, patches: &PatchDirectives) -> Result<Vec<PathBuf>> {
        let requirement = self.constrain(&Requirement::parse(spec)?)?;

        let (existing, available) = self.satisfied(&requirement, true);
        if let Some(dist) = existing {
            return Ok(dist.location.as_path().map(Path::to_path_buf).into_iter().collect());
        }
        let Some(available) = available else {
            return Err(Error::UserError(format!(
                "Couldn't find a source distribution for '{requirement}'."
            )));
        };
        let Some(dest) = self.dest.clone() else {
            return Err(Error::UserError(format!(
                "We don't have a distribution for {requirement}\n\
                 and can't build one in offline (no-install) mode.\n"
            )));
        };

        debug!("Building '{}'", spec);
        let scratch = self.scratch()?;
        let fetched = self.fetch(&available, scratch.path())?;
        let dists = self.build_fetched(&fetched, &dest, build_ext, patches.get(requirement.key()))?;
        self.env.scan(&[&dest]);
        Ok(dists
            .iter()
            .filter_map(|d| d.location.as_path().map(Path::to_path_buf))
            .collect())
    }

    /// Unpack, patch, configure and build a fetched source distribution
    pub(crate) fn build_fetched(
        &self,
        dist: &Distribution,
        dest: &Path,
        build_ext: &BuildExt,
        patches: Option<&PatchSet>,
    ) -> Result<Vec<Distribution>> {
        let archive = dist
            .location
            .as_path()
            .ok_or_else(|| Error::BuildFailed(format!("{dist} was not fetched locally")))?;

        let build_tmp = tempfile::Builder::new().suffix("build").tempdir()?;
        self.toolchain.unpacker.unpack(archive, build_tmp.path())?;
        let base = find_setup_root(build_tmp.path(), archive)?;

        let mut sections = Sections::new();
        if !build_ext.is_empty() {
            sections.insert("build_ext".to_string(), build_ext.options().clone());
        }

        if let Some(patches) = patches {
            let patch_tmp = tempfile::Builder::new().suffix("patches").tempdir()?;
            for (i, (url, checksum)) in patches.entries()?.into_iter().enumerate() {
                let patch_file = patch_tmp.path().join(format!("patch.{i}"));
                self.fetch_patch(url, checksum.as_ref(), &patch_file)?;
                info!("Applying patch {} to {}", url, dist);
                apply_patch(&base, &patch_file, &patches.patch_binary, &patches.patch_options)?;
            }
            sections.insert(
                "egg_info".to_string(),
                BTreeMap::from([("tag_build".to_string(), patches.tag_build())]),
            );
        }

        if !sections.is_empty() {
            edit_config(&base.join("setup.cfg"), &sections)?;
        }

        let dists = self.run_setup(&base, dest, dist)?;
        for built in &dists {
            if let Some(path) = built.location.as_path() {
                self.toolchain.recompiler.recompile(path)?;
            }
        }
        Ok(dists)
    }

    /// Run the setup step into a scratch directory inside `dest` and move
    /// what it produced into place
    fn run_setup(&self, setup_dir: &Path, dest: &Path, dist: &Distribution) -> Result<Vec<Distribution>> {
        fs::create_dir_all(dest)?;
        let tmp = tempfile::Builder::new().prefix(".build-").tempdir_in(dest)?;

        if let Err(e) = self.toolchain.setup.install(setup_dir, tmp.path()) {
            error!("An error occurred when trying to install {}. Look above this message for any errors that were output by the setup step.", dist);
            return Err(e);
        }

        let produced = find_distributions(tmp.path());
        if produced.is_empty() {
            return Err(Error::UserError(format!("Couldn't install: {dist}")));
        }
        if produced.len() > 1 {
            warn!("Installing {} produced multiple distributions.", dist);
        }

        let mut installed = Vec::new();
        for built in produced {
            if built.key() != dist.key() {
                warn!("Installing {} produced a distribution for {}.", dist, built.project_name());
            } else if built.version() != dist.version() {
                warn!("Installing {} produced a distribution with version {}.", dist, built.version());
            }

            let Some(source) = built.location.as_path() else {
                continue;
            };
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = dest.join(name);
            replace(source, &target)?;
            installed.extend(find_distributions(&target).into_iter().filter(|d| d.key() == built.key()));
        }
        Ok(installed)
    }

    fn fetch_patch(&self, url: &str, checksum: Option<&crate::hash::Hash>, dest: &Path) -> Result<()> {
        if has_url_scheme(url) && !url.starts_with("file:") {
            return self.registry_client().download_file(url, dest, checksum);
        }
        let source = file_url_to_path(url).unwrap_or_else(|| PathBuf::from(url));
        copy_local(&source, dest, checksum)
    }

    /// Install an editable source tree and return the `.egg-link` placed
    /// in `dest`
    ///
    /// `setup` is either a `setup.py` or the directory holding one. A
    /// non-empty `build_ext` is written to its `setup.cfg` for the
    /// duration of the run only.
    pub fn develop(&self, setup: &Path, dest: &Path, build_ext: &BuildExt) -> Result<PathBuf> {
        let setup = if setup.is_dir() { setup.join("setup.py") } else { setup.to_path_buf() };
        let directory = setup.parent().unwrap_or(Path::new(".")).to_path_buf();
        info!("Develop: {}", directory.display());

        let _restore = if build_ext.is_empty() {
            None
        } else {
            let guard = SetupCfgGuard::stash(&directory.join("setup.cfg"))?;
            let sections = Sections::from([("build_ext".to_string(), build_ext.options().clone())]);
            edit_config(&guard.path, &sections)?;
            Some(guard)
        };

        fs::create_dir_all(dest)?;
        let tmp = tempfile::Builder::new().prefix(".develop-").tempdir_in(dest)?;
        self.toolchain.setup.develop(&setup, tmp.path())?;

        let mut links: Vec<PathBuf> = fs::read_dir(tmp.path())?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "egg-link"))
            .collect();
        if links.len() != 1 {
            return Err(Error::BuildFailed(format!(
                "Expected one .egg-link from developing {}, found {}",
                setup.display(),
                links.len()
            )));
        }
        let link = links.remove(0);
        let target = dest.join(link.file_name().unwrap_or_default());
        replace(&link, &target)?;
        Ok(target)
    }
}

/// Locate the directory holding `setup.py` in an unpacked source tree
fn find_setup_root(root: &Path, archive: &Path) -> Result<PathBuf> {
    if root.join("setup.py").is_file() {
        return Ok(root.to_path_buf());
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.join("setup.py").is_file())
        .collect();
    match candidates.len() {
        0 => Err(Error::UserError(format!(
            "Couldn't find a setup script in {}",
            archive.display()
        ))),
        1 => Ok(candidates.remove(0)),
        _ => Err(Error::UserError(format!(
            "Ambiguous source distribution {}",
            archive.display()
        ))),
    }
}

/// Moves a project's `setup.cfg` aside and puts it back on drop
struct SetupCfgGuard {
    path: PathBuf,
    stashed: Option<PathBuf>,
}

impl SetupCfgGuard {
    fn stash(path: &Path) -> Result<Self> {
        let stashed = if path.exists() {
            let aside = path.with_extension("cfg-develop-aside");
            fs::copy(path, &aside)?;
            Some(aside)
        } else {
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            stashed,
        })
    }
}

impl Drop for SetupCfgGuard {
    fn drop(&mut self) {
        let restored = match &self.stashed {
            Some(aside) => fs::rename(aside, &self.path),
            None => fs::remove_file(&self.path),
        };
        if let Err(e) = restored {
            warn!("Cannot restore {}: {}", self.path.display(), e);
        }
    }
}
