// src/build/setup.rs

//! External Python tooling: setup scripts and bytecode compilation
//!
//! Both concerns sit behind traits so resolution can be exercised without
//! an interpreter on the machine.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Environment variable holding extra `sys.path` entries for setup runs
pub const EXTRA_PATH_ENV: &str = "PYTHONEXTRAPATH";

/// Runs a project's setup script
pub trait SetupRunner {
    /// Build the source tree at `setup_dir` and leave the resulting eggs
    /// in `dest`
    fn install(&self, setup_dir: &Path, dest: &Path) -> Result<()>;

    /// Run `setup.py develop` for the script `setup`, leaving the
    /// `.egg-link` in `dest`
    fn develop(&self, setup: &Path, dest: &Path) -> Result<()>;
}

/// Rewrites bytecode and permissions of an installed tree
pub trait Recompiler {
    fn recompile(&self, tree: &Path) -> Result<()>;
}

/// [`SetupRunner`] driving setuptools through a Python interpreter
#[derive(Debug, Clone)]
pub struct PythonSetup {
    python: PathBuf,
    extra_path: Vec<PathBuf>,
}

impl PythonSetup {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        let extra_path = std::env::var_os(EXTRA_PATH_ENV)
            .map(|paths| std::env::split_paths(&paths).collect())
            .unwrap_or_default();
        Self {
            python: python.into(),
            extra_path,
        }
    }

    /// Prepend a `sys.path` entry, e.g. the setuptools location
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_path.insert(0, path.into());
        self
    }

    fn sys_path_prelude(&self) -> String {
        let entries: Vec<String> = self
            .extra_path
            .iter()
            .map(|p| python_literal(&p.to_string_lossy()))
            .collect();
        format!("import sys; sys.path[0:0] = [{}]", entries.join(", "))
    }

    fn run(&self, args: &[String], cwd: &Path) -> Result<()> {
        let python = resolve_program(&self.python)?;
        let command_line = format!("{} {}", python.display(), args.join(" "));
        debug!("Running {}", command_line);

        let status = Command::new(&python)
            .args(args)
            .current_dir(cwd)
            .status()
            .map_err(|e| Error::CommandFailed {
                command: command_line.clone(),
                status: e.to_string(),
            })?;
        if !status.success() {
            return Err(Error::CommandFailed {
                command: command_line,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

impl SetupRunner for PythonSetup {
    fn install(&self, setup_dir: &Path, dest: &Path) -> Result<()> {
        let script = format!(
            "{}; from setuptools.command.easy_install import main; main()",
            self.sys_path_prelude()
        );
        let mut args = vec!["-c".to_string(), script, "-mZUNxd".to_string()];
        args.push(dest.to_string_lossy().into_owned());
        if !tracing::enabled!(tracing::Level::DEBUG) {
            args.push("-q".to_string());
        }
        args.push(setup_dir.to_string_lossy().into_owned());
        self.run(&args, setup_dir)
    }

    fn develop(&self, setup: &Path, dest: &Path) -> Result<()> {
        let dir = setup.parent().unwrap_or(Path::new("."));
        let setup_str = python_literal(&setup.to_string_lossy());
        let script = format!(
            "{}; import os; os.chdir({dir}); sys.argv[0] = {setup}; __file__ = {setup}; \
             exec(compile(open({setup}).read(), {setup}, 'exec'))",
            self.sys_path_prelude(),
            dir = python_literal(&dir.to_string_lossy()),
            setup = setup_str,
        );
        let mut args = vec!["-c".to_string(), script];
        if !tracing::enabled!(tracing::Level::DEBUG) {
            args.push("-q".to_string());
        }
        args.extend(["develop", "-mN", "-d"].map(str::to_string));
        args.push(dest.to_string_lossy().into_owned());
        self.run(&args, dir)
    }
}

/// [`Recompiler`] using `python -m py_compile`
#[derive(Debug, Clone)]
pub struct PyCompile {
    python: PathBuf,
}

impl PyCompile {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self { python: python.into() }
    }
}

impl Recompiler for PyCompile {
    /// Give group and others the owner's read and execute bits, then
    /// regenerate stale `.pyc`/`.pyo` siblings
    fn recompile(&self, tree: &Path) -> Result<()> {
        let mut stale = Vec::new();
        for entry in WalkDir::new(tree).follow_links(false) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if entry.path_is_symlink() {
                continue;
            }
            share_permissions(entry.path())?;

            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "py") {
                let mut had_compiled = false;
                for suffix in ["c", "o"] {
                    let compiled = PathBuf::from(format!("{}{}", path.display(), suffix));
                    if compiled.exists() {
                        fs::remove_file(&compiled)?;
                        had_compiled = true;
                    }
                }
                if had_compiled {
                    stale.push(path.to_path_buf());
                }
            }
        }
        if stale.is_empty() {
            return Ok(());
        }

        let python = resolve_program(&self.python)?;
        for source in stale {
            let status = Command::new(&python).args(["-m", "py_compile"]).arg(&source).status()?;
            if !status.success() {
                warn!("Couldn't compile {}", source.display());
                continue;
            }
            let status = Command::new(&python)
                .args(["-O", "-m", "py_compile"])
                .arg(&source)
                .status()?;
            if !status.success() {
                return Err(Error::CommandFailed {
                    command: format!("{} -O -m py_compile {}", python.display(), source.display()),
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Copy the owner's read and execute bits to group and others
#[cfg(unix)]
pub fn share_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::symlink_metadata(path)?.permissions().mode();
    let owner = (mode >> 6) & 0o5;
    let shared = (mode & !0o77) | (owner << 3) | owner;
    if shared != mode {
        fs::set_permissions(path, fs::Permissions::from_mode(shared))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn share_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        return Ok(program.to_path_buf());
    }
    which::which(program).map_err(|e| Error::CommandFailed {
        command: program.display().to_string(),
        status: e.to_string(),
    })
}

fn python_literal(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}
