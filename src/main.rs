// src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eggsmith::cache::CacheSigner;
use eggsmith::cache::network::default_key_path;
use eggsmith::{BuildExt, InstallerConfig, Installer, PatchDirectives};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "eggsmith")]
#[command(author, version, about = "Resolve, fetch and build Python eggs with a signed network cache", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that resolves requirements
#[derive(clap::Args)]
struct InstallerArgs {
    /// TOML installer configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory eggs are installed into; omit to work offline
    #[arg(short, long)]
    dest: Option<PathBuf>,
    /// Extra find-links (repeatable)
    #[arg(short = 'f', long = "find-links")]
    links: Vec<String>,
    /// Package index URL
    #[arg(short, long)]
    index: Option<String>,
    /// Persistent download directory
    #[arg(long)]
    download_cache: Option<PathBuf>,
    /// Keep the versions already installed when they satisfy
    #[arg(long)]
    no_newest: bool,
    /// TOML file of per-project patch directives
    #[arg(long)]
    patches: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install requirements and their dependencies
    Install {
        #[command(flatten)]
        installer: InstallerArgs,
        /// Requirement specifiers, e.g. 'zc.buildout==2.13.3'
        #[arg(required = true)]
        specs: Vec<String>,
    },
    /// Build a source distribution into an egg
    Build {
        #[command(flatten)]
        installer: InstallerArgs,
        /// Requirement specifier of the project to build
        spec: String,
        /// Header directories for C extensions (repeatable)
        #[arg(long = "include-dir")]
        include_dirs: Vec<String>,
        /// Library directories for C extensions (repeatable)
        #[arg(long = "library-dir")]
        library_dirs: Vec<String>,
        /// Runtime library directories (repeatable)
        #[arg(long)]
        rpath: Vec<String>,
    },
    /// Install an editable source tree as a develop egg
    Develop {
        #[command(flatten)]
        installer: InstallerArgs,
        /// setup.py or the directory holding it
        setup: PathBuf,
    },
    /// Generate a key pair for signing network cache uploads
    Keygen {
        /// Key file to write (default: ./network-cache.key)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl InstallerArgs {
    fn load(&self) -> Result<(InstallerConfig, PatchDirectives)> {
        let mut config = match &self.config {
            Some(path) => InstallerConfig::from_file(path)?,
            None => InstallerConfig::default(),
        };
        if let Some(dest) = &self.dest {
            config.dest = Some(dest.clone());
        }
        config.links.extend(self.links.iter().cloned());
        if let Some(index) = &self.index {
            config.index = Some(index.clone());
        }
        if let Some(dir) = &self.download_cache {
            config.download_cache = Some(dir.clone());
        }
        if self.no_newest {
            config.newest = false;
        }

        let patches = match &self.patches {
            Some(path) => load_patches(path)?,
            None => PatchDirectives::default(),
        };
        Ok((config, patches))
    }
}

fn load_patches(path: &Path) -> Result<PatchDirectives> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid patch directives in {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Install { installer, specs } => {
            let (config, patches) = installer.load()?;
            let installation = Installer::new(config)?.install(&specs, None, &patches)?;
            for dist in installation.working_set.sorted() {
                println!("{} ({})", dist, dist.location);
            }
            if !installation.picked.is_empty() {
                println!();
                print!("{}", installation.picked.to_versions_section());
            }
        }
        Commands::Build {
            installer,
            spec,
            include_dirs,
            library_dirs,
            rpath,
        } => {
            let (config, patches) = installer.load()?;
            let base = std::env::current_dir()?;
            let build_ext = BuildExt::new()
                .include_dirs(&base, &include_dirs)
                .library_dirs(&base, &library_dirs)
                .rpath(&base, &rpath);
            for location in Installer::new(config)?.build(&spec, &build_ext, &patches)? {
                println!("{}", location.display());
            }
        }
        Commands::Develop { installer, setup } => {
            let (config, _) = installer.load()?;
            let dest = config
                .dest
                .clone()
                .context("develop needs a destination directory (--dest)")?;
            let link = Installer::new(config)?.develop(&setup, &dest, &BuildExt::new())?;
            println!("{}", link.display());
        }
        Commands::Keygen { output } => {
            let path = match output {
                Some(path) => path,
                None => default_key_path(&std::env::current_dir()?),
            };
            let signer = CacheSigner::generate();
            signer.save(&path)?;
            info!("Private key written to {}", path.display());
            println!("{}", signer.public_key_base64());
        }
    }

    Ok(())
}
