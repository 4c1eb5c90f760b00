// src/lib.rs

//! Eggsmith
//!
//! Requirement resolver and acquisition engine for Python eggs, the
//! packaging core of a buildout-style deployment orchestrator.
//!
//! # Architecture
//!
//! - Requirements: PEP 440 versions, specifiers and `[versions]` pins
//! - Environment: distributions already on local search paths
//! - Index: package index pages and find-links, read once per run
//! - Cache: signed, content-addressed network cache in front of the index
//! - Installer: breadth-first resolution into a working set
//! - Build: unpack, patch and build source distributions

pub mod build;
pub mod cache;
pub mod config;
pub mod dist;
pub mod environment;
mod error;
pub mod filesystem;
pub mod hash;
pub mod index;
pub mod installer;
pub mod requirement;
pub mod version;

pub use build::{BuildExt, PatchDirectives, PatchSet};
pub use cache::{CacheTier, NetworkCache, NoCache};
pub use config::{InstallerConfig, NetworkCacheConfig};
pub use dist::{Distribution, Location, Precedence};
pub use environment::{Environment, WorkingSet};
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm};
pub use index::registry::IndexRegistry;
pub use installer::{Installation, Installer, PickedVersions, VersionConflict, build, install};
pub use requirement::{Requirement, VersionPins};
pub use version::Version;
