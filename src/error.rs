// src/error.rs
//! Error types for resolution, acquisition and builds

use crate::installer::conflict::VersionConflict;
use thiserror::Error;

/// Errors raised while resolving and installing distributions
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed requirement string
    #[error("Invalid requirement '{input}': {reason}")]
    InvalidRequirement { input: String, reason: String },

    /// A `[versions]` pin excludes every version the requirement allows
    #[error("The requirement ('{requirement}') is not allowed by your [versions] constraint ({constraint})")]
    IncompatibleConstraint {
        requirement: String,
        constraint: String,
        /// Recorded provenance lines mentioning the same project
        provenance: Vec<String>,
    },

    /// The index had nothing matching the requirement
    #[error("Couldn't find a distribution for '{0}'.")]
    MissingDistribution(String),

    /// Two requirements disagree on the acceptable version of a project
    #[error("{0}")]
    VersionConflict(Box<VersionConflict>),

    /// Policy or configuration violation
    #[error("{0}")]
    UserError(String),

    /// External command exited unsuccessfully
    #[error("Failed to run command: {command} ({status})")]
    CommandFailed { command: String, status: String },

    /// Network or download failure
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Downloaded content did not match its advertised checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Source distribution could not be prepared for building
    #[error("Build failed: {0}")]
    BuildFailed(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unparseable metadata or archive name
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Archive member or file name escaping its target directory
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Unusable path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VersionConflict> for Error {
    fn from(conflict: VersionConflict) -> Self {
        Error::VersionConflict(Box::new(conflict))
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
