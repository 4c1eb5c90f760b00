// src/filesystem/mod.rs

//! Filesystem helpers for the destination store and scratch areas
//!
//! - Path sanitization for archive members and URL-derived file names
//! - Robust tree removal that copes with read-only build output
//! - Tree copy and remove-then-rename replacement of artifacts

pub mod path;
mod tree;

pub use tree::{copy_tree, replace, rmtree};
