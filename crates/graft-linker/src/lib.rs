//! Graft Linker: incremental linking of a multi-package module graph
//!
//! A [`Linker`] owns the dependency store between builds. Each build refreshes
//! file listings, hashes every package graph, re-resolves only the packages
//! whose graph changed and carries the rest forward from the previous output.

pub mod config;
pub mod source;
pub mod linker;

#[cfg(test)]
pub mod tests;

pub use config::{CONFIG_FILE, DEFAULT_KINDS, LinkerConfig, PackageConfig};
pub use source::{FsGraphSource, GraphSource, list_relative_paths};
pub use linker::{BuildReport, LinkState, Linker};
