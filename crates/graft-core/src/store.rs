//! Dependency store: package graphs, merge aliases and the synced ledger

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{LinkError, Result};
use crate::ledger::SyncedLedger;
use crate::model::{PackageManifest, RawGraph, module_name, package_name_of};
use crate::package::{ImportMap, PackageGraph};

/// Answer to [`DependencyStore::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// A bare package name: the package's whole import map.
    Package(&'a ImportMap),
    /// A `package/file` path: that module's imports.
    File(&'a [String]),
    /// Unknown package or module; a leaf with nothing further to import.
    Empty,
}

impl<'a> Lookup<'a> {
    /// Imports of a file lookup; empty for anything else.
    pub fn imports(&self) -> &'a [String] {
        match self {
            Lookup::File(imports) => *imports,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Lookup::Empty)
    }
}

/// Build-session graph state shared by every component. Passed by reference;
/// the single sequential traversal is its only synchronization.
#[derive(Debug, Default)]
pub struct DependencyStore {
    packages: HashMap<String, PackageGraph>,
    /// Merged-away package -> package it was merged into.
    merged_into: BTreeMap<String, String>,
    /// Manifests of add-ons resolved from `node_modules`.
    addons: BTreeMap<String, PackageManifest>,
    synced: SyncedLedger,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `name`'s graph, then refold whichever merge target it touches.
    pub fn update(&mut self, name: &str, graph: RawGraph) {
        debug!("Updating graph for {} ({} files)", name, graph.len());
        self.packages
            .entry(name.to_string())
            .or_insert_with(|| PackageGraph::new(name))
            .update(graph);
        self.refold(name);
        if let Some(target) = self.merged_into.get(name).cloned() {
            self.refold(&target);
        }
    }

    /// Fold `sources` into `target`. Merging is terminal: a source already
    /// merged elsewhere is a [`LinkError::ConflictingMerge`]; repeating a merge
    /// is a no-op.
    pub fn merge_into(&mut self, target: &str, sources: &[&str]) -> Result<()> {
        for source in sources {
            if *source == target {
                continue;
            }
            if let Some(existing) = self.merged_into.get(*source) {
                if existing == target {
                    continue;
                }
                return Err(LinkError::ConflictingMerge {
                    package: source.to_string(),
                    target: target.to_string(),
                    existing: existing.clone(),
                });
            }
            debug!("Merging {} into {}", source, target);
            self.merged_into.insert(source.to_string(), target.to_string());
        }
        self.refold(target);
        Ok(())
    }

    /// Recompute `target`'s effective graph from its own graph and its sources.
    fn refold(&mut self, target: &str) {
        let merged: Vec<RawGraph> = self
            .merged_into
            .iter()
            .filter(|(_, into)| into.as_str() == target)
            .filter_map(|(source, _)| self.packages.get(source))
            .map(|node| node.own_graph().clone())
            .collect();
        self.packages
            .entry(target.to_string())
            .or_insert_with(|| PackageGraph::new(target))
            .rebuild(merged.iter());
    }

    /// Package `name` was merged into, if any.
    pub fn merge_target(&self, name: &str) -> Option<&str> {
        self.merged_into.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn package(&self, name: &str) -> Option<&PackageGraph> {
        self.packages.get(name)
    }

    /// A bare package name yields its import map; `package/file` yields that
    /// file's imports. Unknown names are never an error.
    pub fn lookup(&self, name_or_file: &str) -> Lookup<'_> {
        let package = package_name_of(name_or_file);
        let Some(node) = self.packages.get(package) else {
            return Lookup::Empty;
        };
        if package == name_or_file {
            return Lookup::Package(node.imports());
        }
        match node.imports_for(name_or_file) {
            Some(imports) => Lookup::File(imports),
            None => Lookup::Empty,
        }
    }

    /// Imports of one module, whether or not it shares its package's name.
    pub fn file_imports(&self, module: &str) -> &[String] {
        self.packages
            .get(package_name_of(module))
            .and_then(|node| node.imports_for(module_name(module)))
            .unwrap_or(&[])
    }

    /// Remember the manifest of a resolved add-on, replacing any earlier one.
    pub fn record_addon(&mut self, name: &str, manifest: PackageManifest) {
        self.addons.insert(name.to_string(), manifest);
    }

    pub fn addon_manifest(&self, name: &str) -> Option<&PackageManifest> {
        self.addons.get(name)
    }

    pub fn addons(&self) -> &BTreeMap<String, PackageManifest> {
        &self.addons
    }

    /// Record a materialized file. Idempotent; returns false on a repeat.
    pub fn mark_synced(&mut self, package: &str, relative: &str) -> bool {
        self.synced.mark(package, relative)
    }

    pub fn is_synced(&self, package: &str, relative: &str) -> bool {
        self.synced.contains(package, relative)
    }

    pub fn synced_files_for(&self, package: &str) -> impl Iterator<Item = &str> {
        self.synced
            .files_for(package)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn all_synced_files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.synced.iter()
    }

    pub fn ledger(&self) -> &SyncedLedger {
        &self.synced
    }

    /// Start a ledger for a fresh output directory, handing back the old one.
    pub fn rotate_ledger(&mut self) -> SyncedLedger {
        std::mem::take(&mut self.synced)
    }
}
