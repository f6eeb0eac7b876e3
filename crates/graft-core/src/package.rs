//! Per-package graph node

use std::collections::{BTreeMap, HashSet};

use crate::model::{EXPORTS_IMPORT, RawGraph, module_name};

/// Flattened import map: module name -> ordered import targets.
pub type ImportMap = BTreeMap<String, Vec<String>>;

/// The graph of one package plus the caches derived from it.
///
/// `imports` and `deduped` are never touched on their own: every change to the
/// graph goes through [`PackageGraph::update`] or [`PackageGraph::rebuild`],
/// which recompute both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageGraph {
    package: String,
    /// The package's own graph as last supplied.
    own: RawGraph,
    /// `own` plus every graph merged into this package.
    graph: RawGraph,
    imports: ImportMap,
    deduped: Vec<String>,
}

impl PackageGraph {
    pub fn new(package: impl Into<String>) -> Self {
        PackageGraph {
            package: package.into(),
            ..Default::default()
        }
    }

    pub fn with_graph(package: impl Into<String>, graph: RawGraph) -> Self {
        let mut node = Self::new(package);
        node.update(graph);
        node
    }

    /// Replace the package's graph wholesale. Merged graphs are dropped until
    /// the next [`rebuild`](Self::rebuild).
    pub fn update(&mut self, graph: RawGraph) {
        self.own = graph;
        self.rebuild(std::iter::empty());
    }

    /// Recompute the effective graph from `own` and the graphs merged into
    /// this package. Files already present are kept.
    pub fn rebuild<'a>(&mut self, merged: impl IntoIterator<Item = &'a RawGraph>) {
        let mut graph = self.own.clone();
        for other in merged {
            for (file, entry) in other {
                graph.entry(file.clone()).or_insert_with(|| entry.clone());
            }
        }
        self.graph = graph;
        self.imports = flatten(&self.graph);
        self.deduped = dedupe(&self.imports);
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn own_graph(&self) -> &RawGraph {
        &self.own
    }

    pub fn graph(&self) -> &RawGraph {
        &self.graph
    }

    pub fn imports(&self) -> &ImportMap {
        &self.imports
    }

    /// Imports of one module, if the package has it.
    pub fn imports_for(&self, module: &str) -> Option<&[String]> {
        self.imports.get(module_name(module)).map(Vec::as_slice)
    }

    pub fn deduped_imports(&self) -> &[String] {
        &self.deduped
    }

    pub fn contains_module(&self, module: &str) -> bool {
        self.imports.contains_key(module_name(module))
    }
}

/// Module name -> import targets, with module suffixes stripped from the keys
/// and the `exports` pseudo-import dropped.
pub fn flatten(graph: &RawGraph) -> ImportMap {
    graph
        .iter()
        .map(|(file, entry)| {
            let imports = entry
                .imports
                .iter()
                .filter(|spec| spec.source != EXPORTS_IMPORT)
                .map(|spec| spec.source.clone())
                .collect();
            (module_name(file).to_string(), imports)
        })
        .collect()
}

/// Every import target across all modules, each once, in first-seen order.
pub fn dedupe(imports: &ImportMap) -> Vec<String> {
    let mut seen = HashSet::new();
    imports
        .values()
        .flatten()
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}
