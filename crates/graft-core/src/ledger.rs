//! Bookkeeping for materialized files and deferred imports

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::Import;

/// Package name -> output-relative paths materialized for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedLedger {
    packages: BTreeMap<String, BTreeSet<String>>,
}

impl SyncedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a materialized file. Returns false when it was already recorded.
    pub fn mark(&mut self, package: &str, relative: &str) -> bool {
        self.packages
            .entry(package.to_string())
            .or_default()
            .insert(relative.to_string())
    }

    pub fn contains(&self, package: &str, relative: &str) -> bool {
        self.packages
            .get(package)
            .is_some_and(|files| files.contains(relative))
    }

    pub fn files_for(&self, package: &str) -> Option<&BTreeSet<String>> {
        self.packages.get(package)
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.packages.get(package).is_some_and(|files| !files.is_empty())
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Every `(package, relative path)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.packages.iter().flat_map(|(package, files)| {
            files.iter().map(move |file| (package.as_str(), file.as_str()))
        })
    }

    /// Total number of recorded files.
    pub fn len(&self) -> usize {
        self.packages.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Imports handed to deferred strategies, grouped by resolver key and then by
/// package, so each strategy sees every distinct request across the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredCache {
    entries: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl DeferredCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `import` under `key`. Returns false for a repeat request.
    pub fn insert(&mut self, key: &str, import: &Import) -> bool {
        self.entries
            .entry(key.to_string())
            .or_default()
            .entry(import.package().to_string())
            .or_default()
            .insert(import.name().to_string())
    }

    /// Packages requested under `key`, with the import names asked of each.
    pub fn packages<'a>(&'a self, key: &str) -> impl Iterator<Item = (&'a str, &'a BTreeSet<String>)> {
        self.entries
            .get(key)
            .into_iter()
            .flat_map(|packages| packages.iter().map(|(name, imports)| (name.as_str(), imports)))
    }

    pub fn requested(&self, key: &str, package: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(key)?.get(package)
    }

    /// Number of distinct imports across all keys.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .map(BTreeSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
