//! Content hashing for change detection

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::RawGraph;

/// Package name -> graph hash, as recorded by the last successful build.
pub type GraphHashes = BTreeMap<String, String>;

/// Hex blake3 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// A package's graph together with the hash of its canonical encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHashRecord {
    pub name: String,
    pub hash: String,
    pub graph: RawGraph,
}

impl GraphHashRecord {
    pub fn new(name: impl Into<String>, graph: RawGraph) -> Result<Self> {
        let hash = content_hash(&serde_json::to_vec(&graph)?);
        Ok(GraphHashRecord {
            name: name.into(),
            hash,
            graph,
        })
    }
}

/// Collapse records into the name -> hash table kept between builds.
pub fn hashes(records: &[GraphHashRecord]) -> GraphHashes {
    records
        .iter()
        .map(|record| (record.name.clone(), record.hash.clone()))
        .collect()
}

/// Names of packages whose hash differs from `previous`, in record order.
/// Packages absent from `previous` count as changed.
pub fn diff_graph(records: &[GraphHashRecord], previous: &GraphHashes) -> Vec<String> {
    records
        .iter()
        .filter(|record| previous.get(&record.name) != Some(&record.hash))
        .map(|record| record.name.clone())
        .collect()
}

/// Content hashes of materialized source files, keyed by package then by
/// output-relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHashCache {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl FileHashCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, package: &str, relative: &str) -> Option<&str> {
        self.entries
            .get(package)?
            .get(relative)
            .map(String::as_str)
    }

    pub fn insert(&mut self, package: &str, relative: &str, hash: String) {
        self.entries
            .entry(package.to_string())
            .or_default()
            .insert(relative.to_string(), hash);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
