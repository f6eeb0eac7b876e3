//! Graft Core: package graph model, import classifier and dependency store

pub mod model;
pub mod error;
pub mod classify;
pub mod package;
pub mod ledger;
pub mod store;
pub mod hash;
pub mod cache;


#[cfg(test)]
pub mod test_utils;

pub use model::{
    Descriptor, Descriptors, FileEntry, GRAPH_FILE, Import, ImportKind, ImportSpec, PackageManifest,
    RawGraph, file_name_for, module_name, package_name_of,
};
pub use error::{LinkError, Result};
pub use classify::{ADDON_SCHEME, classify, classify_with_addons, split_scheme};
pub use package::{ImportMap, PackageGraph, dedupe, flatten};
pub use ledger::{DeferredCache, SyncedLedger};
pub use store::{DependencyStore, Lookup};
pub use hash::{FileHashCache, GraphHashRecord, GraphHashes, content_hash, diff_graph, hashes};
pub use cache::{
    BuildSnapshot, BuildState, CACHE_DIR, STATE_FILE, cache_dir, clear_cache, ensure_cache_dir,
    load_state, save_state, state_path,
};
