//! Build state persisted between linker runs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::hash::{FileHashCache, GraphHashes};
use crate::ledger::{DeferredCache, SyncedLedger};

/// Cache directory: .graft/
pub const CACHE_DIR: &str = ".graft";

/// Build state file
pub const STATE_FILE: &str = "state.json";

/// What a successful build leaves behind for the next one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub output_dir: PathBuf,
    pub ledger: SyncedLedger,
    pub deferred: DeferredCache,
    pub file_hashes: FileHashCache,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildState {
    pub version: String,
    pub cached_at: Option<String>,
    /// Number of successful builds recorded so far.
    #[serde(default)]
    pub generation: u64,
    pub hashes: GraphHashes,
    pub previous: Option<BuildSnapshot>,
}

impl BuildState {
    pub fn new(hashes: GraphHashes, previous: Option<BuildSnapshot>) -> Self {
        BuildState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            cached_at: Some(chrono::Utc::now().to_rfc3339()),
            generation: 0,
            hashes,
            previous,
        }
    }
}

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get build state file path
pub fn state_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(STATE_FILE)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if !cache.exists() {
        std::fs::create_dir_all(&cache)?;
    }
    Ok(())
}

pub fn save_state(state: &BuildState, root: &Path) -> anyhow::Result<()> {
    ensure_cache_dir(root)?;
    let path = state_path(root);
    let json_str = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json_str)?;

    tracing::debug!("Build state saved: {}", path.display());
    Ok(())
}

/// Load the saved build state. State written by another version is ignored.
pub fn load_state(root: &Path) -> anyhow::Result<Option<BuildState>> {
    let path = state_path(root);
    if !path.exists() {
        return Ok(None);
    }

    let json_str = std::fs::read_to_string(&path)?;
    let state: BuildState = serde_json::from_str(&json_str)?;
    if state.version != env!("CARGO_PKG_VERSION") {
        tracing::debug!(
            "Ignoring build state from v{} at {}",
            state.version,
            path.display()
        );
        return Ok(None);
    }

    tracing::debug!("Build state loaded from: {}", path.display());
    Ok(Some(state))
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
