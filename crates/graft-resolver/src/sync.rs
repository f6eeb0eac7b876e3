//! Forward-sync: idempotent materialization of files into an output tree

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use graft_core::DependencyStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a file reaches the output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Copy,
    Symlink,
}

/// File materialization primitive. Implementations must leave an existing
/// destination untouched.
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Materialize `source` at `dest`. Returns true when `dest` was created.
    async fn materialize(&self, source: &Path, dest: &Path) -> Result<bool>;
}

/// Syncer backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsSyncer {
    mode: SyncMode,
}

impl FsSyncer {
    pub fn new(mode: SyncMode) -> Self {
        FsSyncer { mode }
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }
}

#[async_trait]
impl Syncer for FsSyncer {
    async fn materialize(&self, source: &Path, dest: &Path) -> Result<bool> {
        if tokio::fs::symlink_metadata(dest).await.is_ok() {
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        match self.mode {
            SyncMode::Copy => {
                tokio::fs::copy(source, dest)
                    .await
                    .with_context(|| format!("copying {} to {}", source.display(), dest.display()))?;
            }
            SyncMode::Symlink => {
                let target = tokio::fs::canonicalize(source)
                    .await
                    .with_context(|| format!("resolving {}", source.display()))?;
                symlink(&target, dest)
                    .await
                    .with_context(|| format!("linking {} to {}", dest.display(), target.display()))?;
            }
        }
        Ok(true)
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, dest).await
}

#[cfg(windows)]
async fn symlink(target: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(target, dest).await
}

/// One forward-sync call.
#[derive(Debug, Clone)]
pub struct SyncRequest<'a> {
    /// Ledger owner; `None` materializes without bookkeeping.
    pub package: Option<&'a str>,
    pub dest_root: &'a Path,
    pub source: PathBuf,
    /// Path under `dest_root`, also the ledger entry.
    pub relative: &'a str,
    pub skip_ledger: bool,
}

impl<'a> SyncRequest<'a> {
    pub fn new(package: &'a str, dest_root: &'a Path, source: PathBuf, relative: &'a str) -> Self {
        SyncRequest {
            package: Some(package),
            dest_root,
            source,
            relative,
            skip_ledger: false,
        }
    }

    pub fn unrecorded(dest_root: &'a Path, source: PathBuf, relative: &'a str) -> Self {
        SyncRequest {
            package: None,
            dest_root,
            source,
            relative,
            skip_ledger: true,
        }
    }
}

/// Materialize a file and, unless told otherwise, record it in the ledger.
pub async fn forward_sync(
    syncer: &dyn Syncer,
    store: &mut DependencyStore,
    request: SyncRequest<'_>,
) -> Result<bool> {
    let dest = request.dest_root.join(request.relative);
    let created = syncer.materialize(&request.source, &dest).await?;
    if created {
        debug!("Synced {} -> {}", request.source.display(), dest.display());
    }
    if let (Some(package), false) = (request.package, request.skip_ledger) {
        store.mark_synced(package, request.relative);
    }
    Ok(created)
}
