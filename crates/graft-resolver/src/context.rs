//! State handed to resolver strategies

use std::path::Path;

use anyhow::Result;
use graft_core::{BuildSnapshot, Descriptor, Descriptors, DependencyStore, FileHashCache};

use crate::sync::{SyncRequest, Syncer, forward_sync};

/// Imports discovered by resolving one import, still to be walked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontier {
    /// Module the imports were found in.
    pub importer: String,
    pub imports: Vec<String>,
}

impl Frontier {
    pub fn new(importer: impl Into<String>, imports: Vec<String>) -> Self {
        Frontier {
            importer: importer.into(),
            imports,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

/// Everything a strategy may read or mutate while resolving. Built once per
/// build and borrowed mutably by one strategy call at a time.
pub struct ResolveContext<'a> {
    pub store: &'a mut DependencyStore,
    pub descriptors: &'a Descriptors,
    pub syncer: &'a dyn Syncer,
    pub output_dir: &'a Path,
    /// Base directory for `node_modules` lookups.
    pub root: &'a Path,
    /// The last successful build, if any.
    pub previous: Option<&'a BuildSnapshot>,
    /// Content hashes recorded during this build.
    pub hashes: &'a mut FileHashCache,
}

impl<'a> ResolveContext<'a> {
    /// Forward-sync `source` to `relative` under the output directory, recorded
    /// under `package`.
    pub async fn sync(&mut self, package: &str, source: &Path, relative: &str) -> Result<bool> {
        let request = SyncRequest::new(package, self.output_dir, source.to_path_buf(), relative);
        forward_sync(self.syncer, self.store, request).await
    }

    /// Sync `descriptor`'s graph manifest to `<package>/dep-graph.json` once.
    pub async fn sync_graph_manifest(&mut self, descriptor: &Descriptor) -> Result<()> {
        let relative = descriptor.graph_output_path();
        if self.store.is_synced(&descriptor.package_name, &relative) {
            return Ok(());
        }
        let source = descriptor.graph_path();
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Ok(());
        }
        self.sync(&descriptor.package_name, &source, &relative).await?;
        Ok(())
    }

    /// Imports of `module` as a frontier.
    pub fn frontier_of(&self, module: &str) -> Frontier {
        Frontier::new(module, self.store.file_imports(module).to_vec())
    }
}
