//! Deferred strategies: bare dependencies and custom schemes
//!
//! Nothing is materialized while the traversal runs. Requests pile up in a
//! [`DeferredCache`] and are handed over in one pass once every entry has been
//! walked, so a bundler can emit a single artifact per external package.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use graft_core::DeferredCache;
use tracing::{debug, info};

use crate::context::ResolveContext;
use crate::host;
use crate::sync::Syncer;

/// Produces the output for one external package.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Write whatever `package` needs to satisfy `imports` into `output_dir`
    /// and return the output-relative paths written.
    async fn bundle(
        &self,
        package: &str,
        imports: &BTreeSet<String>,
        root: &Path,
        output_dir: &Path,
        syncer: &dyn Syncer,
    ) -> Result<Vec<String>>;
}

/// Strategy shared by bare dependencies and scheme-tagged imports.
#[derive(Clone)]
pub struct DeferredResolver {
    tag: String,
    bundler: Option<Arc<dyn Bundler>>,
}

impl fmt::Debug for DeferredResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResolver")
            .field("tag", &self.tag)
            .field("bundler", &self.bundler.is_some())
            .finish()
    }
}

impl DeferredResolver {
    pub fn new(tag: impl Into<String>) -> Self {
        DeferredResolver {
            tag: tag.into(),
            bundler: None,
        }
    }

    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn has_bundler(&self) -> bool {
        self.bundler.is_some()
    }

    /// Bundle every package requested under `key`. A package asked for the
    /// same imports as in the previous build gets that build's artifacts
    /// carried forward instead.
    pub async fn resolve_later(
        &self,
        key: &str,
        cx: &mut ResolveContext<'_>,
        cache: &DeferredCache,
    ) -> Result<()> {
        let bundler = self
            .bundler
            .as_ref()
            .ok_or_else(|| anyhow!("no bundler configured for `{}`", self.tag))?;

        for (package, imports) in cache.packages(key) {
            let reusable = cx.previous.and_then(|previous| {
                let same_request = previous.deferred.requested(key, package) == Some(imports);
                let files = previous.ledger.files_for(package).filter(|files| !files.is_empty());
                files.filter(|_| same_request).map(|files| (previous, files))
            });

            if let Some((previous, files)) = reusable {
                debug!("Reusing {} artifacts for {}", files.len(), package);
                for relative in files {
                    let prior = previous.output_dir.join(relative);
                    cx.sync(package, &prior, relative).await?;
                }
                continue;
            }

            info!("Bundling {} ({} imports)", package, imports.len());
            let written = bundler
                .bundle(package, imports, cx.root, cx.output_dir, cx.syncer)
                .await
                .with_context(|| format!("bundling `{package}`"))?;
            for relative in written {
                cx.store.mark_synced(package, &relative);
            }
        }
        Ok(())
    }
}

/// Bundler that ships an external package's declared `main` entry as
/// `<package>.js`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MainEntryBundler;

#[async_trait]
impl Bundler for MainEntryBundler {
    async fn bundle(
        &self,
        package: &str,
        _imports: &BTreeSet<String>,
        root: &Path,
        output_dir: &Path,
        syncer: &dyn Syncer,
    ) -> Result<Vec<String>> {
        let package_root = host::find_package_root(root, package)
            .ok_or_else(|| anyhow!("`{}` is not installed under {}", package, root.display()))?;
        let manifest = host::read_manifest(&package_root).await?;
        let source = package_root.join(host::main_entry(&manifest));
        let relative = format!("{package}.js");
        syncer.materialize(&source, &output_dir.join(&relative)).await?;
        Ok(vec![relative])
    }
}
