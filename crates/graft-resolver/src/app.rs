//! Application-local strategy: files of packages with a descriptor

use anyhow::{Result, anyhow};
use graft_core::Import;
use tracing::debug;

use crate::context::{Frontier, ResolveContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct AppResolver;

impl AppResolver {
    /// Sync the target file and its package's graph manifest, then hand back
    /// the file's own imports.
    pub async fn resolve(&self, import: &Import, cx: &mut ResolveContext<'_>) -> Result<Frontier> {
        let descriptors = cx.descriptors;
        let (descriptor, relative) = descriptors
            .owner_of(import.package(), import.name())
            .ok_or_else(|| {
                anyhow!(
                    "`{}` is not a file of package `{}`",
                    import.name(),
                    import.package()
                )
            })?;

        debug!("Resolving {} from {}", import.name(), descriptor.src_dir.display());
        if let Some(owner) = descriptors.get(import.package()) {
            cx.sync_graph_manifest(owner).await?;
        }
        let source = descriptor.src_dir.join(&relative);
        cx.sync(import.package(), &source, &relative).await?;

        Ok(cx.frontier_of(import.name()))
    }
}
