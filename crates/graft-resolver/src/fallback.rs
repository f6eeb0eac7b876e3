//! Default strategy: imports that stay inside the importer's own package

use anyhow::{Context, Result, anyhow};
use graft_core::{Import, content_hash};
use tracing::debug;

use crate::context::{Frontier, ResolveContext};

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResolver;

impl FallbackResolver {
    /// Resolve against the importer's own source tree. A file whose content
    /// hash matches the one recorded when a previous build synced it is
    /// linked from that build's output instead of the source tree.
    pub async fn resolve(&self, import: &Import, cx: &mut ResolveContext<'_>) -> Result<Frontier> {
        let descriptors = cx.descriptors;
        let package = import.importer_package();
        let (descriptor, relative) = descriptors.owner_of(package, import.name()).ok_or_else(|| {
            anyhow!("`{}` is not a file of package `{}`", import.name(), package)
        })?;

        let source = descriptor.src_dir.join(&relative);
        let bytes = tokio::fs::read(&source)
            .await
            .with_context(|| format!("reading {}", source.display()))?;
        let hash = content_hash(&bytes);

        let unchanged = cx.previous.filter(|previous| {
            previous.ledger.contains(package, &relative)
                && previous.file_hashes.get(package, &relative) == Some(hash.as_str())
        });
        cx.hashes.insert(package, &relative, hash);

        match unchanged {
            Some(previous) => {
                debug!("{} unchanged since last build", relative);
                let prior = previous.output_dir.join(&relative);
                cx.sync(package, &prior, &relative).await?;
            }
            None => {
                cx.sync(package, &source, &relative).await?;
            }
        }

        Ok(cx.frontier_of(import.name()))
    }
}
