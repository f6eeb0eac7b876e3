//! Add-on file strategy: files of add-ons installed under `node_modules`

use anyhow::{Result, anyhow};
use graft_core::{Import, RawGraph, file_name_for};
use tracing::debug;

use crate::context::{Frontier, ResolveContext};
use crate::host;

#[derive(Debug, Clone, Copy, Default)]
pub struct AddonResolver;

impl AddonResolver {
    /// Locate the add-on from the importer's source directory (falling back to
    /// the build root) and sync either its `main` entry or an internal file.
    /// The add-on's manifest is kept in the store so the imports of its files
    /// can be classified.
    pub async fn resolve(&self, import: &Import, cx: &mut ResolveContext<'_>) -> Result<Frontier> {
        let package = import.package();
        let base = cx
            .descriptors
            .get(import.importer_package())
            .map(|d| d.src_dir.clone())
            .unwrap_or_else(|| cx.root.to_path_buf());
        let root = host::find_package_root(&base, package)
            .or_else(|| host::find_package_root(cx.root, package))
            .ok_or_else(|| anyhow!("add-on `{}` is not installed under {}", package, base.display()))?;
        debug!("Add-on {} found at {}", package, root.display());

        // Re-read on every resolve: add-ons are not part of the hashed graphs.
        match host::graph_at(&root).await {
            Some(graph_path) => {
                let graph = host::read_graph(&graph_path).await?;
                cx.store.update(package, graph);
                let relative = format!("{}/{}", package, graft_core::GRAPH_FILE);
                cx.sync(package, &graph_path, &relative).await?;
            }
            None if cx.store.contains(package) => cx.store.update(package, RawGraph::new()),
            None => {}
        }
        let manifest = host::read_manifest(&root).await?;

        let (source, relative) = if import.name() == package {
            (root.join(host::main_entry(&manifest)), format!("{package}.js"))
        } else {
            let inner = import
                .name()
                .strip_prefix(package)
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| {
                    anyhow!("`{}` does not name a file of add-on `{}`", import.name(), package)
                })?;
            (root.join(file_name_for(inner)), file_name_for(import.name()))
        };
        cx.store.record_addon(package, manifest);
        cx.sync(package, &source, &relative).await?;

        Ok(cx.frontier_of(import.name()))
    }
}
