//! Where package graphs and file listings come from

use std::io;
use std::path::Path;

use async_trait::async_trait;
use globset::GlobSet;
use graft_core::{Descriptor, RawGraph, Result};
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Supplies the decoded graph of a package.
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn read_graph(&self, descriptor: &Descriptor) -> Result<RawGraph>;
}

/// Reads `<src_dir>/dep-graph.json`. A package without one has an empty graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsGraphSource;

#[async_trait]
impl GraphSource for FsGraphSource {
    async fn read_graph(&self, descriptor: &Descriptor) -> Result<RawGraph> {
        let path = descriptor.graph_path();
        let json_str = match tokio::fs::read_to_string(&path).await {
            Ok(json_str) => json_str,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No graph manifest for {}", descriptor.package_name);
                return Ok(RawGraph::new());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json_str)?)
    }
}

/// Files under `src_dir` as sorted, `/`-separated relative paths. Ignore
/// files are honored, `node_modules` is never entered and paths matching
/// `exclude` are dropped.
pub fn list_relative_paths(src_dir: &Path, exclude: &GlobSet) -> Result<Vec<String>> {
    if !src_dir.is_dir() {
        warn!("Source directory {} does not exist", src_dir.display());
        return Ok(Vec::new());
    }

    let walker = WalkBuilder::new(src_dir)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .build();

    let mut paths = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(src_dir) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if exclude.is_match(&relative) {
            continue;
        }
        paths.push(relative);
    }

    paths.sort();
    Ok(paths)
}
