//! Host module resolution: `node_modules` lookup and manifest/graph reading

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use graft_core::{GRAPH_FILE, PackageManifest, RawGraph};

/// Entry file used when a manifest declares no `main`.
pub const DEFAULT_MAIN: &str = "index.js";

/// Walk upward from `base` looking for `node_modules/<name>/package.json`.
pub fn find_package_root(base: &Path, name: &str) -> Option<PathBuf> {
    base.ancestors()
        .map(|dir| dir.join("node_modules").join(name))
        .find(|candidate| candidate.join("package.json").is_file())
}

pub async fn read_manifest(root: &Path) -> Result<PackageManifest> {
    let path = root.join("package.json");
    let json_str = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json_str).with_context(|| format!("parsing {}", path.display()))
}

/// The manifest's `main` entry without a leading `./`.
pub fn main_entry(manifest: &PackageManifest) -> String {
    let main = manifest.main.as_deref().unwrap_or(DEFAULT_MAIN);
    let main = main.strip_prefix("./").unwrap_or(main);
    if Path::new(main).extension().is_some() {
        main.to_string()
    } else {
        format!("{main}.js")
    }
}

pub async fn read_graph(path: &Path) -> Result<RawGraph> {
    let json_str = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json_str).with_context(|| format!("parsing {}", path.display()))
}

/// Graph manifest shipped at a package root, if any.
pub async fn graph_at(root: &Path) -> Option<PathBuf> {
    let path = root.join(GRAPH_FILE);
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}
