//! Linker configuration loaded from `graft.toml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use graft_core::{Descriptor, Descriptors, LinkError, PackageManifest};
use graft_resolver::{ResolverKey, SyncMode};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "graft.toml";

/// Import kinds recognized when a config lists none.
pub const DEFAULT_KINDS: &[&str] = &["app", "default", "addon", "bare", "npm"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkerConfig {
    /// Base for `node_modules` lookups and the build cache.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Directory build outputs are written under.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default)]
    pub entries: Vec<String>,

    /// Ordered list of recognized import kinds.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ResolverKey>,

    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Glob patterns removed from every package's file listing.
    #[serde(default)]
    pub exclude: Vec<String>,

    #[serde(default, rename = "package")]
    pub packages: Vec<PackageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub name: String,
    pub src_dir: PathBuf,
    /// Package this one is merged into.
    #[serde(default)]
    pub parent: Option<String>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

fn default_kinds() -> Vec<ResolverKey> {
    DEFAULT_KINDS.iter().map(|kind| ResolverKey::from(*kind)).collect()
}

impl Default for LinkerConfig {
    fn default() -> Self {
        LinkerConfig {
            root: default_root(),
            output: default_output(),
            entries: Vec::new(),
            kinds: default_kinds(),
            sync_mode: SyncMode::default(),
            exclude: Vec::new(),
            packages: Vec::new(),
        }
    }
}

impl LinkerConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing linker config")
    }

    /// Read a config file. Relative paths inside it are taken relative to
    /// the file's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        config.rebase(base);
        Ok(config)
    }

    /// Anchor every relative path at `base`.
    pub fn rebase(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.root);
        anchor(&mut self.output);
        for package in &mut self.packages {
            anchor(&mut package.src_dir);
        }
    }

    pub fn validate(&self) -> graft_core::Result<()> {
        if self.entries.is_empty() {
            return Err(LinkError::MissingEntries);
        }
        if self.packages.is_empty() {
            return Err(LinkError::MissingDescriptors);
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|entry| !self.packages.iter().any(|p| &p.name == *entry))
        {
            return Err(LinkError::UnknownEntry(entry.clone()));
        }
        Ok(())
    }

    pub fn resolver_keys(&self) -> Vec<ResolverKey> {
        self.kinds.clone()
    }

    /// One descriptor per `[[package]]`, with its manifest read from
    /// `<src_dir>/package.json` when there is one.
    pub fn descriptors(&self) -> Result<Descriptors> {
        self.packages
            .iter()
            .map(|package| -> Result<Descriptor> {
                let manifest_path = package.src_dir.join("package.json");
                let pkg: PackageManifest = if manifest_path.is_file() {
                    let json_str = fs::read_to_string(&manifest_path)
                        .with_context(|| format!("reading {}", manifest_path.display()))?;
                    serde_json::from_str(&json_str)
                        .with_context(|| format!("parsing {}", manifest_path.display()))?
                } else {
                    PackageManifest::new(&package.name)
                };

                let descriptor = Descriptor::new(&package.name, &package.src_dir, pkg);
                Ok(match &package.parent {
                    Some(parent) => descriptor.with_parent(parent),
                    None => descriptor,
                })
            })
            .collect()
    }

    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            builder.add(Glob::new(pattern).with_context(|| format!("invalid exclude pattern `{pattern}`"))?);
        }
        Ok(builder.build()?)
    }
}
