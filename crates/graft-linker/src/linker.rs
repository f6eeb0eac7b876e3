//! The build lifecycle: decorate, hash, diff, resolve, settle

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use globset::GlobSet;
use graft_core::{
    BuildSnapshot, BuildState, DeferredCache, DependencyStore, Descriptors, FileHashCache,
    GraphHashRecord, GraphHashes, Import, ImportKind, LinkError, Result, classify_with_addons,
    content_hash, diff_graph, hashes, module_name, package_name_of,
};
use graft_resolver::{FsSyncer, MainEntryBundler, ResolveContext, ResolverRegistry, Stage, Syncer};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::LinkerConfig;
use crate::source::{FsGraphSource, GraphSource, list_relative_paths};

/// Where a [`Linker`] is in its build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Uninitialized,
    /// File listings refreshed.
    Decorated,
    /// Every package graph hashed.
    Hashed,
    /// Dirty packages known.
    Diffed,
    Resolving,
    /// Frontiers exhausted and deferred strategies flushed.
    Settled,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkState::Uninitialized => "uninitialized",
            LinkState::Decorated => "decorated",
            LinkState::Hashed => "hashed",
            LinkState::Diffed => "diffed",
            LinkState::Resolving => "resolving",
            LinkState::Settled => "settled",
        };
        f.write_str(name)
    }
}

/// Summary of one successful build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub output_dir: PathBuf,
    /// Packages whose graph changed, in descriptor order.
    pub dirty: Vec<String>,
    pub stable: Vec<String>,
    /// Stable packages whose previous output was carried forward.
    pub carried: Vec<String>,
    /// Eager strategy invocations.
    pub resolved: usize,
    /// Distinct imports handed to deferred strategies.
    pub deferred: usize,
    pub synced_files: usize,
}

pub struct Linker {
    entries: Vec<String>,
    descriptors: Descriptors,
    registry: ResolverRegistry,
    syncer: Arc<dyn Syncer>,
    source: Arc<dyn GraphSource>,
    exclude: GlobSet,
    /// Base for `node_modules` lookups.
    root: PathBuf,
    store: DependencyStore,
    /// Graph hashes of the last successful build.
    hashes: GraphHashes,
    previous: Option<BuildSnapshot>,
    state: LinkState,
}

impl fmt::Debug for Linker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Linker")
            .field("entries", &self.entries)
            .field("packages", &self.descriptors.len())
            .field("kinds", &self.registry.kinds())
            .field("state", &self.state)
            .finish()
    }
}

impl Linker {
    /// Validate the entry list, descriptors and strategies up front; nothing
    /// here is checked again mid-build.
    pub fn new(
        entries: Vec<String>,
        descriptors: Descriptors,
        registry: ResolverRegistry,
        root: impl Into<PathBuf>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(LinkError::MissingEntries);
        }
        if descriptors.is_empty() {
            return Err(LinkError::MissingDescriptors);
        }
        if let Some(entry) = entries.iter().find(|entry| !descriptors.contains(entry)) {
            return Err(LinkError::UnknownEntry(entry.clone()));
        }
        registry.validate()?;

        Ok(Linker {
            entries,
            descriptors,
            registry,
            syncer: Arc::new(FsSyncer::default()),
            source: Arc::new(FsGraphSource),
            exclude: GlobSet::empty(),
            root: root.into(),
            store: DependencyStore::new(),
            hashes: GraphHashes::new(),
            previous: None,
            state: LinkState::Uninitialized,
        })
    }

    pub fn from_config(config: &LinkerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let registry = ResolverRegistry::standard(config.resolver_keys(), Arc::new(MainEntryBundler));
        let linker = Linker::new(
            config.entries.clone(),
            config.descriptors()?,
            registry,
            config.root.clone(),
        )?
        .with_syncer(Arc::new(FsSyncer::new(config.sync_mode)))
        .with_exclude(config.exclude_set()?);
        Ok(linker)
    }

    pub fn with_syncer(mut self, syncer: Arc<dyn Syncer>) -> Self {
        self.syncer = syncer;
        self
    }

    pub fn with_graph_source(mut self, source: Arc<dyn GraphSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_exclude(mut self, exclude: GlobSet) -> Self {
        self.exclude = exclude;
        self
    }

    /// Resume from a state saved by an earlier process.
    pub fn with_state(mut self, state: BuildState) -> Self {
        self.hashes = state.hashes;
        self.previous = state.previous;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn store(&self) -> &DependencyStore {
        &self.store
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn previous(&self) -> Option<&BuildSnapshot> {
        self.previous.as_ref()
    }

    /// What the next process needs to build incrementally.
    pub fn build_state(&self) -> BuildState {
        BuildState::new(self.hashes.clone(), self.previous.clone())
    }

    /// Refresh every descriptor's file listing.
    pub fn decorate(&mut self) -> Result<()> {
        for descriptor in self.descriptors.iter_mut() {
            descriptor.relative_paths = list_relative_paths(&descriptor.src_dir, &self.exclude)?;
            debug!(
                "{}: {} files",
                descriptor.package_name,
                descriptor.relative_paths.len()
            );
        }
        self.state = LinkState::Decorated;
        Ok(())
    }

    /// Read and hash every package's graph, in descriptor order.
    pub async fn hash_graphs(&mut self) -> Result<Vec<GraphHashRecord>> {
        let mut records = Vec::with_capacity(self.descriptors.len());
        for descriptor in self.descriptors.iter() {
            let graph = self.source.read_graph(descriptor).await?;
            records.push(GraphHashRecord::new(&descriptor.package_name, graph)?);
        }
        self.state = LinkState::Hashed;
        Ok(records)
    }

    /// Packages to re-resolve. Everything is dirty before the first
    /// successful build; a dirty test suite dirties the package it is merged
    /// into.
    pub fn diff(&mut self, records: &[GraphHashRecord]) -> Vec<String> {
        let mut dirty: BTreeSet<String> = if self.hashes.is_empty() {
            records.iter().map(|record| record.name.clone()).collect()
        } else {
            diff_graph(records, &self.hashes).into_iter().collect()
        };

        let parents: Vec<String> = dirty
            .iter()
            .filter_map(|name| self.descriptors.get(name)?.parent.clone())
            .collect();
        dirty.extend(parents);

        self.state = LinkState::Diffed;
        records
            .iter()
            .map(|record| &record.name)
            .filter(|name| dirty.contains(*name))
            .cloned()
            .collect()
    }

    /// Packages that changed since the last successful build, without
    /// building anything.
    pub async fn changed_packages(&mut self) -> Result<Vec<String>> {
        self.decorate()?;
        let records = self.hash_graphs().await?;
        Ok(self.diff(&records))
    }

    /// Link every entry into `output_dir`, which must not hold another
    /// build's files. On failure the previous build stays the baseline for
    /// the next attempt.
    pub async fn build(&mut self, output_dir: &Path) -> Result<BuildReport> {
        self.decorate()?;
        let records = self.hash_graphs().await?;
        let dirty_list = self.diff(&records);
        let dirty: BTreeSet<String> = dirty_list.iter().cloned().collect();
        let stable: Vec<String> = records
            .iter()
            .map(|record| record.name.clone())
            .filter(|name| !dirty.contains(name))
            .collect();
        info!(
            "Linking into {} ({} dirty, {} stable)",
            output_dir.display(),
            dirty.len(),
            stable.len()
        );

        for record in &records {
            if dirty.contains(&record.name) || !self.store.contains(&record.name) {
                self.store.update(&record.name, record.graph.clone());
            }
        }
        let merges: Vec<(String, String)> = self
            .descriptors
            .iter()
            .filter_map(|d| Some((d.parent.clone()?, d.package_name.clone())))
            .collect();
        for (parent, child) in &merges {
            self.store.merge_into(parent, &[child.as_str()])?;
        }

        self.state = LinkState::Resolving;
        let previous = self.previous.clone();
        self.store.rotate_ledger();
        let mut file_hashes = FileHashCache::new();

        let cx = ResolveContext {
            store: &mut self.store,
            descriptors: &self.descriptors,
            syncer: self.syncer.as_ref(),
            output_dir,
            root: &self.root,
            previous: previous.as_ref(),
            hashes: &mut file_hashes,
        };
        let mut traversal = Traversal::new(cx, &self.registry, &dirty);
        for entry in &self.entries {
            traversal.visit_entry(entry).await?;
        }
        traversal.flush().await?;
        let (deferred, carried, resolved) = traversal.finish();

        let report = BuildReport {
            output_dir: output_dir.to_path_buf(),
            dirty: dirty_list,
            stable,
            carried,
            resolved,
            deferred: deferred.len(),
            synced_files: self.store.ledger().len(),
        };

        self.hashes = hashes(&records);
        self.previous = Some(BuildSnapshot {
            output_dir: output_dir.to_path_buf(),
            ledger: self.store.ledger().clone(),
            deferred,
            file_hashes,
        });
        self.state = LinkState::Settled;
        info!(
            "Linked {} files ({} resolved, {} carried forward)",
            report.synced_files,
            report.resolved,
            report.carried.len()
        );
        Ok(report)
    }
}

/// An import still to be classified.
#[derive(Debug)]
struct Pending {
    importer: String,
    importee: String,
}

/// One build's walk over the import graph. Pending imports sit on an
/// explicit stack, so the walk is depth-first without recursion.
struct Traversal<'a> {
    cx: ResolveContext<'a>,
    registry: &'a ResolverRegistry,
    dirty: &'a BTreeSet<String>,
    worklist: Vec<Pending>,
    /// Imports already handled this build, by kind and name.
    visited: HashSet<(ImportKind, String)>,
    deferred: DeferredCache,
    carried: Vec<String>,
    resolved: usize,
}

impl<'a> Traversal<'a> {
    fn new(
        cx: ResolveContext<'a>,
        registry: &'a ResolverRegistry,
        dirty: &'a BTreeSet<String>,
    ) -> Self {
        Traversal {
            cx,
            registry,
            dirty,
            worklist: Vec::new(),
            visited: HashSet::new(),
            deferred: DeferredCache::new(),
            carried: Vec::new(),
            resolved: 0,
        }
    }

    fn finish(self) -> (DeferredCache, Vec<String>, usize) {
        (self.deferred, self.carried, self.resolved)
    }

    /// Queue `imports` so the first of them is walked first.
    fn push(&mut self, importer: &str, imports: &[String]) {
        self.worklist
            .extend(imports.iter().rev().map(|importee| Pending {
                importer: importer.to_string(),
                importee: importee.clone(),
            }));
    }

    /// A package with a descriptor whose graph is unchanged and which the
    /// previous build synced.
    fn is_stable(&self, package: &str) -> bool {
        self.cx.descriptors.contains(package)
            && !self.dirty.contains(package)
            && self
                .cx
                .previous
                .is_some_and(|previous| previous.ledger.has_package(package))
    }

    async fn visit_entry(&mut self, entry: &str) -> Result<()> {
        info!("Resolving entry {}", entry);
        if self.is_stable(entry) {
            self.carry_forward(entry).await?;
            return self.drain().await;
        }

        let descriptors = self.cx.descriptors;
        if let Some(descriptor) = descriptors.get(entry) {
            self.cx
                .sync_graph_manifest(descriptor)
                .await
                .map_err(|e| LinkError::resolution(descriptor.graph_output_path(), entry, entry, e))?;
        }

        // Every file of the entry is a root, not only the ones something imports.
        let (modules, imports) = match self.cx.store.package(entry) {
            Some(node) => (
                node.graph()
                    .keys()
                    .map(|file| module_name(file).to_string())
                    .collect::<Vec<_>>(),
                node.deduped_imports().to_vec(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        for module in modules {
            if !self.visited.insert((ImportKind::App, module.clone())) {
                continue;
            }
            let import = Import::new(entry, entry, entry, module, ImportKind::App);
            self.resolve_eager(&import).await?;
        }

        self.push(entry, &imports);
        self.drain().await
    }

    async fn drain(&mut self) -> Result<()> {
        let registry = self.registry;
        while let Some(Pending { importer, importee }) = self.worklist.pop() {
            let target = package_name_of(&importee);
            let import = classify_with_addons(
                self.cx.descriptors,
                self.cx.store.addons(),
                target,
                &importee,
                &importer,
            )?;
            if !self.visited.insert((import.kind().clone(), import.name().to_string())) {
                continue;
            }

            let key = registry.route(&import);
            match registry.get(&key)?.stage() {
                Some(Stage::Eager) => {}
                Some(Stage::Deferred) => {
                    debug!("Deferring {} to `{}`", import, key);
                    self.deferred.insert(key.as_str(), &import);
                    continue;
                }
                None => return Err(LinkError::MissingResolverMethod(key.to_string())),
            }

            if import.kind() == &ImportKind::App
                && !import.is_local()
                && self.is_stable(import.package())
            {
                self.carry_forward(import.package()).await?;
            }
            self.resolve_eager(&import).await?;
        }
        Ok(())
    }

    /// Hand `import` to its eager strategy unless its file is already in this
    /// build's output; either way its own imports are queued.
    async fn resolve_eager(&mut self, import: &Import) -> Result<()> {
        if self.already_synced(import) {
            debug!("{} already linked", import.name());
            let imports = self.cx.store.file_imports(import.name()).to_vec();
            self.push(import.name(), &imports);
            return Ok(());
        }

        let registry = self.registry;
        let resolver = registry.get(&registry.route(import))?;
        self.resolved += 1;
        let frontier = resolver.resolve(import, &mut self.cx).await.map_err(|e| {
            LinkError::resolution(import.name(), import.importer(), import.importer_package(), e)
        })?;
        self.push(&frontier.importer, &frontier.imports);
        Ok(())
    }

    fn already_synced(&self, import: &Import) -> bool {
        if import.kind() != &ImportKind::App {
            return false;
        }
        self.cx
            .descriptors
            .owner_of(import.package(), import.name())
            .is_some_and(|(_, relative)| self.cx.store.is_synced(import.package(), &relative))
    }

    /// Link everything the previous build synced for a stable `package` and
    /// queue the imports of those files. An unchanged graph says nothing about
    /// file contents, so each file is linked from its current source.
    async fn carry_forward(&mut self, package: &str) -> Result<()> {
        if self.carried.iter().any(|p| p == package) {
            return Ok(());
        }
        self.carried.push(package.to_string());
        let Some(previous) = self.cx.previous else {
            return Ok(());
        };
        let files: Vec<String> = previous
            .ledger
            .files_for(package)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        debug!("Carrying forward {} files of {}", files.len(), package);

        for relative in &files {
            self.carry_file(package, relative)
                .await
                .map_err(|e| LinkError::resolution(relative.as_str(), package, package, e))?;
        }

        let modules: Vec<String> = files
            .iter()
            .filter(|relative| !relative.ends_with(graft_core::GRAPH_FILE))
            .map(|relative| module_name(relative).to_string())
            .collect();
        for module in &modules {
            self.visited.insert((ImportKind::App, module.clone()));
        }
        for module in &modules {
            let imports = self.cx.store.file_imports(module).to_vec();
            self.push(module, &imports);
        }
        Ok(())
    }

    /// Sync one carried file from the source tree it lives in now, recording
    /// its content hash for the next build.
    async fn carry_file(&mut self, package: &str, relative: &str) -> anyhow::Result<()> {
        let source = self.source_of(package, relative).ok_or_else(|| {
            anyhow::anyhow!("`{}` is no longer a file of package `{}`", relative, package)
        })?;
        let bytes = tokio::fs::read(&source)
            .await
            .with_context(|| format!("reading {}", source.display()))?;
        self.cx.hashes.insert(package, relative, content_hash(&bytes));
        self.cx.sync(package, &source, relative).await?;
        Ok(())
    }

    /// Where `relative` (an output path recorded for `package`) lives on disk:
    /// a graph manifest, or a file of the package or one merged into it.
    fn source_of(&self, package: &str, relative: &str) -> Option<PathBuf> {
        let descriptors = self.cx.descriptors;
        let manifest = descriptors
            .get(package)
            .into_iter()
            .chain(descriptors.children_of(package))
            .find(|d| d.graph_output_path() == relative);
        if let Some(descriptor) = manifest {
            return Some(descriptor.graph_path());
        }
        descriptors
            .owner_of(package, relative)
            .map(|(descriptor, path)| descriptor.src_dir.join(path))
    }

    /// Run every deferred strategy over what the walk collected.
    async fn flush(&mut self) -> Result<()> {
        let registry = self.registry;
        for (key, resolver) in registry.deferred() {
            let key = key.as_str();
            if self.deferred.packages(key).next().is_none() {
                continue;
            }
            info!("Flushing deferred imports for `{}`", key);
            resolver
                .resolve_later(key, &mut self.cx, &self.deferred)
                .await
                .map_err(|e| LinkError::resolution(key, "deferred pass", key, e))?;
        }
        Ok(())
    }
}
