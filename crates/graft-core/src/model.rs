//! Core data structures for the package graph

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name of the graph manifest every package ships at the root of its sources.
pub const GRAPH_FILE: &str = "dep-graph.json";

/// Pseudo-import each file lists for its own export surface.
pub const EXPORTS_IMPORT: &str = "exports";

/// Module suffixes stripped from graph keys, tried in order when mapping a
/// module name back onto a file.
pub const MODULE_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".ts"];

/// A single `import` statement as recorded in a package graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub source: String,
    #[serde(default)]
    pub specifiers: Vec<serde_json::Value>,
}

impl ImportSpec {
    pub fn new(source: impl Into<String>) -> Self {
        ImportSpec {
            source: source.into(),
            specifiers: Vec::new(),
        }
    }
}

/// Imports and exports of one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    #[serde(default)]
    pub exports: serde_json::Value,
}

impl FileEntry {
    /// Entry importing each of `sources`, in order.
    pub fn importing<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FileEntry {
            imports: sources.into_iter().map(ImportSpec::new).collect(),
            exports: serde_json::Value::Null,
        }
    }
}

/// Per-file dependency graph of a package, keyed by path relative to the
/// package's source directory. Sorted keys keep serialization canonical.
pub type RawGraph = BTreeMap<String, FileEntry>;

/// The subset of `package.json` the linker cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn new(name: impl Into<String>) -> Self {
        PackageManifest {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), version.into());
        self
    }

    pub fn with_dev_dependency(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.dev_dependencies.insert(name.into(), version.into());
        self
    }

    /// Whether `package` is listed under dependencies or devDependencies.
    pub fn declares(&self, package: &str) -> bool {
        self.dependencies.contains_key(package) || self.dev_dependencies.contains_key(package)
    }
}

/// One source package taking part in a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub package_name: String,
    pub src_dir: PathBuf,
    pub pkg: PackageManifest,
    /// Files under `src_dir`, `/`-separated. Refreshed on every build.
    pub relative_paths: Vec<String>,
    /// Package this one is merged into (an application's test suite).
    pub parent: Option<String>,
}

impl Descriptor {
    pub fn new(package_name: impl Into<String>, src_dir: impl Into<PathBuf>, pkg: PackageManifest) -> Self {
        Descriptor {
            package_name: package_name.into(),
            src_dir: src_dir.into(),
            pkg,
            relative_paths: Vec::new(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_relative_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relative_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Map a module or file name onto one of the known relative paths.
    pub fn relative_path_for(&self, name: &str) -> Option<&str> {
        std::iter::once(name.to_string())
            .chain(MODULE_EXTENSIONS.iter().map(|ext| format!("{name}{ext}")))
            .find_map(|candidate| {
                self.relative_paths
                    .iter()
                    .find(|path| **path == candidate)
                    .map(String::as_str)
            })
    }

    pub fn has_file(&self, name: &str) -> bool {
        self.relative_path_for(name).is_some()
    }

    /// Location of this package's graph manifest on disk.
    pub fn graph_path(&self) -> PathBuf {
        self.src_dir.join(GRAPH_FILE)
    }

    /// Output-relative path of the graph manifest: `<package>/dep-graph.json`.
    pub fn graph_output_path(&self) -> String {
        format!("{}/{}", self.package_name, GRAPH_FILE)
    }
}

/// All descriptors of a build session, keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct Descriptors {
    inner: BTreeMap<String, Descriptor>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: Descriptor) {
        self.inner.insert(descriptor.package_name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&Descriptor> {
        self.inner.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Descriptor> {
        self.inner.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.inner.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Descriptor> {
        self.inner.values_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Descriptors merged into `parent`.
    pub fn children_of<'a>(&'a self, parent: &str) -> impl Iterator<Item = &'a Descriptor> {
        self.inner
            .values()
            .filter(move |d| d.parent.as_deref() == Some(parent))
    }

    /// The descriptor holding `name` on disk: `package` itself, else one of the
    /// packages merged into it.
    pub fn owner_of(&self, package: &str, name: &str) -> Option<(&Descriptor, String)> {
        self.get(package)
            .into_iter()
            .chain(self.children_of(package))
            .find_map(|d| d.relative_path_for(name).map(|path| (d, path.to_string())))
    }
}

impl FromIterator<Descriptor> for Descriptors {
    fn from_iter<T: IntoIterator<Item = Descriptor>>(iter: T) -> Self {
        let mut descriptors = Descriptors::new();
        for descriptor in iter {
            descriptors.insert(descriptor);
        }
        descriptors
    }
}

/// How an import is satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImportKind {
    /// A file of a package with a descriptor in this build.
    App,
    /// A file of an add-on installed under `node_modules`.
    Addon,
    /// A package declared in the importer's manifest.
    Bare,
    /// A `scheme:name` import, keyed by its scheme tag.
    Scheme(String),
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportKind::App => f.write_str("app"),
            ImportKind::Addon => f.write_str("addon"),
            ImportKind::Bare => f.write_str("bare"),
            ImportKind::Scheme(tag) => write!(f, "{tag}:"),
        }
    }
}

/// One classified import edge. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    importer: String,
    importer_package: String,
    package: String,
    name: String,
    kind: ImportKind,
}

impl Import {
    pub fn new(
        importer: impl Into<String>,
        importer_package: impl Into<String>,
        package: impl Into<String>,
        name: impl Into<String>,
        kind: ImportKind,
    ) -> Self {
        Import {
            importer: importer.into(),
            importer_package: importer_package.into(),
            package: package.into(),
            name: name.into(),
            kind,
        }
    }

    /// File or package the import statement lives in.
    pub fn importer(&self) -> &str {
        &self.importer
    }

    pub fn importer_package(&self) -> &str {
        &self.importer_package
    }

    /// Package the import resolves into.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Resolved module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ImportKind {
        &self.kind
    }

    /// True when the import stays inside the importer's own package.
    pub fn is_local(&self) -> bool {
        self.kind == ImportKind::App && self.package == self.importer_package
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) from {}", self.name, self.kind, self.importer)
    }
}

/// Package a module or file name belongs to. Any `scheme:` prefix is ignored;
/// scoped names (`@scope/pkg/...`) keep both leading segments.
pub fn package_name_of(name: &str) -> &str {
    let name = name.split_once(':').map_or(name, |(_, rest)| rest);
    if name.starts_with('@') {
        match name.match_indices('/').nth(1) {
            Some((idx, _)) => &name[..idx],
            None => name,
        }
    } else {
        name.split('/').next().unwrap_or(name)
    }
}

/// Strip a module suffix from a graph key: `dummy/app.js` -> `dummy/app`.
pub fn module_name(path: &str) -> &str {
    MODULE_EXTENSIONS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

/// Output file for a module name that has no file listing to consult.
pub fn file_name_for(module: &str) -> String {
    if module_name(module) == module {
        format!("{module}.js")
    } else {
        module.to_string()
    }
}
