//! Unit tests for graft-linker module

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSetBuilder};
use graft_core::*;
use graft_resolver::{MainEntryBundler, Resolver, ResolverKey, ResolverRegistry};
use tempfile::TempDir;

use crate::*;

fn graph(files: &[(&str, &[&str])]) -> RawGraph {
    files
        .iter()
        .map(|(file, imports)| (file.to_string(), FileEntry::importing(imports.iter().copied())))
        .collect()
}

/// Package sources on disk, one directory per package.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Workspace {
            dir: TempDir::new().unwrap(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn src(&self, package: &str) -> PathBuf {
        self.root().join("packages").join(package)
    }

    fn out(&self, name: &str) -> PathBuf {
        self.root().join("dist").join(name)
    }

    fn write(&self, path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Write a package's graph manifest plus one source file per graph key.
    fn package(&self, package: &str, files: &[(&str, &[&str])]) {
        for (file, _) in files {
            self.write(&self.src(package).join(file), &format!("// {file}"));
        }
        self.set_graph(package, files);
    }

    fn set_graph(&self, package: &str, files: &[(&str, &[&str])]) {
        let json = serde_json::to_string(&graph(files)).unwrap();
        self.write(&self.src(package).join(GRAPH_FILE), &json);
    }

    fn descriptor(&self, package: &str) -> Descriptor {
        Descriptor::new(package, self.src(package), PackageManifest::new(package))
    }

    fn linker(&self, entries: &[&str], descriptors: Descriptors) -> Linker {
        let kinds = DEFAULT_KINDS.iter().map(|kind| ResolverKey::from(*kind)).collect();
        let registry = ResolverRegistry::standard(kinds, Arc::new(MainEntryBundler));
        let entries = entries.iter().map(|e| e.to_string()).collect();
        Linker::new(entries, descriptors, registry, self.root()).unwrap()
    }

    /// `dummy -> ember`, `dummy -> foobiz/foo -> bar/bar -> ember`.
    fn addon_chain(&self) -> Descriptors {
        self.package(
            "dummy",
            &[("dummy/a.js", &["dummy/b", "ember"]), ("dummy/b.js", &["foobiz/foo"])],
        );
        self.package("foobiz", &[("foobiz/foo.js", &["bar/bar"])]);
        self.package("bar", &[("bar/bar.js", &["ember"])]);
        self.package("ember", &[("ember.js", &[])]);
        ["dummy", "foobiz", "bar", "ember"]
            .into_iter()
            .map(|name| self.descriptor(name))
            .collect()
    }
}

fn ledger(linker: &Linker) -> Vec<String> {
    linker
        .store()
        .all_synced_files()
        .map(|(package, file)| format!("{package}:{file}"))
        .collect()
}

#[test]
fn test_linker_configuration_errors() {
    let ws = Workspace::new();
    let kinds: Vec<ResolverKey> = vec![ResolverKey::App, ResolverKey::Default];
    let registry = || ResolverRegistry::standard(kinds.clone(), Arc::new(MainEntryBundler));
    let descriptors: Descriptors = [ws.descriptor("dummy")].into_iter().collect();

    let err = Linker::new(vec![], descriptors.clone(), registry(), ws.root()).unwrap_err();
    assert!(matches!(err, LinkError::MissingEntries));

    let err = Linker::new(vec!["dummy".into()], Descriptors::new(), registry(), ws.root()).unwrap_err();
    assert!(matches!(err, LinkError::MissingDescriptors));

    let err = Linker::new(vec!["ghost".into()], descriptors.clone(), registry(), ws.root()).unwrap_err();
    assert!(matches!(err, LinkError::UnknownEntry(ref name) if name == "ghost"));

    let mut partial = ResolverRegistry::new(vec![ResolverKey::App, ResolverKey::Scheme("npm".into())]);
    partial.register(ResolverKey::App, Resolver::App(graft_resolver::AppResolver));
    let err = Linker::new(vec!["dummy".into()], descriptors, partial, ws.root()).unwrap_err();
    assert!(matches!(err, LinkError::NoResolverForKind(ref kind) if kind == "npm"));
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_initial_build_links_reachable_files() {
    let ws = Workspace::new();
    let mut linker = ws.linker(&["dummy"], ws.addon_chain());
    assert_eq!(linker.state(), LinkState::Uninitialized);

    let report = linker.build(&ws.out("1")).await.unwrap();
    assert_eq!(linker.state(), LinkState::Settled);
    assert_eq!(report.dirty, vec!["bar", "dummy", "ember", "foobiz"]);
    assert!(report.stable.is_empty());
    assert_eq!(report.resolved, 5);

    insta::assert_debug_snapshot!(ledger(&linker), @r#"
    [
        "bar:bar/bar.js",
        "bar:bar/dep-graph.json",
        "dummy:dummy/a.js",
        "dummy:dummy/b.js",
        "dummy:dummy/dep-graph.json",
        "ember:ember.js",
        "ember:ember/dep-graph.json",
        "foobiz:foobiz/dep-graph.json",
        "foobiz:foobiz/foo.js",
    ]
    "#);
    assert_eq!(report.synced_files, 9);
    assert_eq!(
        fs::read_to_string(ws.out("1").join("foobiz/foo.js")).unwrap(),
        "// foobiz/foo.js"
    );
}

#[tokio::test]
async fn test_stable_rebuild_short_circuits() {
    let ws = Workspace::new();
    let mut linker = ws.linker(&["dummy"], ws.addon_chain());
    linker.build(&ws.out("1")).await.unwrap();
    let first = ledger(&linker);

    let records = linker.hash_graphs().await.unwrap();
    assert!(linker.diff(&records).is_empty());

    let report = linker.build(&ws.out("2")).await.unwrap();
    assert!(report.dirty.is_empty());
    assert_eq!(report.resolved, 0);
    assert_eq!(report.carried, vec!["dummy", "foobiz", "bar", "ember"]);
    assert_eq!(ledger(&linker), first);
    assert!(ws.out("2").join("bar/bar.js").exists());
}

#[tokio::test]
async fn test_edge_removal_propagates() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["dummy/b"]), ("dummy/b.js", &[])]);
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());

    linker.build(&ws.out("1")).await.unwrap();
    assert!(linker.store().is_synced("dummy", "dummy/b.js"));

    ws.set_graph("dummy", &[("dummy/a.js", &[])]);
    let report = linker.build(&ws.out("2")).await.unwrap();
    assert_eq!(report.dirty, vec!["dummy"]);

    let files: Vec<&str> = linker.store().synced_files_for("dummy").collect();
    assert_eq!(files, vec!["dummy/a.js", "dummy/dep-graph.json"]);
    assert!(!ws.out("2").join("dummy/b.js").exists());
}

#[tokio::test]
async fn test_transitive_drop_on_entry_edge_loss() {
    let ws = Workspace::new();
    let mut linker = ws.linker(&["dummy"], ws.addon_chain());
    linker.build(&ws.out("1")).await.unwrap();

    ws.set_graph("dummy", &[("dummy/a.js", &["dummy/b", "ember"]), ("dummy/b.js", &[])]);
    let report = linker.build(&ws.out("2")).await.unwrap();
    assert_eq!(report.dirty, vec!["dummy"]);
    assert_eq!(report.stable, vec!["bar", "ember", "foobiz"]);
    assert_eq!(report.carried, vec!["ember"]);

    insta::assert_debug_snapshot!(ledger(&linker), @r#"
    [
        "dummy:dummy/a.js",
        "dummy:dummy/b.js",
        "dummy:dummy/dep-graph.json",
        "ember:ember.js",
        "ember:ember/dep-graph.json",
    ]
    "#);
    assert!(!ws.out("2").join("foobiz/foo.js").exists());
    assert!(!ws.out("2").join("bar/bar.js").exists());
}

#[tokio::test]
async fn test_unchanged_files_come_from_previous_output() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["dummy/b"]), ("dummy/b.js", &[])]);
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());
    linker.build(&ws.out("1")).await.unwrap();

    // Only `a` is edited; the graph change makes the package dirty.
    ws.write(&ws.src("dummy").join("dummy/a.js"), "// edited");
    ws.set_graph("dummy", &[("dummy/a.js", &["dummy/b", "exports"]), ("dummy/b.js", &[])]);
    fs::write(ws.out("1").join("dummy/b.js"), "// from build 1").unwrap();

    linker.build(&ws.out("2")).await.unwrap();
    assert_eq!(fs::read_to_string(ws.out("2").join("dummy/a.js")).unwrap(), "// edited");
    assert_eq!(
        fs::read_to_string(ws.out("2").join("dummy/b.js")).unwrap(),
        "// from build 1"
    );
}

#[tokio::test]
async fn test_test_suite_merge_and_deferred_bundling() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &[])]);
    ws.package("dummy-tests", &[("dummy/tests/a-test.js", &["dummy/a", "qunit"])]);
    ws.write(
        &ws.root().join("node_modules/qunit/package.json"),
        r#"{"name":"qunit","main":"qunit/qunit.js"}"#,
    );
    ws.write(&ws.root().join("node_modules/qunit/qunit/qunit.js"), "// qunit");

    let dummy = Descriptor::new(
        "dummy",
        ws.src("dummy"),
        PackageManifest::new("dummy").with_dev_dependency("qunit", "^2.0.0"),
    );
    let tests = ws.descriptor("dummy-tests").with_parent("dummy");
    let mut linker = ws.linker(&["dummy"], [dummy, tests].into_iter().collect());

    let report = linker.build(&ws.out("1")).await.unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(linker.store().merge_target("dummy-tests"), Some("dummy"));
    assert!(linker.store().is_synced("dummy", "dummy/tests/a-test.js"));
    assert!(linker.store().is_synced("qunit", "qunit.js"));
    assert_eq!(fs::read_to_string(ws.out("1").join("qunit.js")).unwrap(), "// qunit");

    // Changing only the suite dirties the package it is merged into.
    ws.set_graph("dummy-tests", &[("dummy/tests/a-test.js", &["dummy/a"])]);
    let report = linker.build(&ws.out("2")).await.unwrap();
    assert_eq!(report.dirty, vec!["dummy", "dummy-tests"]);
    assert_eq!(report.deferred, 0);
    assert!(!linker.store().ledger().has_package("qunit"));
}

#[tokio::test]
async fn test_addon_scheme_import() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["addon:ember-bar/utils/x"])]);
    ws.write(&ws.root().join("node_modules/ember-bar/package.json"), r#"{"name":"ember-bar"}"#);
    ws.write(&ws.root().join("node_modules/ember-bar/utils/x.js"), "// x");
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());

    let report = linker.build(&ws.out("1")).await.unwrap();
    assert_eq!(report.resolved, 2);
    assert!(linker.store().is_synced("ember-bar", "ember-bar/utils/x.js"));
    assert_eq!(
        fs::read_to_string(ws.out("1").join("ember-bar/utils/x.js")).unwrap(),
        "// x"
    );
}

/// `ember-bar/utils/x` imports a sibling file and a dependency declared in
/// the add-on's own manifest.
fn ember_bar(ws: &Workspace, x_imports: &[&str]) {
    let addon = ws.root().join("node_modules/ember-bar");
    ws.write(
        &addon.join("package.json"),
        r#"{"name":"ember-bar","dependencies":{"lodash":"^4.0.0"}}"#,
    );
    for file in ["utils/x.js", "utils/y.js", "utils/z.js"] {
        ws.write(&addon.join(file), &format!("// {file}"));
    }
    let files: &[(&str, &[&str])] = &[
        ("ember-bar/utils/x.js", x_imports),
        ("ember-bar/utils/y.js", &[]),
        ("ember-bar/utils/z.js", &[]),
    ];
    ws.write(&addon.join(GRAPH_FILE), &serde_json::to_string(&graph(files)).unwrap());
    ws.write(
        &ws.root().join("node_modules/lodash/package.json"),
        r#"{"name":"lodash","main":"lodash.js"}"#,
    );
    ws.write(&ws.root().join("node_modules/lodash/lodash.js"), "// lodash");
}

#[tokio::test]
async fn test_addon_files_import_siblings_and_dependencies() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["addon:ember-bar/utils/x"])]);
    ember_bar(&ws, &["ember-bar/utils/y", "lodash"]);
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());

    let report = linker.build(&ws.out("1")).await.unwrap();
    assert_eq!(report.resolved, 3);
    assert_eq!(report.deferred, 1);
    assert!(linker.store().addon_manifest("ember-bar").unwrap().declares("lodash"));
    assert!(linker.store().is_synced("ember-bar", "ember-bar/utils/y.js"));
    assert!(!linker.store().is_synced("ember-bar", "ember-bar/utils/z.js"));
    assert_eq!(fs::read_to_string(ws.out("1").join("lodash.js")).unwrap(), "// lodash");
}

#[tokio::test]
async fn test_rebuild_rereads_addon_graph() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["addon:ember-bar/utils/x"])]);
    ember_bar(&ws, &["ember-bar/utils/y"]);
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());
    linker.build(&ws.out("1")).await.unwrap();
    assert!(linker.store().is_synced("ember-bar", "ember-bar/utils/y.js"));

    ember_bar(&ws, &["ember-bar/utils/z"]);
    let report = linker.build(&ws.out("2")).await.unwrap();
    assert!(report.dirty.is_empty());
    assert!(linker.store().is_synced("ember-bar", "ember-bar/utils/z.js"));
    assert!(!linker.store().is_synced("ember-bar", "ember-bar/utils/y.js"));
    assert!(!ws.out("2").join("ember-bar/utils/y.js").exists());
}

#[tokio::test]
async fn test_stable_packages_link_current_sources() {
    let ws = Workspace::new();
    let mut linker = ws.linker(&["dummy"], ws.addon_chain());
    linker.build(&ws.out("1")).await.unwrap();

    // Body edits leave every graph unchanged.
    ws.write(&ws.src("dummy").join("dummy/a.js"), "// edited body");
    ws.write(&ws.src("bar").join("bar/bar.js"), "// edited bar");
    let report = linker.build(&ws.out("2")).await.unwrap();
    assert!(report.dirty.is_empty());
    assert_eq!(report.carried, vec!["dummy", "foobiz", "bar", "ember"]);

    let read = |path: PathBuf| fs::read_to_string(path).unwrap();
    assert_eq!(read(ws.out("2").join("dummy/a.js")), "// edited body");
    assert_eq!(read(ws.out("2").join("bar/bar.js")), "// edited bar");
    assert_eq!(read(ws.out("1").join("dummy/a.js")), "// dummy/a.js");
    assert_eq!(
        linker.previous().unwrap().file_hashes.get("dummy", "dummy/a.js"),
        Some(content_hash(b"// edited body").as_str())
    );
}

#[tokio::test]
async fn test_scheme_and_bare_requests_for_one_package() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &["npm:qunit", "qunit"])]);
    ws.write(
        &ws.root().join("node_modules/qunit/package.json"),
        r#"{"name":"qunit","main":"qunit/qunit.js"}"#,
    );
    ws.write(&ws.root().join("node_modules/qunit/qunit/qunit.js"), "// qunit");
    let dummy = Descriptor::new(
        "dummy",
        ws.src("dummy"),
        PackageManifest::new("dummy").with_dev_dependency("qunit", "^2.0.0"),
    );
    let mut linker = ws.linker(&["dummy"], [dummy].into_iter().collect());

    let report = linker.build(&ws.out("1")).await.unwrap();
    assert_eq!(report.deferred, 2);
    let deferred = &linker.previous().unwrap().deferred;
    assert!(deferred.requested("npm", "qunit").is_some());
    assert!(deferred.requested("bare", "qunit").is_some());
    assert!(linker.store().is_synced("qunit", "qunit.js"));
}

#[tokio::test]
async fn test_failed_build_keeps_previous_baseline() {
    let ws = Workspace::new();
    ws.package("dummy", &[("dummy/a.js", &[])]);
    let mut linker = ws.linker(&["dummy"], [ws.descriptor("dummy")].into_iter().collect());
    linker.build(&ws.out("1")).await.unwrap();

    ws.set_graph("dummy", &[("dummy/a.js", &["left-pad"])]);
    let err = linker.build(&ws.out("2")).await.unwrap_err();
    match &err {
        LinkError::UnresolvableImport { importee, package, .. } => {
            assert_eq!(importee, "left-pad");
            assert_eq!(package, "dummy");
        }
        other => panic!("Expected UnresolvableImport, got {:?}", other),
    }
    assert_eq!(linker.state(), LinkState::Resolving);
    assert_eq!(linker.previous().unwrap().output_dir, ws.out("1"));

    // Still dirty against the last good build.
    assert_eq!(linker.changed_packages().await.unwrap(), vec!["dummy"]);
}

#[tokio::test]
async fn test_resume_from_saved_state() {
    let ws = Workspace::new();
    let mut first = ws.linker(&["dummy"], ws.addon_chain());
    first.build(&ws.out("1")).await.unwrap();
    save_state(&first.build_state(), ws.root()).unwrap();

    let state = load_state(ws.root()).unwrap().unwrap();
    let descriptors = ["dummy", "foobiz", "bar", "ember"]
        .into_iter()
        .map(|name| ws.descriptor(name))
        .collect();
    let mut second = ws.linker(&["dummy"], descriptors).with_state(state);

    let report = second.build(&ws.out("2")).await.unwrap();
    assert!(report.dirty.is_empty());
    assert_eq!(report.resolved, 0);
    assert_eq!(ledger(&second), ledger(&first));
}

#[test]
fn test_list_relative_paths() {
    let ws = Workspace::new();
    let src = ws.src("dummy");
    ws.write(&src.join("dummy/a.js"), "");
    ws.write(&src.join("dummy/nested/b.ts"), "");
    ws.write(&src.join("dummy/a.js.map"), "");
    ws.write(&src.join("node_modules/x/index.js"), "");

    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new("**/*.map").unwrap());
    let paths = list_relative_paths(&src, &builder.build().unwrap()).unwrap();
    assert_eq!(paths, vec!["dummy/a.js", "dummy/nested/b.ts"]);

    assert!(list_relative_paths(&ws.src("missing"), &globset::GlobSet::empty()).unwrap().is_empty());
}

#[tokio::test]
async fn test_fs_graph_source_missing_manifest() {
    let ws = Workspace::new();
    let graph = FsGraphSource.read_graph(&ws.descriptor("nothing")).await.unwrap();
    assert!(graph.is_empty());
}

#[test]
fn test_config_parse_and_validate() {
    let config = LinkerConfig::parse(
        r#"
        entries = ["dummy"]
        kinds = ["app", "default", "bare", "npm"]
        sync_mode = "symlink"
        exclude = ["**/*.map"]

        [[package]]
        name = "dummy"
        src_dir = "app"

        [[package]]
        name = "dummy-tests"
        src_dir = "tests"
        parent = "dummy"
        "#,
    )
    .unwrap();

    assert_eq!(config.output, PathBuf::from("dist"));
    assert_eq!(config.sync_mode, graft_resolver::SyncMode::Symlink);
    assert_eq!(config.kinds[3], ResolverKey::Scheme("npm".into()));
    assert_eq!(config.packages[1].parent.as_deref(), Some("dummy"));
    assert!(config.validate().is_ok());
    assert!(config.exclude_set().unwrap().is_match("dummy/a.js.map"));

    let defaults = LinkerConfig::parse("").unwrap();
    assert_eq!(defaults.kinds.len(), DEFAULT_KINDS.len());
    assert!(matches!(defaults.validate(), Err(LinkError::MissingEntries)));

    let no_packages = LinkerConfig::parse(r#"entries = ["dummy"]"#).unwrap();
    assert!(matches!(no_packages.validate(), Err(LinkError::MissingDescriptors)));

    let unknown = LinkerConfig::parse(
        r#"
        entries = ["ghost"]
        [[package]]
        name = "dummy"
        src_dir = "app"
        "#,
    )
    .unwrap();
    assert!(matches!(unknown.validate(), Err(LinkError::UnknownEntry(ref e)) if e == "ghost"));
}

#[test]
fn test_config_load_rebases_and_reads_manifests() {
    let ws = Workspace::new();
    ws.write(
        &ws.root().join("app/package.json"),
        r#"{"name":"dummy","devDependencies":{"qunit":"^2.0.0"}}"#,
    );
    ws.write(
        &ws.root().join(CONFIG_FILE),
        r#"
        entries = ["dummy"]

        [[package]]
        name = "dummy"
        src_dir = "app"

        [[package]]
        name = "dummy-tests"
        src_dir = "tests"
        parent = "dummy"
        "#,
    );

    let config = LinkerConfig::load(&ws.root().join(CONFIG_FILE)).unwrap();
    assert_eq!(config.root, ws.root().join("."));
    assert_eq!(config.output, ws.root().join("dist"));
    assert_eq!(config.packages[0].src_dir, ws.root().join("app"));

    let descriptors = config.descriptors().unwrap();
    assert!(descriptors.get("dummy").unwrap().pkg.declares("qunit"));
    let tests = descriptors.get("dummy-tests").unwrap();
    assert_eq!(tests.pkg.name, "dummy-tests");
    assert_eq!(tests.parent.as_deref(), Some("dummy"));

    let linker = Linker::from_config(&config).unwrap();
    assert_eq!(linker.descriptors().len(), 2);
}
