//! Integration tests for Graft
//!
//! These tests drive a config file through the linker and the CLI and check
//! what lands in the output directory.

use std::fs;
use std::path::Path;
use std::process::Command;

use graft_core::{GRAPH_FILE, load_state};
use graft_linker::{CONFIG_FILE, Linker, LinkerConfig};
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let full_path = root.join(path);
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(full_path, content).unwrap();
}

/// An application with a test suite, an in-repo add-on, a declared npm
/// dependency and a `npm:` scheme import.
fn create_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(
        root,
        CONFIG_FILE,
        r#"
entries = ["dummy"]
output = "dist"
exclude = ["**/*.map"]

[[package]]
name = "dummy"
src_dir = "app"

[[package]]
name = "dummy-tests"
src_dir = "tests"
parent = "dummy"

[[package]]
name = "ember-foo"
src_dir = "addons/ember-foo"
"#,
    );

    write(
        root,
        "app/package.json",
        r#"{"name":"dummy","dependencies":{"lodash":"^4.0.0"},"devDependencies":{"qunit":"^2.0.0"}}"#,
    );
    write(root, "app/dummy/app.js", "import foo from 'ember-foo';");
    write(root, "app/dummy/router.js", "export default {};");
    write(root, "app/dummy/app.js.map", "{}");
    write(
        root,
        &format!("app/{GRAPH_FILE}"),
        r#"{
  "dummy/app.js": {"imports": [{"source": "dummy/router"}, {"source": "ember-foo"}, {"source": "lodash"}], "exports": {}},
  "dummy/router.js": {"imports": [{"source": "exports"}], "exports": {}}
}"#,
    );

    write(root, "tests/dummy/tests/app-test.js", "import { module } from 'qunit';");
    write(
        root,
        &format!("tests/{GRAPH_FILE}"),
        r#"{"dummy/tests/app-test.js": {"imports": [{"source": "dummy/app"}, {"source": "qunit"}]}}"#,
    );

    write(root, "addons/ember-foo/ember-foo.js", "export default 'foo';");
    write(
        root,
        &format!("addons/ember-foo/{GRAPH_FILE}"),
        r#"{"ember-foo.js": {"imports": [{"source": "npm:jquery"}]}}"#,
    );

    write(root, "node_modules/lodash/package.json", r#"{"name":"lodash","main":"lodash.js"}"#);
    write(root, "node_modules/lodash/lodash.js", "// lodash");
    write(root, "node_modules/qunit/package.json", r#"{"name":"qunit","main":"qunit/qunit.js"}"#);
    write(root, "node_modules/qunit/qunit/qunit.js", "// qunit");
    write(root, "node_modules/jquery/package.json", r#"{"name":"jquery","main":"./dist/jquery"}"#);
    write(root, "node_modules/jquery/dist/jquery.js", "// jquery");

    temp_dir
}

fn graft(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_graft"))
        .arg("--config")
        .arg(root.join(CONFIG_FILE))
        .args(args)
        .output()
        .expect("Failed to execute graft")
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_graft"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("graft"));
    assert!(stdout.contains("Incremental linker for multi-package module graphs"));
}

/// Test a full config -> linker -> output round
#[tokio::test]
async fn test_config_to_output() {
    let project = create_project();
    let root = project.path();
    let config = LinkerConfig::load(&root.join(CONFIG_FILE)).unwrap();
    let out = root.join("dist/first");

    let mut linker = Linker::from_config(&config).unwrap();
    let report = linker.build(&out).await.unwrap();

    for file in [
        "dummy/app.js",
        "dummy/router.js",
        "dummy/tests/app-test.js",
        "dummy/dep-graph.json",
        "ember-foo.js",
        "ember-foo/dep-graph.json",
        "lodash.js",
        "qunit.js",
        "jquery.js",
    ] {
        assert!(out.join(file).exists(), "missing {}", file);
    }
    assert!(!out.join("dummy/app.js.map").exists());
    assert_eq!(fs::read_to_string(out.join("jquery.js")).unwrap(), "// jquery");

    // lodash, qunit and npm:jquery
    assert_eq!(report.deferred, 3);
    assert_eq!(report.synced_files, 9);

    let store = linker.store();
    assert!(store.is_synced("dummy", "dummy/tests/app-test.js"));
    assert!(store.is_synced("jquery", "jquery.js"));
    assert_eq!(store.merge_target("dummy-tests"), Some("dummy"));

    // Nothing changed: the second build links by reference only.
    let report = linker.build(&root.join("dist/second")).await.unwrap();
    assert!(report.dirty.is_empty());
    assert_eq!(report.resolved, 0);
    assert_eq!(report.synced_files, 9);
}

/// Test the CLI build cycle: link, status, relink, clear
#[test]
fn test_cli_link_status_clear() {
    let project = create_project();
    let root = project.path();

    let output = graft(root, &["link"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(root.join("dist/build-1/dummy/app.js").exists());

    let state = load_state(root).unwrap().expect("state saved");
    assert_eq!(state.generation, 1);
    assert_eq!(state.previous.unwrap().output_dir, root.join("dist/build-1"));

    let output = graft(root, &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("All packages up to date"), "{}", stdout);

    write(
        root,
        &format!("tests/{GRAPH_FILE}"),
        r#"{"dummy/tests/app-test.js": {"imports": [{"source": "dummy/app"}]}}"#,
    );
    let output = graft(root, &["status"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("dummy-tests"), "{}", stdout);

    let output = graft(root, &["link", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["dirty"], serde_json::json!(["dummy", "dummy-tests"]));
    assert_eq!(report["carried"], serde_json::json!(["ember-foo"]));
    assert!(root.join("dist/build-2/dummy/tests/app-test.js").exists());
    assert!(!root.join("dist/build-2/qunit.js").exists());

    let output = graft(root, &["clear"]);
    assert!(output.status.success());
    assert!(load_state(root).unwrap().is_none());
}

/// Test that a broken import fails the build and leaves the saved state alone
#[test]
fn test_cli_reports_unresolvable_import() {
    let project = create_project();
    let root = project.path();
    assert!(graft(root, &["link"]).status.success());

    write(
        root,
        &format!("app/{GRAPH_FILE}"),
        r#"{"dummy/app.js": {"imports": [{"source": "left-pad"}]}}"#,
    );
    let output = graft(root, &["link"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("left-pad"), "{}", stderr);
    assert!(stderr.contains("declare it as a dependency of `dummy`"), "{}", stderr);

    let state = load_state(root).unwrap().unwrap();
    assert_eq!(state.generation, 1);
}
