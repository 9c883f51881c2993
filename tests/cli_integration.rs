//! CLI integration tests for modelkit.
//!
//! These tests drive the binary through the offline workflows: creating a
//! workspace, editing dependencies, validating the import graph and managing
//! the cache. Nothing here touches the network.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// A workspace directory plus an isolated package cache.
struct Env {
    root: TempDir,
    cache: TempDir,
}

impl Env {
    fn new() -> Self {
        Env {
            root: TempDir::new().unwrap(),
            cache: TempDir::new().unwrap(),
        }
    }

    /// A workspace initialized with `modelkit init`.
    fn initialized() -> Self {
        let env = Env::new();
        env.modelkit().args(["init", "--name", "sales"]).assert().success();
        env
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    fn write(&self, relative: &str, contents: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path().join(relative)).unwrap()
    }

    /// Get the modelkit binary command, run inside the workspace.
    fn modelkit(&self) -> Command {
        let mut cmd = Command::cargo_bin("modelkit").unwrap();
        cmd.current_dir(self.path())
            .env("MODELKIT_CACHE_DIR", self.cache.path())
            .arg("--no-color");
        cmd
    }
}

// ============================================================================
// modelkit init
// ============================================================================

#[test]
fn test_init_creates_manifest_and_entry() {
    let env = Env::initialized();

    let manifest = env.read("model.yaml");
    assert!(manifest.contains("name: sales"));
    assert!(manifest.contains("entry: index.model"));
    assert!(env.path().join("index.model").exists());
}

#[test]
fn test_init_fails_if_manifest_exists() {
    let env = Env::initialized();

    env.modelkit()
        .args(["init", "--name", "sales"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// ============================================================================
// modelkit add / remove
// ============================================================================

#[test]
fn test_add_and_remove_dependency() {
    let env = Env::initialized();

    env.modelkit()
        .args(["add", "acme/core", "--ref", "v1.0.0"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Added"));
    assert!(env.read("model.yaml").contains("acme/core: v1.0.0"));

    env.modelkit()
        .args(["remove", "acme/core"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed"));
    assert!(!env.read("model.yaml").contains("acme/core"));
}

#[test]
fn test_add_path_outside_workspace_fails() {
    let env = Env::initialized();
    let before = env.read("model.yaml");

    env.modelkit()
        .args(["add", "secrets", "--path", "../../secrets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("outside workspace boundary"));
    assert_eq!(env.read("model.yaml"), before);
}

#[test]
fn test_add_rejects_malformed_package() {
    let env = Env::initialized();

    env.modelkit()
        .args(["add", "not-a-package"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid package key"));
}

#[test]
fn test_remove_unknown_dependency_fails() {
    let env = Env::initialized();

    env.modelkit()
        .args(["remove", "acme/nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Commands outside a workspace
// ============================================================================

#[test]
fn test_commands_need_a_manifest() {
    let env = Env::new();

    for args in [&["list"][..], &["status"], &["install"], &["validate"]] {
        env.modelkit()
            .args(args)
            .assert()
            .failure()
            .stderr(predicate::str::contains("model.yaml"));
    }
}

// ============================================================================
// modelkit install / list / tree
// ============================================================================

#[test]
fn test_install_without_dependencies_writes_empty_lock() {
    let env = Env::initialized();

    env.modelkit().arg("install").assert().success();
    let lock = env.read("model.lock");
    assert!(lock.contains("\"version\": \"1\""));

    // Unchanged on the second run.
    env.modelkit()
        .arg("install")
        .assert()
        .success()
        .stderr(predicate::str::contains("unchanged"));
    assert_eq!(env.read("model.lock"), lock);

    env.modelkit()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no packages locked"));

    env.modelkit()
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sales"));
}

#[test]
fn test_install_rejects_disallowed_source_offline() {
    let env = Env::new();
    env.write(
        "model.yaml",
        "model:\n  name: sales\ndependencies:\n  evil/core: v1\ngovernance:\n  allowedSources: [\"acme/*\"]\n",
    );

    env.modelkit()
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("allowedSources"));
    assert!(!env.path().join("model.lock").exists());
}

#[test]
fn test_list_without_lock() {
    let env = Env::initialized();

    env.modelkit()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("modelkit install"));
}

// ============================================================================
// modelkit status / validate / compliance
// ============================================================================

#[test]
fn test_status_reports_unlocked_dependency() {
    let env = Env::initialized();
    env.modelkit().args(["add", "acme/core", "--ref", "v1"]).assert().success();

    env.modelkit()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("acme/core"))
        .stdout(predicate::str::contains("not locked"));
}

#[test]
fn test_validate_local_imports() {
    let env = Env::initialized();
    env.write("index.model", "import \"./types\"\nimport \"@shared/money\"\n");
    env.write("types.model", "entity Order {}\n");
    env.write("lib/money.model", "entity Money {}\n");
    env.write(
        "model.yaml",
        "model:\n  name: sales\npaths:\n  \"@shared/\": ./lib/\n",
    );
    env.modelkit().arg("install").assert().success();

    env.modelkit()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 documents loaded"));
}

#[test]
fn test_validate_reports_broken_import() {
    let env = Env::initialized();
    env.write("index.model", "import \"./missing\"\n");

    env.modelkit()
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[!!] imports"));
}

#[test]
fn test_validate_reports_stale_lock() {
    let env = Env::initialized();
    env.modelkit().args(["add", "acme/core", "--ref", "v1"]).assert().success();

    env.modelkit()
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[!!] lock"))
        .stderr(predicate::str::contains("modelkit install"));
}

#[test]
fn test_compliance_without_dependencies() {
    let env = Env::initialized();

    env.modelkit()
        .arg("compliance")
        .assert()
        .success()
        .stdout(predicate::str::contains("compliant"));
}

// ============================================================================
// modelkit cache
// ============================================================================

#[test]
fn test_cache_path_honours_env() {
    let env = Env::new();

    env.modelkit()
        .args(["cache", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(env.cache.path().to_string_lossy().as_ref()));
}

#[test]
fn test_cache_clear_and_list_when_empty() {
    let env = Env::new();

    env.modelkit()
        .args(["cache", "clear"])
        .assert()
        .success()
        .stderr(predicate::str::contains("nothing to remove"));

    env.modelkit()
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(empty)"));
}
