use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn cli(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("context-sync").expect("binary");
    cmd.current_dir(workdir)
        .env_remove("CONTEXT_SYNC_BACKEND")
        .env_remove("CONTEXT_SYNC_STATE_DIR")
        .env_remove("CONTEXT_SYNC_CONCURRENCY")
        .arg("--quiet");
    cmd
}

fn run_json(workdir: &Path, args: &[&str]) -> Value {
    let output = cli(workdir).args(args).output().expect("run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

fn setup_repo() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/lib.rs"),
        "pub struct Greeter;\n\nimpl Greeter {\n    pub fn greet(&self) {}\n}\n",
    )
    .unwrap();
    fs::write(root.join("README.md"), "# Demo\n").unwrap();
    temp
}

#[test]
fn sync_then_rerun_is_a_no_op() {
    let temp = setup_repo();
    let root = temp.path();

    let first = run_json(root, &["sync", "."]);
    assert_eq!(first["outcome"], "completed");
    assert_eq!(first["strategy_used"], "full");
    assert_eq!(first["new_files"], 2);
    assert_eq!(first["updated_embeddings"], 2);
    assert!(root.join(".context/embeddings.json").exists());
    assert!(root.join(".context/graph.json").exists());
    assert!(root.join(".context/tool-data.json").exists());

    let second = run_json(root, &["sync", "."]);
    assert_eq!(second["outcome"], "skipped");
    assert_eq!(second["reason"], "unchanged");

    fs::write(root.join("README.md"), "# Demo!\n").unwrap();
    let plan = run_json(root, &["plan", "."]);
    assert_eq!(plan["recommendation"]["should_sync"], true);
    assert_eq!(
        plan["recommendation"]["change_set"]["modified"],
        serde_json::json!(["README.md"])
    );

    let third = run_json(root, &["sync", ".", "--no-embeddings"]);
    assert_eq!(third["changed_files"], 1);
    assert_eq!(third["updated_embeddings"], 0);

    let status = run_json(root, &["status", "."]);
    assert_eq!(status["tracked_files"], 2);
    assert_eq!(status["incomplete"], 1);
}

#[test]
fn sqlite_backend_and_external_state_dir() {
    let temp = setup_repo();
    let state = tempdir().unwrap();
    let state_dir = state.path().to_str().unwrap();
    let root = temp.path();

    let first = run_json(
        root,
        &[
            "sync",
            ".",
            "--backend",
            "sqlite",
            "--state-dir",
            state_dir,
            "--project-id",
            "demo",
        ],
    );
    assert_eq!(first["new_files"], 2);
    assert!(state.path().join("hash-store.db").exists());
    assert!(!root.join(".context").exists());

    let status = run_json(
        root,
        &["status", ".", "--backend", "sqlite", "--state-dir", state_dir, "--project-id", "demo"],
    );
    assert_eq!(status["project_id"], "demo");
    assert_eq!(status["tracked_files"], 2);
    assert_eq!(status["metadata"]["strategy_used"], "full");
}

#[test]
fn plan_and_status_write_nothing() {
    let temp = setup_repo();
    let root = temp.path();

    let plan = run_json(root, &["plan", "."]);
    assert_eq!(plan["recommendation"]["should_sync"], true);
    let status = run_json(root, &["status", "."]);
    assert_eq!(status["tracked_files"], 0);
    assert!(!root.join(".context/hash-store.json").exists());
    assert!(!root.join(".context/hash-cache.json").exists());

    run_json(root, &["sync", "."]);
    let snapshot = root.join(".context/hash-store.json");
    let before = fs::metadata(&snapshot).unwrap().modified().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(20));
    run_json(root, &["plan", "."]);
    run_json(root, &["status", "."]);
    assert_eq!(fs::metadata(&snapshot).unwrap().modified().unwrap(), before);
}

#[test]
fn selective_include_limits_the_scan() {
    let temp = setup_repo();
    let root = temp.path();

    let result = run_json(root, &["sync", ".", "--include", "src/**"]);
    assert_eq!(result["strategy_used"], "selective");
    assert_eq!(result["total_files"], 1);
}

#[test]
fn invalid_policy_is_rejected() {
    let temp = setup_repo();
    cli(temp.path())
        .args(["sync", ".", "--mode", "selective"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("include"));
    assert!(!temp.path().join(".context/hash-store.json").exists());
}

#[test]
fn concurrency_outside_documented_range_is_rejected() {
    let temp = setup_repo();
    for value in ["0", "33"] {
        cli(temp.path())
            .args(["sync", ".", "--concurrency", value])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--concurrency"));
    }
    let result = run_json(temp.path(), &["sync", ".", "--concurrency", "32"]);
    assert_eq!(result["new_files"], 2);
}

#[test]
fn broken_config_fails_before_syncing() {
    let temp = setup_repo();
    fs::create_dir_all(temp.path().join(".context")).unwrap();
    fs::write(temp.path().join(".context/sync.toml"), "no_such_option = true\n").unwrap();
    cli(temp.path())
        .args(["sync", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sync config"));
}

#[test]
fn missing_project_path_fails() {
    let temp = tempdir().unwrap();
    cli(temp.path())
        .args(["status", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid project path"));
}
