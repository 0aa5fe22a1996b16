//! End-to-end runs with the real `flowtest-store` and shell stand-ins for the
//! compiler and the compute worker.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use flowtest_cli::builder::CommandCatalogBuilder;
use flowtest_cli::harness::{Harness, TestRequest};
use flowtest_cli::reporter::JsonReporter;
use flowtest_core::config::FlowtestConfig;
use flowtest_core::error::{FlowtestError, SetupError};
use flowtest_supervisor::process::is_process_alive;

const STORE_BIN: &str = env!("CARGO_BIN_EXE_flowtest-store");
const FLOWTEST_BIN: &str = env!("CARGO_BIN_EXE_flowtest");

const CATALOG: &str = r#"{
  "collections": [{ "name": "acme/orders", "key": ["/id"] }],
  "tests": [
    {
      "test": "orders-land",
      "steps": [
        { "type": "ingest", "collection": "acme/orders",
          "documents": [{ "id": 1, "qty": 2 }, { "id": 1, "qty": 5 }],
          "scope": "flow.yaml#/tests/orders-land/0" },
        { "type": "verify", "collection": "acme/orders",
          "documents": [{ "id": 1, "qty": 5 }],
          "scope": "flow.yaml#/tests/orders-land/1" }
      ]
    },
    {
      "test": "orders-missing",
      "steps": [
        { "type": "verify", "collection": "acme/orders",
          "documents": [{ "id": 9 }],
          "scope": "flow.yaml#/tests/orders-missing/0" }
      ]
    }
  ]
}"#;

fn executable(path: &Path, body: &str) -> PathBuf {
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Compiler stand-in copying `catalog.json` from the project to `--output`.
fn fake_compiler(project: &Path) -> PathBuf {
    std::fs::write(project.join("catalog.json"), CATALOG).unwrap();
    executable(
        &project.join("build.sh"),
        r#"while [ $# -gt 0 ]; do [ "$1" = --output ] && out="$2"; shift; done
cp catalog.json "$out""#,
    )
}

/// Store wrapper recording its pid before exec-ing the real store.
fn recorded_store(project: &Path) -> PathBuf {
    executable(
        &project.join("store.sh"),
        &format!(
            "echo $$ > '{}'\nexec '{STORE_BIN}' \"$@\"",
            project.join("store.pid").display()
        ),
    )
}

fn config(project: &Path, worker_script: &str) -> FlowtestConfig {
    let mut config = FlowtestConfig::default();
    config.store.program = recorded_store(project).display().to_string();
    config.store.stop_grace_secs = 2;
    config.worker.program = "/bin/sh".to_owned();
    config.worker.args = vec!["-c".to_owned(), worker_script.to_owned()];
    config.worker.ready_timeout_secs = 2;
    config.worker.stop_grace_secs = 2;
    config.builder.program = fake_compiler(project).display().to_string();
    config
}

fn recorded_pid(path: &Path) -> u32 {
    std::fs::read_to_string(path)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

/// Killed processes are reaped in the background; allow it a moment.
async fn assert_exits(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while is_process_alive(pid) {
        assert!(Instant::now() < deadline, "process {pid} still alive");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn request(project: &Path) -> TestRequest {
    TestRequest {
        source: "flow.yaml".to_owned(),
        directory: project.to_path_buf(),
    }
}

#[tokio::test]
async fn test_full_run_reports_failures_and_cleans_up() {
    // Given: a project whose catalog has one passing and one failing test
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let config = config(
        project.path(),
        "echo $$ > worker.pid; echo READY; exec sleep 600",
    );
    let builder = CommandCatalogBuilder::new(&config.builder.program);
    let harness = Harness::new(config, builder).workspace_in(workspaces.path());
    let mut reporter = JsonReporter::new(Vec::new());

    // When: running the harness
    let summary = harness
        .run(
            &request(project.path()),
            &mut reporter,
            std::future::pending::<String>(),
        )
        .await
        .unwrap();

    // Then: the failing test is counted and encoded in the exit code
    assert_eq!(summary.ran, 2);
    assert_eq!(summary.failed_tests, ["orders-missing"]);
    assert_eq!(summary.exit_code(), 1);

    let doc: serde_json::Value = serde_json::from_slice(&reporter.into_inner()).unwrap();
    assert_eq!(doc["results"][1]["scope"], "flow.yaml#/tests/orders-missing/0");

    // And: the workspace is gone and no subprocess survives
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
    assert!(!is_process_alive(recorded_pid(&project.path().join("store.pid"))));
    assert!(!is_process_alive(recorded_pid(&project.path().join("worker.pid"))));
}

#[tokio::test]
async fn test_worker_startup_failure_stops_store_and_removes_workspace() {
    // Given: a worker that never reports readiness
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let config = config(project.path(), "echo $$ > worker.pid; exec sleep 600");
    let builder = CommandCatalogBuilder::new(&config.builder.program);
    let harness = Harness::new(config, builder).workspace_in(workspaces.path());

    // When: running the harness
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            std::future::pending::<String>(),
        )
        .await
        .unwrap_err();

    // Then: a setup failure, with nothing left behind
    assert!(err.is_setup_failure(), "{err}");
    assert!(matches!(
        err,
        FlowtestError::Setup(SetupError::StartupFailed { .. })
    ));
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
    assert!(!is_process_alive(recorded_pid(&project.path().join("store.pid"))));
    assert!(!is_process_alive(recorded_pid(&project.path().join("worker.pid"))));
}

#[tokio::test]
async fn test_build_failure_is_setup_failure_before_any_process() {
    // Given: a compiler that rejects the source
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let mut config = config(project.path(), "echo READY; exec sleep 600");
    config.builder.program = executable(
        &project.path().join("broken.sh"),
        "echo 'flow.yaml: unknown collection' >&2; exit 1",
    )
    .display()
    .to_string();
    let harness = Harness::from_config(config).workspace_in(workspaces.path());

    // When
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            std::future::pending::<String>(),
        )
        .await
        .unwrap_err();

    // Then: the compiler's message surfaces and the store was never started
    assert!(matches!(err, FlowtestError::Catalog(_)));
    assert!(err.to_string().contains("unknown collection"));
    assert!(!project.path().join("store.pid").exists());
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_store_startup_failure_leaves_nothing_behind() {
    // Given: a store program that exits immediately
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let mut config = config(
        project.path(),
        "echo $$ > worker.pid; echo READY; exec sleep 600",
    );
    config.store.program = "/bin/false".to_owned();
    let harness = Harness::from_config(config).workspace_in(workspaces.path());

    // When
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            std::future::pending::<String>(),
        )
        .await
        .unwrap_err();

    // Then: a startup failure, the worker never launched, the workspace gone
    assert!(matches!(
        err,
        FlowtestError::Setup(SetupError::StartupFailed { .. })
    ));
    assert!(!project.path().join("worker.pid").exists());
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_cluster_construction_failure_stops_both_processes() {
    // Given: cluster settings the cluster rejects, found only after both processes run
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let mut config = config(
        project.path(),
        "echo $$ > worker.pid; echo READY; exec sleep 600",
    );
    config.cluster.zone = String::new();
    let harness = Harness::from_config(config).workspace_in(workspaces.path());

    // When
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            std::future::pending::<String>(),
        )
        .await
        .unwrap_err();

    // Then
    assert!(matches!(err, FlowtestError::Setup(SetupError::Cluster(_))), "{err}");
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
    assert_exits(recorded_pid(&project.path().join("store.pid"))).await;
    assert_exits(recorded_pid(&project.path().join("worker.pid"))).await;
}

#[tokio::test]
async fn test_interrupt_before_setup_is_not_a_clean_run() {
    // Given: a catalog without tests and a signal that has already arrived
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let config = config(project.path(), "echo READY; exec sleep 600");
    std::fs::write(
        project.path().join("catalog.json"),
        r#"{"collections":[],"tests":[]}"#,
    )
    .unwrap();
    let harness = Harness::from_config(config).workspace_in(workspaces.path());

    // When
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            std::future::ready("SIGINT".to_owned()),
        )
        .await
        .unwrap_err();

    // Then: interrupted, never exit code 0, and nothing started
    assert!(matches!(err, FlowtestError::Interrupted { ref signal } if signal == "SIGINT"));
    assert!(!project.path().join("store.pid").exists());
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_interrupt_during_worker_startup_tears_down() {
    // Given: a worker that never reports readiness and a generous startup timeout
    let project = tempfile::tempdir().unwrap();
    let workspaces = tempfile::tempdir().unwrap();
    let mut config = config(project.path(), "echo $$ > worker.pid; exec sleep 600");
    config.worker.ready_timeout_secs = 60;
    let harness = Harness::from_config(config).workspace_in(workspaces.path());
    let worker_pid = project.path().join("worker.pid");
    let signalled = worker_pid.clone();
    let interrupt = async move {
        while std::fs::read_to_string(&signalled).map_or(true, |pid| pid.trim().is_empty()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        "SIGTERM".to_owned()
    };

    // When: SIGTERM arrives while waiting for the worker
    let started = Instant::now();
    let err = harness
        .run(
            &request(project.path()),
            &mut JsonReporter::new(Vec::new()),
            interrupt,
        )
        .await
        .unwrap_err();

    // Then: the wait is abandoned and every resource is released
    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(matches!(err, FlowtestError::Interrupted { ref signal } if signal == "SIGTERM"));
    assert_eq!(std::fs::read_dir(workspaces.path()).unwrap().count(), 0);
    assert_exits(recorded_pid(&project.path().join("store.pid"))).await;
    assert_exits(recorded_pid(&worker_pid)).await;
}

#[test]
fn test_binary_exit_code_is_failure_count() {
    // Given: a config file pointing at the stand-ins
    let project = tempfile::tempdir().unwrap();
    let config = config(project.path(), "echo READY; exec sleep 600");
    let config_path = project.path().join("flowtest.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[store]
program = "{}"

[worker]
program = "/bin/sh"
args = ["-c", "echo READY; exec sleep 600"]
ready_timeout_secs = 5

[builder]
program = "{}"
"#,
            config.store.program, config.builder.program
        ),
    )
    .unwrap();

    // When: running the binary with JSON output
    let output = std::process::Command::new(FLOWTEST_BIN)
        .args(["test", "--source", "flow.yaml", "--output", "json"])
        .arg("--directory")
        .arg(project.path())
        .arg("--config")
        .arg(&config_path)
        .output()
        .unwrap();

    // Then: exit status 1 (one failed test) and a JSON summary on stdout
    assert_eq!(output.status.code(), Some(1), "{output:?}");
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["failed"], 1);
    assert_eq!(doc["passed"], 1);
}

#[test]
fn test_binary_missing_explicit_config_exits_one() {
    let output = std::process::Command::new(FLOWTEST_BIN)
        .args(["test", "--source", "flow.yaml", "--config", "/nonexistent/flowtest.toml"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("/nonexistent/flowtest.toml"));
}
