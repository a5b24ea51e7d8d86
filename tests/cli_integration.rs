//! CLI integration tests
//!
//! Runs the compiled binary with a scrubbed environment. No test here
//! reaches a worker over the network.

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

use windplan::session::{FileSessionStore, Location, SessionPatch, SessionStore};
use windplan::tools::{ArtifactRef, ToolName};

const WINDPLAN_VARS: [&str; 12] = [
    "WINDPLAN_TERRAIN_URL",
    "WINDPLAN_LAYOUT_URL",
    "WINDPLAN_SIMULATION_URL",
    "WINDPLAN_REPORT_URL",
    "WINDPLAN_MAX_ATTEMPTS",
    "WINDPLAN_AGENT_PROVIDER",
    "WINDPLAN_AGENT_MODEL",
    "WINDPLAN_SESSION_DIR",
    "WINDPLAN_TRACE_FILE",
    "WINDPLAN_LOG_LEVEL",
    "WINDPLAN_LOG_JSON",
    "RUST_LOG",
];

fn windplan() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_windplan"));
    for var in WINDPLAN_VARS {
        command.env_remove(var);
    }
    command
}

/// Every worker pointed at a closed local port
fn with_unreachable_workers(command: &mut Command) -> &mut Command {
    for tool in ToolName::ALL {
        command.env(
            format!("WINDPLAN_{}_URL", tool.as_str().to_uppercase()),
            format!("http://127.0.0.1:9/{}", tool),
        );
    }
    command
}

fn run(command: &mut Command) -> Output {
    command.output().expect("Failed to execute windplan")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

async fn seed_session(dir: &Path, session_id: &str) {
    let store = FileSessionStore::new(dir, 3600);
    store
        .upsert(
            session_id,
            SessionPatch::new()
                .with_location(Location::new(35.0, -101.0))
                .with_stage_result(
                    ToolName::Terrain,
                    vec![ArtifactRef::new("terrain", "blob://terrain/1")],
                ),
        )
        .await
        .unwrap();
}

#[test]
fn test_cli_help() {
    let output = run(windplan().arg("--help"));

    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["run", "cancel", "session", "config"] {
        assert!(text.contains(command), "help should list {}", command);
    }
}

#[test]
fn test_cli_version() {
    let output = run(windplan().arg("--version"));

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_config_json() {
    let output = run(windplan().args(["config", "--format", "json"]));

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["max_attempts"], "3");
    assert_eq!(value["agent_provider"], "disabled");
}

#[test]
fn test_config_reports_invalid_settings() {
    let output = run(windplan()
        .env("WINDPLAN_AGENT_PROVIDER", "skynet")
        .arg("config"));

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("Invalid provider"));
}

#[test]
fn test_run_without_workers_is_a_setup_error() {
    let output = run(windplan().args(["-q", "run", "Analyze terrain at 35.0, -101.0"]));

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("No worker endpoints configured"));
}

#[test]
fn test_run_missing_coordinates_is_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    let output = run(with_unreachable_workers(&mut windplan())
        .arg("-q")
        .arg("--session-dir")
        .arg(dir.path())
        .args(["run", "--no-agent", "--session", "s1", "Optimize layout"]));

    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Please provide the site coordinates"));
    assert!(text.contains("rejected"));
}

#[test]
fn test_run_json_output() {
    let dir = TempDir::new().unwrap();
    let output = run(with_unreachable_workers(&mut windplan())
        .arg("-q")
        .arg("--session-dir")
        .arg(dir.path())
        .args(["run", "--no-agent", "-s", "s1", "-f", "json", "make it nice"]));

    assert_eq!(output.status.code(), Some(1));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["success"], false);
    assert_eq!(value["failure"]["code"], "ambiguous_intent");
    assert!(dir.path().join("s1.json").exists());
}

#[tokio::test]
async fn test_session_and_cancel_share_the_store() {
    let dir = TempDir::new().unwrap();
    seed_session(dir.path(), "s1").await;

    let output = run(windplan()
        .arg("--session-dir")
        .arg(dir.path())
        .args(["session", "s1", "--format", "json"]));
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["sessionId"], "s1");
    assert_eq!(value["cancelled"], false);

    let output = run(windplan()
        .arg("-q")
        .arg("--session-dir")
        .arg(dir.path())
        .args(["cancel", "--session", "s1"]));
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let store = FileSessionStore::new(dir.path(), 3600);
    assert!(store.get("s1").await.unwrap().cancelled);
}

#[test]
fn test_unknown_session() {
    let dir = TempDir::new().unwrap();

    let output = run(windplan()
        .arg("--session-dir")
        .arg(dir.path())
        .args(["session", "nope"]));
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("does not exist or has expired"));

    let output = run(windplan()
        .arg("--session-dir")
        .arg(dir.path())
        .args(["cancel", "--session", "nope"]));
    assert_eq!(output.status.code(), Some(1));
}
