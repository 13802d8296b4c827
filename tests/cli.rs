use std::fs;

use assert_cmd::Command;
use serde_json::Value;

fn soulflow() -> Command {
    let mut cmd = Command::cargo_bin("soulflow").unwrap();
    cmd.current_dir(env!("CARGO_MANIFEST_DIR"));
    cmd.env_remove("SOULFLOW_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

#[test]
fn validate_lists_demo_steps() {
    let output = soulflow()
        .args(["validate", "demos/checkout.workflow.json", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["workflow"], "checkout");
    assert_eq!(report["steps"].as_array().unwrap().len(), 6);
    assert!(report["issues"].as_array().unwrap().is_empty());
}

#[test]
fn validate_fails_on_missing_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, r#"{ "steps": [ { "action": "navigate" }, { "action": "click" } ] }"#)
        .unwrap();

    let output = soulflow()
        .args(["validate", "--output", "json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["issues"].as_array().unwrap().len(), 2);
}

#[test]
fn selectors_rank_the_descriptor() {
    let output = soulflow()
        .args(["selectors", "demos/buy-button.descriptor.json", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let ranked = stdout_json(&output);
    let ranked = ranked.as_array().unwrap();
    assert_eq!(ranked[0]["strategy"], "aria-role");
    assert_eq!(ranked[0]["selector"], r#"role=button[name="Buy now"]"#);
    assert_eq!(ranked[1]["selector"], r#"[data-testid="buy-now"]"#);
    assert_eq!(ranked[0]["rank"], 1);
}

#[test]
fn config_get_reads_the_shipped_file() {
    let output = soulflow()
        .args(["config", "get", "retry.base_delay_ms"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "250");
}

#[test]
fn run_against_fixture_prints_the_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("fast.yaml");
    fs::write(
        &config,
        "wait:\n  poll_interval_ms: 5\n  timeout_ms: 300\n  idle_window_ms: 10\n  idle_timeout_ms: 500\nretry:\n  base_delay_ms: 5\n  max_delay_ms: 20\n",
    )
    .unwrap();

    let output = soulflow()
        .arg("--config")
        .arg(&config)
        .args([
            "run",
            "demos/checkout.workflow.json",
            "--fixture",
            "demos/checkout.surface.json",
            "--session",
            "cli",
            "--var",
            "coupon=AUTUMN",
            "-o",
            "json",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let record = stdout_json(&output);
    assert_eq!(record["status"], "succeeded");
    assert_eq!(record["session"], "cli");
    assert_eq!(record["outputs"][1]["typed"], "AUTUMN-2026");
    assert_eq!(record["steps"][3]["healed"], true);
}

#[test]
fn run_timeout_cancels_the_execution() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = dir.path().join("slow.json");
    fs::write(
        &workflow,
        r#"{ "steps": [ { "action": "wait", "parameters": { "duration_ms": 60000 } } ] }"#,
    )
    .unwrap();

    let output = soulflow()
        .arg("run")
        .arg(&workflow)
        .args([
            "--fixture",
            "demos/checkout.surface.json",
            "--timeout",
            "200ms",
            "-o",
            "json",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let record = stdout_json(&output);
    assert_eq!(record["status"], "cancelled");
    assert_eq!(record["last_error"]["category"], "cancellation_requested");
}

#[test]
fn run_requires_a_host() {
    soulflow()
        .args(["run", "demos/checkout.workflow.json"])
        .assert()
        .failure();
}
