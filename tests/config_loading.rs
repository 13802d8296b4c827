use std::fs;

use soulflow::config::load_config;
use soulflow::Config;

#[tokio::test]
async fn explicit_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("soulflow.yaml");
    fs::write(
        &path,
        "retry:\n  max_attempts: 5\n  widen_step: 2\nengine:\n  max_concurrent: 4\nlogging:\n  json: true\n",
    )
    .unwrap();

    let loaded = load_config(Some(&path)).await.unwrap();
    assert!(loaded.from_file);
    assert_eq!(loaded.path, path);
    assert_eq!(loaded.config.retry.max_attempts, 5);
    assert_eq!(loaded.config.retry.widen_step, 2);
    assert_eq!(loaded.config.engine.max_concurrent, 4);
    assert!(loaded.config.logging.json);
    assert_eq!(loaded.config.wait, Config::default().wait);
}

#[tokio::test]
async fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");
    let err = load_config(Some(&path)).await.err().expect("must fail");
    assert!(err.to_string().contains("absent.yaml"));
}

#[tokio::test]
async fn malformed_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "retry: [1, 2\n").unwrap();
    let err = load_config(Some(&path)).await.err().expect("must fail");
    assert!(format!("{:#}", err).contains("broken.yaml"));
}

#[test]
fn shipped_config_matches_defaults_except_retry_delay() {
    let raw = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/config/soulflow.yaml"))
        .unwrap();
    let shipped = Config::from_yaml(&raw).unwrap();
    let mut expected = Config::default();
    expected.retry.base_delay_ms = 250;
    assert_eq!(shipped, expected);
}

#[test]
fn empty_document_is_all_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    fs::write(&path, "{}\n").unwrap();

    let loaded = tokio_test::block_on(load_config(Some(&path))).unwrap();
    assert!(loaded.from_file);
    assert_eq!(loaded.config, Config::default());
}
