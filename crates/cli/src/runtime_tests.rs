// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const CONFIG_JSON: &str = r#"{
    "projectID": "proj",
    "triggerBucket": "file:///tmp/wr-trigger",
    "rulesURL": "file:///tmp/wr-rules",
    "batchBase": "file:///tmp/wr-trigger/batch",
    "loadProcessPrefix": "loadProcess",
    "postJobPrefix": "postJob",
    "batchPrefix": "batch",
    "journalURL": "file:///tmp/wr-journal",
    "errorURL": "file:///tmp/wr-errors"
}"#;

#[test]
#[serial_test::serial]
fn explicit_path_wins_over_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, CONFIG_JSON).unwrap();
    std::env::set_var(CONFIG_ENV_KEY, "/nonexistent.json");

    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.project_id, "proj");
    std::env::remove_var(CONFIG_ENV_KEY);
}

#[test]
#[serial_test::serial]
fn env_accepts_inline_json() {
    std::env::set_var(CONFIG_ENV_KEY, CONFIG_JSON);
    let config = load_config(None).unwrap();
    assert_eq!(config.trigger_bucket, "file:///tmp/wr-trigger");
    std::env::remove_var(CONFIG_ENV_KEY);
}

#[test]
#[serial_test::serial]
fn env_accepts_a_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, CONFIG_JSON).unwrap();
    std::env::set_var(CONFIG_ENV_KEY, path.display().to_string());

    let config = load_config(None).unwrap();
    assert_eq!(config.project_id, "proj");
    std::env::remove_var(CONFIG_ENV_KEY);
}

#[test]
#[serial_test::serial]
fn missing_config_is_an_error() {
    std::env::remove_var(CONFIG_ENV_KEY);
    assert!(load_config(None).is_err());
}

#[tokio::test]
#[serial_test::serial]
async fn service_cell_reuses_unless_run_once() {
    let config: Config = Config::from_json(CONFIG_JSON).unwrap();
    let first = service(config.clone());
    let second = service(config.clone());
    assert!(Arc::ptr_eq(&first, &second));

    let mut run_once = config;
    run_once.run_once = true;
    let fresh = service(run_once);
    assert!(!Arc::ptr_eq(&first, &fresh));
}
