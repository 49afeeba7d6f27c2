//! Integration tests for the `config` and `metrics` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ferrule(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("ferrule-cli").unwrap();
    cmd.current_dir(dir);
    for var in [
        "SM_CHANNEL_TRAIN",
        "SM_CHANNEL_VALIDATION",
        "SM_CHANNEL_EVAL",
        "SM_MODEL_DIR",
        "SM_CURRENT_HOST",
        "SM_TRAINING_ENV",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_config_json_shows_origins() {
    let temp = TempDir::new().unwrap();

    let output = ferrule(temp.path())
        .env("SM_CHANNEL_EVAL", "/opt/ml/input/eval")
        .args(["config", "--json", "--train", "./data/train", "--validation", "./data/validation"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["context"], "local");
    let params = json["parameters"].as_array().unwrap();
    let find = |name: &str| params.iter().find(|p| p["name"] == name).unwrap().clone();

    assert_eq!(find("train")["value"], "./data/train");
    assert_eq!(find("train")["origin"]["source"], "argument");
    assert_eq!(find("eval")["value"], "/opt/ml/input/eval");
    assert_eq!(find("eval")["origin"]["detail"], "SM_CHANNEL_EVAL");
    assert_eq!(find("epochs")["origin"]["source"], "default");
    assert!(json["error"].is_null());
}

#[test]
fn test_config_unresolved_exits_non_zero() {
    let temp = TempDir::new().unwrap();

    ferrule(temp.path())
        .arg("config")
        .assert()
        .failure()
        .stdout(predicate::str::contains("SM_CHANNEL_TRAIN"))
        .stderr(predicate::str::contains("missing required configuration"));
}

#[test]
fn test_config_detects_managed_context() {
    let temp = TempDir::new().unwrap();

    ferrule(temp.path())
        .env("SM_CURRENT_HOST", "algo-1")
        .env("SM_HOSTS", "[\"algo-1\"]")
        .args(["config", "--json", "--train", "t", "--validation", "v", "--eval", "e"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"context\": \"managed\""))
        .stdout(predicate::str::contains("/opt/ml/checkpoints"));
}

#[test]
fn test_metrics_definitions() {
    let temp = TempDir::new().unwrap();

    let output = ferrule(temp.path()).arg("metrics").output().unwrap();
    assert!(output.status.success());

    let defs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> =
        defs.as_array().unwrap().iter().map(|d| d["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["loss", "acc", "val_loss", "val_acc"]);
}
