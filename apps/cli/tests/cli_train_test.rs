//! Integration tests for the `ferrule-cli train` command.

use assert_cmd::Command;
use predicates::prelude::*;
use regex::Regex;
use std::path::Path;
use tempfile::TempDir;

const SM_VARS: &[&str] = &[
    "SM_CHANNEL_TRAIN",
    "SM_CHANNEL_VALIDATION",
    "SM_CHANNEL_EVAL",
    "SM_MODEL_DIR",
    "SM_OUTPUT_DATA_DIR",
    "SM_NUM_GPUS",
    "SM_NUM_CPUS",
    "SM_HOSTS",
    "SM_CURRENT_HOST",
    "SM_TRAINING_ENV",
];

const CHANNEL_ARGS: [&str; 6] = [
    "--train",
    "./data/train",
    "--validation",
    "./data/validation",
    "--eval",
    "./data/eval",
];

/// Command with no platform variables leaking in from the test environment.
fn ferrule(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ferrule-cli").unwrap();
    cmd.current_dir(dir);
    for var in SM_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Write train/validation/eval channels of two separable clusters.
fn write_data(root: &Path) {
    for channel in ["train", "validation", "eval"] {
        let dir = root.join("data").join(channel);
        std::fs::create_dir_all(&dir).unwrap();
        let mut rows = String::new();
        for i in 0..12 {
            let j = f64::from(i) * 0.05;
            rows.push_str(&format!("{{\"features\":[{},{}],\"label\":0}}\n", 1.0 + j, -1.0));
            rows.push_str(&format!("{{\"features\":[{},{}],\"label\":1}}\n", -1.0 - j, 1.0));
        }
        std::fs::write(dir.join("part-0.jsonl"), rows).unwrap();
    }
}

#[test]
fn test_train_local_arguments_single_epoch() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());

    let output = ferrule(temp.path())
        .arg("train")
        .args(CHANNEL_ARGS)
        .args(["--epochs", "1"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let epoch_lines: Vec<&str> = stdout.lines().filter(|l| l.starts_with("Epoch ")).collect();
    assert_eq!(epoch_lines.len(), 1);
    assert!(epoch_lines[0].starts_with("Epoch 1/1 - "));
    for key in ["loss", "acc", "val_loss", "val_acc"] {
        let re = Regex::new(&format!(r"\b{key}: ([0-9\.]+)")).unwrap();
        assert!(re.is_match(epoch_lines[0]), "{key} missing from {}", epoch_lines[0]);
    }

    assert!(temp.path().join("model/1/model.json").exists());
    assert!(temp.path().join("model/1/training_manifest.json").exists());
}

#[test]
fn test_train_from_environment() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());
    let p = |rel: &str| temp.path().join(rel).to_string_lossy().to_string();

    ferrule(temp.path())
        .env("SM_CHANNEL_TRAIN", p("data/train"))
        .env("SM_CHANNEL_VALIDATION", p("data/validation"))
        .env("SM_CHANNEL_EVAL", p("data/eval"))
        .env("SM_MODEL_DIR", p("opt-ml-model"))
        .env("SM_OUTPUT_DATA_DIR", p("opt-ml-output"))
        .args(["train", "--epochs", "2", "--checkpoint-dir", "ckpt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Epoch 2/2 - loss: "));

    assert!(temp.path().join("opt-ml-model/1/model.json").exists());
    assert!(temp.path().join("opt-ml-output/metrics.json").exists());
    assert!(temp.path().join("ckpt/checkpoint-0002.json").exists());
}

#[test]
fn test_train_missing_channel_fails_before_training() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());

    ferrule(temp.path())
        .args(["train", "--train", "./data/train", "--validation", "./data/validation"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Epoch").not())
        .stderr(predicate::str::contains("eval (--eval or SM_CHANNEL_EVAL)"));

    assert!(!temp.path().join("model").exists());
}

#[test]
fn test_train_reports_every_missing_channel() {
    let temp = TempDir::new().unwrap();

    ferrule(temp.path())
        .arg("train")
        .assert()
        .failure()
        .stderr(predicate::str::contains("train (--train or SM_CHANNEL_TRAIN)"))
        .stderr(predicate::str::contains("validation (--validation or SM_CHANNEL_VALIDATION)"))
        .stderr(predicate::str::contains("eval (--eval or SM_CHANNEL_EVAL)"));
}

#[test]
fn test_train_invalid_value_names_parameter() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());

    ferrule(temp.path())
        .arg("train")
        .args(CHANNEL_ARGS)
        .args(["--epochs", "ten"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value \"ten\" for epochs: expected integer"));
}

#[test]
fn test_train_argument_overrides_environment() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());

    ferrule(temp.path())
        .env("SM_CHANNEL_TRAIN", "/does/not/exist")
        .arg("train")
        .args(CHANNEL_ARGS)
        .args(["--epochs", "1", "--model-dir", "out"])
        .assert()
        .success();

    assert!(temp.path().join("out/1/model.json").exists());
}

#[test]
fn test_train_malformed_data_exits_non_zero_without_artifact() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());
    std::fs::write(temp.path().join("data/train/part-1.jsonl"), "{\"features\": oops}\n").unwrap();

    ferrule(temp.path())
        .arg("train")
        .args(CHANNEL_ARGS)
        .assert()
        .failure()
        .stderr(predicate::str::contains("train channel"));

    assert!(!temp.path().join("model/1").exists());
}

#[test]
fn test_train_hyperparameter_file() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());
    let body = r#"{"epochs": "3", "optimizer": "rmsprop"}"#;
    std::fs::write(temp.path().join("hp.json"), body).unwrap();

    let output = ferrule(temp.path())
        .arg("train")
        .args(CHANNEL_ARGS)
        .args(["--config", "hp.json", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().filter(|l| l.starts_with("Epoch ")).count(), 3);

    let json_start = stdout.find('{').unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(manifest["hyperparams"]["optimizer"], "rmsprop");
    assert_eq!(manifest["model_version"], 1);
}

#[test]
fn test_train_missing_config_file_names_parameter_and_path() {
    let temp = TempDir::new().unwrap();
    write_data(temp.path());

    ferrule(temp.path())
        .arg("train")
        .args(CHANNEL_ARGS)
        .args(["--config", "missing-hp.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Epoch").not())
        .stderr(predicate::str::contains("invalid value \"missing-hp.json\" for config"));

    assert!(!temp.path().join("model").exists());
}
