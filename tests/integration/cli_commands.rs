#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn init_doc(dir: &Path, objects: usize) -> PathBuf {
    let path = dir.join("sample.docg");
    cargo_bin_cmd!("docgraph")
        .arg("init")
        .arg(&path)
        .args(["--objects", &objects.to_string()])
        .assert()
        .success();
    path
}

fn json_output(args: &[&str], path: Option<&Path>) -> Value {
    let mut cmd = cargo_bin_cmd!("docgraph");
    cmd.args(["--format", "json"]).args(args);
    if let Some(path) = path {
        cmd.arg(path);
    }
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn init_writes_a_verifiable_document() {
    let dir = TempDir::new().expect("tempdir");
    let path = init_doc(dir.path(), 2);
    assert!(path.exists());

    let json = json_output(&["verify"], Some(&path));
    assert_eq!(json["success"], Value::Bool(true));
    assert_eq!(json["counts"]["OB"], 3);
    assert_eq!(json["rewrite_stable"], Value::Bool(true));
}

#[test]
fn inspect_lists_blocks() {
    let dir = TempDir::new().expect("tempdir");
    let path = init_doc(dir.path(), 1);
    let json = json_output(&["inspect"], Some(&path));
    assert_eq!(json["format_version"], 1);
    assert!(json["checksum"].is_string());
    let blocks = json["blocks"].as_array().expect("blocks");
    assert_eq!(blocks[0]["code"], "SC");
    assert_eq!(blocks[0]["id_name"], "Scene");
    let catalog = json["catalog"].as_array().expect("catalog");
    assert!(catalog.iter().any(|s| s["name"] == "Vertex"));
}

#[test]
fn verify_flags_corruption_with_exit_code() {
    let dir = TempDir::new().expect("tempdir");
    let path = init_doc(dir.path(), 1);
    let mut bytes = fs::read(&path).expect("read");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    fs::write(&path, bytes).expect("write");

    cargo_bin_cmd!("docgraph")
        .arg("verify")
        .arg(&path)
        .assert()
        .code(2);
}

#[test]
fn missing_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("docgraph")
        .arg("inspect")
        .arg(dir.path().join("absent.docg"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("document not found"));
}

#[test]
fn recover_copies_the_configured_autosave() {
    let dir = TempDir::new().expect("tempdir");
    let autosave = init_doc(dir.path(), 1);
    let config = dir.path().join("config.toml");
    fs::write(&config, format!("[autosave]\npath = {:?}\n", autosave)).expect("config");
    let dest = dir.path().join("recovered.docg");

    let output = cargo_bin_cmd!("docgraph")
        .env("DOCGRAPH_CONFIG", &config)
        .args(["--format", "json", "recover"])
        .arg(&dest)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["verify"]["success"], Value::Bool(true));
    assert_eq!(fs::read(&dest).expect("dest"), fs::read(&autosave).expect("src"));
}

#[test]
fn recover_refuses_a_damaged_autosave() {
    let dir = TempDir::new().expect("tempdir");
    let autosave = init_doc(dir.path(), 1);
    let bytes = fs::read(&autosave).expect("read");
    fs::write(&autosave, &bytes[..bytes.len() / 3]).expect("truncate");
    let dest = dir.path().join("recovered.docg");

    cargo_bin_cmd!("docgraph")
        .arg("recover")
        .arg(&dest)
        .arg("--from")
        .arg(&autosave)
        .assert()
        .failure();
    assert!(!dest.exists());
}

#[test]
fn undo_demo_round_trips_history() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("absent.toml");
    let output = cargo_bin_cmd!("docgraph")
        .env("DOCGRAPH_CONFIG", &config)
        .args(["--format", "json", "undo-demo", "--edits", "4"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["undone"], 5);
    assert_eq!(json["redone"], 5);
    assert_eq!(json["restored_original"], Value::Bool(true));
    assert_eq!(json["restored_latest"], Value::Bool(true));
    let pushes = json["pushes"].as_array().expect("pushes");
    assert_eq!(pushes.len(), 5);
    assert!(pushes[1]["append"]["identical_chunks"].as_u64().unwrap_or(0) > 0);
}

#[test]
fn undo_demo_respects_step_limit() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("absent.toml");
    let output = cargo_bin_cmd!("docgraph")
        .env("DOCGRAPH_CONFIG", &config)
        .args(["--format", "json", "undo-demo", "--edits", "6", "--steps", "3"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["history"].as_array().expect("history").len(), 3);
    assert_eq!(json["undone"], 2);
    assert_eq!(json["restored_original"], Value::Bool(false));
}

#[test]
fn completions_are_generated() {
    let output = cargo_bin_cmd!("docgraph")
        .args(["completions", "bash"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("docgraph"));
}
