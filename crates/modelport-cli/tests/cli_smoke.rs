use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn modelport() -> Command {
    let mut cmd = Command::cargo_bin("modelport").unwrap();
    cmd.env_remove("RUST_LOG").arg("--log-level").arg("warn");
    cmd
}

fn write_raw(dir: &Path, name: &str, values: &[f32]) -> PathBuf {
    let path = dir.join(name);
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(&path, bytes).unwrap();
    path
}

fn write_skeleton(dir: &Path) -> PathBuf {
    let path = dir.join("model.toml");
    std::fs::write(
        &path,
        r#"
[[layers]]
name = "linear"
type = "linear"
in_features = 10
out_features = 10

[[layers]]
name = "relu"
type = "relu"
"#,
    )
    .unwrap();
    path
}

/// Pack a 10x10 linear layer, with `bias_len` bias elements on disk.
fn pack_linear(dir: &Path, bias_len: usize) -> PathBuf {
    let weight: Vec<f32> = (0..100).map(|i| ((i * 7 % 23) as f32 - 11.0) * 0.03).collect();
    let bias: Vec<f32> = (0..bias_len).map(|i| i as f32 * 0.05 - 0.2).collect();
    let w = write_raw(dir, "w.raw", &weight);
    let b = write_raw(dir, "b.raw", &bias);
    let archive = dir.join("model.bin");

    // pack validates the declared shape, so a short bias is written under a
    // matching shape and only fails later against the skeleton
    modelport()
        .arg("pack")
        .arg(&archive)
        .arg("--tensor")
        .arg(format!("linear.weight={}:float32:10x10", w.display()))
        .arg("--tensor")
        .arg(format!("linear.bias={}:float32:{bias_len}", b.display()))
        .assert()
        .success();
    archive
}

#[test]
fn help_works() {
    modelport().arg("--help").assert().success();
}

#[test]
fn version_works() {
    modelport().arg("--version").assert().success();
}

#[test]
fn invalid_command_fails() {
    modelport().arg("definitely-not-a-command").assert().failure();
}

#[test]
fn help_mentions_subcommands() {
    let out = modelport().arg("--help").assert().success().get_output().stdout.clone();
    let s = String::from_utf8(out).unwrap();
    for needle in ["inspect", "pack", "verify", "--config"] {
        assert!(s.contains(needle), "help missing `{needle}`");
    }
}

#[test]
fn pack_then_inspect_lists_keys() {
    let dir = TempDir::new().unwrap();
    let archive = pack_linear(dir.path(), 10);

    let out = modelport().arg("inspect").arg(&archive).arg("--json").assert().success().get_output().stdout.clone();
    let entries: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    let bias = entries.iter().find(|e| e["key"] == "linear.bias").unwrap();
    assert_eq!(bias["size"], 40);

    modelport().arg("inspect").arg(&archive).assert().success().stdout(predicate::str::contains("linear.weight"));
}

#[test]
fn pack_rejects_buffer_that_does_not_fit_shape() {
    let dir = TempDir::new().unwrap();
    let b = write_raw(dir.path(), "b.raw", &[0.0; 9]);
    modelport()
        .arg("pack")
        .arg(dir.path().join("bad.bin"))
        .arg("--tensor")
        .arg(format!("linear.bias={}:float32:10", b.display()))
        .assert()
        .failure();
}

#[test]
fn inspect_missing_archive_exits_with_reconstruct_code() {
    let dir = TempDir::new().unwrap();
    modelport().arg("inspect").arg(dir.path().join("absent.bin")).assert().code(3);
}

#[test]
fn verify_passes_and_writes_receipt() {
    let dir = TempDir::new().unwrap();
    let archive = pack_linear(dir.path(), 10);
    let skeleton = write_skeleton(dir.path());
    let out_dir = dir.path().join("out");
    let receipt = dir.path().join("parity.json");

    modelport()
        .arg("verify")
        .arg("--archive")
        .arg(&archive)
        .arg("--skeleton")
        .arg(&skeleton)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--receipt")
        .arg(&receipt)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("3/3 representations passed"));

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&receipt).unwrap()).unwrap();
    assert_eq!(json["summary"]["all_passed"], true);
    assert_eq!(json["rows"].as_array().unwrap().len(), 3);
    assert!(out_dir.join("model.trace.json").is_file());
    assert!(out_dir.join("model.graph.json").is_file());
}

#[test]
fn verify_only_subset_as_json() {
    let dir = TempDir::new().unwrap();
    let archive = pack_linear(dir.path(), 10);
    let skeleton = write_skeleton(dir.path());

    let out = modelport()
        .arg("verify")
        .arg("--archive")
        .arg(&archive)
        .arg("--skeleton")
        .arg(&skeleton)
        .arg("--out-dir")
        .arg(dir.path().join("out"))
        .arg("--only")
        .arg("graph")
        .arg("--json")
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = json["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["representation"], "graph");
}

#[test]
fn truncated_bias_exits_with_reconstruct_code() {
    let dir = TempDir::new().unwrap();
    let archive = pack_linear(dir.path(), 9);
    let skeleton = write_skeleton(dir.path());
    let out_dir = dir.path().join("out");

    modelport()
        .arg("verify")
        .arg("--archive")
        .arg(&archive)
        .arg("--skeleton")
        .arg(&skeleton)
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("linear.bias"));
    assert!(!out_dir.exists());
}

#[test]
fn bad_flag_value_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    let archive = pack_linear(dir.path(), 10);
    let skeleton = write_skeleton(dir.path());

    modelport()
        .arg("verify")
        .arg("--archive")
        .arg(&archive)
        .arg("--skeleton")
        .arg(&skeleton)
        .arg("--only")
        .arg("onnx")
        .assert()
        .code(2);
}
