//! `flake archive` integration tests.

use std::path::Path;

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::TestEnv;

fn two_inputs(env: &TestEnv) -> std::path::PathBuf {
  for name in ["a", "b"] {
    env.write_flake(name, json!({}), json!({}));
    env.write_file(&format!("{}/data", name), name);
  }
  env.write_flake("top", json!({ "a": "path:../a", "b": "path:../b" }), json!({}))
}

fn base_name(printed: &Value) -> String {
  Path::new(printed.as_str().unwrap())
    .file_name()
    .unwrap()
    .to_string_lossy()
    .into_owned()
}

#[test]
fn dry_run_reports_paths_without_opening_destination() {
  let env = TestEnv::new();
  let top = two_inputs(&env);

  // Opening this store would fail.
  let output = env
    .flake_cmd()
    .args(["archive", "--dry-run", "--json", "--to", "s3://bucket"])
    .arg(&top)
    .output()
    .unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

  let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
  let inputs = doc["inputs"].as_object().unwrap();
  assert_eq!(inputs.len(), 2);
  assert!(doc["path"].as_str().unwrap().ends_with("-source"));
  assert_ne!(inputs["a"]["path"], inputs["b"]["path"]);
}

#[test]
fn copies_sources_to_destination_store() {
  let env = TestEnv::new();
  let top = two_inputs(&env);
  let dest = env.dir("dest");

  let output = env
    .flake_cmd()
    .args(["archive", "--json", "--to"])
    .arg(&dest)
    .arg(&top)
    .output()
    .unwrap();
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

  let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(dest.join(base_name(&doc["path"])).exists());
  for input in ["a", "b"] {
    assert!(dest.join(base_name(&doc["inputs"][input]["path"])).exists());
  }
}

#[test]
fn unsupported_destination_fails() {
  let env = TestEnv::new();
  let top = two_inputs(&env);

  env
    .flake_cmd()
    .args(["archive", "--to", "s3://bucket"])
    .arg(&top)
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported store URI 's3://bucket'"));
}

#[test]
fn without_destination_prints_store_paths() {
  let env = TestEnv::new();
  let top = two_inputs(&env);

  let output = env.flake_cmd().arg("archive").arg(&top).output().unwrap();
  assert!(output.status.success());
  let stdout = String::from_utf8(output.stdout).unwrap();
  assert_eq!(stdout.lines().count(), 3, "{}", stdout);
  assert!(stdout.lines().all(|line| line.ends_with("-source")));
}
