//! `flake list-inputs`, `flake update` and `flake info` integration tests.

use std::path::PathBuf;

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::TestEnv;

/// `top` with inputs `a` and `b`; `a` has an input `c` of its own.
fn nested_inputs(env: &TestEnv) -> PathBuf {
  env.write_flake("c", json!({}), json!({}));
  env.write_flake("a", json!({ "c": "path:../c" }), json!({}));
  env.write_flake("b", json!({}), json!({}));
  env.write_flake("top", json!({ "a": "path:../a", "b": "path:../b" }), json!({}))
}

#[test]
fn list_inputs_renders_tree() {
  let env = TestEnv::new();
  let top = nested_inputs(&env);

  let output = env.flake_cmd().arg("list-inputs").arg(&top).output().unwrap();
  assert!(output.status.success());

  let stdout = String::from_utf8(output.stdout).unwrap();
  let lines: Vec<&str> = stdout.lines().collect();
  assert_eq!(lines.len(), 4, "{}", stdout);
  assert!(lines[0].starts_with("path:"));
  assert!(lines[1].starts_with("├───a: path:"), "{}", stdout);
  assert!(lines[2].starts_with("│   └───c: path:"), "{}", stdout);
  assert!(lines[3].starts_with("└───b: path:"), "{}", stdout);

  assert!(top.join("flake.lock").exists());
}

#[test]
fn list_inputs_json_nests_inputs() {
  let env = TestEnv::new();
  let top = nested_inputs(&env);

  let output = env
    .flake_cmd()
    .args(["list-inputs", "--json"])
    .arg(&top)
    .output()
    .unwrap();
  assert!(output.status.success());

  let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert!(doc["a"]["url"].as_str().unwrap().starts_with("path:"));
  assert_eq!(doc["a"]["locked"]["type"], "path");
  assert!(doc["a"]["inputs"]["c"].is_object());
  assert_eq!(doc["b"]["inputs"], json!({}));
}

#[test]
fn update_rewrites_lock_file() {
  let env = TestEnv::new();
  let top = nested_inputs(&env);

  env.flake_cmd().arg("list-inputs").arg(&top).assert().success();
  let before = std::fs::read_to_string(top.join("flake.lock")).unwrap();

  env.write_file("b/data", "changed");
  env
    .flake_cmd()
    .arg("update")
    .arg(&top)
    .assert()
    .success()
    .stdout(predicate::str::contains("updated 2 input(s)"));

  let after = std::fs::read_to_string(top.join("flake.lock")).unwrap();
  assert_ne!(before, after);
}

#[test]
fn info_prints_urls_and_path() {
  let env = TestEnv::new();
  let dir = env.write_flake("flake", json!({}), json!({}));

  env
    .flake_cmd()
    .arg("info")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("Resolved URL:  path:"))
    .stdout(predicate::str::contains("Locked URL:    path:"))
    .stdout(predicate::str::contains("Description:   test flake"))
    .stdout(predicate::str::contains("-source"));
}

#[test]
fn info_json_has_locked_reference() {
  let env = TestEnv::new();
  let dir = env.write_flake("flake", json!({}), json!({}));

  let output = env
    .flake_cmd()
    .args(["info", "--json"])
    .arg(&dir)
    .output()
    .unwrap();
  assert!(output.status.success());

  let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(doc["description"], "test flake");
  assert_eq!(doc["locked"]["type"], "path");
  assert!(doc["locked"]["narHash"].is_string());
  assert!(doc["path"].as_str().unwrap().ends_with("-source"));
}

#[test]
fn missing_manifest_is_an_error() {
  let env = TestEnv::new();
  let dir = env.dir("empty");

  env
    .flake_cmd()
    .arg("info")
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("does not contain a 'flake.json' file"));
}
