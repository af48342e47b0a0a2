//! `flake init` and `flake clone` integration tests.

use predicates::prelude::*;
use serde_json::json;

use super::common::{SYSTEM, TestEnv};

#[test]
fn init_writes_template_that_checks() {
  let env = TestEnv::new();
  let dir = env.dir("new");

  env
    .flake_cmd()
    .args(["init", "--dir"])
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("flake.json"));

  let content = std::fs::read_to_string(dir.join("flake.json")).unwrap();
  assert!(content.contains(SYSTEM));

  env.flake_cmd().args(["check", "--no-build"]).arg(&dir).assert().success();
}

#[test]
fn init_defaults_to_current_directory() {
  let env = TestEnv::new();
  let dir = env.dir("here");

  env.flake_cmd().arg("init").current_dir(&dir).assert().success();
  assert!(dir.join("flake.json").exists());
}

#[test]
fn init_refuses_to_overwrite() {
  let env = TestEnv::new();
  env.write_file("existing/flake.json", "{}");

  env
    .flake_cmd()
    .args(["init", "--dir"])
    .arg(env.dir("existing"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));

  let content = std::fs::read_to_string(env.dir("existing").join("flake.json")).unwrap();
  assert_eq!(content, "{}");
}

#[test]
fn clone_requires_dest() {
  let env = TestEnv::new();

  env
    .flake_cmd()
    .arg("clone")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("missing flag '--dest'"));
}

#[test]
fn clone_copies_path_flake() {
  let env = TestEnv::new();
  let source = env.write_flake("source", json!({}), json!({}));
  env.write_file("source/data", "payload");
  let dest = env.temp.path().join("copy");

  env
    .flake_cmd()
    .arg("clone")
    .arg(&source)
    .arg("--dest")
    .arg(&dest)
    .assert()
    .success();

  assert!(dest.join("flake.json").exists());
  assert_eq!(std::fs::read_to_string(dest.join("data")).unwrap(), "payload");
}

#[test]
fn clone_refuses_existing_destination() {
  let env = TestEnv::new();
  let source = env.write_flake("source", json!({}), json!({}));

  env
    .flake_cmd()
    .arg("clone")
    .arg(&source)
    .arg("--dest")
    .arg(env.dir("taken"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));
}
