//! Registry command integration tests.

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::TestEnv;

fn registry_doc(env: &TestEnv) -> Value {
  serde_json::from_str(&std::fs::read_to_string(env.user_registry()).unwrap()).unwrap()
}

#[test]
fn add_is_idempotent() {
  let env = TestEnv::new();
  let target = env.write_flake("foo", json!({}), json!({}));
  let to = format!("path:{}", target.display());

  for _ in 0..2 {
    env.flake_cmd().args(["add", "flake:foo"]).arg(&to).assert().success();
  }

  let doc = registry_doc(&env);
  let flakes = doc["flakes"].as_array().unwrap();
  assert_eq!(flakes.len(), 1);
  assert_eq!(flakes[0]["from"], json!({ "type": "indirect", "id": "foo" }));
  assert_eq!(flakes[0]["to"]["path"], target.to_string_lossy().as_ref());
}

#[test]
fn list_shows_tier_and_urls() {
  let env = TestEnv::new();
  let target = env.write_flake("foo", json!({}), json!({}));
  let to = format!("path:{}", target.display());
  env.flake_cmd().args(["add", "flake:foo"]).arg(&to).assert().success();

  env
    .flake_cmd()
    .args(["--override-flake", "flake:bar"])
    .arg(&to)
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("flags  flake:bar {}", to)))
    .stdout(predicate::str::contains(format!("user   flake:foo {}", to)));
}

#[test]
fn remove_deletes_entry() {
  let env = TestEnv::new();
  env.flake_cmd().args(["add", "flake:foo", "path:/src/foo"]).assert().success();
  env.flake_cmd().args(["remove", "flake:foo"]).assert().success();

  env
    .flake_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("flake:foo").not());
}

#[test]
fn indirect_reference_resolves_through_registry() {
  let env = TestEnv::new();
  let target = env.write_flake("foo", json!({}), json!({}));
  let to = format!("path:{}", target.display());
  env.flake_cmd().args(["add", "foo"]).arg(&to).assert().success();

  env
    .flake_cmd()
    .args(["info", "foo"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("Resolved URL:  {}", to)));

  env
    .flake_cmd()
    .args(["--no-registries", "info", "foo"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("registry lookups are not allowed"));
}

#[test]
fn pin_records_locked_reference() {
  let env = TestEnv::new();
  let target = env.write_flake("foo", json!({}), json!({}));
  let to = format!("path:{}", target.display());
  env.flake_cmd().args(["add", "flake:foo"]).arg(&to).assert().success();

  env
    .flake_cmd()
    .args(["pin", "flake:foo"])
    .assert()
    .success()
    .stdout(predicate::str::contains("narHash="));

  let doc = registry_doc(&env);
  let flakes = doc["flakes"].as_array().unwrap();
  assert_eq!(flakes.len(), 1);
  assert!(flakes[0]["to"]["narHash"].is_string());
}
