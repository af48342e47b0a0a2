//! `flake show` integration tests.

use predicates::prelude::*;
use serde_json::{Value, json};

use super::common::{SYSTEM, TestEnv, trivial_derivation};

#[test]
fn text_output_labels_each_kind() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({
      "devShell": { SYSTEM: trivial_derivation("shell") },
      "checks": { SYSTEM: { "bar": trivial_derivation("bar") } },
      "lib": {}
    }),
  );

  env
    .flake_cmd()
    .arg("show")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::starts_with("path:"))
    .stdout(predicate::str::contains("│       └───bar: derivation 'bar'"))
    .stdout(predicate::str::contains(
      "│   └───x86_64-linux: development environment 'shell'",
    ))
    .stdout(predicate::str::contains("└───lib: unknown"));
}

#[test]
fn legacy_packages_are_omitted_unless_requested() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "legacyPackages": { SYSTEM: { "somePkg": trivial_derivation("some-pkg") } } }),
  );

  env
    .flake_cmd()
    .arg("show")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("x86_64-linux: omitted (use '--legacy' to show)"))
    .stdout(predicate::str::contains("somePkg").not());

  env
    .flake_cmd()
    .args(["show", "--legacy"])
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("somePkg: package 'some-pkg'"));
}

#[test]
fn omitted_legacy_packages_are_never_forced() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "legacyPackages": { SYSTEM: { "somePkg": { "$throw": "would fail" } } } }),
  );

  env
    .flake_cmd()
    .args(["show", "--no-eval-cache"])
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("omitted"));
}

#[test]
fn json_output_is_a_document() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "checks": { SYSTEM: { "foo": trivial_derivation("foo") } } }),
  );

  let output = env
    .flake_cmd()
    .args(["show", "--json"])
    .arg(&dir)
    .output()
    .unwrap();
  assert!(output.status.success());

  let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(doc["checks"][SYSTEM]["foo"]["type"], "derivation");
  assert_eq!(doc["checks"][SYSTEM]["foo"]["name"], "foo");
}

#[test]
fn evaluation_errors_abort_with_context() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "packages": { SYSTEM: { "x": { "$throw": "broken package" } } } }),
  );

  env
    .flake_cmd()
    .arg("show")
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("while evaluating the flake output 'packages.x86_64-linux.x'"))
    .stderr(predicate::str::contains("broken package"));
}

#[test]
fn cached_and_fresh_output_agree() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "packages": { SYSTEM: { "hello": trivial_derivation("hello") } } }),
  );

  let cached = env.flake_cmd().arg("show").arg(&dir).output().unwrap();
  let again = env.flake_cmd().arg("show").arg(&dir).output().unwrap();
  let fresh = env
    .flake_cmd()
    .args(["show", "--no-eval-cache"])
    .arg(&dir)
    .output()
    .unwrap();

  assert!(cached.status.success());
  assert_eq!(cached.stdout, again.stdout);
  assert_eq!(cached.stdout, fresh.stdout);
  assert!(std::fs::read_dir(env.dir("cache/flakes/eval-cache")).unwrap().count() > 0);
}
