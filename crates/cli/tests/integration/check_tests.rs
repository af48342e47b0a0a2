//! `flake check` integration tests.

use predicates::prelude::*;
use serde_json::json;

use super::common::{SYSTEM, TestEnv, trivial_derivation};

#[test]
fn valid_flake_passes_and_builds_checks() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "checks": { SYSTEM: { "foo": trivial_derivation("foo") } } }),
  );

  env
    .flake_cmd()
    .arg("check")
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("is valid (1 path(s) built)"));
}

#[test]
fn non_derivation_check_fails_with_path() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "checks": { SYSTEM: { "foo": "hello" } } }),
  );

  env
    .flake_cmd()
    .arg("check")
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("while checking flake output 'checks':"))
    .stderr(predicate::str::contains(
      "flake attribute 'checks.x86_64-linux.foo' is not a derivation",
    ));
}

#[test]
fn overlay_with_destructured_argument_fails() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({
      "overlay": {
        "$lambda": { "formals": ["final", "prev"], "ellipsis": false },
        "body": {}
      }
    }),
  );

  env
    .flake_cmd()
    .args(["check", "--no-build"])
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("overlay does not take an argument named 'final'"));
}

#[test]
fn curried_overlay_passes() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({
      "overlay": { "$lambda": "final", "body": { "$lambda": "prev", "body": {} } }
    }),
  );

  env.flake_cmd().args(["check", "--no-build"]).arg(&dir).assert().success();
}

#[test]
fn module_option_error_is_framed() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "nixosModules": { "foo": { "foo": { "$throw": "option exploded" } } } }),
  );

  env
    .flake_cmd()
    .args(["check", "--no-build"])
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("while checking the NixOS module 'nixosModules.foo'"))
    .stderr(predicate::str::contains("while evaluating the option 'foo'"))
    .stderr(predicate::str::contains("option exploded"));
}

#[test]
fn no_build_writes_no_derivations() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({ "checks": { SYSTEM: { "foo": trivial_derivation("foo") } } }),
  );

  env
    .flake_cmd()
    .args(["check", "--no-build"])
    .arg(&dir)
    .assert()
    .success();

  let drvs: Vec<_> = std::fs::read_dir(env.store_path())
    .unwrap()
    .filter_map(|entry| entry.ok())
    .filter(|entry| entry.file_name().to_string_lossy().ends_with(".drv"))
    .collect();
  assert!(drvs.is_empty(), "unexpected derivations: {:?}", drvs);
}

#[test]
#[cfg(unix)]
fn failing_builder_reports_exit_code() {
  let env = TestEnv::new();
  let dir = env.write_flake(
    "flake",
    json!({}),
    json!({
      "checks": {
        SYSTEM: {
          "broken": {
            "type": "derivation",
            "name": "broken",
            "system": SYSTEM,
            "builder": "/bin/sh",
            "args": ["-c", "exit 3"]
          }
        }
      }
    }),
  );

  env
    .flake_cmd()
    .arg("check")
    .arg(&dir)
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed with exit code 3"));
}

#[test]
fn default_reference_is_current_directory() {
  let env = TestEnv::new();
  let dir = env.write_flake("flake", json!({}), json!({}));

  env
    .flake_cmd()
    .args(["check", "--no-build"])
    .current_dir(&dir)
    .assert()
    .success();
}
