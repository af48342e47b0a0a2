//! Test utilities for flakes-lib.
//!
//! Cross-platform helpers for tests that declare derivation builders, plus a
//! small builder for manifest documents.

use std::path::Path;

use serde_json::{Value, json};

/// Returns the builder and args that run a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// A derivation expression whose builder creates `$out` and then runs `script`.
#[cfg(unix)]
pub fn derivation(name: &str, system: &str, script: &str) -> Value {
  let (builder, args) = shell_cmd(&format!("mkdir -p \"$out\" && {}", script));
  json!({
    "type": "derivation",
    "name": name,
    "system": system,
    "builder": builder,
    "args": args,
  })
}

#[cfg(windows)]
pub fn derivation(name: &str, system: &str, script: &str) -> Value {
  let (builder, args) = shell_cmd(&format!("mkdir \"%out%\" && {}", script));
  json!({
    "type": "derivation",
    "name": name,
    "system": system,
    "builder": builder,
    "args": args,
  })
}

/// A derivation expression with no builder; realising it only creates `$out`.
pub fn trivial_derivation(name: &str, system: &str) -> Value {
  json!({ "type": "derivation", "name": name, "system": system })
}

/// Write a `flake.json` with the given outputs (and optional inputs) into `dir`.
pub fn write_manifest(dir: &Path, inputs: Value, outputs: Value) {
  let doc = json!({ "description": "test flake", "inputs": inputs, "outputs": outputs });
  std::fs::write(
    dir.join(crate::consts::MANIFEST_FILENAME),
    serde_json::to_string_pretty(&doc).unwrap(),
  )
  .unwrap();
}
