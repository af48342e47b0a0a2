//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{Value, json};
use tempfile::TempDir;

pub const SYSTEM: &str = "x86_64-linux";

/// A derivation with no builder; realising it only creates `$out`.
pub fn trivial_derivation(name: &str) -> Value {
  json!({ "type": "derivation", "name": name, "system": SYSTEM })
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with isolated store, registry
/// and cache paths.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// A directory relative to the temp directory, created and canonicalized.
  pub fn dir(&self, relative_path: &str) -> PathBuf {
    let p = self.temp.path().join(relative_path);
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Write a `flake.json` into `relative_dir` and return the directory.
  pub fn write_flake(&self, relative_dir: &str, inputs: Value, outputs: Value) -> PathBuf {
    let doc = json!({ "description": "test flake", "inputs": inputs, "outputs": outputs });
    self.write_file(
      &format!("{}/flake.json", relative_dir),
      &serde_json::to_string_pretty(&doc).unwrap(),
    );
    self.dir(relative_dir)
  }

  pub fn store_path(&self) -> PathBuf {
    self.dir("store")
  }

  pub fn user_registry(&self) -> PathBuf {
    self.dir("config").join("registry.json")
  }

  /// Get a pre-configured Command for the flake binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `FLAKES_STORE`: Isolated store
  /// - `FLAKES_SYSTEM`: Fixed evaluation platform
  /// - `FLAKES_USER_REGISTRY` / `FLAKES_SYSTEM_REGISTRY`: Isolated registries
  /// - `XDG_CONFIG_HOME` / `XDG_CACHE_HOME` / `XDG_DATA_HOME`: Isolated defaults
  pub fn flake_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("flake");
    cmd.env("FLAKES_STORE", self.store_path());
    cmd.env("FLAKES_SYSTEM", SYSTEM);
    cmd.env("FLAKES_USER_REGISTRY", self.user_registry());
    cmd.env("FLAKES_SYSTEM_REGISTRY", self.dir("etc").join("registry.json"));
    cmd.env_remove("FLAKES_GLOBAL_REGISTRY");
    cmd.env_remove("RUST_LOG");
    cmd.env("XDG_CONFIG_HOME", self.dir("config"));
    cmd.env("XDG_CACHE_HOME", self.dir("cache"));
    cmd.env("XDG_DATA_HOME", self.dir("data"));
    cmd
  }
}
