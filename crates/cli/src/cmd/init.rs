//! Implementation of the `flake init` command.

use std::path::Path;

use anyhow::{Context, Result};

use flakes_lib::init::{InitOptions, init};
use flakes_lib::settings::Settings;

use crate::output::print_success;

/// Write a template `flake.json` into `dir`.
///
/// # Errors
///
/// Returns an error if `flake.json` already exists or cannot be written.
pub fn cmd_init(settings: &Settings, dir: &Path) -> Result<()> {
  let options = InitOptions {
    dir: dir.to_path_buf(),
    system: settings.system.clone(),
  };

  let manifest = init(&options).context("Failed to initialize flake")?;
  print_success(&format!("wrote {}", manifest.display()));
  Ok(())
}
