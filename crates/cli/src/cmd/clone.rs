//! Implementation of the `flake clone` command.

use std::path::Path;

use anyhow::{Context, Result};

use flakes_lib::flake::clone_flake;
use flakes_lib::settings::Settings;

use crate::cmd::{flake_context, parse_flake_ref};
use crate::output::print_success;

/// Make a working copy of the source `url` resolves to at `dest`.
pub fn cmd_clone(settings: &Settings, url: &str, dest: &Path) -> Result<()> {
  let ctx = flake_context(settings)?;
  let flake_ref = parse_flake_ref(&ctx, url)?;

  clone_flake(&ctx, &flake_ref, dest)
    .with_context(|| format!("Failed to clone '{}' to {}", flake_ref, dest.display()))?;
  print_success(&format!("cloned {} into {}", flake_ref, dest.display()));
  Ok(())
}
