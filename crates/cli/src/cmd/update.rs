//! Implementation of the `flake update` command.
//!
//! Ignores the existing lock file, re-resolves every input and writes the
//! result.

use anyhow::{Context, Result};

use flakes_lib::flake::{LockFlags, lock_flake};
use flakes_lib::settings::Settings;

use crate::cmd::{flake_context, parse_flake_ref};
use crate::output::print_success;

pub fn cmd_update(settings: &Settings, url: &str) -> Result<()> {
  let ctx = flake_context(settings)?;
  let flake_ref = parse_flake_ref(&ctx, url)?;
  let flags = LockFlags {
    recreate: true,
    write: true,
  };

  let locked = lock_flake(&ctx, &flake_ref, flags).with_context(|| format!("Failed to update flake '{}'", flake_ref))?;
  let inputs = locked.lock.inputs(locked.lock.root()).len();
  print_success(&format!(
    "updated {} input(s) of '{}'",
    inputs, locked.flake.locked_ref
  ));
  Ok(())
}
