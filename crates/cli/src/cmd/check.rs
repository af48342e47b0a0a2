//! Implementation of the `flake check` command.
//!
//! Validates every output of a flake and, unless `--no-build` is given,
//! builds the checks for the current system.

use std::rc::Rc;

use anyhow::Result;

use flakes_lib::check::{CheckOptions, check_flake};
use flakes_lib::settings::Settings;

use crate::cmd::{flake_context, lock};
use crate::output::print_success;

/// Execute the check command.
///
/// # Errors
///
/// Returns the first structural violation or evaluation error, framed with
/// the attribute path it occurred at, or the build failure.
pub fn cmd_check(settings: &Settings, url: &str, build: bool) -> Result<()> {
  let ctx = flake_context(settings)?;
  let locked = lock(&ctx, url)?;

  let options = CheckOptions {
    build,
    system: settings.system.clone(),
  };
  let built = check_flake(&locked.flake, Rc::clone(&ctx.store), &options)?;

  if build {
    print_success(&format!(
      "flake '{}' is valid ({} path(s) built)",
      locked.flake.locked_ref,
      built.len()
    ));
  } else {
    print_success(&format!("flake '{}' is valid", locked.flake.locked_ref));
  }
  Ok(())
}
