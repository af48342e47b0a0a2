//! Implementation of the registry commands: `add`, `remove`, `pin` and `list`.
//!
//! Mutations only ever touch the user registry.

use anyhow::{Context, Result};

use flakes_lib::flakeref::FlakeRef;
use flakes_lib::registry::{add_entry, pin_entry, remove_entry};
use flakes_lib::settings::Settings;

use crate::cmd::flake_context;
use crate::output::print_success;

fn current_dir() -> Result<std::path::PathBuf> {
  std::env::current_dir().context("Failed to determine the current directory")
}

pub fn cmd_add(settings: &Settings, from: &str, to: &str) -> Result<()> {
  add_entry(&settings.user_registry, from, to, &current_dir()?)
    .with_context(|| format!("Failed to add registry entry '{}'", from))?;
  print_success(&format!("added {} -> {}", from, to));
  Ok(())
}

pub fn cmd_remove(settings: &Settings, url: &str) -> Result<()> {
  remove_entry(&settings.user_registry, url, &current_dir()?)
    .with_context(|| format!("Failed to remove registry entry '{}'", url))?;
  print_success(&format!("removed {}", url));
  Ok(())
}

pub fn cmd_pin(settings: &Settings, url: &str) -> Result<()> {
  let ctx = flake_context(settings)?;
  let pinned = pin_entry(
    &settings.user_registry,
    &ctx.registries,
    ctx.store.as_ref(),
    ctx.fetcher.as_ref(),
    url,
    &ctx.cwd,
  )
  .with_context(|| format!("Failed to pin '{}'", url))?;
  print_success(&format!("pinned {} -> {}", url, pinned));
  Ok(())
}

/// Print every entry of every registry tier, in lookup order.
pub fn cmd_list(settings: &Settings) -> Result<()> {
  let ctx = flake_context(settings)?;
  for registry in ctx.registries.tiers() {
    for entry in &registry.entries {
      println!(
        "{} {} {}",
        registry.tier,
        FlakeRef::from(entry.from.clone()),
        entry.to
      );
    }
  }
  Ok(())
}
