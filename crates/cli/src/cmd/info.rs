//! Implementation of the `flake info` command.

use anyhow::{Context, Result};

use flakes_lib::flake::get_flake;
use flakes_lib::settings::Settings;

use crate::cmd::{flake_context, parse_flake_ref};
use crate::output::{format_timestamp, print_field, print_json};

/// Print the resolved and locked references and source metadata of a flake.
pub fn cmd_info(settings: &Settings, url: &str, json: bool) -> Result<()> {
  let ctx = flake_context(settings)?;
  let flake_ref = parse_flake_ref(&ctx, url)?;
  let flake = get_flake(&ctx, &flake_ref).with_context(|| format!("Failed to fetch flake '{}'", flake_ref))?;

  if json {
    return print_json(&flake.info_json(ctx.store.as_ref()));
  }

  print_field("Resolved URL", &flake.resolved_ref.to_string());
  print_field("Locked URL", &flake.locked_ref.to_string());
  if let Some(description) = &flake.description {
    print_field("Description", description);
  }
  print_field(
    "Path",
    &ctx.store.print_store_path(&flake.source_info.store_path),
  );
  if let Some(rev) = &flake.source_info.rev {
    print_field("Revision", rev);
  }
  if let Some(count) = flake.source_info.rev_count {
    print_field("Revisions", &count.to_string());
  }
  if let Some(modified) = flake.source_info.last_modified {
    print_field("Last modified", &format_timestamp(modified));
  }
  Ok(())
}
