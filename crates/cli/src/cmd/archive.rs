//! Implementation of the `flake archive` command.
//!
//! Collects the sources of a flake and all of its transitive inputs and,
//! given `--to`, copies them into another store.

use anyhow::Result;

use flakes_lib::archive::{ArchiveOptions, archive};
use flakes_lib::settings::Settings;
use flakes_lib::store::open_store;

use crate::cmd::{flake_context, lock};
use crate::output::{print_json, print_success, print_warning};

pub fn cmd_archive(settings: &Settings, url: &str, to: Option<String>, json: bool, dry_run: bool) -> Result<()> {
  let ctx = flake_context(settings)?;
  let locked = lock(&ctx, url)?;

  let copying = to.is_some() && !dry_run;
  if dry_run && to.is_some() {
    print_warning("dry run: nothing will be copied");
  }
  let options = ArchiveOptions { to, dry_run };
  let result = archive(
    &locked,
    ctx.store.as_ref(),
    ctx.fetcher.as_ref(),
    &options,
    |uri| open_store(uri, &settings.system),
  )?;

  if json {
    return print_json(&result.json);
  }
  if copying {
    print_success(&format!("copied {} source(s)", result.sources.len()));
  } else {
    for path in &result.sources {
      println!("{}", ctx.store.print_store_path(path));
    }
  }
  Ok(())
}
