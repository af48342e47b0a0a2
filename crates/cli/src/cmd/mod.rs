mod archive;
mod check;
mod clone;
mod info;
mod init;
mod list_inputs;
mod registry;
mod show;
mod update;

use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::debug;

use flakes_lib::fetch::SourceFetcher;
use flakes_lib::flake::{FlakeContext, LockFlags, LockedFlake, lock_flake};
use flakes_lib::flakeref::FlakeRef;
use flakes_lib::registry::Registries;
use flakes_lib::settings::Settings;
use flakes_lib::store::LocalStore;

pub use archive::cmd_archive;
pub use check::cmd_check;
pub use clone::cmd_clone;
pub use info::cmd_info;
pub use init::cmd_init;
pub use list_inputs::cmd_list_inputs;
pub use registry::{cmd_add, cmd_list, cmd_pin, cmd_remove};
pub use show::cmd_show;
pub use update::cmd_update;

/// Open the store, fetcher and registries described by `settings`.
fn flake_context(settings: &Settings) -> Result<FlakeContext> {
  let cwd = std::env::current_dir().context("Failed to determine the current directory")?;
  let store = LocalStore::open(&settings.store_dir, &settings.system)
    .with_context(|| format!("Failed to open store at {}", settings.store_dir.display()))?;
  let registries = Registries::load(settings, &cwd).context("Failed to load flake registries")?;
  debug!(store = %settings.store_dir.display(), system = %settings.system, "opened store");

  Ok(FlakeContext {
    store: Rc::new(store),
    fetcher: Rc::new(SourceFetcher::new(settings.git_cache_dir())),
    registries,
    cwd,
  })
}

fn parse_flake_ref(ctx: &FlakeContext, url: &str) -> Result<FlakeRef> {
  FlakeRef::parse(url, Some(&ctx.cwd)).with_context(|| format!("Invalid flake reference '{}'", url))
}

/// Lock the flake at `url`, writing its lock file when it changed.
fn lock(ctx: &FlakeContext, url: &str) -> Result<LockedFlake> {
  let flake_ref = parse_flake_ref(ctx, url)?;
  let flags = LockFlags {
    recreate: false,
    write: true,
  };
  lock_flake(ctx, &flake_ref, flags).with_context(|| format!("Failed to lock flake '{}'", flake_ref))
}
