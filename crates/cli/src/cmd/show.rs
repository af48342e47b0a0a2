//! Implementation of the `flake show` command.

use std::rc::Rc;

use anyhow::Result;

use flakes_lib::settings::Settings;
use flakes_lib::show::{ShowOptions, show_flake};
use flakes_lib::util::tree::Paint;

use crate::cmd::{flake_context, lock};
use crate::output::{Colors, print_json};

/// Print the output tree of a flake, as text or as a JSON document.
pub fn cmd_show(settings: &Settings, url: &str, legacy: bool, eval_cache: bool, json: bool) -> Result<()> {
  let ctx = flake_context(settings)?;
  let locked = lock(&ctx, url)?;

  let options = ShowOptions {
    legacy,
    eval_cache: eval_cache.then(|| settings.eval_cache_dir()),
    system: settings.system.clone(),
  };
  let tree = show_flake(&locked, Rc::clone(&ctx.store), &options)?;

  if json {
    return print_json(&tree.to_json());
  }

  let header = Colors.name(&locked.flake.locked_ref.to_string());
  for line in tree.render(&header, &Colors) {
    println!("{}", line);
  }
  Ok(())
}
