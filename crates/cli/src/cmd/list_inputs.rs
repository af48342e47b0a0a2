//! Implementation of the `flake list-inputs` command.

use anyhow::Result;

use flakes_lib::flake::traverse::{NestedJson, RenderLines, walk};
use flakes_lib::settings::Settings;
use flakes_lib::util::tree::Paint;

use crate::cmd::{flake_context, lock};
use crate::output::{Colors, print_json};

/// Print the locked input tree of a flake.
pub fn cmd_list_inputs(settings: &Settings, url: &str, json: bool) -> Result<()> {
  let ctx = flake_context(settings)?;
  let locked = lock(&ctx, url)?;

  if json {
    let mut nested = NestedJson::new();
    let Ok(()) = walk(&locked.lock, &mut nested);
    return print_json(&nested.finish());
  }

  let mut render = RenderLines::new(&Colors);
  let Ok(()) = walk(&locked.lock, &mut render);

  println!("{}", Colors.name(&locked.flake.locked_ref.to_string()));
  for line in &render.lines {
    println!("{}", line);
  }
  Ok(())
}
