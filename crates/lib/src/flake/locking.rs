//! Computing lock files.
//!
//! Every declared input is resolved through the registries, fetched, and
//! recorded with its locked reference. Inputs that are flakes are locked
//! recursively. Entries of an existing lock file are reused as long as the
//! input's declared reference hasn't changed.

use tracing::{debug, info, warn};

use crate::consts::{LOCK_FILENAME, MANIFEST_FILENAME};
use crate::flakeref::{FlakeRef, Input};

use super::{Flake, FlakeContext, FlakeError, InputSpec, LockGraph, LockedNode, Manifest, NodeId, get_flake};

/// How deep input flakes may nest.
const MAX_INPUT_DEPTH: usize = 32;

/// Options for [`lock_flake`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LockFlags {
  /// Ignore the existing lock file and lock everything afresh.
  pub recreate: bool,
  /// Write the lock file if it changed.
  pub write: bool,
}

/// A flake together with its complete lock graph.
#[derive(Debug, Clone)]
pub struct LockedFlake {
  pub flake: Flake,
  pub lock: LockGraph,
}

impl LockedFlake {
  pub fn fingerprint(&self, system: &str) -> String {
    self.flake.fingerprint(&self.lock, system)
  }
}

/// Fetch the flake at `flake_ref` and lock all of its inputs.
pub fn lock_flake(ctx: &FlakeContext, flake_ref: &FlakeRef, flags: LockFlags) -> Result<LockedFlake, FlakeError> {
  let flake = get_flake(ctx, flake_ref)?;
  let old = if flags.recreate {
    None
  } else {
    LockGraph::load(&flake.lock_path())?
  };

  let mut lock = LockGraph::new();
  let root = lock.root();
  let locker = Locker { ctx, old: old.as_ref() };
  locker.lock_inputs(&mut lock, root, &flake.inputs, old.as_ref().map(LockGraph::root), 0)?;

  let changed = old.as_ref().is_none_or(|old| old.to_json() != lock.to_json());
  if !changed {
    debug!(flake = %flake.locked_ref, "lock file is up to date");
    return Ok(LockedFlake { flake, lock });
  }
  if !flags.write {
    return Ok(LockedFlake { flake, lock });
  }
  let Some(dir) = &flake.local_dir else {
    warn!(flake = %flake.original_ref, "not writing lock file of non-local flake");
    return Ok(LockedFlake { flake, lock });
  };
  if old.is_none() && lock.is_empty() {
    return Ok(LockedFlake { flake, lock });
  }

  let path = dir.join(LOCK_FILENAME);
  info!(path = %path.display(), "updating lock file");
  lock.save(&path)?;

  // The lock file is part of the source, so the flake has to be refetched.
  let flake = get_flake(ctx, flake_ref)?;
  Ok(LockedFlake { flake, lock })
}

struct Locker<'a> {
  ctx: &'a FlakeContext,
  old: Option<&'a LockGraph>,
}

impl Locker<'_> {
  fn lock_inputs(
    &self,
    lock: &mut LockGraph,
    parent: NodeId,
    inputs: &[(String, InputSpec)],
    old_parent: Option<NodeId>,
    depth: usize,
  ) -> Result<(), FlakeError> {
    for (name, spec) in inputs {
      if let Some(old) = self.old
        && let Some(old_parent) = old_parent
        && let Some((old_id, old_node)) = old.child(old_parent, name)
        && old_node.original == spec.flake_ref
        && old_node.is_flake == spec.is_flake
        && old_node.locked.input.is_locked()
      {
        debug!(input = %name, "reusing locked input");
        copy_subtree(old, old_id, lock, parent, name);
        continue;
      }
      self.lock_input(lock, parent, name, spec, depth)?;
    }
    Ok(())
  }

  fn lock_input(
    &self,
    lock: &mut LockGraph,
    parent: NodeId,
    name: &str,
    spec: &InputSpec,
    depth: usize,
  ) -> Result<(), FlakeError> {
    if depth >= MAX_INPUT_DEPTH {
      return Err(FlakeError::InputDepth(name.to_string()));
    }
    info!(input = %name, flake = %spec.flake_ref, "locking input");
    let resolved = self.ctx.registries.resolve(&spec.flake_ref)?;
    let (source, locked_input) = self.ctx.fetcher.fetch(self.ctx.store.as_ref(), &resolved.input)?;
    let locked = FlakeRef {
      input: locked_input,
      subdir: resolved.subdir.clone(),
    };

    let id = lock.add_input(
      parent,
      name,
      LockedNode {
        locked,
        original: spec.flake_ref.clone(),
        is_flake: spec.is_flake,
        inputs: Vec::new(),
      },
    );

    if spec.is_flake {
      let mut dir = self.ctx.store.real_path(&source.store_path);
      let mut base = match &resolved.input {
        Input::Path { path, .. } => path.clone(),
        _ => dir.clone(),
      };
      if let Some(subdir) = &resolved.subdir {
        dir = dir.join(subdir);
        base = base.join(subdir);
      }
      let manifest = Manifest::load(&dir.join(MANIFEST_FILENAME), &base, &spec.flake_ref.to_string())?;
      self.lock_inputs(lock, id, &manifest.inputs, None, depth + 1)?;
    }
    Ok(())
  }
}

fn copy_subtree(old: &LockGraph, old_id: NodeId, lock: &mut LockGraph, parent: NodeId, name: &str) {
  let Some(node) = old.node(old_id).as_locked() else {
    return;
  };
  let id = lock.add_input(
    parent,
    name,
    LockedNode {
      inputs: Vec::new(),
      ..node.clone()
    },
  );
  for (child_name, child) in node.inputs.clone() {
    copy_subtree(old, child, lock, id, &child_name);
  }
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use serde_json::json;
  use tempfile::TempDir;

  use super::*;
  use crate::flake::tests::context;
  use crate::util::testutil::write_manifest;

  fn flake_dir(temp: &TempDir, name: &str, inputs: serde_json::Value) -> std::path::PathBuf {
    let dir = temp.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    write_manifest(&dir, inputs, json!({}));
    dir
  }

  fn write_flags() -> LockFlags {
    LockFlags {
      recreate: false,
      write: true,
    }
  }

  fn local(dir: &Path) -> FlakeRef {
    FlakeRef::from(Input::path(dir))
  }

  #[test]
  fn locks_nested_inputs() {
    let temp = TempDir::new().unwrap();
    flake_dir(&temp, "leaf", json!({}));
    flake_dir(&temp, "mid", json!({ "leaf": "path:../leaf" }));
    flake_dir(&temp, "data", json!({}));
    let top = flake_dir(
      &temp,
      "top",
      json!({ "mid": "path:../mid", "data": { "url": "path:../data", "flake": false } }),
    );

    let ctx = context(&temp);
    let locked = lock_flake(&ctx, &local(&top), write_flags()).unwrap();

    let names: Vec<_> = locked.lock.inputs(locked.lock.root()).iter().map(|(n, _)| n.clone()).collect();
    assert_eq!(names, vec!["mid", "data"]);
    let (mid, _) = locked.lock.child(locked.lock.root(), "mid").unwrap();
    let (_, leaf) = locked.lock.child(mid, "leaf").unwrap();
    assert!(leaf.locked.input.is_locked());
    let (_, data) = locked.lock.child(locked.lock.root(), "data").unwrap();
    assert!(!data.is_flake);

    assert!(top.join("flake.lock").is_file());
    let on_disk = LockGraph::load(&top.join("flake.lock")).unwrap().unwrap();
    assert_eq!(on_disk.to_json(), locked.lock.to_json());
  }

  #[test]
  fn reuses_existing_lock() {
    let temp = TempDir::new().unwrap();
    let dep = flake_dir(&temp, "dep", json!({}));
    let top = flake_dir(&temp, "top", json!({ "dep": "path:../dep" }));
    let ctx = context(&temp);

    let first = lock_flake(&ctx, &local(&top), write_flags()).unwrap();
    fs::write(dep.join("extra"), "changed").unwrap();
    let second = lock_flake(&ctx, &local(&top), write_flags()).unwrap();
    assert_eq!(first.lock, second.lock);

    let updated = lock_flake(
      &ctx,
      &local(&top),
      LockFlags {
        recreate: true,
        write: true,
      },
    )
    .unwrap();
    assert_ne!(first.lock, updated.lock);
  }

  #[test]
  fn flake_without_inputs_writes_no_lock() {
    let temp = TempDir::new().unwrap();
    let top = flake_dir(&temp, "top", json!({}));
    let locked = lock_flake(&context(&temp), &local(&top), write_flags()).unwrap();
    assert!(locked.lock.is_empty());
    assert!(!top.join("flake.lock").exists());
  }

  #[test]
  fn self_referencing_inputs_are_bounded() {
    let temp = TempDir::new().unwrap();
    let a = flake_dir(&temp, "a", json!({ "b": "path:../b" }));
    flake_dir(&temp, "b", json!({ "a": "path:../a" }));
    let err = lock_flake(&context(&temp), &local(&a), LockFlags::default()).unwrap_err();
    assert!(matches!(err, FlakeError::InputDepth(_)));
  }
}
