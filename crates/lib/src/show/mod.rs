//! Rendering a flake's output tree.
//!
//! [`DisplayWalker`] follows the same taxonomy as validation but describes
//! what it finds instead of enforcing it. The result is a [`ShowNode`] tree
//! that renders as text lines or as a JSON document.
//!
//! Package sets under `legacyPackages` are usually huge, so each per-system set
//! is replaced by an "omitted" marker before anything in it is forced, and
//! evaluation errors inside them are ignored.

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use serde_json::{Map, Value as Json, json};
use tracing::{debug, info, trace, warn};

use crate::attr_path::AttrPath;
use crate::check::{OutputKind, Shape, classify, shape};
use crate::eval::{CachedCursor, EvalCache, EvalCursor, EvalError};
use crate::flake::LockedFlake;
use crate::store::Store;
use crate::util::tree::{Paint, connectors};

/// An evaluation failure outside `legacyPackages`.
#[derive(Debug)]
pub struct ShowError {
  /// Innermost first.
  pub context: Vec<String>,
  pub cause: EvalError,
}

impl ShowError {
  fn at<C: EvalCursor>(cursor: &C, cause: EvalError) -> Self {
    Self {
      context: vec![format!(
        "while evaluating the flake output '{}' at {}:",
        cursor.path(),
        cursor.pos()
      )],
      cause,
    }
  }
}

impl fmt::Display for ShowError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for frame in self.context.iter().rev() {
      writeln!(f, "{}", frame)?;
    }
    write!(f, "{}", self.cause)
  }
}

impl std::error::Error for ShowError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.cause)
  }
}

/// What the walker found at one attribute path.
#[derive(Debug, Clone, PartialEq)]
pub enum ShowNode {
  /// A set whose children are shown, in attribute order.
  Attrs(Vec<(String, ShowNode)>),
  Derivation {
    /// "package", "derivation" or "development environment".
    label: &'static str,
    name: String,
  },
  App,
  Overlay,
  Module,
  Configuration,
  /// A `legacyPackages` subtree that was not evaluated.
  Omitted,
  Unknown,
}

impl ShowNode {
  /// Text lines, starting with `header` for the root.
  pub fn render(&self, header: &str, painter: &impl Paint) -> Vec<String> {
    let mut lines = Vec::new();
    self.render_into(&mut lines, header.to_string(), "", painter);
    lines
  }

  fn render_into(&self, lines: &mut Vec<String>, header: String, next_prefix: &str, painter: &impl Paint) {
    let line = match self {
      ShowNode::Attrs(children) => {
        lines.push(header);
        for (index, (name, child)) in children.iter().enumerate() {
          let (conn, cont) = connectors(index, children.len());
          let header = format!(
            "{}{}",
            painter.prefix(&format!("{}{}", next_prefix, conn)),
            painter.name(name)
          );
          child.render_into(lines, header, &format!("{}{}", next_prefix, cont), painter);
        }
        return;
      }
      ShowNode::Derivation { label, name } => format!("{}: {} '{}'", header, label, name),
      ShowNode::App => format!("{}: app", header),
      ShowNode::Overlay => format!("{}: Nixpkgs overlay", header),
      ShowNode::Module => format!("{}: NixOS module", header),
      ShowNode::Configuration => format!("{}: NixOS configuration", header),
      ShowNode::Omitted => format!("{}: {} (use '--legacy' to show)", header, painter.attention("omitted")),
      ShowNode::Unknown => format!("{}: {}", header, painter.attention("unknown")),
    };
    lines.push(line);
  }

  /// The JSON form: sets become objects, everything else a `{"type": ..}` leaf.
  pub fn to_json(&self) -> Json {
    match self {
      ShowNode::Attrs(children) => {
        let map: Map<String, Json> = children
          .iter()
          .map(|(name, child)| (name.clone(), child.to_json()))
          .collect();
        Json::Object(map)
      }
      ShowNode::Derivation { label, name } => json!({
        "type": "derivation",
        "name": name,
        "description": label,
      }),
      ShowNode::App => json!({ "type": "app" }),
      ShowNode::Overlay => json!({ "type": "nixpkgs-overlay" }),
      ShowNode::Module => json!({ "type": "nixos-module" }),
      ShowNode::Configuration => json!({ "type": "nixos-configuration" }),
      ShowNode::Omitted => json!({ "type": "omitted" }),
      ShowNode::Unknown => json!({ "type": "unknown" }),
    }
  }
}

/// Builds a [`ShowNode`] tree from an evaluation cursor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayWalker {
  /// Show the contents of `legacyPackages`.
  pub legacy: bool,
}

impl DisplayWalker {
  pub fn new(legacy: bool) -> Self {
    Self { legacy }
  }

  pub fn walk<C: EvalCursor>(&self, root: &C) -> Result<ShowNode, ShowError> {
    Ok(self.visit(root)?.unwrap_or(ShowNode::Attrs(Vec::new())))
  }

  /// `None` means the path is not shown at all.
  fn visit<C: EvalCursor>(&self, cursor: &C) -> Result<Option<ShowNode>, ShowError> {
    trace!(path = %cursor.path(), "evaluating");
    match self.node(cursor) {
      Err(err) if cursor.path().is_under("legacyPackages") => {
        debug!(path = %cursor.path(), error = %err.cause, "ignoring evaluation error");
        Ok(None)
      }
      result => result,
    }
  }

  fn node<C: EvalCursor>(&self, cursor: &C) -> Result<Option<ShowNode>, ShowError> {
    let path = cursor.path();
    let at = |err: EvalError| ShowError::at(cursor, err);
    if path.is_empty() {
      return self.recurse(cursor).map(Some);
    }

    let node = match (classify(path), shape(path)) {
      (OutputKind::Unknown, _) => ShowNode::Unknown,
      (OutputKind::HydraJobs, _) => {
        if !cursor.is_derivation().map_err(at)? {
          return self.recurse(cursor).map(Some);
        }
        self.derivation(cursor)?
      }
      (OutputKind::LegacyPackages, Shape::Container) => return self.recurse(cursor).map(Some),
      (OutputKind::LegacyPackages, _) if !self.legacy => ShowNode::Omitted,
      (OutputKind::LegacyPackages, shape) => {
        if cursor.is_derivation().map_err(at)? {
          self.derivation(cursor)?
        } else if shape == Shape::Leaf {
          return self.recurse(cursor).map(Some);
        } else {
          return Ok(None);
        }
      }
      (_, Shape::Container) => return self.recurse(cursor).map(Some),
      (
        OutputKind::Checks | OutputKind::Packages | OutputKind::DefaultPackage | OutputKind::DevShell,
        Shape::Leaf,
      ) => {
        if !cursor.is_derivation().map_err(at)? {
          return Err(at(EvalError::Other("expected a derivation".to_string())));
        }
        self.derivation(cursor)?
      }
      (OutputKind::Apps | OutputKind::DefaultApp, Shape::Leaf) => {
        let is_app = match cursor.maybe_child("type").map_err(at)? {
          Some(ty) => ty.get_string().map_err(at)? == "app",
          None => false,
        };
        if !is_app {
          return Err(at(EvalError::Other("not an app definition".to_string())));
        }
        ShowNode::App
      }
      (OutputKind::Overlay | OutputKind::Overlays, Shape::Leaf) => ShowNode::Overlay,
      (OutputKind::NixosModule | OutputKind::NixosModules, Shape::Leaf) => ShowNode::Module,
      (OutputKind::NixosConfigurations, Shape::Leaf) => ShowNode::Configuration,
      _ => ShowNode::Unknown,
    };
    Ok(Some(node))
  }

  /// The set's header is kept even when listing its children fails inside
  /// `legacyPackages`; only the children seen so far are shown.
  fn recurse<C: EvalCursor>(&self, cursor: &C) -> Result<ShowNode, ShowError> {
    let mut children = Vec::new();
    let names = match cursor.attr_names() {
      Ok(names) => names,
      Err(err) => return self.partial(cursor, err, children),
    };
    for name in names {
      let child = match cursor.child(&name) {
        Ok(child) => child,
        Err(err) => return self.partial(cursor, err, children),
      };
      if let Some(node) = self.visit(&child)? {
        children.push((name, node));
      }
    }
    Ok(ShowNode::Attrs(children))
  }

  fn partial<C: EvalCursor>(
    &self,
    cursor: &C,
    err: EvalError,
    children: Vec<(String, ShowNode)>,
  ) -> Result<ShowNode, ShowError> {
    if !cursor.path().is_under("legacyPackages") {
      return Err(ShowError::at(cursor, err));
    }
    debug!(path = %cursor.path(), error = %err, "ignoring evaluation error");
    Ok(ShowNode::Attrs(children))
  }

  fn derivation<C: EvalCursor>(&self, cursor: &C) -> Result<ShowNode, ShowError> {
    let name = cursor
      .child("name")
      .and_then(|name| name.get_string())
      .map_err(|err| ShowError::at(cursor, err))?;
    Ok(ShowNode::Derivation {
      label: derivation_label(cursor.path()),
      name,
    })
  }
}

fn derivation_label(path: &AttrPath) -> &'static str {
  match classify(path) {
    OutputKind::DevShell if path.len() == 2 => "development environment",
    OutputKind::Checks if path.len() == 3 => "derivation",
    OutputKind::HydraJobs => "derivation",
    _ => "package",
  }
}

/// Options for [`show_flake`].
#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
  pub legacy: bool,
  /// Directory of persisted evaluation caches; `None` evaluates afresh.
  pub eval_cache: Option<PathBuf>,
  pub system: String,
}

/// Evaluate and describe the outputs of a locked flake.
pub fn show_flake(locked: &LockedFlake, store: Rc<dyn Store>, options: &ShowOptions) -> Result<ShowNode, ShowError> {
  let evaluator = locked.flake.evaluator(store, true);
  let walker = DisplayWalker::new(options.legacy);
  info!(flake = %locked.flake.locked_ref, "evaluating flake outputs");

  let Some(dir) = &options.eval_cache else {
    return walker.walk(&evaluator.root());
  };
  let cache = Rc::new(RefCell::new(EvalCache::open(
    dir,
    &locked.fingerprint(&options.system),
  )));
  let tree = walker.walk(&CachedCursor::new(evaluator.root(), cache.clone()))?;

  let mut cache = cache.borrow_mut();
  debug!(hits = cache.hits(), entries = cache.len(), "evaluation cache");
  if let Err(err) = cache.save() {
    warn!(error = %err, "failed to write evaluation cache");
  }
  Ok(tree)
}

#[cfg(test)]
mod tests {
  use std::fs;

  use serde_json::Value as Json;
  use tempfile::TempDir;

  use super::*;
  use crate::eval::JsonEvaluator;
  use crate::flake::tests::context;
  use crate::flake::{LockFlags, lock_flake};
  use crate::flakeref::{FlakeRef, Input};
  use crate::store::LocalStore;
  use crate::util::testutil::{trivial_derivation, write_manifest};
  use crate::util::tree::Plain;

  const SYSTEM: &str = "x86_64-linux";

  fn evaluator(temp: &TempDir, outputs: Json) -> JsonEvaluator {
    let store = LocalStore::open(&temp.path().join("store"), SYSTEM).unwrap();
    JsonEvaluator::new(outputs, "flake.json", Rc::new(store)).read_only(true)
  }

  fn show(outputs: Json, legacy: bool) -> Result<Vec<String>, ShowError> {
    let temp = TempDir::new().unwrap();
    let tree = DisplayWalker::new(legacy).walk(&evaluator(&temp, outputs).root())?;
    Ok(tree.render("flake", &Plain))
  }

  #[test]
  fn labels_follow_output_kind() {
    let lines = show(
      json!({
        "devShell": { SYSTEM: trivial_derivation("shell", SYSTEM) },
        "checks": { SYSTEM: { "bar": trivial_derivation("bar", SYSTEM) } },
        "packages": { SYSTEM: { "hello": trivial_derivation("hello-1.0", SYSTEM) } },
        "lib": { "$throw": "never forced" }
      }),
      false,
    )
    .unwrap();
    assert_eq!(
      lines,
      vec![
        "flake",
        "├───checks",
        "│   └───x86_64-linux",
        "│       └───bar: derivation 'bar'",
        "├───devShell",
        "│   └───x86_64-linux: development environment 'shell'",
        "├───lib: unknown",
        "└───packages",
        "    └───x86_64-linux",
        "        └───hello: package 'hello-1.0'",
      ]
    );
  }

  #[test]
  fn modules_overlays_and_apps() {
    let lines = show(
      json!({
        "apps": { SYSTEM: { "run": { "type": "app", "program": "/bin/sh" } } },
        "nixosConfigurations": { "host": {} },
        "nixosModule": {},
        "overlays": { "default": {} },
        "hydraJobs": { "build": { SYSTEM: trivial_derivation("job", SYSTEM) } }
      }),
      false,
    )
    .unwrap();
    assert!(lines.contains(&"│       └───run: app".to_string()), "{:?}", lines);
    assert!(lines.contains(&"│       └───x86_64-linux: derivation 'job'".to_string()), "{:?}", lines);
    assert!(lines.contains(&"│   └───host: NixOS configuration".to_string()), "{:?}", lines);
    assert!(lines.contains(&"├───nixosModule: NixOS module".to_string()), "{:?}", lines);
    assert!(lines.contains(&"    └───default: Nixpkgs overlay".to_string()), "{:?}", lines);
  }

  #[test]
  fn legacy_packages_are_omitted_without_forcing() {
    let temp = TempDir::new().unwrap();
    let evaluator = evaluator(
      &temp,
      json!({ "legacyPackages": { SYSTEM: { "somePkg": { "$throw": "would fail" } } } }),
    );
    let tree = DisplayWalker::new(false).walk(&evaluator.root()).unwrap();
    let forced = evaluator.force_count();
    assert_eq!(
      tree.render("flake", &Plain),
      vec![
        "flake",
        "└───legacyPackages",
        "    └───x86_64-linux: omitted (use '--legacy' to show)",
      ]
    );
    // Only the root and legacyPackages sets; nothing per system.
    assert_eq!(forced, 2);
  }

  #[test]
  fn legacy_packages_shown_on_request() {
    let lines = show(
      json!({ "legacyPackages": { SYSTEM: {
        "somePkg": trivial_derivation("some-pkg", SYSTEM),
        "broken": { "$throw": "ignored" },
        "nested": { "deeper": { "x": 1 } }
      } } }),
      true,
    )
    .unwrap();
    assert_eq!(
      lines,
      vec![
        "flake",
        "└───legacyPackages",
        "    └───x86_64-linux",
        "        └───somePkg: package 'some-pkg'",
      ]
    );
  }

  #[test]
  fn legacy_system_header_survives_listing_error() {
    // A system that throws while being tested for a derivation is dropped; one
    // that only fails to list its attributes keeps its header.
    let lines = show(
      json!({ "legacyPackages": {
        "aarch64-linux": { "$throw": "cannot list" },
        SYSTEM: 1
      } }),
      true,
    )
    .unwrap();
    assert_eq!(
      lines,
      vec![
        "flake",
        "└───legacyPackages",
        "    └───x86_64-linux",
      ]
    );
  }

  #[test]
  fn errors_outside_legacy_packages_abort() {
    let err = show(json!({ "packages": { SYSTEM: { "x": { "$throw": "broken package" } } } }), false).unwrap_err();
    assert!(err.to_string().ends_with("broken package"), "{}", err);

    let err = show(json!({ "packages": { SYSTEM: { "x": 1 } } }), false).unwrap_err();
    assert_eq!(err.cause.to_string(), "expected a derivation");
    assert!(err.to_string().contains("'packages.x86_64-linux.x'"), "{}", err);

    let err = show(json!({ "defaultApp": { SYSTEM: { "type": "derivation" } } }), false).unwrap_err();
    assert_eq!(err.cause.to_string(), "not an app definition");
  }

  #[test]
  fn json_document() {
    let temp = TempDir::new().unwrap();
    let tree = DisplayWalker::new(false)
      .walk(
        &evaluator(
          &temp,
          json!({
            "checks": { SYSTEM: { "foo": trivial_derivation("foo", SYSTEM) } },
            "legacyPackages": { SYSTEM: { "x": 1 } },
            "overlay": {}
          }),
        )
        .root(),
      )
      .unwrap();
    assert_eq!(
      tree.to_json(),
      json!({
        "checks": { SYSTEM: { "foo": { "type": "derivation", "name": "foo", "description": "derivation" } } },
        "legacyPackages": { SYSTEM: { "type": "omitted" } },
        "overlay": { "type": "nixpkgs-overlay" }
      })
    );
  }

  #[test]
  fn cached_walk_does_not_reforce() {
    let temp = TempDir::new().unwrap();
    let evaluator = evaluator(
      &temp,
      json!({ "packages": { SYSTEM: { "a": trivial_derivation("a", SYSTEM) } } }),
    );
    let cache = Rc::new(RefCell::new(EvalCache::in_memory()));
    let walker = DisplayWalker::new(false);

    let first = walker.walk(&CachedCursor::new(evaluator.root(), cache.clone())).unwrap();
    let forced = evaluator.force_count();
    let second = walker.walk(&CachedCursor::new(evaluator.root(), cache.clone())).unwrap();
    assert_eq!(first, second);
    assert_eq!(evaluator.force_count(), forced);

    walker.walk(&evaluator.root()).unwrap();
    assert!(evaluator.force_count() > forced);
  }

  #[test]
  fn show_flake_persists_cache() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("flake");
    fs::create_dir_all(&dir).unwrap();
    write_manifest(&dir, json!({}), json!({ "devShell": { SYSTEM: trivial_derivation("shell", SYSTEM) } }));
    let ctx = context(&temp);
    let locked = lock_flake(&ctx, &FlakeRef::from(Input::path(&dir)), LockFlags::default()).unwrap();

    let cache_dir = temp.path().join("eval-cache");
    let options = ShowOptions {
      legacy: false,
      eval_cache: Some(cache_dir.clone()),
      system: SYSTEM.to_string(),
    };
    let tree = show_flake(&locked, ctx.store.clone(), &options).unwrap();
    assert_eq!(tree, show_flake(&locked, ctx.store.clone(), &ShowOptions { eval_cache: None, ..options }).unwrap());
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);
  }
}
