//! Loading flakes.
//!
//! A flake is a source tree with a `flake.json` manifest at its root (or in
//! the subdirectory named by the reference). Loading one means resolving its
//! reference through the registries, fetching it into the store and reading the
//! manifest from the store copy.
//!
//! # Modules
//!
//! - [`lock`] - lock file format and the in-memory lock graph
//! - [`locking`] - computing and writing lock files
//! - [`traverse`] - depth-first walks over a lock graph

pub mod lock;
pub mod locking;
pub mod traverse;

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use serde_json::{Map, Value as Json, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{LOCK_FILENAME, MANIFEST_FILENAME};
use crate::eval::JsonEvaluator;
use crate::fetch::{FetchError, Fetcher, SourceInfo};
use crate::flakeref::{FlakeRef, FlakeRefError, Input};
use crate::registry::{Registries, RegistryError};
use crate::store::{Store, StoreError};
use crate::util::hash::hash_bytes;

pub use lock::{LockError, LockGraph, LockNode, LockedNode, NodeId};
pub use locking::{LockFlags, LockedFlake, lock_flake};

#[derive(Debug, Error)]
pub enum FlakeError {
  #[error("source tree referenced by '{flake}' does not contain a '{}' file", MANIFEST_FILENAME)]
  MissingManifest { flake: String },

  #[error("failed to read '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse '{}': {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("flake '{0}' lacks attribute 'outputs'")]
  MissingOutputs(String),

  #[error("invalid flake input '{name}': {reason}")]
  BadInput { name: String, reason: String },

  #[error("input '{0}' exceeds the maximum input nesting depth")]
  InputDepth(String),

  #[error(transparent)]
  FlakeRef(#[from] FlakeRefError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Lock(#[from] LockError),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Collaborators needed to load and lock flakes.
#[derive(Clone)]
pub struct FlakeContext {
  pub store: Rc<dyn Store>,
  pub fetcher: Rc<dyn Fetcher>,
  pub registries: Registries,
  /// Base directory for relative references given on the command line.
  pub cwd: PathBuf,
}

/// A declared input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
  pub flake_ref: FlakeRef,
  /// Whether the input has a manifest (and inputs) of its own.
  pub is_flake: bool,
}

/// The contents of `flake.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
  pub description: Option<String>,
  /// Declared inputs, in document order.
  pub inputs: Vec<(String, InputSpec)>,
  pub outputs: Json,
}

#[derive(Deserialize)]
struct ManifestDoc {
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  inputs: Map<String, Json>,
  #[serde(default)]
  outputs: Option<Json>,
}

impl Manifest {
  /// Read a manifest; relative input paths are resolved against `base`.
  pub fn load(path: &Path, base: &Path, flake: &str) -> Result<Self, FlakeError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Err(FlakeError::MissingManifest {
          flake: flake.to_string(),
        });
      }
      Err(source) => {
        return Err(FlakeError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    let doc: ManifestDoc = serde_json::from_str(&content).map_err(|source| FlakeError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let mut inputs = Vec::with_capacity(doc.inputs.len());
    for (name, spec) in &doc.inputs {
      inputs.push((name.clone(), parse_input(name, spec, base)?));
    }

    Ok(Self {
      description: doc.description,
      inputs,
      outputs: doc.outputs.ok_or_else(|| FlakeError::MissingOutputs(flake.to_string()))?,
    })
  }
}

fn parse_input(name: &str, spec: &Json, base: &Path) -> Result<InputSpec, FlakeError> {
  let bad = |reason: &str| FlakeError::BadInput {
    name: name.to_string(),
    reason: reason.to_string(),
  };
  let (url, is_flake) = match spec {
    Json::String(url) => (url.as_str(), true),
    Json::Object(attrs) => {
      if let Some(key) = attrs.keys().find(|k| !matches!(k.as_str(), "url" | "flake")) {
        return Err(bad(&format!("unsupported attribute '{}'", key)));
      }
      let url = attrs
        .get("url")
        .and_then(Json::as_str)
        .ok_or_else(|| bad("missing string attribute 'url'"))?;
      let is_flake = match attrs.get("flake") {
        None => true,
        Some(Json::Bool(b)) => *b,
        Some(_) => return Err(bad("attribute 'flake' must be a Boolean")),
      };
      (url, is_flake)
    }
    _ => return Err(bad("expected a URL string or an attribute set")),
  };
  Ok(InputSpec {
    flake_ref: FlakeRef::parse(url, Some(base))?,
    is_flake,
  })
}

/// A fetched flake.
#[derive(Debug, Clone)]
pub struct Flake {
  /// The reference as given by the user.
  pub original_ref: FlakeRef,
  /// After registry resolution.
  pub resolved_ref: FlakeRef,
  /// After fetching; pins the exact content.
  pub locked_ref: FlakeRef,
  pub source_info: SourceInfo,
  pub description: Option<String>,
  pub inputs: Vec<(String, InputSpec)>,
  pub outputs: Json,
  /// `flake.json` inside the store copy.
  pub manifest_path: PathBuf,
  /// The writable directory holding the manifest, for local flakes.
  pub local_dir: Option<PathBuf>,
}

/// Resolve, fetch and read the flake at `original`.
pub fn get_flake(ctx: &FlakeContext, original: &FlakeRef) -> Result<Flake, FlakeError> {
  info!(flake = %original, "fetching flake");
  let resolved = ctx.registries.resolve(original)?;
  let (source_info, locked_input) = ctx.fetcher.fetch(ctx.store.as_ref(), &resolved.input)?;
  let locked_ref = FlakeRef {
    input: locked_input,
    subdir: resolved.subdir.clone(),
  };

  let in_subdir = |root: PathBuf| match &resolved.subdir {
    Some(dir) => root.join(dir),
    None => root,
  };
  let flake_dir = in_subdir(ctx.store.real_path(&source_info.store_path));
  let local_dir = match &resolved.input {
    Input::Path { path, .. } => Some(in_subdir(path.clone())),
    _ => None,
  };
  let manifest_path = flake_dir.join(MANIFEST_FILENAME);
  let base = local_dir.clone().unwrap_or_else(|| flake_dir.clone());
  let manifest = Manifest::load(&manifest_path, &base, &original.to_string())?;
  debug!(flake = %locked_ref, inputs = manifest.inputs.len(), "read manifest");

  Ok(Flake {
    original_ref: original.clone(),
    resolved_ref: resolved,
    locked_ref,
    source_info,
    description: manifest.description,
    inputs: manifest.inputs,
    outputs: manifest.outputs,
    manifest_path,
    local_dir,
  })
}

/// Make a working copy of the source `flake_ref` resolves to.
pub fn clone_flake(ctx: &FlakeContext, flake_ref: &FlakeRef, dest: &Path) -> Result<(), FlakeError> {
  let resolved = ctx.registries.resolve(flake_ref)?;
  ctx.fetcher.clone_to(&resolved.input, dest)?;
  Ok(())
}

impl Flake {
  /// The lock file inside the store copy.
  pub fn lock_path(&self) -> PathBuf {
    self
      .manifest_path
      .parent()
      .map(|dir| dir.join(LOCK_FILENAME))
      .unwrap_or_else(|| PathBuf::from(LOCK_FILENAME))
  }

  /// Metadata document printed by `info --json`.
  pub fn info_json(&self, store: &dyn Store) -> Json {
    let mut doc = Map::new();
    if let Some(description) = &self.description {
      doc.insert("description".into(), json!(description));
    }
    doc.insert("originalUrl".into(), json!(self.original_ref.to_string()));
    doc.insert("original".into(), Json::Object(self.original_ref.to_attrs()));
    doc.insert("resolvedUrl".into(), json!(self.resolved_ref.to_string()));
    doc.insert("resolved".into(), Json::Object(self.resolved_ref.to_attrs()));
    doc.insert("lockedUrl".into(), json!(self.locked_ref.to_string()));
    doc.insert("locked".into(), Json::Object(self.locked_ref.to_attrs()));

    let mut info = Map::new();
    info.insert("narHash".into(), json!(self.source_info.nar_hash.to_string()));
    if let Some(modified) = self.source_info.last_modified {
      info.insert("lastModified".into(), json!(modified));
    }
    if let Some(count) = self.source_info.rev_count {
      info.insert("revCount".into(), json!(count));
    }
    doc.insert("info".into(), Json::Object(info));

    if let Some(rev) = &self.source_info.rev {
      doc.insert("revision".into(), json!(rev));
    }
    if let Some(count) = self.source_info.rev_count {
      doc.insert("revCount".into(), json!(count));
    }
    if let Some(modified) = self.source_info.last_modified {
      doc.insert("lastModified".into(), json!(modified));
    }
    doc.insert(
      "path".into(),
      json!(store.print_store_path(&self.source_info.store_path)),
    );
    Json::Object(doc)
  }

  /// An evaluator over this flake's outputs.
  ///
  /// A read-only evaluator computes store paths without writing derivations.
  pub fn evaluator(&self, store: Rc<dyn Store>, read_only: bool) -> JsonEvaluator {
    JsonEvaluator::new(
      self.outputs.clone(),
      self.manifest_path.to_string_lossy(),
      store,
    )
    .read_only(read_only)
  }

  /// A key identifying everything the output tree depends on.
  pub fn fingerprint(&self, lock: &LockGraph, system: &str) -> String {
    let material = format!(
      "{};{};{};{}",
      self.source_info.nar_hash,
      self.resolved_ref.subdir.as_deref().unwrap_or(""),
      lock.to_json(),
      system
    );
    hash_bytes(material.as_bytes()).short().0
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::fetch::SourceFetcher;
  use crate::registry::Registry;
  use crate::registry::RegistryTier;
  use crate::store::LocalStore;
  use crate::util::testutil::write_manifest;

  pub(crate) fn context(temp: &TempDir) -> FlakeContext {
    let store = LocalStore::open(&temp.path().join("store"), "x86_64-linux").unwrap();
    FlakeContext {
      store: Rc::new(store),
      fetcher: Rc::new(SourceFetcher::new(temp.path().join("git"))),
      registries: Registries::from_tiers(vec![Registry::new(RegistryTier::User)]),
      cwd: temp.path().to_path_buf(),
    }
  }

  #[test]
  fn loads_manifest_from_store_copy() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("flake");
    fs::create_dir_all(&dir).unwrap();
    write_manifest(&dir, json!({ "dep": "path:../dep" }), json!({ "x": 1 }));

    let ctx = context(&temp);
    let flake = get_flake(&ctx, &FlakeRef::from(Input::path(&dir))).unwrap();
    assert_eq!(flake.description.as_deref(), Some("test flake"));
    assert!(flake.locked_ref.input.is_locked());
    assert!(flake.manifest_path.starts_with(temp.path().join("store")));
    assert_eq!(flake.local_dir.as_deref(), Some(dir.as_path()));

    let (name, spec) = &flake.inputs[0];
    assert_eq!(name, "dep");
    assert!(spec.is_flake);
    assert_eq!(spec.flake_ref.input, Input::path(dir.join("../dep")));
  }

  #[test]
  fn missing_manifest_is_reported() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("empty");
    fs::create_dir_all(&dir).unwrap();
    let err = get_flake(&context(&temp), &FlakeRef::from(Input::path(&dir))).unwrap_err();
    assert!(err.to_string().contains("does not contain a 'flake.json' file"), "{}", err);
  }

  #[test]
  fn input_specs() {
    let base = Path::new("/base");
    let spec = parse_input("a", &json!({ "url": "path:/x", "flake": false }), base).unwrap();
    assert!(!spec.is_flake);
    assert!(parse_input("a", &json!({ "url": "path:/x", "follows": "b" }), base).is_err());
    assert!(parse_input("a", &json!(3), base).is_err());
  }

  #[test]
  fn clone_copies_working_tree() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("flake");
    fs::create_dir_all(&dir).unwrap();
    write_manifest(&dir, json!({}), json!({}));

    let ctx = context(&temp);
    let dest = temp.path().join("copy");
    clone_flake(&ctx, &FlakeRef::from(Input::path(&dir)), &dest).unwrap();
    assert!(dest.join(MANIFEST_FILENAME).is_file());

    let err = clone_flake(&ctx, &FlakeRef::from(Input::path(&dir)), &dest).unwrap_err();
    assert!(matches!(err, FlakeError::Fetch(FetchError::DestinationExists(_))));
  }

  #[test]
  fn info_document_fields() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("flake");
    fs::create_dir_all(&dir).unwrap();
    write_manifest(&dir, json!({}), json!({}));

    let ctx = context(&temp);
    let flake = get_flake(&ctx, &FlakeRef::from(Input::path(&dir))).unwrap();
    let info = flake.info_json(ctx.store.as_ref());
    assert_eq!(info["description"], "test flake");
    assert_eq!(info["original"]["type"], "path");
    assert!(info["locked"]["narHash"].as_str().unwrap().starts_with("sha256-"));
    assert!(info["path"].as_str().unwrap().ends_with("-source"));
    assert!(info.get("revision").is_none());
  }
}
