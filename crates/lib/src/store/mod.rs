//! The content-addressed store collaborator.
//!
//! Everything the flake commands need from a store goes through [`Store`]:
//! computing paths for derivations and sources, writing `.drv` files, realising
//! a batch of derivations and importing paths from another store.
//!
//! # Layout
//!
//! ```text
//! <store>/
//! ├── <hash>-<name>.drv     # derivation (JSON)
//! ├── <hash>-<name>         # derivation output
//! └── <hash>-source         # imported flake source
//! ```

mod derivation;
mod local;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use derivation::Derivation;
pub use local::LocalStore;

use crate::consts::STORE_HASH_LEN;
use crate::util::hash::{ContentHash, DirHashError, ObjectHash};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("invalid store path name '{0}'")]
  InvalidName(String),

  #[error("path '{0}' is not in the store")]
  NotInStore(String),

  #[error("path '{0}' is not valid")]
  NotValid(String),

  #[error("failed to serialize derivation: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to parse derivation '{path}': {source}")]
  ParseDerivation {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("a '{required}' with features {{}} is required to build '{drv}', but I am a '{current}'")]
  WrongSystem {
    drv: String,
    required: String,
    current: String,
  },

  #[error("failed to run builder for '{drv}': {source}")]
  Spawn {
    drv: String,
    #[source]
    source: io::Error,
  },

  #[error("builder for '{drv}' failed with exit code {code}")]
  BuildFailed { drv: String, code: i32 },

  #[error("builder for '{0}' failed to produce output path")]
  NoOutput(String),

  #[error("unsupported store URI '{0}'")]
  UnsupportedUri(String),

  #[error("I/O error on '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] DirHashError),
}

impl StoreError {
  pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// A store path relative to the store directory: `<hash>-<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorePath(String);

impl StorePath {
  pub fn new(hash: &ObjectHash, name: &str) -> Result<Self, StoreError> {
    validate_name(name)?;
    Ok(Self(format!("{}-{}", hash, name)))
  }

  /// Parse a base name of the form `<hash>-<name>`.
  pub fn from_base_name(base: &str) -> Result<Self, StoreError> {
    let invalid = || StoreError::InvalidName(base.to_string());
    let (hash, name) = base.split_at_checked(STORE_HASH_LEN).ok_or_else(invalid)?;
    let name = name.strip_prefix('-').ok_or_else(invalid)?;
    if !hash.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(invalid());
    }
    validate_name(name)?;
    Ok(Self(base.to_string()))
  }

  pub fn hash_part(&self) -> &str {
    &self.0[..STORE_HASH_LEN]
  }

  pub fn name(&self) -> &str {
    &self.0[STORE_HASH_LEN + 1..]
  }

  pub fn is_derivation(&self) -> bool {
    self.0.ends_with(".drv")
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for StorePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
  let ok = !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || "+-._?=".contains(c));
  if ok {
    Ok(())
  } else {
    Err(StoreError::InvalidName(name.to_string()))
  }
}

/// The store operations used by evaluation, checking and archiving.
pub trait Store {
  /// The directory holding all store paths.
  fn store_dir(&self) -> &Path;

  /// The absolute location of `path`.
  fn real_path(&self, path: &StorePath) -> PathBuf {
    self.store_dir().join(path.as_str())
  }

  fn print_store_path(&self, path: &StorePath) -> String {
    self.real_path(path).to_string_lossy().into_owned()
  }

  /// Parse a printed (absolute) store path back into a [`StorePath`].
  fn parse_store_path(&self, printed: &str) -> Result<StorePath, StoreError> {
    let base = Path::new(printed)
      .strip_prefix(self.store_dir())
      .map_err(|_| StoreError::NotInStore(printed.to_string()))?;
    StorePath::from_base_name(&base.to_string_lossy())
  }

  fn is_valid_path(&self, path: &StorePath) -> bool {
    self.real_path(path).exists()
  }

  /// Path under which a source tree with this content hash is stored.
  fn source_path(&self, nar_hash: &ContentHash, name: &str) -> Result<StorePath, StoreError> {
    StorePath::new(&nar_hash.short(), name)
  }

  /// Write the `.drv` file for `drv` and return its path.
  fn write_derivation(&self, drv: &Derivation) -> Result<StorePath, StoreError>;

  /// Read back a derivation written by [`write_derivation`](Store::write_derivation).
  fn read_derivation(&self, path: &StorePath) -> Result<Derivation, StoreError>;

  /// Copy a directory into the store, returning its path and content hash.
  fn add_source(&self, dir: &Path, name: &str) -> Result<(StorePath, ContentHash), StoreError>;

  /// Import a path from another location under the given store path.
  fn import_path(&self, path: &StorePath, from: &Path) -> Result<(), StoreError>;

  /// Realise every derivation in `paths`; other paths must already be valid.
  fn build_paths(&self, paths: &BTreeSet<StorePath>) -> Result<(), StoreError>;
}

/// Copy `paths` from `src` into `dst`, skipping paths `dst` already has.
pub fn copy_paths(src: &dyn Store, dst: &dyn Store, paths: &BTreeSet<StorePath>) -> Result<(), StoreError> {
  for path in paths {
    if dst.is_valid_path(path) {
      debug!(path = %path, "already present in destination");
      continue;
    }
    if !src.is_valid_path(path) {
      return Err(StoreError::NotValid(src.print_store_path(path)));
    }
    dst.import_path(path, &src.real_path(path))?;
  }
  Ok(())
}

/// Open a store from a URI: `file:///dir`, `local?root=/dir` or a plain path.
pub fn open_store(uri: &str, system: &str) -> Result<LocalStore, StoreError> {
  let dir = if let Some(root) = uri.strip_prefix("local?root=") {
    PathBuf::from(root)
  } else if uri.starts_with("file:") {
    url::Url::parse(uri)
      .ok()
      .and_then(|u| u.to_file_path().ok())
      .ok_or_else(|| StoreError::UnsupportedUri(uri.to_string()))?
  } else if uri.contains("://") || uri.is_empty() {
    return Err(StoreError::UnsupportedUri(uri.to_string()));
  } else {
    PathBuf::from(uri)
  };
  LocalStore::open(&dir, system)
}
