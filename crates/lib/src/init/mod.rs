//! Create a skeleton flake.
//!
//! This module provides the core logic for the `flake init` command, which
//! writes a `flake.json` with one package, a default package and an app for
//! the given system.

mod templates;

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::consts::MANIFEST_FILENAME;

pub use templates::FLAKE_JSON_TEMPLATE;

/// Errors that can occur during initialization.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("file '{}' already exists", path.display())]
  PathExists { path: PathBuf },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error("failed to canonicalize path {}: {source}", path.display())]
  Canonicalize { path: PathBuf, source: std::io::Error },
}

/// Options for creating a flake.
pub struct InitOptions {
  /// Directory to write `flake.json` into
  pub dir: PathBuf,
  /// System the template's outputs are declared for
  pub system: String,
}

/// Initialize a new flake in `options.dir`.
///
/// # Errors
///
/// Returns an error if:
/// - `flake.json` already exists
/// - Directory creation fails
/// - File writing fails
pub fn init(options: &InitOptions) -> Result<PathBuf, InitError> {
  fs::create_dir_all(&options.dir).map_err(|e| InitError::CreateDir {
    path: options.dir.clone(),
    source: e,
  })?;

  let dir = dunce::canonicalize(&options.dir).map_err(|e| InitError::Canonicalize {
    path: options.dir.clone(),
    source: e,
  })?;

  let manifest = dir.join(MANIFEST_FILENAME);
  if manifest.exists() {
    return Err(InitError::PathExists { path: manifest });
  }

  let content = FLAKE_JSON_TEMPLATE.replace("{system}", &options.system);
  fs::write(&manifest, content).map_err(|e| InitError::WriteFile {
    path: manifest.clone(),
    source: e,
  })?;
  info!(path = %manifest.display(), "wrote flake template");

  Ok(manifest)
}
