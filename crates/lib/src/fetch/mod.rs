//! Fetching flake sources into the store.
//!
//! A [`Fetcher`] turns a direct [`Input`] into a store path and returns the
//! input's locked form. [`SourceFetcher`] handles `path` inputs by copying the
//! directory into the store and `git` inputs through a gix checkout cache.

mod git;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{SOURCE_EXCLUDES, SOURCE_NAME};
use crate::flakeref::Input;
use crate::store::{Store, StoreError, StorePath};
use crate::util::fs::copy_dir;
use crate::util::hash::ContentHash;

/// Errors that can occur during fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to create cache directory '{0}': {1}")]
  CreateCacheDir(PathBuf, #[source] std::io::Error),

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to fetch from '{url}': {source}")]
  Fetch {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("revision '{rev}' not found in repository")]
  RevisionNotFound { rev: String },

  #[error("failed to checkout revision '{rev}': {source}")]
  Checkout {
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("revision '{rev}' is not the checked-out HEAD ('{head}'); only HEAD can be fetched")]
  RevisionMismatch { rev: String, head: String },

  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  #[error("no remote configured for repository")]
  NoRemote,

  #[error("failed to connect to remote '{url}': {source}")]
  Connect {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("path '{}' does not exist", .0.display())]
  PathNotFound(PathBuf),

  #[error("NAR hash mismatch in input '{input}', expected '{expected}' but got '{got}'")]
  NarHashMismatch {
    input: String,
    expected: String,
    got: String,
  },

  #[error("cannot fetch indirect flake reference '{0}'; resolve it through the registry first")]
  Indirect(String),

  #[error("destination '{}' already exists", .0.display())]
  DestinationExists(PathBuf),

  #[error("failed to copy '{}': {source}", path.display())]
  Copy {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// A fetched source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
  pub store_path: StorePath,
  pub nar_hash: ContentHash,
  pub rev: Option<String>,
  pub rev_count: Option<u64>,
  pub last_modified: Option<u64>,
}

/// Access to remote and local flake sources.
pub trait Fetcher {
  /// Copy the source of `input` into `store`.
  ///
  /// Returns the source info and the locked form of the input. A locked
  /// input must fetch to the same content.
  fn fetch(&self, store: &dyn Store, input: &Input) -> Result<(SourceInfo, Input), FetchError>;

  /// Make a working copy of `input` at `dest`.
  fn clone_to(&self, input: &Input, dest: &Path) -> Result<(), FetchError>;
}

/// The fetcher used by the command-line tool.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
  git_cache: PathBuf,
}

impl SourceFetcher {
  /// Create a fetcher keeping git checkouts under `git_cache`.
  pub fn new(git_cache: impl Into<PathBuf>) -> Self {
    Self {
      git_cache: git_cache.into(),
    }
  }

  fn fetch_path(&self, store: &dyn Store, input: &Input, path: &Path) -> Result<(SourceInfo, Input), FetchError> {
    if !path.is_dir() {
      return Err(FetchError::PathNotFound(path.to_path_buf()));
    }
    let (store_path, nar_hash) = store.add_source(path, SOURCE_NAME)?;
    check_hash(input, &nar_hash)?;
    let last_modified = input.last_modified().or_else(|| modified_time(path));
    debug!(path = %path.display(), store_path = %store_path, "fetched path input");

    let locked = Input::Path {
      path: path.to_path_buf(),
      nar_hash: Some(nar_hash.clone()),
      last_modified,
    };
    Ok((
      SourceInfo {
        store_path,
        nar_hash,
        rev: None,
        rev_count: None,
        last_modified,
      },
      locked,
    ))
  }

  fn fetch_git(&self, store: &dyn Store, input: &Input, url: &str) -> Result<(SourceInfo, Input), FetchError> {
    let wanted = input.rev().or(input.ref_name());
    let checkout = git::fetch_git(url, wanted, &self.git_cache)?;
    let (store_path, nar_hash) = store.add_source(&checkout.worktree, SOURCE_NAME)?;
    check_hash(input, &nar_hash)?;
    info!(url, rev = %checkout.rev, "fetched git input");

    let locked = Input::Git {
      url: url.to_string(),
      ref_name: input.ref_name().map(str::to_string),
      rev: Some(checkout.rev.clone()),
      nar_hash: Some(nar_hash.clone()),
      last_modified: Some(checkout.last_modified),
      rev_count: Some(checkout.rev_count),
    };
    Ok((
      SourceInfo {
        store_path,
        nar_hash,
        rev: Some(checkout.rev),
        rev_count: Some(checkout.rev_count),
        last_modified: Some(checkout.last_modified),
      },
      locked,
    ))
  }
}

fn check_hash(input: &Input, got: &ContentHash) -> Result<(), FetchError> {
  match input.nar_hash() {
    Some(expected) if expected != got => Err(FetchError::NarHashMismatch {
      input: crate::flakeref::FlakeRef::from(input.clone()).to_string(),
      expected: expected.to_string(),
      got: got.to_string(),
    }),
    _ => Ok(()),
  }
}

fn modified_time(path: &Path) -> Option<u64> {
  let modified = fs::metadata(path).ok()?.modified().ok()?;
  Some(modified.duration_since(UNIX_EPOCH).ok()?.as_secs())
}

impl Fetcher for SourceFetcher {
  fn fetch(&self, store: &dyn Store, input: &Input) -> Result<(SourceInfo, Input), FetchError> {
    match input {
      Input::Path { path, .. } => self.fetch_path(store, input, path),
      Input::Git { url, .. } => self.fetch_git(store, input, url),
      Input::Indirect { id, .. } => Err(FetchError::Indirect(id.clone())),
    }
  }

  fn clone_to(&self, input: &Input, dest: &Path) -> Result<(), FetchError> {
    if dest.exists() {
      return Err(FetchError::DestinationExists(dest.to_path_buf()));
    }
    match input {
      Input::Path { path, .. } => {
        if !path.is_dir() {
          return Err(FetchError::PathNotFound(path.clone()));
        }
        info!(from = %path.display(), to = %dest.display(), "copying flake source");
        copy_dir(path, dest, SOURCE_EXCLUDES).map_err(|source| FetchError::Copy {
          path: path.clone(),
          source,
        })
      }
      Input::Git { url, .. } => {
        info!(url, to = %dest.display(), "cloning flake");
        git::clone_repo(url, dest).map(|_| ())
      }
      Input::Indirect { id, .. } => Err(FetchError::Indirect(id.clone())),
    }
  }
}
