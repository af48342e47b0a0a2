//! Copying a flake and all of its inputs to another store.

use std::collections::BTreeSet;

use serde_json::{Value as Json, json};
use thiserror::Error;
use tracing::info;

use crate::fetch::Fetcher;
use crate::flake::traverse::{CollectSources, walk};
use crate::flake::{FlakeError, LockedFlake};
use crate::store::{Store, StoreError, StorePath, copy_paths};

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error(transparent)]
  Flake(#[from] FlakeError),

  #[error("failed to open destination store '{uri}': {source}")]
  OpenDestination {
    uri: String,
    #[source]
    source: StoreError,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct ArchiveOptions {
  /// Destination store URI. Without one, sources are only fetched locally.
  pub to: Option<String>,
  /// Compute store paths without fetching or copying anything.
  pub dry_run: bool,
}

/// The sources of a flake and its transitive inputs.
#[derive(Debug, Clone)]
pub struct Archive {
  pub sources: BTreeSet<StorePath>,
  /// `{"path": .., "inputs": {name: {"path": .., "inputs": {..}}}}`
  pub json: Json,
}

/// Collect (and unless dry-running, fetch and copy) every source of `locked`.
///
/// `open_destination` is only called when a destination is given and this is
/// not a dry run.
pub fn archive<D, F>(
  locked: &LockedFlake,
  store: &dyn Store,
  fetcher: &dyn Fetcher,
  options: &ArchiveOptions,
  open_destination: F,
) -> Result<Archive, ArchiveError>
where
  D: Store,
  F: FnOnce(&str) -> Result<D, StoreError>,
{
  let flake_path = locked.flake.source_info.store_path.clone();

  let mut collect = CollectSources::new(store, fetcher, options.dry_run);
  walk(&locked.lock, &mut collect)?;
  let (mut sources, inputs) = collect.finish();
  sources.insert(flake_path.clone());

  let json = json!({
    "path": store.print_store_path(&flake_path),
    "inputs": inputs,
  });

  if let Some(uri) = &options.to
    && !options.dry_run
  {
    let destination = open_destination(uri).map_err(|source| ArchiveError::OpenDestination {
      uri: uri.clone(),
      source,
    })?;
    info!(count = sources.len(), to = %uri, "copying flake sources");
    copy_paths(store, &destination, &sources)?;
  }

  Ok(Archive { sources, json })
}
