//! Flake registries: tables mapping indirect references to concrete ones.
//!
//! Lookups consult the tiers in order: command-line overrides, the user
//! registry, the system registry and the global registry. The user registry is
//! the only one the tool writes.
//!
//! # Format
//!
//! ```json
//! { "version": 2,
//!   "flakes": [ { "from": { "type": "indirect", "id": "nixpkgs" },
//!                 "to": { "type": "path", "path": "/src/nixpkgs" } } ] }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;
use tracing::{debug, info};

use crate::fetch::{FetchError, Fetcher};
use crate::flakeref::{FlakeRef, FlakeRefError, Input};
use crate::settings::Settings;
use crate::store::Store;

const REGISTRY_VERSION: u64 = 2;

/// How many indirections a single resolution may follow.
const MAX_RESOLVE_DEPTH: usize = 100;

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("failed to read registry '{}': {source}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse registry '{}': {source}", path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("flake registry '{}' has unsupported version {version}", path.display())]
  UnsupportedVersion { path: PathBuf, version: u64 },

  #[error("failed to write registry '{}': {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize registry: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error(transparent)]
  FlakeRef(#[from] FlakeRefError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error("cannot find flake '{0}' in the flake registries")]
  NotFound(String),

  #[error("'{0}' is an indirect flake reference, but registry lookups are not allowed")]
  LookupsDisabled(String),

  #[error("cycle detected in flake registry for '{0}'")]
  Cycle(String),
}

/// Where a registry comes from, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryTier {
  Flag,
  User,
  System,
  Global,
}

impl fmt::Display for RegistryTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      RegistryTier::Flag => "flags ",
      RegistryTier::User => "user  ",
      RegistryTier::System => "system",
      RegistryTier::Global => "global",
    })
  }
}

/// One alias: `from` (usually indirect) maps to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
  pub from: Input,
  /// The target; its subdirectory is stored as the `dir` attribute.
  pub to: FlakeRef,
  /// Match `from` including its ref and rev.
  pub exact: bool,
}

#[derive(Serialize, Deserialize)]
struct RegistryDoc {
  version: u64,
  #[serde(default)]
  flakes: Vec<EntryDoc>,
}

#[derive(Serialize, Deserialize)]
struct EntryDoc {
  from: Map<String, Json>,
  to: Map<String, Json>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  exact: bool,
}

/// A single registry tier.
#[derive(Debug, Clone)]
pub struct Registry {
  pub tier: RegistryTier,
  pub entries: Vec<RegistryEntry>,
}

impl Registry {
  pub fn new(tier: RegistryTier) -> Self {
    Self {
      tier,
      entries: Vec::new(),
    }
  }

  /// Read a registry document; a missing file is an empty registry.
  pub fn read(path: &Path, tier: RegistryTier) -> Result<Self, RegistryError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "registry does not exist");
        return Ok(Self::new(tier));
      }
      Err(source) => {
        return Err(RegistryError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    let doc: RegistryDoc = serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    if doc.version != REGISTRY_VERSION {
      return Err(RegistryError::UnsupportedVersion {
        path: path.to_path_buf(),
        version: doc.version,
      });
    }

    let mut entries = Vec::with_capacity(doc.flakes.len());
    for entry in doc.flakes {
      entries.push(RegistryEntry {
        from: FlakeRef::from_attrs(&entry.from)?.input,
        to: FlakeRef::from_attrs(&entry.to)?,
        exact: entry.exact,
      });
    }
    debug!(path = %path.display(), count = entries.len(), "read registry");
    Ok(Self { tier, entries })
  }

  pub fn write(&self, path: &Path) -> Result<(), RegistryError> {
    let doc = RegistryDoc {
      version: REGISTRY_VERSION,
      flakes: self
        .entries
        .iter()
        .map(|entry| EntryDoc {
          from: FlakeRef::from(entry.from.clone()).to_attrs(),
          to: entry.to.to_attrs(),
          exact: entry.exact,
        })
        .collect(),
    };
    let content = serde_json::to_string_pretty(&doc)?;
    let write_error = |source| RegistryError::Write {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, content + "\n").map_err(write_error)?;
    debug!(path = %path.display(), "wrote registry");
    Ok(())
  }

  /// Insert `from -> to`, replacing any entry for the same `from`.
  pub fn add(&mut self, from: Input, to: FlakeRef) {
    self.remove(&from);
    self.entries.push(RegistryEntry { from, to, exact: false });
  }

  pub fn remove(&mut self, from: &Input) {
    self.entries.retain(|entry| &entry.from != from);
  }

  fn lookup(&self, input: &Input) -> Option<FlakeRef> {
    let Input::Indirect { id, ref_name, rev } = input else {
      return None;
    };
    self.entries.iter().find_map(|entry| {
      let hit = if entry.exact {
        &entry.from == input
      } else {
        matches!(&entry.from, Input::Indirect { id: from_id, .. } if from_id == id)
      };
      hit.then(|| FlakeRef {
        input: entry.to.input.clone().apply_overrides(ref_name.as_deref(), rev.as_deref()),
        subdir: entry.to.subdir.clone(),
      })
    })
  }
}

/// Every registry tier in lookup order.
#[derive(Debug, Clone)]
pub struct Registries {
  tiers: Vec<Registry>,
  lookups_enabled: bool,
}

impl Registries {
  /// Load the tiers configured in `settings`.
  ///
  /// Relative paths in `--override-flake` arguments are resolved against `cwd`.
  pub fn load(settings: &Settings, cwd: &Path) -> Result<Self, RegistryError> {
    let mut flags = Registry::new(RegistryTier::Flag);
    for (from, to) in &settings.flake_overrides {
      let from = FlakeRef::parse(from, Some(cwd))?;
      let to = FlakeRef::parse(to, Some(cwd))?;
      flags.add(from.input, to);
    }

    let mut tiers = vec![
      flags,
      Registry::read(&settings.user_registry, RegistryTier::User)?,
      Registry::read(&settings.system_registry, RegistryTier::System)?,
    ];
    if let Some(global) = &settings.global_registry {
      tiers.push(Registry::read(global, RegistryTier::Global)?);
    }
    Ok(Self {
      tiers,
      lookups_enabled: settings.use_registries,
    })
  }

  pub fn from_tiers(tiers: Vec<Registry>) -> Self {
    Self {
      tiers,
      lookups_enabled: true,
    }
  }

  pub fn tiers(&self) -> &[Registry] {
    &self.tiers
  }

  /// Resolve an indirect reference to a direct one; direct references pass through.
  pub fn resolve(&self, flake_ref: &FlakeRef) -> Result<FlakeRef, RegistryError> {
    let mut current = flake_ref.clone();
    for _ in 0..MAX_RESOLVE_DEPTH {
      if current.input.is_direct() {
        if current != *flake_ref {
          debug!(from = %flake_ref, to = %current, "resolved flake reference");
        }
        return Ok(current);
      }
      if !self.lookups_enabled {
        return Err(RegistryError::LookupsDisabled(flake_ref.to_string()));
      }
      let found = self
        .tiers
        .iter()
        .find_map(|registry| registry.lookup(&current.input))
        .ok_or_else(|| RegistryError::NotFound(current.to_string()))?;
      current = FlakeRef {
        subdir: current.subdir.clone().or(found.subdir),
        input: found.input,
      };
    }
    Err(RegistryError::Cycle(flake_ref.to_string()))
  }
}

/// `add`: map `from` to `to` in the user registry.
pub fn add_entry(user_registry: &Path, from: &str, to: &str, cwd: &Path) -> Result<(), RegistryError> {
  let from = FlakeRef::parse(from, Some(cwd))?;
  let to = FlakeRef::parse(to, Some(cwd))?;
  let mut registry = Registry::read(user_registry, RegistryTier::User)?;
  info!(from = %from, to = %to, "adding registry entry");
  registry.add(from.input, to);
  registry.write(user_registry)
}

/// `remove`: drop every user registry entry for `url`.
pub fn remove_entry(user_registry: &Path, url: &str, cwd: &Path) -> Result<(), RegistryError> {
  let from = FlakeRef::parse(url, Some(cwd))?;
  let mut registry = Registry::read(user_registry, RegistryTier::User)?;
  registry.remove(&from.input);
  registry.write(user_registry)
}

/// `pin`: map `url` to the locked form of what it currently resolves to.
pub fn pin_entry(
  user_registry: &Path,
  registries: &Registries,
  store: &dyn Store,
  fetcher: &dyn Fetcher,
  url: &str,
  cwd: &Path,
) -> Result<FlakeRef, RegistryError> {
  let flake_ref = FlakeRef::parse(url, Some(cwd))?;
  let resolved = registries.resolve(&flake_ref)?;
  let (_, locked) = fetcher.fetch(store, &resolved.input)?;
  let pinned = FlakeRef {
    input: locked,
    subdir: flake_ref.subdir.clone().or(resolved.subdir),
  };

  let mut registry = Registry::read(user_registry, RegistryTier::User)?;
  info!(from = %flake_ref, to = %pinned, "pinning registry entry");
  registry.add(flake_ref.input, pinned.clone());
  registry.write(user_registry)?;
  Ok(pinned)
}
