//! Runtime settings resolved from the environment.
//!
//! Every path has a platform default (see [`crate::platform::paths`]) that an
//! environment variable can replace. The command-line front end applies its
//! global flags on top of [`Settings::from_env`].

use std::path::PathBuf;

use crate::consts::REGISTRY_FILENAME;
use crate::platform::current_system;
use crate::platform::paths::{cache_dir, config_dir, data_dir, system_config_dir};

/// Where the store lives (default `$XDG_DATA_HOME/flakes/store`).
pub const STORE_ENV: &str = "FLAKES_STORE";
/// The evaluation platform (default: the host's `arch-os`).
pub const SYSTEM_ENV: &str = "FLAKES_SYSTEM";
pub const USER_REGISTRY_ENV: &str = "FLAKES_USER_REGISTRY";
pub const SYSTEM_REGISTRY_ENV: &str = "FLAKES_SYSTEM_REGISTRY";
pub const GLOBAL_REGISTRY_ENV: &str = "FLAKES_GLOBAL_REGISTRY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
  pub store_dir: PathBuf,
  pub system: String,
  pub user_registry: PathBuf,
  pub system_registry: PathBuf,
  pub global_registry: Option<PathBuf>,
  pub cache_dir: PathBuf,
  /// Whether indirect references may be looked up in registries.
  pub use_registries: bool,
  /// `(from, to)` pairs given with `--override-flake`.
  pub flake_overrides: Vec<(String, String)>,
}

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

impl Settings {
  pub fn from_env() -> Self {
    Self {
      store_dir: env_path(STORE_ENV).unwrap_or_else(|| data_dir().join("store")),
      system: std::env::var(SYSTEM_ENV)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(current_system),
      user_registry: env_path(USER_REGISTRY_ENV).unwrap_or_else(|| config_dir().join(REGISTRY_FILENAME)),
      system_registry: env_path(SYSTEM_REGISTRY_ENV).unwrap_or_else(|| system_config_dir().join(REGISTRY_FILENAME)),
      global_registry: env_path(GLOBAL_REGISTRY_ENV),
      cache_dir: cache_dir(),
      use_registries: true,
      flake_overrides: Vec::new(),
    }
  }

  /// Directory of persisted evaluation caches.
  pub fn eval_cache_dir(&self) -> PathBuf {
    self.cache_dir.join("eval-cache")
  }

  /// Directory of git checkouts.
  pub fn git_cache_dir(&self) -> PathBuf {
    self.cache_dir.join("git")
  }
}
