use crate::consts::APP_NAME;
use std::path::PathBuf;

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  env_path("USERPROFILE").unwrap_or_else(|| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  env_path("HOME").unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the per-user configuration directory (holds the user registry)
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  env_path("APPDATA").unwrap_or_else(home_dir).join(APP_NAME)
}

/// Returns the per-user configuration directory (holds the user registry)
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  env_path("XDG_CONFIG_HOME")
    .unwrap_or_else(|| home_dir().join(".config"))
    .join(APP_NAME)
}

/// Returns the machine-wide configuration directory (holds the system registry)
#[cfg(windows)]
pub fn system_config_dir() -> PathBuf {
  env_path("PROGRAMDATA")
    .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"))
    .join(APP_NAME)
}

/// Returns the machine-wide configuration directory (holds the system registry)
#[cfg(not(windows))]
pub fn system_config_dir() -> PathBuf {
  PathBuf::from("/etc").join(APP_NAME)
}

/// Returns the directory for data files (holds the default store)
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  env_path("APPDATA").unwrap_or_else(home_dir).join(APP_NAME)
}

/// Returns the directory for data files (holds the default store)
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  env_path("XDG_DATA_HOME")
    .unwrap_or_else(|| home_dir().join(".local").join("share"))
    .join(APP_NAME)
}

/// Returns the directory for cache files (evaluation cache, git checkouts)
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  env_path("LOCALAPPDATA")
    .unwrap_or_else(home_dir)
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for cache files (evaluation cache, git checkouts)
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  env_path("XDG_CACHE_HOME")
    .unwrap_or_else(|| home_dir().join(".cache"))
    .join(APP_NAME)
}
