/// Application name used for XDG directories and environment variable prefixes.
pub const APP_NAME: &str = "flakes";

/// Manifest file name at the root of every flake.
pub const MANIFEST_FILENAME: &str = "flake.json";

/// Lock file name, stored next to the manifest.
pub const LOCK_FILENAME: &str = "flake.lock";

/// Registry document name inside the configuration directory.
pub const REGISTRY_FILENAME: &str = "registry.json";

/// Length of the hash prefix used in store path names.
pub const STORE_HASH_LEN: usize = 32;

/// Name given to fetched flake sources in the store.
pub const SOURCE_NAME: &str = "source";

/// Directory names never copied or hashed as part of a flake source.
pub const SOURCE_EXCLUDES: &[&str] = &[".git"];
