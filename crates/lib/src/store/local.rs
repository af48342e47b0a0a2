//! A directory-backed store that realises derivations by running their builders.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::consts::SOURCE_EXCLUDES;
use crate::util::fs::copy_dir;
use crate::util::hash::{ContentHash, hash_directory};

use super::{Derivation, Store, StoreError, StorePath};

/// A store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
  dir: PathBuf,
  system: String,
}

impl LocalStore {
  /// Open (creating if needed) the store at `dir`, building for `system`.
  pub fn open(dir: &Path, system: &str) -> Result<Self, StoreError> {
    fs::create_dir_all(dir).map_err(StoreError::io(dir))?;
    Ok(Self {
      dir: dir.to_path_buf(),
      system: system.to_string(),
    })
  }

  pub fn system(&self) -> &str {
    &self.system
  }

  fn build_derivation(&self, drv_path: &StorePath) -> Result<(), StoreError> {
    let drv = self.read_derivation(drv_path)?;
    let out_path = drv.out_path()?;
    let out = self.real_path(&out_path);
    let printed_drv = self.print_store_path(drv_path);

    if out.exists() {
      debug!(path = %out.display(), "output already valid");
      return Ok(());
    }
    if drv.system != self.system {
      return Err(StoreError::WrongSystem {
        drv: printed_drv,
        required: drv.system,
        current: self.system.clone(),
      });
    }

    info!(drv = %printed_drv, "building");
    let Some(builder) = &drv.builder else {
      return fs::create_dir_all(&out).map_err(StoreError::io(&out));
    };

    let build_dir = tempfile::Builder::new()
      .prefix("flakes-build-")
      .tempdir()
      .map_err(StoreError::io(&self.dir))?;

    let mut command = Command::new(builder);
    command
      .args(&drv.args)
      .current_dir(build_dir.path())
      .env_clear()
      .env("PATH", std::env::var_os("PATH").unwrap_or_default())
      .env("HOME", "/homeless-shelter")
      .env("TMPDIR", build_dir.path())
      .env("NIX_BUILD_TOP", build_dir.path())
      .env("LANG", "C")
      .env("SOURCE_DATE_EPOCH", "315532800")
      .env("name", &drv.name)
      .env("system", &drv.system)
      .envs(&drv.env)
      .env("out", &out)
      .stdin(Stdio::null())
      .stdout(Stdio::from(std::io::stderr()));

    let status = command.status().map_err(|source| StoreError::Spawn {
      drv: printed_drv.clone(),
      source,
    })?;

    if !status.success() {
      remove_partial(&out);
      return Err(StoreError::BuildFailed {
        drv: printed_drv,
        code: status.code().unwrap_or(-1),
      });
    }
    if !out.exists() {
      return Err(StoreError::NoOutput(printed_drv));
    }

    debug!(path = %out.display(), "build complete");
    Ok(())
  }
}

fn remove_partial(path: &Path) {
  if !path.exists() {
    return;
  }
  let result = if path.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };
  if let Err(e) = result {
    debug!(path = %path.display(), error = %e, "failed to remove partial output");
  }
}

impl Store for LocalStore {
  fn store_dir(&self) -> &Path {
    &self.dir
  }

  fn write_derivation(&self, drv: &Derivation) -> Result<StorePath, StoreError> {
    let path = drv.drv_path()?;
    let real = self.real_path(&path);
    if !real.exists() {
      let content = serde_json::to_string_pretty(drv).map_err(StoreError::Serialize)?;
      fs::write(&real, content).map_err(StoreError::io(&real))?;
      debug!(path = %real.display(), "wrote derivation");
    }
    Ok(path)
  }

  fn read_derivation(&self, path: &StorePath) -> Result<Derivation, StoreError> {
    let real = self.real_path(path);
    let content = fs::read_to_string(&real).map_err(StoreError::io(&real))?;
    serde_json::from_str(&content).map_err(|source| StoreError::ParseDerivation {
      path: real.to_string_lossy().into_owned(),
      source,
    })
  }

  fn add_source(&self, dir: &Path, name: &str) -> Result<(StorePath, ContentHash), StoreError> {
    let nar_hash = hash_directory(dir, SOURCE_EXCLUDES)?;
    let path = self.source_path(&nar_hash, name)?;
    if !self.is_valid_path(&path) {
      let real = self.real_path(&path);
      let staging = self.dir.join(format!(".{}.tmp", path.hash_part()));
      remove_partial(&staging);
      copy_dir(dir, &staging, SOURCE_EXCLUDES).map_err(StoreError::io(dir))?;
      fs::rename(&staging, &real).map_err(StoreError::io(&real))?;
      debug!(path = %real.display(), "added source");
    }
    Ok((path, nar_hash))
  }

  fn import_path(&self, path: &StorePath, from: &Path) -> Result<(), StoreError> {
    let real = self.real_path(path);
    if from.is_dir() {
      copy_dir(from, &real, &[]).map_err(StoreError::io(from))?;
    } else {
      fs::copy(from, &real).map_err(StoreError::io(from))?;
    }
    debug!(path = %real.display(), "imported path");
    Ok(())
  }

  fn build_paths(&self, paths: &BTreeSet<StorePath>) -> Result<(), StoreError> {
    for path in paths {
      if path.is_derivation() {
        self.build_derivation(path)?;
      } else if !self.is_valid_path(path) {
        return Err(StoreError::NotValid(self.print_store_path(path)));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use tempfile::TempDir;

  use super::*;
  use crate::util::testutil::shell_cmd;

  const SYSTEM: &str = "x86_64-linux";

  fn scripted(name: &str, script: &str) -> Derivation {
    let (builder, args) = shell_cmd(script);
    Derivation {
      name: name.to_string(),
      system: SYSTEM.to_string(),
      builder: Some(builder.to_string()),
      args,
      env: BTreeMap::new(),
    }
  }

  fn store(temp: &TempDir) -> LocalStore {
    LocalStore::open(&temp.path().join("store"), SYSTEM).unwrap()
  }

  #[test]
  fn write_and_read_derivation() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let drv = scripted("hello", "true");

    let path = store.write_derivation(&drv).unwrap();
    assert!(store.is_valid_path(&path));
    assert_eq!(store.read_derivation(&path).unwrap(), drv);

    let printed = store.print_store_path(&path);
    assert_eq!(store.parse_store_path(&printed).unwrap(), path);
    assert!(store.parse_store_path("/elsewhere/x").is_err());
  }

  #[cfg(unix)]
  #[test]
  fn build_runs_builder_once() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let counter = temp.path().join("count");
    let drv = scripted(
      "counted",
      &format!("mkdir -p \"$out\" && echo run >> '{}'", counter.display()),
    );
    let path = store.write_derivation(&drv).unwrap();

    let set = BTreeSet::from([path]);
    store.build_paths(&set).unwrap();
    store.build_paths(&set).unwrap();

    assert!(store.real_path(&drv.out_path().unwrap()).is_dir());
    assert_eq!(fs::read_to_string(&counter).unwrap().lines().count(), 1);
  }

  #[cfg(unix)]
  #[test]
  fn failing_builder_reports_exit_code() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let drv = scripted("broken", "mkdir -p \"$out\"; exit 3");
    let path = store.write_derivation(&drv).unwrap();

    let err = store.build_paths(&BTreeSet::from([path])).unwrap_err();
    assert!(err.to_string().contains("failed with exit code 3"), "{}", err);
    assert!(!store.real_path(&drv.out_path().unwrap()).exists());
  }

  #[test]
  fn build_without_builder_creates_output() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let mut drv = scripted("empty", "");
    drv.builder = None;
    drv.args.clear();
    let path = store.write_derivation(&drv).unwrap();

    store.build_paths(&BTreeSet::from([path])).unwrap();
    assert!(store.real_path(&drv.out_path().unwrap()).is_dir());
  }

  #[test]
  fn refuses_foreign_system() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let mut drv = scripted("foreign", "true");
    drv.system = "riscv64-linux".to_string();
    let path = store.write_derivation(&drv).unwrap();

    let err = store.build_paths(&BTreeSet::from([path])).unwrap_err();
    assert!(matches!(err, StoreError::WrongSystem { .. }));
  }

  #[test]
  fn add_source_is_content_addressed() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let src = temp.path().join("src");
    fs::create_dir_all(src.join(".git")).unwrap();
    fs::write(src.join("flake.json"), "{}").unwrap();
    fs::write(src.join(".git/HEAD"), "ref").unwrap();

    let (path, hash) = store.add_source(&src, "source").unwrap();
    let (again, hash_again) = store.add_source(&src, "source").unwrap();
    assert_eq!(path, again);
    assert_eq!(hash, hash_again);
    assert_eq!(path.name(), "source");

    let real = store.real_path(&path);
    assert!(real.join("flake.json").is_file());
    assert!(!real.join(".git").exists());
  }

  #[test]
  fn copy_paths_skips_present() {
    let temp = TempDir::new().unwrap();
    let src = store(&temp);
    let dst = LocalStore::open(&temp.path().join("dst"), SYSTEM).unwrap();
    let dir = temp.path().join("tree");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a"), "a").unwrap();
    let (path, _) = src.add_source(&dir, "source").unwrap();

    let set = BTreeSet::from([path.clone()]);
    super::super::copy_paths(&src, &dst, &set).unwrap();
    super::super::copy_paths(&src, &dst, &set).unwrap();
    assert!(dst.real_path(&path).join("a").is_file());
  }
}
