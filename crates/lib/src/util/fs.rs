//! Directory copying for store imports and clones.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Recursively copy `src` into `dest`, skipping entries whose file name is in `exclude`.
///
/// `dest` is created if missing. Symlinks are recreated rather than followed.
pub fn copy_dir(src: &Path, dest: &Path, exclude: &[&str]) -> io::Result<()> {
  fs::create_dir_all(dest)?;

  let walker = WalkDir::new(src).sort_by_file_name().into_iter().filter_entry(|e| {
    e.depth() == 0
      || e
        .file_name()
        .to_str()
        .map(|name| !exclude.contains(&name))
        .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = match entry.path().strip_prefix(src) {
      Ok(rel) if !rel.as_os_str().is_empty() => rel,
      _ => continue,
    };
    let target = dest.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path())?;
      create_symlink(&link, &target)?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target)?;
    }
  }

  Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
  if target.is_dir() {
    std::os::windows::fs::symlink_dir(target, link)
  } else {
    std::os::windows::fs::symlink_file(target, link)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn copies_nested_files() {
    let src = tempdir().unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub/a.txt"), "a").unwrap();
    fs::write(src.path().join("top.txt"), "top").unwrap();

    let dest = tempdir().unwrap();
    let out = dest.path().join("copy");
    copy_dir(src.path(), &out, &[]).unwrap();

    assert_eq!(fs::read_to_string(out.join("sub/a.txt")).unwrap(), "a");
    assert_eq!(fs::read_to_string(out.join("top.txt")).unwrap(), "top");
  }

  #[test]
  fn skips_excluded_names() {
    let src = tempdir().unwrap();
    fs::create_dir(src.path().join(".git")).unwrap();
    fs::write(src.path().join(".git/HEAD"), "ref").unwrap();
    fs::write(src.path().join("flake.json"), "{}").unwrap();

    let dest = tempdir().unwrap();
    copy_dir(src.path(), dest.path(), &[".git"]).unwrap();

    assert!(dest.path().join("flake.json").exists());
    assert!(!dest.path().join(".git").exists());
  }
}
