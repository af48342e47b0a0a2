//! Git checkouts via gix.
//!
//! Repositories are cloned once into the checkout cache (keyed by URL) and
//! fetched on later use. Only the worktree of the default branch is
//! materialised, so a pinned revision must be what HEAD currently points at.

use std::fs;
use std::path::{Path, PathBuf};

use gix::remote::Direction;
use tracing::{debug, info};

use crate::util::hash::hash_bytes;

use super::FetchError;

/// A checked-out commit.
#[derive(Debug, Clone)]
pub struct Checkout {
  pub worktree: PathBuf,
  pub rev: String,
  pub rev_count: u64,
  pub last_modified: u64,
}

/// Clone or update `url` under `cache_dir` and resolve `wanted` (a rev or ref).
pub fn fetch_git(url: &str, wanted: Option<&str>, cache_dir: &Path) -> Result<Checkout, FetchError> {
  let repo_path = cache_dir.join(hash_bytes(url.as_bytes()).short().0);

  if !cache_dir.exists() {
    fs::create_dir_all(cache_dir).map_err(|e| FetchError::CreateCacheDir(cache_dir.to_path_buf(), e))?;
  }

  let repo = if repo_path.join(".git").exists() {
    debug!(url, path = %repo_path.display(), "opening existing checkout");
    let repo = gix::open(&repo_path).map_err(|e| FetchError::Open {
      path: repo_path.clone(),
      source: Box::new(e),
    })?;
    fetch_updates(&repo, url)?;
    repo
  } else {
    info!(url, path = %repo_path.display(), "cloning repository");
    clone_repo(url, &repo_path)?
  };

  let head = resolve_revision(&repo, None)?;
  let rev = match wanted {
    Some(wanted) => {
      let rev = resolve_revision(&repo, Some(wanted)).or_else(|_| resolve_revision(&repo, Some(&format!("origin/{}", wanted))))?;
      if rev != head {
        return Err(FetchError::RevisionMismatch { rev, head });
      }
      rev
    }
    None => head,
  };

  let (rev_count, last_modified) = commit_stats(&repo, &rev)?;
  debug!(url, rev = %rev, rev_count, "resolved revision");
  Ok(Checkout {
    worktree: repo_path,
    rev,
    rev_count,
    last_modified,
  })
}

/// Clone a git repository to the specified path.
pub fn clone_repo(url: &str, dest: &Path) -> Result<gix::Repository, FetchError> {
  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| FetchError::Clone {
    url: url.to_string(),
    source: Box::new(e),
  })?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Clone {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Checkout {
      rev: "HEAD".to_string(),
      source: Box::new(e),
    })?;

  Ok(repo)
}

fn fetch_updates(repo: &gix::Repository, url: &str) -> Result<(), FetchError> {
  debug!(url, "fetching updates");

  let remote = repo
    .find_default_remote(Direction::Fetch)
    .ok_or(FetchError::NoRemote)?
    .map_err(|e| FetchError::Connect {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let connection = remote.connect(Direction::Fetch).map_err(|e| FetchError::Connect {
    url: url.to_string(),
    source: Box::new(e),
  })?;

  connection
    .prepare_fetch(gix::progress::Discard, Default::default())
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?
    .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  Ok(())
}

/// Resolve a revision spec to a commit hash; `None` means HEAD.
fn resolve_revision(repo: &gix::Repository, rev: Option<&str>) -> Result<String, FetchError> {
  match rev {
    Some(rev_str) => {
      let spec = repo.rev_parse(rev_str).map_err(|_| FetchError::RevisionNotFound {
        rev: rev_str.to_string(),
      })?;

      let object_id = spec.single().ok_or_else(|| FetchError::RevisionNotFound {
        rev: format!("{} (ambiguous)", rev_str),
      })?;

      let not_found = |e: &dyn std::fmt::Display| FetchError::RevisionNotFound {
        rev: format!("{}: {}", rev_str, e),
      };
      let commit = object_id
        .object()
        .map_err(|e| not_found(&e))?
        .peel_to_commit()
        .map_err(|e| not_found(&e))?;

      Ok(commit.id.to_string())
    }
    None => {
      let mut head = repo.head().map_err(|e| FetchError::ResolveHead(e.to_string()))?;
      let commit = head
        .peel_to_commit()
        .map_err(|e| FetchError::ResolveHead(e.to_string()))?;
      Ok(commit.id.to_string())
    }
  }
}

/// Number of ancestors (inclusive) and commit time of `rev`.
fn commit_stats(repo: &gix::Repository, rev: &str) -> Result<(u64, u64), FetchError> {
  let stats_error = |e: &dyn std::fmt::Display| FetchError::RevisionNotFound {
    rev: format!("{}: {}", rev, e),
  };
  let id = gix::ObjectId::from_hex(rev.as_bytes()).map_err(|e| stats_error(&e))?;
  let commit = repo.find_commit(id).map_err(|e| stats_error(&e))?;
  let time = commit.time().map_err(|e| stats_error(&e))?;
  let walk = repo.rev_walk([id]).all().map_err(|e| stats_error(&e))?;
  let count = walk.filter_map(Result::ok).count() as u64;
  Ok((count, time.seconds.max(0) as u64))
}
