//! Attribute-path keyed caching of forced values.
//!
//! [`CachedCursor`] wraps any [`EvalCursor`]. Forcing a path consults the
//! [`EvalCache`] first; on a miss the wrapped cursor is created (lazily, by
//! walking down from the nearest already-created ancestor) and forced, and the
//! outcome, success or failure, is recorded. Attribute lookups are answered from
//! the parent's cached value, so a fully cached walk never touches the
//! evaluator.
//!
//! A cache is tied to a fingerprint of everything that determines the output
//! tree and can be persisted to `<dir>/<fingerprint>.json`.

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::attr_path::AttrPath;

use super::{EvalCursor, EvalError, Value};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to write evaluation cache '{}': {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize evaluation cache: {0}")]
  Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "camelCase")]
enum CacheEntry {
  Value(Value),
  Failed(EvalError),
}

/// Forced values keyed by attribute path.
#[derive(Debug, Default)]
pub struct EvalCache {
  file: Option<PathBuf>,
  entries: BTreeMap<AttrPath, CacheEntry>,
  dirty: bool,
  hits: usize,
}

impl EvalCache {
  /// A cache that lives only as long as this value.
  pub fn in_memory() -> Self {
    Self::default()
  }

  /// Load the cache for `fingerprint` from `dir`, or start an empty one.
  ///
  /// An unreadable cache file is discarded rather than reported.
  pub fn open(dir: &Path, fingerprint: &str) -> Self {
    let file = dir.join(format!("{}.json", fingerprint));
    let entries = match fs::read_to_string(&file) {
      Ok(content) => match serde_json::from_str::<Vec<(AttrPath, CacheEntry)>>(&content) {
        Ok(entries) => {
          debug!(path = %file.display(), count = entries.len(), "loaded evaluation cache");
          entries.into_iter().collect()
        }
        Err(e) => {
          warn!(path = %file.display(), error = %e, "ignoring corrupt evaluation cache");
          BTreeMap::new()
        }
      },
      Err(_) => BTreeMap::new(),
    };
    Self {
      file: Some(file),
      entries,
      dirty: false,
      hits: 0,
    }
  }

  /// Number of lookups answered from the cache.
  pub fn hits(&self) -> usize {
    self.hits
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Persist new entries, if this cache is backed by a file.
  pub fn save(&mut self) -> Result<(), CacheError> {
    let Some(file) = &self.file else {
      return Ok(());
    };
    if !self.dirty {
      return Ok(());
    }
    let entries: Vec<_> = self.entries.iter().collect();
    let content = serde_json::to_string(&entries)?;
    let write = |path: &Path| -> io::Result<()> {
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::write(path, content)
    };
    write(file).map_err(|source| CacheError::Write {
      path: file.clone(),
      source,
    })?;
    debug!(path = %file.display(), count = self.entries.len(), "saved evaluation cache");
    self.dirty = false;
    Ok(())
  }

  fn lookup(&mut self, path: &AttrPath) -> Option<Result<Value, EvalError>> {
    let result = match self.entries.get(path)? {
      CacheEntry::Value(v) => Ok(v.clone()),
      CacheEntry::Failed(e) => Err(e.clone()),
    };
    self.hits += 1;
    Some(result)
  }

  fn record(&mut self, path: &AttrPath, result: &Result<Value, EvalError>) {
    let entry = match result {
      Ok(v) => CacheEntry::Value(v.clone()),
      Err(e) => CacheEntry::Failed(e.clone()),
    };
    self.entries.insert(path.clone(), entry);
    self.dirty = true;
  }
}

struct Node<C> {
  parent: Option<(Rc<Node<C>>, String)>,
  path: AttrPath,
  inner: OnceCell<C>,
  cache: Rc<RefCell<EvalCache>>,
}

impl<C: EvalCursor> Node<C> {
  fn inner(&self) -> Result<&C, EvalError> {
    if let Some(cursor) = self.inner.get() {
      return Ok(cursor);
    }
    let Some((parent, name)) = &self.parent else {
      return Err(EvalError::Other("evaluation cache has no root cursor".to_string()));
    };
    let cursor = parent.inner()?.child(name)?;
    Ok(self.inner.get_or_init(|| cursor))
  }
}

/// An [`EvalCursor`] answering from an [`EvalCache`] before evaluating.
pub struct CachedCursor<C> {
  node: Rc<Node<C>>,
}

impl<C> Clone for CachedCursor<C> {
  fn clone(&self) -> Self {
    Self {
      node: self.node.clone(),
    }
  }
}

impl<C: EvalCursor> CachedCursor<C> {
  pub fn new(root: C, cache: Rc<RefCell<EvalCache>>) -> Self {
    let path = root.path().clone();
    Self {
      node: Rc::new(Node {
        parent: None,
        path,
        inner: OnceCell::from(root),
        cache,
      }),
    }
  }
}

impl<C: EvalCursor> EvalCursor for CachedCursor<C> {
  fn path(&self) -> &AttrPath {
    &self.node.path
  }

  fn pos(&self) -> String {
    match self.node.inner() {
      Ok(cursor) => cursor.pos(),
      Err(_) => format!("«cached {}»", self.node.path),
    }
  }

  fn force(&self) -> Result<Value, EvalError> {
    let cached = self.node.cache.borrow_mut().lookup(&self.node.path);
    if let Some(result) = cached {
      return result;
    }
    let result = self.node.inner().and_then(|cursor| cursor.force());
    self.node.cache.borrow_mut().record(&self.node.path, &result);
    result
  }

  fn maybe_child(&self, name: &str) -> Result<Option<Self>, EvalError> {
    let value = self.force()?;
    let Some(names) = value.attr_names() else {
      return Err(EvalError::type_mismatch("a set", &value));
    };
    if !names.iter().any(|n| n == name) {
      return Ok(None);
    }
    Ok(Some(CachedCursor {
      node: Rc::new(Node {
        parent: Some((self.node.clone(), name.to_string())),
        path: self.node.path.child(name),
        inner: OnceCell::new(),
        cache: self.node.cache.clone(),
      }),
    }))
  }
}
