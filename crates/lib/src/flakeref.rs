//! Flake references: where a flake's source lives.
//!
//! A reference is an [`Input`] (a path, a git repository or a registry alias)
//! plus an optional subdirectory. References are written as URLs
//! (`path:/src/foo?narHash=...`, `git+https://host/repo?ref=main`,
//! `flake:nixpkgs/unstable`) and stored in lock files as attribute maps.

use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json, json};
use thiserror::Error;
use url::form_urlencoded;

use crate::util::hash::ContentHash;

#[derive(Debug, Error, PartialEq)]
pub enum FlakeRefError {
  #[error("'{url}' is not a valid flake reference: {reason}")]
  Invalid { url: String, reason: String },

  #[error("input type '{0}' is not supported")]
  UnsupportedType(String),

  #[error("relative path '{0}' needs a base directory")]
  RelativePath(String),

  #[error("invalid flake input attributes: {0}")]
  BadAttrs(String),
}

fn invalid(url: &str, reason: impl Into<String>) -> FlakeRefError {
  FlakeRefError::Invalid {
    url: url.to_string(),
    reason: reason.into(),
  }
}

/// A source of flake content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
  /// A local directory, copied into the store as-is.
  Path {
    path: PathBuf,
    nar_hash: Option<ContentHash>,
    last_modified: Option<u64>,
  },
  /// A git repository.
  Git {
    url: String,
    ref_name: Option<String>,
    rev: Option<String>,
    nar_hash: Option<ContentHash>,
    last_modified: Option<u64>,
    rev_count: Option<u64>,
  },
  /// An alias resolved through the registry.
  Indirect {
    id: String,
    ref_name: Option<String>,
    rev: Option<String>,
  },
}

impl Input {
  pub fn path(path: impl Into<PathBuf>) -> Self {
    Input::Path {
      path: path.into(),
      nar_hash: None,
      last_modified: None,
    }
  }

  pub fn indirect(id: &str) -> Self {
    Input::Indirect {
      id: id.to_string(),
      ref_name: None,
      rev: None,
    }
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Input::Path { .. } => "path",
      Input::Git { .. } => "git",
      Input::Indirect { .. } => "indirect",
    }
  }

  /// Whether the input pins its content exactly.
  pub fn is_locked(&self) -> bool {
    match self {
      Input::Path { nar_hash, .. } => nar_hash.is_some(),
      Input::Git { rev, .. } => rev.is_some(),
      Input::Indirect { .. } => false,
    }
  }

  pub fn is_direct(&self) -> bool {
    !matches!(self, Input::Indirect { .. })
  }

  pub fn nar_hash(&self) -> Option<&ContentHash> {
    match self {
      Input::Path { nar_hash, .. } | Input::Git { nar_hash, .. } => nar_hash.as_ref(),
      Input::Indirect { .. } => None,
    }
  }

  pub fn rev(&self) -> Option<&str> {
    match self {
      Input::Git { rev, .. } | Input::Indirect { rev, .. } => rev.as_deref(),
      Input::Path { .. } => None,
    }
  }

  pub fn ref_name(&self) -> Option<&str> {
    match self {
      Input::Git { ref_name, .. } | Input::Indirect { ref_name, .. } => ref_name.as_deref(),
      Input::Path { .. } => None,
    }
  }

  pub fn last_modified(&self) -> Option<u64> {
    match self {
      Input::Path { last_modified, .. } | Input::Git { last_modified, .. } => *last_modified,
      Input::Indirect { .. } => None,
    }
  }

  pub fn rev_count(&self) -> Option<u64> {
    match self {
      Input::Git { rev_count, .. } => *rev_count,
      _ => None,
    }
  }

  /// Apply the `ref`/`rev` of `other` on top of this input.
  ///
  /// Used when an indirect reference carrying a ref or rev resolves through the
  /// registry to a direct one.
  pub fn apply_overrides(mut self, ref_name: Option<&str>, rev: Option<&str>) -> Self {
    if let Input::Git {
      ref_name: r, rev: v, ..
    }
    | Input::Indirect {
      ref_name: r, rev: v, ..
    } = &mut self
    {
      if let Some(ref_name) = ref_name {
        *r = Some(ref_name.to_string());
      }
      if let Some(rev) = rev {
        *v = Some(rev.to_string());
      }
    }
    self
  }

  fn query(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(r) = self.ref_name()
      && self.is_direct()
    {
      pairs.push(("ref", r.to_string()));
    }
    if let Some(rev) = self.rev()
      && self.is_direct()
    {
      pairs.push(("rev", rev.to_string()));
    }
    if let Some(count) = self.rev_count() {
      pairs.push(("revCount", count.to_string()));
    }
    if let Some(modified) = self.last_modified() {
      pairs.push(("lastModified", modified.to_string()));
    }
    if let Some(hash) = self.nar_hash() {
      pairs.push(("narHash", hash.to_string()));
    }
    pairs
  }
}

/// An [`Input`] plus the subdirectory holding `flake.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeRef {
  pub input: Input,
  pub subdir: Option<String>,
}

impl From<Input> for FlakeRef {
  fn from(input: Input) -> Self {
    Self { input, subdir: None }
  }
}

fn is_flake_id(s: &str) -> bool {
  let mut chars = s.chars();
  chars.next().is_some_and(|c| c.is_ascii_alphabetic())
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_u64(url: &str, key: &str, value: &str) -> Result<u64, FlakeRefError> {
  value
    .parse()
    .map_err(|_| invalid(url, format!("'{}' must be an integer", key)))
}

fn parse_hash(url: &str, value: &str) -> Result<ContentHash, FlakeRefError> {
  ContentHash::parse(value).ok_or_else(|| invalid(url, format!("invalid hash '{}'", value)))
}

fn absolutize(path: &str, base: Option<&Path>) -> Result<PathBuf, FlakeRefError> {
  let path = Path::new(path);
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  let base = base.ok_or_else(|| FlakeRefError::RelativePath(path.display().to_string()))?;
  let joined = base.join(path);
  Ok(dunce::canonicalize(&joined).unwrap_or(joined))
}

impl FlakeRef {
  /// Parse a reference. Relative paths are resolved against `base`.
  pub fn parse(url: &str, base: Option<&Path>) -> Result<Self, FlakeRefError> {
    let (body, query) = match url.split_once('?') {
      Some((body, query)) => (body, Some(query)),
      None => (url, None),
    };
    let params: Vec<(String, String)> = query
      .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
      .unwrap_or_default();

    let mut subdir = None;
    let mut ref_name = None;
    let mut rev = None;
    let mut nar_hash = None;
    let mut last_modified = None;
    let mut rev_count = None;
    for (key, value) in &params {
      match key.as_str() {
        "dir" => subdir = Some(value.clone()).filter(|d| !d.is_empty()),
        "ref" => ref_name = Some(value.clone()),
        "rev" => rev = Some(value.clone()),
        "narHash" => nar_hash = Some(parse_hash(url, value)?),
        "lastModified" => last_modified = Some(parse_u64(url, key, value)?),
        "revCount" => rev_count = Some(parse_u64(url, key, value)?),
        other => return Err(invalid(url, format!("unsupported attribute '{}'", other))),
      }
    }

    let input = if let Some(path) = body.strip_prefix("path:") {
      Input::Path {
        path: absolutize(path, base)?,
        nar_hash,
        last_modified,
      }
    } else if let Some(repo) = body.strip_prefix("git+") {
      let parsed = url::Url::parse(repo).map_err(|e| invalid(url, e.to_string()))?;
      let repo = if parsed.scheme() == "file" {
        let path = parsed
          .to_file_path()
          .map_err(|_| invalid(url, "invalid file URL"))?;
        format!("file://{}", path.display())
      } else {
        parsed.to_string()
      };
      Input::Git {
        url: repo,
        ref_name,
        rev,
        nar_hash,
        last_modified,
        rev_count,
      }
    } else if let Some(alias) = body.strip_prefix("flake:").or_else(|| is_flake_id(body.split('/').next().unwrap_or("")).then_some(body)) {
      let mut parts = alias.splitn(3, '/');
      let id = parts.next().unwrap_or_default();
      if !is_flake_id(id) {
        return Err(invalid(url, format!("'{}' is not a valid flake ID", id)));
      }
      let (path_ref, path_rev) = match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => (Some(a.to_string()), Some(b.to_string())),
        (Some(a), None) if is_commit_hash(a) => (None, Some(a.to_string())),
        (Some(a), None) => (Some(a.to_string()), None),
        _ => (None, None),
      };
      Input::Indirect {
        id: id.to_string(),
        ref_name: path_ref.or(ref_name),
        rev: path_rev.or(rev),
      }
    } else if body.starts_with('.') || body.starts_with('/') {
      Input::Path {
        path: absolutize(body, base)?,
        nar_hash,
        last_modified,
      }
    } else if let Some((scheme, _)) = body.split_once(':') {
      return Err(FlakeRefError::UnsupportedType(scheme.to_string()));
    } else {
      return Err(invalid(url, "unrecognised syntax"));
    };

    Ok(Self { input, subdir })
  }

  /// Parse a reference as stored in a lock file or registry.
  pub fn from_attrs(attrs: &Map<String, Json>) -> Result<Self, FlakeRefError> {
    let get_str = |key: &str| attrs.get(key).and_then(Json::as_str).map(str::to_string);
    let get_u64 = |key: &str| attrs.get(key).and_then(Json::as_u64);
    let nar_hash = match get_str("narHash") {
      Some(h) => Some(
        ContentHash::parse(&h).ok_or_else(|| FlakeRefError::BadAttrs(format!("invalid narHash '{}'", h)))?,
      ),
      None => None,
    };
    let missing = |key: &str| FlakeRefError::BadAttrs(format!("missing attribute '{}'", key));

    let input = match get_str("type").as_deref() {
      Some("path") => Input::Path {
        path: PathBuf::from(get_str("path").ok_or_else(|| missing("path"))?),
        nar_hash,
        last_modified: get_u64("lastModified"),
      },
      Some("git") => Input::Git {
        url: get_str("url").ok_or_else(|| missing("url"))?,
        ref_name: get_str("ref"),
        rev: get_str("rev"),
        nar_hash,
        last_modified: get_u64("lastModified"),
        rev_count: get_u64("revCount"),
      },
      Some("indirect") => Input::Indirect {
        id: get_str("id").ok_or_else(|| missing("id"))?,
        ref_name: get_str("ref"),
        rev: get_str("rev"),
      },
      Some(other) => return Err(FlakeRefError::UnsupportedType(other.to_string())),
      None => return Err(missing("type")),
    };
    Ok(Self {
      input,
      subdir: get_str("dir"),
    })
  }

  /// The attribute-map form, as stored in lock files and registries.
  pub fn to_attrs(&self) -> Map<String, Json> {
    let mut attrs = Map::new();
    attrs.insert("type".into(), json!(self.input.type_name()));
    match &self.input {
      Input::Path { path, .. } => {
        attrs.insert("path".into(), json!(path.to_string_lossy()));
      }
      Input::Git { url, .. } => {
        attrs.insert("url".into(), json!(url));
      }
      Input::Indirect { id, .. } => {
        attrs.insert("id".into(), json!(id));
      }
    }
    if let Some(r) = self.input.ref_name() {
      attrs.insert("ref".into(), json!(r));
    }
    if let Some(rev) = self.input.rev() {
      attrs.insert("rev".into(), json!(rev));
    }
    if let Some(count) = self.input.rev_count() {
      attrs.insert("revCount".into(), json!(count));
    }
    if let Some(modified) = self.input.last_modified() {
      attrs.insert("lastModified".into(), json!(modified));
    }
    if let Some(hash) = self.input.nar_hash() {
      attrs.insert("narHash".into(), json!(hash.to_string()));
    }
    if let Some(dir) = &self.subdir {
      attrs.insert("dir".into(), json!(dir));
    }
    attrs
  }

  pub fn with_subdir(mut self, subdir: Option<String>) -> Self {
    self.subdir = subdir;
    self
  }
}

fn is_commit_hash(s: &str) -> bool {
  s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

impl fmt::Display for FlakeRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.input {
      Input::Path { path, .. } => write!(f, "path:{}", path.display())?,
      Input::Git { url, .. } => write!(f, "git+{}", url)?,
      Input::Indirect { id, ref_name, rev } => {
        write!(f, "flake:{}", id)?;
        if let Some(r) = ref_name {
          write!(f, "/{}", r)?;
        }
        if let Some(rev) = rev {
          write!(f, "/{}", rev)?;
        }
      }
    }
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut any = false;
    for (key, value) in self.input.query() {
      query.append_pair(key, &value);
      any = true;
    }
    if let Some(dir) = &self.subdir {
      query.append_pair("dir", dir);
      any = true;
    }
    if any {
      write!(f, "?{}", query.finish())?;
    }
    Ok(())
  }
}
