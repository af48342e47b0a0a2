//! Attribute paths into a flake's output tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered sequence of attribute names, e.g. `checks.x86_64-linux.test`.
///
/// The empty path denotes the root of the output tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrPath(Vec<String>);

impl AttrPath {
  pub fn root() -> Self {
    Self::default()
  }

  /// Split a dotted path. Empty segments are dropped, so `""` is the root.
  pub fn parse(dotted: &str) -> Self {
    Self(
      dotted
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect(),
    )
  }

  /// A new path with `name` appended.
  pub fn child(&self, name: &str) -> Self {
    let mut segments = self.0.clone();
    segments.push(name.to_string());
    Self(segments)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// The top-level output name, if any.
  pub fn first(&self) -> Option<&str> {
    self.0.first().map(String::as_str)
  }

  pub fn segments(&self) -> &[String] {
    &self.0
  }

  /// Whether the path starts at output `name`.
  pub fn is_under(&self, name: &str) -> bool {
    self.first() == Some(name)
  }
}

impl fmt::Display for AttrPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.join("."))
  }
}

impl<S: Into<String>> FromIterator<S> for AttrPath {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self(iter.into_iter().map(Into::into).collect())
  }
}
