//! Lazy evaluation of a flake's output tree.
//!
//! The evaluator itself is an external collaborator. Everything in this crate
//! reaches it through [`EvalCursor`], a handle positioned at one attribute path
//! that can force its value, enumerate and descend into attributes, test for
//! derivations and coerce to strings.
//!
//! # Modules
//!
//! - [`json`] - reference evaluator over a pre-evaluated JSON document
//! - [`cache`] - caching decorator keyed by attribute path

pub mod cache;
pub mod json;
mod value;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::{CacheError, CachedCursor, EvalCache};
pub use json::{JsonCursor, JsonEvaluator};
pub use value::*;

use crate::attr_path::AttrPath;

/// Errors raised while forcing values.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum EvalError {
  /// An explicit `throw` in the expression.
  #[error("{message}")]
  Thrown { message: String },

  /// A value had the wrong type for the operation applied to it.
  #[error("value is {found} while {expected} was expected")]
  Type {
    expected: String,
    found: String,
  },

  /// Descending into an attribute that does not exist.
  #[error("attribute '{attr}' missing")]
  MissingAttr { attr: String },

  /// A segment of a dotted selection path does not exist.
  #[error("attribute '{attr}' in selection path '{path}' not found")]
  MissingAlongPath { attr: String, path: String },

  /// A value cannot be coerced to a string.
  #[error("cannot coerce {found} to a string")]
  Coerce { found: String },

  #[error("infinite recursion encountered while resolving '{0}'")]
  InfiniteRecursion(String),

  /// A derivation could not be instantiated.
  #[error("while instantiating derivation '{name}': {message}")]
  Instantiate { name: String, message: String },

  /// Any other evaluation failure with a fixed message.
  #[error("{0}")]
  Other(String),
}

impl EvalError {
  pub fn type_mismatch(expected: &str, found: &Value) -> Self {
    EvalError::Type {
      expected: expected.to_string(),
      found: found.type_name().to_string(),
    }
  }
}

/// A handle into the lazily evaluated output tree at one [`AttrPath`].
///
/// Cursors are cheap to create; nothing is forced until an operation needs it.
/// Implementations only have to provide [`force`](EvalCursor::force) and
/// [`maybe_child`](EvalCursor::maybe_child); the remaining operations are
/// derived from those two so that decorators stay consistent.
pub trait EvalCursor: Sized {
  /// The attribute path this cursor is positioned at.
  fn path(&self) -> &AttrPath;

  /// Where the value is defined, for error messages.
  fn pos(&self) -> String;

  /// Force the value to weak-head normal form.
  fn force(&self) -> Result<Value, EvalError>;

  /// Descend to attribute `name`, or `None` if the set has no such attribute.
  ///
  /// Fails if this value does not force to a set.
  fn maybe_child(&self, name: &str) -> Result<Option<Self>, EvalError>;

  /// Descend to attribute `name`, failing if it is missing.
  fn child(&self, name: &str) -> Result<Self, EvalError> {
    self.maybe_child(name)?.ok_or_else(|| EvalError::MissingAttr {
      attr: name.to_string(),
    })
  }

  /// Attribute names of a set, in sorted order.
  fn attr_names(&self) -> Result<Vec<String>, EvalError> {
    match self.force()? {
      Value::Attrs(names) => Ok(names),
      other => Err(EvalError::type_mismatch("a set", &other)),
    }
  }

  /// Whether this value is a set with `type = "derivation"`.
  fn is_derivation(&self) -> Result<bool, EvalError> {
    if !self.force()?.has_attr("type") {
      return Ok(false);
    }
    Ok(matches!(
      self.child("type")?.force()?,
      Value::String(s) if s.value == "derivation"
    ))
  }

  /// Force to a string and return it with its context.
  fn get_context_string(&self) -> Result<ContextString, EvalError> {
    match self.force()? {
      Value::String(s) => Ok(s),
      other => Err(EvalError::type_mismatch("a string", &other)),
    }
  }

  /// Force to a string, discarding context.
  fn get_string(&self) -> Result<String, EvalError> {
    self.get_context_string().map(|s| s.value)
  }

  /// Follow a dotted attribute path from this cursor.
  fn find_along(&self, path: &AttrPath) -> Result<Self, EvalError> {
    let mut segments = path.segments().iter();
    let Some(first) = segments.next() else {
      return Err(EvalError::Other("empty attribute path".to_string()));
    };
    let missing = |attr: &str| EvalError::MissingAlongPath {
      attr: attr.to_string(),
      path: path.to_string(),
    };
    let mut cursor = self.maybe_child(first)?.ok_or_else(|| missing(first))?;
    for segment in segments {
      cursor = cursor.maybe_child(segment)?.ok_or_else(|| missing(segment))?;
    }
    Ok(cursor)
  }
}
