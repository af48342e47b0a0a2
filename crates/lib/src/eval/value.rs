//! Shallow values produced by forcing an expression.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The weak-head normal form of an expression.
///
/// Containers are shallow: a set carries only its attribute names and a list
/// only its length. Children are reached through the cursor that produced the
/// value, so forcing a set never forces its members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(ContextString),
  List(usize),
  /// Attribute names in sorted order.
  Attrs(Vec<String>),
  Lambda(Lambda),
}

impl Value {
  /// Human-readable type name as used in type errors ("a set", "a string", ...).
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "a Boolean",
      Value::Int(_) => "an integer",
      Value::Float(_) => "a float",
      Value::String(_) => "a string",
      Value::List(_) => "a list",
      Value::Attrs(_) => "a set",
      Value::Lambda(_) => "a function",
    }
  }

  pub fn attr_names(&self) -> Option<&[String]> {
    match self {
      Value::Attrs(names) => Some(names),
      _ => None,
    }
  }

  pub fn has_attr(&self, name: &str) -> bool {
    self.attr_names().is_some_and(|names| names.iter().any(|n| n == name))
  }
}

/// A string together with the store objects it refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextString {
  pub value: String,
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub context: BTreeSet<ContextElem>,
}

impl ContextString {
  pub fn plain(value: impl Into<String>) -> Self {
    Self {
      value: value.into(),
      context: BTreeSet::new(),
    }
  }
}

/// One string-context entry: a derivation and, for output references, the output name.
///
/// An empty `output` marks a reference to the derivation file itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextElem {
  pub drv_path: String,
  pub output: String,
}

/// A function, described by its syntactic shape only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lambda {
  pub param: Param,
  /// The body when it is itself syntactically a function.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub body: Option<Box<Lambda>>,
}

/// How a function binds its argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Param {
  /// `x: ...`
  Ident(String),
  /// `{ a, b, ... } @ bind: ...`
  Formals {
    names: Vec<String>,
    ellipsis: bool,
    bind: Option<String>,
  },
}

impl Param {
  /// The bound name when the argument is a single bare identifier.
  pub fn ident(&self) -> Option<&str> {
    match self {
      Param::Ident(name) => Some(name),
      Param::Formals { .. } => None,
    }
  }

  /// Whether the argument is an attribute-set pattern accepting extra attributes.
  pub fn is_open_formals(&self) -> bool {
    matches!(self, Param::Formals { ellipsis: true, .. })
  }
}
