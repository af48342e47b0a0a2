//! Derivations: declarative build steps known to the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::util::hash::{Hashable, ObjectHash, hash_bytes};

use super::{StoreError, StorePath};

/// A build step: run `builder` with `args` and `env`; the result is `$out`.
///
/// Without a builder, realising the derivation just creates an empty output
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
  pub name: String,
  pub system: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub builder: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub args: Vec<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub env: BTreeMap<String, String>,
}

impl Hashable for Derivation {}

impl Derivation {
  fn drv_hash(&self) -> Result<ObjectHash, StoreError> {
    self.compute_hash().map_err(StoreError::Serialize)
  }

  /// Store path of the `.drv` file describing this derivation.
  pub fn drv_path(&self) -> Result<StorePath, StoreError> {
    StorePath::new(&self.drv_hash()?, &format!("{}.drv", self.name))
  }

  /// Store path of the `out` output.
  pub fn out_path(&self) -> Result<StorePath, StoreError> {
    let hash = hash_bytes(format!("output:out:{}", self.drv_hash()?).as_bytes());
    StorePath::new(&hash.short(), &self.name)
  }
}
