//! Shared utilities.
//!
//! Hashing, directory copying, tree-drawing connectors and test helpers.

pub mod fs;
pub mod hash;
pub mod tree;

#[cfg(test)]
pub mod testutil;
