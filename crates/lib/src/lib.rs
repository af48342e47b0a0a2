//! flakes-lib: validation, rendering and lock-graph traversal for flake manifests.
//!
//! A flake is a directory holding a `flake.json` manifest. The manifest declares
//! pinned inputs (recorded in `flake.lock`) and a tree of named outputs. This crate
//! provides:
//! - `check`: schema-driven validation of every output, collecting checks to build
//! - `show`: rendering of the output tree as text or JSON
//! - `flake`: manifest loading, locking and lock-graph traversal
//! - `registry`: the tiered alias table used to resolve indirect references
//!
//! Evaluation, storage and fetching are reached only through the `EvalCursor`,
//! `Store` and `Fetcher` traits; the crate ships small reference backends for each.

pub mod archive;
pub mod attr_path;
pub mod check;
pub mod consts;
pub mod eval;
pub mod fetch;
pub mod flake;
pub mod flakeref;
pub mod init;
pub mod platform;
pub mod registry;
pub mod settings;
pub mod show;
pub mod store;
pub mod util;
