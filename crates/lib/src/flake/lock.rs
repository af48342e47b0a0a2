//! Lock files and the lock graph they describe.
//!
//! The lock file (`flake.lock`) pins every transitive input of a flake. It is
//! stored next to `flake.json`.
//!
//! # Lock File Format
//!
//! ```json
//! {
//!   "version": 7,
//!   "root": "root",
//!   "nodes": {
//!     "root": { "inputs": { "utils": "utils" } },
//!     "utils": {
//!       "locked": { "type": "path", "path": "/src/utils", "narHash": "sha256-..." },
//!       "original": { "type": "path", "path": "/src/utils" },
//!       "inputs": {}
//!     }
//!   }
//! }
//! ```
//!
//! In memory the nodes live in an arena ([`LockGraph`]); edges are ordered
//! `(name, NodeId)` pairs in the order they appear in the document.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::Path;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::flakeref::{FlakeRef, FlakeRefError};
use crate::store::{Store, StoreError, StorePath};
use crate::consts::SOURCE_NAME;

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 7;

const ROOT_LABEL: &str = "root";

/// Index of a node in a [`LockGraph`].
pub type NodeId = usize;

/// Errors that can occur when working with lock files.
#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to read lock file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write lock file: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse lock file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize lock file: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported lock file version {0}, expected {LOCK_VERSION}")]
  UnsupportedVersion(u32),

  #[error("lock file references undefined node '{0}'")]
  UndefinedNode(String),

  #[error("lock file node '{0}' is missing its locked or original reference")]
  IncompleteNode(String),

  #[error("input '{0}' uses 'follows', which is not supported")]
  Follows(String),

  #[error("lock file contains a cycle through node '{0}'")]
  Cycle(String),

  #[error("invalid reference in lock file node '{node}': {source}")]
  Ref {
    node: String,
    #[source]
    source: FlakeRefError,
  },

  #[error("input '{0}' is not locked to a content hash")]
  Unlocked(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// A pinned input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedNode {
  pub locked: FlakeRef,
  pub original: FlakeRef,
  /// Whether the input is itself a flake (and may have inputs of its own).
  pub is_flake: bool,
  pub inputs: Vec<(String, NodeId)>,
}

impl LockedNode {
  /// Store path of the pinned source, computed from its content hash.
  pub fn store_path(&self, store: &dyn Store) -> Result<StorePath, LockError> {
    let hash = self
      .locked
      .input
      .nar_hash()
      .ok_or_else(|| LockError::Unlocked(self.locked.to_string()))?;
    Ok(store.source_path(hash, SOURCE_NAME)?)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockNode {
  /// The flake itself: only edges.
  Root { inputs: Vec<(String, NodeId)> },
  Locked(LockedNode),
}

impl LockNode {
  pub fn inputs(&self) -> &[(String, NodeId)] {
    match self {
      LockNode::Root { inputs } => inputs,
      LockNode::Locked(node) => &node.inputs,
    }
  }

  fn inputs_mut(&mut self) -> &mut Vec<(String, NodeId)> {
    match self {
      LockNode::Root { inputs } => inputs,
      LockNode::Locked(node) => &mut node.inputs,
    }
  }

  pub fn as_locked(&self) -> Option<&LockedNode> {
    match self {
      LockNode::Locked(node) => Some(node),
      LockNode::Root { .. } => None,
    }
  }
}

/// The resolved dependency graph of a flake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGraph {
  nodes: Vec<LockNode>,
  root: NodeId,
}

impl Default for LockGraph {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Serialize, Deserialize)]
struct LockDoc {
  version: u32,
  root: String,
  nodes: Map<String, Json>,
}

#[derive(Serialize, Deserialize)]
struct NodeDoc {
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  inputs: Map<String, Json>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  locked: Option<Map<String, Json>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  original: Option<Map<String, Json>>,
  #[serde(default = "default_true", skip_serializing_if = "is_true")]
  flake: bool,
}

fn default_true() -> bool {
  true
}

fn is_true(b: &bool) -> bool {
  *b
}

impl LockGraph {
  /// A graph with only a root node.
  pub fn new() -> Self {
    Self {
      nodes: vec![LockNode::Root { inputs: Vec::new() }],
      root: 0,
    }
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn node(&self, id: NodeId) -> &LockNode {
    &self.nodes[id]
  }

  pub fn inputs(&self, id: NodeId) -> &[(String, NodeId)] {
    self.nodes[id].inputs()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inputs(self.root).is_empty()
  }

  /// Add `node` as input `name` of `parent`.
  pub fn add_input(&mut self, parent: NodeId, name: &str, node: LockedNode) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(LockNode::Locked(node));
    self.nodes[parent].inputs_mut().push((name.to_string(), id));
    id
  }

  /// The locked child `name` of `parent`, if any.
  pub fn child(&self, parent: NodeId, name: &str) -> Option<(NodeId, &LockedNode)> {
    self
      .inputs(parent)
      .iter()
      .find(|(n, _)| n == name)
      .and_then(|(_, id)| self.nodes[*id].as_locked().map(|node| (*id, node)))
  }

  /// Load a lock file; `Ok(None)` if it doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(LockError::Read(e)),
    };
    Self::parse(&content).map(Some)
  }

  pub fn parse(content: &str) -> Result<Self, LockError> {
    let doc: LockDoc = serde_json::from_str(content).map_err(LockError::Parse)?;
    if doc.version != LOCK_VERSION {
      return Err(LockError::UnsupportedVersion(doc.version));
    }

    let ids: HashMap<&str, NodeId> = doc.nodes.keys().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
    let root = *ids
      .get(doc.root.as_str())
      .ok_or_else(|| LockError::UndefinedNode(doc.root.clone()))?;

    let mut nodes = Vec::with_capacity(doc.nodes.len());
    for (label, value) in &doc.nodes {
      let node: NodeDoc = serde_json::from_value(value.clone()).map_err(LockError::Parse)?;
      let mut inputs = Vec::with_capacity(node.inputs.len());
      for (name, target) in &node.inputs {
        let target = target.as_str().ok_or_else(|| LockError::Follows(name.clone()))?;
        let id = ids.get(target).ok_or_else(|| LockError::UndefinedNode(target.to_string()))?;
        inputs.push((name.clone(), *id));
      }

      let is_root = ids.get(label.as_str()) == Some(&root);
      let parse_ref = |attrs: &Map<String, Json>| {
        FlakeRef::from_attrs(attrs).map_err(|source| LockError::Ref {
          node: label.clone(),
          source,
        })
      };
      nodes.push(match (is_root, &node.locked, &node.original) {
        (true, _, _) => LockNode::Root { inputs },
        (false, Some(locked), Some(original)) => LockNode::Locked(LockedNode {
          locked: parse_ref(locked)?,
          original: parse_ref(original)?,
          is_flake: node.flake,
          inputs,
        }),
        _ => return Err(LockError::IncompleteNode(label.clone())),
      });
    }

    let graph = Self { nodes, root };
    graph.check_acyclic(|id| doc.nodes.keys().nth(id).cloned().unwrap_or_default())?;
    Ok(graph)
  }

  fn check_acyclic(&self, label: impl Fn(NodeId) -> String) -> Result<(), LockError> {
    let mut graph = DiGraph::<NodeId, ()>::with_capacity(self.nodes.len(), 0);
    let indices: Vec<_> = (0..self.nodes.len()).map(|id| graph.add_node(id)).collect();
    for (id, node) in self.nodes.iter().enumerate() {
      for (_, child) in node.inputs() {
        graph.add_edge(indices[id], indices[*child], ());
      }
    }
    toposort(&graph, None)
      .map(|_| ())
      .map_err(|cycle| LockError::Cycle(label(graph[cycle.node_id()])))
  }

  /// Serialize to the lock file document.
  ///
  /// Nodes are labelled by the first edge name that reaches them, with a
  /// numeric suffix when the name is taken.
  pub fn to_json(&self) -> Json {
    let mut labels: BTreeMap<NodeId, String> = BTreeMap::new();
    let mut order = vec![self.root];
    labels.insert(self.root, ROOT_LABEL.to_string());
    let mut taken: Vec<String> = vec![ROOT_LABEL.to_string()];

    let mut index = 0;
    while index < order.len() {
      let id = order[index];
      index += 1;
      for (name, child) in self.inputs(id) {
        if labels.contains_key(child) {
          continue;
        }
        let mut label = name.clone();
        let mut n = 2;
        while taken.contains(&label) {
          label = format!("{}_{}", name, n);
          n += 1;
        }
        taken.push(label.clone());
        labels.insert(*child, label);
        order.push(*child);
      }
    }

    let mut nodes = Map::new();
    for id in order {
      let node = &self.nodes[id];
      let inputs: Map<String, Json> = node
        .inputs()
        .iter()
        .map(|(name, child)| (name.clone(), Json::String(labels[child].clone())))
        .collect();
      let doc = match node {
        LockNode::Root { .. } => NodeDoc {
          inputs,
          locked: None,
          original: None,
          flake: true,
        },
        LockNode::Locked(locked) => NodeDoc {
          inputs,
          locked: Some(locked.locked.to_attrs()),
          original: Some(locked.original.to_attrs()),
          flake: locked.is_flake,
        },
      };
      nodes.insert(labels[&id].clone(), serde_json::to_value(doc).unwrap_or(Json::Null));
    }

    serde_json::json!({
      "nodes": nodes,
      "root": ROOT_LABEL,
      "version": LOCK_VERSION,
    })
  }

  /// Save the lock file to the given path.
  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    let content = serde_json::to_string_pretty(&self.to_json()).map_err(LockError::Serialize)?;
    fs::write(path, content + "\n").map_err(LockError::Write)?;
    Ok(())
  }
}
