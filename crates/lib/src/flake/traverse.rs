//! Depth-first walks over a lock graph.
//!
//! [`walk`] visits every edge below the root in document order and hands each
//! one to a [`LockVisitor`]. The visitors here cover the three uses: rendering
//! the tree ([`RenderLines`]), building a nested JSON document ([`NestedJson`])
//! and collecting source store paths ([`CollectSources`]).

use std::collections::BTreeSet;

use serde_json::{Map, Value as Json, json};
use tracing::debug;

use crate::fetch::Fetcher;
use crate::store::{Store, StorePath};
use crate::util::tree::{Paint, connectors};

use super::{FlakeError, LockGraph, LockedNode, NodeId};

/// One edge of the walk.
pub struct Visit<'a> {
  pub name: &'a str,
  pub id: NodeId,
  pub node: &'a LockedNode,
  /// Connector prefix for this edge's line.
  pub prefix: String,
  pub depth: usize,
}

pub trait LockVisitor {
  type Error;

  /// Called before the children of `visit` are walked.
  fn enter(&mut self, visit: &Visit<'_>) -> Result<(), Self::Error>;

  /// Called after the children of `visit` have been walked.
  fn leave(&mut self, _visit: &Visit<'_>) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// Walk every edge reachable from the root of `graph`.
pub fn walk<V: LockVisitor>(graph: &LockGraph, visitor: &mut V) -> Result<(), V::Error> {
  walk_from(graph, graph.root(), "", 0, visitor)
}

fn walk_from<V: LockVisitor>(
  graph: &LockGraph,
  id: NodeId,
  prefix: &str,
  depth: usize,
  visitor: &mut V,
) -> Result<(), V::Error> {
  let inputs = graph.inputs(id);
  for (index, (name, child)) in inputs.iter().enumerate() {
    let Some(node) = graph.node(*child).as_locked() else {
      continue;
    };
    let (conn, cont) = connectors(index, inputs.len());
    let visit = Visit {
      name,
      id: *child,
      node,
      prefix: format!("{}{}", prefix, conn),
      depth,
    };
    visitor.enter(&visit)?;
    walk_from(graph, *child, &format!("{}{}", prefix, cont), depth + 1, visitor)?;
    visitor.leave(&visit)?;
  }
  Ok(())
}

/// Renders one line per edge: `<prefix><name>: <locked url>`.
pub struct RenderLines<'p, P: Paint> {
  painter: &'p P,
  pub lines: Vec<String>,
}

impl<'p, P: Paint> RenderLines<'p, P> {
  pub fn new(painter: &'p P) -> Self {
    Self {
      painter,
      lines: Vec::new(),
    }
  }
}

impl<P: Paint> LockVisitor for RenderLines<'_, P> {
  type Error = std::convert::Infallible;

  fn enter(&mut self, visit: &Visit<'_>) -> Result<(), Self::Error> {
    self.lines.push(format!(
      "{}{}: {}",
      self.painter.prefix(&visit.prefix),
      self.painter.name(visit.name),
      visit.node.locked
    ));
    Ok(())
  }
}

/// Builds `{name: {url, locked, original, inputs: {...}}}` for the root's inputs.
#[derive(Default)]
pub struct NestedJson {
  stack: Vec<Map<String, Json>>,
}

impl NestedJson {
  pub fn new() -> Self {
    Self {
      stack: vec![Map::new()],
    }
  }

  /// The finished document.
  pub fn finish(mut self) -> Json {
    Json::Object(self.stack.pop().unwrap_or_default())
  }
}

impl LockVisitor for NestedJson {
  type Error = std::convert::Infallible;

  fn enter(&mut self, _visit: &Visit<'_>) -> Result<(), Self::Error> {
    self.stack.push(Map::new());
    Ok(())
  }

  fn leave(&mut self, visit: &Visit<'_>) -> Result<(), Self::Error> {
    let inputs = self.stack.pop().unwrap_or_default();
    let entry = json!({
      "url": visit.node.locked.to_string(),
      "locked": visit.node.locked.to_attrs(),
      "original": visit.node.original.to_attrs(),
      "inputs": inputs,
    });
    if let Some(parent) = self.stack.last_mut() {
      parent.insert(visit.name.to_string(), entry);
    }
    Ok(())
  }
}

/// Collects the store path of every locked source, fetching unless `dry_run`.
///
/// Also builds the `{path, inputs: {name: {path, inputs}}}` document.
pub struct CollectSources<'a> {
  store: &'a dyn Store,
  fetcher: &'a dyn Fetcher,
  dry_run: bool,
  pub paths: BTreeSet<StorePath>,
  stack: Vec<Map<String, Json>>,
}

impl<'a> CollectSources<'a> {
  pub fn new(store: &'a dyn Store, fetcher: &'a dyn Fetcher, dry_run: bool) -> Self {
    Self {
      store,
      fetcher,
      dry_run,
      paths: BTreeSet::new(),
      stack: vec![Map::new()],
    }
  }

  /// The collected `inputs` document of the root.
  pub fn finish(mut self) -> (BTreeSet<StorePath>, Json) {
    let inputs = self.stack.pop().unwrap_or_default();
    (self.paths, Json::Object(inputs))
  }
}

impl LockVisitor for CollectSources<'_> {
  type Error = FlakeError;

  fn enter(&mut self, visit: &Visit<'_>) -> Result<(), Self::Error> {
    if !self.dry_run {
      self.fetcher.fetch(self.store, &visit.node.locked.input)?;
    }
    let path = visit.node.store_path(self.store)?;
    debug!(input = visit.name, path = %path, "collected source");
    self.paths.insert(path);
    self.stack.push(Map::new());
    Ok(())
  }

  fn leave(&mut self, visit: &Visit<'_>) -> Result<(), Self::Error> {
    let inputs = self.stack.pop().unwrap_or_default();
    let path = visit.node.store_path(self.store)?;
    let entry = json!({
      "path": self.store.print_store_path(&path),
      "inputs": inputs,
    });
    if let Some(parent) = self.stack.last_mut() {
      parent.insert(visit.name.to_string(), entry);
    }
    Ok(())
  }
}
