//! Box-drawing connectors shared by every tree renderer.

/// Connector for a child that has later siblings.
pub const TREE_CONN: &str = "├───";
/// Connector for the last child of a parent.
pub const TREE_LAST: &str = "└───";
/// Continuation below a child that has later siblings.
pub const TREE_LINE: &str = "│   ";
/// Continuation below a last child.
pub const TREE_NULL: &str = "    ";

/// Connector and continuation for the child at `index` of `count` children.
pub fn connectors(index: usize, count: usize) -> (&'static str, &'static str) {
  if index + 1 == count {
    (TREE_LAST, TREE_NULL)
  } else {
    (TREE_CONN, TREE_LINE)
  }
}

/// Applies terminal styling to rendered tree lines.
///
/// Renderers call these hooks for each styled fragment; the default
/// implementation leaves text untouched, which is what tests and JSON
/// consumers want.
pub trait Paint {
  /// The connector prefix of a line.
  fn prefix(&self, text: &str) -> String {
    text.to_string()
  }

  /// An attribute or input name.
  fn name(&self, text: &str) -> String {
    text.to_string()
  }

  /// A marker that needs the reader's attention ("omitted", "unknown").
  fn attention(&self, text: &str) -> String {
    text.to_string()
  }
}

/// Plain-text painter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Paint for Plain {}
