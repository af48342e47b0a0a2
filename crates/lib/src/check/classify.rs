//! Output taxonomy.
//!
//! Every attribute path in a flake's output tree belongs to one [`OutputKind`],
//! determined by its top-level name alone. Validation and rendering both go
//! through [`classify`], so the two can never disagree about a path.

use std::fmt;

use crate::attr_path::AttrPath;

/// The kinds of flake output this tool knows the shape of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
  Checks,
  Packages,
  Apps,
  DefaultPackage,
  DevShell,
  DefaultApp,
  LegacyPackages,
  Overlay,
  Overlays,
  NixosModule,
  NixosModules,
  NixosConfigurations,
  HydraJobs,
  Unknown,
}

/// Depth at which an output kind expects its terminal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
  Fixed(usize),
  /// Decided by content: descent stops at the first derivation.
  Unbounded,
}

/// Where a path sits relative to its kind's arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
  /// The empty path.
  Root,
  /// Shallower than the arity; children are expected.
  Container,
  /// Exactly at the arity; a terminal value is expected.
  Leaf,
  /// Deeper than the arity, or anywhere below an unbounded kind's root.
  Nested,
}

impl OutputKind {
  pub fn arity(self) -> Arity {
    match self {
      Self::Checks | Self::Packages | Self::Apps => Arity::Fixed(3),
      Self::DefaultPackage
      | Self::DevShell
      | Self::DefaultApp
      | Self::LegacyPackages
      | Self::Overlays
      | Self::NixosModules
      | Self::NixosConfigurations => Arity::Fixed(2),
      Self::Overlay | Self::NixosModule | Self::Unknown => Arity::Fixed(1),
      Self::HydraJobs => Arity::Unbounded,
    }
  }

  /// The top-level output name of this kind (`None` for [`OutputKind::Unknown`]).
  pub fn output_name(self) -> Option<&'static str> {
    RULES.iter().find_map(|rule| match rule.matcher {
      Matcher::Name(name) if rule.kind == self => Some(name),
      _ => None,
    })
  }
}

impl fmt::Display for OutputKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.output_name().unwrap_or("unknown"))
  }
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
  /// Top-level output name equals this string.
  Name(&'static str),
  /// Any non-empty path.
  Any,
}

impl Matcher {
  fn matches(self, path: &AttrPath) -> bool {
    match self {
      Matcher::Name(name) => path.first() == Some(name),
      Matcher::Any => !path.is_empty(),
    }
  }
}

#[derive(Debug)]
struct Rule {
  matcher: Matcher,
  kind: OutputKind,
}

const fn output(name: &'static str, kind: OutputKind) -> Rule {
  Rule {
    matcher: Matcher::Name(name),
    kind,
  }
}

/// Classification rules, tried in order. The first match wins.
const RULES: &[Rule] = &[
  // Single outputs and name-indexed collections.
  output("overlay", OutputKind::Overlay),
  output("overlays", OutputKind::Overlays),
  output("nixosModule", OutputKind::NixosModule),
  output("nixosModules", OutputKind::NixosModules),
  output("nixosConfigurations", OutputKind::NixosConfigurations),
  output("hydraJobs", OutputKind::HydraJobs),
  // System-indexed families.
  output("checks", OutputKind::Checks),
  output("packages", OutputKind::Packages),
  output("apps", OutputKind::Apps),
  output("defaultPackage", OutputKind::DefaultPackage),
  output("devShell", OutputKind::DevShell),
  output("defaultApp", OutputKind::DefaultApp),
  output("legacyPackages", OutputKind::LegacyPackages),
  Rule {
    matcher: Matcher::Any,
    kind: OutputKind::Unknown,
  },
];

/// Classify an attribute path by its top-level name.
///
/// Total: the root path and unrecognised names are [`OutputKind::Unknown`].
pub fn classify(path: &AttrPath) -> OutputKind {
  RULES
    .iter()
    .find(|rule| rule.matcher.matches(path))
    .map(|rule| rule.kind)
    .unwrap_or(OutputKind::Unknown)
}

/// Position of `path` relative to the arity of its kind.
pub fn shape(path: &AttrPath) -> Shape {
  if path.is_empty() {
    return Shape::Root;
  }

  match classify(path).arity() {
    Arity::Fixed(n) if path.len() < n => Shape::Container,
    Arity::Fixed(n) if path.len() == n => Shape::Leaf,
    Arity::Fixed(_) => Shape::Nested,
    Arity::Unbounded if path.len() == 1 => Shape::Container,
    Arity::Unbounded => Shape::Nested,
  }
}
