//! Validation of a flake's outputs.
//!
//! [`Validator`] walks every top-level output, classifies it and applies the
//! structural rules of its [`OutputKind`]. The first violation aborts the run.
//! Checks for the current system are collected into a [`BuildSet`] which
//! [`check_flake`] realises with one store call at the end.
//!
//! # Modules
//!
//! - [`classify`] - the output taxonomy shared with `show`
//! - [`error`] - [`CheckError`] and its context frames

pub mod classify;
pub mod error;

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::attr_path::AttrPath;
use crate::eval::{EvalCursor, Value};
use crate::flake::Flake;
use crate::platform::is_valid_system;
use crate::store::{Store, StorePath};

pub use classify::{Arity, OutputKind, Shape, classify, shape};
pub use error::{CheckCause, CheckError};

use error::Framed;

/// Derivations to realise once validation has finished.
pub type BuildSet = BTreeSet<StorePath>;

/// Options for [`check_flake`].
#[derive(Debug, Clone)]
pub struct CheckOptions {
  /// Build the collected checks. Without it evaluation is read-only.
  pub build: bool,
  /// Checks for this system are collected for building.
  pub system: String,
}

/// Validate every output of `flake` and build its checks.
///
/// Returns the set of derivations that were (or, without building, would have
/// been) realised.
pub fn check_flake(flake: &Flake, store: Rc<dyn Store>, options: &CheckOptions) -> Result<BuildSet, CheckError> {
  let evaluator = flake.evaluator(store.clone(), !options.build);

  info!(flake = %flake.locked_ref, "evaluating flake");
  let validator = Validator::new(store.as_ref(), &options.system);
  let build_set = validator.check_outputs(&evaluator.root())?;

  if options.build && !build_set.is_empty() {
    info!(count = build_set.len(), "running flake checks");
    store.build_paths(&build_set)?;
  }
  Ok(build_set)
}

/// Applies the per-kind output rules.
pub struct Validator<'a> {
  store: &'a dyn Store,
  system: String,
}

impl<'a> Validator<'a> {
  pub fn new(store: &'a dyn Store, system: &str) -> Self {
    Self {
      store,
      system: system.to_string(),
    }
  }

  /// Check every output below `root`, returning the checks to build.
  pub fn check_outputs<C: EvalCursor>(&self, root: &C) -> Result<BuildSet, CheckError> {
    let mut build_set = BuildSet::new();
    for name in root.attr_names()? {
      let output = root.child(&name)?;
      let delta = self
        .check_output(&output)
        .framed(|| format!("while checking flake output '{}':", name))?;
      build_set.extend(delta);
    }
    Ok(build_set)
  }

  fn check_output<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    debug!(output = %output.path(), "checking flake output");
    output.force()?;

    let kind = classify(output.path());
    match kind {
      OutputKind::Checks => self.checks(output),
      OutputKind::Packages => self.packages(output),
      OutputKind::Apps => self.apps(output),
      OutputKind::DefaultPackage | OutputKind::DevShell => self.system_derivations(output),
      OutputKind::DefaultApp => self.system_apps(output),
      OutputKind::LegacyPackages => self.legacy_packages(output),
      OutputKind::Overlay => self.overlay(output).map(|()| BuildSet::new()),
      OutputKind::Overlays => self.each(output, |this, overlay| this.overlay(overlay)),
      OutputKind::NixosModule => self.module(output).map(|()| BuildSet::new()),
      OutputKind::NixosModules => self.each(output, |this, module| this.module(module)),
      OutputKind::NixosConfigurations => self.each(output, |this, config| this.configuration(config)),
      OutputKind::HydraJobs => self.hydra_jobs(output).map(|()| BuildSet::new()),
      OutputKind::Unknown => {
        warn!("unknown flake output '{}'", output.path());
        Ok(BuildSet::new())
      }
    }
  }

  fn checks<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    let mut build_set = BuildSet::new();
    for (system, per_system) in self.systems(output)? {
      for name in per_system.attr_names()? {
        let drv_path = self.derivation(&per_system.child(&name)?)?;
        if system == self.system {
          build_set.insert(drv_path);
        }
      }
    }
    Ok(build_set)
  }

  fn packages<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    for (_, per_system) in self.systems(output)? {
      for name in per_system.attr_names()? {
        self.derivation(&per_system.child(&name)?)?;
      }
    }
    Ok(BuildSet::new())
  }

  fn apps<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    let mut build_set = BuildSet::new();
    for (_, per_system) in self.systems(output)? {
      for name in per_system.attr_names()? {
        build_set.extend(self.app(&per_system.child(&name)?)?);
      }
    }
    Ok(build_set)
  }

  /// `defaultPackage` and `devShell`: one derivation per system.
  fn system_derivations<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    for system in output.attr_names()? {
      let cursor = output.child(&system)?;
      check_system_name(&system, &cursor)?;
      self.derivation(&cursor)?;
    }
    Ok(BuildSet::new())
  }

  fn system_apps<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    let mut build_set = BuildSet::new();
    for system in output.attr_names()? {
      let cursor = output.child(&system)?;
      check_system_name(&system, &cursor)?;
      build_set.extend(self.app(&cursor)?);
    }
    Ok(build_set)
  }

  /// Only the system names are checked; package sets are too large to walk.
  fn legacy_packages<C: EvalCursor>(&self, output: &C) -> Result<BuildSet, CheckError> {
    for system in output.attr_names()? {
      check_system_name(&system, &output.child(&system)?)?;
    }
    Ok(BuildSet::new())
  }

  /// Validated, forced per-system sets of a system-indexed output.
  fn systems<C: EvalCursor>(&self, output: &C) -> Result<Vec<(String, C)>, CheckError> {
    let mut systems = Vec::new();
    for system in output.attr_names()? {
      let cursor = output.child(&system)?;
      check_system_name(&system, &cursor)?;
      cursor.attr_names()?;
      systems.push((system, cursor));
    }
    Ok(systems)
  }

  fn each<C, F>(&self, output: &C, check: F) -> Result<BuildSet, CheckError>
  where
    C: EvalCursor,
    F: Fn(&Self, &C) -> Result<(), CheckError>,
  {
    for name in output.attr_names()? {
      check(self, &output.child(&name)?)?;
    }
    Ok(BuildSet::new())
  }

  fn derivation<C: EvalCursor>(&self, cursor: &C) -> Result<StorePath, CheckError> {
    self
      .derivation_inner(cursor)
      .framed(|| format!("while checking the derivation '{}' at {}:", cursor.path(), cursor.pos()))
  }

  fn derivation_inner<C: EvalCursor>(&self, cursor: &C) -> Result<StorePath, CheckError> {
    if !cursor.is_derivation()? {
      return Err(CheckError::violation(format!(
        "flake attribute '{}' is not a derivation",
        cursor.path()
      )));
    }
    let drv_path = cursor.child("drvPath")?.get_string()?;
    Ok(self.store.parse_store_path(&drv_path)?)
  }

  fn app<C: EvalCursor>(&self, cursor: &C) -> Result<BuildSet, CheckError> {
    self
      .app_inner(cursor)
      .framed(|| format!("while checking the app definition '{}' at {}:", cursor.path(), cursor.pos()))
  }

  /// Derivation outputs referenced by the program string are added to the build set.
  fn app_inner<C: EvalCursor>(&self, cursor: &C) -> Result<BuildSet, CheckError> {
    if !cursor.force()?.has_attr("type") || cursor.child("type")?.get_string()? != "app" {
      return Err(CheckError::violation("not an app definition"));
    }
    let program = cursor.child("program")?.get_context_string()?;

    let mut build_set = BuildSet::new();
    for elem in program.context {
      let drv_path = self.store.parse_store_path(&elem.drv_path)?;
      if !elem.output.is_empty() && drv_path.is_derivation() {
        build_set.insert(drv_path);
      }
    }
    Ok(build_set)
  }

  fn overlay<C: EvalCursor>(&self, cursor: &C) -> Result<(), CheckError> {
    overlay_inner(cursor).framed(|| format!("while checking the overlay '{}' at {}:", cursor.path(), cursor.pos()))
  }

  fn module<C: EvalCursor>(&self, cursor: &C) -> Result<(), CheckError> {
    module_inner(cursor).framed(|| format!("while checking the NixOS module '{}' at {}:", cursor.path(), cursor.pos()))
  }

  fn configuration<C: EvalCursor>(&self, cursor: &C) -> Result<(), CheckError> {
    debug!(config = %cursor.path(), "checking NixOS configuration");
    configuration_inner(cursor).framed(|| {
      format!(
        "while checking the NixOS configuration '{}' at {}:",
        cursor.path(),
        cursor.pos()
      )
    })
  }

  fn hydra_jobs<C: EvalCursor>(&self, cursor: &C) -> Result<(), CheckError> {
    self
      .hydra_jobs_inner(cursor)
      .framed(|| format!("while checking the Hydra jobset '{}' at {}:", cursor.path(), cursor.pos()))
  }

  fn hydra_jobs_inner<C: EvalCursor>(&self, cursor: &C) -> Result<(), CheckError> {
    let names = cursor.attr_names()?;
    if cursor.is_derivation()? {
      return Err(CheckError::violation("jobset should not be a derivation at top-level"));
    }
    for name in names {
      let job = cursor.child(&name)?;
      job.attr_names()?;
      if !job.is_derivation()? {
        self.hydra_jobs(&job)?;
      }
    }
    Ok(())
  }
}

fn check_system_name<C: EvalCursor>(system: &str, cursor: &C) -> Result<(), CheckError> {
  if is_valid_system(system) {
    return Ok(());
  }
  Err(CheckError::violation(format!(
    "'{}' is not a valid system type, at {}",
    system,
    cursor.pos()
  )))
}

fn overlay_inner<C: EvalCursor>(cursor: &C) -> Result<(), CheckError> {
  let Value::Lambda(lambda) = cursor.force()? else {
    return Err(CheckError::violation("overlay does not take an argument named 'final'"));
  };
  if lambda.param.ident() != Some("final") {
    return Err(CheckError::violation("overlay does not take an argument named 'final'"));
  }
  match lambda.body {
    Some(body) if body.param.ident() == Some("prev") => Ok(()),
    _ => Err(CheckError::violation("overlay does not take an argument named 'prev'")),
  }
}

fn module_inner<C: EvalCursor>(cursor: &C) -> Result<(), CheckError> {
  match cursor.force()? {
    Value::Lambda(lambda) => {
      if !lambda.param.is_open_formals() {
        return Err(CheckError::violation(
          "module must match an open attribute set ('{ config, ... }')",
        ));
      }
      Ok(())
    }
    Value::Attrs(names) => {
      for name in names {
        let option = cursor.child(&name)?;
        option
          .force()
          .framed(|| format!("while evaluating the option '{}' at {}:", name, option.pos()))?;
      }
      Ok(())
    }
    _ => Err(CheckError::violation("module must be a function or an attribute set")),
  }
}

fn configuration_inner<C: EvalCursor>(cursor: &C) -> Result<(), CheckError> {
  let toplevel = cursor.find_along(&AttrPath::parse("config.system.build.toplevel"))?;
  toplevel.attr_names()?;
  if !toplevel.is_derivation()? {
    return Err(CheckError::violation(
      "attribute 'config.system.build.toplevel' is not a derivation",
    ));
  }
  Ok(())
}
