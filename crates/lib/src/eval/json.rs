//! Reference evaluator over a pre-evaluated JSON output tree.
//!
//! Outputs are plain JSON, except that an object holding one of the marker keys
//! below stays lazy until it is forced:
//!
//! - `{"$throw": "msg"}` raises an evaluation error.
//! - `{"$lambda": <param>, "body": <expr>}` is a function. `<param>` is a name or
//!   `{"formals": [..], "ellipsis": bool, "bind": name}`.
//! - `{"$self": "a.b.c"}` refers to another output path.
//! - `{"$concat": [<expr>, ..]}` interpolates strings and derivations.
//!
//! A set with `"type": "derivation"` gains synthetic `drvPath` and `outPath`
//! attributes. Forcing either instantiates the derivation in the store unless
//! the evaluator is read-only.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde_json::{Map, Value as Json};
use tracing::trace;

use crate::attr_path::AttrPath;
use crate::store::{Derivation, Store};

use super::{ContextElem, ContextString, EvalCursor, EvalError, Lambda, Param, Value};

const THROW: &str = "$throw";
const LAMBDA: &str = "$lambda";
const SELF_REF: &str = "$self";
const CONCAT: &str = "$concat";
const MARKERS: &[&str] = &[THROW, LAMBDA, SELF_REF, CONCAT];

/// How deep `$self` hops and string coercions may nest within one force.
const MAX_SELF_DEPTH: usize = 64;

/// Evaluator state shared by every cursor it hands out.
pub struct JsonEvaluator {
  state: Rc<EvalState>,
}

struct EvalState {
  outputs: Json,
  origin: String,
  store: Rc<dyn Store>,
  read_only: bool,
  forced: Cell<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Location {
  /// A JSON pointer into the outputs document.
  Expr(String),
  DrvPath(String),
  OutPath(String),
}

impl JsonEvaluator {
  /// Create an evaluator for `outputs`; `origin` names the document in positions.
  pub fn new(outputs: Json, origin: impl Into<String>, store: Rc<dyn Store>) -> Self {
    Self {
      state: Rc::new(EvalState {
        outputs,
        origin: origin.into(),
        store,
        read_only: false,
        forced: Cell::new(0),
      }),
    }
  }

  /// Forbid writing derivations to the store.
  ///
  /// Store paths are still computed, so `drvPath` and `outPath` evaluate to the
  /// same strings either way.
  pub fn read_only(self, read_only: bool) -> Self {
    let state = match Rc::try_unwrap(self.state) {
      Ok(mut state) => {
        state.read_only = read_only;
        state
      }
      Err(shared) => EvalState {
        outputs: shared.outputs.clone(),
        origin: shared.origin.clone(),
        store: shared.store.clone(),
        read_only,
        forced: Cell::new(shared.forced.get()),
      },
    };
    Self { state: Rc::new(state) }
  }

  /// A cursor at the root of the output tree.
  pub fn root(&self) -> JsonCursor {
    JsonCursor {
      state: self.state.clone(),
      path: AttrPath::root(),
      loc: Location::Expr(String::new()),
    }
  }

  /// Number of values forced through cursors so far.
  pub fn force_count(&self) -> usize {
    self.state.forced.get()
  }
}

/// A cursor produced by [`JsonEvaluator`].
#[derive(Clone)]
pub struct JsonCursor {
  state: Rc<EvalState>,
  path: AttrPath,
  loc: Location,
}

impl EvalCursor for JsonCursor {
  fn path(&self) -> &AttrPath {
    &self.path
  }

  fn pos(&self) -> String {
    let pointer = match &self.loc {
      Location::Expr(p) | Location::DrvPath(p) | Location::OutPath(p) => p,
    };
    format!("{}#/outputs{}", self.state.origin, pointer)
  }

  fn force(&self) -> Result<Value, EvalError> {
    trace!(path = %self.path, "forcing");
    self.state.forced.set(self.state.forced.get() + 1);
    self.state.force_at(&self.loc, 0)
  }

  fn maybe_child(&self, name: &str) -> Result<Option<Self>, EvalError> {
    Ok(self.state.child_at(&self.loc, name, 0)?.map(|loc| JsonCursor {
      state: self.state.clone(),
      path: self.path.child(name),
      loc,
    }))
  }
}

fn escape(segment: &str) -> String {
  segment.replace('~', "~0").replace('/', "~1")
}

fn is_marker(obj: &Map<String, Json>) -> bool {
  MARKERS.iter().any(|m| obj.contains_key(*m))
}

fn is_derivation_object(obj: &Map<String, Json>) -> bool {
  obj.get("type").and_then(Json::as_str) == Some("derivation")
}

fn json_type_error(expected: &str, json: &Json) -> EvalError {
  let found = match json {
    Json::Null => "null",
    Json::Bool(_) => "a Boolean",
    Json::Number(n) if n.is_i64() || n.is_u64() => "an integer",
    Json::Number(_) => "a float",
    Json::String(_) => "a string",
    Json::Array(_) => "a list",
    Json::Object(_) => "a set",
  };
  EvalError::Type {
    expected: expected.to_string(),
    found: found.to_string(),
  }
}

impl EvalState {
  fn expr(&self, pointer: &str) -> Result<&Json, EvalError> {
    self
      .outputs
      .pointer(pointer)
      .ok_or_else(|| EvalError::Other(format!("dangling reference to '/outputs{}'", pointer)))
  }

  fn depth_check(&self, depth: usize, target: &str) -> Result<(), EvalError> {
    if depth >= MAX_SELF_DEPTH {
      return Err(EvalError::InfiniteRecursion(target.to_string()));
    }
    Ok(())
  }

  /// Follow `$self` references until the location is something else.
  fn normalize(&self, loc: &Location, depth: usize) -> Result<Location, EvalError> {
    let Location::Expr(pointer) = loc else {
      return Ok(loc.clone());
    };
    let Some(target) = self.expr(pointer)?.as_object().and_then(|o| o.get(SELF_REF)) else {
      return Ok(loc.clone());
    };
    let target = target
      .as_str()
      .ok_or_else(|| EvalError::Other("'$self' must name an attribute path".to_string()))?;
    self.depth_check(depth, target)?;
    let resolved = self.lookup(&AttrPath::parse(target), depth + 1)?;
    self.normalize(&resolved, depth + 1)
  }

  fn lookup(&self, path: &AttrPath, depth: usize) -> Result<Location, EvalError> {
    let mut loc = Location::Expr(String::new());
    for segment in path.segments() {
      loc = self
        .child_at(&loc, segment, depth)?
        .ok_or_else(|| EvalError::MissingAttr { attr: segment.clone() })?;
    }
    Ok(loc)
  }

  fn child_at(&self, loc: &Location, name: &str, depth: usize) -> Result<Option<Location>, EvalError> {
    let loc = self.normalize(loc, depth)?;
    if let Location::Expr(pointer) = &loc
      && let Some(obj) = self.expr(pointer)?.as_object()
      && !is_marker(obj)
    {
      if obj.contains_key(name) {
        return Ok(Some(Location::Expr(format!("{}/{}", pointer, escape(name)))));
      }
      if is_derivation_object(obj) {
        match name {
          "drvPath" => return Ok(Some(Location::DrvPath(pointer.clone()))),
          "outPath" => return Ok(Some(Location::OutPath(pointer.clone()))),
          _ => {}
        }
      }
      return Ok(None);
    }
    let forced = self.force_at(&loc, depth)?;
    Err(EvalError::type_mismatch("a set", &forced))
  }

  fn force_at(&self, loc: &Location, depth: usize) -> Result<Value, EvalError> {
    match self.normalize(loc, depth)? {
      Location::Expr(pointer) => self.force_expr(&pointer, depth),
      Location::DrvPath(pointer) => {
        let (_, drv_path) = self.instantiate(&pointer, depth)?;
        Ok(Value::String(ContextString {
          value: drv_path.clone(),
          context: BTreeSet::from([ContextElem {
            drv_path,
            output: String::new(),
          }]),
        }))
      }
      Location::OutPath(pointer) => {
        let (drv, drv_path) = self.instantiate(&pointer, depth)?;
        let out = drv
          .out_path()
          .map_err(|e| EvalError::Instantiate {
            name: drv.name.clone(),
            message: e.to_string(),
          })?;
        Ok(Value::String(ContextString {
          value: self.store.print_store_path(&out),
          context: BTreeSet::from([ContextElem {
            drv_path,
            output: "out".to_string(),
          }]),
        }))
      }
    }
  }

  fn force_expr(&self, pointer: &str, depth: usize) -> Result<Value, EvalError> {
    let json = self.expr(pointer)?;
    let value = match json {
      Json::Null => Value::Null,
      Json::Bool(b) => Value::Bool(*b),
      Json::Number(n) => match n.as_i64() {
        Some(i) => Value::Int(i),
        None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
      },
      Json::String(s) => Value::String(ContextString::plain(s.clone())),
      Json::Array(items) => Value::List(items.len()),
      Json::Object(obj) => {
        if let Some(message) = obj.get(THROW) {
          let message = match message {
            Json::String(s) => s.clone(),
            other => other.to_string(),
          };
          return Err(EvalError::Thrown { message });
        }
        if let Some(param) = obj.get(LAMBDA) {
          return Ok(Value::Lambda(parse_lambda(param, obj.get("body"))?));
        }
        if obj.contains_key(CONCAT) {
          return Ok(Value::String(self.concat(pointer, depth)?));
        }
        let mut names: BTreeSet<String> = obj.keys().cloned().collect();
        if is_derivation_object(obj) {
          names.insert("drvPath".to_string());
          names.insert("outPath".to_string());
        }
        Value::Attrs(names.into_iter().collect())
      }
    };
    Ok(value)
  }

  fn concat(&self, pointer: &str, depth: usize) -> Result<ContextString, EvalError> {
    self.depth_check(depth, &format!("/outputs{}", pointer))?;
    let depth = depth + 1;
    let parts_pointer = format!("{}/{}", pointer, escape(CONCAT));
    let Json::Array(parts) = self.expr(&parts_pointer)? else {
      return Err(json_type_error("a list", self.expr(&parts_pointer)?));
    };
    let mut result = ContextString::default();
    for index in 0..parts.len() {
      let part = self.normalize(&Location::Expr(format!("{}/{}", parts_pointer, index)), depth)?;
      let part = self.coerce_to_string(&part, depth)?;
      result.value.push_str(&part.value);
      result.context.extend(part.context);
    }
    Ok(result)
  }

  fn coerce_to_string(&self, loc: &Location, depth: usize) -> Result<ContextString, EvalError> {
    if let Location::Expr(pointer) = loc
      && self.expr(pointer)?.as_object().is_some_and(is_derivation_object)
    {
      return self.coerce_to_string(&Location::OutPath(pointer.clone()), depth);
    }
    match self.force_at(loc, depth)? {
      Value::String(s) => Ok(s),
      Value::Int(i) => Ok(ContextString::plain(i.to_string())),
      other => Err(EvalError::Coerce {
        found: other.type_name().to_string(),
      }),
    }
  }

  fn string_at(&self, pointer: &str, name: &str, depth: usize) -> Result<Option<ContextString>, EvalError> {
    match self.child_at(&Location::Expr(pointer.to_string()), name, depth)? {
      Some(loc) => self.coerce_to_string(&loc, depth).map(Some),
      None => Ok(None),
    }
  }

  /// Build the derivation described by the set at `pointer` and register it.
  ///
  /// Returns the derivation and its printed `.drv` path.
  fn instantiate(&self, pointer: &str, depth: usize) -> Result<(Derivation, String), EvalError> {
    self.depth_check(depth, &format!("/outputs{}", pointer))?;
    let depth = depth + 1;
    let name = self
      .string_at(pointer, "name", depth)?
      .ok_or_else(|| EvalError::MissingAttr {
        attr: "name".to_string(),
      })?
      .value;
    let fail = |message: String| EvalError::Instantiate {
      name: name.clone(),
      message,
    };

    let system = self
      .string_at(pointer, "system", depth)?
      .ok_or_else(|| fail("required attribute 'system' missing".to_string()))?
      .value;
    let builder = self.string_at(pointer, "builder", depth)?.map(|s| s.value);

    let mut args = Vec::new();
    if let Some(Json::Array(items)) = self.expr(pointer)?.get("args") {
      for index in 0..items.len() {
        let loc = Location::Expr(format!("{}/args/{}", pointer, index));
        args.push(self.coerce_to_string(&self.normalize(&loc, depth)?, depth)?.value);
      }
    }

    let mut env = BTreeMap::new();
    if let Some(Json::Object(vars)) = self.expr(pointer)?.get("env") {
      for key in vars.keys() {
        let loc = Location::Expr(format!("{}/env/{}", pointer, escape(key)));
        env.insert(key.clone(), self.coerce_to_string(&self.normalize(&loc, depth)?, depth)?.value);
      }
    }

    let drv = Derivation {
      name: name.clone(),
      system,
      builder,
      args,
      env,
    };
    let path = if self.read_only {
      drv.drv_path()
    } else {
      self.store.write_derivation(&drv)
    }
    .map_err(|e| fail(e.to_string()))?;
    Ok((drv, self.store.print_store_path(&path)))
  }
}

fn parse_param(param: &Json) -> Result<Param, EvalError> {
  match param {
    Json::String(name) => Ok(Param::Ident(name.clone())),
    Json::Object(obj) => {
      let names = obj
        .get("formals")
        .and_then(Json::as_array)
        .map(|items| items.iter().filter_map(Json::as_str).map(str::to_string).collect())
        .unwrap_or_default();
      Ok(Param::Formals {
        names,
        ellipsis: obj.get("ellipsis").and_then(Json::as_bool).unwrap_or(false),
        bind: obj.get("bind").and_then(Json::as_str).map(str::to_string),
      })
    }
    other => Err(EvalError::Other(format!(
      "invalid function parameter {}",
      other
    ))),
  }
}

fn parse_lambda(param: &Json, body: Option<&Json>) -> Result<Lambda, EvalError> {
  let inner = match body.and_then(Json::as_object) {
    Some(obj) => match obj.get(LAMBDA) {
      Some(inner_param) => Some(Box::new(parse_lambda(inner_param, obj.get("body"))?)),
      None => None,
    },
    None => None,
  };
  Ok(Lambda {
    param: parse_param(param)?,
    body: inner,
  })
}
