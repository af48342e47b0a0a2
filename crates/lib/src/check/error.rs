//! Errors raised while validating outputs.

use std::fmt;

use thiserror::Error;

use crate::eval::EvalError;
use crate::store::StoreError;

/// What went wrong, without the frames describing where.
#[derive(Debug, Error)]
pub enum CheckCause {
  #[error(transparent)]
  Eval(#[from] EvalError),

  /// An output does not have the shape its kind requires.
  #[error("{0}")]
  Violation(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// A failed check together with the attribute paths it happened under.
///
/// `context` is innermost first. Display prints it outermost first, one frame
/// per line, followed by the cause.
#[derive(Debug)]
pub struct CheckError {
  pub context: Vec<String>,
  pub cause: CheckCause,
}

impl CheckError {
  pub fn violation(message: impl Into<String>) -> Self {
    Self {
      context: Vec::new(),
      cause: CheckCause::Violation(message.into()),
    }
  }

  /// Add an enclosing frame.
  pub fn within(mut self, frame: String) -> Self {
    self.context.push(frame);
    self
  }
}

impl fmt::Display for CheckError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for frame in self.context.iter().rev() {
      writeln!(f, "{}", frame)?;
    }
    write!(f, "{}", self.cause)
  }
}

impl std::error::Error for CheckError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.cause)
  }
}

impl From<EvalError> for CheckError {
  fn from(err: EvalError) -> Self {
    Self {
      context: Vec::new(),
      cause: err.into(),
    }
  }
}

impl From<StoreError> for CheckError {
  fn from(err: StoreError) -> Self {
    Self {
      context: Vec::new(),
      cause: err.into(),
    }
  }
}

/// Wrap the error of a result in one more context frame.
pub(crate) trait Framed<T> {
  fn framed(self, frame: impl FnOnce() -> String) -> Result<T, CheckError>;
}

impl<T, E: Into<CheckError>> Framed<T> for Result<T, E> {
  fn framed(self, frame: impl FnOnce() -> String) -> Result<T, CheckError> {
    self.map_err(|e| e.into().within(frame()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_print_outermost_first() {
    let err = CheckError::violation("flake attribute 'x' is not a derivation")
      .within("while checking the derivation 'x' at here:".into())
      .within("while checking flake output 'x':".into());
    assert_eq!(
      err.to_string(),
      "while checking flake output 'x':\nwhile checking the derivation 'x' at here:\nflake attribute 'x' is not a derivation"
    );
    assert!(matches!(err.cause, CheckCause::Violation(_)));
  }

  #[test]
  fn eval_errors_keep_their_message() {
    let err: Result<(), EvalError> = Err(EvalError::Thrown { message: "boom".into() });
    let err = err.framed(|| "while evaluating the option 'foo' at here:".into()).unwrap_err();
    assert_eq!(err.context.len(), 1);
    assert!(err.to_string().ends_with("\nboom"));
    assert!(matches!(err.cause, CheckCause::Eval(_)));
  }
}
