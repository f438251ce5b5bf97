/*!

Warning accumulation and fatal errors. The per-run [`Logger`] gates warnings by category and by a bounded message
count; when the count is exhausted, further reports raise [`GroundError::MessageLimit`], which unwinds the grounding
of the current step. The actual printing goes through the `abstractions::log` transport, so category gates configured
globally apply on top of the per-run gates here.

Fatal conditions carry structured payloads: an unsafe rule names its unbound variables and location; interrupts and
message-limit exhaustion are distinguished variants so drivers can tell them apart.

*/

use enumflags2::{bitflags, BitFlags};
use thiserror::Error;

use crate::{
  abstractions::{join_string, log::categories, IString, Set},
  api::location::Location,
  warning,
};

/// Warning categories. The codes mirror `abstractions::log::categories` one to one.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Warnings {
  OperationUndefined,
  RuntimeError,
  AtomUndefined,
  FileIncluded,
  VariableUnbounded,
  GlobalVariable,
  Other,
}

impl Warnings {
  fn category(self) -> u8 {
    match self {
      Warnings::OperationUndefined => categories::OPERATION_UNDEFINED,
      Warnings::RuntimeError => categories::RUNTIME_ERROR,
      Warnings::AtomUndefined => categories::ATOM_UNDEFINED,
      Warnings::FileIncluded => categories::FILE_INCLUDED,
      Warnings::VariableUnbounded => categories::VARIABLE_UNBOUNDED,
      Warnings::GlobalVariable => categories::GLOBAL_VARIABLE,
      Warnings::Other => categories::OTHER,
    }
  }
}

/// Errors that abort the current grounding step.
#[derive(Error, Debug)]
pub enum GroundError {
  #[error("{loc}: error: unsafe variables in rule:\n  {names}")]
  UnsafeVariables { loc: Location, names: String },

  #[error("too many messages.")]
  MessageLimit,

  #[error("interrupted")]
  Interrupted,

  #[error("{loc}: error: {message}")]
  Semantic { loc: Location, message: String },
}

impl GroundError {
  pub fn unsafe_variables(loc: Location, names: impl Iterator<Item = IString>) -> GroundError {
    GroundError::UnsafeVariables { loc, names: join_string(names, ", ") }
  }
}

/// Per-run warning gate: category enables, a bounded message count, and an error flag. Runtime errors always count
/// as errors even when their message is suppressed.
pub struct Logger {
  limit     : u32,
  disabled  : BitFlags<Warnings>,
  error     : bool,
  /// Locations already reported at `AtomUndefined`; that category is deduplicated per symbolic location.
  printed_at: Set<Location>,
}

impl Default for Logger {
  fn default() -> Logger {
    Logger::new(20)
  }
}

impl Logger {
  pub fn new(limit: u32) -> Logger {
    Logger {
      limit,
      disabled: BitFlags::empty(),
      error: false,
      printed_at: Set::default(),
    }
  }

  pub fn enable(&mut self, id: Warnings, enabled: bool) {
    if enabled {
      self.disabled.remove(id);
    } else {
      self.disabled.insert(id);
    }
  }

  #[inline(always)]
  pub fn has_error(&self) -> bool {
    self.error
  }

  /// Should a message of this category be printed? Decrements the message budget; raises `MessageLimit` once the
  /// budget is exhausted and an error has occurred.
  pub fn check(&mut self, id: Warnings) -> Result<bool, GroundError> {
    if id == Warnings::RuntimeError {
      if self.limit == 0 && self.error {
        return Err(GroundError::MessageLimit);
      }
      if self.limit > 0 {
        self.limit -= 1;
      }
      self.error = true;
      return Ok(true);
    }
    if self.limit == 0 && self.error {
      return Err(GroundError::MessageLimit);
    }
    if self.disabled.contains(id) || self.limit == 0 {
      return Ok(false);
    }
    self.limit -= 1;
    Ok(true)
  }

  /// Reports a warning. The message closure only runs when the message passes the gates.
  pub fn report(&mut self, id: Warnings, message: impl FnOnce() -> String) -> Result<(), GroundError> {
    if self.check(id)? {
      warning!(id.category(), "{}", message());
    }
    Ok(())
  }

  /// Reports a non-fatal error: the message prints (budget permitting), the error flag sticks, and grounding of the
  /// remaining statements continues. Unsafe rules use this.
  pub fn report_error(&mut self, message: impl FnOnce() -> String) -> Result<(), GroundError> {
    if self.check(Warnings::RuntimeError)? {
      crate::error!(categories::RUNTIME_ERROR, "{}", message());
    }
    Ok(())
  }

  /// Reports a warning at most once per location. Used for `AtomUndefined`.
  pub fn report_once(
    &mut self,
    id: Warnings,
    loc: &Location,
    message: impl FnOnce() -> String,
  ) -> Result<(), GroundError> {
    if self.printed_at.contains(loc) {
      return Ok(());
    }
    self.printed_at.insert(loc.clone());
    self.report(id, message)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn message_limit_unwinds() {
    let mut log = Logger::new(1);
    assert!(log.check(Warnings::OperationUndefined).unwrap());
    // Budget exhausted but no error yet: further warnings are silently dropped.
    assert!(!log.check(Warnings::OperationUndefined).unwrap());
    // A runtime error sets the error flag …
    assert!(log.check(Warnings::RuntimeError).unwrap());
    assert!(log.has_error());
    // … after which an exhausted budget raises the distinguished error.
    assert!(matches!(log.check(Warnings::OperationUndefined), Err(GroundError::MessageLimit)));
    assert!(matches!(log.check(Warnings::RuntimeError), Err(GroundError::MessageLimit)));
  }

  #[test]
  fn disabled_categories_are_dropped() {
    let mut log = Logger::new(10);
    log.enable(Warnings::AtomUndefined, false);
    assert!(!log.check(Warnings::AtomUndefined).unwrap());
    assert!(log.check(Warnings::OperationUndefined).unwrap());
  }

  #[test]
  fn report_once_deduplicates_by_location() {
    let mut log = Logger::new(10);
    let loc = Location::internal("t");
    let mut count = 0;
    for _ in 0..3 {
      log
          .report_once(Warnings::AtomUndefined, &loc, || {
            count += 1;
            "atom does not occur in any rule head".to_string()
          })
          .unwrap();
    }
    assert_eq!(count, 1);
  }
}
