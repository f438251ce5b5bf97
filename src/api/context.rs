/*!

The callback interface between the grounding core and an embedded scripting runtime. Script literals
`X = @name(t₁,…,tₙ)` evaluate their argument terms and hand the ground symbols to [`ExternalContext::call`]; the
returned sequence is iterated as the literal's matches. An empty sequence is "no match"; a runtime error is reported
at category `operation-undefined` and the match attempt is dropped.

External code may inspect, but never mutate, the symbolic atoms materialized so far through the read-only
[`SymbolicAtomsView`] it is handed. All re-entrant access is serialized by the single-threaded scheduling model.

*/

use std::fmt::{Display, Formatter};

use crate::{
  abstractions::IString,
  api::{
    location::Location,
    symbol::{Sig, Symbol, SymbolVec},
  },
};

/// An error raised by an external callable; reported as a warning with the callable's location and name.
#[derive(Debug)]
pub struct ExternalError {
  pub message: String,
}

impl Display for ExternalError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.message)
  }
}

/// Read-only view of the ground atoms materialized so far, offered to external callables.
pub trait SymbolicAtomsView {
  /// The signatures with a predicate domain.
  fn signatures(&self) -> Vec<Sig>;
  /// The atoms of one domain in insertion order, with their fact and external flags.
  fn atoms(&self, sig: Sig) -> Vec<(Symbol, bool, bool)>;
  /// Is the symbol present in its domain?
  fn contains(&self, sym: Symbol) -> bool;
}

/// The external scripting runtime. The grounder owns nothing about the runtime beyond this trait; in a build
/// without one, [`NullContext`] turns every script literal into a zero-match with a warning.
pub trait ExternalContext {
  fn call(
    &self,
    atoms: &dyn SymbolicAtomsView,
    loc: &Location,
    name: &IString,
    args: &[Symbol],
  ) -> Result<SymbolVec, ExternalError>;
}

/// The absent scripting runtime.
pub struct NullContext;

impl ExternalContext for NullContext {
  fn call(
    &self,
    _atoms: &dyn SymbolicAtomsView,
    _loc: &Location,
    name: &IString,
    _args: &[Symbol],
  ) -> Result<SymbolVec, ExternalError> {
    Err(ExternalError { message: format!("no scripting runtime to evaluate @{}", name) })
  }
}
