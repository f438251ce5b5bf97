/*!

The abstract sink consuming the ground program. The wire format follows the aspif model: atoms are positive
integers, literals are signed integers, atom `0` is reserved as "always false" and atom `1` is emitted once as a
fact and plays "always true". A sink may only reuse atom ids across steps when the program was announced as
incremental.

One concrete sink lives here: [`RecordingBackend`], which captures every call for inspection (tests, reification
debugging). The debug tee of the `debug` configuration switches is part of the translator, which prints each emitted
statement through the log transport before forwarding it.

*/

use std::fmt::Write as _;

use crate::{abstractions::join_string, api::symbol::Symbol};

/// A backend atom id. `0` is "always false"; `1` is conventionally a fact standing for "true".
pub type BackendAtom = u32;
/// A signed backend literal.
pub type BackendLit = i32;
/// A literal with a weight, for weight rules and minimize statements.
pub type WeightedLit = (BackendLit, i64);

/// Truth values assignable to external atoms.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ExternalValue {
  True,
  False,
  Free,
  Release,
}

/// Heuristic modifiers.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum HeuristicMod {
  Level,
  Sign,
  Factor,
  Init,
  True,
  False,
}

/// Components of a theory term.
#[derive(Clone, Debug, PartialEq)]
pub enum TheoryTermData {
  Number(i32),
  Name(String),
  /// A compound with an optional name id (tuples have none).
  Compound {
    name: Option<u32>,
    args: Vec<u32>,
  },
}

/// The abstract output sink. All methods default to no-ops so partial sinks stay small.
pub trait Backend {
  fn init_program(&mut self, _incremental: bool) {}
  fn begin_step(&mut self) {}
  fn end_step(&mut self) {}

  fn rule(&mut self, _choice: bool, _head: &[BackendAtom], _body: &[BackendLit]) {}
  fn weight_rule(&mut self, _choice: bool, _head: &[BackendAtom], _lower: i64, _body: &[WeightedLit]) {}
  fn minimize(&mut self, _priority: i64, _lits: &[WeightedLit]) {}
  fn project(&mut self, _atoms: &[BackendAtom]) {}
  fn external(&mut self, _atom: BackendAtom, _value: ExternalValue) {}
  fn assume(&mut self, _lits: &[BackendLit]) {}
  fn heuristic(&mut self, _atom: BackendAtom, _modifier: HeuristicMod, _bias: i32, _priority: u32, _condition: &[BackendLit]) {}
  fn acyc_edge(&mut self, _u: i32, _v: i32, _condition: &[BackendLit]) {}

  fn theory_term(&mut self, _id: u32, _data: &TheoryTermData) {}
  fn theory_element(&mut self, _id: u32, _terms: &[u32], _condition: &[BackendLit]) {}
  fn theory_atom(&mut self, _atom: BackendAtom, _term: u32, _elements: &[u32], _guard: Option<(u32, u32)>) {}

  /// Symbol table output for `#show`.
  fn output(&mut self, _symbol: Symbol, _condition: &[BackendLit]) {}
}

/// Every backend call, captured as a line of text. The textual form is stable so tests can compare traces.
#[derive(Default)]
pub struct RecordingBackend {
  pub calls: Vec<String>,
}

impl RecordingBackend {
  pub fn new() -> RecordingBackend {
    RecordingBackend::default()
  }
}

fn lits(body: &[BackendLit]) -> String {
  join_string(body.iter(), ",")
}

fn wlits(body: &[WeightedLit]) -> String {
  join_string(body.iter().map(|(l, w)| format!("{}={}", l, w)), ",")
}

impl Backend for RecordingBackend {
  fn init_program(&mut self, incremental: bool) {
    self.calls.push(format!("init({})", incremental));
  }

  fn begin_step(&mut self) {
    self.calls.push("begin_step".to_string());
  }

  fn end_step(&mut self) {
    self.calls.push("end_step".to_string());
  }

  fn rule(&mut self, choice: bool, head: &[BackendAtom], body: &[BackendLit]) {
    let mut line = String::new();
    let _ = write!(
      line,
      "rule({},{{{}}},{{{}}})",
      choice,
      join_string(head.iter(), ","),
      lits(body)
    );
    self.calls.push(line);
  }

  fn weight_rule(&mut self, choice: bool, head: &[BackendAtom], lower: i64, body: &[WeightedLit]) {
    let mut line = String::new();
    let _ = write!(
      line,
      "weight_rule({},{{{}}},{},{{{}}})",
      choice,
      join_string(head.iter(), ","),
      lower,
      wlits(body)
    );
    self.calls.push(line);
  }

  fn minimize(&mut self, priority: i64, lits: &[WeightedLit]) {
    self.calls.push(format!("minimize({},{{{}}})", priority, wlits(lits)));
  }

  fn project(&mut self, atoms: &[BackendAtom]) {
    self.calls.push(format!("project({{{}}})", join_string(atoms.iter(), ",")));
  }

  fn external(&mut self, atom: BackendAtom, value: ExternalValue) {
    self.calls.push(format!("external({},{:?})", atom, value));
  }

  fn assume(&mut self, body: &[BackendLit]) {
    self.calls.push(format!("assume({{{}}})", lits(body)));
  }

  fn heuristic(&mut self, atom: BackendAtom, modifier: HeuristicMod, bias: i32, priority: u32, condition: &[BackendLit]) {
    self
        .calls
        .push(format!("heuristic({},{:?},{},{},{{{}}})", atom, modifier, bias, priority, lits(condition)));
  }

  fn acyc_edge(&mut self, u: i32, v: i32, condition: &[BackendLit]) {
    self.calls.push(format!("acyc_edge({},{},{{{}}})", u, v, lits(condition)));
  }

  fn theory_term(&mut self, id: u32, data: &TheoryTermData) {
    self.calls.push(format!("theory_term({},{:?})", id, data));
  }

  fn theory_element(&mut self, id: u32, terms: &[u32], condition: &[BackendLit]) {
    self
        .calls
        .push(format!("theory_element({},{{{}}},{{{}}})", id, join_string(terms.iter(), ","), lits(condition)));
  }

  fn theory_atom(&mut self, atom: BackendAtom, term: u32, elements: &[u32], guard: Option<(u32, u32)>) {
    self.calls.push(format!(
      "theory_atom({},{},{{{}}},{:?})",
      atom,
      term,
      join_string(elements.iter(), ","),
      guard
    ));
  }

  fn output(&mut self, symbol: Symbol, condition: &[BackendLit]) {
    self.calls.push(format!("output({},{{{}}})", symbol, lits(condition)));
  }
}
