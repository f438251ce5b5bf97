/*!

Accumulation state carried by synthesized atoms. Aggregate, conjunction, disjunction, and theory atoms are ground
atoms like any other: they live in domains, have uids, and are referenced by literals. Each carries an interim
state that its accumulate statements grow instance by instance and its complete statement inspects when the
feeding domains saturate.

The aggregate state is the interesting one: a per-tuple element table (set semantics; a tuple counts once no matter
how many conditions derive it), the disjunctive bounds compiled from the guards, and a conservatively tracked
*value range*, the interval of values the aggregate can still take under any completion of its element set. The atom
is satisfiable while the range intersects the bounds and a fact once the range is contained in them.

*/

use crate::{
  abstractions::{HashMap, IString},
  api::{
    program::AggregateFunction,
    symbol::{Symbol, SymbolVec},
  },
  core::bounds::{Bound, DisjunctiveBounds, Interval},
  output::LiteralId,
};

// The head-aggregate and disjunction states below also double as the translation input; their `emitted` cursors
// keep recursive instances from lowering the same body twice.

/// One entry of a body-aggregate element table, keyed by its ground tuple.
#[derive(Clone, Debug)]
pub struct AggregateElement {
  /// The conditions under which the tuple holds; empty conditions make the element a fact.
  pub conds: Vec<Vec<LiteralId>>,
  pub fact : bool,
  /// The tuple's weight: its first component for `#sum`/`#min`/`#max`, 1 for `#count`.
  pub weight: Symbol,
}

/// Interim state of one body-aggregate atom.
#[derive(Clone, Debug)]
pub struct AggregateAtomState {
  pub fun        : AggregateFunction,
  pub bounds     : DisjunctiveBounds,
  pub monotone   : bool,
  pub elements   : HashMap<Symbol, AggregateElement>,
  pub recursive  : bool,
  pub initialized: bool,
}

impl AggregateAtomState {
  pub fn new(fun: AggregateFunction, bounds: DisjunctiveBounds, monotone: bool) -> AggregateAtomState {
    AggregateAtomState {
      fun,
      bounds,
      monotone,
      elements: HashMap::default(),
      recursive: false,
      initialized: true,
    }
  }

  /// Accumulates one ground element instance. `tuple_sym` is the interned tuple, `weight` its weight under the
  /// aggregate function, `cond` the surviving condition literals (empty means the instance is a fact).
  pub fn accumulate(&mut self, tuple_sym: Symbol, weight: Symbol, cond: Vec<LiteralId>) {
    let entry = self.elements.entry(tuple_sym).or_insert_with(|| AggregateElement {
      conds: Vec::new(),
      fact: false,
      weight,
    });
    if cond.is_empty() {
      entry.fact = true;
      entry.conds.clear();
    } else if !entry.fact {
      entry.conds.push(cond);
    }
  }

  /// The interval of values the aggregate can take, over all truth assignments to the non-fact elements.
  pub fn value_range(&self) -> Interval {
    fn num_bound(n: i64) -> Bound {
      if n < i32::MIN as i64 {
        Bound::inclusive(Symbol::create_inf())
      } else if n > i32::MAX as i64 {
        Bound::inclusive(Symbol::create_sup())
      } else {
        Bound::inclusive(Symbol::create_num(n as i32))
      }
    }

    match self.fun {
      AggregateFunction::Count => {
        let fixed = self.elements.values().filter(|e| e.fact).count() as i64;
        let open = self.elements.values().filter(|e| !e.fact).count() as i64;
        Interval::new(num_bound(fixed), num_bound(fixed + open))
      }

      AggregateFunction::Sum | AggregateFunction::SumPlus => {
        let clamp = |w: i64| if self.fun == AggregateFunction::SumPlus { w.max(0) } else { w };
        let mut lo = 0i64;
        let mut hi = 0i64;
        for e in self.elements.values() {
          // Non-numeric weights never make it into the table; see the accumulate statement.
          let w = clamp(e.weight.num() as i64);
          if e.fact {
            lo += w;
            hi += w;
          } else if w < 0 {
            lo += w;
          } else {
            hi += w;
          }
        }
        Interval::new(num_bound(lo), num_bound(hi))
      }

      AggregateFunction::Min => {
        // The minimum over the true elements: at most the least fact weight (#sup over the empty set), at least
        // the least weight overall.
        let fact_min = self.elements.values().filter(|e| e.fact).map(|e| e.weight).min();
        let all_min = self.elements.values().map(|e| e.weight).min();
        Interval::new(
          Bound::inclusive(all_min.unwrap_or_else(Symbol::create_sup)),
          Bound::inclusive(fact_min.unwrap_or_else(Symbol::create_sup)),
        )
      }

      AggregateFunction::Max => {
        let fact_max = self.elements.values().filter(|e| e.fact).map(|e| e.weight).max();
        let all_max = self.elements.values().map(|e| e.weight).max();
        Interval::new(
          Bound::inclusive(fact_max.unwrap_or_else(Symbol::create_inf)),
          Bound::inclusive(all_max.unwrap_or_else(Symbol::create_inf)),
        )
      }
    }
  }

  /// The bounds still admit some completion of the element set.
  pub fn satisfiable(&self) -> bool {
    self.bounds.intersects(&self.value_range())
  }

  /// The bounds hold no matter which remaining conditional elements evaluate true.
  pub fn fact(&self) -> bool {
    self.bounds.contains(&self.value_range())
  }
}

/// One element of a head aggregate: the tuple, the witness atom it guards, and the instance condition.
#[derive(Clone, Debug)]
pub struct HeadAggregateElement {
  pub tuple  : Symbol,
  pub weight : Symbol,
  pub witness: Option<LiteralId>,
  pub cond   : Vec<LiteralId>,
}

/// Interim state of one head-aggregate atom. Bodies arrive from the enclosing rule, elements from the accumulate
/// statements; `emitted` tracks how many bodies have been lowered so recursive instances emit each body once.
#[derive(Clone, Debug, Default)]
pub struct HeadAggregateAtomState {
  pub fun     : Option<AggregateFunction>,
  pub bounds  : Option<DisjunctiveBounds>,
  pub bodies  : Vec<Vec<LiteralId>>,
  pub emitted : usize,
  pub elements: Vec<HeadAggregateElement>,
}

/// One condition instance of a conjunction, keyed by its local binding tuple.
#[derive(Clone, Debug, Default)]
pub struct ConjunctionCond {
  pub cond     : Vec<LiteralId>,
  /// Has the condition been derived with an empty (fact) body?
  pub cond_fact: bool,
  /// The head derivations seen for this condition instance; an empty inner vector is a fact head.
  pub heads    : Vec<Vec<LiteralId>>,
  pub head_fact: bool,
}

/// Interim state of one conjunction atom.
#[derive(Clone, Debug, Default)]
pub struct ConjunctionAtomState {
  pub conds         : HashMap<Symbol, ConjunctionCond>,
  pub cond_recursive: bool,
  pub head_recursive: bool,
}

impl ConjunctionAtomState {
  /// The conjunction is a fact when every condition instance has a fact head.
  pub fn fact(&self) -> bool {
    self.conds.values().all(|c| c.head_fact)
  }
}

/// One element instance of a disjunctive head: the candidate atom (if its evaluation was defined) and the ground
/// condition under which it joins the disjunction.
#[derive(Clone, Debug)]
pub struct DisjunctionElement {
  pub head: Option<LiteralId>,
  pub cond: Vec<LiteralId>,
}

/// Interim state of one disjunction atom: the candidate elements and one recorded body per enclosing-rule
/// assignment; `emitted` tracks how many bodies have been lowered.
#[derive(Clone, Debug, Default)]
pub struct DisjunctionAtomState {
  pub elements: Vec<DisjunctionElement>,
  pub bodies  : Vec<Vec<LiteralId>>,
  pub emitted : usize,
}

/// Interim state of one theory atom.
#[derive(Clone, Debug, Default)]
pub struct TheoryAtomState {
  pub atom_sym: Option<Symbol>,
  pub elements: Vec<(SymbolVec, Vec<LiteralId>)>,
  pub guard   : Option<(IString, Symbol)>,
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::program::Rel;

  fn num(n: i32) -> Symbol {
    Symbol::create_num(n)
  }

  fn tuple(n: i32) -> Symbol {
    Symbol::create_tuple(vec![num(n)])
  }

  fn lit() -> LiteralId {
    LiteralId::pos(0, 0)
  }

  #[test]
  fn empty_element_set_values() {
    // count = 0, sum = 0, min = #sup, max = #inf over the empty set.
    let count = AggregateAtomState::new(AggregateFunction::Count, DisjunctiveBounds::all(), true);
    assert_eq!(count.value_range(), Interval::point(num(0)));
    let sum = AggregateAtomState::new(AggregateFunction::Sum, DisjunctiveBounds::all(), false);
    assert_eq!(sum.value_range(), Interval::point(num(0)));
    let min = AggregateAtomState::new(AggregateFunction::Min, DisjunctiveBounds::all(), false);
    assert_eq!(min.value_range(), Interval::point(Symbol::create_sup()));
    let max = AggregateAtomState::new(AggregateFunction::Max, DisjunctiveBounds::all(), false);
    assert_eq!(max.value_range(), Interval::point(Symbol::create_inf()));
  }

  #[test]
  fn count_narrows_toward_fact() {
    let bounds = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(2))]);
    let mut state = AggregateAtomState::new(AggregateFunction::Count, bounds, true);
    state.accumulate(tuple(1), num(1), vec![lit()]);
    assert!(state.satisfiable());
    assert!(!state.fact());
    state.accumulate(tuple(2), num(1), vec![]);
    state.accumulate(tuple(3), num(1), vec![]);
    // Two facts reach the lower bound regardless of the conditional element.
    assert!(state.fact());
  }

  #[test]
  fn count_has_set_semantics() {
    let mut state = AggregateAtomState::new(AggregateFunction::Count, DisjunctiveBounds::all(), true);
    state.accumulate(tuple(1), num(1), vec![lit()]);
    state.accumulate(tuple(1), num(1), vec![]);
    state.accumulate(tuple(1), num(1), vec![lit()]);
    assert_eq!(state.value_range(), Interval::point(num(1)));
  }

  #[test]
  fn sum_with_negative_weights() {
    let bounds = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(0))]);
    let mut state = AggregateAtomState::new(AggregateFunction::Sum, bounds, false);
    state.accumulate(tuple(5), num(5), vec![]);
    assert!(state.fact());
    // A conditional negative weight can drop the sum below the bound again.
    state.accumulate(tuple(-7), num(-7), vec![lit()]);
    assert!(state.satisfiable());
    assert!(!state.fact());
  }

  #[test]
  fn sum_plus_clamps_negative_weights() {
    let bounds = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(0))]);
    let mut state = AggregateAtomState::new(AggregateFunction::SumPlus, bounds, true);
    state.accumulate(tuple(-7), num(-7), vec![lit()]);
    assert!(state.fact());
  }

  #[test]
  fn min_unsatisfiable_when_all_weights_above_bound() {
    // #min{...} >= 5 with a fact element of weight 3: the minimum is at most 3.
    let bounds = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(5))]);
    let mut state = AggregateAtomState::new(AggregateFunction::Min, bounds, false);
    state.accumulate(tuple(3), num(3), vec![]);
    assert!(!state.satisfiable());
  }

  #[test]
  fn conjunction_fact() {
    let mut state = ConjunctionAtomState::default();
    let key = tuple(1);
    state.conds.entry(key).or_default().heads.push(vec![]);
    state.conds.entry(key).or_default().head_fact = true;
    assert!(state.fact());
    let key2 = tuple(2);
    state.conds.entry(key2).or_default().heads.push(vec![lit()]);
    assert!(!state.fact());
  }
}
