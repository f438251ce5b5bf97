/*!

Ground-side literals: the per-rule occurrences the instantiation machinery works with. Each literal knows how to

 - report its variables (`collect`) with can-bind flags,
 - estimate the fan-out of evaluating it next (`score`; negative means evaluation-only, i.e. it must wait until all
   its variables are bound),
 - build a binder for a given window type and set of bound variables (`index`, which picks between single-probe
   matchers and index-backed enumeration), and
 - render itself for the output layer (`to_output`), yielding an optional atom reference and a fact flag; a missing
   reference with `fact = true` is a literal that is always true and is dropped from rule bodies.

Aggregate, conjunction, and theory literals are predicate literals over their synthesized domains; only their
`to_output` differs, driven by the accumulated atom state.

*/

use std::cell::Cell;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::{
  abstractions::{HashMap, IString},
  api::{
    location::Location,
    program::{Naf, Rel},
    symbol::{Symbol, SymbolType},
    term::{Term, VarBoundVec, VarCell, VarSet},
  },
  core::{
    binder::{
      AssignBinder,
      BindBinder,
      BxBinder,
      FullBinder,
      LookupMatcher,
      RangeBinder,
      RangeMatcher,
      RelationMatcher,
      ResultCell,
      ScriptBinder,
    },
    domain::{DomainData, Domains},
    BinderType,
    DomId,
    INVALID_UID,
  },
  output::LiteralId,
};

/// Stratification class of a body occurrence, assigned by dependency analysis.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OccurrenceType {
  /// All defining statements live in earlier components and the occurrence is positive.
  PositivelyStratified,
  /// All defining statements live in earlier components.
  Stratified,
  /// Some defining statement shares this occurrence's component.
  Unstratified,
}

/// What kind of atom the referenced domain holds; decides `to_output`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AtomKind {
  Predicate,
  BodyAggregate,
  Conjunction,
  Theory,
}

/// A signed literal over a predicate (or synthesized) domain.
pub struct PredicateLiteral {
  pub dom      : DomId,
  pub naf      : Naf,
  pub repr     : Term,
  pub kind     : AtomKind,
  /// Synthesized literals (aggregate plumbing) are auxiliary: hidden from output bodies.
  pub auxiliary: bool,
  pub occ_type : Cell<OccurrenceType>,
  pub result   : ResultCell,
  pub loc      : Location,
}

impl PredicateLiteral {
  pub fn new(dom: DomId, naf: Naf, repr: Term, kind: AtomKind, auxiliary: bool, loc: Location) -> PredicateLiteral {
    PredicateLiteral {
      dom,
      naf,
      repr,
      kind,
      auxiliary,
      occ_type: Cell::new(OccurrenceType::PositivelyStratified),
      result: Rc::new(Cell::new(INVALID_UID)),
      loc,
    }
  }
}

pub struct RelationLiteral {
  pub rel: Rel,
  pub lhs: Term,
  pub rhs: Term,
  pub loc: Location,
}

pub struct RangeLiteral {
  pub assign: Term,
  pub left  : Term,
  pub right : Term,
  pub loc   : Location,
}

pub struct ScriptLiteral {
  pub assign: Term,
  pub name  : IString,
  pub args  : Vec<Term>,
  pub loc   : Location,
}

pub enum Literal {
  Pred(PredicateLiteral),
  Relation(RelationLiteral),
  Range(RangeLiteral),
  Script(ScriptLiteral),
}

/// Expected fan-out of enumerating a predicate template against a domain of the given size: the more of the
/// template's variables are already bound, the narrower the enumeration.
fn estimate(size: usize, repr: &Term, bound: &VarSet) -> f64 {
  let mut vars = VarBoundVec::new();
  repr.collect_vars(&mut vars, true);
  let mut seen = VarSet::default();
  let mut total = 0usize;
  let mut bound_count = 0usize;
  for (name, _) in vars {
    if seen.insert(name.clone()) {
      total += 1;
      if bound.contains(&name) {
        bound_count += 1;
      }
    }
  }
  if total == 0 {
    1.0
  } else {
    size as f64 / (1 + bound_count) as f64
  }
}

impl Literal {
  pub fn loc(&self) -> &Location {
    match self {
      Literal::Pred(lit) => &lit.loc,
      Literal::Relation(lit) => &lit.loc,
      Literal::Range(lit) => &lit.loc,
      Literal::Script(lit) => &lit.loc,
    }
  }

  pub fn auxiliary(&self) -> bool {
    match self {
      Literal::Pred(lit) => lit.auxiliary,
      _ => false,
    }
  }

  /// The domain occurrence for dependency analysis, with its sign.
  pub fn occurrence(&self) -> Option<(DomId, Naf)> {
    match self {
      Literal::Pred(lit) => Some((lit.dom, lit.naf)),
      _ => None,
    }
  }

  pub fn is_recursive(&self) -> bool {
    match self {
      Literal::Pred(lit) => lit.occ_type.get() == OccurrenceType::Unstratified,
      _ => false,
    }
  }

  pub fn set_occurrence_type(&self, occ_type: OccurrenceType) {
    if let Literal::Pred(lit) = self {
      lit.occ_type.set(occ_type);
    }
  }

  /// Reports variable occurrences with can-bind flags.
  pub fn collect(&self, vars: &mut VarBoundVec) {
    match self {
      Literal::Pred(lit) => lit.repr.collect_vars(vars, lit.naf == Naf::Pos),
      Literal::Relation(lit) => {
        lit.lhs.collect_vars(vars, lit.rel == Rel::Eq);
        lit.rhs.collect_vars(vars, false);
      }
      Literal::Range(lit) => {
        lit.assign.collect_vars(vars, true);
        lit.left.collect_vars(vars, false);
        lit.right.collect_vars(vars, false);
      }
      Literal::Script(lit) => {
        lit.assign.collect_vars(vars, true);
        for arg in &lit.args {
          arg.collect_vars(vars, false);
        }
      }
    }
  }

  /// Non-negative fan-out estimate used to choose the linearization order; negative means the literal is
  /// evaluation-only and should run as soon as its variables are bound.
  pub fn score(&self, doms: &Domains, bound: &VarSet) -> f64 {
    match self {
      Literal::Pred(lit) => {
        if lit.naf == Naf::Pos {
          estimate(doms.get(lit.dom).len(), &lit.repr, bound)
        } else {
          0.0
        }
      }

      Literal::Relation(_) => -1.0,

      Literal::Range(lit) => {
        if lit.left.is_ground() && lit.right.is_ground() {
          match (lit.left.eval(), lit.right.eval()) {
            (Some(l), Some(r)) if l.symbol_type() == SymbolType::Num && r.symbol_type() == SymbolType::Num => {
              (r.num() as f64) - (l.num() as f64)
            }
            _ => -1.0,
          }
        } else {
          0.0
        }
      }

      Literal::Script(_) => 0.0,
    }
  }

  /// Builds the binder evaluating this literal under the given window type and bound-variable set, extending
  /// `bound` with the variables the binder will bind.
  pub fn index(&self, doms: &mut Domains, binder_type: BinderType, bound: &mut VarSet) -> BxBinder {
    match self {
      Literal::Pred(lit) => index_predicate(lit, doms, binder_type, bound, self.is_recursive()),

      Literal::Relation(lit) => {
        if lit.rel == Rel::Eq {
          let lhs = lit.lhs.clone();
          if lhs.bind(bound) {
            return Box::new(AssignBinder::new(lhs, lit.rhs.clone(), lit.loc.clone()));
          }
        }
        Box::new(RelationMatcher::new(lit.rel, lit.lhs.clone(), lit.rhs.clone(), lit.loc.clone()))
      }

      Literal::Range(lit) => {
        let assign = lit.assign.clone();
        if assign.bind(bound) {
          Box::new(RangeBinder::new(assign, lit.left.clone(), lit.right.clone(), lit.loc.clone()))
        } else {
          Box::new(RangeMatcher::new(assign, lit.left.clone(), lit.right.clone(), lit.loc.clone()))
        }
      }

      Literal::Script(lit) => {
        let assign = lit.assign.clone();
        assign.bind(bound);
        Box::new(ScriptBinder::new(assign, lit.name.clone(), lit.args.clone(), lit.loc.clone()))
      }
    }
  }

  /// Renders the literal for the output layer: an optional atom reference and a fact flag.
  pub fn to_output(&self, doms: &Domains) -> (Option<LiteralId>, bool) {
    match self {
      Literal::Pred(lit) => pred_to_output(lit, doms),
      // Relation, range, and script literals hold by construction of the assignment.
      _ => (None, true),
    }
  }
}

fn pred_to_output(lit: &PredicateLiteral, doms: &Domains) -> (Option<LiteralId>, bool) {
  let uid = lit.result.get();
  if uid == INVALID_UID {
    debug_assert!(lit.naf == Naf::Not);
    return (None, true);
  }
  let dom = doms.get(lit.dom);
  let atom = dom.atom(uid);
  let id = LiteralId::with_naf(lit.naf, lit.dom, uid);

  match lit.kind {
    AtomKind::Predicate => match lit.naf {
      Naf::Pos | Naf::NotNot => (Some(id), atom.fact()),
      Naf::Not => {
        if atom.defined() || lit.occ_type.get() == OccurrenceType::Unstratified {
          (Some(id), false)
        } else {
          (None, true)
        }
      }
    },

    AtomKind::BodyAggregate => {
      let DomainData::BodyAggregate(states) = &dom.data else {
        unreachable!("aggregate literal over a non-aggregate domain")
      };
      let state = states[uid as usize].as_ref();
      match lit.naf {
        Naf::Pos | Naf::NotNot => match state {
          Some(state) if state.fact() => (None, true),
          _ => (Some(id), false),
        },
        Naf::Not => match state {
          Some(state) if !state.recursive && !state.satisfiable() => (None, true),
          _ => (Some(id), false),
        },
      }
    }

    AtomKind::Conjunction => {
      let DomainData::Conjunction(states) = &dom.data else {
        unreachable!("conjunction literal over a non-conjunction domain")
      };
      if states[uid as usize].fact() {
        (None, true)
      } else {
        (Some(id), false)
      }
    }

    AtomKind::Theory => (Some(id), false),
  }
}

fn index_predicate(
  lit: &PredicateLiteral,
  doms: &mut Domains,
  binder_type: BinderType,
  bound: &mut VarSet,
  recursive: bool,
) -> BxBinder {
  if lit.naf != Naf::Pos {
    return Box::new(LookupMatcher::new(
      lit.dom,
      lit.repr.clone(),
      lit.naf,
      recursive,
      BinderType::All,
      lit.result.clone(),
      lit.loc.clone(),
    ));
  }

  let clone = lit.repr.clone();
  let mut occs = VarBoundVec::new();
  clone.collect_vars(&mut occs, true);

  // The bound prefix: variables of the template already bound by the surrounding assignment, first occurrence each.
  let mut seen = VarSet::default();
  let mut occ_bound: Vec<IString> = Vec::new();
  let mut has_unbound = false;
  for (name, _) in &occs {
    if bound.contains(name) {
      if seen.insert(name.clone()) {
        occ_bound.push(name.clone());
      }
    } else {
      has_unbound = true;
    }
  }

  if !has_unbound {
    // A single probe; recursive occurrences respect the window partition.
    let probe_type = if recursive { binder_type } else { BinderType::All };
    return Box::new(LookupMatcher::new(
      lit.dom,
      clone,
      Naf::Pos,
      recursive,
      probe_type,
      lit.result.clone(),
      lit.loc.clone(),
    ));
  }

  // Mark binding occurrences on the enumeration template and extend the bound set.
  clone.bind(bound);

  // The import template gets fresh cells so index refreshes never clobber the rule's assignment.
  let mut renaming: HashMap<IString, VarCell> = HashMap::default();
  let idx_template = clone.rename_vars(&mut renaming);
  idx_template.bind(&mut VarSet::default());

  if occ_bound.is_empty() {
    let index = doms.get_mut(lit.dom).add_full_index(idx_template);
    return Box::new(FullBinder::new(lit.dom, index, clone, binder_type, lit.result.clone()));
  }

  let mut rule_cells: HashMap<IString, VarCell> = HashMap::default();
  clone.collect_cells(&mut rule_cells);
  let key_cells: Vec<VarCell> = occ_bound.iter().map(|name| renaming[name].clone()).collect();
  let bound_cells: Vec<VarCell> = occ_bound.iter().map(|name| rule_cells[name].clone()).collect();
  let index = doms.get_mut(lit.dom).add_bind_index(idx_template, occ_bound, key_cells);
  Box::new(BindBinder::new(lit.dom, index, clone, bound_cells, binder_type, lit.result.clone()))
}

impl Display for Literal {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Literal::Pred(lit) => {
        write!(f, "{}{}", lit.naf, lit.repr)?;
        match lit.occ_type.get() {
          OccurrenceType::PositivelyStratified => Ok(()),
          OccurrenceType::Stratified => write!(f, "!"),
          OccurrenceType::Unstratified => write!(f, "?"),
        }
      }
      Literal::Relation(lit) => write!(f, "{}{}{}", lit.lhs, lit.rel, lit.rhs),
      Literal::Range(lit) => write!(f, "{}={}..{}", lit.assign, lit.left, lit.right),
      Literal::Script(lit) => {
        write!(f, "{}=@{}(", lit.assign, lit.name)?;
        let mut sep = false;
        for arg in &lit.args {
          if sep {
            write!(f, ",")?;
          }
          sep = true;
          write!(f, "{}", arg)?;
        }
        write!(f, ")")
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relation_is_evaluation_only() {
    let lit = Literal::Relation(RelationLiteral {
      rel: Rel::Lt,
      lhs: Term::var("X"),
      rhs: Term::Val(Symbol::create_num(3)),
      loc: Location::default(),
    });
    let doms = Domains::new();
    assert!(lit.score(&doms, &VarSet::default()) < 0.0);
  }

  #[test]
  fn constant_range_scores_by_length() {
    let lit = Literal::Range(RangeLiteral {
      assign: Term::var("X"),
      left: Term::Val(Symbol::create_num(1)),
      right: Term::Val(Symbol::create_num(10)),
      loc: Location::default(),
    });
    let doms = Domains::new();
    assert_eq!(lit.score(&doms, &VarSet::default()), 9.0);
  }

  #[test]
  fn predicate_score_shrinks_with_bound_vars() {
    let mut doms = Domains::new();
    let dom = doms.add_sig(crate::api::symbol::Sig::new("edge", 2, false));
    for i in 0..10 {
      doms.get_mut(dom).define(
        Symbol::create_fun("edge", vec![Symbol::create_num(i), Symbol::create_num(i + 1)], false),
        true,
      );
    }
    let lit = Literal::Pred(PredicateLiteral::new(
      dom,
      Naf::Pos,
      Term::fun("edge", vec![Term::var("X"), Term::var("Y")]),
      AtomKind::Predicate,
      false,
      Location::default(),
    ));
    let unbound = lit.score(&doms, &VarSet::default());
    let mut bound = VarSet::default();
    bound.insert(IString::from("X"));
    let with_x = lit.score(&doms, &bound);
    assert!(with_x < unbound);
  }
}
