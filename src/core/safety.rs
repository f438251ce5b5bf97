/*!

Safety checking and body linearization. Given a rule body and the variables already bound by the enclosing context,
produce an evaluation order in which every literal has its needed variables bound at the point it runs, or report
the rule unsafe, naming the unbound variables.

The checker works on a bipartite graph of entity nodes (one per literal, tagged with its NEW/OLD/ALL window type)
and variable nodes. A binding occurrence draws an edge literal→variable, a needing occurrence variable→literal; an
entity is *open* once every variable pointing at it is bound. Among open entities the selection prefers
evaluation-only literals (negative score), then NEW-tagged entities (so the new partition of a recursive plan is
entered exactly once), then the lowest fan-out estimate.

For a recursive component the same body is linearized once per positive recursive literal: that literal is tagged
NEW, the recursive literals before it OLD, the ones after it ALL. Together the plans enumerate exactly the new
derivations of the current phase.

*/

use crate::{
  abstractions::{istr, HashMap, IString},
  api::{
    location::Location,
    program::Naf,
    term::{VarBoundVec, VarSet},
  },
  core::{
    domain::Domains,
    instantiator::Instantiator,
    literal::Literal,
    logger::GroundError,
    BinderType,
    DomId,
    StmId,
  },
};

struct EntNode {
  binder_type: BinderType,
  /// Variable nodes this literal can bind.
  provides: Vec<usize>,
  /// Unsatisfied needing occurrences.
  needs: usize,
  placed: bool,
}

struct VarNode {
  name: IString,
  bound: bool,
  /// Entities with a needing occurrence of this variable, one entry per occurrence.
  required_by: Vec<usize>,
}

/// One linearized plan plus the domains its NEW binders watch; the grounder registers the instantiator as a
/// dependent of each so window slides re-enqueue it.
pub struct Plan {
  pub instantiator: Instantiator,
  pub new_domains : Vec<DomId>,
}

impl std::fmt::Debug for Plan {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Plan")
        .field("instantiator", &self.instantiator)
        .field("new_domains", &self.new_domains)
        .finish()
  }
}

/// Linearizes one body into one plan per positive recursive literal (or a single all-ALL plan when there is none).
pub fn linearize(
  doms: &mut Domains,
  owner: StmId,
  lits: &[Literal],
  bound_init: &VarSet,
  loc: &Location,
) -> Result<Vec<Plan>, GroundError> {
  let mut recursive = Vec::new();
  for (i, lit) in lits.iter().enumerate() {
    if lit.is_recursive() && matches!(lit.occurrence(), Some((_, Naf::Pos))) {
      recursive.push(i);
    }
  }

  // The NEW/OLD/ALL rotation: plan k has recursive literal k NEW, the ones before it OLD, the rest ALL.
  let mut rotations: Vec<Vec<BinderType>> = Vec::new();
  if recursive.is_empty() {
    rotations.push(vec![BinderType::All; lits.len()]);
  } else {
    for (k, &lit_idx) in recursive.iter().enumerate() {
      let mut types = vec![BinderType::All; lits.len()];
      for &older in &recursive[..k] {
        types[older] = BinderType::Old;
      }
      types[lit_idx] = BinderType::New;
      rotations.push(types);
    }
  }

  let mut plans = Vec::with_capacity(rotations.len());
  for types in rotations {
    plans.push(linearize_plan(doms, owner, lits, &types, bound_init, loc)?);
  }
  Ok(plans)
}

/// Linearizes one plan with fixed window types.
fn linearize_plan(
  doms: &mut Domains,
  owner: StmId,
  lits: &[Literal],
  types: &[BinderType],
  bound_init: &VarSet,
  loc: &Location,
) -> Result<Plan, GroundError> {
  let mut bound = bound_init.clone();
  let mut ents: Vec<EntNode> = Vec::with_capacity(lits.len());
  let mut vars: Vec<VarNode> = Vec::new();
  let mut var_ids: HashMap<IString, usize> = HashMap::default();

  for (i, lit) in lits.iter().enumerate() {
    let mut ent = EntNode {
      binder_type: types[i],
      provides: Vec::new(),
      needs: 0,
      placed: false,
    };
    let mut occs = VarBoundVec::new();
    lit.collect(&mut occs);
    for (name, can_bind) in occs {
      if bound.contains(&name) {
        continue;
      }
      let var_id = *var_ids.entry(name.clone()).or_insert_with(|| {
        vars.push(VarNode { name, bound: false, required_by: Vec::new() });
        vars.len() - 1
      });
      if can_bind {
        ent.provides.push(var_id);
      } else {
        vars[var_id].required_by.push(i);
        ent.needs += 1;
      }
    }
    ents.push(ent);
  }

  let mut open: Vec<usize> = (0..ents.len()).filter(|&i| ents[i].needs == 0).collect();
  let mut inst = Instantiator::new(owner);
  let mut new_domains = Vec::new();
  let mut placed = 0usize;

  while placed < ents.len() {
    // Selection: evaluation-only first, then NEW entities, then the smallest fan-out; ties by position for
    // determinism.
    let best = open
        .iter()
        .copied()
        .min_by(|&a, &b| {
          let sa = lits[a].score(doms, &bound);
          let sb = lits[b].score(doms, &bound);
          if (sa < 0.0) != (sb < 0.0) {
            return sa.partial_cmp(&sb).unwrap();
          }
          let ta = ents[a].binder_type;
          let tb = ents[b].binder_type;
          if (ta == BinderType::New) != (tb == BinderType::New) {
            return ta.cmp(&tb);
          }
          sa.partial_cmp(&sb).unwrap().then(a.cmp(&b))
        });

    let Some(chosen) = best else {
      // No open entity: the remaining literals cannot have their variables bound.
      let mut names: Vec<IString> = vars.iter().filter(|v| !v.bound).map(|v| v.name.clone()).collect();
      names.sort_by(|a, b| istr(a).cmp(istr(b)));
      names.dedup();
      return Err(GroundError::unsafe_variables(loc.clone(), names.into_iter()));
    };
    open.retain(|&i| i != chosen);
    ents[chosen].placed = true;
    placed += 1;

    let binder = lits[chosen].index(doms, ents[chosen].binder_type, &mut bound);
    if ents[chosen].binder_type == BinderType::New {
      if let Some((dom, Naf::Pos)) = lits[chosen].occurrence() {
        new_domains.push(dom);
      }
    }

    // Whatever the binder bound is now available; release entities whose needs are met.
    let mut depends = Vec::new();
    let provides = ents[chosen].provides.clone();
    for var_id in provides {
      if vars[var_id].bound || !bound.contains(&vars[var_id].name) {
        continue;
      }
      vars[var_id].bound = true;
      for &dependent in &vars[var_id].required_by {
        let ent = &mut ents[dependent];
        ent.needs -= 1;
        if ent.needs == 0 && !ent.placed {
          open.push(dependent);
        }
      }
      depends.push(placed as u32 - 1);
    }
    depends.dedup();
    inst.add(binder, depends);
  }

  inst.finalize((0..ents.len() as u32).collect());
  Ok(Plan { instantiator: inst, new_domains })
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    api::{
      program::Rel,
      symbol::{Sig, Symbol},
      term::Term,
    },
    core::literal::{AtomKind, PredicateLiteral, RangeLiteral, RelationLiteral},
  };

  fn pred(doms: &mut Domains, name: &str, args: Vec<Term>) -> Literal {
    let dom = doms.add_sig(Sig::new(name, args.len() as u32, false));
    Literal::Pred(PredicateLiteral::new(
      dom,
      Naf::Pos,
      Term::fun(name, args),
      AtomKind::Predicate,
      false,
      Location::default(),
    ))
  }

  #[test]
  fn unsafe_rule_reports_variables() {
    // p(X) :- Y < 3. has both X and Y unsafe; here we linearize the body of a head needing X.
    let mut doms = Domains::new();
    let lits = vec![Literal::Relation(RelationLiteral {
      rel: Rel::Lt,
      lhs: Term::var("Y"),
      rhs: Term::Val(Symbol::create_num(3)),
      loc: Location::default(),
    })];
    let err = linearize(&mut doms, 0, &lits, &VarSet::default(), &Location::default()).unwrap_err();
    assert!(matches!(err, GroundError::UnsafeVariables { .. }));
    assert!(err.to_string().contains('Y'));
  }

  #[test]
  fn relation_waits_for_its_variables() {
    // q(X), X < 3: the comparison must be placed after the predicate binds X.
    let mut doms = Domains::new();
    let lits = vec![
      Literal::Relation(RelationLiteral {
        rel: Rel::Lt,
        lhs: Term::var("X"),
        rhs: Term::Val(Symbol::create_num(3)),
        loc: Location::default(),
      }),
      pred(&mut doms, "q", vec![Term::var("X")]),
    ];
    let plans = linearize(&mut doms, 0, &lits, &VarSet::default(), &Location::default()).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].instantiator.len(), 2);
  }

  #[test]
  fn assignment_makes_following_literal_safe() {
    // X = 1..3, p(X, Y): the range binds X, the predicate binds Y.
    let mut doms = Domains::new();
    let lits = vec![
      Literal::Range(RangeLiteral {
        assign: Term::var("X"),
        left: Term::Val(Symbol::create_num(1)),
        right: Term::Val(Symbol::create_num(3)),
        loc: Location::default(),
      }),
      pred(&mut doms, "p", vec![Term::var("X"), Term::var("Y")]),
    ];
    let plans = linearize(&mut doms, 0, &lits, &VarSet::default(), &Location::default()).unwrap();
    assert_eq!(plans.len(), 1);
  }

  #[test]
  fn recursive_literals_rotate_plans() {
    let mut doms = Domains::new();
    let a = pred(&mut doms, "a", vec![Term::var("X")]);
    let b = pred(&mut doms, "b", vec![Term::var("X")]);
    a.set_occurrence_type(crate::core::literal::OccurrenceType::Unstratified);
    b.set_occurrence_type(crate::core::literal::OccurrenceType::Unstratified);
    let lits = vec![a, b];
    let plans = linearize(&mut doms, 0, &lits, &VarSet::default(), &Location::default()).unwrap();
    // One plan per positive recursive literal.
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].new_domains.len(), 1);
    assert_eq!(plans[1].new_domains.len(), 1);
  }
}
