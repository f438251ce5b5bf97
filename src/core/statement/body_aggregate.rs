/*!

Body aggregates: the accumulate/complete pair behind a `#count`/`#sum`/`#sum+`/`#min`/`#max` body literal. One
accumulate statement exists per aggregate element; its body is the element condition, and each assignment
contributes one (tuple, condition) pair to the aggregate atom identified by the evaluated global variables. The
complete statement drains the aggregate domain's todo queue when the feeding domains saturate, defining the atoms
whose bounds are still satisfiable.

*/

use crate::{
  api::{
    program::{AggregateFunction, Rel},
    symbol::{Symbol, SymbolType, SymbolVec},
    term::Term,
  },
  core::{
    atoms::AggregateAtomState,
    binder::MatchCtx,
    bounds::DisjunctiveBounds,
    domain::{AtomFlag, DomainData},
    logger::{GroundError, Warnings},
    statement::{cond_to_output, Statement, StatementKind},
  },
  output::translate::OutputSink,
};

impl Statement {
  pub(crate) fn report_body_aggregate(&self, ctx: &mut MatchCtx, _out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::BodyAggrAccumulate { dom, repr, fun, bounds, monotone, tuple } => {
        let mut values = SymbolVec::with_capacity(tuple.len());
        for term in tuple {
          let Some(value) = term.eval() else {
            return ctx.log.report(Warnings::OperationUndefined, || {
              format!("{}: info: tuple ignored:\n  {}", self.loc, term)
            });
          };
          values.push(value);
        }
        let Some(weight) = element_weight(*fun, &values) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: weight of aggregate element must be an integer, tuple ignored", self.loc)
          });
        };
        let Some(guards) = eval_guards(bounds) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: aggregate bound undefined, instance ignored", self.loc)
          });
        };
        let Some(repr_sym) = repr.eval() else {
          return ctx.log.report(Warnings::GlobalVariable, || {
            format!("{}: info: global variable of aggregate not bound by element, instance ignored", self.loc)
          });
        };

        let cond = cond_to_output(&self.lits, ctx);
        let domain = ctx.doms.get_mut(*dom);
        let (uid, _) = domain.reserve(repr_sym);
        let DomainData::BodyAggregate(states) = &mut domain.data else {
          unreachable!("aggregate accumulate over a non-aggregate domain")
        };
        let state = states[uid as usize].get_or_insert_with(|| {
          AggregateAtomState::new(*fun, DisjunctiveBounds::from_guards(&guards), *monotone)
        });
        let tuple_sym = Symbol::create_tuple(values);
        state.accumulate(tuple_sym, weight, cond);

        let atom = domain.atom_mut(uid);
        if !atom.defined() && !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::BodyAggrComplete { dom, output_recursive } => {
        let domain = ctx.doms.get_mut(*dom);
        let todo = std::mem::take(&mut domain.todo);
        for uid in todo {
          let DomainData::BodyAggregate(states) = &mut domain.data else {
            unreachable!("aggregate complete over a non-aggregate domain")
          };
          let satisfiable = match &mut states[uid as usize] {
            Some(state) => {
              state.recursive = output_recursive.get();
              state.satisfiable()
            }
            None => false,
          };
          if satisfiable {
            domain.define_uid(uid, false);
          }
          domain.atom_mut(uid).flags.remove(AtomFlag::Enqueued);
        }
        Ok(())
      }

      _ => unreachable!("report_body_aggregate on a non-aggregate statement"),
    }
  }
}

/// The weight a tuple contributes: 1 for `#count`, the first component otherwise. Sums require integer weights.
pub(crate) fn element_weight(fun: AggregateFunction, tuple: &[Symbol]) -> Option<Symbol> {
  match fun {
    AggregateFunction::Count => Some(Symbol::create_num(1)),
    AggregateFunction::Sum | AggregateFunction::SumPlus => match tuple.first() {
      Some(first) if first.symbol_type() == SymbolType::Num => Some(*first),
      _ => None,
    },
    AggregateFunction::Min | AggregateFunction::Max => tuple.first().copied(),
  }
}

/// Evaluates guard terms; aggregate bounds must be ground by the time an element fires.
pub(crate) fn eval_guards(bounds: &[(Rel, Term)]) -> Option<Vec<(Rel, Symbol)>> {
  let mut guards = Vec::with_capacity(bounds.len());
  for (rel, term) in bounds {
    guards.push((*rel, term.eval()?));
  }
  Some(guards)
}

/// Whether the bounds keep the aggregate monotone: `#count`/`#sum+`/`#max` stay monotone under lower bounds,
/// `#min` under upper bounds, `#sum` never.
pub(crate) fn monotone(fun: AggregateFunction, bounds: &[(Rel, Term)]) -> bool {
  match fun {
    AggregateFunction::Count | AggregateFunction::SumPlus | AggregateFunction::Max => {
      bounds.iter().all(|(rel, _)| matches!(rel, Rel::Gt | Rel::Geq))
    }
    AggregateFunction::Min => bounds.iter().all(|(rel, _)| matches!(rel, Rel::Lt | Rel::Leq)),
    AggregateFunction::Sum => false,
  }
}
