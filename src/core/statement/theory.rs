/*!

Theory atoms: `&name(args) { t₁,…,tₙ : c ; … } op guard`. The atom accumulate statement grounds the atom term and
guard under the enclosing global context and defines a per-instance marker the element statements hang off; one
element accumulate per source element grounds the condition and its term tuple. The complete statement defines
pending theory atoms. The accumulated theory data is emitted through the backend after all regular rules of the
step, by the translator's step flush.

*/

use crate::{
  api::symbol::SymbolVec,
  core::{
    binder::MatchCtx,
    domain::{AtomFlag, DomainData},
    logger::{GroundError, Warnings},
    statement::{cond_to_output, Statement, StatementKind},
  },
  output::translate::OutputSink,
};

impl Statement {
  pub(crate) fn report_theory(&self, ctx: &mut MatchCtx, _out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::TheoryAtomAccumulate { dom, repr, inst_dom, inst_repr, atom, guard } => {
        let (Some(repr_sym), Some(inst_sym)) = (repr.eval(), inst_repr.eval()) else {
          return ctx.log.report(Warnings::GlobalVariable, || {
            format!("{}: info: global variables of theory atom not bound, instance ignored", self.loc)
          });
        };
        let Some(atom_sym) = atom.eval() else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: theory atom ignored:\n  {}", self.loc, atom)
          });
        };
        let guard_sym = match guard {
          Some((op, term)) => {
            let Some(value) = term.eval() else {
              return ctx.log.report(Warnings::OperationUndefined, || {
                format!("{}: info: theory guard ignored:\n  {}", self.loc, term)
              });
            };
            Some((op.clone(), value))
          }
          None => None,
        };

        ctx.doms.get_mut(*inst_dom).define(inst_sym, false);
        let domain = ctx.doms.get_mut(*dom);
        let (uid, _) = domain.reserve(repr_sym);
        let DomainData::Theory(states) = &mut domain.data else {
          unreachable!("theory accumulate over a non-theory domain")
        };
        let state = &mut states[uid as usize];
        state.atom_sym.get_or_insert(atom_sym);
        if state.guard.is_none() {
          state.guard = guard_sym;
        }
        let atom = domain.atom_mut(uid);
        if !atom.defined() && !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::TheoryElemAccumulate { dom, repr, tuple } => {
        let Some(repr_sym) = repr.eval() else {
          return Ok(());
        };
        let mut values = SymbolVec::with_capacity(tuple.len());
        for term in tuple {
          let Some(value) = term.eval() else {
            return ctx.log.report(Warnings::OperationUndefined, || {
              format!("{}: info: theory tuple ignored:\n  {}", self.loc, term)
            });
          };
          values.push(value);
        }
        let cond = cond_to_output(&self.lits, ctx);

        let domain = ctx.doms.get_mut(*dom);
        let Some(uid) = domain.find(repr_sym) else {
          return Ok(());
        };
        let DomainData::Theory(states) = &mut domain.data else {
          unreachable!("theory element accumulate over a non-theory domain")
        };
        states[uid as usize].elements.push((values, cond));
        let atom = domain.atom_mut(uid);
        if !atom.defined() && !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::TheoryComplete { dom } => {
        let domain = ctx.doms.get_mut(*dom);
        let todo = std::mem::take(&mut domain.todo);
        for uid in todo {
          domain.define_uid(uid, false);
          domain.atom_mut(uid).flags.remove(AtomFlag::Enqueued);
        }
        Ok(())
      }

      _ => unreachable!("report_theory on a non-theory statement"),
    }
  }
}
