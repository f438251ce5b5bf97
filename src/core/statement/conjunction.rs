/*!

Conjunctions (conditional literals in rule bodies): `h : c₁,…,cₙ` means "for every binding of the condition's local
variables, some head derivation holds". Three accumulators cooperate around the conjunction atom:

 - *empty* grounds the enclosing global context, defines a marker atom carrying the global binding, and guarantees
   the conjunction atom exists even when the condition has no instances (an empty conjunction is true);
 - *cond* grounds one condition instance, keyed by the local-variable tuple, and defines a per-instance marker;
 - *head* grounds one head derivation for a condition instance.

The complete statement defines pending conjunction atoms when the feeding domains saturate. The atom is a fact once
every condition instance has a fact head.

*/

use crate::{
  core::{
    binder::MatchCtx,
    domain::{AtomFlag, DomainData},
    logger::{GroundError, Warnings},
    statement::{cond_to_output, Statement, StatementKind},
    AtomUid,
    DomId,
  },
  output::translate::OutputSink,
};

/// Reserves the conjunction atom for the current global binding and queues it for completion.
fn reserve_and_enqueue(ctx: &mut MatchCtx, dom: DomId, repr_sym: crate::api::symbol::Symbol) -> AtomUid {
  let domain = ctx.doms.get_mut(dom);
  let (uid, _) = domain.reserve(repr_sym);
  let atom = domain.atom_mut(uid);
  if !atom.defined() && !atom.flags.contains(AtomFlag::Enqueued) {
    atom.flags.insert(AtomFlag::Enqueued);
    domain.todo.push(uid);
  }
  uid
}

impl Statement {
  pub(crate) fn report_conjunction(&self, ctx: &mut MatchCtx, _out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::ConjAccumulateEmpty { dom, repr, empty_dom, empty_repr } => {
        let (Some(repr_sym), Some(empty_sym)) = (repr.eval(), empty_repr.eval()) else {
          return ctx.log.report(Warnings::GlobalVariable, || {
            format!("{}: info: global variables of conditional literal not bound, instance ignored", self.loc)
          });
        };
        ctx.doms.get_mut(*empty_dom).define(empty_sym, false);
        reserve_and_enqueue(ctx, *dom, repr_sym);
        Ok(())
      }

      StatementKind::ConjAccumulateCond { dom, repr, cond_dom, cond_repr, local } => {
        let (Some(repr_sym), Some(cond_sym), Some(local_sym)) = (repr.eval(), cond_repr.eval(), local.eval()) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: condition ignored", self.loc)
          });
        };
        let cond = cond_to_output(&self.lits, ctx);
        ctx.doms.get_mut(*cond_dom).define(cond_sym, cond.is_empty());

        let uid = reserve_and_enqueue(ctx, *dom, repr_sym);
        let domain = ctx.doms.get_mut(*dom);
        let DomainData::Conjunction(states) = &mut domain.data else {
          unreachable!("conjunction accumulate over a non-conjunction domain")
        };
        let state = &mut states[uid as usize];
        match state.conds.entry(local_sym) {
          std::collections::hash_map::Entry::Occupied(mut entry) => {
            if cond.is_empty() {
              entry.get_mut().cond_fact = true;
            }
          }
          std::collections::hash_map::Entry::Vacant(slot) => {
            let entry = slot.insert(Default::default());
            entry.cond_fact = cond.is_empty();
            entry.cond = cond;
          }
        }
        Ok(())
      }

      StatementKind::ConjAccumulateHead { dom, repr, local } => {
        let (Some(repr_sym), Some(local_sym)) = (repr.eval(), local.eval()) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: condition head ignored", self.loc)
          });
        };
        let heads = cond_to_output(&self.lits, ctx);

        let uid = reserve_and_enqueue(ctx, *dom, repr_sym);
        let domain = ctx.doms.get_mut(*dom);
        let DomainData::Conjunction(states) = &mut domain.data else {
          unreachable!("conjunction accumulate over a non-conjunction domain")
        };
        let entry = states[uid as usize].conds.entry(local_sym).or_default();
        if heads.is_empty() {
          entry.head_fact = true;
        }
        entry.heads.push(heads);
        Ok(())
      }

      StatementKind::ConjComplete { dom, cond_recursive, head_recursive } => {
        let domain = ctx.doms.get_mut(*dom);
        let todo = std::mem::take(&mut domain.todo);
        for uid in todo {
          let DomainData::Conjunction(states) = &mut domain.data else {
            unreachable!("conjunction complete over a non-conjunction domain")
          };
          let state = &mut states[uid as usize];
          state.cond_recursive = cond_recursive.get();
          state.head_recursive = head_recursive.get();
          domain.define_uid(uid, false);
          domain.atom_mut(uid).flags.remove(AtomFlag::Enqueued);
        }
        Ok(())
      }

      _ => unreachable!("report_conjunction on a non-conjunction statement"),
    }
  }
}
