/*!

Head aggregates, e.g. `1 { p(X) : q(X) } 2 :- r.`: the enclosing rule defines one head-aggregate atom per global
binding and records the ground body; one accumulate statement per element grounds the condition, evaluates the
tuple, and reserves the witness atom. The complete statement defines the witnesses and lowers each recorded body
into a choice over the witnesses plus bound-enforcing constraints.

*/

use crate::{
  core::{
    atoms::HeadAggregateElement,
    binder::MatchCtx,
    bounds::DisjunctiveBounds,
    domain::{AtomFlag, DomainData},
    logger::{GroundError, Warnings},
    statement::{
      body_aggregate::{element_weight, eval_guards},
      body_to_output,
      cond_to_output,
      Statement,
      StatementKind,
    },
  },
  output::{translate::OutputSink, LiteralId},
};

use crate::api::symbol::{Symbol, SymbolVec};

impl Statement {
  pub(crate) fn report_head_aggregate(&self, ctx: &mut MatchCtx, out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::HeadAggrRule { dom, repr, fun, bounds } => {
        let Some(repr_sym) = repr.eval() else {
          return ctx.log.report(Warnings::GlobalVariable, || {
            format!("{}: info: global variables of head aggregate not bound, instance ignored", self.loc)
          });
        };
        let Some(guards) = eval_guards(bounds) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: aggregate bound undefined, instance ignored", self.loc)
          });
        };
        let (body, _fact) = body_to_output(&self.lits, ctx, out.keep_facts());
        let domain = ctx.doms.get_mut(*dom);
        let (uid, _) = domain.define(repr_sym, false);
        let DomainData::HeadAggregate(states) = &mut domain.data else {
          unreachable!("head aggregate rule over a non-aggregate domain")
        };
        let state = &mut states[uid as usize];
        state.fun.get_or_insert(*fun);
        state.bounds.get_or_insert_with(|| DisjunctiveBounds::from_guards(&guards));
        state.bodies.push(body);
        let atom = domain.atom_mut(uid);
        if !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::HeadAggrAccumulate { dom, repr, fun, tuple, atom } => {
        let Some(repr_sym) = repr.eval() else {
          return Ok(());
        };
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
        let cond = cond_to_output(&self.lits, ctx);
        let witness = match atom {
          Some(def) => {
            let Some(head_sym) = def.repr.eval() else {
              return ctx.log.report(Warnings::OperationUndefined, || {
                format!("{}: info: head of aggregate element ignored:\n  {}", self.loc, def.repr)
              });
            };
            let (head_uid, _) = ctx.doms.get_mut(def.dom).reserve(head_sym);
            Some(LiteralId::pos(def.dom, head_uid))
          }
          None => None,
        };

        let domain = ctx.doms.get_mut(*dom);
        let Some(uid) = domain.find(repr_sym) else {
          return Ok(());
        };
        let DomainData::HeadAggregate(states) = &mut domain.data else {
          unreachable!("head aggregate accumulate over a non-aggregate domain")
        };
        states[uid as usize].elements.push(HeadAggregateElement {
          tuple: Symbol::create_tuple(values),
          weight,
          witness,
          cond,
        });
        let atom = domain.atom_mut(uid);
        if !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::HeadAggrComplete { dom } => {
        let todo = std::mem::take(&mut ctx.doms.get_mut(*dom).todo);
        for uid in todo {
          ctx.doms.get_mut(*dom).atom_mut(uid).flags.remove(AtomFlag::Enqueued);

          let (bodies, witnesses) = {
            let domain = ctx.doms.get_mut(*dom);
            let DomainData::HeadAggregate(states) = &mut domain.data else {
              unreachable!("head aggregate complete over a non-aggregate domain")
            };
            let state = &mut states[uid as usize];
            let bodies: Vec<Vec<LiteralId>> = state.bodies[state.emitted..].to_vec();
            state.emitted = state.bodies.len();
            let witnesses: Vec<LiteralId> = state.elements.iter().filter_map(|e| e.witness).collect();
            (bodies, witnesses)
          };

          // Witness atoms become derivable the moment a rule offers them as choices.
          for witness in &witnesses {
            ctx.doms.get_mut(witness.dom).define_uid(witness.uid, false);
          }
          for body in bodies {
            out.head_aggregate_rule(ctx.doms, *dom, uid, &body, ctx.log)?;
          }
        }
        Ok(())
      }

      _ => unreachable!("report_head_aggregate on a non-aggregate statement"),
    }
  }
}
