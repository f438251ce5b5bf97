/*!

Disjunctive heads with element conditions. The enclosing rule defines one disjunction atom per global binding and
records the ground body; one accumulate statement per element grounds the condition and reserves the candidate head
atom. The complete statement pairs every recorded body with the accumulated element set and emits the disjunctive
rules, defining the surviving candidates. Plain (condition-free) disjunctions never reach this machinery; they go
through the ordinary rule statement.

*/

use crate::{
  core::{
    atoms::DisjunctionElement,
    binder::MatchCtx,
    domain::{AtomFlag, DomainData},
    logger::{GroundError, Warnings},
    statement::{body_to_output, cond_to_output, Statement, StatementKind},
  },
  output::{
    translate::{DisjHead, OutputSink},
    LiteralId,
  },
};

impl Statement {
  pub(crate) fn report_disjunction(&self, ctx: &mut MatchCtx, out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::DisjRule { dom, repr } => {
        let Some(repr_sym) = repr.eval() else {
          return ctx.log.report(Warnings::GlobalVariable, || {
            format!("{}: info: global variables of disjunction not bound, instance ignored", self.loc)
          });
        };
        let (body, _fact) = body_to_output(&self.lits, ctx, out.keep_facts());
        let domain = ctx.doms.get_mut(*dom);
        let (uid, _) = domain.define(repr_sym, false);
        let DomainData::Disjunction(states) = &mut domain.data else {
          unreachable!("disjunction rule over a non-disjunction domain")
        };
        states[uid as usize].bodies.push(body);
        let atom = domain.atom_mut(uid);
        if !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::DisjAccumulate { dom, repr, head } => {
        let Some(repr_sym) = repr.eval() else {
          return Ok(());
        };
        let cond = cond_to_output(&self.lits, ctx);
        let head_id = match head {
          Some(def) => {
            let Some(head_sym) = def.repr.eval() else {
              return ctx.log.report(Warnings::OperationUndefined, || {
                format!("{}: info: head of disjunction element ignored:\n  {}", self.loc, def.repr)
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
        let DomainData::Disjunction(states) = &mut domain.data else {
          unreachable!("disjunction accumulate over a non-disjunction domain")
        };
        states[uid as usize].elements.push(DisjunctionElement { head: head_id, cond });
        let atom = domain.atom_mut(uid);
        if !atom.flags.contains(AtomFlag::Enqueued) {
          atom.flags.insert(AtomFlag::Enqueued);
          domain.todo.push(uid);
        }
        Ok(())
      }

      StatementKind::DisjComplete { dom } => {
        let todo = std::mem::take(&mut ctx.doms.get_mut(*dom).todo);
        for uid in todo {
          ctx.doms.get_mut(*dom).atom_mut(uid).flags.remove(AtomFlag::Enqueued);

          // Snapshot the pending bodies and the element set.
          let (bodies, elements) = {
            let domain = ctx.doms.get_mut(*dom);
            let DomainData::Disjunction(states) = &mut domain.data else {
              unreachable!("disjunction complete over a non-disjunction domain")
            };
            let state = &mut states[uid as usize];
            let bodies: Vec<Vec<LiteralId>> = state.bodies[state.emitted..].to_vec();
            state.emitted = state.bodies.len();
            (bodies, state.elements.clone())
          };

          for body in bodies {
            // A fact candidate under an empty condition subsumes the whole disjunction.
            let subsumed = elements.iter().any(|e| {
              e.cond.is_empty()
                  && matches!(e.head, Some(h) if ctx.doms.get(h.dom).atom(h.uid).fact())
            });
            if subsumed {
              continue;
            }

            let mut heads = Vec::new();
            for element in &elements {
              let Some(head) = element.head else {
                continue;
              };
              ctx.doms.get_mut(head.dom).define_uid(head.uid, false);
              heads.push(DisjHead { dom: head.dom, uid: head.uid, cond: element.cond.clone() });
            }
            if heads.is_empty() {
              continue;
            }
            // A single surviving candidate under an empty condition with a fact body is itself a fact.
            if body.is_empty() && heads.len() == 1 && heads[0].cond.is_empty() {
              let head = &heads[0];
              ctx.doms.get_mut(head.dom).define_uid(head.uid, true);
            }
            out.disjunctive_rule(ctx.doms, &heads, &body, ctx.log)?;
          }
        }
        Ok(())
      }

      _ => unreachable!("report_disjunction on a non-disjunction statement"),
    }
  }
}
