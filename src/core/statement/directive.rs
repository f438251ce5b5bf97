/*!

Thin accumulator statements: `#show`, `#project`, `#heuristic`, `#edge`, and weak constraints. Each evaluates its
terms for one assignment and, when everything is defined, writes one corresponding output statement. Undefined
evaluations warn at `operation-undefined` and drop the instance.

*/

use crate::{
  abstractions::istr,
  api::{
    symbol::{Symbol, SymbolType, SymbolVec},
    term::Term,
  },
  core::{
    binder::MatchCtx,
    logger::{GroundError, Warnings},
    statement::{cond_to_output, Statement, StatementKind},
  },
  output::{backend::HeuristicMod, translate::OutputSink},
};

impl Statement {
  pub(crate) fn report_directive(&self, ctx: &mut MatchCtx, out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::Show { term } => {
        let Some(sym) = term.eval() else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: tuple ignored:\n  {}", self.loc, term)
          });
        };
        let cond = cond_to_output(&self.lits, ctx);
        out.show(ctx.doms, sym, &cond, ctx.log)
      }

      StatementKind::Project { atom } => {
        let Some(sym) = atom.eval() else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: project atom ignored:\n  {}", self.loc, atom)
          });
        };
        debug_assert!(sym.has_sig());
        let Some(dom) = ctx.doms.find_sig(sym.sig()) else {
          return Ok(());
        };
        let Some(uid) = ctx.doms.get(dom).find(sym) else {
          return Ok(());
        };
        out.project(ctx.doms, dom, uid, ctx.log)
      }

      StatementKind::Heuristic { atom, value, priority, modifier } => {
        let Some(sym) = atom.eval() else {
          return Ok(());
        };
        debug_assert!(sym.has_sig());
        let Some(dom) = ctx.doms.find_sig(sym.sig()) else {
          return Ok(());
        };
        let Some(uid) = ctx.doms.get(dom).find(sym) else {
          return Ok(());
        };
        let Some(value_sym) = value.eval().filter(|v| v.symbol_type() == SymbolType::Num) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: heuristic directive ignored", self.loc)
          });
        };
        let priority_sym = priority.eval().filter(|p| p.symbol_type() == SymbolType::Num && p.num() >= 0);
        let Some(priority_sym) = priority_sym else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: heuristic directive ignored", self.loc)
          });
        };
        let Some(modifier) = modifier.eval().and_then(heuristic_mod) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: heuristic directive ignored", self.loc)
          });
        };
        let cond = cond_to_output(&self.lits, ctx);
        out.heuristic(
          ctx.doms,
          dom,
          uid,
          modifier,
          value_sym.num(),
          priority_sym.num() as u32,
          &cond,
          ctx.log,
        )
      }

      StatementKind::Edge { u, v } => {
        let (u_sym, v_sym) = match (u.eval(), v.eval()) {
          (Some(u_sym), Some(v_sym)) => (u_sym, v_sym),
          _ => {
            return ctx.log.report(Warnings::OperationUndefined, || {
              format!("{}: info: edge ignored", self.loc)
            });
          }
        };
        let cond = cond_to_output(&self.lits, ctx);
        out.edge(ctx.doms, u_sym, v_sym, &cond, ctx.log)
      }

      StatementKind::Minimize { weight, priority, tuple } => {
        let Some((weight_sym, priority_sym, tuple_sym)) = eval_minimize_tuple(weight, priority, tuple) else {
          return ctx.log.report(Warnings::OperationUndefined, || {
            format!("{}: info: tuple ignored:\n  {}@{}", self.loc, weight, priority)
          });
        };
        let cond = cond_to_output(&self.lits, ctx);
        out.minimize_entry(
          ctx.doms,
          weight_sym.num() as i64,
          priority_sym.num() as i64,
          tuple_sym,
          &cond,
          ctx.log,
        )
      }

      _ => unreachable!("report_directive on a non-directive statement"),
    }
  }
}

fn heuristic_mod(sym: Symbol) -> Option<HeuristicMod> {
  if sym.symbol_type() != SymbolType::Fun || sym.arity() != 0 || sym.sign() {
    return None;
  }
  match istr(&sym.name()) {
    "level" => Some(HeuristicMod::Level),
    "sign" => Some(HeuristicMod::Sign),
    "factor" => Some(HeuristicMod::Factor),
    "init" => Some(HeuristicMod::Init),
    "true" => Some(HeuristicMod::True),
    "false" => Some(HeuristicMod::False),
    _ => None,
  }
}

/// Evaluates a weak-constraint tuple; the first two components must be numbers. The full tuple symbol identifies
/// the entry for set semantics in the translator.
fn eval_minimize_tuple(weight: &Term, priority: &Term, tuple: &[Term]) -> Option<(Symbol, Symbol, Symbol)> {
  let weight_sym = weight.eval()?;
  let priority_sym = priority.eval()?;
  if weight_sym.symbol_type() != SymbolType::Num || priority_sym.symbol_type() != SymbolType::Num {
    return None;
  }
  let mut values: SymbolVec = vec![weight_sym, priority_sym];
  for term in tuple {
    values.push(term.eval()?);
  }
  Some((weight_sym, priority_sym, Symbol::create_tuple(values)))
}
