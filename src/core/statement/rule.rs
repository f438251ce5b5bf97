/*!

Normal, choice, and plain disjunctive rules, plus `#external` declarations. One `report` call sees one complete body
assignment: it renders the body, evaluates and defines the head atoms, applies the fact bookkeeping, and hands the
ground rule to the sink.

*/

use crate::{
  abstractions::istr,
  api::symbol::{Symbol, SymbolType},
  core::{
    binder::MatchCtx,
    logger::{GroundError, Warnings},
    statement::{body_to_output, Statement, StatementKind},
  },
  output::{backend::ExternalValue, translate::OutputSink, GroundRule, LiteralId},
};

impl Statement {
  pub(crate) fn report_rule(&self, ctx: &mut MatchCtx, out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::Rule { choice, heads } => {
        let (body, fact) = body_to_output(&self.lits, ctx, out.keep_facts());
        let mut rule = GroundRule::new(*choice);
        rule.body = body;

        for head in heads {
          let Some(val) = head.repr.eval() else {
            ctx.log.report(Warnings::OperationUndefined, || {
              format!("{}: info: head ignored:\n  {}", self.loc, head.repr)
            })?;
            if *choice {
              continue;
            }
            return Ok(());
          };
          let dom = ctx.doms.get_mut(head.dom);
          let (uid, _) = dom.define(val, false);
          if !dom.atom(uid).fact() {
            rule.heads.push(LiteralId::pos(head.dom, uid));
          } else if !*choice {
            // A fact head subsumes the whole rule.
            return Ok(());
          }
        }

        if *choice && rule.heads.is_empty() {
          return Ok(());
        }
        if !*choice && fact && rule.heads.len() == 1 {
          let head = rule.heads[0];
          ctx.doms.get_mut(head.dom).define_uid(head.uid, true);
        }
        out.rule(ctx.doms, &rule, ctx.log)
      }

      StatementKind::External { heads, value } => {
        for head in heads {
          let Some(val) = head.repr.eval() else {
            continue;
          };
          let Some(value_sym) = value.eval() else {
            continue;
          };
          let Some(ext_value) = external_value(value_sym) else {
            ctx.log.report(Warnings::OperationUndefined, || {
              format!("{}: info: external value ignored:\n  {}", self.loc, value_sym)
            })?;
            continue;
          };
          let dom = ctx.doms.get_mut(head.dom);
          let (uid, _) = dom.define_external(val);
          out.external(ctx.doms, head.dom, uid, ext_value, ctx.log)?;
        }
        Ok(())
      }

      _ => unreachable!("report_rule on a non-rule statement"),
    }
  }
}

fn external_value(sym: Symbol) -> Option<ExternalValue> {
  if sym.symbol_type() != SymbolType::Fun || sym.arity() != 0 || sym.sign() {
    return None;
  }
  match istr(&sym.name()) {
    "true" => Some(ExternalValue::True),
    "false" => Some(ExternalValue::False),
    "free" => Some(ExternalValue::Free),
    "release" => Some(ExternalValue::Release),
    _ => None,
  }
}
