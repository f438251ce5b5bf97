/*!

Statements: the per-construct accumulation state machines. One statement exists per source rule, plus synthesized
accumulate/complete statements per aggregate, conjunction, disjunction, and theory atom. All statements share the
same skeleton (a literal body that gets linearized into instantiators, a set of head domains, and propagation
links) and differ in what `report` does with a complete assignment: emit ground output, define head atoms, or grow
the interim state of a synthesized atom.

Mutable grounding state lives in the domain arena (atom tables, payload states, todo queues), never in the
statement, so `report` takes the statement by shared reference and every cross-statement effect flows through the
domains.

*/

pub mod body_aggregate;
pub mod conjunction;
pub mod directive;
pub mod disjunction;
pub mod head_aggregate;
pub mod rule;
pub mod theory;

use std::cell::Cell;

use crate::{
  abstractions::IString,
  api::{
    location::Location,
    program::{AggregateFunction, Rel},
    term::{Term, VarSet},
  },
  core::{
    binder::MatchCtx,
    dep::StmtDeps,
    literal::Literal,
    logger::GroundError,
    safety,
    DomId,
    InstId,
    StmId,
  },
  output::{translate::OutputSink, LiteralId},
};

/// A head definition: the head template and the domain its instances land in.
#[derive(Clone)]
pub struct HeadDef {
  pub repr: Term,
  pub dom : DomId,
}

pub enum StatementKind {
  /// Normal, choice, and plain disjunctive rules; an empty head list is an integrity constraint.
  Rule {
    choice: bool,
    heads : Vec<HeadDef>,
  },
  /// `#external` declarations.
  External {
    heads: Vec<HeadDef>,
    value: Term,
  },
  Show {
    term: Term,
  },
  Project {
    atom: Term,
  },
  Heuristic {
    atom    : Term,
    value   : Term,
    priority: Term,
    modifier: Term,
  },
  Edge {
    u: Term,
    v: Term,
  },
  Minimize {
    weight  : Term,
    priority: Term,
    tuple   : Vec<Term>,
  },

  /// One per body-aggregate element: grounds the element condition and accumulates into the aggregate atom.
  BodyAggrAccumulate {
    dom     : DomId,
    repr    : Term,
    fun     : AggregateFunction,
    bounds  : Vec<(Rel, Term)>,
    monotone: bool,
    tuple   : Vec<Term>,
  },
  /// Finalizes ready aggregate atoms when their feeding domains saturate.
  BodyAggrComplete {
    dom: DomId,
    output_recursive: Cell<bool>,
  },

  /// Grounds the global context of a conjunction; guarantees the conjunction atom exists even with no condition
  /// instances.
  ConjAccumulateEmpty {
    dom       : DomId,
    repr      : Term,
    empty_dom : DomId,
    empty_repr: Term,
  },
  /// Grounds one condition instance.
  ConjAccumulateCond {
    dom      : DomId,
    repr     : Term,
    cond_dom : DomId,
    cond_repr: Term,
    local    : Term,
  },
  /// Grounds one head derivation for a condition instance.
  ConjAccumulateHead {
    dom  : DomId,
    repr : Term,
    local: Term,
  },
  ConjComplete {
    dom: DomId,
    cond_recursive: Cell<bool>,
    head_recursive: Cell<bool>,
  },

  /// The enclosing rule of a conditional disjunctive head: records one body per assignment.
  DisjRule {
    dom : DomId,
    repr: Term,
  },
  /// Grounds one disjunctive element's condition and head candidate.
  DisjAccumulate {
    dom : DomId,
    repr: Term,
    head: Option<HeadDef>,
  },
  DisjComplete {
    dom: DomId,
  },

  /// The enclosing rule of a head aggregate: records one body per assignment.
  HeadAggrRule {
    dom   : DomId,
    repr  : Term,
    fun   : AggregateFunction,
    bounds: Vec<(Rel, Term)>,
  },
  /// Grounds one head-aggregate element: tuple, witness atom, condition.
  HeadAggrAccumulate {
    dom  : DomId,
    repr : Term,
    fun  : AggregateFunction,
    tuple: Vec<Term>,
    atom : Option<HeadDef>,
  },
  HeadAggrComplete {
    dom: DomId,
  },

  /// Grounds a theory atom's name and guard; defines the instance marker the element statements hang off.
  TheoryAtomAccumulate {
    dom      : DomId,
    repr     : Term,
    inst_dom : DomId,
    inst_repr: Term,
    atom     : Term,
    guard    : Option<(IString, Term)>,
  },
  /// Grounds one theory element.
  TheoryElemAccumulate {
    dom  : DomId,
    repr : Term,
    tuple: Vec<Term>,
  },
  TheoryComplete {
    dom: DomId,
  },
}

pub struct Statement {
  pub lits: Vec<Literal>,
  pub loc : Location,
  pub kind: StatementKind,

  /// Domains this statement defines into; enqueued on propagate.
  pub head_doms: Vec<DomId>,
  /// For accumulate statements: the complete statement whose instantiator must re-run after a pump.
  pub complete: Option<StmId>,
  /// This statement's instantiators for the component currently being grounded.
  pub insts: Vec<InstId>,
  pub active: bool,
}

impl Statement {
  pub fn new(kind: StatementKind, lits: Vec<Literal>, loc: Location) -> Statement {
    let head_doms = match &kind {
      StatementKind::Rule { heads, .. } | StatementKind::External { heads, .. } => {
        heads.iter().map(|h| h.dom).collect()
      }
      StatementKind::BodyAggrAccumulate { dom, .. }
      | StatementKind::BodyAggrComplete { dom, .. }
      | StatementKind::ConjAccumulateHead { dom, .. }
      | StatementKind::ConjComplete { dom, .. }
      | StatementKind::DisjRule { dom, .. }
      | StatementKind::DisjAccumulate { dom, .. }
      | StatementKind::HeadAggrRule { dom, .. }
      | StatementKind::TheoryElemAccumulate { dom, .. }
      | StatementKind::TheoryComplete { dom, .. } => vec![*dom],
      StatementKind::ConjAccumulateEmpty { dom, empty_dom, .. } => vec![*dom, *empty_dom],
      StatementKind::ConjAccumulateCond { dom, cond_dom, .. } => vec![*dom, *cond_dom],
      StatementKind::TheoryAtomAccumulate { dom, inst_dom, .. } => vec![*dom, *inst_dom],
      StatementKind::DisjComplete { dom } => vec![*dom],
      StatementKind::HeadAggrAccumulate { dom, atom, .. } => {
        let mut doms = vec![*dom];
        if let Some(head) = atom {
          doms.push(head.dom);
        }
        doms
      }
      StatementKind::HeadAggrComplete { dom } => vec![*dom],
      _ => Vec::new(),
    };
    Statement {
      lits,
      loc,
      kind,
      head_doms,
      complete: None,
      insts: Vec::new(),
      active: false,
    }
  }

  /// The statement's footprint for dependency analysis.
  pub fn deps(&self) -> StmtDeps {
    let mut deps = StmtDeps {
      heads: self.head_doms.clone(),
      body : Vec::new(),
    };
    // Some synthesized domains are read implicitly rather than through a literal.
    match &self.kind {
      StatementKind::BodyAggrComplete { dom, .. }
      | StatementKind::ConjComplete { dom, .. }
      | StatementKind::DisjComplete { dom }
      | StatementKind::HeadAggrComplete { dom }
      | StatementKind::TheoryComplete { dom } => {
        deps.body.push((*dom, crate::api::program::Naf::Pos));
      }
      _ => {}
    }
    for lit in &self.lits {
      if let Some(occ) = lit.occurrence() {
        deps.body.push(occ);
      }
    }
    deps
  }

  /// Resets per-component state before linearization. Inactive statements produce no output this component.
  pub fn start_linearize(&mut self, active: bool) {
    self.active = active;
    self.insts.clear();
  }

  /// Linearizes the body into plans (§ safety); the caller owns the instantiator arena.
  pub fn linearize(
    &self,
    doms: &mut crate::core::domain::Domains,
    owner: StmId,
  ) -> Result<Vec<safety::Plan>, GroundError> {
    safety::linearize(doms, owner, &self.lits, &VarSet::default(), &self.loc)
  }

  /// Called by the instantiator for every complete assignment.
  pub fn report(&self, ctx: &mut MatchCtx, out: &mut dyn OutputSink) -> Result<(), GroundError> {
    match &self.kind {
      StatementKind::Rule { .. } | StatementKind::External { .. } => self.report_rule(ctx, out),

      StatementKind::Show { .. }
      | StatementKind::Project { .. }
      | StatementKind::Heuristic { .. }
      | StatementKind::Edge { .. }
      | StatementKind::Minimize { .. } => self.report_directive(ctx, out),

      StatementKind::BodyAggrAccumulate { .. } | StatementKind::BodyAggrComplete { .. } => {
        self.report_body_aggregate(ctx, out)
      }

      StatementKind::ConjAccumulateEmpty { .. }
      | StatementKind::ConjAccumulateCond { .. }
      | StatementKind::ConjAccumulateHead { .. }
      | StatementKind::ConjComplete { .. } => self.report_conjunction(ctx, out),

      StatementKind::DisjRule { .. } | StatementKind::DisjAccumulate { .. } | StatementKind::DisjComplete { .. } => {
        self.report_disjunction(ctx, out)
      }

      StatementKind::HeadAggrRule { .. }
      | StatementKind::HeadAggrAccumulate { .. }
      | StatementKind::HeadAggrComplete { .. } => self.report_head_aggregate(ctx, out),

      StatementKind::TheoryAtomAccumulate { .. }
      | StatementKind::TheoryElemAccumulate { .. }
      | StatementKind::TheoryComplete { .. } => self.report_theory(ctx, out),
    }
  }
}

/// Renders the non-auxiliary body literals for output: the surviving literal references and whether the whole body
/// is fact. Fact literals are kept only when the sink asks for them.
pub(crate) fn body_to_output(
  lits: &[Literal],
  ctx: &MatchCtx,
  keep_facts: bool,
) -> (Vec<LiteralId>, bool) {
  let mut body = Vec::new();
  let mut fact = true;
  for lit in lits {
    if lit.auxiliary() {
      continue;
    }
    let (id, is_fact) = lit.to_output(&*ctx.doms);
    if let Some(id) = id {
      if keep_facts || !is_fact {
        body.push(id);
      }
    }
    if !is_fact {
      fact = false;
    }
  }
  (body, fact)
}

/// The condition literals of an accumulate statement's assignment: like `body_to_output` with facts always dropped.
pub(crate) fn cond_to_output(lits: &[Literal], ctx: &MatchCtx) -> Vec<LiteralId> {
  body_to_output(lits, ctx, false).0
}
