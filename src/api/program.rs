/*!

The non-ground intermediate representation consumed from the front end. A `Program` is a list of statements, rules
and directives, whose terms are the AST of [`crate::api::term`]. The front-end parser and rewriter produce this
representation; the grounder lowers it into a statement graph (one grounding statement per source rule plus
synthesized complete/accumulate statements for aggregates, conjunctions, and theory atoms) and grounds it
component by component.

Variable names are rule-scoped: the statement builder unifies all occurrences of a name within one statement to a
single shared binding cell, so the IR itself can be built with free-standing `Term::var` nodes.

*/

use std::fmt::{Display, Formatter};

use crate::{
  abstractions::IString,
  api::{
    location::Location,
    term::{Term, TermVec},
  },
};

/// Negation-as-failure sign of a body literal.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Naf {
  Pos,
  Not,
  NotNot,
}

impl Display for Naf {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Naf::Pos => Ok(()),
      Naf::Not => write!(f, "not "),
      Naf::NotNot => write!(f, "not not "),
    }
  }
}

/// Comparison relations between terms.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Rel {
  Eq,
  Neq,
  Lt,
  Leq,
  Gt,
  Geq,
}

impl Rel {
  /// Applies the relation under the total order on symbols.
  pub fn compare(self, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match self {
      Rel::Eq => ord == Equal,
      Rel::Neq => ord != Equal,
      Rel::Lt => ord == Less,
      Rel::Leq => ord != Greater,
      Rel::Gt => ord == Greater,
      Rel::Geq => ord != Less,
    }
  }
}

impl Display for Rel {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Rel::Eq => "=",
      Rel::Neq => "!=",
      Rel::Lt => "<",
      Rel::Leq => "<=",
      Rel::Gt => ">",
      Rel::Geq => ">=",
    };
    write!(f, "{}", s)
  }
}

/// The aggregate functions.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum AggregateFunction {
  Count,
  Sum,
  SumPlus,
  Min,
  Max,
}

impl Display for AggregateFunction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      AggregateFunction::Count => "#count",
      AggregateFunction::Sum => "#sum",
      AggregateFunction::SumPlus => "#sum+",
      AggregateFunction::Min => "#min",
      AggregateFunction::Max => "#max",
    };
    write!(f, "{}", s)
  }
}

/// A guard on an aggregate, e.g. the `2` in `2 #count{…}` is `Geq 2` after the front end normalizes bound sides.
#[derive(Clone)]
pub struct AggregateBound {
  pub rel : Rel,
  pub term: Term,
}

/// One element `t₁,…,tₙ : l₁,…,lₘ` of a body aggregate.
#[derive(Clone)]
pub struct AggregateElement {
  pub tuple: TermVec,
  pub cond : Vec<BodyLiteral>,
}

/// One element `t₁,…,tₙ : a : l₁,…,lₘ` of a head aggregate: the witness atom plus its condition.
#[derive(Clone)]
pub struct HeadAggregateElement {
  pub tuple: TermVec,
  pub atom : Term,
  pub cond : Vec<BodyLiteral>,
}

/// A conditional head element `a : l₁,…,lₘ` of a choice or disjunction.
#[derive(Clone)]
pub struct CondHead {
  pub atom: Term,
  pub cond: Vec<BodyLiteral>,
}

/// One element of a theory atom.
#[derive(Clone)]
pub struct TheoryElement {
  pub tuple: TermVec,
  pub cond : Vec<BodyLiteral>,
}

/// A theory atom `&name(args) { elements } op guard`.
#[derive(Clone)]
pub struct TheoryAtom {
  pub atom    : Term,
  pub elements: Vec<TheoryElement>,
  pub guard   : Option<(IString, Term)>,
}

/// Body literals of the non-ground IR.
#[derive(Clone)]
pub enum BodyLiteral {
  /// A (possibly negated) predicate literal.
  Pred {
    naf : Naf,
    atom: Term,
    loc : Location,
  },
  /// A comparison between two terms.
  Relation {
    rel: Rel,
    lhs: Term,
    rhs: Term,
    loc: Location,
  },
  /// `assign = lhs..rhs`, assigning each integer of the interval in turn.
  Range {
    assign: Term,
    lhs   : Term,
    rhs   : Term,
    loc   : Location,
  },
  /// `assign = @name(args)`, iterating the symbols returned by the external callable.
  Script {
    assign: Term,
    name  : IString,
    args  : TermVec,
    loc   : Location,
  },
  /// A body aggregate.
  Aggregate {
    naf     : Naf,
    fun     : AggregateFunction,
    bounds  : Vec<AggregateBound>,
    elements: Vec<AggregateElement>,
    loc     : Location,
  },
  /// A conditional literal `head : cond`, grounded through the conjunction machinery.
  Conditional {
    naf : Naf,
    atom: Term,
    cond: Vec<BodyLiteral>,
    loc : Location,
  },
  /// A theory atom occurring in a body.
  Theory {
    naf  : Naf,
    atom : TheoryAtom,
    loc  : Location,
  },
}

impl BodyLiteral {
  pub fn loc(&self) -> &Location {
    match self {
      BodyLiteral::Pred { loc, .. }
      | BodyLiteral::Relation { loc, .. }
      | BodyLiteral::Range { loc, .. }
      | BodyLiteral::Script { loc, .. }
      | BodyLiteral::Aggregate { loc, .. }
      | BodyLiteral::Conditional { loc, .. }
      | BodyLiteral::Theory { loc, .. } => loc,
    }
  }
}

/// Rule heads.
#[derive(Clone)]
pub enum Head {
  /// A single atom.
  Simple(Term),
  /// `{ a₁ : c₁ ; … }`.
  Choice(Vec<CondHead>),
  /// `a₁ : c₁ ; … ; aₙ : cₙ`; at least one must hold.
  Disjunction(Vec<CondHead>),
  /// A head aggregate with witness atoms, e.g. `1 { p(X) : q(X) } 1`.
  Aggregate {
    fun     : AggregateFunction,
    bounds  : Vec<AggregateBound>,
    elements: Vec<HeadAggregateElement>,
  },
  /// A theory atom in head position.
  Theory(TheoryAtom),
  /// An integrity constraint.
  False,
}

/// Top-level statements of the IR.
#[derive(Clone)]
pub enum Stm {
  Rule {
    head: Head,
    body: Vec<BodyLiteral>,
    loc : Location,
  },
  /// `#external a : body. [value]` where value evaluates to `true`, `false`, `free`, or `release`.
  External {
    atom : Term,
    body : Vec<BodyLiteral>,
    value: Term,
    loc  : Location,
  },
  /// `#show t : body.`
  Show {
    term: Term,
    body: Vec<BodyLiteral>,
    loc : Location,
  },
  /// `#project a : body.`
  Project {
    atom: Term,
    body: Vec<BodyLiteral>,
    loc : Location,
  },
  /// `#heuristic a : body. [value@priority, modifier]`
  Heuristic {
    atom    : Term,
    body    : Vec<BodyLiteral>,
    value   : Term,
    priority: Term,
    modifier: Term,
    loc     : Location,
  },
  /// `#edge (u, v) : body.`
  Edge {
    u   : Term,
    v   : Term,
    body: Vec<BodyLiteral>,
    loc : Location,
  },
  /// `:~ body. [weight@priority, t₁,…,tₙ]`
  Minimize {
    weight  : Term,
    priority: Term,
    tuple   : TermVec,
    body    : Vec<BodyLiteral>,
    loc     : Location,
  },
}

/// A non-ground program: the unit of one grounding step.
#[derive(Clone, Default)]
pub struct Program {
  pub statements: Vec<Stm>,
}

impl Program {
  pub fn new() -> Program {
    Program::default()
  }

  pub fn push(&mut self, statement: Stm) {
    self.statements.push(statement);
  }
}
