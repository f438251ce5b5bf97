/*!

Binders: pull-based iterators producing the successive matches of one literal under the current surrounding
assignment. The protocol is `match_` (initialize for the current assignment) followed by `next` until it returns
false; each true `next` leaves the literal's variable cells holding the next assignment, valid until the following
`next` or the end of the enclosing scope. Side effects go through shared variable cells only, so re-matching
overwrites them and nothing needs unwinding.

Each binder kind is an explicit state machine, not a generator, because bindings must be reversible and
side-effecting on shared cells:

 - `RangeBinder`/`RangeMatcher` enumerate or test integer intervals;
 - `RelationMatcher` tests a comparison, `AssignBinder` binds the left-hand side of an equality;
 - `ScriptBinder` calls out to the external context and iterates the returned symbols;
 - `LookupMatcher` does the single-probe cases of predicate literals (fully bound positive, all negative signs);
 - `FullBinder`/`BindBinder` iterate a domain's secondary indices, filtered by the NEW/OLD/ALL window;
 - `BindOnce` yields exactly once per pump and is what drives complete statements.

*/

use std::cell::Cell;
use std::rc::Rc;

use crate::{
  abstractions::IString,
  api::{
    context::ExternalContext,
    location::Location,
    program::{Naf, Rel},
    symbol::{Symbol, SymbolType, SymbolVec},
    term::{Term, VarCell},
  },
  core::{
    domain::{AtomFlag, Domains},
    logger::{GroundError, Logger, Warnings},
    AtomUid,
    BinderType,
    DomId,
    INVALID_UID,
  },
};

/// Borrowed pieces of the ground context a binder may touch during matching.
pub struct MatchCtx<'a> {
  pub doms: &'a mut Domains,
  pub ext : &'a dyn ExternalContext,
  pub log : &'a mut Logger,
}

/// The uid slot shared between a predicate literal and its binders; `to_output` reads the last match from it.
pub type ResultCell = Rc<Cell<AtomUid>>;

pub trait Binder {
  /// Refreshes this binder's index before re-matching. Returns whether anything new was imported.
  fn update(&mut self, _doms: &mut Domains) -> bool {
    false
  }

  /// Initializes iteration for the current assignment.
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError>;

  /// Advances to the next match, writing variable bindings through the literal's cells.
  fn next(&mut self, ctx: &mut MatchCtx) -> Result<bool, GroundError>;
}

pub type BxBinder = Box<dyn Binder>;

// {{{1 RangeBinder

/// Assigns `X = L..R` successively for unbound `X`.
pub struct RangeBinder {
  pub assign : Term,
  pub left   : Term,
  pub right  : Term,
  pub loc    : Location,
  current: i32,
  end    : i32,
}

impl RangeBinder {
  pub fn new(assign: Term, left: Term, right: Term, loc: Location) -> RangeBinder {
    RangeBinder { assign, left, right, loc, current: 1, end: 0 }
  }
}

/// Evaluates one side of an interval to an integer; warns once per evaluation on type errors. `L > R` intervals are
/// simply empty, with no warning.
fn eval_interval_end(term: &Term, loc: &Location, other: &Term, log: &mut Logger) -> Result<Option<i32>, GroundError> {
  match term.eval() {
    Some(sym) if sym.symbol_type() == SymbolType::Num => Ok(Some(sym.num())),
    _ => {
      log.report(Warnings::OperationUndefined, || {
        format!("{}: info: interval undefined:\n  {}..{}", loc, term, other)
      })?;
      Ok(None)
    }
  }
}

impl Binder for RangeBinder {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.current = 1;
    self.end = 0;
    let Some(l) = eval_interval_end(&self.left, &self.loc, &self.right, ctx.log)? else {
      return Ok(());
    };
    let Some(r) = eval_interval_end(&self.right, &self.loc, &self.left, ctx.log)? else {
      return Ok(());
    };
    self.current = l;
    self.end = r;
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    // Note: if assign does not match it is not a variable and will not match at all.
    while self.current <= self.end {
      let value = Symbol::create_num(self.current);
      self.current += 1;
      if self.assign.match_(value) {
        return Ok(true);
      }
    }
    Ok(false)
  }
}

// {{{1 RangeMatcher

/// Tests `X = L..R` for bound `X`.
pub struct RangeMatcher {
  pub assign: Term,
  pub left  : Term,
  pub right : Term,
  pub loc   : Location,
  first_match: bool,
}

impl RangeMatcher {
  pub fn new(assign: Term, left: Term, right: Term, loc: Location) -> RangeMatcher {
    RangeMatcher { assign, left, right, loc, first_match: false }
  }
}

impl Binder for RangeMatcher {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.first_match = false;
    let Some(l) = eval_interval_end(&self.left, &self.loc, &self.right, ctx.log)? else {
      return Ok(());
    };
    let Some(r) = eval_interval_end(&self.right, &self.loc, &self.left, ctx.log)? else {
      return Ok(());
    };
    let a = self.assign.eval();
    self.first_match = matches!(a, Some(sym) if sym.symbol_type() == SymbolType::Num && l <= sym.num() && sym.num() <= r);
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    Ok(std::mem::take(&mut self.first_match))
  }
}

// {{{1 RelationMatcher

/// Tests a comparison between two evaluated terms.
pub struct RelationMatcher {
  pub rel: Rel,
  pub lhs: Term,
  pub rhs: Term,
  pub loc: Location,
  first_match: bool,
}

impl RelationMatcher {
  pub fn new(rel: Rel, lhs: Term, rhs: Term, loc: Location) -> RelationMatcher {
    RelationMatcher { rel, lhs, rhs, loc, first_match: false }
  }
}

/// Evaluates a term, reporting an `operation undefined` warning when the evaluation has no value.
fn eval_checked(term: &Term, loc: &Location, log: &mut Logger) -> Result<Option<Symbol>, GroundError> {
  match term.eval() {
    Some(sym) => Ok(Some(sym)),
    None => {
      log.report(Warnings::OperationUndefined, || {
        format!("{}: info: operation undefined:\n  {}", loc, term)
      })?;
      Ok(None)
    }
  }
}

impl Binder for RelationMatcher {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.first_match = false;
    let Some(l) = eval_checked(&self.lhs, &self.loc, ctx.log)? else {
      return Ok(());
    };
    let Some(r) = eval_checked(&self.rhs, &self.loc, ctx.log)? else {
      return Ok(());
    };
    self.first_match = self.rel.compare(l.cmp(&r));
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    Ok(std::mem::take(&mut self.first_match))
  }
}

// {{{1 AssignBinder

/// Binds the left-hand side of `lhs = rhs` to the evaluation of the right-hand side; yields at most once.
pub struct AssignBinder {
  pub lhs: Term,
  pub rhs: Term,
  pub loc: Location,
  first_match: bool,
}

impl AssignBinder {
  pub fn new(lhs: Term, rhs: Term, loc: Location) -> AssignBinder {
    AssignBinder { lhs, rhs, loc, first_match: false }
  }
}

impl Binder for AssignBinder {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.first_match = false;
    if let Some(value) = eval_checked(&self.rhs, &self.loc, ctx.log)? {
      self.first_match = self.lhs.match_(value);
    }
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    Ok(std::mem::take(&mut self.first_match))
  }
}

// {{{1 ScriptBinder

/// Evaluates the arguments, calls the external callable, and iterates the returned symbols against the assign
/// template. A failing callable warns and yields nothing.
pub struct ScriptBinder {
  pub assign: Term,
  pub name  : IString,
  pub args  : Vec<Term>,
  pub loc   : Location,
  matches: SymbolVec,
  pos    : usize,
}

impl ScriptBinder {
  pub fn new(assign: Term, name: IString, args: Vec<Term>, loc: Location) -> ScriptBinder {
    ScriptBinder { assign, name, args, loc, matches: SymbolVec::new(), pos: 0 }
  }
}

impl Binder for ScriptBinder {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.matches.clear();
    self.pos = 0;
    let mut values = SymbolVec::with_capacity(self.args.len());
    for arg in &self.args {
      match eval_checked(arg, &self.loc, ctx.log)? {
        Some(value) => values.push(value),
        None => return Ok(()),
      }
    }
    match ctx.ext.call(&*ctx.doms, &self.loc, &self.name, &values) {
      Ok(symbols) => self.matches = symbols,
      Err(e) => {
        ctx.log.report(Warnings::OperationUndefined, || {
          format!("{}: info: operation undefined:\n  @{} failed: {}", self.loc, self.name, e)
        })?;
      }
    }
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    while self.pos < self.matches.len() {
      let value = self.matches[self.pos];
      self.pos += 1;
      if self.assign.match_(value) {
        return Ok(true);
      }
    }
    Ok(false)
  }
}

// {{{1 LookupMatcher

/// The single-probe predicate cases: a fully bound positive literal, and all negative signs. Negative literals
/// never bind; safety guarantees their variables are bound when the matcher runs.
pub struct LookupMatcher {
  pub dom      : DomId,
  pub repr     : Term,
  pub naf      : Naf,
  pub recursive: bool,
  pub binder_type: BinderType,
  pub result   : ResultCell,
  pub loc      : Location,
  first_match: bool,
}

impl LookupMatcher {
  pub fn new(
    dom: DomId,
    repr: Term,
    naf: Naf,
    recursive: bool,
    binder_type: BinderType,
    result: ResultCell,
    loc: Location,
  ) -> LookupMatcher {
    LookupMatcher {
      dom,
      repr,
      naf,
      recursive,
      binder_type,
      result,
      loc,
      first_match: false,
    }
  }
}

impl Binder for LookupMatcher {
  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.first_match = false;
    self.result.set(INVALID_UID);
    let Some(value) = eval_checked(&self.repr, &self.loc, ctx.log)? else {
      return Ok(());
    };
    match self.naf {
      Naf::Pos => {
        let dom = ctx.doms.get(self.dom);
        if let Some(uid) = dom.lookup(value, self.binder_type) {
          self.result.set(uid);
          self.first_match = true;
        }
      }

      Naf::Not => {
        let dom = ctx.doms.get_mut(self.dom);
        match dom.find(value) {
          Some(uid) if dom.atom(uid).fact() => {
            // Definitely true: `not` can never hold.
          }
          Some(uid) if dom.atom(uid).defined() => {
            self.result.set(uid);
            self.first_match = true;
          }
          _ if self.recursive => {
            // The atom may still be derived in this component: reserve it and leave the decision downstream.
            let (uid, _) = dom.reserve(value);
            if !dom.atom(uid).defined() {
              dom.atom_mut(uid).flags.insert(AtomFlag::Delayed);
            }
            self.result.set(uid);
            self.first_match = true;
          }
          _ => {
            // Undefined and stratified: the literal is simply true, with no atom to reference.
            self.first_match = true;
          }
        }
      }

      Naf::NotNot => {
        let dom = ctx.doms.get_mut(self.dom);
        match dom.find(value) {
          Some(uid) if dom.atom(uid).defined() => {
            self.result.set(uid);
            self.first_match = true;
          }
          _ if self.recursive => {
            let (uid, _) = dom.reserve(value);
            if !dom.atom(uid).defined() {
              dom.atom_mut(uid).flags.insert(AtomFlag::Delayed);
            }
            self.result.set(uid);
            self.first_match = true;
          }
          _ => {
            // Undefined and stratified: `not not` can never hold.
          }
        }
      }
    }
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    Ok(std::mem::take(&mut self.first_match))
  }
}

// {{{1 FullBinder

/// Iterates a full index: every defined atom of the domain matching the literal template, filtered by the binder's
/// window type.
pub struct FullBinder {
  pub dom  : DomId,
  pub index: usize,
  pub repr : Term,
  pub binder_type: BinderType,
  pub result: ResultCell,
  pos: usize,
  end: usize,
}

impl FullBinder {
  pub fn new(dom: DomId, index: usize, repr: Term, binder_type: BinderType, result: ResultCell) -> FullBinder {
    FullBinder { dom, index, repr, binder_type, result, pos: 0, end: 0 }
  }
}

impl Binder for FullBinder {
  fn update(&mut self, doms: &mut Domains) -> bool {
    doms.get_mut(self.dom).update_full_index(self.index)
  }

  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.pos = 0;
    self.end = ctx.doms.get(self.dom).full_index(self.index).matched.len();
    Ok(())
  }

  fn next(&mut self, ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    let dom = ctx.doms.get(self.dom);
    let index = dom.full_index(self.index);
    while self.pos < self.end {
      let (did, uid) = index.matched[self.pos];
      self.pos += 1;
      if dom.did_visible(self.binder_type, did) && self.repr.match_(dom.atom(uid).sym) {
        self.result.set(uid);
        return Ok(true);
      }
    }
    Ok(false)
  }
}

// {{{1 BindBinder

/// Iterates a bind index: the matching atoms whose bound positions equal the current values of the literal's bound
/// variables.
pub struct BindBinder {
  pub dom  : DomId,
  pub index: usize,
  pub repr : Term,
  /// The literal's bound variable cells, evaluated at match time to form the probe key.
  pub bound_cells: Vec<VarCell>,
  pub binder_type: BinderType,
  pub result: ResultCell,
  key: SymbolVec,
  pos: usize,
  end: usize,
}

impl BindBinder {
  pub fn new(
    dom: DomId,
    index: usize,
    repr: Term,
    bound_cells: Vec<VarCell>,
    binder_type: BinderType,
    result: ResultCell,
  ) -> BindBinder {
    BindBinder {
      dom,
      index,
      repr,
      bound_cells,
      binder_type,
      result,
      key: SymbolVec::new(),
      pos: 0,
      end: 0,
    }
  }
}

impl Binder for BindBinder {
  fn update(&mut self, doms: &mut Domains) -> bool {
    doms.get_mut(self.dom).update_bind_index(self.index)
  }

  fn match_(&mut self, ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.key.clear();
    for cell in &self.bound_cells {
      match *cell.borrow() {
        Some(value) => self.key.push(value),
        // A bound cell without a value means the surrounding plan is broken; treat as no match.
        None => {
          self.pos = 0;
          self.end = 0;
          return Ok(());
        }
      }
    }
    self.pos = 0;
    self.end = ctx
        .doms
        .get(self.dom)
        .bind_index(self.index)
        .map
        .get(&self.key)
        .map_or(0, |entries| entries.len());
    Ok(())
  }

  fn next(&mut self, ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    let dom = ctx.doms.get(self.dom);
    let index = dom.bind_index(self.index);
    let Some(entries) = index.map.get(&self.key) else {
      return Ok(false);
    };
    while self.pos < self.end {
      let (did, uid) = entries[self.pos];
      self.pos += 1;
      if dom.did_visible(self.binder_type, did) && self.repr.match_(dom.atom(uid).sym) {
        self.result.set(uid);
        return Ok(true);
      }
    }
    Ok(false)
  }
}

// {{{1 BindOnce

/// Yields exactly once per pump. Complete statements hang off one of these so that enqueueing them reruns their
/// report exactly once.
#[derive(Default)]
pub struct BindOnce {
  once: bool,
}

impl Binder for BindOnce {
  fn update(&mut self, _doms: &mut Domains) -> bool {
    true
  }

  fn match_(&mut self, _ctx: &mut MatchCtx) -> Result<(), GroundError> {
    self.once = true;
    Ok(())
  }

  fn next(&mut self, _ctx: &mut MatchCtx) -> Result<bool, GroundError> {
    Ok(std::mem::take(&mut self.once))
  }
}

// }}}1


#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::context::NullContext;
  use crate::api::term::VarSet;

  fn ctx_parts() -> (Domains, NullContext, Logger) {
    (Domains::new(), NullContext, Logger::new(100))
  }

  fn num(n: i32) -> Symbol {
    Symbol::create_num(n)
  }

  #[test]
  fn range_binder_enumerates() {
    let (mut doms, ext, mut log) = ctx_parts();
    let assign = Term::var("X");
    assign.bind(&mut VarSet::default());
    let mut binder = RangeBinder::new(
      assign.clone(),
      Term::Val(num(1)),
      Term::Val(num(3)),
      Location::default(),
    );
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    let mut seen = Vec::new();
    while binder.next(&mut ctx).unwrap() {
      seen.push(assign.eval().unwrap());
    }
    assert_eq!(seen, vec![num(1), num(2), num(3)]);
  }

  #[test]
  fn empty_range_yields_nothing_without_warning() {
    let (mut doms, ext, mut log) = ctx_parts();
    let assign = Term::var("X");
    assign.bind(&mut VarSet::default());
    let mut binder = RangeBinder::new(
      assign,
      Term::Val(num(3)),
      Term::Val(num(1)),
      Location::default(),
    );
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    assert!(!binder.next(&mut ctx).unwrap());
  }

  #[test]
  fn non_integer_range_warns_once() {
    let (mut doms, ext, mut log) = ctx_parts();
    let assign = Term::var("X");
    assign.bind(&mut VarSet::default());
    let mut binder = RangeBinder::new(
      assign,
      Term::Val(Symbol::create_str("a")),
      Term::Val(num(3)),
      Location::default(),
    );
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    assert!(!binder.next(&mut ctx).unwrap());
  }

  #[test]
  fn relation_matcher() {
    let (mut doms, ext, mut log) = ctx_parts();
    let mut binder = RelationMatcher::new(Rel::Lt, Term::Val(num(1)), Term::Val(num(2)), Location::default());
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    assert!(binder.next(&mut ctx).unwrap());
    assert!(!binder.next(&mut ctx).unwrap());

    let mut binder = RelationMatcher::new(Rel::Gt, Term::Val(num(1)), Term::Val(num(2)), Location::default());
    binder.match_(&mut ctx).unwrap();
    assert!(!binder.next(&mut ctx).unwrap());
  }

  #[test]
  fn negative_matcher_on_facts_and_unknowns() {
    let (mut doms, ext, mut log) = ctx_parts();
    let sig = crate::api::symbol::Sig::new("p", 1, false);
    let dom = doms.add_sig(sig);
    let p1 = Symbol::create_fun("p", vec![num(1)], false);
    doms.get_mut(dom).define(p1, true);

    let result = ResultCell::new(Cell::new(INVALID_UID));
    // `not p(1)` over a fact: no match.
    let mut binder = LookupMatcher::new(
      dom,
      Term::fun("p", vec![Term::Val(num(1))]),
      Naf::Not,
      false,
      BinderType::All,
      result.clone(),
      Location::default(),
    );
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    assert!(!binder.next(&mut ctx).unwrap());

    // `not p(2)` over an absent, stratified atom: matches as a true literal with no atom reference.
    let mut binder = LookupMatcher::new(
      dom,
      Term::fun("p", vec![Term::Val(num(2))]),
      Naf::Not,
      false,
      BinderType::All,
      result.clone(),
      Location::default(),
    );
    binder.match_(&mut ctx).unwrap();
    assert!(binder.next(&mut ctx).unwrap());
    assert_eq!(result.get(), INVALID_UID);

    // Recursive `not p(3)`: reserves the atom and references it.
    let mut binder = LookupMatcher::new(
      dom,
      Term::fun("p", vec![Term::Val(num(3))]),
      Naf::Not,
      true,
      BinderType::All,
      result.clone(),
      Location::default(),
    );
    binder.match_(&mut ctx).unwrap();
    assert!(binder.next(&mut ctx).unwrap());
    let uid = result.get();
    assert_ne!(uid, INVALID_UID);
    assert!(ctx.doms.get(dom).atom(uid).flags.contains(AtomFlag::Delayed));
  }

  #[test]
  fn full_binder_respects_window() {
    let (mut doms, ext, mut log) = ctx_parts();
    let sig = crate::api::symbol::Sig::new("p", 1, false);
    let dom_id = doms.add_sig(sig);

    let mut template = Term::fun("p", vec![Term::var("X")]);
    let mut cells = crate::abstractions::HashMap::default();
    template.share_vars(&mut cells);
    template.bind(&mut VarSet::default());
    let index = doms.get_mut(dom_id).add_full_index(template.rename_vars(&mut Default::default()));

    let p = |n| Symbol::create_fun("p", vec![num(n)], false);
    doms.get_mut(dom_id).define(p(1), true);
    doms.get_mut(dom_id).open_window();
    doms.get_mut(dom_id).define(p(2), true);

    let result = ResultCell::new(Cell::new(INVALID_UID));
    let mut binder = FullBinder::new(dom_id, index, template, BinderType::New, result.clone());
    assert!(binder.update(&mut doms));
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    binder.match_(&mut ctx).unwrap();
    // Only p(1) is inside the NEW window; p(2) waits for a slide.
    let mut seen = Vec::new();
    while binder.next(&mut ctx).unwrap() {
      seen.push(ctx.doms.get(dom_id).atom(result.get()).sym);
    }
    assert_eq!(seen, vec![p(1)]);

    ctx.doms.get_mut(dom_id).slide_window();
    binder.match_(&mut ctx).unwrap();
    let mut seen = Vec::new();
    while binder.next(&mut ctx).unwrap() {
      seen.push(ctx.doms.get(dom_id).atom(result.get()).sym);
    }
    assert_eq!(seen, vec![p(2)]);
  }
}
