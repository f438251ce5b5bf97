/*!

Lowering from the internal ground representation to the backend wire format. The translator owns the backend atom
numbering (0 is "always false", 1 is claimed for "true" on first use), assigns ids lazily as atoms are referenced,
and expands the structured atoms into plain and weight rules:

 - `#count`/`#sum`/`#sum+` atoms become weight rules (lower bounds directly, upper bounds through a negated
   violation rule), with negative weights normalized the usual way;
 - `#min`/`#max` atoms become witness/violation rules over their element conditions;
 - conjunction atoms become one auxiliary per condition instance (derivable from any head derivation or from the
   condition's negation), conjoined into the atom;
 - conditional disjunctive heads are shifted onto auxiliary atoms carrying their condition as extra body;
 - head aggregates become a choice over the witnesses plus bound-enforcing integrity constraints.

Minimize entries are batched per priority and flushed at step end together with the theory data, which walks the
theory domains and emits memoized term trees, elements, and atoms.

Everything here is deterministic: hash-ordered state is sorted by the symbol order before emission, and the cancel
flag is honored at every emit.

*/

use std::collections::BTreeMap;
use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  abstractions::{istr, HashMap, Set},
  api::{
    program::{AggregateFunction, Naf},
    symbol::{Symbol, SymbolType},
  },
  core::{
    atoms::{AggregateAtomState, HeadAggregateElement},
    bounds::Interval,
    domain::{DomainData, Domains},
    logger::{GroundError, Logger},
    AtomUid,
    DomId,
  },
  output::{
    backend::{Backend, BackendAtom, BackendLit, ExternalValue, HeuristicMod, TheoryTermData, WeightedLit},
    GroundRule,
    LiteralId,
  },
  trace,
};

/// A shifted disjunctive head candidate: the atom plus the ground condition under which it joins the disjunction.
pub struct DisjHead {
  pub dom : DomId,
  pub uid : AtomUid,
  pub cond: Vec<LiteralId>,
}

/// What statements see of the output layer during `report`.
pub trait OutputSink {
  fn keep_facts(&self) -> bool;
  fn rule(&mut self, doms: &mut Domains, rule: &GroundRule, log: &mut Logger) -> Result<(), GroundError>;
  fn external(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    value: ExternalValue,
    log: &mut Logger,
  ) -> Result<(), GroundError>;
  fn show(&mut self, doms: &mut Domains, sym: Symbol, cond: &[LiteralId], log: &mut Logger) -> Result<(), GroundError>;
  fn project(&mut self, doms: &mut Domains, dom: DomId, uid: AtomUid, log: &mut Logger) -> Result<(), GroundError>;
  #[allow(clippy::too_many_arguments)]
  fn heuristic(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    modifier: HeuristicMod,
    bias: i32,
    priority: u32,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError>;
  fn edge(
    &mut self,
    doms: &mut Domains,
    u: Symbol,
    v: Symbol,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError>;
  #[allow(clippy::too_many_arguments)]
  fn minimize_entry(
    &mut self,
    doms: &mut Domains,
    weight: i64,
    priority: i64,
    tuple: Symbol,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError>;
  fn disjunctive_rule(
    &mut self,
    doms: &mut Domains,
    heads: &[DisjHead],
    body: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError>;
  fn head_aggregate_rule(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    body: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError>;
}

pub struct Translator<B: Backend> {
  pub backend: B,
  keep_facts : bool,
  /// Tee every emitted statement through the log transport.
  debug      : bool,
  cancel     : Arc<AtomicBool>,

  next_atom  : BackendAtom,
  true_atom  : Option<BackendAtom>,
  notnot_aux : HashMap<BackendAtom, BackendAtom>,

  minimize      : BTreeMap<i64, Vec<WeightedLit>>,
  minimize_seen : Set<(i64, Symbol)>,

  theory_terms    : HashMap<Symbol, u32>,
  theory_name_ids : HashMap<String, u32>,
  next_theory_term: u32,
  next_theory_elem: u32,

  edge_nodes: HashMap<Symbol, i32>,
}

impl<B: Backend> Translator<B> {
  pub fn new(backend: B, keep_facts: bool, debug: bool, cancel: Arc<AtomicBool>) -> Translator<B> {
    Translator {
      backend,
      keep_facts,
      debug,
      cancel,
      next_atom: 2,
      true_atom: None,
      notnot_aux: HashMap::default(),
      minimize: BTreeMap::new(),
      minimize_seen: Set::default(),
      theory_terms: HashMap::default(),
      theory_name_ids: HashMap::default(),
      next_theory_term: 0,
      next_theory_elem: 0,
      edge_nodes: HashMap::default(),
    }
  }

  fn check_cancel(&self) -> Result<(), GroundError> {
    if self.cancel.load(Ordering::Relaxed) {
      return Err(GroundError::Interrupted);
    }
    Ok(())
  }

  fn fresh_atom(&mut self) -> BackendAtom {
    let atom = self.next_atom;
    self.next_atom += 1;
    atom
  }

  /// The backend id of a ground atom, assigned on first reference.
  fn atom_uid(&mut self, doms: &mut Domains, dom: DomId, uid: AtomUid) -> BackendAtom {
    let atom = doms.get_mut(dom).atom_mut(uid);
    if atom.backend_uid == 0 {
      atom.backend_uid = self.next_atom;
      self.next_atom += 1;
    }
    atom.backend_uid
  }

  /// The "always true" fact atom, emitted on first use.
  fn true_lit(&mut self) -> BackendLit {
    match self.true_atom {
      Some(atom) => atom as BackendLit,
      None => {
        self.true_atom = Some(1);
        self.emit_rule(false, &[1], &[]);
        1
      }
    }
  }

  fn emit_rule(&mut self, choice: bool, heads: &[BackendAtom], body: &[BackendLit]) {
    if self.debug {
      trace!("%% rule({},{:?},{:?})", choice, heads, body);
    }
    self.backend.rule(choice, heads, body);
  }

  fn emit_weight_rule(&mut self, choice: bool, heads: &[BackendAtom], lower: i64, body: &[WeightedLit]) {
    if self.debug {
      trace!("%% weight_rule({},{:?},{},{:?})", choice, heads, lower, body);
    }
    self.backend.weight_rule(choice, heads, lower, body);
  }

  /// Lowers one literal reference to a signed backend literal, expanding structured atoms on first use.
  fn lit(&mut self, doms: &mut Domains, id: LiteralId, log: &mut Logger) -> Result<BackendLit, GroundError> {
    enum Kind {
      Plain,
      Aggregate,
      Conjunction,
    }
    let kind = match &doms.get(id.dom).data {
      DomainData::Predicate | DomainData::Theory(_) => Kind::Plain,
      DomainData::BodyAggregate(_) => Kind::Aggregate,
      DomainData::Conjunction(_) => Kind::Conjunction,
      DomainData::HeadAggregate(_) | DomainData::Disjunction(_) => {
        unreachable!("head-side atoms never occur as body literals")
      }
    };
    let base = match kind {
      Kind::Plain => self.atom_uid(doms, id.dom, id.uid),
      Kind::Aggregate => self.aggregate_atom(doms, id.dom, id.uid, log)?,
      Kind::Conjunction => self.conjunction_atom(doms, id.dom, id.uid, log)?,
    };
    Ok(match id.naf {
      Naf::Pos => base as BackendLit,
      Naf::Not => -(base as BackendLit),
      Naf::NotNot => {
        // `not not a` needs an auxiliary: aux :- not a, and the literal is `not aux`.
        let aux = match self.notnot_aux.get(&base) {
          Some(&aux) => aux,
          None => {
            let aux = self.fresh_atom();
            self.notnot_aux.insert(base, aux);
            self.emit_rule(false, &[aux], &[-(base as BackendLit)]);
            aux
          }
        };
        -(aux as BackendLit)
      }
    })
  }

  fn lits(&mut self, doms: &mut Domains, ids: &[LiteralId], log: &mut Logger) -> Result<Vec<BackendLit>, GroundError> {
    ids.iter().map(|&id| self.lit(doms, id, log)).collect()
  }

  /// A single literal standing for the conjunction of `cond`: the true atom when empty, the literal itself when
  /// singleton, a defined auxiliary otherwise.
  fn cond_lit(&mut self, doms: &mut Domains, cond: &[LiteralId], log: &mut Logger) -> Result<BackendLit, GroundError> {
    match cond {
      [] => Ok(self.true_lit()),
      [only] => self.lit(doms, *only, log),
      _ => {
        let body = self.lits(doms, cond, log)?;
        let aux = self.fresh_atom();
        self.emit_rule(false, &[aux], &body);
        Ok(aux as BackendLit)
      }
    }
  }

  /// One literal per aggregate element: any of its conditions derives it; facts are the true literal.
  fn element_lit(
    &mut self,
    doms: &mut Domains,
    fact: bool,
    conds: &[Vec<LiteralId>],
    log: &mut Logger,
  ) -> Result<BackendLit, GroundError> {
    if fact {
      return Ok(self.true_lit());
    }
    match conds {
      [] => Ok(self.true_lit()),
      [only] => self.cond_lit(doms, only, log),
      _ => {
        let aux = self.fresh_atom();
        for cond in conds {
          let body = self.lits(doms, cond, log)?;
          self.emit_rule(false, &[aux], &body);
        }
        Ok(aux as BackendLit)
      }
    }
  }

  // region Aggregate lowering

  /// The backend atom of a body-aggregate atom, emitting its defining rules on first reference.
  fn aggregate_atom(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    log: &mut Logger,
  ) -> Result<BackendAtom, GroundError> {
    if doms.get(dom).atom(uid).backend_uid != 0 {
      return Ok(doms.get(dom).atom(uid).backend_uid);
    }
    let atom = self.fresh_atom();
    doms.get_mut(dom).atom_mut(uid).backend_uid = atom;

    let state = {
      let DomainData::BodyAggregate(states) = &doms.get(dom).data else {
        unreachable!("aggregate atom in a non-aggregate domain")
      };
      match states[uid as usize].clone() {
        Some(state) => state,
        // Reserved by a recursive negative occurrence but never accumulated: no defining rules, the atom stays
        // underivable.
        None => return Ok(atom),
      }
    };

    // One part literal per bound interval; the atom is their disjunction.
    let intervals: Vec<Interval> = state.bounds.intervals().to_vec();
    for interval in intervals {
      let part = match state.fun {
        AggregateFunction::Count | AggregateFunction::Sum | AggregateFunction::SumPlus => {
          self.weight_part(doms, &state, &interval, log)?
        }
        AggregateFunction::Min => self.min_max_part(doms, &state, &interval, true, log)?,
        AggregateFunction::Max => self.min_max_part(doms, &state, &interval, false, log)?,
      };
      if let Some(part) = part {
        self.emit_rule(false, &[atom], &part);
      }
    }
    Ok(atom)
  }

  /// Weighted elements of a count/sum aggregate, sorted by tuple for determinism.
  fn weighted_elements(
    &mut self,
    doms: &mut Domains,
    state: &AggregateAtomState,
    log: &mut Logger,
  ) -> Result<Vec<WeightedLit>, GroundError> {
    let mut tuples: Vec<Symbol> = state.elements.keys().copied().collect();
    tuples.sort();
    let mut out = Vec::new();
    for tuple in tuples {
      let element = &state.elements[&tuple];
      let weight = match state.fun {
        AggregateFunction::Count => 1,
        AggregateFunction::SumPlus => (element.weight.num() as i64).max(0),
        _ => element.weight.num() as i64,
      };
      if weight == 0 {
        continue;
      }
      let fact = element.fact;
      let conds = element.conds.clone();
      let lit = self.element_lit(doms, fact, &conds, log)?;
      out.push((lit, weight));
    }
    Ok(out)
  }

  /// Normalizes negative weights (`w < 0` becomes `-w` on the negated literal, raising the bound) and emits a
  /// weight rule defining a fresh atom true iff the weighted sum reaches `lower`.
  fn weight_rule_atom(&mut self, mut lower: i64, wlits: &[WeightedLit]) -> BackendAtom {
    let mut body = Vec::with_capacity(wlits.len());
    for &(lit, weight) in wlits {
      if weight < 0 {
        lower -= weight;
        body.push((-lit, -weight));
      } else {
        body.push((lit, weight));
      }
    }
    let aux = self.fresh_atom();
    if lower <= 0 {
      self.emit_rule(false, &[aux], &[]);
    } else {
      self.emit_weight_rule(false, &[aux], lower, &body);
    }
    aux
  }

  /// The body of the part rule for one bound interval of a count/sum aggregate, or `None` when the interval cannot
  /// be met by a sum.
  fn weight_part(
    &mut self,
    doms: &mut Domains,
    state: &AggregateAtomState,
    interval: &Interval,
    log: &mut Logger,
  ) -> Result<Option<Vec<BackendLit>>, GroundError> {
    // Sums take integer values; non-numeric finite interval ends cannot be met.
    let lower = match interval.left.value.symbol_type() {
      SymbolType::Inf => None,
      SymbolType::Num => Some(if interval.left.inclusive {
        interval.left.value.num() as i64
      } else {
        interval.left.value.num() as i64 + 1
      }),
      _ => return Ok(None),
    };
    let upper_violation = match interval.right.value.symbol_type() {
      SymbolType::Sup => None,
      SymbolType::Num => Some(if interval.right.inclusive {
        interval.right.value.num() as i64 + 1
      } else {
        interval.right.value.num() as i64
      }),
      _ => return Ok(None),
    };

    let wlits = self.weighted_elements(doms, state, log)?;
    let mut body = Vec::new();
    if let Some(lower) = lower {
      let ok = self.weight_rule_atom(lower, &wlits);
      body.push(ok as BackendLit);
    }
    if let Some(violation) = upper_violation {
      let viol = self.weight_rule_atom(violation, &wlits);
      body.push(-(viol as BackendLit));
    }
    if body.is_empty() {
      // Unbounded on both sides: the aggregate holds whenever its elements do, i.e. always.
      body.push(self.true_lit());
    }
    Ok(Some(body))
  }

  /// The part rule body for one bound interval of a `#min`/`#max` aggregate.
  fn min_max_part(
    &mut self,
    doms: &mut Domains,
    state: &AggregateAtomState,
    interval: &Interval,
    is_min: bool,
    log: &mut Logger,
  ) -> Result<Option<Vec<BackendLit>>, GroundError> {
    let mut tuples: Vec<Symbol> = state.elements.keys().copied().collect();
    tuples.sort();

    // For #min, an element below the lower end violates, and a witness within the upper end is required unless the
    // empty value #sup already satisfies it. #max mirrors this with the roles of the ends swapped.
    let mut violating: Vec<(bool, Vec<Vec<LiteralId>>)> = Vec::new();
    let mut witnessing: Vec<(bool, Vec<Vec<LiteralId>>)> = Vec::new();
    for tuple in tuples {
      let element = &state.elements[&tuple];
      let violates = if is_min {
        interval.below_lower(element.weight)
      } else {
        interval.above_upper(element.weight)
      };
      let witnesses = if is_min {
        !interval.above_upper(element.weight)
      } else {
        !interval.below_lower(element.weight)
      };
      if violates {
        violating.push((element.fact, element.conds.clone()));
      } else if witnesses {
        witnessing.push((element.fact, element.conds.clone()));
      }
    }

    let empty_value = if is_min { Symbol::create_sup() } else { Symbol::create_inf() };
    let needs_witness = !interval.contains_value(empty_value);

    let mut body = Vec::new();
    if !violating.is_empty() {
      let viol = self.fresh_atom();
      for (fact, conds) in violating {
        let lit = self.element_lit(doms, fact, &conds, log)?;
        self.emit_rule(false, &[viol], &[lit]);
      }
      body.push(-(viol as BackendLit));
    }
    if needs_witness {
      if witnessing.is_empty() {
        return Ok(None);
      }
      let wit = self.fresh_atom();
      for (fact, conds) in witnessing {
        let lit = self.element_lit(doms, fact, &conds, log)?;
        self.emit_rule(false, &[wit], &[lit]);
      }
      body.push(wit as BackendLit);
    }
    if body.is_empty() {
      body.push(self.true_lit());
    }
    Ok(Some(body))
  }

  // endregion Aggregate lowering

  /// The backend atom of a conjunction atom, emitting its defining rules on first reference.
  fn conjunction_atom(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    log: &mut Logger,
  ) -> Result<BackendAtom, GroundError> {
    if doms.get(dom).atom(uid).backend_uid != 0 {
      return Ok(doms.get(dom).atom(uid).backend_uid);
    }
    let atom = self.fresh_atom();
    doms.get_mut(dom).atom_mut(uid).backend_uid = atom;

    let state = {
      let DomainData::Conjunction(states) = &doms.get(dom).data else {
        unreachable!("conjunction atom in a non-conjunction domain")
      };
      states[uid as usize].clone()
    };

    let mut keys: Vec<Symbol> = state.conds.keys().copied().collect();
    keys.sort();
    let mut body = Vec::new();
    for key in keys {
      let instance = &state.conds[&key];
      if instance.head_fact {
        continue;
      }
      // aux ← any head derivation, or the condition failing.
      let aux = self.fresh_atom();
      for heads in &instance.heads {
        let lits = self.lits(doms, heads, log)?;
        self.emit_rule(false, &[aux], &lits);
      }
      if !instance.cond_fact && !instance.cond.is_empty() {
        let cond = self.cond_lit(doms, &instance.cond, log)?;
        self.emit_rule(false, &[aux], &[-cond]);
      }
      body.push(aux as BackendLit);
    }
    self.emit_rule(false, &[atom], &body);
    Ok(atom)
  }

  /// Flushes step-delayed output: minimize statements and the theory data.
  pub fn end_step(&mut self, doms: &mut Domains, log: &mut Logger) -> Result<(), GroundError> {
    self.check_cancel()?;
    let minimize = std::mem::take(&mut self.minimize);
    for (priority, entries) in minimize {
      if self.debug {
        trace!("%% minimize({},{:?})", priority, entries);
      }
      self.backend.minimize(priority, &entries);
    }

    self.emit_theory(doms, log)?;
    self.backend.end_step();
    Ok(())
  }

  // region Theory emission

  fn theory_name_id(&mut self, name: &str) -> u32 {
    if let Some(&id) = self.theory_name_ids.get(name) {
      return id;
    }
    let id = self.next_theory_term;
    self.next_theory_term += 1;
    self.theory_name_ids.insert(name.to_string(), id);
    self.backend.theory_term(id, &TheoryTermData::Name(name.to_string()));
    id
  }

  /// Memoized lowering of a ground symbol into the backend's theory-term table.
  fn theory_term_id(&mut self, sym: Symbol) -> u32 {
    if let Some(&id) = self.theory_terms.get(&sym) {
      return id;
    }
    let data = match sym.symbol_type() {
      SymbolType::Num => TheoryTermData::Number(sym.num()),
      SymbolType::Str => TheoryTermData::Name(sym.string().to_string()),
      SymbolType::Fun => {
        let name = sym.name();
        let args: Vec<u32> = sym.args().into_iter().map(|arg| self.theory_term_id(arg)).collect();
        if args.is_empty() && !name.is_empty() {
          TheoryTermData::Name(name.to_string())
        } else {
          let name_id = if name.is_empty() { None } else { Some(self.theory_name_id(istr(&name))) };
          TheoryTermData::Compound { name: name_id, args }
        }
      }
      SymbolType::Inf | SymbolType::Sup => TheoryTermData::Name(sym.to_string()),
    };
    let id = self.next_theory_term;
    self.next_theory_term += 1;
    self.theory_terms.insert(sym, id);
    self.backend.theory_term(id, &data);
    id
  }

  fn emit_theory(&mut self, doms: &mut Domains, log: &mut Logger) -> Result<(), GroundError> {
    let theory_doms: Vec<DomId> = doms
        .iter()
        .filter(|(_, d)| matches!(d.data, DomainData::Theory(_)))
        .map(|(id, _)| id)
        .collect();
    for dom in theory_doms {
      for uid in 0..doms.get(dom).len() as AtomUid {
        if !doms.get(dom).atom(uid).defined() {
          continue;
        }
        let state = {
          let DomainData::Theory(states) = &doms.get(dom).data else {
            unreachable!("theory domain without theory payload")
          };
          states[uid as usize].clone()
        };
        let Some(atom_sym) = state.atom_sym else {
          continue;
        };
        let term = self.theory_term_id(atom_sym);
        let mut element_ids = Vec::with_capacity(state.elements.len());
        for (tuple, cond) in &state.elements {
          let terms: Vec<u32> = tuple.iter().map(|&t| self.theory_term_id(t)).collect();
          let cond_lits = self.lits(doms, cond, log)?;
          let id = self.next_theory_elem;
          self.next_theory_elem += 1;
          self.backend.theory_element(id, &terms, &cond_lits);
          element_ids.push(id);
        }
        let guard = match &state.guard {
          Some((op, value)) => {
            let op_id = self.theory_name_id(istr(op));
            let value_id = self.theory_term_id(*value);
            Some((op_id, value_id))
          }
          None => None,
        };
        let atom = self.atom_uid(doms, dom, uid);
        self.backend.theory_atom(atom, term, &element_ids, guard);
      }
    }
    Ok(())
  }

  // endregion Theory emission
}

impl<B: Backend> OutputSink for Translator<B> {
  fn keep_facts(&self) -> bool {
    self.keep_facts
  }

  fn rule(&mut self, doms: &mut Domains, rule: &GroundRule, log: &mut Logger) -> Result<(), GroundError> {
    self.check_cancel()?;
    let heads: Vec<BackendAtom> = rule.heads.iter().map(|h| self.atom_uid(doms, h.dom, h.uid)).collect();
    let body = self.lits(doms, &rule.body, log)?;
    self.emit_rule(rule.choice, &heads, &body);
    Ok(())
  }

  fn external(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    value: ExternalValue,
    _log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    let atom = self.atom_uid(doms, dom, uid);
    if self.debug {
      trace!("%% external({},{:?})", atom, value);
    }
    self.backend.external(atom, value);
    Ok(())
  }

  fn show(&mut self, doms: &mut Domains, sym: Symbol, cond: &[LiteralId], log: &mut Logger) -> Result<(), GroundError> {
    self.check_cancel()?;
    let cond_lits = self.lits(doms, cond, log)?;
    if self.debug {
      trace!("%% output({},{:?})", sym, cond_lits);
    }
    self.backend.output(sym, &cond_lits);
    Ok(())
  }

  fn project(&mut self, doms: &mut Domains, dom: DomId, uid: AtomUid, _log: &mut Logger) -> Result<(), GroundError> {
    self.check_cancel()?;
    let atom = self.atom_uid(doms, dom, uid);
    self.backend.project(&[atom]);
    Ok(())
  }

  fn heuristic(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    modifier: HeuristicMod,
    bias: i32,
    priority: u32,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    let atom = self.atom_uid(doms, dom, uid);
    let cond_lits = self.lits(doms, cond, log)?;
    self.backend.heuristic(atom, modifier, bias, priority, &cond_lits);
    Ok(())
  }

  fn edge(
    &mut self,
    doms: &mut Domains,
    u: Symbol,
    v: Symbol,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    let next = self.edge_nodes.len() as i32;
    let u_node = *self.edge_nodes.entry(u).or_insert(next);
    let next = self.edge_nodes.len() as i32;
    let v_node = *self.edge_nodes.entry(v).or_insert(next);
    let cond_lits = self.lits(doms, cond, log)?;
    self.backend.acyc_edge(u_node, v_node, &cond_lits);
    Ok(())
  }

  fn minimize_entry(
    &mut self,
    doms: &mut Domains,
    weight: i64,
    priority: i64,
    tuple: Symbol,
    cond: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    // Weak-constraint tuples have set semantics per priority level.
    if !self.minimize_seen.insert((priority, tuple)) {
      return Ok(());
    }
    let lit = self.cond_lit(doms, cond, log)?;
    self.minimize.entry(priority).or_default().push((lit, weight));
    Ok(())
  }

  fn disjunctive_rule(
    &mut self,
    doms: &mut Domains,
    heads: &[DisjHead],
    body: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    let mut head_atoms = Vec::with_capacity(heads.len());
    let mut shifted: Vec<(BackendAtom, BackendAtom, Vec<BackendLit>)> = Vec::new();
    for head in heads {
      let atom = self.atom_uid(doms, head.dom, head.uid);
      if head.cond.is_empty() {
        head_atoms.push(atom);
      } else {
        // Shift: a fresh candidate joins the disjunction; choosing it under the condition derives the head.
        let aux = self.fresh_atom();
        let cond = self.lits(doms, &head.cond, log)?;
        shifted.push((aux, atom, cond));
        head_atoms.push(aux);
      }
    }
    let body_lits = self.lits(doms, body, log)?;
    self.emit_rule(false, &head_atoms, &body_lits);
    for (aux, atom, cond) in shifted {
      let mut rule_body = vec![aux as BackendLit];
      rule_body.extend(cond);
      self.emit_rule(false, &[atom], &rule_body);
    }
    Ok(())
  }

  fn head_aggregate_rule(
    &mut self,
    doms: &mut Domains,
    dom: DomId,
    uid: AtomUid,
    body: &[LiteralId],
    log: &mut Logger,
  ) -> Result<(), GroundError> {
    self.check_cancel()?;
    let state = {
      let DomainData::HeadAggregate(states) = &doms.get(dom).data else {
        unreachable!("head aggregate rule over a non-aggregate domain")
      };
      states[uid as usize].clone()
    };
    let fun = state.fun.unwrap_or(AggregateFunction::Count);
    let body_lits = self.lits(doms, body, log)?;

    // The choices: each witness may be chosen wherever the body and its condition hold.
    for element in &state.elements {
      let Some(witness) = element.witness else {
        continue;
      };
      let atom = self.atom_uid(doms, witness.dom, witness.uid);
      let mut rule_body = body_lits.clone();
      rule_body.extend(self.lits(doms, &element.cond, log)?);
      self.emit_rule(true, &[atom], &rule_body);
    }

    // Bound enforcement: count chosen witnesses (with their conditions) against each interval.
    let Some(bounds) = &state.bounds else {
      return Ok(());
    };
    let mut wlits = Vec::new();
    for element in &state.elements {
      let weight = match fun {
        AggregateFunction::Count => 1,
        AggregateFunction::SumPlus => (element.weight.num() as i64).max(0),
        AggregateFunction::Sum => element.weight.num() as i64,
        // Witness-counting bounds for #min/#max head aggregates degrade to existence checks.
        AggregateFunction::Min | AggregateFunction::Max => 1,
      };
      if weight == 0 {
        continue;
      }
      let lit = self.chosen_element_lit(doms, element, log)?;
      wlits.push((lit, weight));
    }
    let mut satisfied = Vec::new();
    for interval in bounds.intervals() {
      let lower = match interval.left.value.symbol_type() {
        SymbolType::Inf => None,
        SymbolType::Num => Some(if interval.left.inclusive {
          interval.left.value.num() as i64
        } else {
          interval.left.value.num() as i64 + 1
        }),
        _ => continue,
      };
      let upper_violation = match interval.right.value.symbol_type() {
        SymbolType::Sup => None,
        SymbolType::Num => Some(if interval.right.inclusive {
          interval.right.value.num() as i64 + 1
        } else {
          interval.right.value.num() as i64
        }),
        _ => continue,
      };
      let mut part = Vec::new();
      if let Some(lower) = lower {
        let ok = self.weight_rule_atom(lower, &wlits);
        part.push(ok as BackendLit);
      }
      if let Some(violation) = upper_violation {
        let viol = self.weight_rule_atom(violation, &wlits);
        part.push(-(viol as BackendLit));
      }
      let part_lit = match part.len() {
        0 => self.true_lit(),
        1 => part[0],
        _ => {
          let aux = self.fresh_atom();
          self.emit_rule(false, &[aux], &part);
          aux as BackendLit
        }
      };
      satisfied.push(part_lit);
    }
    if !satisfied.is_empty() {
      // ok ← any interval satisfied; constraint ← body ∧ not ok.
      let ok = self.fresh_atom();
      for lit in satisfied {
        self.emit_rule(false, &[ok], &[lit]);
      }
      let mut constraint = body_lits;
      constraint.push(-(ok as BackendLit));
      self.emit_rule(false, &[], &constraint);
    }
    Ok(())
  }
}

impl<B: Backend> Translator<B> {
  /// A literal true iff the element's witness is chosen and its condition holds.
  fn chosen_element_lit(
    &mut self,
    doms: &mut Domains,
    element: &HeadAggregateElement,
    log: &mut Logger,
  ) -> Result<BackendLit, GroundError> {
    let witness_lit = match element.witness {
      Some(witness) => Some(self.atom_uid(doms, witness.dom, witness.uid) as BackendLit),
      None => None,
    };
    let mut body = Vec::new();
    if let Some(lit) = witness_lit {
      body.push(lit);
    }
    body.extend(self.lits(doms, &element.cond, log)?);
    match body.len() {
      0 => Ok(self.true_lit()),
      1 => Ok(body[0]),
      _ => {
        let aux = self.fresh_atom();
        self.emit_rule(false, &[aux], &body);
        Ok(aux as BackendLit)
      }
    }
  }
}
