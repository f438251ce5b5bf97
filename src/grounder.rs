/*!

The driver: lowers the non-ground IR into the statement graph, partitions it into strongly connected components,
and grounds one component at a time: linearize the member statements, enqueue their instantiators, pump the
scheduler to a fixpoint, freeze the touched domains. Ground rules stream into the translator as they are derived;
step-delayed output (minimize statements, theory data) flushes at `end_step`.

Unsafe rules are fatal for the offending rule only: the error is logged and the remaining statements keep
grounding. Message-limit exhaustion and cancellation unwind the whole step.

*/

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use crate::{
  abstractions::{istr, HashMap, IString, Set},
  api::{
    context::ExternalContext,
    location::Location,
    program::{
      AggregateFunction,
      BodyLiteral,
      CondHead,
      Head,
      HeadAggregateElement,
      Naf,
      Program,
      Rel,
      Stm,
      TheoryAtom,
    },
    symbol::{Sig, Symbol},
    term::{Term, VarBoundVec, VarCell},
  },
  core::{
    dep::{self, Component},
    domain::{Atom, DomainData, Domains},
    binder::MatchCtx,
    instantiator::Instantiator,
    literal::{AtomKind, Literal, PredicateLiteral, RangeLiteral, RelationLiteral, ScriptLiteral},
    queue::{Queue, QueueItem},
    statement::{HeadDef, Statement, StatementKind},
    DomId,
    GroundError,
    InstId,
    Logger,
    StmId,
    Warnings,
  },
  output::backend::Backend,
  output::translate::Translator,
};

/// Verbose debug modes: anything but `Off` inserts a tee that prints emitted statements to the log transport.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum DebugMode {
  #[default]
  Off,
  Text,
  Translate,
  All,
}

#[derive(Clone)]
pub struct GroundConfig {
  /// Write body literals for atoms proven fact anyway (reification debugging).
  pub preserve_facts: bool,
  pub debug: DebugMode,
  pub message_limit: u32,
  /// Warning categories to suppress.
  pub disabled_warnings: Vec<Warnings>,
  /// Announce the program as incremental, allowing the sink to reuse atom ids across steps.
  pub incremental: bool,
  /// Only meaningful for reifying output sinks; carried through untouched.
  pub reify_sccs : bool,
  pub reify_steps: bool,
}

impl Default for GroundConfig {
  fn default() -> GroundConfig {
    GroundConfig {
      preserve_facts: false,
      debug: DebugMode::Off,
      message_limit: 20,
      disabled_warnings: Vec::new(),
      incremental: false,
      reify_sccs: false,
      reify_steps: false,
    }
  }
}

pub struct Grounder<B: Backend> {
  config: GroundConfig,
  doms  : Domains,
  log   : Logger,
  out   : Translator<B>,
  stmts : Vec<Statement>,
  insts : Vec<Instantiator>,
  queue : Queue,
  cancel: Arc<AtomicBool>,
  started: bool,
  /// Domains some statement of any step has defined into; referencing anything else warns `atom-undefined`.
  defined_doms: Set<DomId>,
}

impl<B: Backend> Grounder<B> {
  pub fn new(config: GroundConfig, backend: B) -> Grounder<B> {
    let cancel = Arc::new(AtomicBool::new(false));
    let mut log = Logger::new(config.message_limit);
    for &warning in &config.disabled_warnings {
      log.enable(warning, false);
    }
    let out = Translator::new(
      backend,
      config.preserve_facts,
      config.debug != DebugMode::Off,
      cancel.clone(),
    );
    Grounder {
      config,
      doms: Domains::new(),
      log,
      out,
      stmts: Vec::new(),
      insts: Vec::new(),
      queue: Queue::new(),
      cancel,
      started: false,
      defined_doms: Set::default(),
    }
  }

  pub fn backend(&self) -> &B {
    &self.out.backend
  }

  pub fn into_backend(self) -> B {
    self.out.backend
  }

  /// The cooperative cancel flag, checked at every pump boundary and backend emit.
  pub fn cancel_flag(&self) -> Arc<AtomicBool> {
    self.cancel.clone()
  }

  pub fn has_error(&self) -> bool {
    self.log.has_error()
  }

  pub fn domains(&self) -> &Domains {
    &self.doms
  }

  /// Compacts one predicate domain after the solver has proven atoms false; returns the uid remap table.
  pub fn cleanup(&mut self, sig: Sig, keep: impl Fn(&Atom) -> bool) -> Option<Vec<crate::core::AtomUid>> {
    let dom = self.doms.find_sig(sig)?;
    Some(self.doms.get_mut(dom).cleanup(keep))
  }

  /// Grounds one step of the program.
  pub fn ground(&mut self, program: &Program, ext: &dyn ExternalContext) -> Result<(), GroundError> {
    if !self.started {
      self.out.backend.init_program(self.config.incremental);
      self.started = true;
    }
    self.out.backend.begin_step();

    self.stmts.clear();
    self.insts.clear();
    {
      let mut builder = Builder {
        doms: &mut self.doms,
        stmts: &mut self.stmts,
        aux: 0,
        range: 0,
      };
      builder.build(program)?;
    }

    // Dependency analysis: partition into components and classify every occurrence.
    let deps: Vec<_> = self.stmts.iter().map(|s| s.deps()).collect();
    let analysis = dep::analyze(&deps);
    for (stmt, types) in self.stmts.iter().zip(&analysis.occ_types) {
      let implicit = deps_implicit_count(stmt);
      let mut next = implicit;
      for lit in &stmt.lits {
        if lit.occurrence().is_some() {
          lit.set_occurrence_type(types[next]);
          next += 1;
        }
      }
    }
    for stmt in &self.stmts {
      for &dom in &stmt.head_doms {
        self.defined_doms.insert(dom);
      }
    }

    for component in &analysis.components {
      self.ground_component(component, ext)?;
    }
    self.check_defined()?;
    self.out.end_step(&mut self.doms, &mut self.log)
  }

  fn ground_component(&mut self, component: &Component, ext: &dyn ExternalContext) -> Result<(), GroundError> {
    let members: Set<StmId> = component.stmts.iter().copied().collect();
    for (i, stmt) in self.stmts.iter_mut().enumerate() {
      stmt.start_linearize(members.contains(&(i as StmId)));
    }
    for (_, dom) in self.doms.iter_mut() {
      dom.dependents.clear();
    }

    // Open the NEW windows of every domain the component touches.
    let mut touched: Set<DomId> = Set::default();
    for &m in &component.stmts {
      let deps = self.stmts[m as usize].deps();
      touched.extend(deps.heads);
      touched.extend(deps.body.into_iter().map(|(dom, _)| dom));
    }
    for &dom in &touched {
      self.doms.get_mut(dom).open_window();
    }

    // Linearize; an unsafe body is fatal for its statement only.
    for &m in &component.stmts {
      let plans = {
        let stmt = &self.stmts[m as usize];
        match stmt.linearize(&mut self.doms, m) {
          Ok(plans) => plans,
          Err(err @ GroundError::UnsafeVariables { .. }) => {
            self.log.report_error(|| err.to_string())?;
            continue;
          }
          Err(err) => return Err(err),
        }
      };
      for plan in plans {
        let inst_id = self.insts.len() as InstId;
        for dom in &plan.new_domains {
          self.doms.get_mut(*dom).dependents.push(inst_id);
        }
        self.insts.push(plan.instantiator);
        self.stmts[m as usize].insts.push(inst_id);
      }
    }

    // Output-recursiveness of accumulate statements feeds the recursive flags of their complete statements.
    for &m in &component.stmts {
      let recursive = self.stmts[m as usize].lits.iter().any(|l| l.is_recursive());
      if !recursive {
        continue;
      }
      let Some(complete) = self.stmts[m as usize].complete else {
        continue;
      };
      match (&self.stmts[m as usize].kind, &self.stmts[complete as usize].kind) {
        (StatementKind::BodyAggrAccumulate { .. }, StatementKind::BodyAggrComplete { output_recursive, .. }) => {
          output_recursive.set(true);
        }
        (StatementKind::ConjAccumulateCond { .. }, StatementKind::ConjComplete { cond_recursive, .. }) => {
          cond_recursive.set(true);
        }
        (StatementKind::ConjAccumulateHead { .. }, StatementKind::ConjComplete { head_recursive, .. }) => {
          head_recursive.set(true);
        }
        _ => {}
      }
    }

    // Pump to the fixpoint.
    for &m in &component.stmts {
      let insts = self.stmts[m as usize].insts.clone();
      for inst in insts {
        self.queue.enqueue_inst(&mut self.insts, inst);
      }
    }
    while let Some(item) = self.queue.pop(&mut self.doms, &mut self.insts) {
      match item {
        QueueItem::Dom(dom) => {
          if self.doms.get_mut(dom).slide_window() {
            let dependents = self.doms.get(dom).dependents.clone();
            for inst in dependents {
              self.queue.enqueue_inst(&mut self.insts, inst);
            }
          }
        }

        QueueItem::Inst(inst_id) => {
          if self.cancel.load(Ordering::Relaxed) {
            return Err(GroundError::Interrupted);
          }
          let mut inst = std::mem::take(&mut self.insts[inst_id as usize]);
          let owner = inst.owner;
          let result = {
            let stmt = &self.stmts[owner as usize];
            let out = &mut self.out;
            let mut ctx = MatchCtx { doms: &mut self.doms, ext, log: &mut self.log };
            inst.pump(&mut ctx, &mut |ctx| stmt.report(ctx, out))
          };
          self.insts[inst_id as usize] = inst;
          result?;

          // Propagate: head domains slide, dependent complete statements re-run.
          let head_doms = self.stmts[owner as usize].head_doms.clone();
          for dom in head_doms {
            self.queue.enqueue_dom(&mut self.doms, dom);
          }
          if let Some(complete) = self.stmts[owner as usize].complete {
            if self.stmts[complete as usize].active {
              let insts = self.stmts[complete as usize].insts.clone();
              for inst in insts {
                self.queue.enqueue_inst(&mut self.insts, inst);
              }
            }
          }
        }
      }
    }

    for &dom in &touched {
      self.doms.get_mut(dom).freeze();
    }
    Ok(())
  }

  /// Warns once per location about predicate literals over domains nothing defines.
  fn check_defined(&mut self) -> Result<(), GroundError> {
    for stmt in &self.stmts {
      for lit in &stmt.lits {
        let Literal::Pred(pred) = lit else {
          continue;
        };
        if pred.auxiliary || pred.kind != AtomKind::Predicate || self.defined_doms.contains(&pred.dom) {
          continue;
        }
        if self.doms.get(pred.dom).atoms().any(|a| a.defined()) {
          continue;
        }
        self.log.report_once(Warnings::AtomUndefined, &pred.loc, || {
          format!("{}: info: atom does not occur in any rule head:\n  {}", pred.loc, pred.repr)
        })?;
      }
    }
    Ok(())
  }
}

fn deps_implicit_count(stmt: &Statement) -> usize {
  match &stmt.kind {
    StatementKind::BodyAggrComplete { .. }
    | StatementKind::ConjComplete { .. }
    | StatementKind::DisjComplete { .. }
    | StatementKind::HeadAggrComplete { .. }
    | StatementKind::TheoryComplete { .. } => 1,
    _ => 0,
  }
}

// {{{1 Builder

/// Lowers the IR into the statement graph: one statement per source rule, plus synthesized accumulate/complete
/// statements for aggregates, conjunctions, disjunctions, and theory atoms. Each statement gets its own cell map so
/// all occurrences of a variable name within it share one binding slot.
struct Builder<'g> {
  doms : &'g mut Domains,
  stmts: &'g mut Vec<Statement>,
  /// Counter naming synthesized atoms.
  aux  : u32,
  /// Counter naming variables introduced by range extraction.
  range: u32,
}

type Cells = HashMap<IString, VarCell>;

impl<'g> Builder<'g> {
  fn build(&mut self, program: &Program) -> Result<(), GroundError> {
    for stm in &program.statements {
      self.build_stm(stm)?;
    }
    Ok(())
  }

  fn build_stm(&mut self, stm: &Stm) -> Result<(), GroundError> {
    match stm {
      Stm::Rule { head, body, loc } => self.build_rule(head, body, loc),

      Stm::External { atom, body, value, loc } => {
        for atom in atom.unpool() {
          let mut atom = atom.clone();
          let mut extra = body.clone();
          self.extract_ranges(&mut atom, &mut extra, loc);
          let mut cells = Cells::default();
          let lits = self.lower_body(&extra, &mut cells, &[], loc)?;
          let mut atom = atom;
          atom.share_vars(&mut cells);
          let dom = self.pred_dom(&atom, loc)?;
          let mut value = value.clone();
          value.share_vars(&mut cells);
          let heads = vec![HeadDef { repr: atom, dom }];
          self.stmts.push(Statement::new(StatementKind::External { heads, value }, lits, loc.clone()));
        }
        Ok(())
      }

      Stm::Show { term, body, loc } => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let mut term = term.clone();
        term.share_vars(&mut cells);
        self.stmts.push(Statement::new(StatementKind::Show { term }, lits, loc.clone()));
        Ok(())
      }

      Stm::Project { atom, body, loc } => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let mut atom = atom.clone();
        atom.share_vars(&mut cells);
        self.pred_dom(&atom, loc)?;
        self.stmts.push(Statement::new(StatementKind::Project { atom }, lits, loc.clone()));
        Ok(())
      }

      Stm::Heuristic { atom, body, value, priority, modifier, loc } => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let mut atom = atom.clone();
        atom.share_vars(&mut cells);
        self.pred_dom(&atom, loc)?;
        let mut value = value.clone();
        let mut priority = priority.clone();
        let mut modifier = modifier.clone();
        value.share_vars(&mut cells);
        priority.share_vars(&mut cells);
        modifier.share_vars(&mut cells);
        self
            .stmts
            .push(Statement::new(StatementKind::Heuristic { atom, value, priority, modifier }, lits, loc.clone()));
        Ok(())
      }

      Stm::Edge { u, v, body, loc } => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let mut u = u.clone();
        let mut v = v.clone();
        u.share_vars(&mut cells);
        v.share_vars(&mut cells);
        self.stmts.push(Statement::new(StatementKind::Edge { u, v }, lits, loc.clone()));
        Ok(())
      }

      Stm::Minimize { weight, priority, tuple, body, loc } => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let mut weight = weight.clone();
        let mut priority = priority.clone();
        weight.share_vars(&mut cells);
        priority.share_vars(&mut cells);
        let tuple = tuple
            .iter()
            .map(|t| {
              let mut t = t.clone();
              t.share_vars(&mut cells);
              t
            })
            .collect();
        self
            .stmts
            .push(Statement::new(StatementKind::Minimize { weight, priority, tuple }, lits, loc.clone()));
        Ok(())
      }
    }
  }

  fn build_rule(&mut self, head: &Head, body: &[BodyLiteral], loc: &Location) -> Result<(), GroundError> {
    match head {
      Head::Simple(term) => {
        for head_term in term.unpool() {
          self.build_simple_rule(false, std::slice::from_ref(&head_term), body, loc)?;
        }
        Ok(())
      }

      Head::False => self.build_simple_rule(false, &[], body, loc),

      Head::Choice(elements) => {
        // Each element is independent: `{a : c}` grounds as a one-element choice with `c` joining the body.
        for element in elements {
          for head_term in element.atom.unpool() {
            let mut extended = body.to_vec();
            extended.extend(element.cond.iter().cloned());
            self.build_simple_rule(true, std::slice::from_ref(&head_term), &extended, loc)?;
          }
        }
        Ok(())
      }

      Head::Disjunction(elements) => {
        if elements.iter().all(|e| e.cond.is_empty()) {
          let mut heads = Vec::new();
          for element in elements {
            heads.extend(element.atom.unpool());
          }
          self.build_simple_rule(false, &heads, body, loc)
        } else {
          self.build_cond_disjunction(elements, body, loc)
        }
      }

      Head::Aggregate { fun, bounds, elements } => self.build_head_aggregate(*fun, bounds, elements, body, loc),

      Head::Theory(theory) => {
        let mut cells = Cells::default();
        let lits = self.lower_body(body, &mut cells, &[], loc)?;
        let simple = simple_literals(body);
        let repr = self.build_theory_atom(theory, &simple, loc)?;
        let mut rule_repr = repr.term.clone();
        rule_repr.share_vars(&mut cells);
        let heads = vec![HeadDef { repr: rule_repr, dom: repr.dom }];
        self
            .stmts
            .push(Statement::new(StatementKind::Rule { choice: false, heads }, lits, loc.clone()));
        Ok(())
      }
    }
  }

  /// One rule statement with plain heads. Pools in body predicate atoms multiply the rule.
  fn build_simple_rule(
    &mut self,
    choice: bool,
    head_terms: &[Term],
    body: &[BodyLiteral],
    loc: &Location,
  ) -> Result<(), GroundError> {
    for body in expand_body_pools(body) {
      let mut head_terms: Vec<Term> = head_terms.to_vec();
      let mut body = body;
      for term in &mut head_terms {
        self.extract_ranges(term, &mut body, loc);
      }

      let mut cells = Cells::default();
      let simple = simple_literals(&body);
      let lits = self.lower_body(&body, &mut cells, &simple, loc)?;
      let mut heads = Vec::with_capacity(head_terms.len());
      for term in head_terms {
        let mut term = term;
        term.share_vars(&mut cells);
        let dom = self.pred_dom(&term, loc)?;
        heads.push(HeadDef { repr: term, dom });
      }
      self.stmts.push(Statement::new(StatementKind::Rule { choice, heads }, lits, loc.clone()));
    }
    Ok(())
  }

  // region Body lowering

  /// Lowers IR body literals into ground-side literals, synthesizing the statement networks for aggregates,
  /// conditional literals, and theory atoms. `simple` is the rule's simple-literal context used to ground the
  /// global bindings of synthesized accumulators.
  fn lower_body(
    &mut self,
    body: &[BodyLiteral],
    cells: &mut Cells,
    simple: &[BodyLiteral],
    _loc: &Location,
  ) -> Result<Vec<Literal>, GroundError> {
    let outer = outer_vars(body, simple);
    let mut lits = Vec::with_capacity(body.len());
    for lit in body {
      match lit {
        BodyLiteral::Pred { naf, atom, loc } => {
          let mut atom = atom.clone();
          atom.share_vars(cells);
          let dom = self.pred_dom(&atom, loc)?;
          lits.push(Literal::Pred(PredicateLiteral::new(
            dom,
            *naf,
            atom,
            AtomKind::Predicate,
            false,
            loc.clone(),
          )));
        }

        BodyLiteral::Relation { rel, lhs, rhs, loc } => {
          let mut lhs = lhs.clone();
          let mut rhs = rhs.clone();
          lhs.share_vars(cells);
          rhs.share_vars(cells);
          lits.push(Literal::Relation(RelationLiteral { rel: *rel, lhs, rhs, loc: loc.clone() }));
        }

        BodyLiteral::Range { assign, lhs, rhs, loc } => {
          let mut assign = assign.clone();
          let mut lhs = lhs.clone();
          let mut rhs = rhs.clone();
          assign.share_vars(cells);
          lhs.share_vars(cells);
          rhs.share_vars(cells);
          lits.push(Literal::Range(RangeLiteral { assign, left: lhs, right: rhs, loc: loc.clone() }));
        }

        BodyLiteral::Script { assign, name, args, loc } => {
          let mut assign = assign.clone();
          assign.share_vars(cells);
          let args = args
              .iter()
              .map(|a| {
                let mut a = a.clone();
                a.share_vars(cells);
                a
              })
              .collect();
          lits.push(Literal::Script(ScriptLiteral { assign, name: name.clone(), args, loc: loc.clone() }));
        }

        BodyLiteral::Aggregate { naf, fun, bounds, elements, loc } => {
          lits.push(self.build_body_aggregate(*naf, *fun, bounds, elements, &outer, cells, loc)?);
        }

        BodyLiteral::Conditional { naf, atom, cond, loc } => {
          lits.push(self.build_conjunction(*naf, atom, cond, simple, &outer, cells, loc)?);
        }

        BodyLiteral::Theory { naf, atom, loc } => {
          let repr = self.build_theory_atom(atom, simple, loc)?;
          let mut rule_repr = repr.term.clone();
          rule_repr.share_vars(cells);
          lits.push(Literal::Pred(PredicateLiteral::new(
            repr.dom,
            *naf,
            rule_repr,
            AtomKind::Theory,
            false,
            loc.clone(),
          )));
        }
      }
    }
    Ok(lits)
  }

  /// Conditions of synthesized statements contain simple literals only.
  fn lower_simple_body(
    &mut self,
    body: &[BodyLiteral],
    cells: &mut Cells,
    loc: &Location,
  ) -> Result<Vec<Literal>, GroundError> {
    for lit in body {
      if matches!(
        lit,
        BodyLiteral::Aggregate { .. } | BodyLiteral::Conditional { .. } | BodyLiteral::Theory { .. }
      ) {
        return Err(GroundError::Semantic {
          loc: lit.loc().clone(),
          message: "nested aggregates are not supported".to_string(),
        });
      }
    }
    self.lower_body(body, cells, &[], loc)
  }

  fn build_body_aggregate(
    &mut self,
    naf: Naf,
    fun: AggregateFunction,
    bounds: &[crate::api::program::AggregateBound],
    elements: &[crate::api::program::AggregateElement],
    outer: &Set<IString>,
    rule_cells: &mut Cells,
    loc: &Location,
  ) -> Result<Literal, GroundError> {
    let dom = self.doms.add_domain(DomainData::BodyAggregate(Vec::new()));
    let k = self.next_aux();

    // Global variables: guard variables plus element variables shared with the enclosing rule.
    let mut globals: Vec<IString> = Vec::new();
    for bound in bounds {
      collect_names(&bound.term, &mut globals);
    }
    for element in elements {
      let mut names = Vec::new();
      for term in &element.tuple {
        collect_names(term, &mut names);
      }
      for cond in &element.cond {
        collect_body_names(cond, &mut names);
      }
      globals.extend(names.into_iter().filter(|n| outer.contains(n)));
    }
    sort_names(&mut globals);

    let repr_ir = synth_repr("#aggr", k, &globals);
    let bound_pairs: Vec<(Rel, Term)> = bounds.iter().map(|b| (b.rel, b.term.clone())).collect();
    let monotone = crate::core::statement::body_aggregate::monotone(fun, &bound_pairs);

    let complete = self.stmts.len() as StmId;
    self.stmts.push(Statement::new(
      StatementKind::BodyAggrComplete { dom, output_recursive: std::cell::Cell::new(false) },
      Vec::new(),
      loc.clone(),
    ));

    for element in elements {
      let mut element_cells = Cells::default();
      let lits = self.lower_simple_body(&element.cond, &mut element_cells, loc)?;
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut element_cells);
      let bounds = bound_pairs
          .iter()
          .map(|(rel, term)| {
            let mut term = term.clone();
            term.share_vars(&mut element_cells);
            (*rel, term)
          })
          .collect();
      let tuple = element
          .tuple
          .iter()
          .map(|t| {
            let mut t = t.clone();
            t.share_vars(&mut element_cells);
            t
          })
          .collect();
      let mut stmt = Statement::new(
        StatementKind::BodyAggrAccumulate { dom, repr, fun, bounds, monotone, tuple },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    let mut rule_repr = repr_ir;
    rule_repr.share_vars(rule_cells);
    Ok(Literal::Pred(PredicateLiteral::new(
      dom,
      naf,
      rule_repr,
      AtomKind::BodyAggregate,
      false,
      loc.clone(),
    )))
  }

  #[allow(clippy::too_many_arguments)]
  fn build_conjunction(
    &mut self,
    naf: Naf,
    atom: &Term,
    cond: &[BodyLiteral],
    others: &[BodyLiteral],
    outer: &Set<IString>,
    rule_cells: &mut Cells,
    loc: &Location,
  ) -> Result<Literal, GroundError> {
    let dom = self.doms.add_domain(DomainData::Conjunction(Vec::new()));
    let empty_dom = self.doms.add_domain(DomainData::Predicate);
    let cond_dom = self.doms.add_domain(DomainData::Predicate);
    let k = self.next_aux();

    let mut element_names = Vec::new();
    collect_names(atom, &mut element_names);
    for c in cond {
      collect_body_names(c, &mut element_names);
    }
    let mut globals: Vec<IString> = element_names.iter().filter(|n| outer.contains(*n)).cloned().collect();
    sort_names(&mut globals);
    let mut locals: Vec<IString> = element_names.into_iter().filter(|n| !outer.contains(n)).collect();
    sort_names(&mut locals);

    let repr_ir = synth_repr("#conj", k, &globals);
    let empty_repr_ir = synth_repr("#conj_empty", k, &globals);
    let mut cond_args = globals.clone();
    cond_args.extend(locals.iter().cloned());
    let cond_repr_ir = synth_repr("#conj_cond", k, &cond_args);
    let local_ir = Term::Tuple(locals.iter().map(|n| Term::var(n.clone())).collect());

    let complete = self.stmts.len() as StmId;
    self.stmts.push(Statement::new(
      StatementKind::ConjComplete {
        dom,
        cond_recursive: std::cell::Cell::new(false),
        head_recursive: std::cell::Cell::new(false),
      },
      Vec::new(),
      loc.clone(),
    ));

    // Empty: grounds the global context.
    {
      let mut empty_cells = Cells::default();
      let lits = self.lower_simple_body(others, &mut empty_cells, loc)?;
      let mut repr = repr_ir.clone();
      let mut empty_repr = empty_repr_ir.clone();
      repr.share_vars(&mut empty_cells);
      empty_repr.share_vars(&mut empty_cells);
      let mut stmt = Statement::new(
        StatementKind::ConjAccumulateEmpty { dom, repr, empty_dom, empty_repr },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    // Cond: grounds one condition instance.
    {
      let mut cond_cells = Cells::default();
      let mut empty_repr = empty_repr_ir.clone();
      empty_repr.share_vars(&mut cond_cells);
      let aux = Literal::Pred(PredicateLiteral::new(
        empty_dom,
        Naf::Pos,
        empty_repr,
        AtomKind::Predicate,
        true,
        loc.clone(),
      ));
      let mut lits = vec![aux];
      lits.extend(self.lower_simple_body(cond, &mut cond_cells, loc)?);
      let mut repr = repr_ir.clone();
      let mut cond_repr = cond_repr_ir.clone();
      let mut local = local_ir.clone();
      repr.share_vars(&mut cond_cells);
      cond_repr.share_vars(&mut cond_cells);
      local.share_vars(&mut cond_cells);
      let mut stmt = Statement::new(
        StatementKind::ConjAccumulateCond { dom, repr, cond_dom, cond_repr, local },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    // Head: grounds one head derivation per condition instance.
    {
      let mut head_cells = Cells::default();
      let mut cond_repr = cond_repr_ir.clone();
      cond_repr.share_vars(&mut head_cells);
      let aux = Literal::Pred(PredicateLiteral::new(
        cond_dom,
        Naf::Pos,
        cond_repr,
        AtomKind::Predicate,
        true,
        loc.clone(),
      ));
      let mut head_atom = atom.clone();
      head_atom.share_vars(&mut head_cells);
      let head_dom = self.pred_dom(&head_atom, loc)?;
      let head_lit = Literal::Pred(PredicateLiteral::new(
        head_dom,
        naf,
        head_atom,
        AtomKind::Predicate,
        false,
        loc.clone(),
      ));
      let lits = vec![aux, head_lit];
      let mut repr = repr_ir.clone();
      let mut local = local_ir.clone();
      repr.share_vars(&mut head_cells);
      local.share_vars(&mut head_cells);
      let mut stmt = Statement::new(StatementKind::ConjAccumulateHead { dom, repr, local }, lits, loc.clone());
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    let mut rule_repr = repr_ir;
    rule_repr.share_vars(rule_cells);
    Ok(Literal::Pred(PredicateLiteral::new(
      dom,
      Naf::Pos,
      rule_repr,
      AtomKind::Conjunction,
      false,
      loc.clone(),
    )))
  }

  fn build_cond_disjunction(
    &mut self,
    elements: &[CondHead],
    body: &[BodyLiteral],
    loc: &Location,
  ) -> Result<(), GroundError> {
    let dom = self.doms.add_domain(DomainData::Disjunction(Vec::new()));
    let k = self.next_aux();

    let outer = outer_vars(body, &[]);
    let mut globals: Vec<IString> = Vec::new();
    for element in elements {
      let mut names = Vec::new();
      collect_names(&element.atom, &mut names);
      for c in &element.cond {
        collect_body_names(c, &mut names);
      }
      globals.extend(names.into_iter().filter(|n| outer.contains(n)));
    }
    sort_names(&mut globals);
    let repr_ir = synth_repr("#disj", k, &globals);

    let complete = self.stmts.len() as StmId;
    self.stmts.push(Statement::new(StatementKind::DisjComplete { dom }, Vec::new(), loc.clone()));

    // The enclosing rule: records one body per assignment.
    {
      let mut cells = Cells::default();
      let simple = simple_literals(body);
      let lits = self.lower_body(body, &mut cells, &simple, loc)?;
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut cells);
      let mut stmt = Statement::new(StatementKind::DisjRule { dom, repr }, lits, loc.clone());
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    for element in elements {
      let mut element_cells = Cells::default();
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut element_cells);
      let aux = Literal::Pred(PredicateLiteral::new(
        dom,
        Naf::Pos,
        repr.clone(),
        AtomKind::Predicate,
        true,
        loc.clone(),
      ));
      let mut lits = vec![aux];
      lits.extend(self.lower_simple_body(&element.cond, &mut element_cells, loc)?);
      let mut head_atom = element.atom.clone();
      head_atom.share_vars(&mut element_cells);
      let head_dom = self.pred_dom(&head_atom, loc)?;
      self.stmts[complete as usize].head_doms.push(head_dom);
      let mut stmt = Statement::new(
        StatementKind::DisjAccumulate { dom, repr, head: Some(HeadDef { repr: head_atom, dom: head_dom }) },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }
    Ok(())
  }

  fn build_head_aggregate(
    &mut self,
    fun: AggregateFunction,
    bounds: &[crate::api::program::AggregateBound],
    elements: &[HeadAggregateElement],
    body: &[BodyLiteral],
    loc: &Location,
  ) -> Result<(), GroundError> {
    let dom = self.doms.add_domain(DomainData::HeadAggregate(Vec::new()));
    let k = self.next_aux();

    let outer = outer_vars(body, &[]);
    let mut globals: Vec<IString> = Vec::new();
    for bound in bounds {
      collect_names(&bound.term, &mut globals);
    }
    for element in elements {
      let mut names = Vec::new();
      for term in &element.tuple {
        collect_names(term, &mut names);
      }
      collect_names(&element.atom, &mut names);
      for c in &element.cond {
        collect_body_names(c, &mut names);
      }
      globals.extend(names.into_iter().filter(|n| outer.contains(n)));
    }
    sort_names(&mut globals);
    let repr_ir = synth_repr("#hagg", k, &globals);
    let bound_pairs: Vec<(Rel, Term)> = bounds.iter().map(|b| (b.rel, b.term.clone())).collect();

    let complete = self.stmts.len() as StmId;
    self.stmts.push(Statement::new(StatementKind::HeadAggrComplete { dom }, Vec::new(), loc.clone()));

    {
      let mut cells = Cells::default();
      let simple = simple_literals(body);
      let lits = self.lower_body(body, &mut cells, &simple, loc)?;
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut cells);
      let bounds = bound_pairs
          .iter()
          .map(|(rel, term)| {
            let mut term = term.clone();
            term.share_vars(&mut cells);
            (*rel, term)
          })
          .collect();
      let mut stmt = Statement::new(StatementKind::HeadAggrRule { dom, repr, fun, bounds }, lits, loc.clone());
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    for element in elements {
      let mut element_cells = Cells::default();
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut element_cells);
      let aux = Literal::Pred(PredicateLiteral::new(
        dom,
        Naf::Pos,
        repr.clone(),
        AtomKind::Predicate,
        true,
        loc.clone(),
      ));
      let mut lits = vec![aux];
      lits.extend(self.lower_simple_body(&element.cond, &mut element_cells, loc)?);
      let tuple = element
          .tuple
          .iter()
          .map(|t| {
            let mut t = t.clone();
            t.share_vars(&mut element_cells);
            t
          })
          .collect();
      let mut head_atom = element.atom.clone();
      head_atom.share_vars(&mut element_cells);
      let head_dom = self.pred_dom(&head_atom, loc)?;
      self.stmts[complete as usize].head_doms.push(head_dom);
      let mut stmt = Statement::new(
        StatementKind::HeadAggrAccumulate {
          dom,
          repr,
          fun,
          tuple,
          atom: Some(HeadDef { repr: head_atom, dom: head_dom }),
        },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }
    Ok(())
  }

  fn build_theory_atom(
    &mut self,
    theory: &TheoryAtom,
    simple: &[BodyLiteral],
    loc: &Location,
  ) -> Result<TheoryRepr, GroundError> {
    let dom = self.doms.add_domain(DomainData::Theory(Vec::new()));
    let inst_dom = self.doms.add_domain(DomainData::Predicate);
    let k = self.next_aux();

    let mut globals = Vec::new();
    collect_names(&theory.atom, &mut globals);
    if let Some((_, guard)) = &theory.guard {
      collect_names(guard, &mut globals);
    }
    sort_names(&mut globals);
    let repr_ir = synth_repr("#thy", k, &globals);
    let inst_repr_ir = synth_repr("#thy_inst", k, &globals);

    let complete = self.stmts.len() as StmId;
    self.stmts.push(Statement::new(StatementKind::TheoryComplete { dom }, Vec::new(), loc.clone()));

    {
      let mut atom_cells = Cells::default();
      let lits = self.lower_simple_body(simple, &mut atom_cells, loc)?;
      let mut repr = repr_ir.clone();
      let mut inst_repr = inst_repr_ir.clone();
      let mut atom = theory.atom.clone();
      repr.share_vars(&mut atom_cells);
      inst_repr.share_vars(&mut atom_cells);
      atom.share_vars(&mut atom_cells);
      let guard = theory.guard.as_ref().map(|(op, term)| {
        let mut term = term.clone();
        term.share_vars(&mut atom_cells);
        (op.clone(), term)
      });
      let mut stmt = Statement::new(
        StatementKind::TheoryAtomAccumulate { dom, repr, inst_dom, inst_repr, atom, guard },
        lits,
        loc.clone(),
      );
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    for element in &theory.elements {
      let mut element_cells = Cells::default();
      let mut inst_repr = inst_repr_ir.clone();
      inst_repr.share_vars(&mut element_cells);
      let aux = Literal::Pred(PredicateLiteral::new(
        inst_dom,
        Naf::Pos,
        inst_repr,
        AtomKind::Predicate,
        true,
        loc.clone(),
      ));
      let mut lits = vec![aux];
      lits.extend(self.lower_simple_body(&element.cond, &mut element_cells, loc)?);
      let mut repr = repr_ir.clone();
      repr.share_vars(&mut element_cells);
      let tuple = element
          .tuple
          .iter()
          .map(|t| {
            let mut t = t.clone();
            t.share_vars(&mut element_cells);
            t
          })
          .collect();
      let mut stmt = Statement::new(StatementKind::TheoryElemAccumulate { dom, repr, tuple }, lits, loc.clone());
      stmt.complete = Some(complete);
      self.stmts.push(stmt);
    }

    Ok(TheoryRepr { term: repr_ir, dom })
  }

  // endregion Body lowering

  fn next_aux(&mut self) -> u32 {
    let k = self.aux;
    self.aux += 1;
    k
  }

  /// The predicate domain of an atom term.
  fn pred_dom(&mut self, atom: &Term, loc: &Location) -> Result<DomId, GroundError> {
    match term_sig(atom) {
      Some(sig) => Ok(self.doms.add_sig(sig)),
      None => Err(GroundError::Semantic {
        loc: loc.clone(),
        message: format!("expected atom, got: {}", atom),
      }),
    }
  }

  /// Replaces interval subterms with fresh variables bound by range literals, so heads like `p(1..3)` ground
  /// through the ordinary body machinery.
  fn extract_ranges(&mut self, term: &mut Term, body: &mut Vec<BodyLiteral>, loc: &Location) {
    match term {
      Term::Range(lhs, rhs) => {
        let name = IString::from(format!("#Range{}", self.range).as_str());
        self.range += 1;
        body.push(BodyLiteral::Range {
          assign: Term::var(name.clone()),
          lhs: (**lhs).clone(),
          rhs: (**rhs).clone(),
          loc: loc.clone(),
        });
        *term = Term::var(name);
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          self.extract_ranges(arg, body, loc);
        }
      }
      _ => {}
    }
  }
}

struct TheoryRepr {
  term: Term,
  dom : DomId,
}

/// The signature of an atom term.
fn term_sig(term: &Term) -> Option<Sig> {
  match term {
    Term::Fun { name, args, neg } => Some(Sig::new(name.clone(), args.len() as u32, *neg)),
    Term::Val(sym) if sym.has_sig() => Some(sym.sig()),
    _ => None,
  }
}

/// The simple literals of a body: everything that is not an aggregate, conditional, or theory occurrence.
fn simple_literals(body: &[BodyLiteral]) -> Vec<BodyLiteral> {
  body
      .iter()
      .filter(|lit| {
        !matches!(
          lit,
          BodyLiteral::Aggregate { .. } | BodyLiteral::Conditional { .. } | BodyLiteral::Theory { .. }
        )
      })
      .cloned()
      .collect()
}

fn collect_names(term: &Term, out: &mut Vec<IString>) {
  let mut vars = VarBoundVec::new();
  term.collect_vars(&mut vars, false);
  out.extend(vars.into_iter().map(|(name, _)| name));
}

fn collect_body_names(lit: &BodyLiteral, out: &mut Vec<IString>) {
  match lit {
    BodyLiteral::Pred { atom, .. } => collect_names(atom, out),
    BodyLiteral::Relation { lhs, rhs, .. } => {
      collect_names(lhs, out);
      collect_names(rhs, out);
    }
    BodyLiteral::Range { assign, lhs, rhs, .. } => {
      collect_names(assign, out);
      collect_names(lhs, out);
      collect_names(rhs, out);
    }
    BodyLiteral::Script { assign, args, .. } => {
      collect_names(assign, out);
      for arg in args {
        collect_names(arg, out);
      }
    }
    BodyLiteral::Aggregate { bounds, .. } => {
      for bound in bounds {
        collect_names(&bound.term, out);
      }
    }
    BodyLiteral::Conditional { .. } => {}
    BodyLiteral::Theory { atom, .. } => {
      collect_names(&atom.atom, out);
      if let Some((_, guard)) = &atom.guard {
        collect_names(guard, out);
      }
    }
  }
}

fn sort_names(names: &mut Vec<IString>) {
  names.sort_by(|a, b| istr(a).cmp(istr(b)));
  names.dedup();
}

/// The variables a synthesized element can import from the enclosing rule: head and simple-literal variables plus
/// the exported (guard-level) variables of the structured literals.
fn outer_vars(body: &[BodyLiteral], simple: &[BodyLiteral]) -> Set<IString> {
  let mut names = Vec::new();
  for lit in body {
    collect_body_names(lit, &mut names);
  }
  for lit in simple {
    collect_body_names(lit, &mut names);
  }
  names.into_iter().collect()
}

/// A synthesized atom representation: `name(k, (v₁,…,vₙ))`.
fn synth_repr(name: &str, k: u32, vars: &[IString]) -> Term {
  Term::fun(
    name,
    vec![
      Term::Val(Symbol::create_num(k as i32)),
      Term::Tuple(vars.iter().map(|v| Term::var(v.clone())).collect()),
    ],
  )
}

/// Expands pools in body predicate atoms into the cross product of rule instances.
fn expand_body_pools(body: &[BodyLiteral]) -> Vec<Vec<BodyLiteral>> {
  let mut rows: Vec<Vec<BodyLiteral>> = vec![Vec::new()];
  for lit in body {
    let choices: Vec<BodyLiteral> = match lit {
      BodyLiteral::Pred { naf, atom, loc } => atom
          .unpool()
          .into_iter()
          .map(|atom| BodyLiteral::Pred { naf: *naf, atom, loc: loc.clone() })
          .collect(),
      other => vec![other.clone()],
    };
    let mut next = Vec::with_capacity(rows.len() * choices.len());
    for row in &rows {
      for choice in &choices {
        let mut row = row.clone();
        row.push(choice.clone());
        next.push(row);
      }
    }
    rows = next;
  }
  rows
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    api::{
      context::{ExternalError, NullContext, SymbolicAtomsView},
      program::{AggregateBound, AggregateElement},
      symbol::SymbolVec,
    },
    output::backend::RecordingBackend,
  };

  fn loc() -> Location {
    Location::internal("test")
  }

  fn num(n: i32) -> Term {
    Term::Val(Symbol::create_num(n))
  }

  fn atom(name: &str, args: Vec<Term>) -> Term {
    Term::fun(name, args)
  }

  fn pos(name: &str, args: Vec<Term>) -> BodyLiteral {
    BodyLiteral::Pred { naf: Naf::Pos, atom: atom(name, args), loc: loc() }
  }

  fn neg(name: &str, args: Vec<Term>) -> BodyLiteral {
    BodyLiteral::Pred { naf: Naf::Not, atom: atom(name, args), loc: loc() }
  }

  fn fact(name: &str, args: Vec<Term>) -> Stm {
    rule(atom(name, args), vec![])
  }

  fn rule(head: Term, body: Vec<BodyLiteral>) -> Stm {
    Stm::Rule { head: Head::Simple(head), body, loc: loc() }
  }

  fn ground(program: &Program) -> Vec<String> {
    ground_with(program, GroundConfig::default()).0
  }

  fn ground_with(program: &Program, config: GroundConfig) -> (Vec<String>, bool) {
    let mut grounder = Grounder::new(config, RecordingBackend::new());
    grounder.ground(program, &NullContext).expect("grounding failed");
    let has_error = grounder.has_error();
    (grounder.into_backend().calls, has_error)
  }

  fn reach_program(edges: &[(i32, i32)]) -> Program {
    let mut program = Program::new();
    for &(a, b) in edges {
      program.push(fact("edge", vec![num(a), num(b)]));
    }
    program.push(rule(atom("reach", vec![Term::var("X")]), vec![pos("edge", vec![num(1), Term::var("X")])]));
    program.push(rule(
      atom("reach", vec![Term::var("Y")]),
      vec![
        pos("reach", vec![Term::var("X")]),
        pos("edge", vec![Term::var("X"), Term::var("Y")]),
      ],
    ));
    program
  }

  #[test]
  fn s1_simple_recursion() {
    let calls = ground(&reach_program(&[(1, 2), (2, 3), (3, 4)]));
    assert_eq!(
      calls,
      vec![
        "init(false)",
        "begin_step",
        "rule(false,{2},{})", // edge(1,2)
        "rule(false,{3},{})", // edge(2,3)
        "rule(false,{4},{})", // edge(3,4)
        "rule(false,{5},{})", // reach(2), fact because edge(1,2) is
        "rule(false,{6},{})", // reach(3), derived in the next phase
        "rule(false,{7},{})", // reach(4)
        "end_step",
      ]
    );
  }

  #[test]
  fn s2_choice_with_count_aggregate() {
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Choice(vec![
        CondHead { atom: atom("p", vec![num(1)]), cond: vec![] },
        CondHead { atom: atom("p", vec![num(2)]), cond: vec![] },
        CondHead { atom: atom("p", vec![num(3)]), cond: vec![] },
      ]),
      body: vec![],
      loc: loc(),
    });
    program.push(Stm::Rule {
      head: Head::Simple(atom("q", vec![])),
      body: vec![BodyLiteral::Aggregate {
        naf: Naf::Pos,
        fun: AggregateFunction::Count,
        bounds: vec![AggregateBound { rel: Rel::Geq, term: num(2) }],
        elements: vec![AggregateElement {
          tuple: vec![Term::var("X")],
          cond: vec![pos("p", vec![Term::var("X")])],
        }],
        loc: loc(),
      }],
      loc: loc(),
    });

    let calls = ground(&program);
    assert_eq!(
      calls,
      vec![
        "init(false)",
        "begin_step",
        "rule(true,{2},{})", // {p(1)}
        "rule(true,{3},{})", // {p(2)}
        "rule(true,{4},{})", // {p(3)}
        "weight_rule(false,{7},2,{2=1,3=1,4=1})",
        "rule(false,{6},{7})", // the aggregate atom
        "rule(false,{5},{6})", // q
        "end_step",
      ]
    );
  }

  #[test]
  fn s3_arithmetic_error_drops_matches() {
    // p(X) :- X = 1..3, q(X/0).
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Simple(atom("p", vec![Term::var("X")])),
      body: vec![
        BodyLiteral::Range { assign: Term::var("X"), lhs: num(1), rhs: num(3), loc: loc() },
        pos(
          "q",
          vec![Term::BinOp(crate::api::term::BinOp::Div, Box::new(Term::var("X")), Box::new(num(0)))],
        ),
      ],
      loc: loc(),
    });
    let calls = ground(&program);
    assert_eq!(calls, vec!["init(false)", "begin_step", "end_step"]);
  }

  #[test]
  fn s4_externals() {
    let mut program = Program::new();
    program.push(Stm::External {
      atom: atom("p", vec![Term::Range(Box::new(num(1)), Box::new(num(2)))]),
      body: vec![],
      value: atom("free", vec![]),
      loc: loc(),
    });
    program.push(rule(
      atom("q", vec![]),
      vec![pos("p", vec![num(1)]), neg("p", vec![num(2)])],
    ));
    let calls = ground(&program);
    assert_eq!(
      calls,
      vec![
        "init(false)",
        "begin_step",
        "external(2,Free)",
        "external(3,Free)",
        "rule(false,{4},{2,-3})",
        "end_step",
      ]
    );
  }

  #[test]
  fn s5_unsafe_rule_is_fatal_for_the_rule_only() {
    let mut program = Program::new();
    program.push(fact("q", vec![num(1)]));
    // p(X) :- q(Y). X is unsafe.
    program.push(rule(
      atom("p", vec![Term::var("X")]),
      vec![pos("q", vec![Term::var("Y")])],
    ));
    program.push(rule(atom("r", vec![]), vec![pos("q", vec![num(1)])]));

    let (calls, has_error) = ground_with(&program, GroundConfig::default());
    assert!(has_error);
    // The other rules still ground: q(1) and r are facts.
    assert_eq!(
      calls,
      vec!["init(false)", "begin_step", "rule(false,{2},{})", "rule(false,{3},{})", "end_step"]
    );
  }

  #[test]
  fn s6_disjunctive_head() {
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Disjunction(vec![
        CondHead { atom: atom("a", vec![]), cond: vec![] },
        CondHead { atom: atom("b", vec![]), cond: vec![] },
      ]),
      body: vec![pos("c", vec![])],
      loc: loc(),
    });
    program.push(fact("c", vec![]));

    let config = GroundConfig { preserve_facts: true, ..GroundConfig::default() };
    let (calls, _) = ground_with(&program, config);
    assert_eq!(
      calls,
      vec![
        "init(false)",
        "begin_step",
        "rule(false,{2},{})",   // c
        "rule(false,{3,4},{2})", // a ; b :- c, body kept because preserve_facts
        "end_step",
      ]
    );
  }

  #[test]
  fn empty_domain_recursion_terminates() {
    let mut program = Program::new();
    program.push(rule(
      atom("reach", vec![Term::var("Y")]),
      vec![
        pos("reach", vec![Term::var("X")]),
        pos("edge", vec![Term::var("X"), Term::var("Y")]),
      ],
    ));
    let calls = ground(&program);
    assert_eq!(calls, vec!["init(false)", "begin_step", "end_step"]);
  }

  #[test]
  fn stratified_negation_on_defined_atom() {
    // p :- not q. q. -- q is a fact, so p is never derivable and nothing but q is emitted.
    let mut program = Program::new();
    program.push(rule(atom("p", vec![]), vec![neg("q", vec![])]));
    program.push(fact("q", vec![]));
    let calls = ground(&program);
    assert_eq!(calls, vec!["init(false)", "begin_step", "rule(false,{2},{})", "end_step"]);
  }

  #[test]
  fn conjunction_of_facts_is_fact() {
    // q :- p(X) : d(X).
    let mut program = Program::new();
    program.push(fact("d", vec![num(1)]));
    program.push(fact("d", vec![num(2)]));
    program.push(fact("p", vec![num(1)]));
    program.push(fact("p", vec![num(2)]));
    program.push(Stm::Rule {
      head: Head::Simple(atom("q", vec![])),
      body: vec![BodyLiteral::Conditional {
        naf: Naf::Pos,
        atom: atom("p", vec![Term::var("X")]),
        cond: vec![pos("d", vec![Term::var("X")])],
        loc: loc(),
      }],
      loc: loc(),
    });
    let calls = ground(&program);
    // Four facts plus q, itself a fact.
    let rules: Vec<_> = calls.iter().filter(|c| c.starts_with("rule")).collect();
    assert_eq!(rules.len(), 5);
    assert!(rules.iter().all(|c| c.ends_with(",{})")));
  }

  #[test]
  fn head_aggregate_bounds() {
    // 1 {a; b} 1.
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Aggregate {
        fun: AggregateFunction::Count,
        bounds: vec![
          AggregateBound { rel: Rel::Geq, term: num(1) },
          AggregateBound { rel: Rel::Leq, term: num(1) },
        ],
        elements: vec![
          HeadAggregateElement { tuple: vec![], atom: atom("a", vec![]), cond: vec![] },
          HeadAggregateElement { tuple: vec![], atom: atom("b", vec![]), cond: vec![] },
        ],
      },
      body: vec![],
      loc: loc(),
    });
    let calls = ground(&program);
    let choices: Vec<_> = calls.iter().filter(|c| c.starts_with("rule(true")).collect();
    assert_eq!(choices.len(), 2);
    let weight_rules: Vec<_> = calls.iter().filter(|c| c.starts_with("weight_rule")).collect();
    assert_eq!(weight_rules.len(), 2);
    // The bound-enforcing integrity constraint has an empty head.
    assert!(calls.iter().any(|c| c.starts_with("rule(false,{},")));
  }

  #[test]
  fn min_aggregate_translation() {
    // {p(1); p(2)}. w :- #min{ X : p(X) } <= 1.
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Choice(vec![
        CondHead { atom: atom("p", vec![num(1)]), cond: vec![] },
        CondHead { atom: atom("p", vec![num(2)]), cond: vec![] },
      ]),
      body: vec![],
      loc: loc(),
    });
    program.push(Stm::Rule {
      head: Head::Simple(atom("w", vec![])),
      body: vec![BodyLiteral::Aggregate {
        naf: Naf::Pos,
        fun: AggregateFunction::Min,
        bounds: vec![AggregateBound { rel: Rel::Leq, term: num(1) }],
        elements: vec![AggregateElement {
          tuple: vec![Term::var("X")],
          cond: vec![pos("p", vec![Term::var("X")])],
        }],
        loc: loc(),
      }],
      loc: loc(),
    });
    let calls = ground(&program);
    // No weight rules for #min; the witness chain is p(1) alone (weight 2 exceeds the bound).
    assert!(!calls.iter().any(|c| c.starts_with("weight_rule")));
    assert!(calls.contains(&"rule(false,{6},{2})".to_string())); // witness :- p(1)
    assert!(calls.contains(&"rule(false,{5},{6})".to_string())); // aggregate :- witness
    assert!(calls.contains(&"rule(false,{4},{5})".to_string())); // w :- aggregate
  }

  #[test]
  fn sum_with_negative_weights_normalizes() {
    // {p(-1); p(1)}. v :- #sum{ X : p(X) } >= 0.
    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Choice(vec![
        CondHead { atom: atom("p", vec![num(-1)]), cond: vec![] },
        CondHead { atom: atom("p", vec![num(1)]), cond: vec![] },
      ]),
      body: vec![],
      loc: loc(),
    });
    program.push(Stm::Rule {
      head: Head::Simple(atom("v", vec![])),
      body: vec![BodyLiteral::Aggregate {
        naf: Naf::Pos,
        fun: AggregateFunction::Sum,
        bounds: vec![AggregateBound { rel: Rel::Geq, term: num(0) }],
        elements: vec![AggregateElement {
          tuple: vec![Term::var("X")],
          cond: vec![pos("p", vec![Term::var("X")])],
        }],
        loc: loc(),
      }],
      loc: loc(),
    });
    let calls = ground(&program);
    // p(-1) is atom 2; its weight -1 flips onto the negated literal, raising the bound to 1.
    assert!(calls.contains(&"weight_rule(false,{6},1,{-2=1,3=1})".to_string()));
  }

  #[test]
  fn script_literals_iterate_returned_symbols() {
    struct TwoValues;
    impl ExternalContext for TwoValues {
      fn call(
        &self,
        _atoms: &dyn SymbolicAtomsView,
        _loc: &Location,
        name: &IString,
        _args: &[Symbol],
      ) -> Result<SymbolVec, ExternalError> {
        assert_eq!(istr(name), "f");
        Ok(vec![Symbol::create_num(1), Symbol::create_num(2)])
      }
    }

    let mut program = Program::new();
    program.push(Stm::Rule {
      head: Head::Simple(atom("p", vec![Term::var("X")])),
      body: vec![BodyLiteral::Script { assign: Term::var("X"), name: IString::from("f"), args: vec![], loc: loc() }],
      loc: loc(),
    });
    let mut grounder = Grounder::new(GroundConfig::default(), RecordingBackend::new());
    grounder.ground(&program, &TwoValues).unwrap();
    let calls = grounder.into_backend().calls;
    assert_eq!(
      calls,
      vec!["init(false)", "begin_step", "rule(false,{2},{})", "rule(false,{3},{})", "end_step"]
    );
  }

  #[test]
  fn weak_constraints_batch_per_priority() {
    let mut program = Program::new();
    program.push(fact("p", vec![num(1)]));
    program.push(fact("p", vec![num(2)]));
    program.push(Stm::Minimize {
      weight: Term::var("X"),
      priority: num(0),
      tuple: vec![Term::var("X")],
      body: vec![pos("p", vec![Term::var("X")])],
      loc: loc(),
    });
    let calls = ground(&program);
    // Fact conditions collapse to the true atom; both tuples land in one minimize statement.
    let minimize: Vec<_> = calls.iter().filter(|c| c.starts_with("minimize")).collect();
    assert_eq!(minimize.len(), 1);
    assert!(minimize[0].contains("=1") && minimize[0].contains("=2"));
  }

  #[test]
  fn show_statements_emit_symbol_table_entries() {
    let mut program = Program::new();
    program.push(fact("p", vec![num(7)]));
    program.push(Stm::Show {
      term: Term::var("X"),
      body: vec![pos("p", vec![Term::var("X")])],
      loc: loc(),
    });
    let calls = ground(&program);
    assert!(calls.contains(&"output(7,{})".to_string()));
  }

  #[test]
  fn theory_atoms_emit_after_rules() {
    // &diff { 1 : p }. p.
    let mut program = Program::new();
    program.push(fact("p", vec![]));
    program.push(Stm::Rule {
      head: Head::Theory(TheoryAtom {
        atom: atom("diff", vec![]),
        elements: vec![crate::api::program::TheoryElement { tuple: vec![num(1)], cond: vec![pos("p", vec![])] }],
        guard: Some((IString::from("<="), num(5))),
      }),
      body: vec![],
      loc: loc(),
    });
    let calls = ground(&program);
    let rule_pos = calls.iter().position(|c| c.starts_with("rule(false,{3}")).expect("theory head rule");
    let atom_pos = calls.iter().position(|c| c.starts_with("theory_atom")).expect("theory atom");
    assert!(rule_pos < atom_pos);
    assert!(calls.iter().any(|c| c.starts_with("theory_element")));
    assert!(calls.iter().any(|c| c.starts_with("theory_term")));
  }

  #[test]
  fn message_limit_unwinds_the_step() {
    let mut program = Program::new();
    // Two unsafe rules; the first consumes the message budget, the second trips the limit.
    program.push(rule(atom("p", vec![Term::var("X")]), vec![pos("q", vec![Term::var("Y")])]));
    program.push(rule(atom("r", vec![Term::var("X")]), vec![pos("q", vec![Term::var("Y")])]));
    let config = GroundConfig { message_limit: 1, ..GroundConfig::default() };
    let mut grounder = Grounder::new(config, RecordingBackend::new());
    let err = grounder.ground(&program, &NullContext).unwrap_err();
    assert!(matches!(err, GroundError::MessageLimit));
  }

  #[test]
  fn cancellation_aborts_coherently() {
    let mut grounder = Grounder::new(GroundConfig::default(), RecordingBackend::new());
    grounder.cancel_flag().store(true, Ordering::Relaxed);
    let program = reach_program(&[(1, 2)]);
    let err = grounder.ground(&program, &NullContext).unwrap_err();
    assert!(matches!(err, GroundError::Interrupted));
  }

  #[test]
  fn grounding_is_idempotent() {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(42);
    let edges: Vec<(i32, i32)> = (0..12).map(|_| (rng.gen_range(1..=6), rng.gen_range(1..=6))).collect();
    let program = reach_program(&edges);

    let first = ground(&program);
    let second = ground(&program);
    assert_eq!(first, second);

    // The derived reach set is exactly the set of nodes reachable from 1.
    let mut reachable: Set<i32> = Set::default();
    let mut frontier = vec![1];
    while let Some(node) = frontier.pop() {
      for &(a, b) in &edges {
        if a == node && reachable.insert(b) {
          frontier.push(b);
        }
      }
    }
    let mut grounder = Grounder::new(GroundConfig::default(), RecordingBackend::new());
    grounder.ground(&program, &NullContext).unwrap();
    let reach = grounder
        .domains()
        .find_sig(Sig::new("reach", 1, false))
        .expect("reach domain");
    let defined = grounder.domains().get(reach).atoms().filter(|a| a.defined()).count();
    assert_eq!(defined, reachable.len());
  }
}
