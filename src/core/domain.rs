/*!

Ordered, append-only tables of ground atoms, one per signature (plus one per synthesized aggregate, conjunction,
disjunction, or theory construct). A domain owns its atoms: atoms are created by `reserve`/`define`, mutated only
through their home domain, and live for the whole ground run. Deletion happens only through whole-domain `cleanup`
after the solver has proven atoms false.

Beyond the symbol→uid map, a domain maintains:

 - the *definition order*: uids in the order atoms became defined. Atoms can be reserved long before they are
   defined (negative occurrences, aggregate atoms awaiting their complete statement); binders must see them when
   they are defined, not when they were inserted, so all index import and NEW/OLD bookkeeping runs over definition
   order positions ("dids") rather than uids.
 - the NEW window `[gen_begin, gen_end)` over dids. Within a component fixpoint, NEW binders enumerate exactly the
   window, OLD binders everything before it, ALL binders everything up to its end. The scheduler slides the window
   when it pops the domain, which is what makes recursive grounding consider every derivation exactly once.
 - secondary indices: a `FullIndex` streams every defined atom matching its template; a `BindIndex` additionally
   groups them by the values of the template's bound positions, for lookup under a partial assignment. Indices have
   `imported` cursors and are refreshed by `update` calls from binders at pump start.

*/

use enumflags2::{bitflags, BitFlags};

use crate::{
  abstractions::{HashMap, IString},
  api::{
    context::SymbolicAtomsView,
    symbol::{Sig, Symbol, SymbolVec},
    term::{Term, VarCell},
  },
  core::{
    atoms::{
      AggregateAtomState,
      ConjunctionAtomState,
      DisjunctionAtomState,
      HeadAggregateAtomState,
      TheoryAtomState,
    },
    AtomUid,
    BinderType,
    DomId,
    InstId,
    INVALID_UID,
  },
};

#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AtomFlag {
  /// At least one derivation has fired. Never cleared once set.
  Defined,
  /// Forced true irrespective of solver choice.
  Fact,
  /// Declared `#external` and not (yet) defined by a rule.
  External,
  /// Referenced before definition; awaiting downstream resolution.
  Delayed,
  /// Sitting in a complete statement's todo queue.
  Enqueued,
}

pub type AtomFlags = BitFlags<AtomFlag>;

#[derive(Clone, Debug)]
pub struct Atom {
  pub sym  : Symbol,
  pub flags: AtomFlags,
  /// Position in the home domain's definition order; `INVALID_UID` until defined.
  pub did  : u32,
  /// Backend atom id; 0 until the translator assigns one.
  pub backend_uid: u32,
}

impl Atom {
  fn new(sym: Symbol) -> Atom {
    Atom {
      sym,
      flags: AtomFlags::empty(),
      did: INVALID_UID,
      backend_uid: 0,
    }
  }

  #[inline(always)]
  pub fn defined(&self) -> bool {
    self.flags.contains(AtomFlag::Defined)
  }

  #[inline(always)]
  pub fn fact(&self) -> bool {
    self.flags.contains(AtomFlag::Fact)
  }

  #[inline(always)]
  pub fn external(&self) -> bool {
    self.flags.contains(AtomFlag::External)
  }
}

/// Per-kind payload parallel to the atom table.
pub enum DomainData {
  Predicate,
  BodyAggregate(Vec<Option<AggregateAtomState>>),
  HeadAggregate(Vec<HeadAggregateAtomState>),
  Conjunction(Vec<ConjunctionAtomState>),
  Disjunction(Vec<DisjunctionAtomState>),
  Theory(Vec<TheoryAtomState>),
}

impl DomainData {
  fn push_slot(&mut self) {
    match self {
      DomainData::Predicate => {}
      DomainData::BodyAggregate(v) => v.push(None),
      DomainData::HeadAggregate(v) => v.push(Default::default()),
      DomainData::Conjunction(v) => v.push(Default::default()),
      DomainData::Disjunction(v) => v.push(Default::default()),
      DomainData::Theory(v) => v.push(Default::default()),
    }
  }
}

/// An index over every defined atom whose symbol matches a template. Used when no variable of the template is bound
/// by the surrounding assignment.
pub struct FullIndex {
  template: Term,
  /// (did, uid) pairs in import order.
  pub matched: Vec<(u32, AtomUid)>,
  imported: u32,
}

/// An index grouping matching atoms by the values of the template's bound variables, for lookup under a partial
/// assignment. The template is a rename of the literal's: matching an imported atom binds the renamed cells, whose
/// key subset is then evaluated to form the hash key.
pub struct BindIndex {
  template : Term,
  key_names: Vec<IString>,
  key_cells: Vec<VarCell>,
  pub map  : HashMap<SymbolVec, Vec<(u32, AtomUid)>>,
  imported : u32,
}

pub struct Domain {
  pub sig: Option<Sig>,
  atoms  : Vec<Atom>,
  map    : HashMap<Symbol, AtomUid>,
  pub data: DomainData,

  /// Uids in definition order.
  defined_order: Vec<AtomUid>,
  /// NEW window over definition-order positions.
  gen_begin : u32,
  gen_end   : u32,
  generation: u32,
  inc_offset: u32,

  bind_indices: Vec<BindIndex>,
  full_indices: Vec<FullIndex>,

  // Scheduling state.
  pub enqueued  : bool,
  /// Instantiators with a NEW binder over this domain; re-enqueued when the window slides.
  pub dependents: Vec<InstId>,
  /// Accumulation queue for the owning complete statement.
  pub todo: Vec<AtomUid>,
}

impl Domain {
  pub fn new(sig: Option<Sig>, data: DomainData) -> Domain {
    Domain {
      sig,
      atoms: Vec::new(),
      map: HashMap::default(),
      data,
      defined_order: Vec::new(),
      gen_begin: 0,
      gen_end: 0,
      generation: 0,
      inc_offset: 0,
      bind_indices: Vec::new(),
      full_indices: Vec::new(),
      enqueued: false,
      dependents: Vec::new(),
      todo: Vec::new(),
    }
  }

  // region Atom table

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.atoms.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.atoms.is_empty()
  }

  #[inline(always)]
  pub fn atom(&self, uid: AtomUid) -> &Atom {
    &self.atoms[uid as usize]
  }

  #[inline(always)]
  pub fn atom_mut(&mut self, uid: AtomUid) -> &mut Atom {
    &mut self.atoms[uid as usize]
  }

  pub fn atoms(&self) -> impl Iterator<Item = &Atom> {
    self.atoms.iter()
  }

  pub fn find(&self, sym: Symbol) -> Option<AtomUid> {
    self.map.get(&sym).copied()
  }

  /// Idempotent insertion. New atoms start undefined.
  pub fn reserve(&mut self, sym: Symbol) -> (AtomUid, bool) {
    if let Some(&uid) = self.map.get(&sym) {
      return (uid, false);
    }
    let uid = self.atoms.len() as AtomUid;
    self.atoms.push(Atom::new(sym));
    self.data.push_slot();
    self.map.insert(sym, uid);
    (uid, true)
  }

  /// As `reserve`, but also marks the atom defined; may promote it to a fact. Once defined, an atom is never
  /// un-defined, and facts stay facts.
  pub fn define(&mut self, sym: Symbol, fact: bool) -> (AtomUid, bool) {
    let (uid, new) = self.reserve(sym);
    self.define_uid(uid, fact);
    (uid, new)
  }

  /// Marks an existing atom defined.
  pub fn define_uid(&mut self, uid: AtomUid, fact: bool) {
    let did = self.defined_order.len() as u32;
    let atom = &mut self.atoms[uid as usize];
    if !atom.defined() {
      atom.flags.insert(AtomFlag::Defined);
      atom.flags.remove(AtomFlag::Delayed);
      atom.did = did;
      self.defined_order.push(uid);
    }
    if fact {
      self.atoms[uid as usize].flags.insert(AtomFlag::Fact);
    }
  }

  /// Declares an atom `#external`: defined for matching purposes but flagged for the backend.
  pub fn define_external(&mut self, sym: Symbol) -> (AtomUid, bool) {
    let (uid, new) = self.define(sym, false);
    self.atoms[uid as usize].flags.insert(AtomFlag::External);
    (uid, new)
  }

  // endregion Atom table

  // region Generations and windows

  #[inline(always)]
  pub fn generation(&self) -> u32 {
    self.generation
  }

  /// The domain size at the last generation bump; atoms with uid at or above it are new this generation.
  #[inline(always)]
  pub fn inc_offset(&self) -> u32 {
    self.inc_offset
  }

  #[inline(always)]
  pub fn defined_count(&self) -> usize {
    self.defined_order.len()
  }

  /// Is a definition-order position visible to a binder of the given type?
  #[inline(always)]
  pub fn did_visible(&self, binder_type: BinderType, did: u32) -> bool {
    match binder_type {
      BinderType::New => self.gen_begin <= did && did < self.gen_end,
      BinderType::Old => did < self.gen_begin,
      BinderType::All => did < self.gen_end,
    }
  }

  /// Opens the NEW window over everything defined so far. Called when a component starts grounding, so that atoms
  /// defined by earlier components pass through the NEW partition of this component exactly once.
  pub fn open_window(&mut self) {
    self.gen_begin = 0;
    self.gen_end = self.defined_order.len() as u32;
  }

  /// Advances the window past the atoms defined since the last slide. Returns whether anything became NEW.
  pub fn slide_window(&mut self) -> bool {
    let len = self.defined_order.len() as u32;
    if len > self.gen_end {
      self.gen_begin = self.gen_end;
      self.gen_end = len;
      true
    } else {
      false
    }
  }

  /// Closes the current phase: everything becomes old and the generation advances.
  pub fn freeze(&mut self) {
    let len = self.defined_order.len() as u32;
    self.gen_begin = len;
    self.gen_end = len;
    self.generation += 1;
    self.inc_offset = self.atoms.len() as u32;
  }

  /// Finds some defined atom matching the ground evaluation of `sym`, respecting the binder-type partition.
  pub fn lookup(&self, sym: Symbol, binder_type: BinderType) -> Option<AtomUid> {
    let uid = self.find(sym)?;
    let atom = &self.atoms[uid as usize];
    if atom.defined() && self.did_visible(binder_type, atom.did) {
      Some(uid)
    } else {
      None
    }
  }

  // endregion Generations and windows

  // region Secondary indices

  /// Creates (or fetches, when an equal one exists) a full index for the template.
  pub fn add_full_index(&mut self, template: Term) -> usize {
    if let Some(pos) = self.full_indices.iter().position(|idx| idx.template.same_shape(&template)) {
      return pos;
    }
    self.full_indices.push(FullIndex { template, matched: Vec::new(), imported: 0 });
    self.full_indices.len() - 1
  }

  /// Creates (or fetches) a bind index keyed on the given variables of the template.
  pub fn add_bind_index(&mut self, template: Term, key_names: Vec<IString>, key_cells: Vec<VarCell>) -> usize {
    if let Some(pos) = self
        .bind_indices
        .iter()
        .position(|idx| idx.key_names == key_names && idx.template.same_shape(&template))
    {
      return pos;
    }
    self.bind_indices.push(BindIndex {
      template,
      key_names,
      key_cells,
      map: HashMap::default(),
      imported: 0,
    });
    self.bind_indices.len() - 1
  }

  pub fn full_index(&self, idx: usize) -> &FullIndex {
    &self.full_indices[idx]
  }

  pub fn bind_index(&self, idx: usize) -> &BindIndex {
    &self.bind_indices[idx]
  }

  /// Streams atoms defined since the last update into the full index. Returns whether anything was imported.
  pub fn update_full_index(&mut self, idx: usize) -> bool {
    let Domain { atoms, defined_order, full_indices, .. } = self;
    let index = &mut full_indices[idx];
    let mut changed = false;
    while (index.imported as usize) < defined_order.len() {
      let did = index.imported;
      let uid = defined_order[did as usize];
      index.imported += 1;
      if index.template.match_(atoms[uid as usize].sym) {
        index.matched.push((did, uid));
        changed = true;
      }
    }
    changed
  }

  /// Streams atoms defined since the last update into the bind index's hash.
  pub fn update_bind_index(&mut self, idx: usize) -> bool {
    let Domain { atoms, defined_order, bind_indices, .. } = self;
    let index = &mut bind_indices[idx];
    let mut changed = false;
    while (index.imported as usize) < defined_order.len() {
      let did = index.imported;
      let uid = defined_order[did as usize];
      index.imported += 1;
      if index.template.match_(atoms[uid as usize].sym) {
        let key: SymbolVec = index
            .key_cells
            .iter()
            .map(|cell| cell.borrow().expect("index key cell unbound after match"))
            .collect();
        index.map.entry(key).or_default().push((did, uid));
        changed = true;
      }
    }
    changed
  }

  // endregion Secondary indices

  /// Compacts the domain, keeping only atoms `keep` accepts. Indices are reset and will re-import on their next
  /// update. Returns the uid remap table for dependents; dropped atoms map to `INVALID_UID`.
  pub fn cleanup(&mut self, keep: impl Fn(&Atom) -> bool) -> Vec<AtomUid> {
    let old = std::mem::take(&mut self.atoms);
    let mut remap = vec![INVALID_UID; old.len()];
    self.map.clear();
    self.defined_order.clear();
    for (old_uid, mut atom) in old.into_iter().enumerate() {
      if !keep(&atom) {
        continue;
      }
      let uid = self.atoms.len() as AtomUid;
      remap[old_uid] = uid;
      self.map.insert(atom.sym, uid);
      if atom.defined() {
        atom.did = self.defined_order.len() as u32;
        self.defined_order.push(uid);
      }
      self.atoms.push(atom);
    }
    for index in &mut self.full_indices {
      index.matched.clear();
      index.imported = 0;
    }
    for index in &mut self.bind_indices {
      index.map.clear();
      index.imported = 0;
    }
    let len = self.defined_order.len() as u32;
    self.gen_begin = len;
    self.gen_end = len;
    self.inc_offset = self.atoms.len() as u32;
    remap
  }
}

/// The central domain arena. Predicate domains are keyed by signature; synthesized domains (aggregates,
/// conjunctions, disjunctions, theory atoms) get fresh ids without a signature entry.
#[derive(Default)]
pub struct Domains {
  doms  : Vec<Domain>,
  by_sig: HashMap<Sig, DomId>,
}

impl Domains {
  pub fn new() -> Domains {
    Domains::default()
  }

  /// The predicate domain for a signature, created on first use.
  pub fn add_sig(&mut self, sig: Sig) -> DomId {
    if let Some(&dom) = self.by_sig.get(&sig) {
      return dom;
    }
    let dom = self.doms.len() as DomId;
    self.doms.push(Domain::new(Some(sig), DomainData::Predicate));
    self.by_sig.insert(sig, dom);
    dom
  }

  pub fn find_sig(&self, sig: Sig) -> Option<DomId> {
    self.by_sig.get(&sig).copied()
  }

  /// A synthesized domain.
  pub fn add_domain(&mut self, data: DomainData) -> DomId {
    let dom = self.doms.len() as DomId;
    self.doms.push(Domain::new(None, data));
    dom
  }

  #[inline(always)]
  pub fn get(&self, dom: DomId) -> &Domain {
    &self.doms[dom as usize]
  }

  #[inline(always)]
  pub fn get_mut(&mut self, dom: DomId) -> &mut Domain {
    &mut self.doms[dom as usize]
  }

  pub fn len(&self) -> usize {
    self.doms.len()
  }

  pub fn is_empty(&self) -> bool {
    self.doms.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (DomId, &Domain)> {
    self.doms.iter().enumerate().map(|(i, d)| (i as DomId, d))
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = (DomId, &mut Domain)> {
    self.doms.iter_mut().enumerate().map(|(i, d)| (i as DomId, d))
  }
}

impl SymbolicAtomsView for Domains {
  fn signatures(&self) -> Vec<Sig> {
    let mut sigs: Vec<Sig> = self.by_sig.keys().copied().collect();
    sigs.sort();
    sigs
  }

  fn atoms(&self, sig: Sig) -> Vec<(Symbol, bool, bool)> {
    match self.by_sig.get(&sig) {
      Some(&dom) => self.doms[dom as usize]
          .atoms()
          .filter(|a| a.defined())
          .map(|a| (a.sym, a.fact(), a.external()))
          .collect(),
      None => Vec::new(),
    }
  }

  fn contains(&self, sym: Symbol) -> bool {
    if !sym.has_sig() {
      return false;
    }
    match self.by_sig.get(&sym.sig()) {
      Some(&dom) => self.doms[dom as usize].find(sym).is_some(),
      None => false,
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::term::VarSet;

  fn edge(a: i32, b: i32) -> Symbol {
    Symbol::create_fun("edge", vec![Symbol::create_num(a), Symbol::create_num(b)], false)
  }

  fn edge_dom() -> Domain {
    Domain::new(Some(Sig::new("edge", 2, false)), DomainData::Predicate)
  }

  #[test]
  fn uids_follow_insertion_order() {
    let mut dom = edge_dom();
    let (a, new_a) = dom.define(edge(1, 2), true);
    let (b, new_b) = dom.define(edge(2, 3), true);
    assert!(new_a && new_b && a < b);
    // A symbol appears at most once per domain.
    let (a2, new_a2) = dom.reserve(edge(1, 2));
    assert!(!new_a2);
    assert_eq!(a, a2);
    assert!(dom.atom(a).fact());
  }

  #[test]
  fn reserve_then_define_keeps_definition_order() {
    let mut dom = edge_dom();
    let (reserved, _) = dom.reserve(edge(9, 9));
    assert!(!dom.atom(reserved).defined());
    let (defined, _) = dom.define(edge(1, 1), false);
    // The later define comes first in definition order.
    assert_eq!(dom.atom(defined).did, 0);
    dom.define_uid(reserved, false);
    assert_eq!(dom.atom(reserved).did, 1);
    // Defining again does not move it.
    dom.define_uid(reserved, false);
    assert_eq!(dom.atom(reserved).did, 1);
    assert_eq!(dom.defined_count(), 2);
  }

  #[test]
  fn window_partitions() {
    let mut dom = edge_dom();
    dom.define(edge(1, 2), true);
    dom.open_window();
    assert!(dom.did_visible(BinderType::New, 0));
    assert!(!dom.did_visible(BinderType::Old, 0));

    dom.define(edge(2, 3), true);
    // Not yet in any window until the scheduler slides.
    assert!(!dom.did_visible(BinderType::New, 1));
    assert!(!dom.did_visible(BinderType::All, 1));
    assert!(dom.slide_window());
    assert!(dom.did_visible(BinderType::New, 1));
    assert!(dom.did_visible(BinderType::Old, 0));
    assert!(!dom.slide_window());

    dom.freeze();
    assert_eq!(dom.generation(), 1);
    assert_eq!(dom.inc_offset(), 2);
    assert!(dom.did_visible(BinderType::All, 1));
    assert!(!dom.did_visible(BinderType::New, 1));
  }

  #[test]
  fn full_index_imports_in_definition_order() {
    let mut dom = edge_dom();
    // Template edge(1, X): only edges from 1 are imported.
    let template = Term::fun("edge", vec![Term::Val(Symbol::create_num(1)), Term::var("X")]);
    let mut bound = VarSet::default();
    template.bind(&mut bound);
    let idx = dom.add_full_index(template);

    dom.define(edge(1, 2), true);
    dom.define(edge(2, 3), true);
    dom.define(edge(1, 4), true);
    assert!(dom.update_full_index(idx));
    assert_eq!(dom.full_index(idx).matched.len(), 2);
    // Idempotent until more atoms are defined.
    assert!(!dom.update_full_index(idx));

    // An equal template fetches the same index.
    let template2 = Term::fun("edge", vec![Term::Val(Symbol::create_num(1)), Term::var("X")]);
    template2.bind(&mut VarSet::default());
    assert_eq!(dom.add_full_index(template2), idx);
  }

  #[test]
  fn bind_index_groups_by_key() {
    let mut dom = edge_dom();
    // Template edge(X, Y) keyed by X.
    let mut template = Term::fun("edge", vec![Term::var("X"), Term::var("Y")]);
    let mut cells = HashMap::default();
    template.share_vars(&mut cells);
    template.bind(&mut VarSet::default());
    let x_cell = cells[&IString::from("X")].clone();
    let idx = dom.add_bind_index(template, vec![IString::from("X")], vec![x_cell]);

    dom.define(edge(1, 2), true);
    dom.define(edge(1, 3), true);
    dom.define(edge(2, 3), true);
    assert!(dom.update_bind_index(idx));
    let key1: SymbolVec = vec![Symbol::create_num(1)];
    let key2: SymbolVec = vec![Symbol::create_num(2)];
    assert_eq!(dom.bind_index(idx).map[&key1].len(), 2);
    assert_eq!(dom.bind_index(idx).map[&key2].len(), 1);
  }

  #[test]
  fn cleanup_compacts_and_remaps() {
    let mut dom = edge_dom();
    let (a, _) = dom.define(edge(1, 2), true);
    let (b, _) = dom.define(edge(2, 3), false);
    let (c, _) = dom.define(edge(3, 4), true);
    let remap = dom.cleanup(|atom| atom.fact());
    assert_eq!(remap[a as usize], 0);
    assert_eq!(remap[b as usize], INVALID_UID);
    assert_eq!(remap[c as usize], 1);
    assert_eq!(dom.len(), 2);
    assert_eq!(dom.find(edge(2, 3)), None);
    assert_eq!(dom.find(edge(3, 4)), Some(1));
  }
}
