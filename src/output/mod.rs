/*!

The boundary between the grounding engine and its consumers. The engine produces ground rules over
[`LiteralId`]s, typed references `(sign, domain, atom)` into the central domain arena, and the
[`translate`] machinery lowers them to the integer-literal wire format of the abstract [`backend::Backend`]
sink: plain rules, weight rules, minimize statements, and theory data.

*/

pub mod backend;
pub mod translate;

use std::fmt::{Display, Formatter};

use crate::{
  abstractions::SmallVec,
  api::program::Naf,
  core::{AtomUid, DomId},
};

/// A signed reference to a ground atom in the domain arena.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct LiteralId {
  pub naf: Naf,
  pub dom: DomId,
  pub uid: AtomUid,
}

impl LiteralId {
  pub fn pos(dom: DomId, uid: AtomUid) -> LiteralId {
    LiteralId { naf: Naf::Pos, dom, uid }
  }

  pub fn with_naf(naf: Naf, dom: DomId, uid: AtomUid) -> LiteralId {
    LiteralId { naf, dom, uid }
  }
}

impl Display for LiteralId {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}{}#{}", self.naf, self.dom, self.uid)
  }
}

/// One ground rule as assembled by a statement's `report`: head atoms, body literals, and whether the head is a
/// choice. Heads are always positive references, and almost always a single one.
#[derive(Clone, Default, Debug)]
pub struct GroundRule {
  pub choice: bool,
  pub heads : SmallVec<[LiteralId; 4]>,
  pub body  : Vec<LiteralId>,
}

impl GroundRule {
  pub fn new(choice: bool) -> GroundRule {
    GroundRule { choice, heads: SmallVec::new(), body: Vec::new() }
  }
}
