/*!

The grounding engine. Everything here operates on central arenas keyed by 32-bit ids (predicate domains, secondary
indices, instantiators, statements) rather than pointer graphs: an id plus the arena it indexes is the identity of a
component. The scheduler (`queue`), the match machinery (`binder`, `literal`, `safety`, `instantiator`), the atom
tables (`domain`, `atoms`, `bounds`), and the per-construct accumulation statements (`statement`) together implement
the bottom-up, dependency-driven instantiation loop.

*/

pub mod atoms;
pub mod binder;
pub mod bounds;
pub mod dep;
pub mod domain;
pub mod instantiator;
pub mod literal;
pub mod logger;
pub mod queue;
pub mod safety;
pub mod statement;

pub use logger::{GroundError, Logger, Warnings};

/// Index of a domain in the domain arena.
pub type DomId = u32;
/// Index of an atom within its home domain; also called its uid.
pub type AtomUid = u32;
/// Index of an instantiator in the instantiator arena.
pub type InstId = u32;
/// Index of a statement in the statement arena.
pub type StmId = u32;

pub const INVALID_UID: AtomUid = u32::MAX;

/// How a positive binder partitions its domain: only atoms new this phase, only strictly older atoms, or all of
/// them. The order matters: linearization prefers `New` entities so that the new partition is entered exactly once.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum BinderType {
  New,
  Old,
  All,
}
