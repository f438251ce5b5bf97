/*!

The public data model of the grounder: symbols and signatures, source locations, the non-ground term AST, the
non-ground IR consumed from the front end, and the external-context callback interface.

*/

pub mod context;
pub mod location;
pub mod program;
pub mod symbol;
pub mod term;

pub use context::{ExternalContext, ExternalError, NullContext, SymbolicAtomsView};
pub use location::Location;
pub use program::{
  AggregateBound,
  AggregateElement,
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
  TheoryElement,
};
pub use symbol::{Sig, Symbol, SymbolType, SymbolVec};
pub use term::{BxTerm, Term, TermVec, VarCell, VarSet, VarTerm};
