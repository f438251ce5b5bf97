#![allow(dead_code)]
/*!

`stratum` is the core of a grounder for Answer Set Programming: it transforms a non-ground logic program with
aggregates and theory atoms into a propositional program in a low-level ground rule format. The front-end parser and
rewriter, scripting runtimes, and output sinks are external collaborators; this crate owns the data model of
symbols and ground atoms, the bottom-up dependency-driven instantiation loop, the literal-linearization and binder
machinery, and the accumulation state machines that emit the final ground rules.

The shape of a run: a [`api::Program`] (the non-ground IR) is lowered into a statement graph, dependency analysis
partitions the statements into strongly connected components, and each component is grounded to a fixpoint by the
scheduler before its domains are frozen. Ground rules stream into an abstract [`output::backend::Backend`] sink as
they are derived.

```
use stratum::api::{Head, Location, NullContext, Program, Stm, Term};
use stratum::grounder::{GroundConfig, Grounder};
use stratum::output::backend::RecordingBackend;

let mut program = Program::new();
let loc = Location::internal("example");
program.push(Stm::Rule {
    head: Head::Simple(Term::fun("fact", vec![])),
    body: vec![],
    loc: loc.clone(),
});
let mut grounder = Grounder::new(GroundConfig::default(), RecordingBackend::new());
grounder.ground(&program, &NullContext).unwrap();
assert!(grounder.backend().calls.iter().any(|c| c.contains("rule")));
```

*/

pub mod abstractions;
pub mod api;
pub mod core;
pub mod grounder;
pub mod output;

// We re-export abstractions that are meant to be used publicly.
pub use abstractions::{log, IString};
pub use crate::core::{GroundError, Logger, Warnings};
