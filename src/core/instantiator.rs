/*!

An `Instantiator` runs one linearized body plan: an ordered sequence of binders, enumerated depth-first. One *pump*
refreshes every binder's index, then walks the plan (`match_` on entry to a depth, `next` to advance) and hands
every complete assignment to the consumer callback (the owning statement's `report`). Bindings live in the literals'
shared cells; a callback must not retain them beyond its own invocation, since the very next `next()` overwrites
them.

Across the NEW/OLD plan rotation of a recursive component, consumers observe each full assignment exactly once; the
window bookkeeping in `domain` is what enforces it.

*/

use crate::{
  core::{
    binder::{BxBinder, MatchCtx},
    logger::GroundError,
    StmId,
  },
};

/// One binder of a plan together with the plan positions it depends on (the binders that bound the variables this
/// one reads).
pub struct PlanEntry {
  pub binder : BxBinder,
  pub depends: Vec<u32>,
}

#[derive(Default)]
pub struct Instantiator {
  pub owner  : StmId,
  entries    : Vec<PlanEntry>,
  /// Plan positions binding variables the statement's output depends on.
  depend     : Vec<u32>,
  pub enqueued: bool,
}

impl std::fmt::Debug for Instantiator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Instantiator")
        .field("owner", &self.owner)
        .field("entries", &self.entries.len())
        .field("depend", &self.depend)
        .field("enqueued", &self.enqueued)
        .finish()
  }
}

impl Instantiator {
  pub fn new(owner: StmId) -> Instantiator {
    Instantiator {
      owner,
      entries: Vec::new(),
      depend: Vec::new(),
      enqueued: false,
    }
  }

  pub fn add(&mut self, binder: BxBinder, depends: Vec<u32>) {
    self.entries.push(PlanEntry { binder, depends });
  }

  pub fn finalize(&mut self, depend: Vec<u32>) {
    self.depend = depend;
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Refreshes indices and enumerates every assignment of the plan, invoking `report` for each. The `enqueued` flag
  /// is cleared by the scheduler when it pops this instantiator.
  pub fn pump(
    &mut self,
    ctx: &mut MatchCtx,
    report: &mut dyn FnMut(&mut MatchCtx) -> Result<(), GroundError>,
  ) -> Result<(), GroundError> {
    for entry in &mut self.entries {
      entry.binder.update(ctx.doms);
    }

    if self.entries.is_empty() {
      // An empty body holds exactly once.
      return report(ctx);
    }

    let mut depth = 0usize;
    self.entries[0].binder.match_(ctx)?;
    loop {
      if self.entries[depth].binder.next(ctx)? {
        if depth + 1 == self.entries.len() {
          report(ctx)?;
        } else {
          depth += 1;
          self.entries[depth].binder.match_(ctx)?;
        }
      } else if depth == 0 {
        break;
      } else {
        depth -= 1;
      }
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    api::{
      context::NullContext,
      location::Location,
      symbol::Symbol,
      term::{Term, VarSet},
    },
    core::{
      binder::RangeBinder,
      domain::Domains,
      logger::Logger,
    },
  };

  #[test]
  fn nested_ranges_enumerate_the_product() {
    // X = 1..2, Y = 1..3 yields six assignments.
    let x = Term::var("X");
    let y = Term::var("Y");
    let mut bound = VarSet::default();
    x.bind(&mut bound);
    y.bind(&mut bound);

    let mut inst = Instantiator::new(0);
    inst.add(
      Box::new(RangeBinder::new(
        x.clone(),
        Term::Val(Symbol::create_num(1)),
        Term::Val(Symbol::create_num(2)),
        Location::default(),
      )),
      vec![],
    );
    inst.add(
      Box::new(RangeBinder::new(
        y.clone(),
        Term::Val(Symbol::create_num(1)),
        Term::Val(Symbol::create_num(3)),
        Location::default(),
      )),
      vec![0],
    );
    inst.finalize(vec![0, 1]);

    let mut doms = Domains::new();
    let ext = NullContext;
    let mut log = Logger::new(10);
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    let mut seen = Vec::new();
    inst
        .pump(&mut ctx, &mut |_ctx| {
          seen.push((x.eval().unwrap(), y.eval().unwrap()));
          Ok(())
        })
        .unwrap();
    assert_eq!(seen.len(), 6);
    assert_eq!(seen[0], (Symbol::create_num(1), Symbol::create_num(1)));
    assert_eq!(seen[5], (Symbol::create_num(2), Symbol::create_num(3)));
  }

  #[test]
  fn empty_plan_reports_once() {
    let mut inst = Instantiator::new(0);
    let mut doms = Domains::new();
    let ext = NullContext;
    let mut log = Logger::new(10);
    let mut ctx = MatchCtx { doms: &mut doms, ext: &ext, log: &mut log };
    let mut count = 0;
    inst
        .pump(&mut ctx, &mut |_ctx| {
          count += 1;
          Ok(())
        })
        .unwrap();
    assert_eq!(count, 1);
  }
}
