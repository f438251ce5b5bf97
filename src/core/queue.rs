/*!

The scheduler queue driving one component's fixpoint. Two lanes with a fixed priority: domains first, then
instantiators, so that a grown domain slides its NEW window (and re-enqueues its dependents) before any dependent
plan re-runs. Both lanes deduplicate through `enqueued` flags on the items themselves.

*/

use std::collections::VecDeque;

use crate::core::{domain::Domains, instantiator::Instantiator, DomId, InstId};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum QueueItem {
  Dom(DomId),
  Inst(InstId),
}

#[derive(Default)]
pub struct Queue {
  doms : VecDeque<DomId>,
  insts: VecDeque<InstId>,
}

impl Queue {
  pub fn new() -> Queue {
    Queue::default()
  }

  pub fn enqueue_dom(&mut self, doms: &mut Domains, dom: DomId) {
    let domain = doms.get_mut(dom);
    if !domain.enqueued {
      domain.enqueued = true;
      self.doms.push_back(dom);
    }
  }

  pub fn enqueue_inst(&mut self, insts: &mut [Instantiator], inst: InstId) {
    let entry = &mut insts[inst as usize];
    if !entry.enqueued {
      entry.enqueued = true;
      self.insts.push_back(inst);
    }
  }

  /// Pops the next item, clearing its enqueued flag. Domains drain before instantiators.
  pub fn pop(&mut self, doms: &mut Domains, insts: &mut [Instantiator]) -> Option<QueueItem> {
    if let Some(dom) = self.doms.pop_front() {
      doms.get_mut(dom).enqueued = false;
      return Some(QueueItem::Dom(dom));
    }
    if let Some(inst) = self.insts.pop_front() {
      insts[inst as usize].enqueued = false;
      return Some(QueueItem::Inst(inst));
    }
    None
  }

  pub fn is_empty(&self) -> bool {
    self.doms.is_empty() && self.insts.is_empty()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::domain::DomainData;

  #[test]
  fn domains_drain_first_and_flags_dedupe() {
    let mut doms = Domains::new();
    let d = doms.add_domain(DomainData::Predicate);
    let mut insts = vec![Instantiator::new(0), Instantiator::new(1)];
    let mut queue = Queue::new();

    queue.enqueue_inst(&mut insts, 1);
    queue.enqueue_dom(&mut doms, d);
    queue.enqueue_dom(&mut doms, d);
    queue.enqueue_inst(&mut insts, 1);

    assert_eq!(queue.pop(&mut doms, &mut insts), Some(QueueItem::Dom(d)));
    assert_eq!(queue.pop(&mut doms, &mut insts), Some(QueueItem::Inst(1)));
    assert_eq!(queue.pop(&mut doms, &mut insts), None);

    // After popping, the same items can be enqueued again.
    queue.enqueue_dom(&mut doms, d);
    assert_eq!(queue.pop(&mut doms, &mut insts), Some(QueueItem::Dom(d)));
  }
}
