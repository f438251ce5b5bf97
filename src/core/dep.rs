/*!

Dependency analysis over the statement graph. Every statement names the domains its heads define and the domains its
body occurrences read, with their signs. Statements are partitioned into strongly connected components of the
depends-on graph; components come back in dependency order (definers before dependents), which is the order the
grounder materializes them in.

Alongside the partition, every body occurrence is classified: `Unstratified` when some statement defining the read
domain sits in the same component (the occurrence is recursive), otherwise `Stratified` for negative and
`PositivelyStratified` for positive occurrences.

*/

use crate::{
  abstractions::{HashMap, NatSet},
  api::program::Naf,
  core::{literal::OccurrenceType, DomId, StmId},
};

/// A statement's footprint in the dependency graph.
#[derive(Clone, Default)]
pub struct StmtDeps {
  /// Domains the statement defines into.
  pub heads: Vec<DomId>,
  /// Domains the statement's body reads, with signs, in literal order.
  pub body: Vec<(DomId, Naf)>,
}

/// One strongly connected component, in grounding order.
#[derive(Clone, Debug)]
pub struct Component {
  pub stmts: Vec<StmId>,
}

/// The partition plus the per-statement, per-occurrence classification (parallel to `StmtDeps::body`).
pub struct Analysis {
  pub components: Vec<Component>,
  pub occ_types : Vec<Vec<OccurrenceType>>,
}

pub fn analyze(deps: &[StmtDeps]) -> Analysis {
  let n = deps.len();

  // Who defines what.
  let mut definers: HashMap<DomId, Vec<usize>> = HashMap::default();
  for (i, d) in deps.iter().enumerate() {
    for &dom in &d.heads {
      definers.entry(dom).or_default().push(i);
    }
  }

  // Edges statement → statements it depends on.
  let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
  for (i, d) in deps.iter().enumerate() {
    for &(dom, _) in &d.body {
      if let Some(defs) = definers.get(&dom) {
        for &def in defs {
          edges[i].push(def);
        }
      }
    }
  }

  // Iterative Tarjan. Components complete only after everything reachable from them, i.e. their dependencies, has
  // completed, so the emission order is already the grounding order.
  const UNVISITED: u32 = u32::MAX;
  let mut index = vec![UNVISITED; n];
  let mut lowlink = vec![0u32; n];
  let mut on_stack: NatSet = NatSet::default();
  let mut component_of = vec![usize::MAX; n];
  let mut stack: Vec<usize> = Vec::new();
  let mut components: Vec<Component> = Vec::new();
  let mut next_index = 0u32;

  // (node, next edge position) frames.
  let mut frames: Vec<(usize, usize)> = Vec::new();
  for root in 0..n {
    if index[root] != UNVISITED {
      continue;
    }
    frames.push((root, 0));
    index[root] = next_index;
    lowlink[root] = next_index;
    next_index += 1;
    stack.push(root);
    on_stack.insert(root);

    while let Some(&(node, edge_pos)) = frames.last() {
      if edge_pos < edges[node].len() {
        frames.last_mut().expect("frame just read").1 += 1;
        let succ = edges[node][edge_pos];
        if index[succ] == UNVISITED {
          index[succ] = next_index;
          lowlink[succ] = next_index;
          next_index += 1;
          stack.push(succ);
          on_stack.insert(succ);
          frames.push((succ, 0));
        } else if on_stack.contains(succ) {
          lowlink[node] = lowlink[node].min(index[succ]);
        }
      } else {
        frames.pop();
        if let Some(&(parent, _)) = frames.last() {
          lowlink[parent] = lowlink[parent].min(lowlink[node]);
        }
        if lowlink[node] == index[node] {
          let mut stmts = Vec::new();
          loop {
            let member = stack.pop().expect("tarjan stack underflow");
            on_stack.remove(member);
            component_of[member] = components.len();
            stmts.push(member as StmId);
            if member == node {
              break;
            }
          }
          stmts.sort_unstable();
          components.push(Component { stmts });
        }
      }
    }
  }

  // Classify occurrences.
  let mut occ_types = Vec::with_capacity(n);
  for (i, d) in deps.iter().enumerate() {
    let mut types = Vec::with_capacity(d.body.len());
    for &(dom, naf) in &d.body {
      let recursive = definers
          .get(&dom)
          .map(|defs| defs.iter().any(|&def| component_of[def] == component_of[i]))
          .unwrap_or(false);
      let occ_type = if recursive {
        OccurrenceType::Unstratified
      } else if naf == Naf::Pos {
        OccurrenceType::PositivelyStratified
      } else {
        OccurrenceType::Stratified
      };
      types.push(occ_type);
    }
    occ_types.push(types);
  }

  Analysis { components, occ_types }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn stm(heads: Vec<DomId>, body: Vec<(DomId, Naf)>) -> StmtDeps {
    StmtDeps { heads, body }
  }

  #[test]
  fn facts_precede_dependents() {
    // 0: edge.  1: reach :- edge.  2: reach :- reach, edge.
    let deps = vec![
      stm(vec![0], vec![]),
      stm(vec![1], vec![(0, Naf::Pos)]),
      stm(vec![1], vec![(1, Naf::Pos), (0, Naf::Pos)]),
    ];
    let analysis = analyze(&deps);
    let order: Vec<Vec<StmId>> = analysis.components.iter().map(|c| c.stmts.clone()).collect();
    // The fact comes first, then the base rule, then the self-recursive rule in its own component.
    assert_eq!(order[0], vec![0]);
    let base = analysis.components.iter().position(|c| c.stmts.contains(&1)).unwrap();
    let recursive = analysis.components.iter().position(|c| c.stmts.contains(&2)).unwrap();
    assert!(base < recursive);
    assert_eq!(analysis.components[recursive].stmts, vec![2]);

    // The recursive occurrence is unstratified, the edge occurrences positively stratified.
    assert_eq!(analysis.occ_types[2][0], OccurrenceType::Unstratified);
    assert_eq!(analysis.occ_types[2][1], OccurrenceType::PositivelyStratified);
    assert_eq!(analysis.occ_types[1][0], OccurrenceType::PositivelyStratified);
  }

  #[test]
  fn negative_earlier_component_is_stratified() {
    // 0: p.  1: q :- not p.
    let deps = vec![stm(vec![0], vec![]), stm(vec![1], vec![(0, Naf::Not)])];
    let analysis = analyze(&deps);
    assert_eq!(analysis.occ_types[1][0], OccurrenceType::Stratified);
    assert_eq!(analysis.components[0].stmts, vec![0]);
    assert_eq!(analysis.components[1].stmts, vec![1]);
  }

  #[test]
  fn mutual_recursion_shares_a_component() {
    // 0: a :- b.  1: b :- a.
    let deps = vec![stm(vec![0], vec![(1, Naf::Pos)]), stm(vec![1], vec![(0, Naf::Pos)])];
    let analysis = analyze(&deps);
    assert_eq!(analysis.components.len(), 1);
    assert_eq!(analysis.occ_types[0][0], OccurrenceType::Unstratified);
    assert_eq!(analysis.occ_types[1][0], OccurrenceType::Unstratified);
  }

  #[test]
  fn reading_an_undefined_domain_is_stratified() {
    let deps = vec![stm(vec![0], vec![(7, Naf::Pos)])];
    let analysis = analyze(&deps);
    assert_eq!(analysis.occ_types[0][0], OccurrenceType::PositivelyStratified);
  }
}
