/*!

Interval arithmetic over the linearly ordered symbol universe. Aggregate guards are compiled into a
[`DisjunctiveBounds`], a union of disjoint intervals between `#inf` and `#sup`, by successively removing the
value ranges each guard relation excludes. During accumulation the achievable value range of an aggregate is
intersected against these bounds: an empty intersection makes the aggregate atom unsatisfiable, and a value range
entirely inside the bounds makes it a fact.

Interval ends carry an inclusivity flag. Comparisons place each end in a doubled space (an exclusive lower end sits
infinitesimally above its value, an exclusive upper end infinitesimally below) so emptiness and overlap tests are
plain lexicographic comparisons.

*/

use std::fmt::{Display, Formatter};

use crate::api::{
  program::Rel,
  symbol::Symbol,
};

/// One end of an interval.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Bound {
  pub value    : Symbol,
  pub inclusive: bool,
}

impl Bound {
  pub fn inclusive(value: Symbol) -> Bound {
    Bound { value, inclusive: true }
  }

  pub fn exclusive(value: Symbol) -> Bound {
    Bound { value, inclusive: false }
  }

  /// Position in the doubled space when used as a lower end.
  fn lower_key(&self) -> (Symbol, i8) {
    (self.value, if self.inclusive { 0 } else { 1 })
  }

  /// Position in the doubled space when used as an upper end.
  fn upper_key(&self) -> (Symbol, i8) {
    (self.value, if self.inclusive { 0 } else { -1 })
  }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Interval {
  pub left : Bound,
  pub right: Bound,
}

impl Interval {
  pub fn new(left: Bound, right: Bound) -> Interval {
    Interval { left, right }
  }

  /// The full universe `[#inf, #sup]`.
  pub fn all() -> Interval {
    Interval::new(Bound::inclusive(Symbol::create_inf()), Bound::inclusive(Symbol::create_sup()))
  }

  /// The single point `[v, v]`.
  pub fn point(value: Symbol) -> Interval {
    Interval::new(Bound::inclusive(value), Bound::inclusive(value))
  }

  pub fn is_empty(&self) -> bool {
    self.left.lower_key() > self.right.upper_key()
  }

  pub fn contains_value(&self, value: Symbol) -> bool {
    self.left.lower_key() <= (value, 0) && (value, 0) <= self.right.upper_key()
  }

  /// Is the value strictly below the interval's left end?
  pub fn below_lower(&self, value: Symbol) -> bool {
    (value, 0) < self.left.lower_key()
  }

  /// Is the value strictly above the interval's right end?
  pub fn above_upper(&self, value: Symbol) -> bool {
    (value, 0) > self.right.upper_key()
  }

  pub fn contains(&self, other: &Interval) -> bool {
    other.is_empty()
        || (self.left.lower_key() <= other.left.lower_key() && other.right.upper_key() <= self.right.upper_key())
  }

  pub fn intersects(&self, other: &Interval) -> bool {
    !self.is_empty()
        && !other.is_empty()
        && self.left.lower_key() <= other.right.upper_key()
        && other.left.lower_key() <= self.right.upper_key()
  }
}

impl Display for Interval {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}{},{}{}",
      if self.left.inclusive { "[" } else { "(" },
      self.left.value,
      self.right.value,
      if self.right.inclusive { "]" } else { ")" },
    )
  }
}

/// A union of disjoint, sorted intervals over the symbol universe.
#[derive(Clone, Debug)]
pub struct DisjunctiveBounds {
  intervals: Vec<Interval>,
}

impl DisjunctiveBounds {
  /// The empty union.
  pub fn empty() -> DisjunctiveBounds {
    DisjunctiveBounds { intervals: Vec::new() }
  }

  /// The full universe.
  pub fn all() -> DisjunctiveBounds {
    DisjunctiveBounds { intervals: vec![Interval::all()] }
  }

  /// Compiles aggregate guards into bounds: starts from the full universe and removes what each relation excludes.
  /// Guard values must already be ground.
  pub fn from_guards(guards: &[(Rel, Symbol)]) -> DisjunctiveBounds {
    let inf = Symbol::create_inf();
    let sup = Symbol::create_sup();
    let mut set = DisjunctiveBounds::all();
    for &(rel, v) in guards {
      match rel {
        // value >= v: remove [#inf, v)
        Rel::Geq => set.remove(&Interval::new(Bound::inclusive(inf), Bound::exclusive(v))),
        // value > v: remove [#inf, v]
        Rel::Gt => set.remove(&Interval::new(Bound::inclusive(inf), Bound::inclusive(v))),
        // value <= v: remove (v, #sup]
        Rel::Leq => set.remove(&Interval::new(Bound::exclusive(v), Bound::inclusive(sup))),
        // value < v: remove [v, #sup]
        Rel::Lt => set.remove(&Interval::new(Bound::inclusive(v), Bound::inclusive(sup))),
        Rel::Neq => set.remove(&Interval::point(v)),
        Rel::Eq => {
          set.remove(&Interval::new(Bound::exclusive(v), Bound::inclusive(sup)));
          set.remove(&Interval::new(Bound::inclusive(inf), Bound::exclusive(v)));
        }
      }
    }
    set
  }

  pub fn is_empty(&self) -> bool {
    self.intervals.is_empty()
  }

  pub fn contains_value(&self, value: Symbol) -> bool {
    self.intervals.iter().any(|iv| iv.contains_value(value))
  }

  /// Does some member interval contain all of `other`? Since members are disjoint, a non-empty `other` fits in at
  /// most one of them.
  pub fn contains(&self, other: &Interval) -> bool {
    other.is_empty() || self.intervals.iter().any(|iv| iv.contains(other))
  }

  pub fn intersects(&self, other: &Interval) -> bool {
    self.intervals.iter().any(|iv| iv.intersects(other))
  }

  /// Removes `cut` from every member interval.
  pub fn remove(&mut self, cut: &Interval) {
    if cut.is_empty() {
      return;
    }
    let mut result = Vec::with_capacity(self.intervals.len() + 1);
    for iv in &self.intervals {
      if !iv.intersects(cut) {
        result.push(*iv);
        continue;
      }
      // Left remainder: [iv.left, complement of cut.left).
      let left = Interval::new(
        iv.left,
        Bound { value: cut.left.value, inclusive: !cut.left.inclusive },
      );
      if !left.is_empty() {
        result.push(left);
      }
      // Right remainder: (complement of cut.right, iv.right].
      let right = Interval::new(
        Bound { value: cut.right.value, inclusive: !cut.right.inclusive },
        iv.right,
      );
      if !right.is_empty() {
        result.push(right);
      }
    }
    self.intervals = result;
  }

  pub fn intervals(&self) -> &[Interval] {
    &self.intervals
  }
}

impl Display for DisjunctiveBounds {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut sep = false;
    for iv in &self.intervals {
      if sep {
        write!(f, "|")?;
      }
      sep = true;
      write!(f, "{}", iv)?;
    }
    if !sep {
      write!(f, "(empty)")?;
    }
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn num(n: i32) -> Symbol {
    Symbol::create_num(n)
  }

  #[test]
  fn guard_narrowing_per_relation() {
    // value >= 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(2))]);
    assert!(!b.contains_value(num(1)));
    assert!(b.contains_value(num(2)));
    assert!(b.contains_value(Symbol::create_sup()));

    // value > 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Gt, num(2))]);
    assert!(!b.contains_value(num(2)));
    assert!(b.contains_value(num(3)));

    // value <= 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Leq, num(2))]);
    assert!(b.contains_value(num(2)));
    assert!(!b.contains_value(num(3)));
    assert!(b.contains_value(Symbol::create_inf()));

    // value < 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Lt, num(2))]);
    assert!(b.contains_value(num(1)));
    assert!(!b.contains_value(num(2)));

    // value != 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Neq, num(2))]);
    assert!(b.contains_value(num(1)));
    assert!(!b.contains_value(num(2)));
    assert!(b.contains_value(num(3)));

    // value = 2
    let b = DisjunctiveBounds::from_guards(&[(Rel::Eq, num(2))]);
    assert!(!b.contains_value(num(1)));
    assert!(b.contains_value(num(2)));
    assert!(!b.contains_value(num(3)));
  }

  #[test]
  fn conjunction_of_guards() {
    // 2 <= value <= 4, value != 3
    let b = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(2)), (Rel::Leq, num(4)), (Rel::Neq, num(3))]);
    assert!(b.contains_value(num(2)));
    assert!(!b.contains_value(num(3)));
    assert!(b.contains_value(num(4)));
    assert!(!b.contains_value(num(5)));
    assert_eq!(b.intervals().len(), 2);
  }

  #[test]
  fn contradictory_guards_are_empty() {
    let b = DisjunctiveBounds::from_guards(&[(Rel::Lt, num(2)), (Rel::Gt, num(4))]);
    assert!(b.is_empty());
  }

  #[test]
  fn containment_and_intersection() {
    let b = DisjunctiveBounds::from_guards(&[(Rel::Geq, num(2))]);
    // [2, #sup] contains [3, 5] and intersects [0, 2] without containing it.
    assert!(b.contains(&Interval::new(Bound::inclusive(num(3)), Bound::inclusive(num(5)))));
    let edge = Interval::new(Bound::inclusive(num(0)), Bound::inclusive(num(2)));
    assert!(b.intersects(&edge));
    assert!(!b.contains(&edge));
    // The empty interval is contained everywhere.
    assert!(b.contains(&Interval::new(Bound::exclusive(num(3)), Bound::exclusive(num(3)))));
  }
}
