#![allow(unused)]
/*!

Types/type aliases that abstract over the implementing backing type.

# Background and Motivation

A motivating example is the `IString` type, an interned string type. A number of external crates could provide this
functionality. This module redirects to whatever chosen implementation we want. To use the
[`string_cache` crate](https://crates.io/crates/string_cache), we just define `IString` as an alias for
`string_cache::DefaultAtom`:

```ignore
pub use string_cache::DefaultAtom as IString;
```

Every predicate, function, and variable name in the grounder is an `IString`, so name equality during matching and
dependency analysis is pointer-sized comparison rather than string comparison.

For infrastructure with very different backing implementations, we define an abstraction layer over the
implementation. The `log` module is the main example: its (crate) public interface consists of the warning-category
gates and the macros `error!`, `warning!`, `info!`, `debug!`, and `trace!`, while the `tracing` machinery backing them
is encapsulated in the `log` module.

*/

use std::collections::HashSet as StdHashSet;
use std::fmt::Display;
use std::iter::once;

// Logging
pub mod log;

// Interned string. Use `DefaultAtom` for a global cache that can be used across threads.
pub use string_cache::DefaultAtom as IString;

// A set of (small) natural numbers; used for variable index sets during safety checking.
pub use bit_set::BitSet as NatSet;

// For vectors that are expected to have few elements: symbol arguments, rule bodies.
pub use smallvec::{smallvec, SmallVec};

pub use std::collections::HashMap;

/// A `Set<T>` is a hash set. Most sets in the grounder are sets of names or locations used only for membership tests.
pub type Set<T> = StdHashSet<T>;

/// The string contents of an interned name. `IString` compares and hashes by identity; whenever the *contents*
/// matter (ordering, matching against keywords), go through this.
#[inline(always)]
pub fn istr(s: &IString) -> &str {
  s
}


/// Join a sequence of displayable things with a separator. (C.f. `Vec::join(…)`, which wants slices of strings.)
pub fn join_string<T: Display>(iter: impl Iterator<Item = T>, sep: &str) -> String {
  let mut iter = iter.map(|t| t.to_string());
  iter
      .next()
      .into_iter()
      .chain(iter.flat_map(move |s| once(sep.to_string()).chain(once(s))))
      .collect()
}

#[cfg(test)]
mod tests {
  use super::join_string;

  #[test]
  fn join_string_test() {
    let list = [1, 3, 5, 7, 9];
    assert_eq!(join_string(list.iter(), ", "), "1, 3, 5, 7, 9");
    assert_eq!(join_string(std::iter::empty::<u32>(), ", "), "");
  }
}
