/*!

Source locations. Everything the grounder reports (unsafe variables, undefined operations, dropped tuples) points
back at a region of program text. A `Location` is a half-open region `begin..end` in one file, and two locations can
be merged with `+` to cover, e.g., both ends of an interval term.

*/

use std::fmt::{Debug, Display, Formatter};
use std::ops::Add;

use crate::abstractions::IString;

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Location {
  pub file        : IString,
  pub begin_line  : u32,
  pub begin_column: u32,
  pub end_line    : u32,
  pub end_column  : u32,
}

impl Location {
  pub fn new(file: impl Into<IString>, begin_line: u32, begin_column: u32, end_line: u32, end_column: u32) -> Location {
    Location {
      file: file.into(),
      begin_line,
      begin_column,
      end_line,
      end_column,
    }
  }

  /// A location for synthesized program elements.
  pub fn internal(name: &str) -> Location {
    Location::new(name, 1, 1, 1, 1)
  }
}

impl Default for Location {
  fn default() -> Location {
    Location::internal("<internal>")
  }
}

/// The smallest location covering both operands. Both must come from the same file.
impl Add for &Location {
  type Output = Location;

  fn add(self, other: &Location) -> Location {
    Location {
      file        : self.file.clone(),
      begin_line  : self.begin_line.min(other.begin_line),
      begin_column: if self.begin_line <= other.begin_line { self.begin_column } else { other.begin_column },
      end_line    : self.end_line.max(other.end_line),
      end_column  : if self.end_line >= other.end_line { self.end_column } else { other.end_column },
    }
  }
}

impl Display for Location {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.begin_line, self.begin_column)?;
    if (self.begin_line, self.begin_column) != (self.end_line, self.end_column) {
      write!(f, "-{}:{}", self.end_line, self.end_column)?;
    }
    Ok(())
  }
}

impl Debug for Location {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_and_merge() {
    let a = Location::new("base.lp", 2, 1, 2, 8);
    let b = Location::new("base.lp", 3, 4, 3, 9);
    assert_eq!(a.to_string(), "base.lp:2:1-2:8");
    let merged = &a + &b;
    assert_eq!((merged.begin_line, merged.end_line), (2, 3));
    assert_eq!((merged.begin_column, merged.end_column), (1, 9));
  }
}
