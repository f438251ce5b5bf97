/*!

Definitions related to ground symbols. A `Symbol` is the value universe of the grounder: the distinguished `#inf`,
32-bit integers, interned strings, function applications (with an optional negative sign; tuples are functions with
the empty name), and the distinguished `#sup`.

Symbols are flyweights: a `Symbol` is a `Copy` handle packing a type tag and a payload into a `u64`. Numbers carry
their value directly; strings and function applications carry an index into a process-wide interning store. Equality
and hashing are therefore O(1) on the packed representation, and two symbols constructed from equal parts are
bit-identical. The store is populated at startup, extended during grounding, and never garbage collected within a
run.

The total order on symbols is

```text
#inf < numbers < strings < functions < #sup
```

with numbers ordered by value, strings lexicographically, and functions by (sign, name, arity, arguments
lexicographically).

*/

use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

use once_cell::sync::Lazy;
use std::sync::RwLock;

use crate::abstractions::{istr, HashMap, IString};

pub type SymbolVec = Vec<Symbol>;

// Tag values in the low three bits of the packed representation. The tag order matches the symbol type order.
const TAG_INF: u64 = 0;
const TAG_NUM: u64 = 1;
const TAG_STR: u64 = 2;
const TAG_FUN: u64 = 3;
const TAG_SUP: u64 = 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SymbolType {
  Inf,
  Num,
  Str,
  Fun,
  Sup,
}

/// The interning store backing `Str` and `Fun` symbols. Process-wide, like the string cache backing `IString`.
#[derive(Default)]
struct SymbolStore {
  strings   : Vec<IString>,
  string_ids: HashMap<IString, u32>,
  funs      : Vec<FunRecord>,
  fun_ids   : HashMap<FunRecord, u32>,
}

#[derive(Clone, Eq, PartialEq, Hash)]
struct FunRecord {
  name: IString,
  sign: bool,
  args: SymbolVec,
}

static STORE: Lazy<RwLock<SymbolStore>> = Lazy::new(|| RwLock::new(SymbolStore::default()));

impl SymbolStore {
  fn intern_string(&mut self, s: IString) -> u32 {
    if let Some(&id) = self.string_ids.get(&s) {
      return id;
    }
    let id = self.strings.len() as u32;
    self.strings.push(s.clone());
    self.string_ids.insert(s, id);
    id
  }

  fn intern_fun(&mut self, record: FunRecord) -> u32 {
    if let Some(&id) = self.fun_ids.get(&record) {
      return id;
    }
    let id = self.funs.len() as u32;
    self.funs.push(record.clone());
    self.fun_ids.insert(record, id);
    id
  }
}

/// A ground symbol; a flyweight handle into the symbol store.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Symbol {
  rep: u64,
}

impl Symbol {
  #[inline(always)]
  const fn pack(tag: u64, payload: u32) -> Symbol {
    Symbol { rep: ((payload as u64) << 3) | tag }
  }

  #[inline(always)]
  fn tag(self) -> u64 {
    self.rep & 0x7
  }

  #[inline(always)]
  fn payload(self) -> u32 {
    (self.rep >> 3) as u32
  }

  // region Construction

  pub const fn create_inf() -> Symbol {
    Symbol::pack(TAG_INF, 0)
  }

  pub const fn create_sup() -> Symbol {
    Symbol::pack(TAG_SUP, 0)
  }

  pub const fn create_num(num: i32) -> Symbol {
    Symbol::pack(TAG_NUM, num as u32)
  }

  pub fn create_str(value: impl Into<IString>) -> Symbol {
    let id = STORE.write().unwrap().intern_string(value.into());
    Symbol::pack(TAG_STR, id)
  }

  /// A named constant, i.e. a function application of arity zero.
  pub fn create_id(name: impl Into<IString>, sign: bool) -> Symbol {
    Symbol::create_fun(name, SymbolVec::new(), sign)
  }

  pub fn create_fun(name: impl Into<IString>, args: SymbolVec, sign: bool) -> Symbol {
    let record = FunRecord { name: name.into(), sign, args };
    let id = STORE.write().unwrap().intern_fun(record);
    Symbol::pack(TAG_FUN, id)
  }

  /// Tuples are function applications with the empty name, so `()`, `(a,)`, `(a,b)`, ….
  pub fn create_tuple(args: SymbolVec) -> Symbol {
    Symbol::create_fun("", args, false)
  }

  // endregion Construction

  // region Value retrieval

  #[inline(always)]
  pub fn symbol_type(self) -> SymbolType {
    match self.tag() {
      TAG_INF => SymbolType::Inf,
      TAG_NUM => SymbolType::Num,
      TAG_STR => SymbolType::Str,
      TAG_FUN => SymbolType::Fun,
      _ => SymbolType::Sup,
    }
  }

  /// The integer value of a `Num` symbol.
  #[inline(always)]
  pub fn num(self) -> i32 {
    debug_assert_eq!(self.symbol_type(), SymbolType::Num);
    self.payload() as i32
  }

  /// The contents of a `Str` symbol.
  pub fn string(self) -> IString {
    debug_assert_eq!(self.symbol_type(), SymbolType::Str);
    STORE.read().unwrap().strings[self.payload() as usize].clone()
  }

  /// The name of a `Fun` symbol.
  pub fn name(self) -> IString {
    debug_assert_eq!(self.symbol_type(), SymbolType::Fun);
    STORE.read().unwrap().funs[self.payload() as usize].name.clone()
  }

  /// The arguments of a `Fun` symbol.
  pub fn args(self) -> SymbolVec {
    debug_assert_eq!(self.symbol_type(), SymbolType::Fun);
    STORE.read().unwrap().funs[self.payload() as usize].args.clone()
  }

  pub fn arity(self) -> u32 {
    debug_assert_eq!(self.symbol_type(), SymbolType::Fun);
    STORE.read().unwrap().funs[self.payload() as usize].args.len() as u32
  }

  pub fn sign(self) -> bool {
    match self.symbol_type() {
      SymbolType::Num => self.num() < 0,
      SymbolType::Fun => STORE.read().unwrap().funs[self.payload() as usize].sign,
      _ => false,
    }
  }

  /// Does this symbol have a predicate signature, i.e. is it a function application?
  #[inline(always)]
  pub fn has_sig(self) -> bool {
    self.symbol_type() == SymbolType::Fun
  }

  pub fn sig(self) -> Sig {
    debug_assert!(self.has_sig());
    let store = STORE.read().unwrap();
    let record = &store.funs[self.payload() as usize];
    let name = record.name.clone();
    let arity = record.args.len() as u32;
    let sign = record.sign;
    drop(store);
    Sig::new(name, arity, sign)
  }

  // endregion Value retrieval

  // region Modifying values

  /// Negates a number or flips the sign of a function symbol.
  pub fn flip_sign(self) -> Symbol {
    match self.symbol_type() {
      SymbolType::Num => Symbol::create_num(-self.num()),
      SymbolType::Fun => {
        let (name, args, sign) = {
          let store = STORE.read().unwrap();
          let record = &store.funs[self.payload() as usize];
          (record.name.clone(), record.args.clone(), record.sign)
        };
        Symbol::create_fun(name, args, !sign)
      }
      _ => self,
    }
  }

  /// Replaces named constants by their definitions, recursively. Used for `#const` substitution.
  pub fn replace(self, defs: &HashMap<IString, Symbol>) -> Symbol {
    if self.symbol_type() != SymbolType::Fun {
      return self;
    }
    let (name, args, sign) = {
      let store = STORE.read().unwrap();
      let record = &store.funs[self.payload() as usize];
      (record.name.clone(), record.args.clone(), record.sign)
    };
    if args.is_empty() && !sign {
      if let Some(&replacement) = defs.get(&name) {
        return replacement;
      }
    }
    let args = args.into_iter().map(|a| a.replace(defs)).collect();
    Symbol::create_fun(name, args, sign)
  }

  // endregion Modifying values

  fn cmp_in(store: &SymbolStore, lhs: Symbol, rhs: Symbol) -> Ordering {
    if lhs == rhs {
      return Ordering::Equal;
    }
    match lhs.tag().cmp(&rhs.tag()) {
      Ordering::Equal => {}
      unequal => return unequal,
    }
    match lhs.symbol_type() {
      SymbolType::Inf | SymbolType::Sup => Ordering::Equal,

      SymbolType::Num => lhs.num().cmp(&rhs.num()),

      SymbolType::Str => {
        let l = &store.strings[lhs.payload() as usize];
        let r = &store.strings[rhs.payload() as usize];
        istr(l).cmp(istr(r))
      }

      SymbolType::Fun => {
        let l = &store.funs[lhs.payload() as usize];
        let r = &store.funs[rhs.payload() as usize];
        l.sign
            .cmp(&r.sign)
            .then_with(|| istr(&l.name).cmp(istr(&r.name)))
            .then_with(|| l.args.len().cmp(&r.args.len()))
            .then_with(|| {
              for (a, b) in l.args.iter().zip(r.args.iter()) {
                match Symbol::cmp_in(store, *a, *b) {
                  Ordering::Equal => continue,
                  unequal => return unequal,
                }
              }
              Ordering::Equal
            })
      }
    }
  }

  fn fmt_in(store: &SymbolStore, sym: Symbol, f: &mut Formatter<'_>) -> std::fmt::Result {
    match sym.symbol_type() {
      SymbolType::Inf => write!(f, "#inf"),
      SymbolType::Sup => write!(f, "#sup"),
      SymbolType::Num => write!(f, "{}", sym.num()),
      SymbolType::Str => {
        let s = &store.strings[sym.payload() as usize];
        write!(f, "\"{}\"", quote(istr(s)))
      }
      SymbolType::Fun => {
        let record = &store.funs[sym.payload() as usize];
        if record.sign {
          write!(f, "-")?;
        }
        write!(f, "{}", record.name)?;
        let tuple = record.name.is_empty();
        if !record.args.is_empty() || tuple {
          write!(f, "(")?;
          let mut sep = false;
          for arg in &record.args {
            if sep {
              write!(f, ",")?;
            }
            sep = true;
            Symbol::fmt_in(store, *arg, f)?;
          }
          if tuple && record.args.len() == 1 {
            write!(f, ",")?;
          }
          write!(f, ")")?;
        }
        Ok(())
      }
    }
  }
}

impl PartialOrd for Symbol {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Symbol {
  fn cmp(&self, other: &Self) -> Ordering {
    let store = STORE.read().unwrap();
    Symbol::cmp_in(&store, *self, *other)
  }
}

impl Display for Symbol {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let store = STORE.read().unwrap();
    Symbol::fmt_in(&store, *self, f)
  }
}

impl Debug for Symbol {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

// region Signature

/// A predicate signature: (name, arity, sign) packed into a `u64` with the name interned in the symbol store.
/// Two symbols with the same signature share a predicate domain.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Sig {
  rep: u64,
}

impl Sig {
  pub fn new(name: impl Into<IString>, arity: u32, sign: bool) -> Sig {
    debug_assert!(arity < (1 << 31));
    let name_id = STORE.write().unwrap().intern_string(name.into());
    Sig { rep: ((name_id as u64) << 32) | ((arity as u64) << 1) | (sign as u64) }
  }

  pub fn name(self) -> IString {
    STORE.read().unwrap().strings[(self.rep >> 32) as usize].clone()
  }

  #[inline(always)]
  pub fn arity(self) -> u32 {
    ((self.rep >> 1) & 0x7FFF_FFFF) as u32
  }

  #[inline(always)]
  pub fn sign(self) -> bool {
    self.rep & 1 != 0
  }

  pub fn flip_sign(self) -> Sig {
    Sig { rep: self.rep ^ 1 }
  }

  pub fn match_(self, name: &str, arity: u32, sign: bool) -> bool {
    istr(&self.name()) == name && self.arity() == arity && self.sign() == sign
  }
}

impl PartialOrd for Sig {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Sig {
  fn cmp(&self, other: &Self) -> Ordering {
    istr(&self.name())
        .cmp(istr(&other.name()))
        .then_with(|| self.arity().cmp(&other.arity()))
        .then_with(|| self.sign().cmp(&other.sign()))
  }
}

impl Display for Sig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.sign() {
      write!(f, "-")?;
    }
    write!(f, "{}/{}", self.name(), self.arity())
  }
}

impl Debug for Sig {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

// endregion Signature

// region quote/unquote

pub fn quote(s: &str) -> String {
  let mut res = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '\n' => res.push_str("\\n"),
      '\\' => res.push_str("\\\\"),
      '"' => res.push_str("\\\""),
      c => res.push(c),
    }
  }
  res
}

pub fn unquote(s: &str) -> String {
  let mut res = String::with_capacity(s.len());
  let mut slash = false;
  for c in s.chars() {
    if slash {
      match c {
        'n' => res.push('\n'),
        '\\' => res.push('\\'),
        '"' => res.push('"'),
        c => res.push(c),
      }
      slash = false;
    } else if c == '\\' {
      slash = true;
    } else {
      res.push(c);
    }
  }
  res
}

// endregion quote/unquote


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_gives_representation_equality() {
    let a = Symbol::create_fun("f", vec![Symbol::create_num(1), Symbol::create_str("x")], false);
    let b = Symbol::create_fun("f", vec![Symbol::create_num(1), Symbol::create_str("x")], false);
    assert_eq!(a, b);
    let c = Symbol::create_fun("f", vec![Symbol::create_num(2), Symbol::create_str("x")], false);
    assert_ne!(a, c);
  }

  #[test]
  fn total_order() {
    let inf = Symbol::create_inf();
    let sup = Symbol::create_sup();
    let n1 = Symbol::create_num(1);
    let n2 = Symbol::create_num(2);
    let s = Symbol::create_str("a");
    let f = Symbol::create_id("a", false);
    assert!(inf < n1 && n1 < n2 && n2 < s && s < f && f < sup);

    // Functions order by sign, name, arity, then arguments.
    let f1 = Symbol::create_fun("f", vec![n1], false);
    let f2 = Symbol::create_fun("f", vec![n2], false);
    let g1 = Symbol::create_fun("g", vec![n1], false);
    let f12 = Symbol::create_fun("f", vec![n1, n2], false);
    let neg_f1 = f1.flip_sign();
    assert!(f1 < f2 && f2 < f12 && f12 < g1);
    assert!(f1 < neg_f1);
  }

  #[test]
  fn signatures() {
    let sym = Symbol::create_fun("edge", vec![Symbol::create_num(1), Symbol::create_num(2)], false);
    assert!(sym.has_sig());
    let sig = sym.sig();
    assert!(sig.match_("edge", 2, false));
    assert_eq!(sig, Sig::new("edge", 2, false));
    assert_eq!(sig.flip_sign(), Sig::new("edge", 2, true));
    assert_eq!(sig.to_string(), "edge/2");
  }

  #[test]
  fn printing() {
    assert_eq!(Symbol::create_num(-3).to_string(), "-3");
    assert_eq!(Symbol::create_str("a\"b").to_string(), "\"a\\\"b\"");
    assert_eq!(Symbol::create_id("a", false).to_string(), "a");
    assert_eq!(
      Symbol::create_fun("f", vec![Symbol::create_num(1)], true).to_string(),
      "-f(1)"
    );
    assert_eq!(Symbol::create_tuple(vec![]).to_string(), "()");
    assert_eq!(Symbol::create_tuple(vec![Symbol::create_num(1)]).to_string(), "(1,)");
    assert_eq!(
      Symbol::create_tuple(vec![Symbol::create_num(1), Symbol::create_num(2)]).to_string(),
      "(1,2)"
    );
    assert_eq!(Symbol::create_inf().to_string(), "#inf");
    assert_eq!(Symbol::create_sup().to_string(), "#sup");
  }

  #[test]
  fn flip_sign_and_replace() {
    assert_eq!(Symbol::create_num(3).flip_sign(), Symbol::create_num(-3));
    let mut defs = HashMap::default();
    defs.insert(IString::from("n"), Symbol::create_num(7));
    let t = Symbol::create_fun("f", vec![Symbol::create_id("n", false)], false);
    assert_eq!(
      t.replace(&defs),
      Symbol::create_fun("f", vec![Symbol::create_num(7)], false)
    );
  }
}
