/*!

The non-ground term AST. A `Term` is a tree over variables, ground values, arithmetic, function applications, tuples,
pools, and intervals. Terms appear as predicate templates, aggregate tuples, and guard expressions; the grounding
engine drives them through three operations:

 - `eval` evaluates under the current variable assignment, yielding `None` on arithmetic type errors;
 - `match_` unifies against a ground symbol, writing bindings through shared variable cells;
 - `bind` precomputes, for a set of already-bound variables, which occurrences *bind* (first unbound occurrence)
   and which merely test equality.

All occurrences of the same variable name within one rule share a single mutable binding slot (a `VarCell`), so a
binding made through one occurrence is visible at every other. The instantiator owns these cells for the duration of
one enumeration step; nothing retains their contents across `next()` calls.

Arithmetic positions never bind: a variable under `+`, `..`, or friends must already be bound when the term is
evaluated, and the safety checker accounts for that via the `binding` flag of `collect_vars`.

*/

use std::cell::{Cell, RefCell};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use crate::{
  abstractions::{HashMap, IString, Set},
  api::symbol::{Symbol, SymbolType, SymbolVec},
};

pub type BxTerm = Box<Term>;
pub type TermVec = Vec<Term>;
/// Bound-variable name sets used during safety analysis and binder construction.
pub type VarSet = Set<IString>;
/// A shared, mutable variable binding slot.
pub type VarCell = Rc<RefCell<Option<Symbol>>>;
/// Variable occurrences together with their can-bind flag, in collection order.
pub type VarBoundVec = Vec<(IString, bool)>;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum UnOp {
  Neg,
  Abs,
  Not,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum BinOp {
  Xor,
  Or,
  And,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Pow,
}

/// One occurrence of a variable. The `cell` is shared among all occurrences of the same name in the same rule; the
/// `binds` flag is per occurrence and precomputed by `Term::bind`.
#[derive(Clone)]
pub struct VarTerm {
  pub name : IString,
  pub cell : VarCell,
  pub binds: Cell<bool>,
}

impl VarTerm {
  pub fn new(name: impl Into<IString>) -> VarTerm {
    VarTerm {
      name : name.into(),
      cell : Rc::new(RefCell::new(None)),
      binds: Cell::new(false),
    }
  }
}

#[derive(Clone)]
pub enum Term {
  /// A ground value leaf.
  Val(Symbol),
  Var(VarTerm),
  UnOp(UnOp, BxTerm),
  BinOp(BinOp, BxTerm, BxTerm),
  /// A function application; `neg` is classical negation on the resulting symbol.
  Fun {
    name: IString,
    args: TermVec,
    neg : bool,
  },
  Tuple(TermVec),
  /// Alternatives; expanded away by `unpool` before grounding.
  Pool(TermVec),
  /// An interval `left..right`; only meaningful underneath a range literal.
  Range(BxTerm, BxTerm),
}

impl Term {
  pub fn fun(name: impl Into<IString>, args: TermVec) -> Term {
    Term::Fun { name: name.into(), args, neg: false }
  }

  pub fn var(name: impl Into<IString>) -> Term {
    Term::Var(VarTerm::new(name))
  }

  // region Variable bookkeeping

  /// Reports every variable occurrence along with whether the occurrence can bind. Occurrences under arithmetic,
  /// pools, and intervals can never bind; everywhere else the `binding` argument decides.
  pub fn collect_vars(&self, out: &mut VarBoundVec, binding: bool) {
    match self {
      Term::Val(_) => {}
      Term::Var(v) => out.push((v.name.clone(), binding)),
      Term::UnOp(_, inner) => inner.collect_vars(out, false),
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.collect_vars(out, false);
        rhs.collect_vars(out, false);
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          arg.collect_vars(out, binding);
        }
      }
    }
  }

  /// Marks which occurrences bind, given the variables bound by the surrounding context, and extends `bound` with
  /// the names this term will bind. Returns whether any occurrence binds.
  pub fn bind(&self, bound: &mut VarSet) -> bool {
    match self {
      Term::Val(_) => false,
      Term::Var(v) => {
        if bound.contains(&v.name) {
          v.binds.set(false);
          false
        } else {
          bound.insert(v.name.clone());
          v.binds.set(true);
          true
        }
      }
      Term::UnOp(_, inner) => {
        inner.mark_nonbinding();
        false
      }
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.mark_nonbinding();
        rhs.mark_nonbinding();
        false
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        let mut any = false;
        for arg in args {
          any |= arg.bind(bound);
        }
        any
      }
    }
  }

  fn mark_nonbinding(&self) {
    match self {
      Term::Val(_) => {}
      Term::Var(v) => v.binds.set(false),
      Term::UnOp(_, inner) => inner.mark_nonbinding(),
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.mark_nonbinding();
        rhs.mark_nonbinding();
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          arg.mark_nonbinding();
        }
      }
    }
  }

  /// Rebuilds the term so that all occurrences of the same variable name share one cell, creating cells on demand.
  /// The statement builder calls this once per rule when lowering the IR.
  pub fn share_vars(&mut self, cells: &mut HashMap<IString, VarCell>) {
    match self {
      Term::Val(_) => {}
      Term::Var(v) => {
        let cell = cells.entry(v.name.clone()).or_insert_with(|| Rc::new(RefCell::new(None)));
        v.cell = cell.clone();
      }
      Term::UnOp(_, inner) => inner.share_vars(cells),
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.share_vars(cells);
        rhs.share_vars(cells);
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          arg.share_vars(cells);
        }
      }
    }
  }

  /// Clones the term with *fresh* cells, returning the renaming. Index import templates use this so that matching
  /// appended atoms does not write through the enclosing rule's cells.
  pub fn rename_vars(&self, renaming: &mut HashMap<IString, VarCell>) -> Term {
    let mut clone = self.clone();
    clone.share_vars(renaming);
    clone
  }

  /// Gathers the term's cells by variable name.
  pub fn collect_cells(&self, out: &mut HashMap<IString, VarCell>) {
    match self {
      Term::Val(_) => {}
      Term::Var(v) => {
        out.entry(v.name.clone()).or_insert_with(|| v.cell.clone());
      }
      Term::UnOp(_, inner) => inner.collect_cells(out),
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.collect_cells(out);
        rhs.collect_cells(out);
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          arg.collect_cells(out);
        }
      }
    }
  }

  // endregion Variable bookkeeping

  /// Evaluates under the current assignment. `None` means the operation is undefined: an arithmetic type error, an
  /// unbound variable, or a pool/interval in value position.
  pub fn eval(&self) -> Option<Symbol> {
    match self {
      Term::Val(sym) => Some(*sym),

      Term::Var(v) => *v.cell.borrow(),

      Term::UnOp(op, inner) => {
        let value = inner.eval()?;
        match op {
          UnOp::Neg => match value.symbol_type() {
            SymbolType::Num => value.num().checked_neg().map(Symbol::create_num),
            SymbolType::Fun => Some(value.flip_sign()),
            _ => None,
          },
          UnOp::Abs => match value.symbol_type() {
            SymbolType::Num => value.num().checked_abs().map(Symbol::create_num),
            _ => None,
          },
          UnOp::Not => match value.symbol_type() {
            SymbolType::Num => Some(Symbol::create_num(!value.num())),
            _ => None,
          },
        }
      }

      Term::BinOp(op, lhs, rhs) => {
        let l = lhs.eval()?;
        let r = rhs.eval()?;
        if l.symbol_type() != SymbolType::Num || r.symbol_type() != SymbolType::Num {
          return None;
        }
        let (l, r) = (l.num(), r.num());
        let value = match op {
          BinOp::Xor => Some(l ^ r),
          BinOp::Or => Some(l | r),
          BinOp::And => Some(l & r),
          BinOp::Add => Some(l.wrapping_add(r)),
          BinOp::Sub => Some(l.wrapping_sub(r)),
          BinOp::Mul => Some(l.wrapping_mul(r)),
          BinOp::Div => l.checked_div(r),
          BinOp::Mod => l.checked_rem(r),
          BinOp::Pow => {
            if r < 0 {
              None
            } else {
              Some(l.wrapping_pow(r as u32))
            }
          }
        };
        value.map(Symbol::create_num)
      }

      Term::Fun { name, args, neg } => {
        let mut values = SymbolVec::with_capacity(args.len());
        for arg in args {
          values.push(arg.eval()?);
        }
        Some(Symbol::create_fun(name.clone(), values, *neg))
      }

      Term::Tuple(args) => {
        let mut values = SymbolVec::with_capacity(args.len());
        for arg in args {
          values.push(arg.eval()?);
        }
        Some(Symbol::create_tuple(values))
      }

      Term::Pool(_) | Term::Range(_, _) => None,
    }
  }

  /// Unifies this term with a ground symbol, writing through binding cells. Occurrences marked non-binding test
  /// equality instead; arithmetic subterms match by evaluation.
  pub fn match_(&self, sym: Symbol) -> bool {
    match self {
      Term::Val(value) => *value == sym,

      Term::Var(v) => {
        if v.binds.get() {
          *v.cell.borrow_mut() = Some(sym);
          true
        } else {
          *v.cell.borrow() == Some(sym)
        }
      }

      Term::Fun { name, args, neg } => {
        if sym.symbol_type() != SymbolType::Fun
            || sym.sign() != *neg
            || sym.arity() as usize != args.len()
            || sym.name() != *name
        {
          return false;
        }
        args.iter().zip(sym.args()).all(|(arg, value)| arg.match_(value))
      }

      Term::Tuple(args) => {
        if sym.symbol_type() != SymbolType::Fun || !sym.name().is_empty() || sym.arity() as usize != args.len() {
          return false;
        }
        args.iter().zip(sym.args()).all(|(arg, value)| arg.match_(value))
      }

      // Evaluation-only positions.
      Term::UnOp(..) | Term::BinOp(..) | Term::Range(..) | Term::Pool(_) => self.eval() == Some(sym),
    }
  }

  /// Is the term variable-free?
  pub fn is_ground(&self) -> bool {
    let mut vars = VarBoundVec::new();
    self.collect_vars(&mut vars, false);
    vars.is_empty()
  }

  /// Expands pools into the cross product of their alternatives.
  pub fn unpool(&self) -> TermVec {
    fn product(args: &[Term]) -> Vec<TermVec> {
      let mut rows: Vec<TermVec> = vec![Vec::new()];
      for arg in args {
        let choices = arg.unpool();
        let mut next = Vec::with_capacity(rows.len() * choices.len());
        for row in &rows {
          for choice in &choices {
            let mut row = row.clone();
            row.push(choice.clone());
            next.push(row);
          }
        }
        rows = next;
      }
      rows
    }

    match self {
      Term::Val(_) | Term::Var(_) => vec![self.clone()],
      Term::Pool(alternatives) => alternatives.iter().flat_map(|alt| alt.unpool()).collect(),
      Term::UnOp(op, inner) => inner.unpool().into_iter().map(|t| Term::UnOp(*op, Box::new(t))).collect(),
      Term::BinOp(op, lhs, rhs) => {
        let mut out = TermVec::new();
        for l in lhs.unpool() {
          for r in rhs.unpool() {
            out.push(Term::BinOp(*op, Box::new(l.clone()), Box::new(r)));
          }
        }
        out
      }
      Term::Range(lhs, rhs) => {
        let mut out = TermVec::new();
        for l in lhs.unpool() {
          for r in rhs.unpool() {
            out.push(Term::Range(Box::new(l.clone()), Box::new(r)));
          }
        }
        out
      }
      Term::Fun { name, args, neg } => product(args)
          .into_iter()
          .map(|args| Term::Fun { name: name.clone(), args, neg: *neg })
          .collect(),
      Term::Tuple(args) => product(args).into_iter().map(Term::Tuple).collect(),
    }
  }

  /// Replaces named constants by their definitions in all ground leaves.
  pub fn replace(&mut self, defs: &HashMap<IString, Symbol>) {
    match self {
      Term::Val(sym) => *sym = sym.replace(defs),
      Term::Var(_) => {}
      Term::UnOp(_, inner) => inner.replace(defs),
      Term::BinOp(_, lhs, rhs) | Term::Range(lhs, rhs) => {
        lhs.replace(defs);
        rhs.replace(defs);
      }
      Term::Fun { args, .. } | Term::Tuple(args) | Term::Pool(args) => {
        for arg in args {
          arg.replace(defs);
        }
      }
    }
  }

  /// Structural equality ignoring cell identity; used to recognize reusable secondary indices.
  pub fn same_shape(&self, other: &Term) -> bool {
    match (self, other) {
      (Term::Val(a), Term::Val(b)) => a == b,
      (Term::Var(a), Term::Var(b)) => a.name == b.name && a.binds.get() == b.binds.get(),
      (Term::UnOp(op_a, a), Term::UnOp(op_b, b)) => op_a == op_b && a.same_shape(b),
      (Term::BinOp(op_a, la, ra), Term::BinOp(op_b, lb, rb)) => op_a == op_b && la.same_shape(lb) && ra.same_shape(rb),
      (Term::Range(la, ra), Term::Range(lb, rb)) => la.same_shape(lb) && ra.same_shape(rb),
      (Term::Fun { name: na, args: aa, neg: ga }, Term::Fun { name: nb, args: ab, neg: gb }) => {
        na == nb && ga == gb && aa.len() == ab.len() && aa.iter().zip(ab).all(|(a, b)| a.same_shape(b))
      }
      (Term::Tuple(aa), Term::Tuple(ab)) | (Term::Pool(aa), Term::Pool(ab)) => {
        aa.len() == ab.len() && aa.iter().zip(ab).all(|(a, b)| a.same_shape(b))
      }
      _ => false,
    }
  }
}

impl Display for Term {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Term::Val(sym) => write!(f, "{}", sym),
      Term::Var(v) => write!(f, "{}", v.name),
      Term::UnOp(op, inner) => match op {
        UnOp::Neg => write!(f, "-{}", inner),
        UnOp::Abs => write!(f, "|{}|", inner),
        UnOp::Not => write!(f, "~{}", inner),
      },
      Term::BinOp(op, lhs, rhs) => {
        let op = match op {
          BinOp::Xor => "^",
          BinOp::Or => "?",
          BinOp::And => "&",
          BinOp::Add => "+",
          BinOp::Sub => "-",
          BinOp::Mul => "*",
          BinOp::Div => "/",
          BinOp::Mod => "\\",
          BinOp::Pow => "**",
        };
        write!(f, "({}{}{})", lhs, op, rhs)
      }
      Term::Fun { name, args, neg } => {
        if *neg {
          write!(f, "-")?;
        }
        write!(f, "{}", name)?;
        if !args.is_empty() {
          write!(f, "(")?;
          let mut sep = false;
          for arg in args {
            if sep {
              write!(f, ",")?;
            }
            sep = true;
            write!(f, "{}", arg)?;
          }
          write!(f, ")")?;
        }
        Ok(())
      }
      Term::Tuple(args) => {
        write!(f, "(")?;
        let mut sep = false;
        for arg in args {
          if sep {
            write!(f, ",")?;
          }
          sep = true;
          write!(f, "{}", arg)?;
        }
        if args.len() == 1 {
          write!(f, ",")?;
        }
        write!(f, ")")
      }
      Term::Pool(alternatives) => {
        let mut sep = false;
        for alt in alternatives {
          if sep {
            write!(f, ";")?;
          }
          sep = true;
          write!(f, "{}", alt)?;
        }
        Ok(())
      }
      Term::Range(lhs, rhs) => write!(f, "{}..{}", lhs, rhs),
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn shared(term: &mut Term) -> HashMap<IString, VarCell> {
    let mut cells = HashMap::default();
    term.share_vars(&mut cells);
    cells
  }

  #[test]
  fn eval_arithmetic() {
    let t = Term::BinOp(
      BinOp::Add,
      Box::new(Term::Val(Symbol::create_num(2))),
      Box::new(Term::Val(Symbol::create_num(3))),
    );
    assert_eq!(t.eval(), Some(Symbol::create_num(5)));

    let div0 = Term::BinOp(
      BinOp::Div,
      Box::new(Term::Val(Symbol::create_num(2))),
      Box::new(Term::Val(Symbol::create_num(0))),
    );
    assert_eq!(div0.eval(), None);

    let bad = Term::BinOp(
      BinOp::Add,
      Box::new(Term::Val(Symbol::create_num(2))),
      Box::new(Term::Val(Symbol::create_str("a"))),
    );
    assert_eq!(bad.eval(), None);
  }

  #[test]
  fn match_binds_through_shared_cells() {
    // f(X, X) against f(1, 1) and f(1, 2).
    let mut template = Term::fun("f", vec![Term::var("X"), Term::var("X")]);
    let cells = shared(&mut template);
    let mut bound = VarSet::default();
    assert!(template.bind(&mut bound));
    assert!(bound.contains(&IString::from("X")));

    let f11 = Symbol::create_fun("f", vec![Symbol::create_num(1), Symbol::create_num(1)], false);
    let f12 = Symbol::create_fun("f", vec![Symbol::create_num(1), Symbol::create_num(2)], false);
    assert!(template.match_(f11));
    assert_eq!(*cells[&IString::from("X")].borrow(), Some(Symbol::create_num(1)));
    // The second occurrence is non-binding, so the mismatching argument rejects.
    assert!(!template.match_(f12));
  }

  #[test]
  fn bound_occurrences_test_equality() {
    let mut template = Term::fun("p", vec![Term::var("X")]);
    let cells = shared(&mut template);
    let mut bound = VarSet::default();
    bound.insert(IString::from("X"));
    assert!(!template.bind(&mut bound));

    *cells[&IString::from("X")].borrow_mut() = Some(Symbol::create_num(7));
    let p7 = Symbol::create_fun("p", vec![Symbol::create_num(7)], false);
    let p8 = Symbol::create_fun("p", vec![Symbol::create_num(8)], false);
    assert!(template.match_(p7));
    assert!(!template.match_(p8));
  }

  #[test]
  fn unpool_cross_product() {
    // f(1;2, 3;4) has four instances.
    let t = Term::fun(
      "f",
      vec![
        Term::Pool(vec![Term::Val(Symbol::create_num(1)), Term::Val(Symbol::create_num(2))]),
        Term::Pool(vec![Term::Val(Symbol::create_num(3)), Term::Val(Symbol::create_num(4))]),
      ],
    );
    let expanded = t.unpool();
    assert_eq!(expanded.len(), 4);
    let values: Vec<_> = expanded.iter().map(|t| t.eval().unwrap()).collect();
    assert!(values.contains(&Symbol::create_fun(
      "f",
      vec![Symbol::create_num(2), Symbol::create_num(3)],
      false
    )));
  }

  #[test]
  fn classical_negation_matches() {
    let mut template = Term::Fun { name: IString::from("p"), args: vec![Term::var("X")], neg: true };
    shared(&mut template);
    let mut bound = VarSet::default();
    template.bind(&mut bound);
    let neg_p1 = Symbol::create_fun("p", vec![Symbol::create_num(1)], true);
    let pos_p1 = Symbol::create_fun("p", vec![Symbol::create_num(1)], false);
    assert!(template.match_(neg_p1));
    assert!(!template.match_(pos_p1));
  }
}
