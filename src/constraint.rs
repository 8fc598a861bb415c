//! Constraints over shared sparse coefficient vectors.
//!
//! The objective coefficient vector is one `Arc<SVec>` shared by every
//! constraint spelled with the literal `OBJ` token; `coef_is_obj` records
//! that identity, which the `sol` derivation rule requires. Trashing a
//! constraint drops its share of the coefficients and empties the rest of
//! the record; the index stays valid but the constraint must never be read
//! again.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use num_traits::{Signed, Zero};
use crate::rational::Rat;
use crate::svec::SVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sense { Le, Eq, Ge }

impl Sense {
  pub fn sign(self) -> i32 {
    match self { Sense::Le => -1, Sense::Eq => 0, Sense::Ge => 1 }
  }

  pub fn from_sign(s: i32) -> Sense {
    if s < 0 { Sense::Le } else if s > 0 { Sense::Ge } else { Sense::Eq }
  }

  pub fn letter(self) -> char {
    match self { Sense::Le => 'L', Sense::Eq => 'E', Sense::Ge => 'G' }
  }

  pub fn from_letter(c: &str) -> Option<Sense> {
    match c {
      "L" => Some(Sense::Le),
      "E" => Some(Sense::Eq),
      "G" => Some(Sense::Ge),
      _ => None,
    }
  }
}

pub type Scope = BTreeSet<usize>;

#[derive(Clone, Debug)]
pub struct Constraint {
  label: String,
  sense: Sense,
  rhs: Rat,
  coef: Arc<SVec>,
  scope: Scope,
  is_assumption: bool,
  coef_is_obj: bool,
  falsehood: bool,
  trashed: bool,
  max_ref: i64,
}

impl Constraint {
  pub fn new(label: impl Into<String>, sense: Sense, rhs: Rat, mut coef: Arc<SVec>,
      is_assumption: bool, scope: Scope) -> Constraint {
    if !coef.is_compact() { Arc::make_mut(&mut coef).compactify() }
    let falsehood = coef.is_empty() &&
      ((sense.sign() <= 0 && rhs.is_negative()) || (sense.sign() >= 0 && rhs.is_positive()));
    Constraint {
      label: label.into(), sense, rhs, coef, scope, is_assumption,
      coef_is_obj: false, falsehood, trashed: false, max_ref: -1,
    }
  }

  pub fn label(&self) -> &str { &self.label }
  pub fn sense(&self) -> Sense { self.sense }
  pub fn rhs(&self) -> &Rat { &self.rhs }
  pub fn coef(&self) -> &SVec { &self.coef }
  pub fn coef_arc(&self) -> &Arc<SVec> { &self.coef }
  pub fn is_assumption(&self) -> bool { self.is_assumption }
  pub fn is_falsehood(&self) -> bool { self.falsehood }

  pub fn is_tautology(&self) -> bool {
    self.coef.is_empty() &&
      ((self.sense == Sense::Eq && self.rhs.is_zero())
        || (self.sense == Sense::Le && !self.rhs.is_negative())
        || (self.sense == Sense::Ge && !self.rhs.is_positive()))
  }

  pub fn mark_objective(&mut self) { self.coef_is_obj = true }
  pub fn has_objective_coefficients(&self) -> bool { self.coef_is_obj }

  pub fn scope(&self) -> &Scope { &self.scope }
  pub fn set_scope(&mut self, scope: Scope) { self.scope = scope }

  pub fn max_ref(&self) -> i64 { self.max_ref }
  pub fn set_max_ref(&mut self, r: i64) { self.max_ref = r }

  pub fn is_trashed(&self) -> bool { self.trashed }

  pub fn trash(&mut self) {
    self.trashed = true;
    self.falsehood = false;
    self.coef = Arc::new(SVec::new());
    self.rhs = Rat::zero();
    self.scope.clear();
  }

  pub fn canonicalize(&mut self) {
    if !self.coef.is_compact() { Arc::make_mut(&mut self.coef).compactify() }
  }

  /// Chvátal-Gomory rounding: every variable carrying a nonzero coefficient
  /// must be integer and every coefficient integral, then the right-hand
  /// side moves to the nearest integer in the valid direction.
  pub fn round(&mut self, is_int: &[bool]) -> Result<(), String> {
    for (j, a) in self.coef.iter() {
      if a.is_zero() { continue }
      if !is_int.get(j).copied().unwrap_or(false) {
        return Err(format!("variable with index {} is not an integer variable", j));
      }
      if !a.is_integer() {
        return Err(format!("coefficient of integer variable with index {} is not an integer", j));
      }
    }
    if self.sense.sign() < 0 {
      self.rhs = self.rhs.floor();
    } else if self.sense.sign() > 0 {
      self.rhs = self.rhs.ceil();
    }
    Ok(())
  }

  /// True iff every point satisfying `self` satisfies `other`. A falsehood
  /// dominates everything; otherwise the coefficient vectors must compare
  /// equal (literally; callers compactify and retry once on mismatch) and
  /// the senses and sides must imply the other constraint.
  pub fn dominates(&self, other: &Constraint) -> bool {
    if self.is_falsehood() { return true }
    if *self.coef != *other.coef { return false }
    (other.sense.sign() > 0 && self.sense.sign() >= 0 && self.rhs >= other.rhs)
      || (other.sense.sign() < 0 && self.sense.sign() <= 0 && self.rhs <= other.rhs)
      || (other.sense == Sense::Eq && self.sense == Sense::Eq && self.rhs == other.rhs)
  }

  /// Human-readable rendering for diagnostics, e.g. `2 x + 3 y <= 1`.
  pub fn render(&self, vars: &[String]) -> String {
    let mut out = String::new();
    if self.is_assumption { out.push_str("Is assumption: ") }
    let mut first = true;
    for (j, a) in self.coef.iter() {
      if a.is_zero() { continue }
      let mag = a.abs();
      if a.is_negative() {
        out.push_str(if first { "- " } else { " - " });
      } else if !first {
        out.push_str(" + ");
      }
      if mag != crate::rational::rat(1) {
        let _ = write!(out, "{} ", mag);
      }
      match vars.get(j) {
        Some(name) => out.push_str(name),
        None => { let _ = write!(out, "x{}", j); }
      }
      first = false;
    }
    if first { out.push('0') }
    let op = match self.sense { Sense::Le => "<=", Sense::Eq => "=", Sense::Ge => ">=" };
    let _ = write!(out, " {} {}", op, self.rhs);
    out
  }

  /// Elementwise difference, used when reporting a failed dominance check.
  pub fn difference(&self, other: &Constraint) -> Constraint {
    let mut coef = self.coef.sub(&other.coef);
    coef.compactify();
    Constraint::new("difference", self.sense, &self.rhs - &other.rhs, Arc::new(coef),
      false, Scope::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rational::{rat, rat_frac};

  fn con(sense: Sense, rhs: Rat, pairs: &[(usize, i64)]) -> Constraint {
    let v = SVec::from_pairs(pairs.iter().map(|&(i, a)| (i, rat(a))));
    Constraint::new("t", sense, rhs, Arc::new(v), false, Scope::new())
  }

  #[test]
  fn falsehood_and_tautology() {
    assert!(con(Sense::Le, rat(-1), &[]).is_falsehood());
    assert!(con(Sense::Ge, rat(1), &[]).is_falsehood());
    assert!(!con(Sense::Le, rat(0), &[]).is_falsehood());
    assert!(con(Sense::Le, rat(0), &[]).is_tautology());
    assert!(con(Sense::Ge, rat(-3), &[]).is_tautology());
    assert!(con(Sense::Eq, rat(0), &[]).is_tautology());
    assert!(!con(Sense::Eq, rat(1), &[]).is_tautology());
    assert!(!con(Sense::Le, rat(0), &[(0, 1)]).is_falsehood());
  }

  #[test]
  fn dominance_table() {
    let le1 = con(Sense::Le, rat(1), &[(0, 2)]);
    let le2 = con(Sense::Le, rat(2), &[(0, 2)]);
    let eq1 = con(Sense::Eq, rat(1), &[(0, 2)]);
    let ge0 = con(Sense::Ge, rat(0), &[(0, 2)]);
    assert!(le1.dominates(&le2));
    assert!(!le2.dominates(&le1));
    assert!(eq1.dominates(&le1));
    assert!(eq1.dominates(&le2));
    assert!(eq1.dominates(&ge0));
    assert!(!le1.dominates(&eq1));
    assert!(eq1.dominates(&eq1));
    // falsehood dominates anything, even with different coefficients
    let falsehood = con(Sense::Ge, rat(5), &[]);
    assert!(falsehood.dominates(&le1));
    // different coefficient vectors never dominate otherwise
    let other = con(Sense::Le, rat(1), &[(1, 2)]);
    assert!(!le1.dominates(&other));
  }

  #[test]
  fn dominance_is_transitive_on_equal_vectors() {
    let a = con(Sense::Le, rat(0), &[(0, 1)]);
    let b = con(Sense::Le, rat(1), &[(0, 1)]);
    let c = con(Sense::Le, rat(2), &[(0, 1)]);
    assert!(a.dominates(&b) && b.dominates(&c) && a.dominates(&c));
  }

  #[test]
  fn rounding() {
    let is_int = [true, false];
    let mut c = con(Sense::Le, rat_frac(7, 2), &[(0, 2)]);
    c.round(&is_int).unwrap();
    assert_eq!(*c.rhs(), rat(3));
    let mut c = con(Sense::Ge, rat_frac(1, 2), &[(0, 1)]);
    let claimed = con(Sense::Ge, rat_frac(1, 2), &[(0, 1)]);
    c.round(&is_int).unwrap();
    assert_eq!(*c.rhs(), rat(1));
    assert!(c.dominates(&claimed));
    // continuous variable in the support
    let mut c = con(Sense::Le, rat(1), &[(1, 1)]);
    assert!(c.round(&is_int).is_err());
    // fractional coefficient on an integer variable
    let v = SVec::from_pairs([(0, rat_frac(2, 3))]);
    let mut c = Constraint::new("t", Sense::Le, rat_frac(1, 3), Arc::new(v), false, Scope::new());
    assert!(c.round(&is_int).is_err());
  }

  #[test]
  fn trash_clears_the_record() {
    let mut c = con(Sense::Le, rat(1), &[(0, 2)]);
    c.set_scope(Scope::from([3]));
    c.trash();
    assert!(c.is_trashed());
    assert!(c.coef().is_empty());
    assert!(c.scope().is_empty());
    assert!(!c.is_falsehood());
  }

  #[test]
  fn render_reads_naturally() {
    let vars = vec!["x".to_string(), "y".to_string()];
    let v = SVec::from_pairs([(0, rat(2)), (1, rat(-1))]);
    let c = Constraint::new("t", Sense::Le, rat(1), Arc::new(v), false, Scope::new());
    assert_eq!(c.render(&vars), "2 x - y <= 1");
    let zero = con(Sense::Ge, rat(1), &[]);
    assert_eq!(zero.render(&vars), "0 >= 1");
  }
}
