//! Sparse vectors of rationals, indexed by variable or constraint index.
//!
//! Entries are kept in a `BTreeMap` so that iteration order is the index
//! order; the completer relies on this when it prints multiplier lists.
//! Explicit zeros may appear after arithmetic and are dropped by
//! `compactify`; equality is literal over the stored entries, so callers
//! compactify and retry on mismatch, as the derivation engine does.

use std::collections::BTreeMap;
use num_traits::Zero;
use crate::rational::Rat;

#[derive(Clone, Debug, Default)]
pub struct SVec {
  entries: BTreeMap<usize, Rat>,
  compact: bool,
}

impl PartialEq for SVec {
  /// Literal comparison of the stored entries; explicit zeros count, so
  /// compactify both sides first when a semantic comparison is wanted.
  fn eq(&self, other: &SVec) -> bool {
    self.entries == other.entries
  }
}

impl Eq for SVec {}

impl SVec {
  pub fn new() -> Self {
    SVec { entries: BTreeMap::new(), compact: true }
  }

  pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, Rat)>) -> Self {
    let mut v = SVec::new();
    for (i, a) in pairs { v.set(i, a) }
    v
  }

  pub fn set(&mut self, i: usize, a: Rat) {
    self.compact = false;
    self.entries.insert(i, a);
  }

  pub fn get(&self, i: usize) -> Rat {
    self.entries.get(&i).cloned().unwrap_or_else(Rat::zero)
  }

  pub fn add_scaled(&mut self, other: &SVec, a: &Rat) {
    for (&i, v) in &other.entries {
      let e = self.entries.entry(i).or_insert_with(Rat::zero);
      *e += a * v;
    }
    self.compact = false;
  }

  pub fn compactify(&mut self) {
    if !self.compact {
      self.entries.retain(|_, v| !v.is_zero());
      self.compact = true;
    }
  }

  pub fn is_compact(&self) -> bool { self.compact }

  /// Number of stored entries (including explicit zeros before compactify).
  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (usize, &Rat)> {
    self.entries.iter().map(|(&i, v)| (i, v))
  }

  pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
    self.entries.keys().copied()
  }

  pub fn sub(&self, other: &SVec) -> SVec {
    let mut res = self.clone();
    for (&i, v) in &other.entries {
      let e = res.entries.entry(i).or_insert_with(Rat::zero);
      *e -= v;
    }
    res.compact = false;
    res
  }

  /// Sum over the intersection of the supports.
  pub fn scalar_product(&self, other: &SVec) -> Rat {
    let mut prod = Rat::zero();
    for (&i, v) in &self.entries {
      if let Some(w) = other.entries.get(&i) { prod += v * w }
    }
    prod
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rational::{rat, rat_frac};

  #[test]
  fn set_get_compactify() {
    let mut v = SVec::new();
    v.set(3, rat(2));
    v.set(1, rat(0));
    assert_eq!(v.get(3), rat(2));
    assert_eq!(v.get(7), rat(0));
    assert_eq!(v.len(), 2);
    v.compactify();
    assert_eq!(v.len(), 1);
    assert!(v.is_compact());
  }

  #[test]
  fn literal_equality_needs_compactify() {
    let mut a = SVec::from_pairs([(0, rat(1)), (2, rat(0))]);
    let b = SVec::from_pairs([(0, rat(1))]);
    assert_ne!(a, b);
    a.compactify();
    let mut b = b;
    b.compactify();
    assert_eq!(a, b);
  }

  #[test]
  fn compactify_is_idempotent_and_order_independent() {
    let mut a = SVec::new();
    a.set(5, rat(1));
    a.set(2, rat_frac(1, 2));
    a.set(9, rat(0));
    let mut b = SVec::new();
    b.set(9, rat(0));
    b.set(2, rat_frac(1, 2));
    b.set(5, rat(1));
    a.compactify();
    a.compactify();
    b.compactify();
    assert_eq!(a, b);
  }

  #[test]
  fn sub_and_scalar_product() {
    let a = SVec::from_pairs([(0, rat(2)), (1, rat(3))]);
    let b = SVec::from_pairs([(1, rat(3)), (2, rat(-1))]);
    let mut d = a.sub(&b);
    d.compactify();
    assert_eq!(d, SVec::from_pairs([(0, rat(2)), (2, rat(1))]));
    assert_eq!(a.scalar_product(&b), rat(9));
    assert_eq!(b.scalar_product(&a), rat(9));
  }

  #[test]
  fn add_scaled_accumulates() {
    let mut v = SVec::from_pairs([(0, rat(1))]);
    let w = SVec::from_pairs([(0, rat(2)), (1, rat(4))]);
    v.add_scaled(&w, &rat_frac(1, 2));
    v.compactify();
    assert_eq!(v, SVec::from_pairs([(0, rat(2)), (1, rat(2))]));
  }
}
