//! Interface to the exact-rational LP solver and the per-worker LP context.
//!
//! The solver itself is a collaborator behind the `LpSolver` trait; the
//! completer only needs objective installation, row editing with an index
//! remap, an optimize call, and the dual information of the final basis.
//! `LpContext` owns one solver instance plus the bidirectional map between
//! LP rows and certificate indices; the two sides of the map are edited in
//! lockstep with every row addition and removal.

use hashbrown::{HashMap, HashSet};
use crate::constraint::{Constraint, Sense};
use crate::rational::Rat;
use crate::svec::SVec;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LpStatus {
  Optimal,
  Infeasible,
  Other(String),
}

pub trait LpSolver: Send {
  fn set_objective(&mut self, obj: &SVec, minimize: bool);
  fn add_row(&mut self, coef: &SVec, sense: Sense, rhs: Rat);
  fn num_rows(&self) -> usize;
  /// Removes the flagged rows. Returns, for every old row index, its new
  /// index, or -1 if the row was removed.
  fn remove_rows(&mut self, dead: &[bool]) -> Vec<i64>;
  fn solve(&mut self) -> LpStatus;
  /// After `Optimal`: multipliers such that the weighted sum of the rows
  /// bounds the objective from the optimizing side.
  fn duals(&self) -> &[Rat];
  /// After `Optimal`: one entry per problem variable.
  fn reduced_costs(&self) -> &[Rat];
  /// After `Infeasible`: multipliers combining the rows into a falsehood.
  fn farkas(&self) -> &[Rat];
}

pub struct LpContext<S> {
  pub lp: S,
  n_base: usize,
  row_of_cert: HashMap<usize, usize>,
  cert_of_row: HashMap<usize, usize>,
}

impl<S: LpSolver> LpContext<S> {
  /// `lp` must already contain the base constraints as rows `0..n_base`;
  /// those rows are permanent and their certificate index equals their row
  /// index. Derived rows come and go through `sync_active`.
  pub fn new(lp: S, n_base: usize) -> LpContext<S> {
    debug_assert_eq!(lp.num_rows(), n_base);
    LpContext { lp, n_base, row_of_cert: HashMap::new(), cert_of_row: HashMap::new() }
  }

  /// Makes the set of derived rows equal to `active` (certificate indices;
  /// entries below the base count are already present and ignored). Rows
  /// are removed and added by set difference so warm contexts carry their
  /// surviving rows over from step to step.
  pub fn sync_active(&mut self, active: &[usize], rows: &[Constraint]) {
    let want: HashSet<usize> =
      active.iter().copied().filter(|&c| c >= self.n_base).collect();
    let mut dead = vec![false; self.lp.num_rows()];
    let mut any_dead = false;
    for (&row, &cert) in &self.cert_of_row {
      if !want.contains(&cert) {
        dead[row] = true;
        any_dead = true;
      }
    }
    if any_dead {
      let remap = self.lp.remove_rows(&dead);
      let old: Vec<(usize, usize)> = self.cert_of_row.drain().collect();
      self.row_of_cert.clear();
      for (row, cert) in old {
        let new = remap[row];
        if new >= 0 {
          self.cert_of_row.insert(new as usize, cert);
          self.row_of_cert.insert(cert, new as usize);
        }
      }
    }
    let mut missing: Vec<usize> =
      want.iter().copied().filter(|c| !self.row_of_cert.contains_key(c)).collect();
    missing.sort_unstable();
    for cert in missing {
      let con = &rows[cert];
      self.lp.add_row(con.coef(), con.sense(), con.rhs().clone());
      let row = self.lp.num_rows() - 1;
      self.row_of_cert.insert(cert, row);
      self.cert_of_row.insert(row, cert);
    }
  }

  pub fn cert_index(&self, row: usize) -> usize {
    if row < self.n_base { row } else { self.cert_of_row[&row] }
  }
}
