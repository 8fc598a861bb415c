//! Built-in exact-rational LP backend.
//!
//! A dense two-phase primal simplex over `BigRational` with Bland's rule,
//! small enough to keep the completer self-contained. Problem variables are
//! free (bounds arrive as ordinary rows, the way the completer builds its
//! LPs), so each variable is split into a nonnegative pair; every row gets a
//! slack (inequalities) and an artificial column, and duals are read off the
//! artificial columns of the final tableau.

use num_traits::{Signed, Zero};
use crate::constraint::Sense;
use crate::lp::{LpSolver, LpStatus};
use crate::rational::Rat;
use crate::svec::SVec;

#[derive(Clone)]
struct Row {
  coef: SVec,
  sense: Sense,
  rhs: Rat,
}

#[derive(Clone, Default)]
struct Output {
  duals: Vec<Rat>,
  rcosts: Vec<Rat>,
  farkas: Vec<Rat>,
}

#[derive(Clone)]
pub struct Simplex {
  n_vars: usize,
  rows: Vec<Row>,
  obj: Vec<Rat>,
  minimize: bool,
  out: Output,
}

struct Tableau {
  t: Vec<Vec<Rat>>, // m x (ncols + 1), last column is the right-hand side
  z: Vec<Rat>,      // reduced-cost row, last entry is minus the objective value
  basis: Vec<usize>,
  ncols: usize,
}

impl Tableau {
  fn pivot(&mut self, r: usize, j: usize) {
    let piv = self.t[r][j].clone();
    for v in &mut self.t[r] {
      if !v.is_zero() { *v /= &piv }
    }
    for i in 0..self.t.len() {
      if i == r || self.t[i][j].is_zero() { continue }
      let f = self.t[i][j].clone();
      for c in 0..=self.ncols {
        if !self.t[r][c].is_zero() {
          let d = &f * &self.t[r][c];
          self.t[i][c] -= d;
        }
      }
    }
    if !self.z[j].is_zero() {
      let f = self.z[j].clone();
      for c in 0..=self.ncols {
        if !self.t[r][c].is_zero() {
          let d = &f * &self.t[r][c];
          self.z[c] -= d;
        }
      }
    }
    self.basis[r] = j;
  }

  /// Bland's rule: smallest eligible entering column, leaving row breaking
  /// ratio ties by smallest basis column. Returns false on an unbounded ray.
  fn optimize(&mut self, enterable: impl Fn(usize) -> bool) -> bool {
    loop {
      let enter = (0..self.ncols).find(|&j| enterable(j) && self.z[j].is_negative());
      let Some(j) = enter else { return true };
      let mut leave: Option<usize> = None;
      for i in 0..self.t.len() {
        if !self.t[i][j].is_positive() { continue }
        let better = match leave {
          None => true,
          Some(r) => {
            let cur = &self.t[r][self.ncols] / &self.t[r][j];
            let cand = &self.t[i][self.ncols] / &self.t[i][j];
            cand < cur || (cand == cur && self.basis[i] < self.basis[r])
          }
        };
        if better { leave = Some(i) }
      }
      let Some(r) = leave else { return false };
      self.pivot(r, j);
    }
  }
}

impl Simplex {
  pub fn new(n_vars: usize) -> Simplex {
    Simplex {
      n_vars,
      rows: Vec::new(),
      obj: vec![Rat::zero(); n_vars],
      minimize: true,
      out: Output::default(),
    }
  }

  fn run(&mut self) -> LpStatus {
    let m = self.rows.len();
    let n = self.n_vars;
    let n_slack = self.rows.iter().filter(|r| r.sense != Sense::Eq).count();
    let ncols = 2 * n + n_slack + m;
    let art0 = 2 * n + n_slack;

    // row normalization signs (right-hand sides become nonnegative) and the
    // resulting effective senses
    let mut sigma = vec![1i32; m];
    let mut t = vec![vec![Rat::zero(); ncols + 1]; m];
    let mut slack = 2 * n;
    for (i, row) in self.rows.iter().enumerate() {
      let s = if row.rhs.is_negative() { -1 } else { 1 };
      sigma[i] = s;
      let eff = Sense::from_sign(row.sense.sign() * s);
      for (j, a) in row.coef.iter() {
        if a.is_zero() { continue }
        let v = if s < 0 { -a.clone() } else { a.clone() };
        t[i][n + j] = -v.clone();
        t[i][j] = v;
      }
      match eff {
        Sense::Le => { t[i][slack] = Rat::from_integer(1.into()); slack += 1 }
        Sense::Ge => { t[i][slack] = Rat::from_integer((-1).into()); slack += 1 }
        Sense::Eq => {}
      }
      t[i][art0 + i] = Rat::from_integer(1.into());
      t[i][ncols] = if s < 0 { -row.rhs.clone() } else { row.rhs.clone() };
    }

    // phase 1: minimize the artificial sum; the initial basis is the
    // artificial columns themselves
    let mut tab = Tableau {
      z: {
        let mut z = vec![Rat::zero(); ncols + 1];
        for (j, zj) in z.iter_mut().enumerate() {
          let mut v = if j >= art0 { Rat::from_integer(1.into()) } else { Rat::zero() };
          for row in t.iter() { v -= &row[j] }
          *zj = v;
        }
        let mut v = Rat::zero();
        for row in t.iter() { v -= &row[ncols] }
        z[ncols] = v;
        z
      },
      basis: (0..m).map(|i| art0 + i).collect(),
      t,
      ncols,
    };
    if !tab.optimize(|j| j < art0) {
      return LpStatus::Other("phase 1 unbounded".to_string());
    }
    let infeas = -tab.z[ncols].clone();
    if infeas.is_positive() {
      // phase-1 duals form the Farkas certificate
      let mut farkas = Vec::with_capacity(m);
      for k in 0..m {
        let mut y = Rat::from_integer(1.into()) - &tab.z[art0 + k];
        if sigma[k] < 0 { y = -y }
        farkas.push(y);
      }
      self.out = Output { farkas, rcosts: vec![Rat::zero(); n], ..Output::default() };
      return LpStatus::Infeasible;
    }

    // drive leftover artificials out of the basis; rows that resist are
    // redundant and keep their artificial pinned at zero
    for r in 0..m {
      if tab.basis[r] >= art0 {
        if let Some(j) = (0..art0).find(|&j| !tab.t[r][j].is_zero()) {
          tab.pivot(r, j);
        }
      }
    }

    // phase 2 over the real costs
    let mut cost = vec![Rat::zero(); ncols];
    for j in 0..n {
      let c = if self.minimize { self.obj[j].clone() } else { -self.obj[j].clone() };
      cost[n + j] = -c.clone();
      cost[j] = c;
    }
    for j in 0..=ncols {
      let mut v = if j < ncols { cost[j].clone() } else { Rat::zero() };
      for (i, &b) in tab.basis.iter().enumerate() {
        if !cost[b].is_zero() && !tab.t[i][j].is_zero() {
          v -= &cost[b] * &tab.t[i][j];
        }
      }
      tab.z[j] = v;
    }
    if !tab.optimize(|j| j < art0) {
      return LpStatus::Other("unbounded".to_string());
    }

    let mut duals = Vec::with_capacity(m);
    for k in 0..m {
      let mut y = -tab.z[art0 + k].clone();
      if sigma[k] < 0 { y = -y }
      if !self.minimize { y = -y }
      duals.push(y);
    }
    let mut rcosts = Vec::with_capacity(n);
    for j in 0..n {
      let mut rc = self.obj[j].clone();
      for (k, row) in self.rows.iter().enumerate() {
        let a = row.coef.get(j);
        if !a.is_zero() { rc -= &duals[k] * &a }
      }
      rcosts.push(rc);
    }
    self.out = Output { duals, rcosts, ..Output::default() };
    LpStatus::Optimal
  }
}

impl LpSolver for Simplex {
  fn set_objective(&mut self, obj: &SVec, minimize: bool) {
    self.obj = vec![Rat::zero(); self.n_vars];
    for (j, a) in obj.iter() {
      self.obj[j] = a.clone();
    }
    self.minimize = minimize;
  }

  fn add_row(&mut self, coef: &SVec, sense: Sense, rhs: Rat) {
    self.rows.push(Row { coef: coef.clone(), sense, rhs });
  }

  fn num_rows(&self) -> usize { self.rows.len() }

  fn remove_rows(&mut self, dead: &[bool]) -> Vec<i64> {
    let mut remap = Vec::with_capacity(self.rows.len());
    let mut kept = 0i64;
    for &d in dead {
      if d { remap.push(-1) } else { remap.push(kept); kept += 1 }
    }
    let mut it = dead.iter();
    self.rows.retain(|_| !*it.next().unwrap());
    remap
  }

  fn solve(&mut self) -> LpStatus {
    self.out = Output::default();
    self.run()
  }

  fn duals(&self) -> &[Rat] { &self.out.duals }
  fn reduced_costs(&self) -> &[Rat] { &self.out.rcosts }
  fn farkas(&self) -> &[Rat] { &self.out.farkas }
}
