//! The derivation engine behind `vipr verify`.
//!
//! Replays the DER section against the problem read from the header: every
//! derived constraint must follow from its stated reason, the reason's
//! justified constraint must dominate the claimed one, and assumption scopes
//! must be tracked so branch-and-bound style proofs only count once their
//! assumptions are discharged. The run is accepted as soon as a derivation
//! with empty scope triggers the relation to prove.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use num_traits::Zero;
use crate::constraint::{Constraint, Scope, Sense};
use crate::error::{Result, ViprError};
use crate::parser::{self, Reason, Rtp, Scanner};
use crate::rational::{self, Rat};
use crate::svec::SVec;

pub fn main(mut args: impl Iterator<Item = String>) -> Result<()> {
  let path = args.next().ok_or(ViprError::Usage("vipr verify <certificate>"))?;
  run(&path).map_err(|e| {
    println!("\nVerification failed.");
    e
  })
}

pub fn run(path: &str) -> Result<()> {
  let data = fs::read(path)?;
  let start = Instant::now();
  let mut sc = Scanner::new(&data);
  let hdr = parser::read_header(&mut sc)?;
  match &hdr.rtp {
    Rtp::Infeas => println!("\nNeed to verify infeasibility."),
    Rtp::Range { lower, upper } => {
      let lo = lower.as_ref().map_or("-inf".to_string(), |l| l.to_string());
      let hi = upper.as_ref().map_or("inf".to_string(), |u| u.to_string());
      println!("Need to verify optimal value range {}{}, {}{}.",
        if lower.is_some() { "[" } else { "(" }, lo, hi,
        if upper.is_some() { "]" } else { ")" });
    }
  }
  let mut engine = Engine::new(hdr);
  engine.check_solutions()?;
  engine.process_der(&mut sc)?;
  println!("\nCompleted in {} seconds (CPU)", start.elapsed().as_secs_f64());
  Ok(())
}

struct Engine {
  vars: Vec<String>,
  is_int: Vec<bool>,
  min: bool,
  obj: Arc<SVec>,
  obj_integral: bool,
  rtp: Rtp,
  sols: Vec<(String, Arc<SVec>)>,
  cons: Vec<Constraint>,
  n_base: usize,
  best: Option<Rat>,
  /// The dual-side goal in the range case: `obj >= lb` (min) or `obj <= ub`.
  target: Option<Constraint>,
}

impl Engine {
  fn new(hdr: parser::Header) -> Engine {
    let target = match &hdr.rtp {
      Rtp::Range { lower: Some(l), .. } if hdr.min =>
        Some(Constraint::new("rtp", Sense::Ge, l.clone(), hdr.obj.clone(), false, Scope::new())),
      Rtp::Range { upper: Some(u), .. } if !hdr.min =>
        Some(Constraint::new("rtp", Sense::Le, u.clone(), hdr.obj.clone(), false, Scope::new())),
      _ => None,
    };
    let n_base = hdr.base.len();
    Engine {
      vars: hdr.vars, is_int: hdr.is_int, min: hdr.min, obj: hdr.obj,
      obj_integral: hdr.obj_integral, rtp: hdr.rtp, sols: hdr.sols,
      cons: hdr.base, n_base, best: None, target,
    }
  }

  fn primal_bound(&self) -> Option<&Rat> {
    match &self.rtp {
      Rtp::Range { upper, .. } if self.min => upper.as_ref(),
      Rtp::Range { lower, .. } if !self.min => lower.as_ref(),
      _ => None,
    }
  }

  fn dual_bound(&self) -> Option<&Rat> {
    match &self.rtp {
      Rtp::Range { lower, .. } if self.min => lower.as_ref(),
      Rtp::Range { upper, .. } if !self.min => upper.as_ref(),
      _ => None,
    }
  }

  /// SOL section semantics: every listed solution must be feasible, and the
  /// best objective value must already respect the primal side of the RTP.
  fn check_solutions(&mut self) -> Result<()> {
    for (label, sol) in &self.sols {
      println!("checking solution {}", label);
      for (i, v) in sol.iter() {
        if self.is_int[i] && !v.is_integer() {
          return Err(ViprError::semantic("SOL",
            format!("noninteger value for integer variable {}", i)));
        }
      }
      for (j, con) in self.cons[..self.n_base].iter().enumerate() {
        let prod = con.coef().scalar_product(sol);
        let sat = match con.sense() {
          Sense::Le => prod <= *con.rhs(),
          Sense::Ge => prod >= *con.rhs(),
          Sense::Eq => prod == *con.rhs(),
        };
        if !sat {
          return Err(ViprError::semantic("SOL", format!("constraint {} not satisfied", j)));
        }
      }
      let value = self.obj.scalar_product(sol);
      println!("   objval = {}", value);
      let better = match &self.best {
        None => true,
        Some(best) => if self.min { value < *best } else { value > *best },
      };
      if better { self.best = Some(value) }
    }
    if let Some(best) = &self.best {
      println!("Best objval: {}", best);
      if let Some(bound) = self.primal_bound() {
        let violated = if self.min { best > bound } else { best < bound };
        if violated {
          return Err(ViprError::semantic("SOL",
            format!("best objective value ({}) violates the {} bound ({})",
              best, if self.min { "upper" } else { "lower" }, bound)));
        }
      }
      println!("Successfully checked solution for feasibility.");
    } else if matches!(self.rtp, Rtp::Range { .. }) && self.primal_bound().is_some() {
      return Err(ViprError::semantic("SOL", "no solutions to prove primal bound".to_string()));
    }
    Ok(())
  }

  /// The multiplier sign rule plus accumulation: terms with zero multiplier
  /// are skipped, the products sign(a) * sense must agree over all remaining
  /// terms, and a cited constraint is trashed right after its last use.
  fn linear_combination(&mut self, mults: &[(usize, Rat)], new_idx: usize)
      -> Result<(Constraint, Scope)> {
    let mut sense_sign = 0i32;
    let mut map: BTreeMap<usize, Rat> = BTreeMap::new();
    for (idx, a) in mults {
      if *idx >= new_idx {
        return Err(ViprError::semantic("DER", format!("index out of bounds: {}", idx)));
      }
      if a.is_zero() { continue }
      let term = self.cons[*idx].sense().sign() * rational::sign(a);
      if sense_sign == 0 {
        sense_sign = term;
      } else if term != 0 && term != sense_sign {
        return Err(ViprError::semantic("DER",
          format!("coefficient has wrong sign for index {}", idx)));
      }
      map.insert(*idx, a.clone());
    }
    let mut coef = SVec::new();
    let mut rhs = Rat::zero();
    let mut scope = Scope::new();
    for (idx, a) in &map {
      let con = &self.cons[*idx];
      if con.is_trashed() {
        return Err(ViprError::semantic("DER",
          format!("accessing trashed constraint: {}", con.label())));
      }
      scope.extend(con.scope().iter().copied());
      coef.add_scaled(con.coef(), a);
      rhs += a * con.rhs();
      if con.max_ref() >= 0 && con.max_ref() <= new_idx as i64 {
        self.cons[*idx].trash();
      }
    }
    coef.compactify();
    let derived = Constraint::new("", Sense::from_sign(sense_sign), rhs, Arc::new(coef),
      false, Scope::new());
    Ok((derived, scope))
  }

  fn check_dominates(&self, mut derived: Constraint, to_der: &mut Constraint) -> Result<()> {
    // the first comparison is literal; canonicalize both sides and retry
    // once before giving up
    if !derived.dominates(to_der) {
      derived.canonicalize();
      to_der.canonicalize();
    }
    if !derived.dominates(to_der) {
      println!("Failed to derive constraint {}", to_der.label());
      println!("{}", to_der.render(&self.vars));
      println!("Derived instead");
      println!("{}", derived.render(&self.vars));
      println!("difference:");
      println!("{}", derived.difference(to_der).render(&self.vars));
      return Err(ViprError::semantic("DER",
        format!("{}: derived constraint does not dominate the claimed one", to_der.label())));
    }
    Ok(())
  }

  /// `uns` rule: both branch constraints dominate the claim, and the two
  /// branch assumptions form an integer disjunction that tiles the line
  /// (mx <= d against mx >= d+1 over integer variables).
  fn can_unsplit(&self, to_der: &Constraint, c1: usize, a1: usize, c2: usize, a2: usize,
      new_idx: usize) -> Result<Scope> {
    for (name, i) in [("con1", c1), ("asm1", a1), ("con2", c2), ("asm2", a2)] {
      if i >= new_idx {
        return Err(ViprError::semantic("DER", format!("{} out of bounds: {}", name, i)));
      }
      if self.cons[i].is_trashed() {
        return Err(ViprError::semantic("DER",
          format!("unsplitting trashed constraint: {}", self.cons[i].label())));
      }
    }
    let (k1, k2) = (&self.cons[c1], &self.cons[c2]);
    if !(k1.dominates(to_der) && k2.dominates(to_der)) {
      return Err(ViprError::semantic("DER", format!("{}: unsplit failed", to_der.label())));
    }
    let (b1, b2) = (&self.cons[a1], &self.cons[a2]);
    if b1.sense().sign() * b2.sense().sign() != -1 {
      return Err(ViprError::semantic("DER",
        format!("{}: failed sense requirement for assumptions", to_der.label())));
    }
    let one = rational::rat(1);
    let tiles = if b1.sense().sign() < 0 {
      b1.rhs() + &one == *b2.rhs()
    } else {
      *b1.rhs() == b2.rhs() + &one
    };
    if !tiles {
      return Err(ViprError::semantic("DER",
        format!("{} and {} do not form a tautology", b1.label(), b2.label())));
    }
    if !(Arc::ptr_eq(b1.coef_arc(), b2.coef_arc()) || b1.coef() == b2.coef()) {
      return Err(ViprError::semantic("DER", "coefs of asm constraints differ".to_string()));
    }
    for (j, a) in b1.coef().iter() {
      if !self.is_int[j] {
        return Err(ViprError::semantic("DER", format!("noninteger variable index {}", j)));
      }
      if !a.is_integer() {
        return Err(ViprError::semantic("DER",
          format!("noninteger coefficient for index {}", j)));
      }
    }
    let mut scope: Scope = k1.scope().iter().copied().filter(|&i| i != a1).collect();
    scope.extend(k2.scope().iter().copied().filter(|&i| i != a2));
    Ok(scope)
  }

  /// `sol` rule: a cutoff bound from the best known primal solution.
  fn check_sol_step(&self, to_der: &Constraint) -> Result<()> {
    let best = self.best.as_ref().ok_or_else(||
      ViprError::semantic("DER", "cutoff bound without any solution".to_string()))?;
    let mut cutoff = best.clone();
    if self.obj_integral { cutoff -= rational::rat(1) }
    if !to_der.has_objective_coefficients() {
      return Err(ViprError::semantic("DER",
        "cutoff bound can only be applied to the objective".to_string()));
    }
    if to_der.sense() != Sense::Le {
      return Err(ViprError::semantic("DER", "cutoff bound should have sense 'L'".to_string()));
    }
    if *to_der.rhs() < cutoff {
      return Err(ViprError::semantic("DER",
        format!("no solution known with objective at most {}, best solution is {}",
          to_der.rhs(), best)));
    }
    Ok(())
  }

  fn range_strings(&self) -> (String, String, &'static str, &'static str) {
    match &self.rtp {
      Rtp::Range { lower, upper } => (
        lower.as_ref().map_or("-inf".to_string(), |l| l.to_string()),
        upper.as_ref().map_or("inf".to_string(), |u| u.to_string()),
        if lower.is_some() { "[" } else { "(" },
        if upper.is_some() { "]" } else { ")" },
      ),
      Rtp::Infeas => (String::new(), String::new(), "[", "]"),
    }
  }

  fn process_der(&mut self, sc: &mut Scanner<'_>) -> Result<()> {
    println!("\nProcessing DER section...");
    sc.section = "DER";
    sc.keyword("DER")?;
    let n_der = sc.usize_tok()?;
    println!("numberOfDerivations = {}", n_der);

    if matches!(self.rtp, Rtp::Range { .. }) && self.dual_bound().is_none() {
      println!("Dual bound of RTP is a tautology.");
      println!("Successfully verified.");
      return Ok(());
    }

    for i in 0..n_der {
      let step = parser::read_der_step(sc, self.vars.len(), &self.obj)?;
      let new_idx = self.cons.len();
      let is_asm = matches!(step.reason, Reason::Asm);
      let mut to_der = Constraint::new(step.label.clone(), step.sense, step.rhs.clone(),
        step.coef.clone(), is_asm, Scope::new());
      if step.coef_is_obj { to_der.mark_objective() }

      let scope = match &step.reason {
        Reason::Asm => Scope::from([new_idx]),
        Reason::Lin(mults) => {
          let (derived, scope) = self.linear_combination(mults, new_idx)?;
          self.check_dominates(derived, &mut to_der)?;
          scope
        }
        Reason::Rnd(mults) => {
          let (mut derived, scope) = self.linear_combination(mults, new_idx)?;
          derived.round(&self.is_int)
            .map_err(|msg| ViprError::semantic("DER", format!("{}: {}", step.label, msg)))?;
          self.check_dominates(derived, &mut to_der)?;
          scope
        }
        Reason::Uns(c1, a1, c2, a2) => self.can_unsplit(&to_der, *c1, *a1, *c2, *a2, new_idx)?,
        Reason::Sol => { self.check_sol_step(&to_der)?; Scope::new() }
        Reason::Incomplete(_) | Reason::Weak { .. } => {
          return Err(ViprError::semantic("DER",
            format!("{}: derivation is not completed, run the completer first", step.label)));
        }
      };
      to_der.set_scope(scope);
      to_der.set_max_ref(step.max_ref);

      let globally_proved = to_der.scope().is_empty() && match self.rtp {
        Rtp::Infeas => to_der.is_falsehood(),
        Rtp::Range { .. } => to_der.has_objective_coefficients()
          && self.target.as_ref().map_or(false, |t| to_der.dominates(t)),
      };
      self.cons.push(to_der);

      if globally_proved {
        match self.rtp {
          Rtp::Infeas => println!("Successfully verified infeasibility."),
          Rtp::Range { .. } => {
            println!("\nTerminated after {} derivations.", i + 1);
            if let Some(best) = &self.best {
              println!("Best objval over all solutions: {}", best);
            }
            let (lo, hi, open, close) = self.range_strings();
            println!("Successfully verified optimal value range {}{}, {}{}.",
              open, lo, hi, close);
          }
        }
        return Ok(());
      }

      // the final derivation is never trashed
      if i + 1 < n_der && step.max_ref >= 0 && (step.max_ref as usize) < self.cons.len() {
        self.cons.last_mut().unwrap().trash();
      }
    }

    println!();
    let last = match self.cons.last() {
      Some(c) => c.clone(),
      None => return Err(ViprError::Logical("no derivations and nothing to prove".into())),
    };
    if !last.scope().is_empty() {
      println!("Failed: Final derived constraint contains undischarged assumptions:");
      for &i in last.scope() {
        println!("{}: {}", i, self.cons[i].label());
      }
    } else {
      match self.rtp {
        Rtp::Infeas => println!("Failed to verify infeasibility."),
        Rtp::Range { .. } => {
          if self.min {
            println!("Failed to derive lower bound.");
          } else {
            println!("Failed to derive upper bound.");
          }
        }
      }
      println!("Proved:");
      println!("{}", last.render(&self.vars));
      if let Some(target) = &self.target {
        println!("Instead of:");
        println!("{}", target.render(&self.vars));
      }
    }
    Err(ViprError::Logical("verification failed".into()))
  }
}
