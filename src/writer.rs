//! Re-emission of certificate sections and derivation steps.
//!
//! The completer and the incompletifier copy VER..SOL through and rewrite
//! parts of DER; everything funnels through here so the two tools agree on
//! the output format. Rationals print canonically (`p/q`, or `p` when
//! integral), lines end with `\n`.

use std::fmt::Write as _;
use std::io::{self, Write};
use crate::constraint::Constraint;
use crate::parser::{DerStep, Header, Reason, Rtp};
use crate::rational::Rat;
use crate::svec::SVec;

pub fn render_coef(coef: &SVec, is_obj: bool) -> String {
  if is_obj { return "OBJ".to_string() }
  let mut out = format!("{}", coef.len());
  for (i, a) in coef.iter() {
    let _ = write!(out, " {} {}", i, a);
  }
  out
}

fn render_mults(mults: &[(usize, Rat)]) -> String {
  let mut out = format!("{}", mults.len());
  for (i, a) in mults {
    let _ = write!(out, " {} {}", i, a);
  }
  out
}

pub fn render_der_step(step: &DerStep) -> String {
  let mut out = format!("{} {} {}  {}", step.label, step.sense.letter(), step.rhs,
    render_coef(&step.coef, step.coef_is_obj));
  let reason = match &step.reason {
    Reason::Asm => "asm".to_string(),
    Reason::Sol => "sol".to_string(),
    Reason::Lin(mults) => format!("lin {}", render_mults(mults)),
    Reason::Rnd(mults) => format!("rnd {}", render_mults(mults)),
    Reason::Uns(c1, a1, c2, a2) => format!("uns {} {} {} {}", c1, a1, c2, a2),
    Reason::Incomplete(active) => {
      let mut s = "lin incomplete".to_string();
      for i in active { let _ = write!(s, " {}", i); }
      s
    }
    Reason::Weak { locals, mults } => {
      let mut s = format!("lin weak {{ {}", locals.len());
      for b in locals {
        let _ = write!(s, " {} {} {} {}", if b.lower { 'L' } else { 'U' }, b.var, b.cert, b.val);
      }
      let _ = write!(s, " }} {}", render_mults(mults));
      s
    }
  };
  let _ = write!(out, "  {{ {} }} {}", reason, step.max_ref);
  if step.global { out.push_str(" global") }
  out
}

fn write_constraint(w: &mut impl Write, con: &Constraint) -> io::Result<()> {
  writeln!(w, "{} {} {}  {}", con.label(), con.sense().letter(), con.rhs(),
    render_coef(con.coef(), con.has_objective_coefficients()))
}

pub fn write_header(w: &mut impl Write, h: &Header) -> io::Result<()> {
  writeln!(w, "VER {}.{}", h.ver_major, h.ver_minor)?;
  writeln!(w, "VAR {}", h.vars.len())?;
  for name in &h.vars {
    writeln!(w, "{}", name)?;
  }
  write!(w, "INT {}\n", h.int_list.len())?;
  for (n, i) in h.int_list.iter().enumerate() {
    write!(w, "{}{}", if n == 0 { "" } else { " " }, i)?;
  }
  writeln!(w)?;
  writeln!(w, "OBJ {}", if h.min { "min" } else { "max" })?;
  writeln!(w, "{}", render_coef(&h.obj, false))?;
  writeln!(w, "CON {} {}", h.base.len(), h.n_bounds)?;
  for con in &h.base {
    write_constraint(w, con)?;
  }
  match &h.rtp {
    Rtp::Infeas => writeln!(w, "RTP infeas")?,
    Rtp::Range { lower, upper } => {
      let lo = lower.as_ref().map_or("-inf".to_string(), |l| l.to_string());
      let hi = upper.as_ref().map_or("inf".to_string(), |u| u.to_string());
      writeln!(w, "RTP range {} {}", lo, hi)?;
    }
  }
  writeln!(w, "SOL {}", h.sols.len())?;
  for (label, coef) in &h.sols {
    writeln!(w, "{}  {}", label, render_coef(coef, false))?;
  }
  Ok(())
}
