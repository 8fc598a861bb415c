//! Token scanner and certificate reader.
//!
//! The on-wire format is a whitespace-delimited token stream; `%` at the
//! start of a token introduces a comment running to end of line, anywhere in
//! the file. The scanner handles comments uniformly, so section readers
//! never see them. Sections must appear in the fixed order
//! VER VAR INT OBJ CON RTP SOL DER.

use std::sync::Arc;
use crate::constraint::{Constraint, Scope, Sense};
use crate::error::{Result, ViprError};
use crate::rational::{self, Rat};
use crate::svec::SVec;

pub const VIPR_MAJOR: u32 = 1;
pub const VIPR_MINOR: u32 = 1;

pub struct Scanner<'a> {
  buf: &'a [u8],
  pos: usize,
  pub section: &'static str,
}

impl<'a> Scanner<'a> {
  pub fn new(buf: &'a [u8]) -> Scanner<'a> {
    Scanner { buf, pos: 0, section: "VER" }
  }

  fn skip_to_newline(&mut self) {
    while let Some(&b) = self.buf.get(self.pos) {
      self.pos += 1;
      if b == b'\n' { break }
    }
  }

  fn skip_ws(&mut self) {
    while let Some(&b) = self.buf.get(self.pos) {
      if b.is_ascii_whitespace() {
        self.pos += 1;
      } else if b == b'%' {
        self.skip_to_newline();
      } else {
        break
      }
    }
  }

  fn raw_token(&mut self) -> Option<&'a str> {
    let start = self.pos;
    while let Some(&b) = self.buf.get(self.pos) {
      if b.is_ascii_whitespace() { break }
      self.pos += 1;
    }
    if self.pos == start { return None }
    std::str::from_utf8(&self.buf[start..self.pos]).ok()
  }

  pub fn token(&mut self) -> Result<&'a str> {
    self.skip_ws();
    self.raw_token()
      .ok_or_else(|| ViprError::expected(self.section, "a token", "end of file"))
  }

  /// Next token on the current line, or `None` at end of line. Used for
  /// trailing annotations such as `global` after a derivation.
  pub fn line_token(&mut self) -> Option<&'a str> {
    while let Some(&b) = self.buf.get(self.pos) {
      match b {
        b' ' | b'\t' | b'\r' => self.pos += 1,
        b'\n' | b'%' => return None,
        _ => return self.raw_token(),
      }
    }
    None
  }

  pub fn skip_line(&mut self) {
    self.skip_to_newline();
  }

  pub fn keyword(&mut self, kw: &'static str) -> Result<()> {
    let tok = self.token()?;
    if tok == kw { Ok(()) } else { Err(ViprError::expected(self.section, kw, tok)) }
  }

  pub fn usize_tok(&mut self) -> Result<usize> {
    let tok = self.token()?;
    tok.parse().map_err(|_| ViprError::BadNumber { section: self.section, token: tok.into() })
  }

  pub fn i64_tok(&mut self) -> Result<i64> {
    let tok = self.token()?;
    tok.parse().map_err(|_| ViprError::BadNumber { section: self.section, token: tok.into() })
  }

  pub fn rat_tok(&mut self) -> Result<Rat> {
    let tok = self.token()?;
    rational::parse(tok)
      .ok_or_else(|| ViprError::BadNumber { section: self.section, token: tok.into() })
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Rtp {
  Infeas,
  Range { lower: Option<Rat>, upper: Option<Rat> },
}

/// Everything before the DER section.
pub struct Header {
  pub ver_major: u32,
  pub ver_minor: u32,
  pub vars: Vec<String>,
  pub is_int: Vec<bool>,
  pub int_list: Vec<usize>,
  pub min: bool,
  pub obj: Arc<SVec>,
  pub obj_integral: bool,
  pub n_bounds: usize,
  pub base: Vec<Constraint>,
  pub rtp: Rtp,
  pub sols: Vec<(String, Arc<SVec>)>,
}

impl Header {
  pub fn n_base(&self) -> usize { self.base.len() }
}

/// Reads a coefficient vector: either the literal `OBJ`, meaning the shared
/// objective vector, or `k  i_1 v_1 .. i_k v_k`. Returns the vector and
/// whether it is the objective by identity.
pub fn read_coefficients(sc: &mut Scanner<'_>, n_vars: usize, obj: Option<&Arc<SVec>>)
    -> Result<(Arc<SVec>, bool)> {
  let tok = sc.token()?;
  if tok == "OBJ" {
    return match obj {
      Some(obj) => Ok((obj.clone(), true)),
      None => Err(ViprError::expected(sc.section, "a coefficient count", tok)),
    }
  }
  let k: usize = tok.parse()
    .map_err(|_| ViprError::BadNumber { section: sc.section, token: tok.into() })?;
  let mut v = SVec::new();
  for _ in 0..k {
    let i = sc.usize_tok()?;
    if i >= n_vars {
      return Err(ViprError::semantic(sc.section, format!("index out of bounds: {}", i)));
    }
    let a = sc.rat_tok()?;
    v.set(i, a);
  }
  v.compactify();
  Ok((Arc::new(v), false))
}

/// Reads `label {L|E|G} rhs <coefficients>`.
pub fn read_constraint(sc: &mut Scanner<'_>, n_vars: usize, obj: Option<&Arc<SVec>>)
    -> Result<(String, Sense, Rat, Arc<SVec>, bool)> {
  let label = sc.token()?.to_string();
  let sense_tok = sc.token()?;
  let sense = Sense::from_letter(sense_tok)
    .ok_or_else(|| ViprError::semantic(sc.section,
      format!("unknown sense for {}: {}", label, sense_tok)))?;
  let rhs = sc.rat_tok()?;
  let (coef, is_obj) = read_coefficients(sc, n_vars, obj)?;
  Ok((label, sense, rhs, coef, is_obj))
}

pub fn read_header(sc: &mut Scanner<'_>) -> Result<Header> {
  sc.section = "VER";
  sc.keyword("VER")?;
  let ver = sc.token()?;
  let (major, minor) = ver.split_once('.')
    .and_then(|(m, n)| Some((m.parse().ok()?, n.parse().ok()?)))
    .ok_or_else(|| ViprError::BadNumber { section: "VER", token: ver.into() })?;
  println!("Certificate format version {}.{}", major, minor);
  if major != VIPR_MAJOR || minor > VIPR_MINOR {
    return Err(ViprError::Version { major, minor });
  }

  println!("\nProcessing VAR section...");
  sc.section = "VAR";
  sc.keyword("VAR")?;
  let n_vars = sc.usize_tok()?;
  let mut vars = Vec::with_capacity(n_vars);
  for _ in 0..n_vars {
    vars.push(sc.token()?.to_string());
  }

  println!("\nProcessing INT section...");
  sc.section = "INT";
  sc.keyword("INT")?;
  let n_int = sc.usize_tok()?;
  let mut is_int = vec![false; n_vars];
  let mut int_list = Vec::with_capacity(n_int);
  for _ in 0..n_int {
    let i = sc.usize_tok()?;
    if i >= n_vars {
      return Err(ViprError::semantic("INT", format!("index out of bounds: {}", i)));
    }
    is_int[i] = true;
    int_list.push(i);
  }

  println!("\nProcessing OBJ section...");
  sc.section = "OBJ";
  sc.keyword("OBJ")?;
  let sense_tok = sc.token()?;
  let min = match sense_tok {
    "min" => true,
    "max" => false,
    _ => return Err(ViprError::semantic("OBJ", format!("invalid objective sense: {}", sense_tok))),
  };
  let (obj, _) = read_coefficients(sc, n_vars, None)?;
  let obj_integral = obj.iter().all(|(i, a)| is_int[i] && a.is_integer());

  println!("\nProcessing CON section...");
  sc.section = "CON";
  sc.keyword("CON")?;
  let n_cons = sc.usize_tok()?;
  let n_bounds = sc.usize_tok()?;
  let mut base = Vec::with_capacity(n_cons);
  for _ in 0..n_cons {
    let (label, sense, rhs, coef, is_obj) = read_constraint(sc, n_vars, Some(&obj))?;
    let mut con = Constraint::new(label, sense, rhs, coef, false, Scope::new());
    if is_obj { con.mark_objective() }
    base.push(con);
  }

  println!("\nProcessing RTP section...");
  sc.section = "RTP";
  sc.keyword("RTP")?;
  let kind = sc.token()?;
  let rtp = match kind {
    "infeas" => Rtp::Infeas,
    "range" => {
      let lo = sc.token()?;
      let lower = if lo == "-inf" { None } else {
        Some(rational::parse(lo)
          .ok_or_else(|| ViprError::BadNumber { section: "RTP", token: lo.into() })?)
      };
      let hi = sc.token()?;
      let upper = if hi == "inf" { None } else {
        Some(rational::parse(hi)
          .ok_or_else(|| ViprError::BadNumber { section: "RTP", token: hi.into() })?)
      };
      if let (Some(l), Some(u)) = (&lower, &upper) {
        if l > u {
          return Err(ViprError::semantic("RTP", "invalid bounds".to_string()));
        }
      }
      Rtp::Range { lower, upper }
    }
    _ => return Err(ViprError::semantic("RTP",
      format!("unrecognized verification type: {}", kind))),
  };

  println!("\nProcessing SOL section...");
  sc.section = "SOL";
  sc.keyword("SOL")?;
  let n_sols = sc.usize_tok()?;
  let mut sols = Vec::with_capacity(n_sols);
  for _ in 0..n_sols {
    let label = sc.token()?.to_string();
    let (coef, _) = read_coefficients(sc, n_vars, Some(&obj))?;
    sols.push((label, coef));
  }

  Ok(Header {
    ver_major: major, ver_minor: minor, vars, is_int, int_list, min, obj,
    obj_integral, n_bounds, base, rtp, sols,
  })
}

/// One `weak { .. }` bound annotation: `L|U  var  cert-index  value`.
#[derive(Clone, Debug)]
pub struct LocalBound {
  pub lower: bool,
  pub var: usize,
  pub cert: usize,
  pub val: Rat,
}

#[derive(Clone, Debug)]
pub enum Reason {
  Asm,
  Lin(Vec<(usize, Rat)>),
  Rnd(Vec<(usize, Rat)>),
  Uns(usize, usize, usize, usize),
  Sol,
  /// `lin incomplete` with the set of active derived constraint indices.
  Incomplete(Vec<usize>),
  /// `lin weak { .. }` with the original multipliers intact.
  Weak { locals: Vec<LocalBound>, mults: Vec<(usize, Rat)> },
}

#[derive(Clone, Debug)]
pub struct DerStep {
  pub label: String,
  pub sense: Sense,
  pub rhs: Rat,
  pub coef: Arc<SVec>,
  pub coef_is_obj: bool,
  pub reason: Reason,
  pub max_ref: i64,
  pub global: bool,
}

fn read_multipliers(sc: &mut Scanner<'_>) -> Result<Vec<(usize, Rat)>> {
  let k = sc.usize_tok()?;
  let mut mults = Vec::with_capacity(k);
  for _ in 0..k {
    let i = sc.usize_tok()?;
    let a = sc.rat_tok()?;
    mults.push((i, a));
  }
  Ok(mults)
}

/// Reads one DER step including its reason and max-ref-idx. The remainder of
/// the line is scanned for a `global` annotation and then discarded, so each
/// derivation occupies one line.
pub fn read_der_step(sc: &mut Scanner<'_>, n_vars: usize, obj: &Arc<SVec>) -> Result<DerStep> {
  let (label, sense, rhs, coef, coef_is_obj) = read_constraint(sc, n_vars, Some(obj))?;
  sc.keyword("{")?;
  let kind = sc.token()?;
  let reason = match kind {
    "asm" => { sc.keyword("}")?; Reason::Asm }
    "sol" => { sc.keyword("}")?; Reason::Sol }
    "uns" => {
      let c1 = sc.usize_tok()?;
      let a1 = sc.usize_tok()?;
      let c2 = sc.usize_tok()?;
      let a2 = sc.usize_tok()?;
      sc.keyword("}")?;
      Reason::Uns(c1, a1, c2, a2)
    }
    "rnd" => {
      let mults = read_multipliers(sc)?;
      sc.keyword("}")?;
      Reason::Rnd(mults)
    }
    "lin" => {
      let tok = sc.token()?;
      if tok == "incomplete" {
        let mut active = Vec::new();
        loop {
          let t = sc.token()?;
          if t == "}" { break }
          active.push(t.parse().map_err(|_|
            ViprError::BadNumber { section: sc.section, token: t.into() })?);
        }
        Reason::Incomplete(active)
      } else if tok == "weak" {
        sc.keyword("{")?;
        let b = sc.usize_tok()?;
        let mut locals = Vec::with_capacity(b);
        for _ in 0..b {
          let ty = sc.token()?;
          let lower = match ty {
            "L" => true,
            "U" => false,
            _ => return Err(ViprError::expected(sc.section, "L or U", ty)),
          };
          let var = sc.usize_tok()?;
          let cert = sc.usize_tok()?;
          let val = sc.rat_tok()?;
          locals.push(LocalBound { lower, var, cert, val });
        }
        sc.keyword("}")?;
        let mults = read_multipliers(sc)?;
        sc.keyword("}")?;
        Reason::Weak { locals, mults }
      } else {
        let k: usize = tok.parse()
          .map_err(|_| ViprError::BadNumber { section: sc.section, token: tok.into() })?;
        let mut mults = Vec::with_capacity(k);
        for _ in 0..k {
          let i = sc.usize_tok()?;
          let a = sc.rat_tok()?;
          mults.push((i, a));
        }
        sc.keyword("}")?;
        Reason::Lin(mults)
      }
    }
    _ => return Err(ViprError::semantic(sc.section,
      format!("{}: unknown derivation type {}", label, kind))),
  };
  let max_ref = sc.i64_tok()?;
  let mut global = false;
  while let Some(tok) = sc.line_token() {
    if tok == "global" { global = true }
  }
  sc.skip_line();
  Ok(DerStep { label, sense, rhs, coef, coef_is_obj, reason, max_ref, global })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rational::{rat, rat_frac};

  #[test]
  fn scanner_skips_comments_anywhere() {
    let data = b"% leading comment\n  VER % trailing\n 1.0";
    let mut sc = Scanner::new(data);
    assert_eq!(sc.token().unwrap(), "VER");
    assert_eq!(sc.token().unwrap(), "1.0");
    assert!(sc.token().is_err());
  }

  #[test]
  fn line_token_stops_at_newline() {
    let mut sc = Scanner::new(b"a b\nc");
    assert_eq!(sc.token().unwrap(), "a");
    assert_eq!(sc.line_token(), Some("b"));
    assert_eq!(sc.line_token(), None);
    sc.skip_line();
    assert_eq!(sc.token().unwrap(), "c");
  }

  fn header(data: &str) -> Result<Header> {
    read_header(&mut Scanner::new(data.as_bytes()))
  }

  const SMALL: &str = "\
% a small certificate header\n\
VER 1.0\n\
VAR 2  x y\n\
INT 1  0\n\
OBJ min  2 0 1 1 1\n\
CON 2 1\n\
c1 L 4  2 0 2 1 3\n\
% comment between constraints\n\
c2 G 0  1 0 1\n\
RTP range 0 4\n\
SOL 1  s 1 0 1\n";

  #[test]
  fn reads_small_header() {
    let h = header(SMALL).unwrap();
    assert_eq!(h.vars, vec!["x", "y"]);
    assert_eq!(h.is_int, vec![true, false]);
    assert!(h.min);
    assert!(!h.obj_integral); // y is continuous
    assert_eq!(h.base.len(), 2);
    assert_eq!(h.n_bounds, 1);
    assert_eq!(h.base[0].coef().get(1), rat(3));
    assert_eq!(h.rtp, Rtp::Range { lower: Some(rat(0)), upper: Some(rat(4)) });
    assert_eq!(h.sols.len(), 1);
  }

  #[test]
  fn version_gate() {
    assert!(header(&SMALL.replace("VER 1.0", "VER 1.1")).is_ok());
    assert!(matches!(header(&SMALL.replace("VER 1.0", "VER 1.2")),
      Err(ViprError::Version { major: 1, minor: 2 })));
    assert!(matches!(header(&SMALL.replace("VER 1.0", "VER 2.0")),
      Err(ViprError::Version { major: 2, minor: 0 })));
  }

  #[test]
  fn section_order_is_enforced() {
    let bad = SMALL.replace("INT 1  0\nOBJ min  2 0 1 1 1", "OBJ min  2 0 1 1 1\nINT 1  0");
    assert!(matches!(header(&bad), Err(ViprError::Expected { .. })));
  }

  #[test]
  fn obj_literal_is_shared() {
    let h = header(&SMALL.replace("c2 G 0  1 0 1", "c2 G 0  OBJ")).unwrap();
    assert!(h.base[1].has_objective_coefficients());
    assert!(Arc::ptr_eq(h.base[1].coef_arc(), &h.obj));
  }

  #[test]
  fn rtp_bound_sanity() {
    assert!(header(&SMALL.replace("RTP range 0 4", "RTP range 5 4")).is_err());
    let h = header(&SMALL.replace("RTP range 0 4", "RTP range -inf inf")).unwrap();
    assert_eq!(h.rtp, Rtp::Range { lower: None, upper: None });
  }

  fn step(line: &str) -> DerStep {
    let h = header(SMALL).unwrap();
    read_der_step(&mut Scanner::new(line.as_bytes()), h.vars.len(), &h.obj).unwrap()
  }

  #[test]
  fn der_step_kinds() {
    let s = step("d1 L 2  1 0 1  { lin 2  0 1/2  1 1 } -1\n");
    assert!(matches!(&s.reason, Reason::Lin(m) if m.len() == 2 && m[0].1 == rat_frac(1, 2)));
    assert_eq!(s.max_ref, -1);

    let s = step("d2 G 0  OBJ  { sol } 5\n");
    assert!(s.coef_is_obj);
    assert!(matches!(s.reason, Reason::Sol));
    assert_eq!(s.max_ref, 5);

    let s = step("d3 L 0  0  { uns 2 1 4 3 } -1\n");
    assert!(matches!(s.reason, Reason::Uns(2, 1, 4, 3)));

    let s = step("d4 L 7  1 0 1  { asm } -1 global\n");
    assert!(matches!(s.reason, Reason::Asm));
    assert!(s.global);

    let s = step("d5 L 0  1 0 1  { lin incomplete 3 5 } -1\n");
    assert!(matches!(&s.reason, Reason::Incomplete(v) if v == &[3, 5]));

    let s = step("d6 L 0  1 0 1  { lin weak { 1 U 0 2 4 } 1  0 1 } -1\n");
    match &s.reason {
      Reason::Weak { locals, mults } => {
        assert_eq!(locals.len(), 1);
        assert!(!locals[0].lower);
        assert_eq!(locals[0].cert, 2);
        assert_eq!(locals[0].val, rat(4));
        assert_eq!(mults.len(), 1);
      }
      r => panic!("unexpected reason {:?}", r),
    }
  }

  #[test]
  fn unknown_derivation_kind() {
    let h = header(SMALL).unwrap();
    let r = read_der_step(&mut Scanner::new(b"d L 0  0  { foo } -1\n"), h.vars.len(), &h.obj);
    assert!(matches!(r, Err(ViprError::Semantic { .. })));
  }
}
