//! The incompletifier behind `vipr incompletify`.
//!
//! Copies a certificate, probabilistically erasing the multipliers of `lin`
//! derivations: in `incomplete` mode a rewritten step keeps only the
//! referenced derived constraint indices, in `weak` mode it keeps its
//! multipliers behind an empty `weak { 0 }` annotation. All other reasons
//! pass through untouched. Used to exchange compact proofs and to exercise
//! the completer.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use rand::Rng;
use crate::error::{Result, ViprError};
use crate::parser::{self, Reason, Scanner};
use crate::writer;

const USAGE: &str = "vipr incompletify <certificate> [percent 0..100] [incomplete|weak] [all|noobj]";

pub fn main(mut args: impl Iterator<Item = String>) -> Result<()> {
  let path = args.next().ok_or(ViprError::Usage(USAGE))?;
  let percent = match args.next() {
    Some(p) => p.parse::<u32>().ok().filter(|&p| p <= 100).ok_or(ViprError::Usage(USAGE))?,
    None => 100,
  };
  let mode = args.next().unwrap_or_else(|| "incomplete".to_string());
  if mode != "incomplete" && mode != "weak" {
    return Err(ViprError::Usage(USAGE));
  }
  let scope = args.next().unwrap_or_else(|| "all".to_string());
  if scope != "all" && scope != "noobj" {
    return Err(ViprError::Usage(USAGE));
  }
  run(&path, percent, &mode, &scope)
}

fn output_path(path: &str, percent: u32, mode: &str, scope: &str) -> String {
  let stem = match path.rfind('.') {
    Some(pos) => &path[..pos],
    None => path,
  };
  format!("{}{}_{}_{}.vipr", stem, percent, mode, scope)
}

pub fn run(path: &str, percent: u32, mode: &str, scope: &str) -> Result<()> {
  let data = fs::read(path)?;
  let mut sc = Scanner::new(&data);
  let hdr = parser::read_header(&mut sc)?;

  let out_path = output_path(path, percent, mode, scope);
  let mut out = BufWriter::new(File::create(&out_path)?);
  writer::write_header(&mut out, &hdr)?;

  println!("\nProcessing DER section...");
  sc.section = "DER";
  sc.keyword("DER")?;
  let n_der = sc.usize_tok()?;
  writeln!(out, "DER {}", n_der)?;

  let incomplete = mode == "incomplete";
  let include_obj = scope == "all";
  let n_base = hdr.n_base();
  let mut rng = rand::thread_rng();

  for _ in 0..n_der {
    let mut step = parser::read_der_step(&mut sc, hdr.vars.len(), &hdr.obj)?;
    let mults = match &step.reason {
      Reason::Lin(m) if include_obj || !step.coef_is_obj => Some(m.clone()),
      _ => None,
    };
    if let Some(mults) = mults {
      if rng.gen_range(0..100) < percent {
        step.reason = if incomplete {
          Reason::Incomplete(mults.iter().map(|&(i, _)| i).filter(|&i| i >= n_base).collect())
        } else {
          Reason::Weak { locals: Vec::new(), mults }
        };
      }
    }
    writeln!(out, "{}", writer::render_der_step(&step))?;
  }
  out.flush()?;
  println!("Incompletion of File successful!");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn output_path_inserts_before_the_extension() {
    assert_eq!(output_path("proof.vipr", 50, "weak", "all"), "proof50_weak_all.vipr");
    assert_eq!(output_path("proof", 100, "incomplete", "noobj"),
      "proof100_incomplete_noobj.vipr");
  }
}
