//! Thin kernel over the `num` stack. `BigRational` keeps numerator and
//! denominator coprime at all times, so values parsed or computed here are
//! already in canonical form; the kernel only adds certificate-style string
//! parsing and small sign helpers.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

pub type Rat = num_rational::BigRational;

pub fn rat(n: i64) -> Rat {
  Rat::from_integer(BigInt::from(n))
}

pub fn rat_frac(n: i64, d: i64) -> Rat {
  Rat::new(BigInt::from(n), BigInt::from(d))
}

/// -1, 0 or +1.
pub fn sign(q: &Rat) -> i32 {
  if q.is_positive() { 1 } else if q.is_negative() { -1 } else { 0 }
}

fn digits(s: &str) -> Option<BigInt> {
  if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) { return None }
  s.parse().ok()
}

/// Parses the number formats the certificate format allows: an optionally
/// signed integer, fraction `p/q` or decimal `i.f`.
pub fn parse(tok: &str) -> Option<Rat> {
  let (neg, s) = match tok.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, tok.strip_prefix('+').unwrap_or(tok)),
  };
  let q = if let Some((n, d)) = s.split_once('/') {
    let d = digits(d)?;
    if d.is_zero() { return None }
    Rat::new(digits(n)?, d)
  } else if let Some((i, f)) = s.split_once('.') {
    let int = if i.is_empty() { BigInt::zero() } else { digits(i)? };
    let frac = digits(f)?;
    let den = (0..f.len()).fold(BigInt::from(1), |acc, _| acc * 10);
    Rat::new(int * &den + frac, den)
  } else {
    Rat::from_integer(digits(s)?)
  };
  Some(if neg { -q } else { q })
}
