//! The completer behind `vipr complete`.
//!
//! Rewrites a certificate so that every `lin` derivation carries explicit
//! multipliers. A step marked `weak` is corrected with variable bounds; a
//! step marked `incomplete` is handed to an exact-rational LP over its
//! active constraint set and the multipliers are read back from the duals.
//! Completion runs as a three-stage pipeline: a serial producer dispatches
//! steps (pulling reusable LP contexts from a fixed ring of 2*T), parallel
//! workers complete them, and a serial consumer re-emits everything in the
//! original order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Instant;
use crossbeam_channel::bounded;
use hashbrown::HashMap;
use num_traits::{Signed, Zero};
use crate::constraint::{Constraint, Scope};
use crate::error::{Result, ViprError};
use crate::lp::{LpContext, LpSolver, LpStatus};
use crate::parser::{self, DerStep, LocalBound, Reason, Scanner};
use crate::rational::{self, Rat};
use crate::simplex::Simplex;
use crate::svec::SVec;
use crate::writer;

const USAGE: &str = "vipr complete [--soplex=on|off] [--debugmode=on|off] \
[--verbosity=0..5] [--threads=N] [--outfile=PATH] <certificate>";

/// How many passthrough steps the producer batches between jobs.
const BATCH: usize = 10;

pub struct Options {
  pub use_lp: bool,
  pub debug: bool,
  pub verbosity: u32,
  pub threads: usize,
  pub outfile: Option<String>,
  pub path: String,
}

impl Default for Options {
  fn default() -> Options {
    let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    Options { use_lp: true, debug: false, verbosity: 0, threads, outfile: None, path: String::new() }
  }
}

pub fn main(args: impl Iterator<Item = String>) -> Result<()> {
  let opts = parse_args(args)?;
  run(&opts)
}

fn on_off(val: &str, name: &str) -> Result<bool> {
  match val {
    "on" => Ok(true),
    "off" => Ok(false),
    _ => {
      eprintln!("unknown input for {} (on/off expected), read {} instead", name, val);
      Err(ViprError::Usage(USAGE))
    }
  }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Options> {
  let mut opts = Options::default();
  let mut path = None;
  for arg in args {
    if let Some(rest) = arg.strip_prefix("--") {
      let (key, val) = rest.split_once('=').unwrap_or((rest, ""));
      match key {
        "soplex" => opts.use_lp = on_off(val, "soplex")?,
        "debugmode" => opts.debug = on_off(val, "debugmode")?,
        "verbosity" => {
          let v: u32 = val.parse().map_err(|_| ViprError::Usage(USAGE))?;
          if v > 5 {
            eprintln!("verbosity level outside range 0 to 5, read {} instead", v);
            return Err(ViprError::Usage(USAGE));
          }
          opts.verbosity = v;
        }
        "threads" => {
          let n: usize = val.parse().map_err(|_| ViprError::Usage(USAGE))?;
          opts.threads = n.max(1);
        }
        "outfile" => opts.outfile = Some(val.to_string()),
        _ => {
          eprintln!("invalid option \"{}\"", arg);
          return Err(ViprError::Usage(USAGE));
        }
      }
    } else {
      path = Some(arg);
    }
  }
  opts.path = path.ok_or(ViprError::Usage(USAGE))?;
  Ok(opts)
}

fn default_outfile(path: &str) -> String {
  match path.rfind('.') {
    Some(pos) => format!("{}_complete.vipr", &path[..pos]),
    None => format!("{}_complete.vipr", path),
  }
}

#[derive(Clone, Debug)]
pub struct BoundRec {
  pub val: Rat,
  pub factor: Rat,
  pub cert: usize,
}

/// Tightest known single-variable bounds, kept as (normalized value,
/// original coefficient, certificate index) so a bound multiplier can be
/// translated back to the bound row it came from.
pub struct Bounds {
  pub lower: Vec<Option<BoundRec>>,
  pub upper: Vec<Option<BoundRec>>,
}

impl Bounds {
  pub fn new(n_vars: usize) -> Bounds {
    Bounds { lower: vec![None; n_vars], upper: vec![None; n_vars] }
  }

  /// Records `con` if it is a single-variable row: the bound is normalized
  /// by the coefficient (flipping the sense for negative factors) and kept
  /// only when tighter than what is already known.
  pub fn record(&mut self, con: &Constraint, cert: usize) {
    let mut it = con.coef().iter();
    let Some((var, factor)) = it.next() else { return };
    if it.next().is_some() || factor.is_zero() { return }
    let val = con.rhs() / factor;
    let sense = con.sense().sign() * rational::sign(factor);
    let rec = BoundRec { val: val.clone(), factor: factor.clone(), cert };
    if sense <= 0 {
      let tighter = self.upper[var].as_ref().map_or(true, |cur| val < cur.val);
      if tighter { self.upper[var] = Some(rec.clone()) }
    }
    if sense >= 0 {
      let tighter = self.lower[var].as_ref().map_or(true, |cur| val > cur.val);
      if tighter { self.lower[var] = Some(rec) }
    }
  }
}

fn combine(mults: &BTreeMap<usize, Rat>, rows: &[Constraint]) -> (SVec, Rat) {
  let mut coef = SVec::new();
  let mut rhs = Rat::zero();
  for (idx, a) in mults {
    coef.add_scaled(rows[*idx].coef(), a);
    rhs += a * rows[*idx].rhs();
  }
  coef.compactify();
  (coef, rhs)
}

/// Closes the gap between the claimed coefficients and the supplied linear
/// combination using variable bounds: for each index in the symmetric
/// difference of the supports, the gap is charged to the best lower or
/// upper bound row (local annotations first, then globals) and the
/// multiplier list and corrected right-hand side are adjusted.
pub fn complete_weak(claimed: &Constraint, locals: &[LocalBound], mults: &[(usize, Rat)],
    rows: &[Constraint], bounds: &Bounds, debug: bool) -> std::result::Result<Vec<(usize, Rat)>, String> {
  let csense = claimed.sense().sign();
  let mut sense_sign = csense;
  let mut map: BTreeMap<usize, Rat> = BTreeMap::new();
  for (idx, a) in mults {
    if *idx >= rows.len() { return Err(format!("index out of bounds: {}", idx)) }
    if a.is_zero() { continue }
    let term = rows[*idx].sense().sign() * rational::sign(a);
    if sense_sign == 0 {
      sense_sign = term;
    } else if term != 0 && term != sense_sign {
      return Err(format!("coefficient has wrong sign for index {}", idx));
    }
    map.insert(*idx, a.clone());
  }
  let (coef, rhs) = combine(&map, rows);
  let mut corrected = rhs.clone();

  let mut local_lower: HashMap<usize, &LocalBound> = HashMap::new();
  let mut local_upper: HashMap<usize, &LocalBound> = HashMap::new();
  for b in locals {
    if b.lower { local_lower.insert(b.var, b); } else { local_upper.insert(b.var, b); }
  }

  let mut support: BTreeSet<usize> = coef.indices().collect();
  support.extend(claimed.coef().indices());
  for idx in support {
    let gap = claimed.coef().get(idx) - coef.get(idx);
    if gap.is_zero() { continue }
    let islower = match csense {
      -1 => !gap.is_positive(),
      1 => !gap.is_negative(),
      _ => return Err("cannot complete weakly dominated equality constraints".to_string()),
    };
    let local = if islower { local_lower.get(&idx) } else { local_upper.get(&idx) };
    let (cert, val, factor) = match local {
      Some(b) => (b.cert, b.val.clone(), rational::rat(1)),
      None => {
        let global = if islower { &bounds.lower[idx] } else { &bounds.upper[idx] };
        match global {
          Some(rec) => (rec.cert, rec.val.clone(), rec.factor.clone()),
          None => return Err(format!("no usable {} bound for variable {}",
            if islower { "lower" } else { "upper" }, idx)),
        }
      }
    };
    if debug {
      println!("    correcting index {} by {} using {} bound {}", idx, gap,
        if islower { "lower" } else { "upper" }, val);
    }
    let entry = map.entry(cert).or_insert_with(Rat::zero);
    *entry += &gap / &factor;
    corrected += &gap * &val;
  }

  let violated = (csense == -1 && corrected > *claimed.rhs())
    || (csense == 1 && corrected < *claimed.rhs());
  if violated {
    if claimed.coef().is_empty() {
      let infeasible = (csense == -1 && corrected.is_negative())
        || (csense == 1 && corrected.is_positive());
      if !infeasible { return Err("invalid claim of infeasibility".to_string()) }
    } else {
      return Err(format!("corrected side {} does not dominate the claimed side {}",
        corrected, claimed.rhs()));
    }
  }
  map.retain(|_, a| !a.is_zero());
  Ok(map.into_iter().collect())
}

/// Solves an exact LP over the active constraints and reads the multipliers
/// from the duals (row certificate indices) and reduced costs (charged to
/// the variable's global bound row, scaled by the bound factor).
pub fn complete_incomplete<S: LpSolver>(ctx: &mut LpContext<S>, active: &[usize],
    claimed: &Constraint, rows: &[Constraint], bounds: &Bounds)
    -> std::result::Result<Vec<(usize, Rat)>, String> {
  let minimize = claimed.sense().sign() >= 0;
  ctx.lp.set_objective(claimed.coef(), minimize);
  ctx.sync_active(active, rows);
  let (dual_vec, rcosts) = match ctx.lp.solve() {
    LpStatus::Optimal => (ctx.lp.duals().to_vec(), ctx.lp.reduced_costs().to_vec()),
    LpStatus::Infeasible => (ctx.lp.farkas().to_vec(), ctx.lp.reduced_costs().to_vec()),
    LpStatus::Other(status) => return Err(format!("LP returned with status {}", status)),
  };
  let mut map: BTreeMap<usize, Rat> = BTreeMap::new();
  for (row, y) in dual_vec.iter().enumerate() {
    if y.is_zero() { continue }
    *map.entry(ctx.cert_index(row)).or_insert_with(Rat::zero) += y;
  }
  for (j, d) in rcosts.iter().enumerate() {
    if d.is_zero() { continue }
    // a positive reduced cost sits on the bound opposing the optimization
    // direction: the lower bound when minimizing, the upper when maximizing
    let islower = d.is_positive() == minimize;
    let rec = if islower { &bounds.lower[j] } else { &bounds.upper[j] };
    let Some(rec) = rec else {
      return Err(format!("no bound row to carry the reduced cost of variable {}", j));
    };
    *map.entry(rec.cert).or_insert_with(Rat::zero) += d / &rec.factor;
  }
  map.retain(|_, a| !a.is_zero());
  Ok(map.into_iter().collect())
}

/// Fixed-capacity ring buffer holding the reusable LP contexts.
struct CircBuf<T> {
  arr: Vec<Option<T>>,
  head: usize,
  tail: usize,
  len: usize,
}

impl<T> CircBuf<T> {
  fn new(cap: usize) -> CircBuf<T> {
    CircBuf { arr: (0..cap).map(|_| None).collect(), head: 0, tail: 0, len: 0 }
  }

  fn enqueue(&mut self, v: T) {
    assert!(self.len < self.arr.len(), "circular buffer overflow");
    self.arr[self.tail] = Some(v);
    self.tail = (self.tail + 1) % self.arr.len();
    self.len += 1;
  }

  fn dequeue(&mut self) -> Option<T> {
    if self.len == 0 { return None }
    let v = self.arr[self.head].take();
    self.head = (self.head + 1) % self.arr.len();
    self.len -= 1;
    v
  }
}

struct Pool<T> {
  buf: Mutex<CircBuf<T>>,
  ready: Condvar,
}

impl<T> Pool<T> {
  fn new(items: Vec<T>) -> Pool<T> {
    let mut buf = CircBuf::new(items.len());
    for v in items { buf.enqueue(v) }
    Pool { buf: Mutex::new(buf), ready: Condvar::new() }
  }

  fn acquire(&self) -> T {
    let mut buf = self.buf.lock().unwrap();
    loop {
      if let Some(v) = buf.dequeue() { return v }
      buf = self.ready.wait(buf).unwrap();
    }
  }

  fn release(&self, v: T) {
    self.buf.lock().unwrap().enqueue(v);
    self.ready.notify_one();
  }
}

type Ctx = Box<LpContext<Simplex>>;

enum Work {
  Pass { seq: usize, lines: Vec<String> },
  Job { seq: usize, idx: usize, ctx: Option<Ctx> },
}

enum Done {
  Pass { seq: usize, lines: Vec<String> },
  Job { seq: usize, line: String, completed: bool, ctx: Option<Ctx> },
}

fn completed_line(step: &DerStep, mults: Vec<(usize, Rat)>) -> String {
  let rewritten = DerStep {
    label: step.label.clone(),
    sense: step.sense,
    rhs: step.rhs.clone(),
    coef: step.coef.clone(),
    coef_is_obj: step.coef_is_obj,
    reason: Reason::Lin(mults),
    max_ref: -1,
    global: step.global,
  };
  writer::render_der_step(&rewritten)
}

fn complete_step(step: &DerStep, claimed: &Constraint, rows: &[Constraint], bounds: &Bounds,
    ctx: Option<&mut LpContext<Simplex>>, debug: bool) -> (String, bool) {
  match &step.reason {
    Reason::Weak { locals, mults } => {
      match complete_weak(claimed, locals, mults, rows, bounds, debug) {
        Ok(m) => (completed_line(step, m), true),
        Err(msg) => {
          eprintln!("Warning: could not complete weak derivation {}: {}", step.label, msg);
          (writer::render_der_step(step), false)
        }
      }
    }
    Reason::Incomplete(active) => {
      let Some(ctx) = ctx else { return (writer::render_der_step(step), false) };
      match complete_incomplete(ctx, active, claimed, rows, bounds) {
        Ok(m) => (completed_line(step, m), true),
        Err(msg) => {
          eprintln!("Warning: completion attempt of derivation {} failed: {}", step.label, msg);
          eprintln!("Skip and continue completion of certificate.");
          (writer::render_der_step(step), false)
        }
      }
    }
    _ => (writer::render_der_step(step), false),
  }
}

pub fn run(opts: &Options) -> Result<()> {
  let data = fs::read(&opts.path)?;
  let start = Instant::now();
  let mut sc = Scanner::new(&data);
  let hdr = parser::read_header(&mut sc)?;
  println!("\nreading took {} seconds (Wall Clock)", start.elapsed().as_secs_f64());

  let out_path = opts.outfile.clone().unwrap_or_else(|| default_outfile(&opts.path));
  let mut out = BufWriter::new(File::create(&out_path)?);
  writer::write_header(&mut out, &hdr)?;

  let n_base = hdr.n_base();
  let mut bounds = Bounds::new(hdr.vars.len());
  for (i, con) in hdr.base.iter().enumerate() {
    bounds.record(con, i);
  }

  println!("\nProcessing DER section...");
  sc.section = "DER";
  sc.keyword("DER")?;
  let n_der = sc.usize_tok()?;
  writeln!(out, "DER {}", n_der)?;
  println!("Number of Derivations is {}", n_der);
  if n_der == 0 {
    println!("Number of derivations = 0. Nothing to complete.");
    out.flush()?;
    return Ok(());
  }

  // materialize the whole DER section first so pipeline workers share an
  // immutable constraint list
  let mut steps = Vec::with_capacity(n_der);
  let mut rows: Vec<Constraint> = hdr.base.clone();
  for i in 0..n_der {
    let step = parser::read_der_step(&mut sc, hdr.vars.len(), &hdr.obj)?;
    let mut con = Constraint::new(step.label.clone(), step.sense, step.rhs.clone(),
      step.coef.clone(), false, Scope::new());
    if step.coef_is_obj { con.mark_objective() }
    if step.global { bounds.record(&con, n_base + i) }
    rows.push(con);
    steps.push(step);
  }

  let threads = opts.threads.max(1);
  println!("Available threads: {}", threads);

  let needs_lp = opts.use_lp
    && steps.iter().any(|s| matches!(s.reason, Reason::Incomplete(_)));
  let pool = if needs_lp {
    let mut proto = Simplex::new(hdr.vars.len());
    for con in &hdr.base {
      proto.add_row(con.coef(), con.sense(), con.rhs().clone());
    }
    let ctxs: Vec<Ctx> = (0..2 * threads)
      .map(|_| Box::new(LpContext::new(proto.clone(), n_base)))
      .collect();
    Some(Pool::new(ctxs))
  } else {
    None
  };

  let pipeline_start = Instant::now();
  let n_completed = pipeline(opts, threads, &steps, &rows, &bounds, n_base,
    pool.as_ref(), &mut out)?;
  out.flush()?;
  println!("\nprocessing completion pipeline took {} seconds (Wall Clock)",
    pipeline_start.elapsed().as_secs_f64());
  println!("Completed {} out of {}", n_completed, n_der);
  println!("Completion of File successful!");
  Ok(())
}

fn pipeline(opts: &Options, threads: usize, steps: &[DerStep], rows: &[Constraint],
    bounds: &Bounds, n_base: usize, pool: Option<&Pool<Ctx>>, out: &mut impl Write)
    -> Result<usize> {
  let use_lp = opts.use_lp;
  let debug = opts.debug;

  let (work_tx, work_rx) = bounded::<Work>(2 * threads);
  let (done_tx, done_rx) = bounded::<Done>(2 * threads);

  thread::scope(|s| -> Result<usize> {
    for _ in 0..threads {
      let work_rx = work_rx.clone();
      let done_tx = done_tx.clone();
      s.spawn(move || {
        for work in work_rx {
          let done = match work {
            Work::Pass { seq, lines } => Done::Pass { seq, lines },
            Work::Job { seq, idx, mut ctx } => {
              let claimed = &rows[n_base + idx];
              let (line, completed) = complete_step(&steps[idx], claimed, rows, bounds,
                ctx.as_deref_mut(), debug);
              Done::Job { seq, line, completed, ctx }
            }
          };
          if done_tx.send(done).is_err() { break }
        }
      });
    }
    drop(work_rx);
    drop(done_tx);

    // stage 1: serial producer; passthrough steps stream in batches of up
    // to BATCH lines, pending steps travel alone with a pool context
    s.spawn(move || {
      let mut seq = 0;
      let mut batch = Vec::new();
      for (idx, step) in steps.iter().enumerate() {
        let pending = match step.reason {
          Reason::Incomplete(_) => use_lp,
          Reason::Weak { .. } => true,
          _ => false,
        };
        if pending {
          if !batch.is_empty() {
            let lines = std::mem::take(&mut batch);
            if work_tx.send(Work::Pass { seq, lines }).is_err() { return }
            seq += 1;
          }
          let ctx = match (&step.reason, pool) {
            (Reason::Incomplete(_), Some(pool)) => Some(pool.acquire()),
            _ => None,
          };
          if work_tx.send(Work::Job { seq, idx, ctx }).is_err() { return }
          seq += 1;
        } else {
          batch.push(writer::render_der_step(step));
          if batch.len() == BATCH {
            let lines = std::mem::take(&mut batch);
            if work_tx.send(Work::Pass { seq, lines }).is_err() { return }
            seq += 1;
          }
        }
      }
      if !batch.is_empty() {
        let _ = work_tx.send(Work::Pass { seq, lines: batch });
      }
    });

    // stage 3: serial consumer; contexts go back to the pool immediately,
    // lines wait in the reorder buffer until their turn
    let mut buffer: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    let mut next = 0;
    let mut n_completed = 0;
    let mut write_err: Option<io::Error> = None;
    for done in done_rx.iter() {
      let (seq, lines) = match done {
        Done::Pass { seq, lines } => (seq, lines),
        Done::Job { seq, line, completed, ctx } => {
          if let (Some(pool), Some(ctx)) = (pool, ctx) { pool.release(ctx) }
          if completed { n_completed += 1 }
          (seq, vec![line])
        }
      };
      buffer.insert(seq, lines);
      while let Some(lines) = buffer.remove(&next) {
        if write_err.is_none() {
          for line in &lines {
            if let Err(e) = writeln!(out, "{}", line) { write_err = Some(e); break }
          }
        }
        next += 1;
      }
    }
    match write_err {
      Some(e) => Err(e.into()),
      None => Ok(n_completed),
    }
  })
}
