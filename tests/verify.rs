//! End-to-end verifier scenarios driven through certificate files.

use std::fs;
use tempfile::TempDir;
use vipr::checker;

fn write_cert(dir: &TempDir, name: &str, content: &str) -> String {
  let path = dir.path().join(name);
  fs::write(&path, content).unwrap();
  path.to_str().unwrap().to_string()
}

fn verify(content: &str) -> Result<(), String> {
  let dir = TempDir::new().unwrap();
  let path = write_cert(&dir, "cert.vipr", content);
  checker::run(&path).map_err(|e| e.to_string())
}

const TRIVIAL_INFEAS: &str = "\
VER 1.0
VAR 1
x
INT 0
OBJ min 0
CON 2 2
c1 L -1  1 0 1
c2 G 1  1 0 1
RTP infeas
SOL 0
DER 1
d L -1  0  { lin 2  0 1  1 -1 } -1
";

#[test]
fn trivial_infeasibility_is_accepted() {
  verify(TRIVIAL_INFEAS).unwrap();
}

#[test]
fn conflicting_multiplier_signs_are_rejected() {
  // +1 * (x <= -1) and +1 * (x >= 1) mix senses
  let cert = TRIVIAL_INFEAS.replace("{ lin 2  0 1  1 -1 }", "{ lin 2  0 1  1 1 }");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("wrong sign"), "{}", err);
}

#[test]
fn missing_falsehood_is_a_logical_failure() {
  // deriving x <= -1 never triggers the infeasibility goal
  let cert = TRIVIAL_INFEAS.replace("d L -1  0  { lin 2  0 1  1 -1 } -1",
    "d L -1  1 0 1  { lin 1  0 1 } -1");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("verification failed"), "{}", err);
}

const RANGE_BOUND: &str = "\
VER 1.0
VAR 1
x
INT 1
0
OBJ min 1 0 1
CON 2 2
b1 L 10  1 0 1
b2 G 0  1 0 1
RTP range 0 10
SOL 1
s 1 0 0
DER 1
r G 0  OBJ  { lin 1  1 1 } -1
";

#[test]
fn range_bound_is_accepted() {
  verify(RANGE_BOUND).unwrap();
}

#[test]
fn infeasible_solution_is_rejected() {
  // x = 20 violates b1
  let cert = RANGE_BOUND.replace("s 1 0 0", "s 1 0 20");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("SOL"), "{}", err);
}

#[test]
fn fractional_integer_solution_is_rejected() {
  let cert = RANGE_BOUND.replace("s 1 0 0", "s 1 0 1/2");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("noninteger"), "{}", err);
}

#[test]
fn missing_primal_side_is_rejected() {
  // a finite upper bound needs at least one solution in a min problem
  let cert = RANGE_BOUND.replace("SOL 1\ns 1 0 0", "SOL 0");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("primal bound"), "{}", err);
}

#[test]
fn vacuous_dual_side_accepts_after_sol() {
  // min problem with no lower bound to prove: DER is not even read
  let cert = RANGE_BOUND
    .replace("RTP range 0 10", "RTP range -inf 10")
    .replace("r G 0  OBJ  { lin 1  1 1 } -1", "junk");
  verify(&cert).unwrap();
}

#[test]
fn version_mismatch_is_rejected() {
  let cert = RANGE_BOUND.replace("VER 1.0", "VER 2.0");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("version 2.0 unsupported"), "{}", err);
  verify(&RANGE_BOUND.replace("VER 1.0", "VER 1.1")).unwrap();
}

const CG_CUT: &str = "\
VER 1.0
VAR 2
x y
INT 2
0 1
OBJ min 2 0 1 1 1
CON 1 0
c1 G 1/2  2 0 1 1 1
RTP range 1 inf
SOL 0
DER 1
d G 1  OBJ  { rnd 1  0 1 } -1
";

#[test]
fn chvatal_gomory_rounding_is_accepted() {
  // x + y >= 1/2 rounds up to x + y >= 1
  verify(CG_CUT).unwrap();
}

#[test]
fn rounding_with_fractional_coefficients_is_rejected() {
  // (1/3) * (2x + 3y <= 1) leaves the coefficient 2/3 on an integer variable
  let cert = "\
VER 1.0
VAR 2
x y
INT 2
0 1
OBJ min 2 0 1 1 1
CON 1 0
c L 1  2 0 2 1 3
RTP range 0 inf
SOL 1
s 2 0 0 1 0
DER 1
d L 0  2 0 1 1 1  { rnd 1  0 1/3 } -1
";
  let err = verify(cert).unwrap_err();
  assert!(err.contains("not an integer"), "{}", err);
}

#[test]
fn rounding_with_continuous_variables_is_rejected() {
  let cert = CG_CUT.replace("INT 2\n0 1", "INT 1\n0");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("not an integer variable"), "{}", err);
}

const UNSPLIT: &str = "\
VER 1.0
VAR 1
x
INT 1
0
OBJ max 1 0 1
CON 1 0
c L 5  1 0 1
RTP range -inf 5
SOL 0
DER 5
a1 L 0  1 0 1  { asm } -1
r1 L 5  OBJ  { lin 1  1 1 } -1
a2 G 1  1 0 1  { asm } -1
r2 L 5  OBJ  { lin 1  0 1 } -1
r L 5  OBJ  { uns 2 1 4 3 } -1
";

#[test]
fn unsplit_on_integer_disjunction_is_accepted() {
  verify(UNSPLIT).unwrap();
}

#[test]
fn unsplit_needs_adjacent_right_hand_sides() {
  // x <= 0 against x >= 2 leaves the point x = 1 uncovered
  let cert = UNSPLIT.replace("a2 G 1  1 0 1  { asm } -1", "a2 G 2  1 0 1  { asm } -1");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("tautology"), "{}", err);
}

#[test]
fn unsplit_needs_opposite_senses() {
  let cert = UNSPLIT.replace("a2 G 1  1 0 1  { asm } -1", "a2 L 1  1 0 1  { asm } -1");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("sense requirement"), "{}", err);
}

#[test]
fn unsplit_needs_integer_variables() {
  let cert = UNSPLIT.replace("INT 1\n0", "INT 0\n");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("noninteger variable"), "{}", err);
}

#[test]
fn branch_and_bound_infeasibility_proof() {
  // 2x >= 1 and 2x <= 1 force x = 1/2, impossible for integer x. Each
  // branch of the disjunction x <= 0 / x >= 1 derives a falsehood under
  // its assumption; unsplitting discharges both scopes.
  let cert = "\
VER 1.0
VAR 1
x
INT 1
0
OBJ min 0
CON 2 0
c1 G 1  1 0 2
c2 L 1  1 0 2
RTP infeas
SOL 0
DER 5
a1 L 0  1 0 1  { asm } -1
f1 G 1  0  { lin 2  0 1  2 -2 } -1
a2 G 1  1 0 1  { asm } -1
f2 G 1  0  { lin 2  1 -1  4 2 } -1
f G 1  0  { uns 3 2 5 4 } -1
";
  verify(cert).unwrap();
}

#[test]
fn undischarged_assumptions_fail_with_their_scope() {
  // stopping after r1 leaves assumption a1 in scope
  let cert = "\
VER 1.0
VAR 1
x
INT 1
0
OBJ max 1 0 1
CON 1 0
c L 5  1 0 1
RTP range -inf 5
SOL 0
DER 2
a1 L 0  1 0 1  { asm } -1
r1 L 5  OBJ  { lin 1  1 1 } -1
";
  let err = verify(cert).unwrap_err();
  assert!(err.contains("verification failed"), "{}", err);
}

const CUTOFF: &str = "\
VER 1.0
VAR 1
x
INT 1
0
OBJ min 1 0 1
CON 1 1
b G 0  1 0 1
RTP range 0 inf
SOL 1
s 1 0 7
DER 2
c L 6  OBJ  { sol } -1
d G 0  OBJ  { lin 1  0 1 } -1
";

#[test]
fn primal_cutoff_is_accepted() {
  // best solution 7, integral objective: the cutoff is 7 - 1 = 6
  verify(CUTOFF).unwrap();
}

#[test]
fn cutoff_below_the_best_solution_is_rejected() {
  let cert = CUTOFF.replace("c L 6  OBJ  { sol } -1", "c L 5  OBJ  { sol } -1");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("no solution known"), "{}", err);
}

#[test]
fn cutoff_requires_the_literal_objective() {
  // a value-equal spelled-out vector is not identity-equal to OBJ
  let cert = CUTOFF.replace("c L 6  OBJ  { sol } -1", "c L 6  1 0 1  { sol } -1");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("objective"), "{}", err);
}

#[test]
fn incomplete_steps_do_not_verify() {
  let cert = TRIVIAL_INFEAS.replace("{ lin 2  0 1  1 -1 }", "{ lin incomplete }");
  let err = verify(&cert).unwrap_err();
  assert!(err.contains("completer"), "{}", err);
}

#[test]
fn scope_union_flows_through_lin_steps() {
  // d2 combines an assumption-scoped constraint with a base row; the scope
  // survives, so the falsehood under assumption must not prove the RTP
  let cert = "\
VER 1.0
VAR 1
x
INT 0
OBJ min 0
CON 1 0
c G 1  1 0 1
RTP infeas
SOL 0
DER 2
a L 0  1 0 1  { asm } -1
d L -1  0  { lin 2  0 1  1 -1 } -1
";
  let err = verify(cert).unwrap_err();
  assert!(err.contains("verification failed"), "{}", err);
}
