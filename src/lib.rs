//! Tools for certificates of MILP optimality and infeasibility: a verifier
//! that replays the derivations of a certificate with exact rational
//! arithmetic, a completer that fills in missing `lin` multipliers, and an
//! incompletifier that erases them again.

pub mod error;
pub mod rational;
pub mod svec;
pub mod constraint;
pub mod parser;
pub mod writer;
pub mod checker;
pub mod lp;
pub mod simplex;
pub mod completer;
pub mod incompletify;
