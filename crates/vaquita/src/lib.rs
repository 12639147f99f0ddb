#![forbid(unsafe_code)]

//! Solver for the Variable Placement with Separation Constraints (VPSC) problem.
//!
//! Given one-dimensional variables with desired positions and weights, and
//! separation constraints of the form `left + gap <= right` (or `=` for
//! equalities), the solver finds positions satisfying every constraint while
//! minimising the weighted squared distance of each variable from its desired
//! position. This is the core primitive behind rectangle overlap removal and
//! constrained graph layout; callers run it once per axis.
//!
//! [`Solver`] solves a static problem in two phases (satisfy, then refine).
//! [`IncSolver`] re-optimises incrementally after desired positions change,
//! which is the cheaper choice inside an iterative layout loop.

pub mod data;
pub mod error;

mod block;
mod blocks;
mod constraint;
mod solver;
mod variable;

pub use constraint::{Constraint, ConstraintId};
pub use error::{Error, Result};
pub use solver::{IncSolver, Solver};
pub use variable::{Variable, VariableId};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
