//! Reference runtime for implicit integration schemes.
//!
//! The routines in this crate execute, on `nalgebra` matrices, the same algorithms that
//! `implicit-codegen` writes out as generated source: the central-difference Jacobian,
//! the normalized Newton loop and the extraction of tangent blocks from a single
//! factorization of the converged Jacobian.
use nalgebra::RealField;

pub use nalgebra;

/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// The normalized Newton loop with its convergence state machine
pub mod newton;
/// Scale factors applied to unknowns and residuals
pub mod normalisation;
/// Extraction of inverse Jacobian blocks from one factorization
pub mod tangent;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
