//! A compiler for implicit integration schemes of mechanical behaviours.
//!
//! Given the integration variables of a behaviour and the user code computing the residual,
//! the compiler lays out the unknown vector and addresses the blocks of the Jacobian. It then
//! emits the Newton-type loop solving the scheme, with normalisation factors applied to the
//! residual and the Jacobian. A finite-difference Jacobian and the extraction of tangent
//! operator blocks can be generated as well.
//!
//! The numerical algorithms written out by the compiler are also available as a reference
//! runtime in [`optimize`].
pub mod addressing;
pub mod catalogue;
pub mod code_block;
pub mod compiler;
pub mod context;
pub mod convergence;
pub mod emit;
pub mod error;
pub mod frontend;
pub mod hypothesis;
pub mod layout;
pub mod limits;
pub mod normalisation;
pub mod numerical_jacobian;
pub mod options;
pub mod solver;
pub mod tangent;
pub mod value;
pub mod variable;

pub mod optimize {
    pub use implicit_optimize::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;

pub use compiler::{GeneratedBehaviour, GeneratedSection, ImplicitSchemeCompiler, SectionKind};
pub use error::{CompileError, DeclarationError, DeclarationErrorKind, InternalError, SourceLocation};
pub use frontend::{BehaviourDescription, Declaration, DeclarationEvent};
pub use hypothesis::ModellingHypothesis;
pub use options::CompilerOptions;
pub use variable::{IntegrationVariable, TensorRank};
