//! Extraction of blocks of the inverse Jacobian after convergence.
//!
//! The block `(A, B)` of the inverse of the converged Jacobian is the derivative of the unknown
//! `A` with respect to the residual `B`. The generated `computePartialJacobianInvert` factorizes
//! the Jacobian once and back-substitutes every canonical basis vector, so the cost does not
//! depend on the number of requested blocks.
use crate::emit::SourceWriter;
use crate::error::{CompileError, InternalError};
use crate::layout::{LayoutEntry, UnknownVectorLayout};
use crate::normalisation::NormalizationRegistry;
use crate::solver::SolverCapabilities;
use implicit_optimize::tangent::InverseBlock;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A requested block of the inverse Jacobian.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TangentBlock {
    pub variable: String,
    pub with_respect_to: String,
}

impl TangentBlock {
    pub fn new(variable: impl Into<String>, with_respect_to: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            with_respect_to: with_respect_to.into(),
        }
    }

    /// Name of the output argument of `computePartialJacobianInvert`.
    pub fn argument_name(&self) -> String {
        format!("partial_jacobian_{}_{}", self.variable, self.with_respect_to)
    }

    /// Name of the member of the generated class receiving the block.
    pub fn member_name(&self) -> String {
        format!("iJ_{}_{}", self.variable, self.with_respect_to)
    }
}

struct ResolvedBlock<'a> {
    block: &'a TangentBlock,
    a: &'a LayoutEntry,
    b: &'a LayoutEntry,
}

/// Emits the extraction of the requested blocks of the inverse Jacobian.
#[derive(Debug, Clone, Copy)]
pub struct TangentOperatorExtractor<'a> {
    pub layout: &'a UnknownVectorLayout,
    pub normalisation: &'a NormalizationRegistry,
    pub capabilities: SolverCapabilities,
}

impl<'a> TangentOperatorExtractor<'a> {
    fn resolve<'b>(&'b self, blocks: &'b [TangentBlock]) -> Result<Vec<ResolvedBlock<'b>>, InternalError> {
        blocks
            .iter()
            .map(|block| {
                let unknown = || InternalError::UnknownTangentBlock {
                    variable: block.variable.clone(),
                    with_respect_to: block.with_respect_to.clone(),
                };
                Ok(ResolvedBlock {
                    block,
                    a: self.layout.entry(&block.variable).ok_or_else(unknown)?,
                    b: self.layout.entry(&block.with_respect_to).ok_or_else(unknown)?,
                })
            })
            .collect()
    }

    /// Rows and columns of the requested blocks in the Jacobian.
    pub fn inverse_blocks(&self, blocks: &[TangentBlock]) -> Result<Vec<InverseBlock>, InternalError> {
        Ok(self
            .resolve(blocks)?
            .iter()
            .map(|r| InverseBlock {
                rows: r.a.range(),
                cols: r.b.range(),
            })
            .collect())
    }

    /// Members of the generated class receiving the blocks.
    pub fn emit_members(&self, w: &mut SourceWriter, blocks: &[TangentBlock]) -> Result<(), CompileError> {
        for resolved in self.resolve(blocks)? {
            writeln!(
                w,
                "tmatrix<{}, {}, real> {};",
                resolved.a.block_size,
                resolved.b.block_size,
                resolved.block.member_name()
            )?;
        }
        Ok(())
    }

    /// The call of `computePartialJacobianInvert` made by `integrate()` after convergence.
    pub fn emit_call(&self, w: &mut SourceWriter, blocks: &[TangentBlock]) -> Result<(), CompileError> {
        let arguments = self
            .resolve(blocks)?
            .iter()
            .map(|resolved| format!("this->{}", resolved.block.member_name()))
            .join(", ");
        w.open(&format!("if(!this->computePartialJacobianInvert({})){{", arguments))?;
        writeln!(w, "return FAILURE;")?;
        w.close("}")?;
        Ok(())
    }

    /// Writes `computePartialJacobianInvert`.
    ///
    /// When the solver iterates on the inverse Jacobian, the blocks are copied from it directly.
    /// Otherwise the Jacobian is factorized once and a singular matrix makes the routine return
    /// `false`. In both cases the normalisation of each block is undone exactly once.
    pub fn emit(&self, w: &mut SourceWriter, blocks: &[TangentBlock]) -> Result<(), CompileError> {
        let resolved = self.resolve(blocks)?;
        let parameters = resolved
            .iter()
            .map(|r| {
                format!(
                    "tmatrix<{}, {}, real>& {}",
                    r.a.block_size,
                    r.b.block_size,
                    r.block.argument_name()
                )
            })
            .join(", ");

        w.open(&format!("bool computePartialJacobianInvert({}){{", parameters))?;
        if self.capabilities.uses_jacobian_invert {
            for r in &resolved {
                w.open(&format!("for(unsigned short idx = 0; idx != {}; ++idx){{", r.a.block_size))?;
                w.open(&format!("for(unsigned short idx2 = 0; idx2 != {}; ++idx2){{", r.b.block_size))?;
                writeln!(
                    w,
                    "{}(idx, idx2) = this->jacobian({}_offset + idx, {}_offset + idx2);",
                    r.block.argument_name(),
                    r.a.name(),
                    r.b.name()
                )?;
                w.close("}")?;
                w.close("}")?;
            }
        } else {
            writeln!(w, "TinyPermutation<N> jacobian_permutation;")?;
            w.open("try{")?;
            writeln!(w, "TinyMatrixSolve<N, real>::decomp(this->jacobian, jacobian_permutation);")?;
            w.close("}")?;
            w.open("catch(LUException&){")?;
            writeln!(w, "return false;")?;
            w.close("}")?;
            w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
            writeln!(w, "tvector<N, real> vect_e(real(0));")?;
            writeln!(w, "vect_e(idx) = real(1);")?;
            writeln!(
                w,
                "TinyMatrixSolve<N, real>::back_substitute(this->jacobian, jacobian_permutation, vect_e);"
            )?;
            for r in &resolved {
                w.open(&format!(
                    "if((idx >= {0}_offset) && (idx < {0}_offset + {1})){{",
                    r.b.name(),
                    r.b.block_size
                ))?;
                w.open(&format!("for(unsigned short idx2 = 0; idx2 != {}; ++idx2){{", r.a.block_size))?;
                writeln!(
                    w,
                    "{}(idx2, idx - {}_offset) = vect_e({}_offset + idx2);",
                    r.block.argument_name(),
                    r.b.name(),
                    r.a.name()
                )?;
                w.close("}")?;
                w.close("}")?;
            }
            w.close("}")?;
        }

        let mut pass = self.normalisation.begin_pass();
        for r in &resolved {
            let target = r.block.argument_name();
            if let Some(undo) = pass.inverse_block_undo(&target, r.a.name(), r.b.name())? {
                writeln!(w, "{}", undo)?;
            }
        }
        writeln!(w, "return true;")?;
        w.close("}")?;
        Ok(())
    }
}
