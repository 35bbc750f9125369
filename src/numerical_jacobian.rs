//! Central finite-difference approximation of the Jacobian.
//!
//! The generated `computeNumericalJacobian` perturbs every component of the unknown vector by
//! `±eps`, evaluates the residual twice and stores `(f(z + eps e_i) - f(z - eps e_i)) / (2 eps)`
//! as column `i`. The unknowns, the residual and the analytical Jacobian are restored afterwards,
//! so the routine can serve both as the only source of the Jacobian and as a diagnostic.
use crate::addressing::address_for;
use crate::emit::SourceWriter;
use crate::layout::UnknownVectorLayout;
use crate::variable::jacobian_block_name;
use log::debug;
use std::fmt;
use std::fmt::Write;

/// Prefix of the accessors of the numerical Jacobian blocks.
pub const NUMERICAL_PREFIX: &str = "n";

/// Writes `computeNumericalJacobian`, perturbing the unknowns by the expression `epsilon`.
pub fn emit(w: &mut SourceWriter, layout: &UnknownVectorLayout, epsilon: &str) -> fmt::Result {
    debug!(
        "Emitting numerical jacobian over {} unknowns",
        layout.total_size()
    );
    let restore = "this->zeros = tzeros;\nthis->fzeros = tfzeros;\nthis->jacobian = tjacobian;\nreturn false;";

    w.open("bool computeNumericalJacobian(tmatrix<N, N, real>& njacobian){")?;
    writeln!(w, "const real eps = {};", epsilon)?;
    writeln!(w, "const tvector<N, real> tzeros(this->zeros);")?;
    writeln!(w, "const tvector<N, real> tfzeros(this->fzeros);")?;
    writeln!(w, "const tmatrix<N, N, real> tjacobian(this->jacobian);")?;
    w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
    writeln!(w, "this->zeros(idx) -= eps;")?;
    w.open("if(!this->computeFdF()){")?;
    w.code(restore)?;
    w.close("}")?;
    writeln!(w, "const tvector<N, real> tfzeros2(this->fzeros);")?;
    writeln!(w, "this->zeros = tzeros;")?;
    writeln!(w, "this->zeros(idx) += eps;")?;
    w.open("if(!this->computeFdF()){")?;
    w.code(restore)?;
    w.close("}")?;
    w.open("for(unsigned short idx2 = 0; idx2 != N; ++idx2){")?;
    writeln!(
        w,
        "njacobian(idx2, idx) = (this->fzeros(idx2) - tfzeros2(idx2)) / (2 * eps);"
    )?;
    w.close("}")?;
    writeln!(w, "this->zeros = tzeros;")?;
    writeln!(w, "this->fzeros = tfzeros;")?;
    w.close("}")?;
    w.open("if(&njacobian != &(this->jacobian)){")?;
    writeln!(w, "this->jacobian = tjacobian;")?;
    w.close("}")?;
    writeln!(w, "return true;")?;
    w.close("}")
}

/// Writes the comparison of the analytical Jacobian with the numerical one.
///
/// The block `(a, b)` is reported when its largest discrepancy exceeds
/// `nv_a * nv_b * jacobianComparisonCriterion`, where `nv` is the number of components of one
/// element of a variable, whatever its array size.
/// The largest discrepancy over the whole matrix is reported as `jacobian_error`. Blocks which
/// can be mapped without arrays are printed next to their numerical counterpart.
pub fn emit_comparison(w: &mut SourceWriter, layout: &UnknownVectorLayout) -> fmt::Result {
    w.open("{")?;
    w.comment("comparison to the numerical jacobian")?;
    writeln!(w, "tmatrix<N, N, real> njacobian;")?;
    w.open("if(!this->computeNumericalJacobian(njacobian)){")?;
    writeln!(w, "return FAILURE;")?;
    w.close("}")?;
    writeln!(w, "real jacobian_error = real(0);")?;
    w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
    w.open("for(unsigned short idx2 = 0; idx2 != N; ++idx2){")?;
    writeln!(
        w,
        "jacobian_error = std::max(jacobian_error, std::abs(this->jacobian(idx, idx2) - njacobian(idx, idx2)));"
    )?;
    w.close("}")?;
    w.close("}")?;
    writeln!(
        w,
        "std::cout << \"integrate() : maximum jacobian error \" << jacobian_error << std::endl;"
    )?;

    for r in layout.entries() {
        for u in layout.entries() {
            let name = jacobian_block_name(r.name(), u.name());
            w.open("{")?;
            writeln!(w, "real block_error = real(0);")?;
            w.open(&format!(
                "for(unsigned short idx = {0}_offset; idx != {0}_offset + {1}; ++idx){{",
                r.name(),
                r.block_size
            ))?;
            w.open(&format!(
                "for(unsigned short idx2 = {0}_offset; idx2 != {0}_offset + {1}; ++idx2){{",
                u.name(),
                u.block_size
            ))?;
            writeln!(
                w,
                "block_error = std::max(block_error, std::abs(this->jacobian(idx, idx2) - njacobian(idx, idx2)));"
            )?;
            w.close("}")?;
            w.close("}")?;
            w.open(&format!(
                "if(block_error > {} * {} * (this->jacobianComparisonCriterion)){{",
                r.components, u.components
            ))?;
            writeln!(
                w,
                "std::cout << \"integrate() : jacobian block {} differs from its numerical approximation (\" << block_error << \")\" << std::endl;",
                name
            )?;
            // Blocks of arrays are lambdas and can not be printed
            if let Some(plan) = address_for(r.name(), u.name(), layout).ok().filter(|p| !p.is_array()) {
                let numerical = format!("{}{}", NUMERICAL_PREFIX, name);
                writeln!(w, "{}", plan.accessor(&name, "this->jacobian"))?;
                writeln!(w, "{}", plan.accessor(&numerical, "njacobian"))?;
                writeln!(
                    w,
                    "std::cout << \"{0} : \" << {0} << \"\\n{1} : \" << {1} << std::endl;",
                    name, numerical
                )?;
            }
            w.close("}")?;
            w.close("}")?;
        }
    }
    w.close("}")
}
