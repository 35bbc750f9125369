//! Pluggable solver strategies driving the implicit scheme.
use crate::emit::{real_literal, SourceWriter};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::fmt;
use std::fmt::{Debug, Write};

/// What a solver strategy needs from the generated code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SolverCapabilities {
    /// The strategy works with (an approximation of) the Jacobian stored in `jacobian`.
    pub uses_jacobian: bool,
    /// The strategy works with an approximation of the inverse Jacobian stored in `jacobian`.
    pub uses_jacobian_invert: bool,
    /// The Jacobian is computed by finite differences before every correction.
    pub requires_numerical_jacobian: bool,
    /// The Jacobian is reset to the identity before every evaluation of the residual.
    pub requires_jacobian_reset_to_identity: bool,
    pub allows_jacobian_initialisation: bool,
    pub allows_jacobian_invert_initialisation: bool,
}

/// Information passed to a strategy while it writes its part of the generated code.
#[derive(Debug, Clone, Copy)]
pub struct SolverEmission<'a> {
    /// Size of the unknown vector.
    pub n: usize,
    pub debug: bool,
    /// Rewritten `@InitializeJacobian` code, if any.
    pub initialize_jacobian: Option<&'a str>,
    /// Rewritten `@InitializeJacobianInvert` code, if any.
    pub initialize_jacobian_invert: Option<&'a str>,
    /// Default of `powell_dogleg_trust_region_size`, per component of the unknown vector.
    pub trust_region_size: f64,
}

/// A solver strategy supplies its capabilities and the solver-specific parts of the iteration.
///
/// The convergence loop itself is written by the
/// [`ConvergenceController`](crate::convergence::ConvergenceController), which calls into the
/// strategy at fixed points.
pub trait SolverStrategy: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> SolverCapabilities;

    /// Solver-specific state of the generated class.
    fn emit_members(&self, _w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        Ok(())
    }

    /// Code executed once, before the first iteration.
    fn emit_initialisation(&self, _w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        Ok(())
    }

    /// Code replacing `fzeros` by the correction to be subtracted from `zeros`.
    ///
    /// The residual has been evaluated and was found not converged.
    fn emit_correction(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result;

    /// The matrix factorised by [`emit_correction`](Self::emit_correction), if it still holds
    /// the unfactorised matrix once the correction has been computed.
    fn factorised_matrix(&self) -> Option<&'static str> {
        None
    }

    /// Code executed after `zeros` has been updated with the (possibly limited) correction.
    fn emit_after_update(&self, _w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        Ok(())
    }
}

fn emit_lu_solve(w: &mut SourceWriter, ctx: &SolverEmission, matrix: &str) -> fmt::Result {
    w.open("try{")?;
    writeln!(w, "TinyMatrixSolve<N, real>::exe({}, this->fzeros);", matrix)?;
    w.close("}")?;
    w.open("catch(LUException&){")?;
    if ctx.debug {
        writeln!(w, "std::cout << \"integrate() : singular jacobian at iteration \" << this->iter << std::endl;")?;
    }
    writeln!(w, "return FAILURE;")?;
    w.close("}")
}

fn emit_initial_matrix(w: &mut SourceWriter, user_code: Option<&str>) -> fmt::Result {
    match user_code {
        Some(code) => {
            w.open("{")?;
            w.code(code)?;
            w.close("}")
        }
        None => {
            writeln!(w, "std::fill(this->jacobian.begin(), this->jacobian.end(), real(0));")?;
            writeln!(w, "for(unsigned short idx = 0; idx != N; ++idx){{ this->jacobian(idx, idx) = real(1); }}")
        }
    }
}

/// Newton-Raphson with an analytical Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonRaphson;

impl SolverStrategy for NewtonRaphson {
    fn name(&self) -> &'static str {
        "NewtonRaphson"
    }

    fn capabilities(&self) -> SolverCapabilities {
        SolverCapabilities {
            uses_jacobian: true,
            requires_jacobian_reset_to_identity: true,
            ..SolverCapabilities::default()
        }
    }

    fn emit_correction(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        emit_lu_solve(w, ctx, "this->jacobian")
    }
}

/// Newton-Raphson with a Jacobian computed by central finite differences.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonRaphsonNumericalJacobian;

impl SolverStrategy for NewtonRaphsonNumericalJacobian {
    fn name(&self) -> &'static str {
        "NewtonRaphson_NumericalJacobian"
    }

    fn capabilities(&self) -> SolverCapabilities {
        SolverCapabilities {
            uses_jacobian: true,
            requires_numerical_jacobian: true,
            ..SolverCapabilities::default()
        }
    }

    fn emit_correction(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        emit_lu_solve(w, ctx, "this->jacobian")
    }
}

/// Broyden's method, with rank-one updates of the Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broyden;

impl SolverStrategy for Broyden {
    fn name(&self) -> &'static str {
        "Broyden"
    }

    fn capabilities(&self) -> SolverCapabilities {
        SolverCapabilities {
            uses_jacobian: true,
            allows_jacobian_initialisation: true,
            ..SolverCapabilities::default()
        }
    }

    fn emit_members(&self, w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        writeln!(w, "tmatrix<N, N, real> jacobian2;")?;
        writeln!(w, "tvector<N, real> fzeros2;")?;
        writeln!(w, "tvector<N, real> Dzeros;")
    }

    fn emit_initialisation(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        emit_initial_matrix(w, ctx.initialize_jacobian)
    }

    fn emit_correction(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        w.open("if(this->iter > 1){")?;
        writeln!(w, "const tvector<N, real> Dfzeros = (this->fzeros) - (this->fzeros2);")?;
        writeln!(w, "const real broyden_inv = (this->Dzeros) | (this->Dzeros);")?;
        w.open("if(broyden_inv > 100 * std::numeric_limits<real>::epsilon()){")?;
        writeln!(
            w,
            "this->jacobian += ((Dfzeros - (this->jacobian) * (this->Dzeros)) ^ (this->Dzeros)) / broyden_inv;"
        )?;
        w.close("}")?;
        w.close("}")?;
        writeln!(w, "this->fzeros2 = this->fzeros;")?;
        writeln!(w, "this->jacobian2 = this->jacobian;")?;
        emit_lu_solve(w, ctx, "this->jacobian2")
    }

    fn factorised_matrix(&self) -> Option<&'static str> {
        Some("this->jacobian")
    }

    fn emit_after_update(&self, w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        writeln!(w, "this->Dzeros = -(this->fzeros);")
    }
}

/// Broyden's second method, with rank-one updates of the inverse Jacobian.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broyden2;

impl SolverStrategy for Broyden2 {
    fn name(&self) -> &'static str {
        "Broyden2"
    }

    fn capabilities(&self) -> SolverCapabilities {
        SolverCapabilities {
            uses_jacobian_invert: true,
            allows_jacobian_invert_initialisation: true,
            ..SolverCapabilities::default()
        }
    }

    fn emit_members(&self, w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        writeln!(w, "tvector<N, real> fzeros2;")?;
        writeln!(w, "tvector<N, real> Dzeros;")
    }

    fn emit_initialisation(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        emit_initial_matrix(w, ctx.initialize_jacobian_invert)
    }

    fn emit_correction(&self, w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        w.open("if(this->iter > 1){")?;
        writeln!(w, "const tvector<N, real> Dfzeros = (this->fzeros) - (this->fzeros2);")?;
        writeln!(w, "const tvector<N, real> jacobian_Dfzeros = (this->jacobian) * Dfzeros;")?;
        writeln!(w, "const real broyden_inv = (this->Dzeros) | jacobian_Dfzeros;")?;
        w.open("if(std::abs(broyden_inv) > 100 * std::numeric_limits<real>::epsilon()){")?;
        writeln!(
            w,
            "this->jacobian += ((this->Dzeros - jacobian_Dfzeros) ^ ((this->Dzeros) * (this->jacobian))) / broyden_inv;"
        )?;
        w.close("}")?;
        w.close("}")?;
        writeln!(w, "this->fzeros2 = this->fzeros;")?;
        writeln!(w, "this->fzeros = (this->jacobian) * (this->fzeros);")
    }

    fn emit_after_update(&self, w: &mut SourceWriter, _ctx: &SolverEmission) -> fmt::Result {
        writeln!(w, "this->Dzeros = -(this->fzeros);")
    }
}

/// Powell's dog-leg step on top of a strategy computing a Newton-type correction.
///
/// The correction of the inner strategy is kept if it lies inside the trust region of radius
/// `N * powell_dogleg_trust_region_size`. Otherwise the step goes from the Cauchy point towards
/// the correction up to the boundary of the region, or along the steepest descent direction if
/// the Cauchy point itself lies outside.
#[derive(Debug, Clone, Copy)]
pub struct PowellDogLeg<S> {
    name: &'static str,
    inner: S,
}

impl<S: SolverStrategy> PowellDogLeg<S> {
    pub fn new(name: &'static str, inner: S) -> Self {
        Self { name, inner }
    }
}

/// Replaces the Newton correction held in `fzeros` by the dog-leg step for the system
/// `jacobian * x = residual`.
fn emit_dog_leg_step(w: &mut SourceWriter, ctx: &SolverEmission, jacobian: &str, residual: &str) -> fmt::Result {
    writeln!(
        w,
        "const real pdl_radius = real({}) * (this->powell_dogleg_trust_region_size);",
        ctx.n
    )?;
    w.open("if(norm(this->fzeros) >= pdl_radius){")?;
    w.comment("steepest descent direction")?;
    writeln!(w, "tvector<N, real> pdl_g;")?;
    writeln!(w, "tvector<N, real> pdl_g2;")?;
    w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
    writeln!(w, "pdl_g(idx) = real(0);")?;
    w.open("for(unsigned short idx2 = 0; idx2 != N; ++idx2){")?;
    writeln!(w, "pdl_g(idx) += ({}(idx2, idx)) * ({}(idx2));", jacobian, residual)?;
    w.close("}")?;
    w.close("}")?;
    w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
    writeln!(w, "pdl_g2(idx) = real(0);")?;
    w.open("for(unsigned short idx2 = 0; idx2 != N; ++idx2){")?;
    writeln!(w, "pdl_g2(idx) += ({}(idx, idx2)) * pdl_g(idx2);", jacobian)?;
    w.close("}")?;
    w.close("}")?;
    w.comment("Cauchy point")?;
    writeln!(w, "pdl_g *= (pdl_g | pdl_g) / (pdl_g2 | pdl_g2);")?;
    w.open("if(norm(pdl_g) < pdl_radius){")?;
    writeln!(w, "const real pdl_0 = pdl_radius * pdl_radius;")?;
    writeln!(w, "const real pdl_1 = (pdl_g | pdl_g);")?;
    writeln!(w, "const real pdl_2 = ((this->fzeros) | pdl_g);")?;
    writeln!(w, "const real pdl_3 = ((this->fzeros) | (this->fzeros));")?;
    writeln!(
        w,
        "const real pdl_alpha = (pdl_0 - pdl_1) / ((pdl_2 - pdl_1) + std::sqrt(std::max((pdl_2 - pdl_0) * (pdl_2 - pdl_0) + (pdl_3 - pdl_0) * (pdl_0 - pdl_1), real(0))));"
    )?;
    writeln!(w, "pdl_g = pdl_alpha * (this->fzeros) + (1 - pdl_alpha) * pdl_g;")?;
    w.close("}")?;
    w.open("else{")?;
    writeln!(w, "pdl_g *= pdl_radius / norm(pdl_g);")?;
    w.close("}")?;
    writeln!(w, "this->fzeros = pdl_g;")?;
    w.close("}")
}

impl<S: SolverStrategy> SolverStrategy for PowellDogLeg<S> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capabilities(&self) -> SolverCapabilities {
        self.inner.capabilities()
    }

    fn emit_members(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        self.inner.emit_members(w, ctx)?;
        writeln!(
            w,
            "real powell_dogleg_trust_region_size = {};",
            real_literal(ctx.trust_region_size)
        )
    }

    fn emit_initialisation(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        self.inner.emit_initialisation(w, ctx)
    }

    fn emit_correction(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        writeln!(w, "const tvector<N, real> pdl_fzeros(this->fzeros);")?;
        let jacobian = match self.inner.factorised_matrix() {
            Some(matrix) => matrix,
            None => {
                writeln!(w, "const tmatrix<N, N, real> pdl_jacobian(this->jacobian);")?;
                "pdl_jacobian"
            }
        };
        self.inner.emit_correction(w, ctx)?;
        emit_dog_leg_step(w, ctx, jacobian, "pdl_fzeros")
    }

    fn factorised_matrix(&self) -> Option<&'static str> {
        self.inner.factorised_matrix()
    }

    fn emit_after_update(&self, w: &mut SourceWriter, ctx: &SolverEmission) -> fmt::Result {
        self.inner.emit_after_update(w, ctx)
    }
}

/// Constructs a fresh strategy for a compilation.
pub type SolverFactory = fn() -> Box<dyn SolverStrategy>;

/// Maps algorithm names to solver strategies.
#[derive(Debug, Clone)]
pub struct SolverRegistry {
    factories: FxHashMap<String, SolverFactory>,
}

impl Default for SolverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("NewtonRaphson", || Box::new(NewtonRaphson));
        registry.register("NewtonRaphson_NumericalJacobian", || Box::new(NewtonRaphsonNumericalJacobian));
        registry.register("Broyden", || Box::new(Broyden));
        registry.register("Broyden2", || Box::new(Broyden2));
        registry.register("PowellDogLeg_NewtonRaphson", || {
            Box::new(PowellDogLeg::new("PowellDogLeg_NewtonRaphson", NewtonRaphson))
        });
        registry.register("PowellDogLeg_NewtonRaphson_NumericalJacobian", || {
            Box::new(PowellDogLeg::new(
                "PowellDogLeg_NewtonRaphson_NumericalJacobian",
                NewtonRaphsonNumericalJacobian,
            ))
        });
        registry.register("PowellDogLeg_Broyden", || {
            Box::new(PowellDogLeg::new("PowellDogLeg_Broyden", Broyden))
        });
        registry
    }
}

impl SolverRegistry {
    pub fn empty() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Registers a strategy, replacing any strategy of the same name.
    pub fn register(&mut self, name: impl Into<String>, factory: SolverFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn SolverStrategy>> {
        self.factories.get(name).map(|factory| factory())
    }

    /// Registered algorithm names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
