//! Convergence parameters and the emission of the integration loop.
use crate::emit::{real_literal, SourceWriter};
use crate::error::{CompileError, DeclarationErrorKind};
use crate::layout::UnknownVectorLayout;
use crate::limits::IncrementLimits;
use crate::normalisation::NormalizationRegistry;
use crate::solver::{SolverEmission, SolverStrategy};
use crate::value::{FromValue, Value};
use serde::Serialize;
use std::fmt;
use std::fmt::Write;

pub const DEFAULT_EPSILON: f64 = 1e-8;
pub const DEFAULT_THETA: f64 = 0.5;
pub const DEFAULT_ITER_MAX: u16 = 100;
pub const DEFAULT_TRUST_REGION_SIZE: f64 = 1e-4;
pub const DEFAULT_RELAXATION_TRIGGER: u16 = 10;
pub const DEFAULT_RELAXATION_COEFFICIENT: f64 = 0.5;

/// Parameters of the implicit scheme which end up as members of the generated class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceParameters {
    epsilon: f64,
    theta: f64,
    iter_max: u16,
    numerical_jacobian_epsilon: Option<f64>,
    compare_to_numerical_jacobian: bool,
    jacobian_comparison_criterion: Option<f64>,
    trust_region_size: f64,
    use_relaxation: bool,
    relaxation_trigger: u16,
    relaxation_coefficient: f64,
}

impl Default for ConvergenceParameters {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            theta: DEFAULT_THETA,
            iter_max: DEFAULT_ITER_MAX,
            numerical_jacobian_epsilon: None,
            compare_to_numerical_jacobian: false,
            jacobian_comparison_criterion: None,
            trust_region_size: DEFAULT_TRUST_REGION_SIZE,
            use_relaxation: false,
            relaxation_trigger: DEFAULT_RELAXATION_TRIGGER,
            relaxation_coefficient: DEFAULT_RELAXATION_COEFFICIENT,
        }
    }
}

fn invalid(parameter: &str, reason: impl Into<String>) -> DeclarationErrorKind {
    DeclarationErrorKind::InvalidParameter {
        parameter: parameter.to_string(),
        reason: reason.into(),
    }
}

fn non_negative(parameter: &str, value: f64) -> Result<f64, DeclarationErrorKind> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(parameter, format!("expected a non-negative value, got {}", value)))
    }
}

fn typed<T: FromValue>(parameter: &str, value: &Value) -> Result<T, DeclarationErrorKind> {
    value.get().ok_or_else(|| DeclarationErrorKind::TypeMismatch {
        parameter: parameter.to_string(),
        expected: T::TYPE_NAME,
        found: value.type_name(),
    })
}

impl ConvergenceParameters {
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn iter_max(&self) -> u16 {
        self.iter_max
    }

    /// Perturbation of the numerical Jacobian, a tenth of `epsilon` unless set explicitly.
    pub fn numerical_jacobian_epsilon(&self) -> f64 {
        self.numerical_jacobian_epsilon
            .unwrap_or(self.epsilon / 10.0)
    }

    pub fn compare_to_numerical_jacobian(&self) -> bool {
        self.compare_to_numerical_jacobian
    }

    /// Criterion of the comparison to the numerical Jacobian, `None` if no comparison was
    /// requested. Defaults to `epsilon`.
    pub fn jacobian_comparison_criterion(&self) -> Option<f64> {
        if self.compare_to_numerical_jacobian {
            Some(self.jacobian_comparison_criterion.unwrap_or(self.epsilon))
        } else {
            None
        }
    }

    /// Size of the trust region of the dog-leg algorithms, per component of the unknown vector.
    pub fn trust_region_size(&self) -> f64 {
        self.trust_region_size
    }

    pub fn use_relaxation(&self) -> bool {
        self.use_relaxation
    }

    /// First iteration at which the update of the unknowns is relaxed.
    pub fn relaxation_trigger(&self) -> u16 {
        self.relaxation_trigger
    }

    /// Fraction of the update kept once relaxation has been triggered.
    pub fn relaxation_coefficient(&self) -> f64 {
        self.relaxation_coefficient
    }

    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<(), DeclarationErrorKind> {
        self.epsilon = non_negative("epsilon", epsilon)?;
        Ok(())
    }

    pub fn set_theta(&mut self, theta: f64) -> Result<(), DeclarationErrorKind> {
        if !(0.0..=1.0).contains(&theta) {
            return Err(invalid("theta", format!("expected a value in [0, 1], got {}", theta)));
        }
        self.theta = theta;
        Ok(())
    }

    pub fn set_iter_max(&mut self, iter_max: u16) -> Result<(), DeclarationErrorKind> {
        if iter_max == 0 {
            return Err(invalid("iterMax", "at least one iteration is required"));
        }
        self.iter_max = iter_max;
        Ok(())
    }

    pub fn set_numerical_jacobian_epsilon(&mut self, epsilon: f64) -> Result<(), DeclarationErrorKind> {
        self.numerical_jacobian_epsilon = Some(non_negative("numerical_jacobian_epsilon", epsilon)?);
        Ok(())
    }

    pub fn set_compare_to_numerical_jacobian(&mut self, compare: bool) {
        self.compare_to_numerical_jacobian = compare;
    }

    /// Fails unless comparison to the numerical Jacobian has been requested before.
    pub fn set_jacobian_comparison_criterion(&mut self, criterion: f64) -> Result<(), DeclarationErrorKind> {
        if !self.compare_to_numerical_jacobian {
            return Err(DeclarationErrorKind::ComparisonNotRequested);
        }
        self.jacobian_comparison_criterion = Some(non_negative("jacobianComparisonCriterion", criterion)?);
        Ok(())
    }

    pub fn set_trust_region_size(&mut self, size: f64) -> Result<(), DeclarationErrorKind> {
        self.trust_region_size = non_negative("powell_dogleg_trust_region_size", size)?;
        Ok(())
    }

    pub fn set_use_relaxation(&mut self, use_relaxation: bool) {
        self.use_relaxation = use_relaxation;
    }

    pub fn set_relaxation_trigger(&mut self, trigger: u16) {
        self.relaxation_trigger = trigger;
    }

    /// Fails unless relaxation has been enabled before.
    pub fn set_relaxation_coefficient(&mut self, coefficient: f64) -> Result<(), DeclarationErrorKind> {
        if !self.use_relaxation {
            return Err(DeclarationErrorKind::RelaxationNotEnabled);
        }
        self.relaxation_coefficient = non_negative("relaxationCoefficient", coefficient)?;
        Ok(())
    }

    /// Checks the parameters against each other once all declarations have been applied.
    pub fn validate(&self) -> Result<(), DeclarationErrorKind> {
        if self.use_relaxation && u32::from(self.relaxation_trigger) + 1 >= u32::from(self.iter_max) {
            return Err(invalid(
                "relaxationTrigger",
                format!(
                    "relaxation can never take place ({} >= iterMax - 1 with iterMax = {})",
                    self.relaxation_trigger, self.iter_max
                ),
            ));
        }
        Ok(())
    }

    /// Sets a parameter by its name in the behaviour description.
    pub fn set(&mut self, name: &str, value: &Value) -> Result<(), DeclarationErrorKind> {
        match name {
            "epsilon" => self.set_epsilon(typed(name, value)?),
            "theta" => self.set_theta(typed(name, value)?),
            "iterMax" => self.set_iter_max(typed(name, value)?),
            "numerical_jacobian_epsilon" => self.set_numerical_jacobian_epsilon(typed(name, value)?),
            "compareToNumericalJacobian" => {
                self.set_compare_to_numerical_jacobian(typed(name, value)?);
                Ok(())
            }
            "jacobianComparisonCriterion" => self.set_jacobian_comparison_criterion(typed(name, value)?),
            "powell_dogleg_trust_region_size" => self.set_trust_region_size(typed(name, value)?),
            "useRelaxation" => {
                self.set_use_relaxation(typed(name, value)?);
                Ok(())
            }
            "relaxationTrigger" => {
                self.set_relaxation_trigger(typed(name, value)?);
                Ok(())
            }
            "relaxationCoefficient" => self.set_relaxation_coefficient(typed(name, value)?),
            _ => Err(DeclarationErrorKind::UnknownParameter(name.to_string())),
        }
    }

    /// Members of the generated class holding the parameters.
    pub fn emit_members(&self, w: &mut SourceWriter) -> std::fmt::Result {
        writeln!(w, "real epsilon = {};", real_literal(self.epsilon))?;
        writeln!(w, "real theta = {};", real_literal(self.theta))?;
        writeln!(w, "unsigned short iterMax = {};", self.iter_max)?;
        writeln!(
            w,
            "real numerical_jacobian_epsilon = {};",
            real_literal(self.numerical_jacobian_epsilon())
        )?;
        if let Some(criterion) = self.jacobian_comparison_criterion() {
            writeln!(w, "real jacobianComparisonCriterion = {};", real_literal(criterion))?;
        }
        if self.use_relaxation {
            writeln!(w, "unsigned short relaxationTrigger = {};", self.relaxation_trigger)?;
            writeln!(w, "real relaxationCoefficient = {};", real_literal(self.relaxation_coefficient))?;
        }
        Ok(())
    }
}

/// Emits `integrate()`, the loop driving the solver until convergence.
///
/// The loop runs at most `iterMax` iterations. An iteration first evaluates the residual, so a
/// linear system converges on the second iteration. Optional fragments (the comparison to the
/// numerical Jacobian and the call of the tangent extraction) are passed in already rendered.
#[derive(Debug)]
pub struct ConvergenceController<'a> {
    pub layout: &'a UnknownVectorLayout,
    pub solver: &'a dyn SolverStrategy,
    pub solver_emission: SolverEmission<'a>,
    pub limits: &'a IncrementLimits,
    pub normalisation: &'a NormalizationRegistry,
    pub debug: bool,
    pub comparison: Option<&'a str>,
    pub has_predictor: bool,
    pub has_final_stress: bool,
    /// Relax the update of the unknowns once `relaxationTrigger` iterations have been made.
    pub relaxation: bool,
    pub tangent_call: Option<&'a str>,
}

fn emit_numerical_jacobian(w: &mut SourceWriter) -> fmt::Result {
    w.open("if(!this->computeNumericalJacobian(this->jacobian)){")?;
    writeln!(w, "return FAILURE;")?;
    w.close("}")
}

impl<'a> ConvergenceController<'a> {
    pub fn emit(&self, w: &mut SourceWriter) -> Result<(), CompileError> {
        let ctx = &self.solver_emission;
        let capabilities = self.solver.capabilities();

        w.open("bool integrate(){")?;
        if self.has_predictor {
            writeln!(w, "this->computePredictor();")?;
        }
        self.solver.emit_initialisation(w, ctx)?;
        writeln!(w, "bool converged = false;")?;
        writeln!(w, "this->iter = 0;")?;
        w.open("while((!converged) && (this->iter < this->iterMax)){")?;
        writeln!(w, "++(this->iter);")?;

        w.open("if(!this->computeFdF()){")?;
        w.open("if(this->iter == 1){")?;
        if self.debug {
            writeln!(w, "std::cout << \"integrate() : computeFdF failed on the first iteration\" << std::endl;")?;
        }
        writeln!(w, "return FAILURE;")?;
        w.close("}")?;
        w.comment("go half way back to the last successful iterate")?;
        writeln!(w, "this->zeros = real(0.5) * (this->zeros_1 + this->zeros);")?;
        writeln!(w, "continue;")?;
        w.close("}")?;
        writeln!(w, "this->zeros_1 = this->zeros;")?;

        if let Some(comparison) = self.comparison {
            w.code(comparison)?;
        }

        writeln!(w, "const real error = norm(this->fzeros) / (real(N));")?;
        if self.debug {
            writeln!(
                w,
                "std::cout << \"integrate() : iteration \" << this->iter << \" : \" << error << std::endl;"
            )?;
        }
        writeln!(w, "converged = error < this->epsilon;")?;

        // The correction factorises the jacobian in place, so the tangent operator needs it
        // recomputed at the converged point
        let jacobian_at_convergence = capabilities.requires_numerical_jacobian && self.tangent_call.is_some();
        if jacobian_at_convergence {
            emit_numerical_jacobian(w)?;
        }
        w.open("if(!converged){")?;
        if capabilities.requires_numerical_jacobian && !jacobian_at_convergence {
            emit_numerical_jacobian(w)?;
        }
        self.solver.emit_correction(w, ctx)?;
        self.limits.emit_clamp(w, self.layout, self.normalisation)?;
        writeln!(w, "this->zeros -= this->fzeros;")?;
        self.solver.emit_after_update(w, ctx)?;
        if self.relaxation {
            w.open("if(this->iter >= this->relaxationTrigger){")?;
            writeln!(
                w,
                "this->zeros -= (1 - this->relaxationCoefficient) * (this->zeros - this->zeros_1);"
            )?;
            w.close("}")?;
        }
        w.close("}")?;
        w.close("}")?;

        w.open("if(!converged){")?;
        if self.debug {
            writeln!(
                w,
                "std::cout << \"integrate() : no convergence after \" << this->iter << \" iterations\" << std::endl;"
            )?;
        }
        writeln!(w, "return FAILURE;")?;
        w.close("}")?;

        let mut pass = self.normalisation.begin_pass();
        for entry in self.layout.entries() {
            if let Some(undo) = pass.increment_undo(entry.name())? {
                writeln!(w, "{}", undo)?;
            }
        }
        writeln!(w, "this->updateIntegrationVariables();")?;
        if self.has_final_stress {
            writeln!(w, "this->computeFinalStress();")?;
        }
        if let Some(call) = self.tangent_call {
            w.code(call)?;
        }
        if self.debug {
            writeln!(
                w,
                "std::cout << \"integrate() : convergence after \" << this->iter << \" iterations\" << std::endl;"
            )?;
        }
        writeln!(w, "return SUCCESS;")?;
        w.close("}")?;
        Ok(())
    }
}
