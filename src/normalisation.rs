//! Normalisation factors of unknowns and residuals.
//!
//! An unknown-side factor `s` for `v` means that the solver works on `d<v> / s`, so that the
//! physical increment is `s * d<v>`. A residual-side factor `r` means that the residual `f<v>` is
//! divided by `r`. Consequently the Jacobian block `df<a>_dd<b>` is multiplied by `s_b / r_a`, and
//! the block `(a, b)` of the inverse Jacobian is multiplied by `s_a / r_b` to recover physical units.
use crate::addressing::{AddressingPlan, ArrayIndexing};
use crate::error::{CompileError, DeclarationErrorKind, InternalError};
use crate::layout::UnknownVectorLayout;
use crate::variable::{increment_name, residual_name};
use implicit_optimize::normalisation::Normalisation;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Residual,
    Unknown,
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Residual => write!(f, "residual"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Optional scale factors attached to `(variable, side)` pairs.
///
/// Factors are symbolic expressions of the generated code. The registry is frozen once emission
/// starts; from then on it can only be read.
#[derive(Debug, Clone, Default)]
pub struct NormalizationRegistry {
    factors: FxHashMap<(String, Side), String>,
    frozen: bool,
}

impl NormalizationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_factor(&mut self, variable: &str, side: Side, expr: impl Into<String>) -> Result<(), CompileError> {
        if self.frozen {
            return Err(InternalError::RegistryFrozen.into());
        }
        let key = (variable.to_string(), side);
        if self.factors.contains_key(&key) {
            return Err(DeclarationErrorKind::NormalisationFactorRedefined {
                variable: variable.to_string(),
                side,
            }
            .into());
        }
        self.factors.insert(key, expr.into());
        Ok(())
    }

    pub fn factor_for(&self, variable: &str, side: Side) -> Option<&str> {
        self.factors
            .get(&(variable.to_string(), side))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Whether `variable` has a factor on either side.
    pub fn is_normalised(&self, variable: &str) -> bool {
        self.factor_for(variable, Side::Unknown).is_some() || self.factor_for(variable, Side::Residual).is_some()
    }

    /// Variables with at least one factor, sorted by name.
    pub fn normalised_variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factors.keys().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Starts an emission pass, which guards against undoing a normalisation twice.
    pub fn begin_pass(&self) -> NormalisationPass<'_> {
        NormalisationPass {
            registry: self,
            undone: FxHashSet::default(),
        }
    }

    /// Physical value of the increment of `variable`, as an expression of generated code.
    pub fn increment_expression(&self, variable: &str) -> String {
        match self.factor_for(variable, Side::Unknown) {
            Some(s) => format!("(({})*(this->{}))", s, increment_name(variable)),
            None => format!("(this->{})", increment_name(variable)),
        }
    }

    /// Scales `f<v>`, initialised from the normalised unknowns, to the physical increment.
    /// Emitted before the user code computing the residual.
    pub fn residual_prologue(&self, variable: &str) -> Option<String> {
        self.factor_for(variable, Side::Unknown)
            .map(|s| format!("{} *= {};", residual_name(variable), s))
    }

    /// Divides `f<v>` by the residual factor. Emitted once, after the user code.
    pub fn residual_epilogue(&self, variable: &str) -> Option<String> {
        self.factor_for(variable, Side::Residual)
            .map(|r| format!("{} *= real(1)/({});", residual_name(variable), r))
    }

    /// Scale of the Jacobian block of `residual` with respect to `unknown`: the unknown-side
    /// factor first, then the reciprocal of the residual-side factor.
    pub fn jacobian_scaling(&self, residual: &str, unknown: &str) -> Option<String> {
        ratio(
            self.factor_for(unknown, Side::Unknown),
            self.factor_for(residual, Side::Residual),
        )
    }

    /// Scale mapping the block `(variable, with_respect_to)` of the normalised inverse Jacobian
    /// back to physical units.
    pub fn inverse_block_scaling(&self, variable: &str, with_respect_to: &str) -> Option<String> {
        ratio(
            self.factor_for(variable, Side::Unknown),
            self.factor_for(with_respect_to, Side::Residual),
        )
    }

    /// The factors as numbers over the unknown vector of `layout`.
    ///
    /// Returns `None` if some factor is an expression rather than a number.
    pub fn to_numeric(&self, layout: &UnknownVectorLayout) -> Option<Normalisation<f64>> {
        let mut normalisation = Normalisation::identity(layout.total_size());
        for entry in layout.entries() {
            if let Some(s) = self.factor_for(entry.name(), Side::Unknown) {
                normalisation = normalisation.with_unknown_factor(entry.range(), s.parse().ok()?);
            }
            if let Some(r) = self.factor_for(entry.name(), Side::Residual) {
                normalisation = normalisation.with_residual_factor(entry.range(), r.parse().ok()?);
            }
        }
        Some(normalisation)
    }

    /// Statements scaling the Jacobian block addressed by `plan`, if any factor applies.
    pub fn jacobian_scaling_statement(&self, plan: &AddressingPlan) -> Option<String> {
        let scale = self.jacobian_scaling(&plan.residual, &plan.unknown)?;
        let statement = match plan.indexing {
            ArrayIndexing::None => format!("{} *= {};", plan.name, scale),
            ArrayIndexing::Residual { size } | ArrayIndexing::Unknown { size } => format!(
                "for(unsigned short idx = 0; idx != {}; ++idx){{ {}(idx) *= {}; }}",
                size, plan.name, scale
            ),
            ArrayIndexing::Both { residual, unknown } => format!(
                "for(unsigned short idx = 0; idx != {}; ++idx){{ for(unsigned short idx2 = 0; idx2 != {}; ++idx2){{ {}(idx, idx2) *= {}; }} }}",
                residual, unknown, plan.name, scale
            ),
        };
        Some(statement)
    }
}

fn ratio(numerator: Option<&str>, denominator: Option<&str>) -> Option<String> {
    match (numerator, denominator) {
        (Some(s), Some(r)) => Some(format!("({})/({})", s, r)),
        (Some(s), None) => Some(format!("({})", s)),
        (None, Some(r)) => Some(format!("real(1)/({})", r)),
        (None, None) => None,
    }
}

/// Tracks which normalisations were undone during one emission pass.
#[derive(Debug)]
pub struct NormalisationPass<'a> {
    registry: &'a NormalizationRegistry,
    undone: FxHashSet<String>,
}

impl<'a> NormalisationPass<'a> {
    fn apply_once(&mut self, target: &str) -> Result<(), InternalError> {
        if !self.undone.insert(target.to_string()) {
            return Err(InternalError::NormalisationAppliedTwice(target.to_string()));
        }
        Ok(())
    }

    /// Statement mapping the converged increment of `variable` back to physical units.
    ///
    /// Returns `Ok(None)` if the variable has no unknown-side factor. Requesting the same
    /// variable twice in one pass is an internal error.
    pub fn increment_undo(&mut self, variable: &str) -> Result<Option<String>, InternalError> {
        match self.registry.factor_for(variable, Side::Unknown) {
            Some(s) => {
                self.apply_once(&increment_name(variable))?;
                Ok(Some(format!("this->{} *= {};", increment_name(variable), s)))
            }
            None => Ok(None),
        }
    }

    /// Statement mapping the extracted inverse block `target` of `(variable, with_respect_to)`
    /// back to physical units.
    pub fn inverse_block_undo(
        &mut self,
        target: &str,
        variable: &str,
        with_respect_to: &str,
    ) -> Result<Option<String>, InternalError> {
        match self.registry.inverse_block_scaling(variable, with_respect_to) {
            Some(scale) => {
                self.apply_once(target)?;
                Ok(Some(format!("{} *= {};", target, scale)))
            }
            None => Ok(None),
        }
    }
}
