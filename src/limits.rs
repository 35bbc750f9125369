//! Limits on the Newton corrections applied per iteration.
use crate::emit::{real_literal, SourceWriter};
use crate::error::DeclarationErrorKind;
use crate::layout::UnknownVectorLayout;
use crate::normalisation::{NormalizationRegistry, Side};
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::Write;

/// Optional bounds on the magnitude of each component of a correction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncrementLimits {
    global: Option<f64>,
    per_variable: FxHashMap<String, f64>,
}

fn check_limit(variable: Option<&str>, value: f64) -> Result<(), DeclarationErrorKind> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(DeclarationErrorKind::InvalidIncrementLimit {
            variable: variable.map(str::to_string),
            value,
        })
    }
}

impl IncrementLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&mut self, value: f64) -> Result<(), DeclarationErrorKind> {
        check_limit(None, value)?;
        if self.global.is_some() {
            return Err(DeclarationErrorKind::IncrementLimitRedefined(None));
        }
        self.global = Some(value);
        Ok(())
    }

    pub fn set(&mut self, variable: &str, value: f64) -> Result<(), DeclarationErrorKind> {
        check_limit(Some(variable), value)?;
        if self.per_variable.contains_key(variable) {
            return Err(DeclarationErrorKind::IncrementLimitRedefined(Some(variable.to_string())));
        }
        self.per_variable.insert(variable.to_string(), value);
        Ok(())
    }

    pub fn global(&self) -> Option<f64> {
        self.global
    }

    pub fn limit_for(&self, variable: &str) -> Option<f64> {
        self.per_variable.get(variable).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.per_variable.is_empty()
    }

    /// Member holding the global limit, if any.
    pub fn emit_members(&self, w: &mut SourceWriter) -> fmt::Result {
        if let Some(limit) = self.global {
            writeln!(w, "real maximum_increment_value_per_iteration = {};", real_literal(limit))?;
        }
        Ok(())
    }

    /// Clamps the correction stored in `fzeros`.
    ///
    /// The correction acts on normalised unknowns, so a per-variable limit `l` of a variable with
    /// unknown-side factor `s` becomes `l/(s)`. Per-variable limits are applied in layout order,
    /// then the global limit.
    pub fn emit_clamp(
        &self,
        w: &mut SourceWriter,
        layout: &UnknownVectorLayout,
        normalisation: &NormalizationRegistry,
    ) -> fmt::Result {
        for entry in layout.entries() {
            let limit = match self.limit_for(entry.name()) {
                Some(limit) => real_literal(limit),
                None => continue,
            };
            let bound = match normalisation.factor_for(entry.name(), Side::Unknown) {
                Some(s) => format!("({})/({})", limit, s),
                None => limit,
            };
            w.open(&format!(
                "for(unsigned short idx = {0}_offset; idx != {0}_offset + {1}; ++idx){{",
                entry.name(),
                entry.block_size
            ))?;
            writeln!(
                w,
                "this->fzeros(idx) = std::max(std::min(this->fzeros(idx), {0}), -({0}));",
                bound
            )?;
            w.close("}")?;
        }
        if self.global.is_some() {
            w.open("for(unsigned short idx = 0; idx != N; ++idx){")?;
            writeln!(
                w,
                "this->fzeros(idx) = std::max(std::min(this->fzeros(idx), this->maximum_increment_value_per_iteration), -(this->maximum_increment_value_per_iteration));"
            )?;
            w.close("}")?;
        }
        Ok(())
    }
}
