use crate::error::DeclarationErrorKind;
use crate::variable::{
    increment_name, is_identifier, jacobian_block_name, parse_jacobian_block_name, residual_name, IntegrationVariable,
    TensorRank,
};
use rustc_hash::FxHashSet;

/// Identifiers used internally by the generated solver.
pub const RESERVED_NAMES: &[&str] = &[
    "N",
    "epsilon",
    "theta",
    "iterMax",
    "numerical_jacobian_epsilon",
    "maximum_increment_value_per_iteration",
    "jacobianComparisonCriterion",
    "powell_dogleg_trust_region_size",
    "relaxationTrigger",
    "relaxationCoefficient",
    "vect_e",
    "zeros",
    "tzeros",
    "zeros_1",
    "fzeros",
    "tfzeros",
    "tfzeros2",
    "fzeros2",
    "Dzeros",
    "Dfzeros",
    "jacobian",
    "tjacobian",
    "njacobian",
    "jacobian2",
    "jacobian_error",
    "jacobian_permutation",
    "partial_jacobian",
    "t",
    "error",
    "error_1",
    "error_p",
    "idx",
    "idx2",
    "idx3",
    "iter",
    "converged",
    "broyden_inv",
    "TinyMatrixSolve",
    "computeNumericalJacobian",
    "computePartialJacobianInvert",
    "computeFdF",
    "computePredictor",
    "computeStress",
    "computeFinalStress",
    "updateIntegrationVariables",
    "integrate",
];

/// Ordered registry of the integration variables of one modelling hypothesis.
///
/// The declaration order is the order of the variables in the unknown vector and is never changed.
#[derive(Debug, Clone)]
pub struct VariableCatalogue {
    variables: Vec<IntegrationVariable>,
    names: FxHashSet<String>,
    reserved: FxHashSet<String>,
}

impl Default for VariableCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableCatalogue {
    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            names: FxHashSet::default(),
            reserved: RESERVED_NAMES.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Reserves an additional name, e.g. the name of a material property used in generated code.
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.reserved.insert(name.into());
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Registers a new integration variable.
    ///
    /// Besides uniqueness and the reserved set, the names generated for the new variable
    /// (`f<v>`, `d<v>`, `df<a>_dd<b>`) are checked against the names already declared, and
    /// vice versa. The check happens here, before any code referring to these names can be emitted.
    pub fn declare(&mut self, name: &str, rank: TensorRank, array_size: u16) -> Result<(), DeclarationErrorKind> {
        if !is_identifier(name) {
            return Err(DeclarationErrorKind::InvalidName(name.to_string()));
        }
        if array_size == 0 {
            return Err(DeclarationErrorKind::InvalidArraySize { name: name.to_string() });
        }
        if self.reserved.contains(name) {
            return Err(DeclarationErrorKind::ReservedName(name.to_string()));
        }
        if self.names.contains(name) {
            return Err(DeclarationErrorKind::DuplicateName(name.to_string()));
        }
        if let Some(generated) = self.find_collision(name) {
            return Err(DeclarationErrorKind::GeneratedNameCollision {
                name: name.to_string(),
                generated,
            });
        }

        self.names.insert(name.to_string());
        self.variables.push(IntegrationVariable::new(name, rank, array_size));
        Ok(())
    }

    fn find_collision(&self, name: &str) -> Option<String> {
        // The new name is one of the generated names of the declared variables
        let is_declared = |candidate: &str| self.names.contains(candidate);
        if let Some(v) = name.strip_prefix('f').filter(|v| is_declared(v)) {
            return Some(residual_name(v));
        }
        if let Some(v) = name.strip_prefix('d').filter(|v| is_declared(v)) {
            return Some(increment_name(v));
        }
        if let Some((a, b)) = parse_jacobian_block_name(name, is_declared) {
            return Some(jacobian_block_name(a, b));
        }

        // The generated names of the new variable are reserved or already declared
        for generated in [residual_name(name), increment_name(name)] {
            if self.reserved.contains(&generated) || self.names.contains(&generated) {
                return Some(generated);
            }
        }
        let is_known = |candidate: &str| candidate == name || self.names.contains(candidate);
        self.variables
            .iter()
            .filter_map(|v| parse_jacobian_block_name(v.name(), is_known))
            .find(|(a, b)| *a == name || *b == name)
            .map(|(a, b)| jacobian_block_name(a, b))
    }

    pub fn variables(&self) -> &[IntegrationVariable] {
        &self.variables
    }

    pub fn get(&self, name: &str) -> Option<&IntegrationVariable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
