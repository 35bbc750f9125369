//! Integration variables and the names generated for them.
use crate::error::DeclarationErrorKind;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Tensorial category of an integration variable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorRank {
    Scalar,
    Vector,
    SymmetricTensor,
}

impl TensorRank {
    /// Number of components of one element of this rank in the given dimension.
    pub fn components(&self, dim: SpaceDimension) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector => dim.get(),
            Self::SymmetricTensor => dim.stensor_components(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar)
    }

    /// Name of the type representing one element of this rank in generated code.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar => "real",
            Self::Vector => "TVector",
            Self::SymmetricTensor => "Stensor",
        }
    }
}

/// A supported space dimension, one of 1, 2 or 3.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SpaceDimension(usize);

impl SpaceDimension {
    pub fn get(&self) -> usize {
        self.0
    }

    /// Number of independent components of a symmetric tensor.
    pub fn stensor_components(&self) -> usize {
        match self.0 {
            1 => 3,
            2 => 4,
            _ => 6,
        }
    }
}

impl TryFrom<usize> for SpaceDimension {
    type Error = DeclarationErrorKind;

    fn try_from(dim: usize) -> Result<Self, Self::Error> {
        match dim {
            1 | 2 | 3 => Ok(Self(dim)),
            _ => Err(DeclarationErrorKind::UnsupportedSpaceDimension(dim)),
        }
    }
}

impl Display for SpaceDimension {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A per-time-step unknown of the implicit scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationVariable {
    name: String,
    rank: TensorRank,
    array_size: u16,
}

impl IntegrationVariable {
    /// Creates a variable without validating it. Use
    /// [`VariableCatalogue::declare`](crate::catalogue::VariableCatalogue::declare) to register checked variables.
    pub fn new(name: impl Into<String>, rank: TensorRank, array_size: u16) -> Self {
        Self {
            name: name.into(),
            rank,
            array_size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self) -> TensorRank {
        self.rank
    }

    pub fn array_size(&self) -> u16 {
        self.array_size
    }

    pub fn is_array(&self) -> bool {
        self.array_size > 1
    }

    /// Components of a single array element.
    pub fn components(&self, dim: SpaceDimension) -> usize {
        self.rank.components(dim)
    }

    pub fn block_size(&self, dim: SpaceDimension) -> usize {
        self.components(dim) * usize::from(self.array_size)
    }

    /// Name of the increment, `d<v>`.
    pub fn increment_name(&self) -> String {
        increment_name(&self.name)
    }

    /// Name of the residual, `f<v>`.
    pub fn residual_name(&self) -> String {
        residual_name(&self.name)
    }
}

pub fn increment_name(variable: &str) -> String {
    format!("d{}", variable)
}

pub fn residual_name(variable: &str) -> String {
    format!("f{}", variable)
}

/// Name of the Jacobian block of residual `r` with respect to unknown `u`, `df<r>_dd<u>`.
pub fn jacobian_block_name(residual: &str, unknown: &str) -> String {
    format!("df{}_dd{}", residual, unknown)
}

/// Splits a name of the form `df<a>_dd<b>` into `(a, b)`, where both parts must be accepted
/// by `is_variable`.
///
/// Variable names may themselves contain `_dd`, so every split point is tried.
pub fn parse_jacobian_block_name<'a>(name: &'a str, is_variable: impl Fn(&str) -> bool) -> Option<(&'a str, &'a str)> {
    let rest = name.strip_prefix("df")?;
    rest.match_indices("_dd")
        .map(|(i, _)| (&rest[..i], &rest[i + 3..]))
        .find(|(a, b)| !a.is_empty() && !b.is_empty() && is_variable(a) && is_variable(b))
}

/// Whether `name` is a valid identifier in generated code.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}
