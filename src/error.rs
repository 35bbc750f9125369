//! Errors reported while compiling an implicit scheme.
//!
//! Two families of errors are distinguished. [`DeclarationError`]s are caused by the behaviour
//! description and carry the location of the offending declaration. [`InternalError`]s signal a
//! mismatch between the compiler and its caller. Both abort the compilation of the current
//! modelling hypothesis.
use crate::code_block::CodeBlockId;
use crate::normalisation::Side;
use crate::variable::TensorRank;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// Position of a declaration in the behaviour source.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DeclarationErrorKind {
    InvalidName(String),
    DuplicateName(String),
    ReservedName(String),
    /// The name clashes with a name generated for another variable (`f<v>`, `d<v>` or `df<a>_dd<b>`).
    GeneratedNameCollision {
        name: String,
        generated: String,
    },
    InvalidArraySize {
        name: String,
    },
    UnsupportedSpaceDimension(usize),
    UnknownParameter(String),
    InvalidParameter {
        parameter: String,
        reason: String,
    },
    TypeMismatch {
        parameter: String,
        expected: &'static str,
        found: &'static str,
    },
    UnknownAlgorithm(String),
    AlgorithmAlreadyDefined,
    /// A code block which depends on the algorithm was given before any algorithm.
    UndefinedAlgorithm(CodeBlockId),
    InitialisationNotAllowed {
        algorithm: String,
        block: CodeBlockId,
    },
    ComparisonNotRequested,
    /// A relaxation coefficient was given without enabling relaxation.
    RelaxationNotEnabled,
    UnknownVariable(String),
    InvalidNormalisationFactor {
        variable: String,
        reason: String,
    },
    NormalisationFactorRedefined {
        variable: String,
        side: Side,
    },
    InvalidIncrementLimit {
        variable: Option<String>,
        value: f64,
    },
    IncrementLimitRedefined(Option<String>),
    CodeBlockRedefined(CodeBlockId),
}

impl Display for DeclarationErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "'{}' is not a valid variable name", name),
            Self::DuplicateName(name) => write!(f, "variable '{}' has already been declared", name),
            Self::ReservedName(name) => write!(f, "'{}' is a reserved name", name),
            Self::GeneratedNameCollision { name, generated } => {
                write!(f, "variable '{}' collides with the generated name '{}'", name, generated)
            }
            Self::InvalidArraySize { name } => write!(f, "array size of variable '{}' must be at least one", name),
            Self::UnsupportedSpaceDimension(dim) => {
                write!(f, "unsupported space dimension {} (expected 1, 2 or 3)", dim)
            }
            Self::UnknownParameter(name) => write!(f, "unknown parameter '{}'", name),
            Self::InvalidParameter { parameter, reason } => {
                write!(f, "invalid value for parameter '{}': {}", parameter, reason)
            }
            Self::TypeMismatch {
                parameter,
                expected,
                found,
            } => write!(f, "parameter '{}' expects a {}, got a {}", parameter, expected, found),
            Self::UnknownAlgorithm(name) => write!(f, "unknown algorithm '{}'", name),
            Self::AlgorithmAlreadyDefined => write!(f, "an algorithm has already been defined"),
            Self::UndefinedAlgorithm(block) => {
                write!(f, "the algorithm must be defined before the {} block", block)
            }
            Self::InitialisationNotAllowed { algorithm, block } => {
                write!(f, "algorithm '{}' does not allow a {} block", algorithm, block)
            }
            Self::ComparisonNotRequested => write!(
                f,
                "the jacobian comparison criterion requires comparison to the numerical jacobian"
            ),
            Self::RelaxationNotEnabled => write!(f, "the relaxation coefficient requires useRelaxation"),
            Self::UnknownVariable(name) => write!(f, "'{}' is not an integration variable", name),
            Self::InvalidNormalisationFactor { variable, reason } => {
                write!(f, "invalid normalisation factor for '{}': {}", variable, reason)
            }
            Self::NormalisationFactorRedefined { variable, side } => {
                write!(f, "{} normalisation factor of '{}' already defined", side, variable)
            }
            Self::InvalidIncrementLimit { variable, value } => match variable {
                Some(variable) => write!(f, "increment limit {} of '{}' must be positive", value, variable),
                None => write!(f, "increment limit {} must be positive", value),
            },
            Self::IncrementLimitRedefined(variable) => match variable {
                Some(variable) => write!(f, "increment limit of '{}' already defined", variable),
                None => write!(f, "global increment limit already defined"),
            },
            Self::CodeBlockRedefined(block) => write!(f, "the {} block has already been defined", block),
        }
    }
}

/// An error in the behaviour description.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationError {
    pub kind: DeclarationErrorKind,
    pub location: Option<SourceLocation>,
}

impl DeclarationError {
    pub fn new(kind: DeclarationErrorKind) -> Self {
        Self { kind, location: None }
    }

    pub fn at(self, location: SourceLocation) -> Self {
        Self {
            location: Some(location),
            ..self
        }
    }
}

impl From<DeclarationErrorKind> for DeclarationError {
    fn from(kind: DeclarationErrorKind) -> Self {
        Self::new(kind)
    }
}

impl Display for DeclarationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Error for DeclarationError {}

/// A defect in the compiler or in the way it is driven.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum InternalError {
    UnsupportedDerivativeShape {
        residual: String,
        unknown: String,
        residual_rank: TensorRank,
        unknown_rank: TensorRank,
    },
    UnknownTangentBlock {
        variable: String,
        with_respect_to: String,
    },
    UnknownVariable(String),
    NormalisationAppliedTwice(String),
    RegistryFrozen,
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDerivativeShape {
                residual,
                unknown,
                residual_rank,
                unknown_rank,
            } => write!(
                f,
                "unsupported derivative shape: residual '{}' ({:?}) with respect to '{}' ({:?})",
                residual, residual_rank, unknown, unknown_rank
            ),
            Self::UnknownTangentBlock {
                variable,
                with_respect_to,
            } => write!(
                f,
                "tangent block ('{}', '{}') does not refer to two integration variables",
                variable, with_respect_to
            ),
            Self::UnknownVariable(name) => write!(f, "'{}' is not part of the unknown vector", name),
            Self::NormalisationAppliedTwice(target) => {
                write!(f, "normalisation of '{}' undone more than once", target)
            }
            Self::RegistryFrozen => write!(f, "normalisation factors can not be changed once emission started"),
        }
    }
}

impl Error for InternalError {}

/// Library-wide error type.
#[derive(Debug)]
pub enum CompileError {
    Declaration(DeclarationError),
    Internal(InternalError),
    /// Writing the generated source failed.
    Format(fmt::Error),
}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declaration(err) => write!(f, "declaration error: {}", err),
            Self::Internal(err) => write!(f, "internal error: {}", err),
            Self::Format(err) => write!(f, "failed to write generated source: {}", err),
        }
    }
}

impl Error for CompileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Declaration(err) => Some(err),
            Self::Internal(err) => Some(err),
            Self::Format(err) => Some(err),
        }
    }
}

impl From<DeclarationError> for CompileError {
    fn from(err: DeclarationError) -> Self {
        Self::Declaration(err)
    }
}

impl From<DeclarationErrorKind> for CompileError {
    fn from(kind: DeclarationErrorKind) -> Self {
        Self::Declaration(DeclarationError::new(kind))
    }
}

impl From<InternalError> for CompileError {
    fn from(err: InternalError) -> Self {
        Self::Internal(err)
    }
}

impl From<fmt::Error> for CompileError {
    fn from(err: fmt::Error) -> Self {
        Self::Format(err)
    }
}
