use crate::catalogue::VariableCatalogue;
use crate::code_block::{CodeBlock, CodeBlockId};
use crate::convergence::ConvergenceParameters;
use crate::emit::real_literal;
use crate::error::{CompileError, DeclarationError, DeclarationErrorKind, SourceLocation};
use crate::frontend::{Declaration, DeclarationEvent};
use crate::hypothesis::ModellingHypothesis;
use crate::limits::IncrementLimits;
use crate::normalisation::NormalizationRegistry;
use crate::solver::{SolverRegistry, SolverStrategy};
use crate::tangent::TangentBlock;
use crate::value::Value;
use log::debug;
use std::collections::BTreeMap;

/// Everything known about one modelling hypothesis of a behaviour.
///
/// A context is built by replaying the declaration events of a behaviour and is dropped once
/// the hypothesis has been compiled. Contexts of different hypotheses share nothing.
#[derive(Debug)]
pub struct CompilationContext {
    hypothesis: ModellingHypothesis,
    pub(crate) catalogue: VariableCatalogue,
    pub(crate) algorithm: Option<String>,
    pub(crate) solver: Option<Box<dyn SolverStrategy>>,
    pub(crate) parameters: ConvergenceParameters,
    pub(crate) normalisation: NormalizationRegistry,
    pub(crate) limits: IncrementLimits,
    pub(crate) code_blocks: BTreeMap<CodeBlockId, CodeBlock>,
    pub(crate) tangent_blocks: Vec<TangentBlock>,
}

fn located(error: CompileError, location: SourceLocation) -> CompileError {
    match error {
        CompileError::Declaration(err) => CompileError::Declaration(err.at(location)),
        other => other,
    }
}

impl CompilationContext {
    pub fn new(hypothesis: ModellingHypothesis) -> Self {
        Self {
            hypothesis,
            catalogue: VariableCatalogue::new(),
            algorithm: None,
            solver: None,
            parameters: ConvergenceParameters::default(),
            normalisation: NormalizationRegistry::new(),
            limits: IncrementLimits::new(),
            code_blocks: BTreeMap::new(),
            tangent_blocks: Vec::new(),
        }
    }

    pub fn hypothesis(&self) -> ModellingHypothesis {
        self.hypothesis
    }

    pub fn catalogue(&self) -> &VariableCatalogue {
        &self.catalogue
    }

    pub fn parameters(&self) -> &ConvergenceParameters {
        &self.parameters
    }

    pub fn normalisation(&self) -> &NormalizationRegistry {
        &self.normalisation
    }

    pub fn limits(&self) -> &IncrementLimits {
        &self.limits
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    pub fn code_block(&self, id: CodeBlockId) -> Option<&CodeBlock> {
        self.code_blocks.get(&id)
    }

    pub fn tangent_blocks(&self) -> &[TangentBlock] {
        &self.tangent_blocks
    }

    /// Applies one declaration event. Events restricted to another hypothesis are ignored.
    ///
    /// Declaration errors are reported at the location of the event.
    pub fn apply(&mut self, event: &DeclarationEvent, solvers: &SolverRegistry) -> Result<(), CompileError> {
        if !event.applies_to(self.hypothesis) {
            return Ok(());
        }
        self.apply_declaration(&event.declaration, event.location, solvers)
            .map_err(|err| located(err, event.location))
    }

    fn apply_declaration(
        &mut self,
        declaration: &Declaration,
        location: SourceLocation,
        solvers: &SolverRegistry,
    ) -> Result<(), CompileError> {
        match declaration {
            Declaration::Variable { name, rank, array_size } => {
                self.catalogue.declare(name, *rank, *array_size)?;
            }
            Declaration::Algorithm(name) => self.set_algorithm(name, solvers)?,
            Declaration::Parameter { name, value } => self.parameters.set(name, value)?,
            Declaration::CompareToNumericalJacobian(compare) => {
                self.parameters.set_compare_to_numerical_jacobian(*compare);
            }
            Declaration::NormalisationFactor { variable, side, factor } => {
                self.require_variable(variable)?;
                let expr = normalisation_expression(variable, factor)?;
                self.normalisation.set_factor(variable, *side, expr)?;
            }
            Declaration::IncrementLimit { variable, value } => match variable {
                Some(variable) => {
                    self.require_variable(variable)?;
                    self.limits.set(variable, *value)?;
                }
                None => self.limits.set_global(*value)?,
            },
            Declaration::CodeBlock { id, text } => self.add_code_block(*id, text, location)?,
            Declaration::TangentBlocks(blocks) => {
                for block in blocks {
                    self.require_variable(&block.variable)?;
                    self.require_variable(&block.with_respect_to)?;
                    if !self.tangent_blocks.contains(block) {
                        self.tangent_blocks.push(block.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn require_variable(&self, name: &str) -> Result<(), DeclarationErrorKind> {
        if self.catalogue.contains(name) {
            Ok(())
        } else {
            Err(DeclarationErrorKind::UnknownVariable(name.to_string()))
        }
    }

    fn set_algorithm(&mut self, name: &str, solvers: &SolverRegistry) -> Result<(), DeclarationErrorKind> {
        if self.algorithm.is_some() {
            return Err(DeclarationErrorKind::AlgorithmAlreadyDefined);
        }
        let solver = solvers
            .create(name)
            .ok_or_else(|| DeclarationErrorKind::UnknownAlgorithm(name.to_string()))?;
        debug!("{}: using algorithm {}", self.hypothesis, name);
        self.algorithm = Some(name.to_string());
        self.solver = Some(solver);
        Ok(())
    }

    fn add_code_block(&mut self, id: CodeBlockId, text: &str, location: SourceLocation) -> Result<(), DeclarationErrorKind> {
        if matches!(id, CodeBlockId::InitializeJacobian | CodeBlockId::InitializeJacobianInvert) {
            let solver = self
                .solver
                .as_ref()
                .ok_or(DeclarationErrorKind::UndefinedAlgorithm(id))?;
            let capabilities = solver.capabilities();
            let allowed = match id {
                CodeBlockId::InitializeJacobian => capabilities.allows_jacobian_initialisation,
                _ => capabilities.allows_jacobian_invert_initialisation,
            };
            if !allowed {
                return Err(DeclarationErrorKind::InitialisationNotAllowed {
                    algorithm: solver.name().to_string(),
                    block: id,
                });
            }
        }
        if self.code_blocks.contains_key(&id) {
            return Err(DeclarationErrorKind::CodeBlockRedefined(id));
        }
        self.code_blocks.insert(
            id,
            CodeBlock {
                id,
                text: text.to_string(),
                location: Some(location),
            },
        );
        Ok(())
    }

    /// Selects `default_algorithm` if no algorithm was declared, then freezes the normalisation
    /// factors. No declaration can be applied afterwards.
    pub fn finish(&mut self, default_algorithm: &str, solvers: &SolverRegistry) -> Result<(), DeclarationError> {
        if self.solver.is_none() {
            self.set_algorithm(default_algorithm, solvers)?;
        }
        self.parameters.validate()?;
        self.normalisation.freeze();
        Ok(())
    }

    pub fn solver(&self) -> Option<&dyn SolverStrategy> {
        self.solver.as_deref()
    }
}

/// The expression of a normalisation factor given in the behaviour description.
fn normalisation_expression(variable: &str, factor: &Value) -> Result<String, DeclarationErrorKind> {
    let invalid = |reason: String| DeclarationErrorKind::InvalidNormalisationFactor {
        variable: variable.to_string(),
        reason,
    };
    match factor {
        Value::Number(x) if *x > 0.0 && x.is_finite() => Ok(real_literal(*x)),
        Value::Number(x) => Err(invalid(format!("expected a positive value, got {}", x))),
        Value::String(expr) if !expr.trim().is_empty() => Ok(expr.trim().to_string()),
        Value::String(_) => Err(invalid("empty expression".to_string())),
        Value::Boolean(_) => Err(invalid("expected a number or an expression".to_string())),
    }
}
