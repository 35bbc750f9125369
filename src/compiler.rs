//! The compiler driver: from a behaviour description to generated source, per hypothesis.
use crate::addressing::{address_for, AddressingPlan};
use crate::code_block::{self, CodeBlockId};
use crate::context::CompilationContext;
use crate::convergence::ConvergenceController;
use crate::emit::SourceWriter;
use crate::error::{CompileError, DeclarationErrorKind};
use crate::frontend::BehaviourDescription;
use crate::hypothesis::ModellingHypothesis;
use crate::layout::{plan, LayoutEntry, UnknownVectorLayout};
use crate::numerical_jacobian;
use crate::options::CompilerOptions;
use crate::solver::{SolverCapabilities, SolverEmission, SolverRegistry, SolverStrategy};
use crate::tangent::TangentOperatorExtractor;
use crate::variable::{increment_name, jacobian_block_name, residual_name};
use eyre::WrapErr;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::{Display, Formatter, Write};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SectionKind {
    Offsets,
    Members,
    Views,
    Predictor,
    ComputeStress,
    ComputeFdF,
    NumericalJacobian,
    UpdateIntegrationVariables,
    ComputeFinalStress,
    TangentOperator,
    Integrate,
}

impl SectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Offsets => "offsets",
            Self::Members => "members",
            Self::Views => "views",
            Self::Predictor => "predictor",
            Self::ComputeStress => "stress computation",
            Self::ComputeFdF => "residual evaluation",
            Self::NumericalJacobian => "numerical jacobian",
            Self::UpdateIntegrationVariables => "update of the integration variables",
            Self::ComputeFinalStress => "final stress computation",
            Self::TangentOperator => "tangent operator blocks",
            Self::Integrate => "integration loop",
        }
    }
}

impl Display for SectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSection {
    pub kind: SectionKind,
    pub text: String,
}

/// The generated code of one behaviour under one modelling hypothesis.
#[derive(Debug, Clone)]
pub struct GeneratedBehaviour {
    pub class_name: String,
    pub hypothesis: ModellingHypothesis,
    pub layout: UnknownVectorLayout,
    pub sections: Vec<GeneratedSection>,
}

impl GeneratedBehaviour {
    pub fn section(&self, kind: SectionKind) -> Option<&str> {
        self.sections
            .iter()
            .find(|section| section.kind == kind)
            .map(|section| section.text.as_str())
    }

    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.section(kind).is_some()
    }

    /// All sections, in order, concatenated into a single source text.
    pub fn source(&self) -> String {
        let mut source = format!("// {} ({})\n", self.class_name, self.hypothesis);
        for section in &self.sections {
            source.push('\n');
            source.push_str(&section.text);
        }
        source
    }
}

/// Whether the Jacobian is computed by user code.
fn analytical_jacobian(capabilities: &SolverCapabilities) -> bool {
    capabilities.uses_jacobian && capabilities.requires_jacobian_reset_to_identity
}

/// A view of the block of `entry` in the vector `vector`, named `alias`.
fn vector_view(alias: &str, entry: &LayoutEntry, vector: &str) -> String {
    let rank = entry.variable.rank().type_name();
    if entry.variable.is_array() {
        format!(
            "auto&& {} = map<{}, {}>({}, {}_offset);",
            alias,
            entry.variable.array_size(),
            rank,
            vector,
            entry.name()
        )
    } else {
        format!("auto&& {} = map<{}>({}, {}_offset);", alias, rank, vector, entry.name())
    }
}

/// State shared by the emission of the sections of one hypothesis.
struct Emission<'a> {
    context: &'a CompilationContext,
    layout: &'a UnknownVectorLayout,
    options: &'a CompilerOptions,
    solver: &'a dyn SolverStrategy,
    initialize_jacobian: Option<String>,
    initialize_jacobian_invert: Option<String>,
}

impl<'a> Emission<'a> {
    fn writer(&self) -> SourceWriter {
        SourceWriter::new().with_comments(self.options.emit_comments)
    }

    fn solver_emission(&self) -> SolverEmission<'_> {
        SolverEmission {
            n: self.layout.total_size(),
            debug: self.options.debug,
            initialize_jacobian: self.initialize_jacobian.as_deref(),
            initialize_jacobian_invert: self.initialize_jacobian_invert.as_deref(),
            trust_region_size: self.context.parameters.trust_region_size(),
        }
    }

    fn rewritten(&self, id: CodeBlockId) -> Option<String> {
        self.context.code_block(id).map(|block| {
            let substitutions =
                code_block::substitutions(id, self.context.catalogue.variables(), &self.context.normalisation);
            code_block::rewrite(&block.text, &substitutions)
        })
    }

    fn tangent_extractor(&self) -> TangentOperatorExtractor<'_> {
        TangentOperatorExtractor {
            layout: self.layout,
            normalisation: &self.context.normalisation,
            capabilities: self.solver.capabilities(),
        }
    }

    fn offsets(&self) -> Result<String, CompileError> {
        let mut w = self.writer();
        self.layout.emit_offsets(&mut w)?;
        Ok(w.finish())
    }

    fn members(&self) -> Result<String, CompileError> {
        let mut w = self.writer();
        w.comment("solver state")?;
        writeln!(w, "static constexpr bool SUCCESS = true;")?;
        writeln!(w, "static constexpr bool FAILURE = false;")?;
        writeln!(w, "tvector<N, real> zeros;")?;
        writeln!(w, "tvector<N, real> zeros_1;")?;
        writeln!(w, "tvector<N, real> fzeros;")?;
        writeln!(w, "tmatrix<N, N, real> jacobian;")?;
        writeln!(w, "unsigned short iter = 0;")?;
        self.context.parameters.emit_members(&mut w)?;
        self.context.limits.emit_members(&mut w)?;
        self.solver.emit_members(&mut w, &self.solver_emission())?;
        if !self.context.tangent_blocks.is_empty() {
            self.tangent_extractor()
                .emit_members(&mut w, &self.context.tangent_blocks)?;
        }
        Ok(w.finish())
    }

    fn views(&self) -> Result<String, CompileError> {
        let mut w = self.writer();
        w.comment("increments of the integration variables")?;
        for entry in self.layout.entries() {
            writeln!(w, "{}", vector_view(&entry.variable.increment_name(), entry, "this->zeros"))?;
        }
        Ok(w.finish())
    }

    fn predictor(&self, code: &str) -> Result<String, CompileError> {
        let mut w = self.writer();
        w.open("void computePredictor(){")?;
        w.open("{")?;
        w.code(code)?;
        w.close("}")?;
        for statement in code_block::predictor_epilogue(self.context.catalogue.variables(), &self.context.normalisation) {
            writeln!(w, "{}", statement)?;
        }
        w.close("}")?;
        Ok(w.finish())
    }

    fn plain_method(&self, signature: &str, code: &str) -> Result<String, CompileError> {
        let mut w = self.writer();
        w.open(signature)?;
        w.code(code)?;
        w.close("}")?;
        Ok(w.finish())
    }

    /// Jacobian blocks addressed in `computeFdF`: the blocks referenced by the integrator and the
    /// diagonal blocks of the normalised variables, which must be scaled even if untouched.
    fn jacobian_blocks(&self, integrator: Option<&str>) -> Result<Vec<AddressingPlan>, CompileError> {
        let catalogue = &self.context.catalogue;
        let mut parts: BTreeSet<(String, String)> = integrator
            .map(|text| code_block::jacobian_parts_used(text, |name| catalogue.contains(name)))
            .unwrap_or_default();
        for variable in self.context.normalisation.normalised_variables() {
            parts.insert((variable.to_string(), variable.to_string()));
        }
        let mut plans = Vec::with_capacity(parts.len());
        for (residual, unknown) in &parts {
            plans.push(address_for(residual, unknown, self.layout)?);
        }
        Ok(plans)
    }

    fn compute_fdf(&self, integrator: Option<&str>) -> Result<String, CompileError> {
        let capabilities = self.solver.capabilities();
        let normalisation = &self.context.normalisation;
        let mut w = self.writer();

        w.open("bool computeFdF(){")?;
        if capabilities.requires_jacobian_reset_to_identity {
            writeln!(w, "std::fill(this->jacobian.begin(), this->jacobian.end(), real(0));")?;
            writeln!(w, "for(unsigned short idx = 0; idx != N; ++idx){{ this->jacobian(idx, idx) = real(1); }}")?;
        }
        writeln!(w, "this->fzeros = this->zeros;")?;
        for entry in self.layout.entries() {
            writeln!(w, "{}", vector_view(&residual_name(entry.name()), entry, "this->fzeros"))?;
        }

        let plans = if analytical_jacobian(&capabilities) {
            self.jacobian_blocks(integrator)?
        } else {
            if let Some(text) = integrator {
                let used = code_block::jacobian_parts_used(text, |name| self.context.catalogue.contains(name));
                if let Some((r, u)) = used.iter().next() {
                    warn!(
                        "{}: {} does not use an analytical jacobian, ignoring references to {}",
                        self.context.hypothesis(),
                        self.solver.name(),
                        jacobian_block_name(r, u)
                    );
                }
            }
            Vec::new()
        };
        for plan in &plans {
            writeln!(w, "{}", plan.accessor(&plan.name, "this->jacobian"))?;
        }

        if self.context.code_block(CodeBlockId::ComputeStress).is_some() {
            writeln!(w, "this->computeStress();")?;
        }
        for entry in self.layout.entries() {
            if let Some(statement) = normalisation.residual_prologue(entry.name()) {
                writeln!(w, "{}", statement)?;
            }
        }
        if let Some(code) = integrator {
            w.open("{")?;
            w.code(code)?;
            w.close("}")?;
        }
        for entry in self.layout.entries() {
            if let Some(statement) = normalisation.residual_epilogue(entry.name()) {
                writeln!(w, "{}", statement)?;
            }
        }
        for plan in &plans {
            if let Some(statement) = normalisation.jacobian_scaling_statement(plan) {
                writeln!(w, "{}", statement)?;
            }
        }
        writeln!(w, "return true;")?;
        w.close("}")?;
        debug!(
            "{}: computeFdF addresses {} jacobian blocks",
            self.context.hypothesis(),
            plans.len()
        );
        Ok(w.finish())
    }

    fn update_integration_variables(&self) -> Result<String, CompileError> {
        let mut w = self.writer();
        w.open("void updateIntegrationVariables(){")?;
        for variable in self.context.catalogue.variables() {
            writeln!(w, "this->{} += this->{};", variable.name(), variable.increment_name())?;
        }
        w.close("}")?;
        Ok(w.finish())
    }

    fn numerical_jacobian(&self) -> Result<String, CompileError> {
        let mut w = self.writer();
        numerical_jacobian::emit(&mut w, self.layout, "this->numerical_jacobian_epsilon")?;
        Ok(w.finish())
    }

    fn comparison(&self) -> Result<Option<String>, CompileError> {
        if self.context.parameters.jacobian_comparison_criterion().is_none() {
            return Ok(None);
        }
        if !analytical_jacobian(&self.solver.capabilities()) {
            warn!(
                "{}: comparison to the numerical jacobian is meaningless with {}, skipped",
                self.context.hypothesis(),
                self.solver.name()
            );
            return Ok(None);
        }
        let mut w = self.writer();
        numerical_jacobian::emit_comparison(&mut w, self.layout)?;
        Ok(Some(w.finish()))
    }

    fn tangent_operator(&self) -> Result<(String, String), CompileError> {
        let extractor = self.tangent_extractor();
        let mut w = self.writer();
        extractor.emit(&mut w, &self.context.tangent_blocks)?;
        let mut call = self.writer();
        extractor.emit_call(&mut call, &self.context.tangent_blocks)?;
        Ok((w.finish(), call.finish()))
    }

    fn warn_unused_normalisation(&self) {
        let texts: Vec<&str> = self
            .context
            .code_blocks
            .values()
            .map(|block| block.text.as_str())
            .collect();
        for variable in self.context.normalisation.normalised_variables() {
            let names = [
                variable.to_string(),
                increment_name(variable),
                residual_name(variable),
            ];
            let used = texts
                .iter()
                .any(|text| names.iter().any(|name| code_block::mentions(text, name)));
            if !used {
                warn!(
                    "{}: variable {} is normalised but never appears in a code block",
                    self.context.hypothesis(),
                    variable
                );
            }
        }
    }
}

/// Compiles behaviour descriptions into implicit integration schemes.
#[derive(Debug, Clone, Default)]
pub struct ImplicitSchemeCompiler {
    options: CompilerOptions,
    solvers: SolverRegistry,
}

impl ImplicitSchemeCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            options,
            solvers: SolverRegistry::default(),
        }
    }

    pub fn with_solvers(self, solvers: SolverRegistry) -> Self {
        Self { solvers, ..self }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn solvers_mut(&mut self) -> &mut SolverRegistry {
        &mut self.solvers
    }

    /// Replays the declarations of `description` which apply to `hypothesis`.
    pub fn build_context(
        &self,
        description: &BehaviourDescription,
        hypothesis: ModellingHypothesis,
    ) -> Result<CompilationContext, CompileError> {
        let mut context = CompilationContext::new(hypothesis);
        for event in &description.events {
            context.apply(event, &self.solvers)?;
        }
        context.finish(&self.options.default_algorithm, &self.solvers)?;
        Ok(context)
    }

    pub fn compile_hypothesis(
        &self,
        description: &BehaviourDescription,
        hypothesis: ModellingHypothesis,
    ) -> Result<GeneratedBehaviour, CompileError> {
        let context = self.build_context(description, hypothesis)?;
        let layout = plan(context.catalogue.variables(), hypothesis.space_dimension())?;
        let solver = context
            .solver()
            .ok_or_else(|| DeclarationErrorKind::UnknownAlgorithm(self.options.default_algorithm.clone()))?;

        let mut emission = Emission {
            context: &context,
            layout: &layout,
            options: &self.options,
            solver,
            initialize_jacobian: None,
            initialize_jacobian_invert: None,
        };
        emission.initialize_jacobian = emission.rewritten(CodeBlockId::InitializeJacobian);
        emission.initialize_jacobian_invert = emission.rewritten(CodeBlockId::InitializeJacobianInvert);
        emission.warn_unused_normalisation();

        let capabilities = solver.capabilities();
        let integrator = emission.rewritten(CodeBlockId::Integrator);
        if integrator.is_none() {
            warn!("{}: no integrator given, the residual is the increment itself", hypothesis);
        }

        let mut sections = Vec::new();
        let mut push = |kind: SectionKind, text: String| {
            let text = if emission.options.emit_comments {
                format!("// {}\n{}", kind, text)
            } else {
                text
            };
            sections.push(GeneratedSection { kind, text });
        };

        push(SectionKind::Offsets, emission.offsets()?);
        push(SectionKind::Members, emission.members()?);
        push(SectionKind::Views, emission.views()?);
        let predictor = emission.rewritten(CodeBlockId::Predictor);
        if let Some(code) = &predictor {
            push(SectionKind::Predictor, emission.predictor(code)?);
        }
        if let Some(code) = emission.rewritten(CodeBlockId::ComputeStress) {
            push(SectionKind::ComputeStress, emission.plain_method("void computeStress(){", &code)?);
        }
        push(SectionKind::ComputeFdF, emission.compute_fdf(integrator.as_deref())?);
        if capabilities.requires_numerical_jacobian || context.parameters.compare_to_numerical_jacobian() {
            push(SectionKind::NumericalJacobian, emission.numerical_jacobian()?);
        }
        push(SectionKind::UpdateIntegrationVariables, emission.update_integration_variables()?);
        let final_stress = emission.rewritten(CodeBlockId::ComputeFinalStress);
        if let Some(code) = &final_stress {
            push(SectionKind::ComputeFinalStress, emission.plain_method("void computeFinalStress(){", code)?);
        }
        let tangent_call = if context.tangent_blocks.is_empty() {
            None
        } else {
            let (extraction, call) = emission.tangent_operator()?;
            push(SectionKind::TangentOperator, extraction);
            Some(call)
        };

        let comparison = emission.comparison()?;
        let controller = ConvergenceController {
            layout: &layout,
            solver,
            solver_emission: emission.solver_emission(),
            limits: &context.limits,
            normalisation: &context.normalisation,
            debug: self.options.debug,
            comparison: comparison.as_deref(),
            has_predictor: predictor.is_some(),
            has_final_stress: final_stress.is_some(),
            relaxation: context.parameters.use_relaxation(),
            tangent_call: tangent_call.as_deref(),
        };
        let mut w = emission.writer();
        controller.emit(&mut w)?;
        push(SectionKind::Integrate, w.finish());

        info!(
            "Compiled {} for hypothesis {} with {} ({} unknowns)",
            description.class_name,
            hypothesis,
            solver.name(),
            layout.total_size()
        );

        Ok(GeneratedBehaviour {
            class_name: description.class_name.clone(),
            hypothesis,
            layout,
            sections,
        })
    }

    /// Compiles every hypothesis of `description`, in parallel if enabled in the options.
    ///
    /// The first failing hypothesis aborts the whole behaviour.
    pub fn compile_all(&self, description: &BehaviourDescription) -> eyre::Result<Vec<GeneratedBehaviour>> {
        let hypotheses = description.hypotheses_to_compile();
        let compile = |hypothesis: &ModellingHypothesis| {
            self.compile_hypothesis(description, *hypothesis)
                .wrap_err_with(|| {
                    format!(
                        "failed to compile behaviour {} for hypothesis {}",
                        description.class_name, hypothesis
                    )
                })
        };
        if self.options.parallel {
            hypotheses.par_iter().map(compile).collect()
        } else {
            hypotheses.iter().map(compile).collect()
        }
    }
}
