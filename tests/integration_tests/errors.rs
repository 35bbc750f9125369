use super::{norton, norton_with, normalisation_factor};
use implicit_codegen::code_block::CodeBlockId;
use implicit_codegen::normalisation::Side;
use implicit_codegen::tangent::TangentBlock;
use implicit_codegen::{
    BehaviourDescription, CompileError, Declaration, DeclarationError, DeclarationErrorKind, ImplicitSchemeCompiler,
    InternalError, ModellingHypothesis, SourceLocation, TensorRank,
};

fn declaration_error(description: &BehaviourDescription) -> DeclarationError {
    match ImplicitSchemeCompiler::default().compile_hypothesis(description, ModellingHypothesis::Tridimensional) {
        Err(CompileError::Declaration(err)) => err,
        other => panic!("expected a declaration error, got {:?}", other),
    }
}

#[test]
fn reserved_name_is_reported_at_its_declaration() {
    let description = BehaviourDescription::new("Broken").variable("zeros", TensorRank::Scalar);
    let err = declaration_error(&description);
    assert_eq!(err.kind, DeclarationErrorKind::ReservedName("zeros".to_string()));
    assert_eq!(err.location, Some(SourceLocation::new(1, 1)));
    assert_eq!(err.to_string(), "1:1: 'zeros' is a reserved name");
}

#[test]
fn generated_name_collision_is_reported() {
    let description = BehaviourDescription::new("Broken")
        .variable("p", TensorRank::Scalar)
        .variable("dp", TensorRank::Scalar);
    let err = declaration_error(&description);
    assert_eq!(
        err.kind,
        DeclarationErrorKind::GeneratedNameCollision {
            name: "dp".to_string(),
            generated: "dp".to_string(),
        }
    );
    assert_eq!(err.location, Some(SourceLocation::new(2, 1)));
}

#[test]
fn zero_iterations_are_rejected() {
    let err = declaration_error(&norton().parameter("iterMax", 0u16));
    assert!(matches!(
        err.kind,
        DeclarationErrorKind::InvalidParameter { ref parameter, .. } if parameter == "iterMax"
    ));
    assert_eq!(err.location, Some(SourceLocation::new(6, 1)));
}

#[test]
fn algorithm_errors() {
    let unknown = BehaviourDescription::new("Broken")
        .variable("p", TensorRank::Scalar)
        .algorithm("LevenbergMarquardt");
    assert_eq!(
        declaration_error(&unknown).kind,
        DeclarationErrorKind::UnknownAlgorithm("LevenbergMarquardt".to_string())
    );

    let twice = norton().algorithm("Broyden");
    assert_eq!(declaration_error(&twice).kind, DeclarationErrorKind::AlgorithmAlreadyDefined);
}

#[test]
fn unknown_default_algorithm() {
    let compiler = ImplicitSchemeCompiler::new(implicit_codegen::CompilerOptions {
        default_algorithm: "Picard".to_string(),
        ..Default::default()
    });
    let description = BehaviourDescription::new("NoAlgorithm").variable("p", TensorRank::Scalar);
    match compiler.compile_hypothesis(&description, ModellingHypothesis::Tridimensional) {
        Err(CompileError::Declaration(err)) => {
            assert_eq!(err.kind, DeclarationErrorKind::UnknownAlgorithm("Picard".to_string()));
            assert_eq!(err.location, None);
        }
        other => panic!("expected a declaration error, got {:?}", other),
    }
}

#[test]
fn jacobian_initialisation_depends_on_algorithm() {
    let before_algorithm = BehaviourDescription::new("Broken")
        .variable("p", TensorRank::Scalar)
        .code_block(CodeBlockId::InitializeJacobian, "this->jacobian = id;");
    assert_eq!(
        declaration_error(&before_algorithm).kind,
        DeclarationErrorKind::UndefinedAlgorithm(CodeBlockId::InitializeJacobian)
    );

    let newton = norton().code_block(CodeBlockId::InitializeJacobian, "this->jacobian = id;");
    assert_eq!(
        declaration_error(&newton).kind,
        DeclarationErrorKind::InitialisationNotAllowed {
            algorithm: "NewtonRaphson".to_string(),
            block: CodeBlockId::InitializeJacobian,
        }
    );

    let broyden = norton_with("Broyden").code_block(CodeBlockId::InitializeJacobianInvert, "this->jacobian = id;");
    assert_eq!(
        declaration_error(&broyden).kind,
        DeclarationErrorKind::InitialisationNotAllowed {
            algorithm: "Broyden".to_string(),
            block: CodeBlockId::InitializeJacobianInvert,
        }
    );
}

#[test]
fn code_blocks_are_defined_once() {
    let description = norton().code_block(CodeBlockId::Integrator, "fp = dp;");
    assert_eq!(
        declaration_error(&description).kind,
        DeclarationErrorKind::CodeBlockRedefined(CodeBlockId::Integrator)
    );
}

#[test]
fn comparison_criterion_without_comparison() {
    let description = norton().parameter("jacobianComparisonCriterion", 1e-6);
    assert_eq!(
        declaration_error(&description).kind,
        DeclarationErrorKind::ComparisonNotRequested
    );
}

#[test]
fn normalisation_factor_errors() {
    let unknown = norton().declare(normalisation_factor("q", Side::Unknown, 2.0));
    assert_eq!(
        declaration_error(&unknown).kind,
        DeclarationErrorKind::UnknownVariable("q".to_string())
    );

    let negative = norton().declare(normalisation_factor("p", Side::Unknown, -1.0));
    assert!(matches!(
        declaration_error(&negative).kind,
        DeclarationErrorKind::InvalidNormalisationFactor { ref variable, .. } if variable == "p"
    ));

    let empty = norton().declare(normalisation_factor("p", Side::Residual, "  "));
    assert!(matches!(
        declaration_error(&empty).kind,
        DeclarationErrorKind::InvalidNormalisationFactor { .. }
    ));

    let twice = norton()
        .declare(normalisation_factor("p", Side::Unknown, 2.0))
        .declare(normalisation_factor("p", Side::Unknown, "young"));
    let err = declaration_error(&twice);
    assert_eq!(
        err.kind,
        DeclarationErrorKind::NormalisationFactorRedefined {
            variable: "p".to_string(),
            side: Side::Unknown,
        }
    );
    assert_eq!(err.location, Some(SourceLocation::new(7, 1)));
}

#[test]
fn tangent_blocks_must_refer_to_variables() {
    let description = norton().declare(Declaration::TangentBlocks(vec![TangentBlock::new("eel", "sig")]));
    assert_eq!(
        declaration_error(&description).kind,
        DeclarationErrorKind::UnknownVariable("sig".to_string())
    );
}

fn stensor_and_vector(integrator: &str) -> BehaviourDescription {
    BehaviourDescription::new("Gradient")
        .variable("s", TensorRank::SymmetricTensor)
        .variable("g", TensorRank::Vector)
        .code_block(CodeBlockId::Integrator, integrator)
}

#[test]
fn unsupported_derivative_shape_is_reported_only_when_used() {
    let compiler = ImplicitSchemeCompiler::default();
    assert!(compiler
        .compile_hypothesis(&stensor_and_vector("fs = ds;"), ModellingHypothesis::Tridimensional)
        .is_ok());

    let result = compiler.compile_hypothesis(
        &stensor_and_vector("fs = ds; dfs_ddg = 0;"),
        ModellingHypothesis::Tridimensional,
    );
    match result {
        Err(CompileError::Internal(InternalError::UnsupportedDerivativeShape {
            residual,
            unknown,
            residual_rank,
            unknown_rank,
        })) => {
            assert_eq!((residual.as_str(), unknown.as_str()), ("s", "g"));
            assert_eq!(residual_rank, TensorRank::SymmetricTensor);
            assert_eq!(unknown_rank, TensorRank::Vector);
        }
        other => panic!("expected an unsupported derivative shape, got {:?}", other),
    }
}

#[test]
fn compile_all_names_the_failing_hypothesis() {
    let report = ImplicitSchemeCompiler::default()
        .compile_all(&norton().parameter("iterMax", 0u16))
        .unwrap_err();
    assert_eq!(
        report.to_string(),
        "failed to compile behaviour Norton for hypothesis AxisymmetricalGeneralisedPlaneStrain"
    );
    assert!(report
        .chain()
        .any(|cause| cause.to_string().contains("invalid value for parameter 'iterMax'")));
    assert!(report.downcast_ref::<CompileError>().is_some());
}

#[test]
fn relaxation_errors() {
    let err = declaration_error(&norton().parameter("relaxationCoefficient", 0.3));
    assert_eq!(err.kind, DeclarationErrorKind::RelaxationNotEnabled);
    assert_eq!(err.location, Some(SourceLocation::new(6, 1)));

    // The trigger is checked against iterMax once every declaration has been applied
    let never_triggered = norton()
        .parameter("useRelaxation", true)
        .parameter("relaxationTrigger", 20u16)
        .parameter("iterMax", 15u16);
    let err = declaration_error(&never_triggered);
    assert!(matches!(
        err.kind,
        DeclarationErrorKind::InvalidParameter { ref parameter, .. } if parameter == "relaxationTrigger"
    ));
    assert_eq!(err.location, None);
}
