use implicit_codegen::code_block::{
    jacobian_parts_used, mentions, predictor_epilogue, residuals_used, rewrite, substitutions, CodeBlockId,
};
use implicit_codegen::normalisation::{NormalizationRegistry, Side};
use implicit_codegen::variable::IntegrationVariable;
use implicit_codegen::TensorRank;
use std::collections::BTreeSet;

fn variables() -> Vec<IntegrationVariable> {
    vec![
        IntegrationVariable::new("eel", TensorRank::SymmetricTensor, 1),
        IntegrationVariable::new("p", TensorRank::Scalar, 1),
    ]
}

fn normalisation() -> NormalizationRegistry {
    let mut registry = NormalizationRegistry::new();
    registry.set_factor("p", Side::Unknown, "2").unwrap();
    registry
}

#[test]
fn integrator_sees_physical_increments() {
    let subs = substitutions(CodeBlockId::Integrator, &variables(), &normalisation());
    assert_eq!(
        rewrite("fp -= dp + p;\nfeel = deel - deto;", &subs),
        "fp -= ((2)*(this->dp)) + (this->p);\nfeel = (this->deel) - deto;"
    );
}

#[test]
fn compute_stress_sees_values_at_theta() {
    let subs = substitutions(CodeBlockId::ComputeStress, &variables(), &normalisation());
    assert_eq!(
        rewrite("sig = lambda*trace(eel)*id;", &subs),
        "sig = lambda*trace((this->eel+(this->theta)*(this->deel)))*id;"
    );
    assert_eq!(rewrite("x = p;", &subs), "x = (this->p+(this->theta)*((2)*(this->dp)));");
}

#[test]
fn other_blocks_see_members() {
    let subs = substitutions(CodeBlockId::ComputeFinalStress, &variables(), &normalisation());
    assert_eq!(rewrite("sig = eel + dp;", &subs), "sig = this->eel + this->dp;");
    let subs = substitutions(CodeBlockId::Predictor, &variables(), &normalisation());
    assert_eq!(rewrite("dp = 1e-5;", &subs), "this->dp = 1e-5;");
}

#[test]
fn rewrite_leaves_member_accesses_and_numbers_alone() {
    let subs = substitutions(CodeBlockId::Integrator, &variables(), &NormalizationRegistry::new());
    assert_eq!(
        rewrite("x.p + y->dp + this->p - 1e-5*p + peel", &subs),
        "x.p + y->dp + this->p - 1e-5*(this->p) + peel"
    );
    assert_eq!(rewrite("a . p", &subs), "a . p");
}

#[test]
fn jacobian_parts_are_collected_from_declared_variables() {
    let vars = variables();
    let is_variable = |name: &str| vars.iter().any(|v| v.name() == name);
    let text = "
        dfp_ddeel = -n;
        this->dfeel_ddeel += id;
        other.dfp_ddp = 2;
        dfq_ddp = 1;
        dfp_ddp(0) = 1;
    ";
    let parts = jacobian_parts_used(text, is_variable);
    let expected: BTreeSet<_> = [("eel", "eel"), ("p", "eel"), ("p", "p")]
        .iter()
        .map(|&(a, b)| (a.to_string(), b.to_string()))
        .collect();
    assert_eq!(parts, expected);
}

#[test]
fn residuals_and_mentions() {
    let vars = variables();
    assert_eq!(residuals_used("fp = dp; x = feel2;", &vars), vec!["p"]);
    assert!(mentions("x = dp + 1;", "dp"));
    assert!(!mentions("x = dpp + 1;", "dp"));
}

#[test]
fn predictor_epilogue_normalises_initial_guess() {
    assert_eq!(
        predictor_epilogue(&variables(), &normalisation()),
        vec!["this->dp *= real(1)/(2);".to_string()]
    );
    assert!(predictor_epilogue(&variables(), &NormalizationRegistry::new()).is_empty());
}

#[test]
fn code_block_ids_display_with_at_sign() {
    assert_eq!(CodeBlockId::Integrator.to_string(), "@Integrator");
    assert_eq!(CodeBlockId::InitializeJacobianInvert.to_string(), "@InitializeJacobianInvert");
}
