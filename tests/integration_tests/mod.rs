use implicit_codegen::code_block::CodeBlockId;
use implicit_codegen::normalisation::Side;
use implicit_codegen::value::Value;
use implicit_codegen::{BehaviourDescription, Declaration, TensorRank};

mod errors;

/// Implicit integration of Norton's creep law: elastic strain `eel` and equivalent plastic
/// strain `p`.
pub const NORTON_INTEGRATOR: &str = "
    const auto seq = sigmaeq(sig);
    const auto n = 3 * deviator(sig) / (2 * seq);
    feel = deel - deto + dp * n;
    fp = dp - dt * A * pow(seq, E);
    dfeel_ddp = n;
    dfp_ddeel = -dt * A * E * pow(seq, E - 1) * 2 * mu * theta * n;
";

pub const NORTON_STRESS: &str = "sig = lambda * trace(eel) * Stensor::Id() + 2 * mu * eel;";

pub fn norton() -> BehaviourDescription {
    norton_with("NewtonRaphson")
}

pub fn norton_with(algorithm: &str) -> BehaviourDescription {
    BehaviourDescription::new("Norton")
        .variable("eel", TensorRank::SymmetricTensor)
        .variable("p", TensorRank::Scalar)
        .algorithm(algorithm)
        .code_block(CodeBlockId::ComputeStress, NORTON_STRESS)
        .code_block(CodeBlockId::Integrator, NORTON_INTEGRATOR)
}

pub fn normalisation_factor(variable: &str, side: Side, factor: impl Into<Value>) -> Declaration {
    Declaration::NormalisationFactor {
        variable: variable.to_string(),
        side,
        factor: factor.into(),
    }
}
