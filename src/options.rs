use eyre::WrapErr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Emit reports of the iterations and failures of the generated solver.
    pub debug: bool,
    /// Compile the hypotheses of a behaviour in parallel.
    pub parallel: bool,
    /// Annotate the generated sections with comments.
    pub emit_comments: bool,
    /// Algorithm used when the behaviour does not declare one.
    pub default_algorithm: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            parallel: false,
            emit_comments: true,
            default_algorithm: "NewtonRaphson".to_string(),
        }
    }
}

impl CompilerOptions {
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse compiler options")
    }
}
