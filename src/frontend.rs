//! The declaration event stream consumed by the compiler.
//!
//! A tokenizer (not part of this crate) turns the behaviour source into a
//! [`BehaviourDescription`]: the hypotheses to compile and an ordered list of located
//! declarations. Descriptions can also be written by hand or loaded from JSON.
use crate::code_block::CodeBlockId;
use crate::error::SourceLocation;
use crate::hypothesis::ModellingHypothesis;
use crate::normalisation::Side;
use crate::tangent::TangentBlock;
use crate::value::Value;
use crate::variable::TensorRank;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Declaration {
    Variable {
        name: String,
        rank: TensorRank,
        #[serde(default = "default_array_size")]
        array_size: u16,
    },
    Algorithm(String),
    Parameter {
        name: String,
        value: Value,
    },
    CompareToNumericalJacobian(bool),
    NormalisationFactor {
        variable: String,
        side: Side,
        factor: Value,
    },
    /// A limit on the correction of `variable`, or of every unknown if `variable` is `None`.
    IncrementLimit {
        #[serde(default)]
        variable: Option<String>,
        value: f64,
    },
    CodeBlock {
        id: CodeBlockId,
        text: String,
    },
    TangentBlocks(Vec<TangentBlock>),
}

fn default_array_size() -> u16 {
    1
}

/// A declaration together with its position and, optionally, the only hypothesis it applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationEvent {
    #[serde(default)]
    pub location: SourceLocation,
    #[serde(default)]
    pub hypothesis: Option<ModellingHypothesis>,
    pub declaration: Declaration,
}

impl DeclarationEvent {
    pub fn applies_to(&self, hypothesis: ModellingHypothesis) -> bool {
        self.hypothesis.map_or(true, |h| h == hypothesis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviourDescription {
    pub class_name: String,
    /// Hypotheses to compile. All hypotheses are compiled if empty.
    #[serde(default)]
    pub hypotheses: Vec<ModellingHypothesis>,
    #[serde(default)]
    pub events: Vec<DeclarationEvent>,
}

impl BehaviourDescription {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            hypotheses: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_hypotheses(mut self, hypotheses: impl IntoIterator<Item = ModellingHypothesis>) -> Self {
        self.hypotheses = hypotheses.into_iter().collect();
        self
    }

    /// Appends a declaration located on the line following the last event.
    pub fn declare(self, declaration: Declaration) -> Self {
        let line = self.events.last().map_or(1, |event| event.location.line + 1);
        self.declare_at(SourceLocation::new(line, 1), declaration)
    }

    pub fn declare_at(mut self, location: SourceLocation, declaration: Declaration) -> Self {
        self.events.push(DeclarationEvent {
            location,
            hypothesis: None,
            declaration,
        });
        self
    }

    /// Appends a declaration which only applies to `hypothesis`.
    pub fn declare_for(mut self, hypothesis: ModellingHypothesis, declaration: Declaration) -> Self {
        let line = self.events.last().map_or(1, |event| event.location.line + 1);
        self.events.push(DeclarationEvent {
            location: SourceLocation::new(line, 1),
            hypothesis: Some(hypothesis),
            declaration,
        });
        self
    }

    pub fn variable(self, name: &str, rank: TensorRank) -> Self {
        self.array_variable(name, rank, 1)
    }

    pub fn array_variable(self, name: &str, rank: TensorRank, array_size: u16) -> Self {
        self.declare(Declaration::Variable {
            name: name.to_string(),
            rank,
            array_size,
        })
    }

    pub fn algorithm(self, name: &str) -> Self {
        self.declare(Declaration::Algorithm(name.to_string()))
    }

    pub fn parameter(self, name: &str, value: impl Into<Value>) -> Self {
        self.declare(Declaration::Parameter {
            name: name.to_string(),
            value: value.into(),
        })
    }

    pub fn code_block(self, id: CodeBlockId, text: &str) -> Self {
        self.declare(Declaration::CodeBlock {
            id,
            text: text.to_string(),
        })
    }

    /// The hypotheses to compile, in a fixed order.
    pub fn hypotheses_to_compile(&self) -> Vec<ModellingHypothesis> {
        if self.hypotheses.is_empty() {
            ModellingHypothesis::ALL.to_vec()
        } else {
            let mut hypotheses = self.hypotheses.clone();
            hypotheses.sort_unstable();
            hypotheses.dedup();
            hypotheses
        }
    }

    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        serde_json::from_str(json).wrap_err("failed to parse behaviour description")
    }
}
