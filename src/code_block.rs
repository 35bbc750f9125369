//! User code blocks and the substitution of variable names in them.
//!
//! Code blocks are not parsed. They are split into identifier tokens and everything else, and
//! identifiers naming integration variables or their increments are replaced by expressions of
//! the generated class. Identifiers following a member access (`.` or `->`) are left alone.
use crate::error::SourceLocation;
use crate::normalisation::{NormalizationRegistry, Side};
use crate::variable::{increment_name, parse_jacobian_block_name, residual_name, IntegrationVariable};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::{Display, Formatter};

/// The fixed set of code blocks a behaviour may provide.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CodeBlockId {
    Predictor,
    Integrator,
    ComputeStress,
    ComputeFinalStress,
    InitializeJacobian,
    InitializeJacobianInvert,
}

impl CodeBlockId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Predictor => "Predictor",
            Self::Integrator => "Integrator",
            Self::ComputeStress => "ComputeStress",
            Self::ComputeFinalStress => "ComputeFinalStress",
            Self::InitializeJacobian => "InitializeJacobian",
            Self::InitializeJacobianInvert => "InitializeJacobianInvert",
        }
    }
}

impl Display for CodeBlockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub id: CodeBlockId,
    pub text: String,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Token<'a> {
    Identifier(&'a str),
    Other(&'a str),
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_alphabetic() || c == b'_' || c.is_ascii_digit() {
            // Numbers such as `1e-5` are consumed as a whole so that `e` is never taken for an identifier
            let numeric = c.is_ascii_digit();
            if start < i {
                tokens.push(Token::Other(&text[start..i]));
            }
            let word_start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || (numeric && bytes[i] == b'.')) {
                i += 1;
            }
            let word = &text[word_start..i];
            tokens.push(if numeric {
                Token::Other(word)
            } else {
                Token::Identifier(word)
            });
            start = i;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        tokens.push(Token::Other(&text[start..]));
    }
    tokens
}

/// Whether the text preceding an identifier ends with a member access.
fn is_member_access(preceding: &str) -> bool {
    let preceding = preceding.trim_end();
    preceding.ends_with('.') || preceding.ends_with("->")
}

/// Replaces every identifier token of `text` found in `substitutions`.
pub fn rewrite(text: &str, substitutions: &FxHashMap<String, String>) -> String {
    let mut result = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Identifier(name) if !is_member_access(&result) => match substitutions.get(name) {
                Some(replacement) => result.push_str(replacement),
                None => result.push_str(name),
            },
            Token::Identifier(s) | Token::Other(s) => result.push_str(s),
        }
    }
    result
}

/// Substitutions applied to the code block `id`.
///
/// In `@Integrator`, increments denote physical increments, which differ from the stored
/// unknowns when an unknown-side normalisation factor is set. In `@ComputeStress`, a variable
/// denotes its value at `t + theta dt`.
pub fn substitutions(
    id: CodeBlockId,
    variables: &[IntegrationVariable],
    normalisation: &NormalizationRegistry,
) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for variable in variables {
        let v = variable.name();
        let dv = increment_name(v);
        let (value, increment) = match id {
            CodeBlockId::Integrator => (format!("(this->{})", v), normalisation.increment_expression(v)),
            CodeBlockId::ComputeStress => {
                let increment = normalisation.increment_expression(v);
                (format!("(this->{}+(this->theta)*{})", v, increment), increment)
            }
            _ => (format!("this->{}", v), format!("this->{}", dv)),
        };
        map.insert(v.to_string(), value);
        map.insert(dv, increment);
    }
    map
}

/// Jacobian blocks `df<a>_dd<b>` referenced in `text`, where both `a` and `b` are accepted by
/// `is_variable`.
///
/// Accesses through `this->` count as references; other member accesses do not.
pub fn jacobian_parts_used(text: &str, is_variable: impl Fn(&str) -> bool) -> BTreeSet<(String, String)> {
    let mut parts = BTreeSet::new();
    let mut preceding = String::new();
    for token in tokenize(text) {
        match token {
            Token::Identifier(name) => {
                let trimmed = preceding.trim_end();
                let member = is_member_access(trimmed) && !trimmed.ends_with("this->");
                if !member {
                    if let Some((a, b)) = parse_jacobian_block_name(name, &is_variable) {
                        parts.insert((a.to_string(), b.to_string()));
                    }
                }
                preceding.push_str(name);
            }
            Token::Other(s) => preceding.push_str(s),
        }
    }
    parts
}

/// Whether the identifier `name` occurs in `text`.
pub fn mentions(text: &str, name: &str) -> bool {
    tokenize(text)
        .into_iter()
        .any(|token| token == Token::Identifier(name))
}

/// Residuals `f<v>` referenced in `text`, for declared variables `v`.
pub fn residuals_used<'a>(text: &str, variables: &'a [IntegrationVariable]) -> Vec<&'a str> {
    let names: BTreeSet<&str> = tokenize(text)
        .into_iter()
        .filter_map(|token| match token {
            Token::Identifier(name) => Some(name),
            Token::Other(_) => None,
        })
        .collect();
    variables
        .iter()
        .map(|v| v.name())
        .filter(|v| names.contains(residual_name(v).as_str()))
        .collect()
}

/// Statements normalising the increments written by `@Predictor`.
pub fn predictor_epilogue(variables: &[IntegrationVariable], normalisation: &NormalizationRegistry) -> Vec<String> {
    variables
        .iter()
        .filter_map(|v| {
            normalisation
                .factor_for(v.name(), Side::Unknown)
                .map(|s| format!("this->{} *= real(1)/({});", v.increment_name(), s))
        })
        .collect()
}
