use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub mod model;
pub mod tokens;

#[cfg(feature = "node")]
mod node_bindings;

use model::{
    CompiledTemplate, Dialect, EnvVariable, Environment, Expression, Instruction, RemovalLiteral,
    WhereStatus, TEMPLATE_VERSION,
};
use tokens::{
    ClauseKind, Directive, DirectiveKind, ParsedStatement, Position, StatementKind, Token,
    TokenKind,
};

pub type JsonMap = serde_json::Map<String, Value>;

/// Per-compilation settings: target dialect, system field configuration, and
/// the statically-known types of the template function's parameters and
/// directive expressions.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    pub config: Option<Config>,
    pub function: Option<FunctionDefinition>,
    pub type_overrides: HashMap<Position, TypeDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Severity {
    Warning,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompileMessage {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CompileResult {
    pub template: CompiledTemplate,
    pub template_json: String,
    /// The instruction stream before the optimizer ran, kept for inspection.
    pub raw_instructions: Vec<Instruction>,
    pub messages: Vec<CompileMessage>,
}

include!("compiler/typedesc.rs");
include!("compiler/context.rs");
include!("compiler/removability.rs");
include!("compiler/dialect.rs");
include!("compiler/builder.rs");
include!("compiler/finalize.rs");
include!("compiler/auto_expand.rs");
include!("compiler/system_fields.rs");
include!("compiler/optimizer.rs");
include!("compiler/statements.rs");
include!("compiler/compile.rs");

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("directive mismatch: {0}")]
    DirectiveMismatch(String),
    #[error("malformed loop directive: {0}")]
    LoopMismatch(String),
    #[error("loop nesting too deep: {0}")]
    LoopNesting(String),
    #[error("empty clause: {0}")]
    ClauseNil(String),
    #[error("missing clause: {0}")]
    MissingClause(String),
    #[error("statement type mismatch: {0}")]
    StatementTypeMismatch(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    include!("compiler/tests_internal.rs");
}
