use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tokens::Position;
use crate::{EvalResultType, TypeDescriptor};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgres,
    Mysql,
    Mariadb,
    Sqlite,
}

impl Dialect {
    /// Whether placeholders are numbered (`$1, $2, ...`) instead of `?`.
    pub fn numbered_placeholders(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::Postgres
    }
}

/// One step of the compiled, linear intermediate representation.
///
/// The instruction stream is replayed by an external runtime executor against
/// live parameter values; everything here is plain data and serializes with an
/// `op` tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op")]
pub enum Instruction {
    #[serde(rename = "EMIT_STATIC")]
    EmitStatic {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },
    #[serde(rename = "EMIT_EVAL")]
    EmitEval {
        #[serde(rename = "exprIndex")]
        expr_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },
    /// Emits `value` unless the next thing the executor reaches is a
    /// `Boundary`, in which case the text is discarded.
    #[serde(rename = "EMIT_UNLESS_BOUNDARY")]
    EmitUnlessBoundary {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },
    #[serde(rename = "BOUNDARY")]
    Boundary,
    #[serde(rename = "IF")]
    If {
        #[serde(rename = "exprIndex")]
        expr_index: usize,
    },
    #[serde(rename = "ELSE_IF")]
    ElseIf {
        #[serde(rename = "exprIndex")]
        expr_index: usize,
    },
    #[serde(rename = "ELSE")]
    Else,
    #[serde(rename = "END")]
    End,
    #[serde(rename = "LOOP_START")]
    LoopStart {
        variable: String,
        #[serde(rename = "collectionExprIndex")]
        collection_expr_index: usize,
        #[serde(rename = "envIndex")]
        env_index: usize,
    },
    /// `env_index` refers to the environment that becomes current again after
    /// the loop, i.e. the parent of the matching `LoopStart` environment.
    #[serde(rename = "LOOP_END")]
    LoopEnd {
        #[serde(rename = "envIndex")]
        env_index: usize,
    },
    #[serde(rename = "EMIT_SYSTEM_VALUE")]
    EmitSystemValue {
        field: String,
        #[serde(rename = "defaultValue", skip_serializing_if = "Option::is_none")]
        default_value: Option<String>,
    },
    #[serde(rename = "IF_SYSTEM_LIMIT")]
    IfSystemLimit,
    #[serde(rename = "IF_SYSTEM_OFFSET")]
    IfSystemOffset,
    #[serde(rename = "EMIT_SYSTEM_LIMIT")]
    EmitSystemLimit,
    #[serde(rename = "EMIT_SYSTEM_OFFSET")]
    EmitSystemOffset,
    #[serde(rename = "EMIT_SYSTEM_FOR")]
    EmitSystemFor,
    /// Mutation guard. `critical` means the WHERE clause is unconditionally
    /// removable; otherwise `fallback_combos` lists every combination of
    /// branch outcomes under which it vanishes.
    #[serde(rename = "FALLBACK_CONDITION")]
    FallbackCondition {
        critical: bool,
        #[serde(rename = "fallbackCombos")]
        fallback_combos: Vec<Vec<RemovalLiteral>>,
    },
    /// Optimizer-emitted: bind the value of an expression as the next
    /// positional parameter.
    #[serde(rename = "ADD_PARAM")]
    AddParam {
        #[serde(rename = "exprIndex")]
        expr_index: usize,
    },
}

/// De-duplicated template expression. Identical text in the same environment
/// shares one slot; the same text in a different environment does not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expression {
    pub id: usize,
    pub expression: String,
    #[serde(rename = "envIndex")]
    pub env_index: usize,
    pub position: Position,
    #[serde(rename = "typeDescriptor", skip_serializing_if = "Option::is_none")]
    pub type_descriptor: Option<TypeDescriptor>,
    #[serde(rename = "resultType")]
    pub result_type: EvalResultType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVariable {
    pub name: String,
    pub descriptor: TypeDescriptor,
    #[serde(rename = "sampleValue")]
    pub sample_value: Value,
}

/// Lexical scope node. Environment 0 is the statement root; each `for`
/// directive allocates exactly one child environment holding the loop
/// variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Environment {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    pub variables: Vec<EnvVariable>,
    pub label: String,
}

/// "The WHERE clause is empty" requires expression `expr_index` to evaluate
/// to `when`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemovalLiteral {
    #[serde(rename = "exprIndex")]
    pub expr_index: usize,
    pub when: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhereStatus {
    /// Unconditionally removable, or no WHERE clause exists at all.
    Fullscan,
    /// Never removable.
    Exists,
    /// Removable only under specific branch-truth combinations.
    Conditional,
}

/// The serializable compilation output consumed by the runtime executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledTemplate {
    pub version: String,
    pub dialect: Dialect,
    pub instructions: Vec<Instruction>,
    pub expressions: Vec<Expression>,
    pub environments: Vec<Environment>,
    #[serde(rename = "whereStatus", skip_serializing_if = "Option::is_none")]
    pub where_status: Option<WhereStatus>,
}

pub const TEMPLATE_VERSION: &str = "1";
