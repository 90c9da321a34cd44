use serde_json::Value;
use sql_template_compiler_rs::model::{CompiledTemplate, Dialect, Instruction, WhereStatus};
use sql_template_compiler_rs::tokens::{
    Clause, ClauseKind, DirectiveKind, ParsedStatement, Position, StatementKind, Token,
};
use sql_template_compiler_rs::{compile_statement, CompileOptions};

fn tokens(parts: &[&str]) -> Vec<Token> {
    let mut result = Vec::new();
    let mut column = 1u32;
    for part in parts {
        let position = Position::new(1, column);
        column += 1;
        let token = match *part {
            " " => Token::whitespace(position),
            "," => Token::comma(position),
            "(" => Token::open_paren(position),
            ")" => Token::close_paren(position),
            word => Token::word(word, position),
        };
        result.push(token);
    }
    result
}

fn directive(kind: DirectiveKind, condition: &str, column: u32) -> Token {
    Token::directive(kind, condition, Position::new(1, column))
}

fn filtered_select() -> ParsedStatement {
    let mut where_tokens = tokens(&["WHERE", " "]);
    where_tokens.push(directive(DirectiveKind::If, "include_status", 3));
    where_tokens.extend(tokens(&[" ", "status", " ", "="]));
    where_tokens.push(directive(DirectiveKind::Variable, "status", 8));
    where_tokens.push(directive(DirectiveKind::End, "", 9));

    ParsedStatement::new(
        StatementKind::Select,
        vec![
            Clause::new(ClauseKind::Select, tokens(&["SELECT", " ", "id"])),
            Clause::new(ClauseKind::From, tokens(&["FROM", " ", "users"])),
            Clause::new(ClauseKind::Where, where_tokens),
        ],
    )
}

#[test]
fn compilation_is_deterministic() {
    let statement = filtered_select();
    let first = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let second = compile_statement(&statement, &CompileOptions::default()).unwrap();

    assert_eq!(first.template_json, second.template_json);
    assert_eq!(first.template, second.template);
}

#[test]
fn template_json_round_trips() {
    let compiled = compile_statement(&filtered_select(), &CompileOptions::default()).unwrap();
    let parsed: CompiledTemplate = serde_json::from_str(&compiled.template_json).unwrap();
    assert_eq!(parsed, compiled.template);
}

#[test]
fn template_json_uses_tagged_ops() {
    let compiled = compile_statement(&filtered_select(), &CompileOptions::default()).unwrap();
    let value: Value = serde_json::from_str(&compiled.template_json).unwrap();

    assert_eq!(value["version"], "1");
    assert_eq!(value["dialect"], "postgres");
    assert_eq!(value["whereStatus"], "conditional");

    let ops = value["instructions"].as_array().unwrap();
    assert_eq!(ops[0]["op"], "EMIT_STATIC");
    assert!(ops
        .iter()
        .any(|op| op["op"] == "IF" && op["exprIndex"] == 0));
    assert!(ops.iter().any(|op| op["op"] == "ADD_PARAM"));
    assert!(ops.iter().any(|op| op["op"] == "EMIT_SYSTEM_FOR"));

    let expressions = value["expressions"].as_array().unwrap();
    assert_eq!(expressions[0]["expression"], "include_status");
    assert_eq!(expressions[0]["envIndex"], 0);
}

#[test]
fn dialect_changes_placeholder_style() {
    let statement = filtered_select();
    let postgres = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let sqlite = compile_statement(
        &statement,
        &CompileOptions {
            dialect: Dialect::Sqlite,
            ..Default::default()
        },
    )
    .unwrap();

    let placeholder = |template: &CompiledTemplate, needle: &str| {
        template.instructions.iter().any(|op| {
            matches!(op, Instruction::EmitStatic { value, .. } if value.contains(needle))
        })
    };
    assert!(placeholder(&postgres.template, "$1"));
    assert!(placeholder(&sqlite.template, "?"));
    assert!(!placeholder(&sqlite.template, "$1"));
}

#[test]
fn raw_instructions_keep_pre_optimizer_shape() {
    let compiled = compile_statement(&filtered_select(), &CompileOptions::default()).unwrap();

    assert!(compiled
        .raw_instructions
        .iter()
        .any(|op| matches!(op, Instruction::EmitEval { .. })));
    assert!(!compiled
        .raw_instructions
        .iter()
        .any(|op| matches!(op, Instruction::AddParam { .. })));
    assert_eq!(compiled.template.where_status, Some(WhereStatus::Conditional));
}
