/// Column names declared in an INSERT INTO clause, in order.
fn extract_insert_columns(tokens: &[Token]) -> Vec<String> {
    let mut columns = Vec::new();
    let Some(open) = tokens.iter().position(|t| t.kind == TokenKind::OpenParen) else {
        return columns;
    };
    let mut depth = 0usize;
    for token in &tokens[open..] {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            TokenKind::Word if depth == 1 => columns.push(token.text.clone()),
            _ => {}
        }
    }
    columns
}

/// Column names assigned in a SET clause: words directly followed by `=`.
fn extract_set_columns(tokens: &[Token]) -> Vec<String> {
    let mut columns = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Word {
            continue;
        }
        let Some(next) = next_non_ws(tokens, index + 1) else {
            continue;
        };
        if tokens[next].kind == TokenKind::Operator && tokens[next].text == "=" {
            columns.push(token.text.clone());
        }
    }
    columns
}

/// An authored LIMIT clause keeps its value as the fallback arm of a system
/// limit conditional, so the runtime can override pagination.
fn append_limit_clause(
    builder: &mut InstructionBuilder<'_>,
    tokens: &[Token],
) -> Result<(), CompileError> {
    let keyword = &tokens[0];
    let mut value_start = 1;
    while value_start < tokens.len() && tokens[value_start].is_whitespace_or_comment() {
        value_start += 1;
    }

    builder.push_static(&format!("{} ", keyword.text), Some(keyword.position));
    builder.append(Instruction::IfSystemLimit);
    builder.append(Instruction::EmitSystemLimit);
    builder.append(Instruction::Else);
    builder.process(ClauseKind::Limit, &tokens[value_start..])?;
    builder.append(Instruction::End);
    Ok(())
}

fn append_offset_clause(
    builder: &mut InstructionBuilder<'_>,
    tokens: &[Token],
) -> Result<(), CompileError> {
    let keyword = &tokens[0];
    let mut value_start = 1;
    while value_start < tokens.len() && tokens[value_start].is_whitespace_or_comment() {
        value_start += 1;
    }

    builder.push_static(&format!("{} ", keyword.text), Some(keyword.position));
    builder.append(Instruction::IfSystemOffset);
    builder.append(Instruction::EmitSystemOffset);
    builder.append(Instruction::Else);
    builder.process(ClauseKind::Offset, &tokens[value_start..])?;
    builder.append(Instruction::End);
    Ok(())
}

/// Without an authored LIMIT, the whole clause only exists when the runtime
/// supplies a system limit.
fn append_system_limit(builder: &mut InstructionBuilder<'_>) {
    builder.append(Instruction::IfSystemLimit);
    builder.push_static(" LIMIT ", None);
    builder.append(Instruction::EmitSystemLimit);
    builder.append(Instruction::End);
}

fn append_system_offset(builder: &mut InstructionBuilder<'_>) {
    builder.append(Instruction::IfSystemOffset);
    builder.push_static(" OFFSET ", None);
    builder.append(Instruction::EmitSystemOffset);
    builder.append(Instruction::End);
}

/// Index of the first WHERE clause token after the keyword. The keyword is
/// emitted outside removability analysis; only the predicate content counts.
fn where_content_start(tokens: &[Token]) -> usize {
    let leads_with_keyword = tokens
        .first()
        .map(|t| t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case("WHERE"))
        .unwrap_or(false);
    if !leads_with_keyword {
        return 0;
    }
    let mut index = 1;
    while index < tokens.len() && tokens[index].is_whitespace_or_comment() {
        index += 1;
    }
    index
}

fn require_clause(
    statement: &ParsedStatement,
    kind: ClauseKind,
    label: &str,
) -> Result<(), CompileError> {
    match statement.clause(kind) {
        None => Err(CompileError::MissingClause(format!(
            "{label} clause is required"
        ))),
        Some(clause) if clause.tokens.is_empty() => Err(CompileError::ClauseNil(format!(
            "{label} clause is empty"
        ))),
        Some(_) => Ok(()),
    }
}

fn validate_structure(statement: &ParsedStatement) -> Result<(), CompileError> {
    match statement.kind {
        StatementKind::Select => require_clause(statement, ClauseKind::Select, "SELECT"),
        StatementKind::Insert => {
            require_clause(statement, ClauseKind::InsertInto, "INSERT INTO")?;
            if statement.clause(ClauseKind::Values).is_none()
                && statement.clause(ClauseKind::Select).is_none()
            {
                return Err(CompileError::MissingClause(
                    "INSERT requires a VALUES or SELECT clause".to_string(),
                ));
            }
            if let Some(values) = statement.clause(ClauseKind::Values) {
                if values.tokens.is_empty() {
                    return Err(CompileError::ClauseNil("VALUES clause is empty".to_string()));
                }
            }
            Ok(())
        }
        StatementKind::Update => {
            require_clause(statement, ClauseKind::Update, "UPDATE")?;
            require_clause(statement, ClauseKind::Set, "SET")
        }
        StatementKind::Delete => require_clause(statement, ClauseKind::DeleteFrom, "DELETE FROM"),
    }
}
