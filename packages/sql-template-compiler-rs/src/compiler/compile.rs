/// Compiles any supported statement, dispatching on the parsed kind.
pub fn compile_statement(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    match statement.kind {
        StatementKind::Select => compile_select(statement, options),
        StatementKind::Insert => compile_insert(statement, options),
        StatementKind::Update => compile_update(statement, options),
        StatementKind::Delete => compile_delete(statement, options),
    }
}

pub fn compile_select(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    ensure_kind(statement, StatementKind::Select)?;
    compile_internal(statement, options)
}

pub fn compile_insert(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    ensure_kind(statement, StatementKind::Insert)?;
    compile_internal(statement, options)
}

pub fn compile_update(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    ensure_kind(statement, StatementKind::Update)?;
    compile_internal(statement, options)
}

pub fn compile_delete(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    ensure_kind(statement, StatementKind::Delete)?;
    compile_internal(statement, options)
}

fn ensure_kind(statement: &ParsedStatement, expected: StatementKind) -> Result<(), CompileError> {
    if statement.kind != expected {
        return Err(CompileError::StatementTypeMismatch(format!(
            "expected a {expected:?} statement, got {:?}",
            statement.kind
        )));
    }
    Ok(())
}

fn compile_internal(
    statement: &ParsedStatement,
    options: &CompileOptions,
) -> Result<CompileResult, CompileError> {
    validate_structure(statement)?;

    let mut ctx = GenerationContext::new(options);
    let dialect = ctx.dialect();
    let is_select = statement.kind == StatementKind::Select;

    let mut builder = InstructionBuilder::new(&mut ctx);
    // Column tracking needs a declared column list; positional inserts are
    // passed through untouched.
    if statement.kind == StatementKind::Insert {
        if let Some(into) = statement.clause(ClauseKind::InsertInto) {
            let columns = extract_insert_columns(&into.tokens);
            if !columns.is_empty() {
                builder.set_insert_columns(columns);
            }
        }
    }

    let mut saw_limit = false;
    let mut saw_offset = false;
    let mut first = true;
    for clause in &statement.clauses {
        let tokens = rewrite_dialect(&clause.tokens, dialect);
        if !first {
            builder.push_clause_separator();
        }
        first = false;

        match clause.kind {
            ClauseKind::Where => {
                let content = where_content_start(&tokens);
                if content > 0 {
                    builder.push_static(
                        &format!("{} ", tokens[0].text),
                        Some(tokens[0].position),
                    );
                }
                builder.process(ClauseKind::Where, &tokens[content..])?;
                builder.push_boundary();
            }
            ClauseKind::Set => {
                builder.process(ClauseKind::Set, &tokens)?;
                builder.append_update_system_fields(&extract_set_columns(&tokens));
            }
            ClauseKind::Select if statement.kind == StatementKind::Insert => {
                builder.process(ClauseKind::Select, &tokens)?;
                builder.append_insert_select_system_fields();
            }
            ClauseKind::Limit if is_select && !tokens.is_empty() => {
                saw_limit = true;
                append_limit_clause(&mut builder, &tokens)?;
            }
            ClauseKind::Offset if is_select && !tokens.is_empty() => {
                saw_offset = true;
                append_offset_clause(&mut builder, &tokens)?;
            }
            kind => builder.process(kind, &tokens)?,
        }
    }

    builder.ensure_closed()?;

    if is_select {
        if !saw_limit {
            append_system_limit(&mut builder);
        }
        if !saw_offset {
            append_system_offset(&mut builder);
        }
        builder.append(Instruction::EmitSystemFor);
    }

    let output = builder.finalize();
    let mut instructions = output.instructions;
    let mut messages = output.messages;

    let where_status = match statement.kind {
        StatementKind::Insert => None,
        _ => {
            let (status, combos) = output
                .where_summary
                .unwrap_or_else(|| (WhereStatus::Fullscan, Vec::new()));
            if matches!(statement.kind, StatementKind::Update | StatementKind::Delete) {
                match status {
                    WhereStatus::Fullscan => {
                        messages.push(CompileMessage {
                            severity: Severity::Warning,
                            message: format!(
                                "{:?} statement has no restricting WHERE clause",
                                statement.kind
                            ),
                        });
                        instructions.push(Instruction::FallbackCondition {
                            critical: true,
                            fallback_combos: Vec::new(),
                        });
                    }
                    WhereStatus::Conditional => {
                        instructions.push(Instruction::FallbackCondition {
                            critical: false,
                            fallback_combos: combos,
                        });
                    }
                    WhereStatus::Exists => {}
                }
            }
            Some(status)
        }
    };

    let optimized = optimize(&instructions, dialect);
    let (expressions, environments) = ctx.into_tables();
    let template = CompiledTemplate {
        version: TEMPLATE_VERSION.to_string(),
        dialect,
        instructions: optimized,
        expressions,
        environments,
        where_status,
    };
    let template_json = serde_json::to_string(&template)?;

    Ok(CompileResult {
        template,
        template_json,
        raw_instructions: instructions,
        messages,
    })
}
