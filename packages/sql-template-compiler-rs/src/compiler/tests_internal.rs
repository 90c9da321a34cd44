struct Tokens {
    items: Vec<Token>,
    column: u32,
}

impl Tokens {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            column: 1,
        }
    }

    fn next(&mut self) -> Position {
        let position = Position::new(1, self.column);
        self.column += 1;
        position
    }

    fn word(mut self, text: &str) -> Self {
        let position = self.next();
        self.items.push(Token::word(text, position));
        self
    }

    fn ws(mut self) -> Self {
        let position = self.next();
        self.items.push(Token::whitespace(position));
        self
    }

    fn comma(mut self) -> Self {
        let position = self.next();
        self.items.push(Token::comma(position));
        self
    }

    fn open(mut self) -> Self {
        let position = self.next();
        self.items.push(Token::open_paren(position));
        self
    }

    fn close(mut self) -> Self {
        let position = self.next();
        self.items.push(Token::close_paren(position));
        self
    }

    fn op(mut self, text: &str) -> Self {
        let position = self.next();
        self.items.push(Token::new(TokenKind::Operator, text, position));
        self
    }

    fn number(mut self, text: &str) -> Self {
        let position = self.next();
        self.items.push(Token::new(TokenKind::Number, text, position));
        self
    }

    fn dummy(mut self, text: &str) -> Self {
        let position = self.next();
        self.items
            .push(Token::new(TokenKind::DummyLiteral, text, position));
        self
    }

    fn directive(mut self, kind: DirectiveKind, condition: &str) -> Self {
        let position = self.next();
        self.items.push(Token::directive(kind, condition, position));
        self
    }

    fn build(self) -> Vec<Token> {
        self.items
    }
}

fn parsed(kind: StatementKind, clauses: Vec<(ClauseKind, Tokens)>) -> ParsedStatement {
    ParsedStatement::new(
        kind,
        clauses
            .into_iter()
            .map(|(kind, stream)| tokens::Clause::new(kind, stream.build()))
            .collect(),
    )
}

fn options(dialect: Dialect) -> CompileOptions {
    CompileOptions {
        dialect,
        ..Default::default()
    }
}

fn rendered(tokens: &[Token]) -> String {
    tokens.iter().map(|t| t.text.as_str()).collect()
}

fn static_value(instruction: &Instruction) -> &str {
    match instruction {
        Instruction::EmitStatic { value, .. } => value,
        other => panic!("expected EmitStatic, got {other:?}"),
    }
}

#[test]
fn compiles_select_with_conditional_where() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("users")),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .directive(DirectiveKind::If, "cond")
                    .ws()
                    .word("status")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "active")
                    .ws()
                    .directive(DirectiveKind::End, ""),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let ops = &compiled.template.instructions;

    assert_eq!(ops.len(), 16);
    assert_eq!(static_value(&ops[0]), "SELECT id FROM users WHERE ");
    assert!(matches!(ops[1], Instruction::If { expr_index: 0 }));
    assert_eq!(static_value(&ops[2]), " status = $1");
    assert!(matches!(ops[3], Instruction::AddParam { expr_index: 1 }));
    assert!(matches!(ops[5], Instruction::End));
    assert!(matches!(ops[6], Instruction::Boundary));
    assert!(matches!(ops[7], Instruction::IfSystemLimit));
    assert_eq!(static_value(&ops[8]), " LIMIT ");
    assert!(matches!(ops[11], Instruction::IfSystemOffset));
    assert!(matches!(ops[15], Instruction::EmitSystemFor));

    assert_eq!(compiled.template.where_status, Some(WhereStatus::Conditional));
    assert_eq!(compiled.template.version, "1");
    assert_eq!(compiled.template.expressions.len(), 2);
    assert_eq!(compiled.template.expressions[0].expression, "cond");
    assert_eq!(compiled.template.expressions[1].expression, "active");
    assert!(compiled.messages.is_empty());
}

#[test]
fn compiles_insert_with_values_loop() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("logs")
                    .ws()
                    .open()
                    .word("id")
                    .comma()
                    .ws()
                    .word("name")
                    .close(),
            ),
            (
                ClauseKind::Values,
                Tokens::new()
                    .word("VALUES")
                    .ws()
                    .directive(DirectiveKind::For, "row : rows")
                    .ws()
                    .open()
                    .directive(DirectiveKind::Variable, "row.id")
                    .dummy("1")
                    .comma()
                    .ws()
                    .directive(DirectiveKind::Variable, "row.name")
                    .dummy("'x'")
                    .ws()
                    .close()
                    .ws()
                    .directive(DirectiveKind::End, ""),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &options(Dialect::Mysql)).unwrap();
    let ops = &compiled.template.instructions;

    assert_eq!(ops.len(), 10);
    assert_eq!(static_value(&ops[0]), "INSERT INTO logs (id, name) VALUES ");
    assert!(matches!(
        &ops[1],
        Instruction::LoopStart {
            variable,
            collection_expr_index: 0,
            env_index: 1,
        } if variable == "row"
    ));
    assert_eq!(static_value(&ops[2]), " (?");
    assert!(matches!(ops[3], Instruction::AddParam { expr_index: 1 }));
    assert_eq!(static_value(&ops[4]), ", ?");
    assert!(matches!(ops[5], Instruction::AddParam { expr_index: 2 }));
    assert!(matches!(
        &ops[7],
        Instruction::EmitUnlessBoundary { value, .. } if value == ", "
    ));
    assert!(matches!(ops[8], Instruction::LoopEnd { env_index: 0 }));
    assert!(matches!(ops[9], Instruction::Boundary));

    assert_eq!(compiled.template.where_status, None);
    assert_eq!(compiled.template.environments.len(), 2);
    assert_eq!(compiled.template.environments[1].parent, Some(0));
    assert_eq!(compiled.template.environments[1].label, "for:row");
    assert_eq!(compiled.template.expressions[0].expression, "rows");
    assert_eq!(compiled.template.expressions[1].env_index, 1);
}

#[test]
fn nested_values_loops_synthesize_one_tuple_separator() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("t")
                    .ws()
                    .open()
                    .word("a")
                    .close(),
            ),
            (
                ClauseKind::Values,
                Tokens::new()
                    .word("VALUES")
                    .ws()
                    .directive(DirectiveKind::For, "batch : batches")
                    .ws()
                    .directive(DirectiveKind::For, "row : batch")
                    .ws()
                    .open()
                    .directive(DirectiveKind::Variable, "row.a")
                    .dummy("1")
                    .close()
                    .ws()
                    .directive(DirectiveKind::End, "")
                    .ws()
                    .directive(DirectiveKind::End, ""),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &options(Dialect::Mysql)).unwrap();
    let ops = &compiled.template.instructions;

    let separators: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter_map(|(index, op)| {
            matches!(op, Instruction::EmitUnlessBoundary { .. }).then_some(index)
        })
        .collect();
    assert_eq!(separators.len(), 1);
    // Only the outermost loop separates tuples; the inner one closes
    // mid-tuple and gets nothing.
    assert!(matches!(ops[7], Instruction::LoopEnd { env_index: 1 }));
    assert!(!matches!(ops[6], Instruction::EmitUnlessBoundary { .. }));
    assert_eq!(separators[0] + 1, 10);
    assert!(matches!(ops[10], Instruction::LoopEnd { env_index: 0 }));
}

#[test]
fn update_without_where_gets_critical_fallback() {
    let statement = parsed(
        StatementKind::Update,
        vec![
            (ClauseKind::Update, Tokens::new().word("UPDATE").ws().word("users")),
            (
                ClauseKind::Set,
                Tokens::new()
                    .word("SET")
                    .ws()
                    .word("name")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "name")
                    .dummy("'x'"),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();

    assert_eq!(compiled.template.where_status, Some(WhereStatus::Fullscan));
    assert_eq!(
        compiled.template.instructions.last(),
        Some(&Instruction::FallbackCondition {
            critical: true,
            fallback_combos: Vec::new(),
        })
    );
    assert_eq!(compiled.messages.len(), 1);
    assert_eq!(compiled.messages[0].severity, Severity::Warning);
}

#[test]
fn update_with_unremovable_where_has_no_fallback() {
    let statement = parsed(
        StatementKind::Update,
        vec![
            (ClauseKind::Update, Tokens::new().word("UPDATE").ws().word("users")),
            (
                ClauseKind::Set,
                Tokens::new()
                    .word("SET")
                    .ws()
                    .word("name")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "name"),
            ),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .directive(DirectiveKind::If, "cond")
                    .ws()
                    .word("a")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "x")
                    .ws()
                    .directive(DirectiveKind::Else, "")
                    .ws()
                    .word("b")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "y")
                    .ws()
                    .directive(DirectiveKind::End, ""),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();

    assert_eq!(compiled.template.where_status, Some(WhereStatus::Exists));
    assert!(!compiled
        .template
        .instructions
        .iter()
        .any(|op| matches!(op, Instruction::FallbackCondition { .. })));
}

#[test]
fn delete_with_conditional_where_lists_removal_combos() {
    let statement = parsed(
        StatementKind::Delete,
        vec![
            (
                ClauseKind::DeleteFrom,
                Tokens::new()
                    .word("DELETE")
                    .ws()
                    .word("FROM")
                    .ws()
                    .word("users"),
            ),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .directive(DirectiveKind::If, "cond")
                    .ws()
                    .word("status")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "active")
                    .ws()
                    .directive(DirectiveKind::End, ""),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();

    assert_eq!(compiled.template.where_status, Some(WhereStatus::Conditional));
    assert_eq!(
        compiled.template.instructions.last(),
        Some(&Instruction::FallbackCondition {
            critical: false,
            fallback_combos: vec![vec![RemovalLiteral {
                expr_index: 0,
                when: false,
            }]],
        })
    );
    assert!(compiled.messages.is_empty());
}

#[test]
fn static_where_predicate_is_never_removable() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .number("1")
                    .op("=")
                    .number("1"),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    assert_eq!(compiled.template.where_status, Some(WhereStatus::Exists));
}

#[test]
fn select_without_where_is_fullscan() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    assert_eq!(compiled.template.where_status, Some(WhereStatus::Fullscan));
    assert!(!compiled
        .template
        .instructions
        .iter()
        .any(|op| matches!(op, Instruction::FallbackCondition { .. })));
}

#[test]
fn deduplicates_expressions_per_environment() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .word("a")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "p")
                    .ws()
                    .word("AND")
                    .ws()
                    .word("b")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "p"),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    assert_eq!(compiled.template.expressions.len(), 1);
    let bindings = compiled
        .template
        .instructions
        .iter()
        .filter(|op| matches!(op, Instruction::AddParam { expr_index: 0 }))
        .count();
    assert_eq!(bindings, 2);
}

#[test]
fn same_expression_in_loop_scope_is_a_new_slot() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::Variable, "x")
                .ws()
                .directive(DirectiveKind::For, "r : xs")
                .ws()
                .directive(DirectiveKind::Variable, "x")
                .ws()
                .directive(DirectiveKind::End, ""),
        )],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let expressions = &compiled.template.expressions;
    assert_eq!(expressions.len(), 3);
    assert_eq!(expressions[0].expression, "x");
    assert_eq!(expressions[0].env_index, 0);
    assert_eq!(expressions[1].expression, "xs");
    assert_eq!(expressions[2].expression, "x");
    assert_eq!(expressions[2].env_index, 1);
}

#[test]
fn closes_conditional_inside_loop_before_the_loop() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::For, "r : rows")
                .ws()
                .directive(DirectiveKind::If, "c")
                .ws()
                .word("x")
                .ws()
                .directive(DirectiveKind::End, "")
                .ws()
                .directive(DirectiveKind::End, ""),
        )],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let ops = &compiled.template.instructions;

    assert_eq!(ops.len(), 18);
    assert!(matches!(
        &ops[1],
        Instruction::LoopStart {
            collection_expr_index: 0,
            env_index: 1,
            ..
        }
    ));
    assert!(matches!(ops[3], Instruction::If { expr_index: 1 }));
    assert_eq!(static_value(&ops[4]), " x ");
    assert!(matches!(ops[5], Instruction::End));
    assert!(matches!(ops[7], Instruction::LoopEnd { env_index: 0 }));
    assert_eq!(compiled.template.expressions[1].expression, "c");
    assert_eq!(compiled.template.expressions[1].env_index, 1);
}

#[test]
fn loop_conditionals_do_not_mask_where_predicates() {
    let statement = parsed(
        StatementKind::Delete,
        vec![
            (
                ClauseKind::DeleteFrom,
                Tokens::new().word("DELETE").ws().word("FROM").ws().word("t"),
            ),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .word("id")
                    .ws()
                    .word("IN")
                    .ws()
                    .open()
                    .directive(DirectiveKind::For, "v : ids")
                    .ws()
                    .directive(DirectiveKind::If, "flag")
                    .ws()
                    .directive(DirectiveKind::Variable, "v")
                    .ws()
                    .directive(DirectiveKind::End, "")
                    .ws()
                    .directive(DirectiveKind::End, "")
                    .close()
                    .ws()
                    .word("AND")
                    .ws()
                    .word("active")
                    .ws()
                    .op("=")
                    .ws()
                    .number("1"),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();

    // The `active = 1` predicate outside the loop always restricts the
    // statement, whatever the conditional inside the loop body does.
    assert_eq!(compiled.template.where_status, Some(WhereStatus::Exists));
    assert!(!compiled
        .template
        .instructions
        .iter()
        .any(|op| matches!(op, Instruction::FallbackCondition { .. })));
    assert!(compiled.messages.is_empty());
}

#[test]
fn rejects_unmatched_end_directive() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::End, ""),
        )],
    );

    let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::DirectiveMismatch(_)));
}

#[test]
fn rejects_unclosed_directives() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::If, "c")
                .word("id"),
        )],
    );

    let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::DirectiveMismatch(_)));
}

#[test]
fn rejects_else_after_else() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::If, "c")
                .word("a")
                .directive(DirectiveKind::Else, "")
                .word("b")
                .directive(DirectiveKind::Else, "")
                .word("c")
                .directive(DirectiveKind::End, ""),
        )],
    );

    let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::DirectiveMismatch(_)));
}

#[test]
fn rejects_elseif_crossing_a_loop_boundary() {
    let statement = parsed(
        StatementKind::Select,
        vec![(
            ClauseKind::Select,
            Tokens::new()
                .word("SELECT")
                .ws()
                .directive(DirectiveKind::If, "c")
                .directive(DirectiveKind::For, "x : xs")
                .directive(DirectiveKind::ElseIf, "d"),
        )],
    );

    let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::DirectiveMismatch(_)));
}

#[test]
fn rejects_malformed_for_directives() {
    for condition in ["rows", "a : b : c", " : rows", "row : "] {
        let statement = parsed(
            StatementKind::Select,
            vec![(
                ClauseKind::Select,
                Tokens::new()
                    .word("SELECT")
                    .ws()
                    .directive(DirectiveKind::For, condition),
            )],
        );
        let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::LoopMismatch(_)), "{condition}");
    }
}

#[test]
fn rejects_excessive_loop_nesting() {
    let mut stream = Tokens::new().word("SELECT").ws();
    for index in 0..11 {
        stream = stream.directive(DirectiveKind::For, &format!("v{index} : source{index}"));
    }
    let statement = parsed(StatementKind::Select, vec![(ClauseKind::Select, stream)]);

    let err = compile_statement(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::LoopNesting(_)));
}

#[test]
fn rejects_missing_and_empty_clauses() {
    let no_set = parsed(
        StatementKind::Update,
        vec![(ClauseKind::Update, Tokens::new().word("UPDATE").ws().word("t"))],
    );
    assert!(matches!(
        compile_statement(&no_set, &CompileOptions::default()),
        Err(CompileError::MissingClause(_))
    ));

    let no_values = parsed(
        StatementKind::Insert,
        vec![(
            ClauseKind::InsertInto,
            Tokens::new().word("INSERT").ws().word("INTO").ws().word("t"),
        )],
    );
    assert!(matches!(
        compile_statement(&no_values, &CompileOptions::default()),
        Err(CompileError::MissingClause(_))
    ));

    let empty_select = parsed(StatementKind::Select, vec![(ClauseKind::Select, Tokens::new())]);
    assert!(matches!(
        compile_statement(&empty_select, &CompileOptions::default()),
        Err(CompileError::ClauseNil(_))
    ));
}

#[test]
fn entry_points_check_statement_kind() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new().word("INSERT").ws().word("INTO").ws().word("t"),
            ),
            (ClauseKind::Values, Tokens::new().word("VALUES")),
        ],
    );

    let err = compile_select(&statement, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::StatementTypeMismatch(_)));
}

#[test]
fn combo_algebra_prunes_contradictions() {
    let a = vec![vec![RemovalLiteral {
        expr_index: 0,
        when: true,
    }]];
    let b = vec![vec![RemovalLiteral {
        expr_index: 0,
        when: false,
    }]];
    assert!(combos_and(&a, &b).is_empty());
    assert_eq!(combos_or(&a, &a).len(), 1);

    let always: RemovalComboSet = vec![Vec::new()];
    assert_eq!(combos_and(&always, &a), a);
    let never: RemovalComboSet = Vec::new();
    assert!(combos_and(&never, &a).is_empty());
}

#[test]
fn rewrites_cast_per_dialect() {
    let source = Tokens::new()
        .word("CAST")
        .ws()
        .open()
        .word("price")
        .ws()
        .word("AS")
        .ws()
        .word("int")
        .close()
        .build();
    let postgres = rewrite_dialect(&source, Dialect::Postgres);
    assert_eq!(rendered(&postgres), "(price)::int");

    let inline = Tokens::new()
        .open()
        .word("price")
        .close()
        .op("::")
        .word("int")
        .build();
    let mysql = rewrite_dialect(&inline, Dialect::Mysql);
    assert_eq!(rendered(&mysql), "CAST(price AS int)");

    // Re-running on canonical output is a no-op.
    assert_eq!(rewrite_dialect(&postgres, Dialect::Postgres), postgres);
    assert_eq!(rewrite_dialect(&mysql, Dialect::Mysql), mysql);
}

#[test]
fn rewrites_time_and_date_functions() {
    let now = Tokens::new().word("NOW").open().close().build();
    assert_eq!(
        rendered(&rewrite_dialect(&now, Dialect::Postgres)),
        "CURRENT_TIMESTAMP"
    );
    assert_eq!(
        rendered(&rewrite_dialect(&now, Dialect::Sqlite)),
        "CURRENT_TIMESTAMP"
    );

    let canonical = Tokens::new().word("CURRENT_TIMESTAMP").build();
    assert_eq!(
        rendered(&rewrite_dialect(&canonical, Dialect::Mysql)),
        "NOW()"
    );

    let curdate = Tokens::new().word("CURDATE").open().close().build();
    assert_eq!(
        rendered(&rewrite_dialect(&curdate, Dialect::Postgres)),
        "CURRENT_DATE"
    );
    let current_time = Tokens::new().word("CURRENT_TIME").build();
    assert_eq!(
        rendered(&rewrite_dialect(&current_time, Dialect::Mariadb)),
        "CURTIME()"
    );
}

#[test]
fn rewrites_boolean_literals_for_sqlite_only() {
    let source = Tokens::new()
        .word("active")
        .ws()
        .op("=")
        .ws()
        .word("TRUE")
        .build();
    assert_eq!(
        rendered(&rewrite_dialect(&source, Dialect::Sqlite)),
        "active = 1"
    );
    assert_eq!(
        rendered(&rewrite_dialect(&source, Dialect::Postgres)),
        "active = TRUE"
    );

    let negative = Tokens::new().word("FALSE").build();
    assert_eq!(rendered(&rewrite_dialect(&negative, Dialect::Sqlite)), "0");
}

#[test]
fn rewrites_concat_per_dialect() {
    let call = Tokens::new()
        .word("CONCAT")
        .open()
        .word("a")
        .comma()
        .ws()
        .word("b")
        .close()
        .build();
    assert_eq!(
        rendered(&rewrite_dialect(&call, Dialect::Postgres)),
        "a || b"
    );

    let chain = Tokens::new()
        .word("a")
        .ws()
        .op("||")
        .ws()
        .word("b")
        .ws()
        .op("||")
        .ws()
        .word("c")
        .build();
    assert_eq!(
        rendered(&rewrite_dialect(&chain, Dialect::Mysql)),
        "CONCAT(a, b, c)"
    );
}

#[test]
fn strips_redundant_outer_joins() {
    let source = Tokens::new()
        .word("LEFT")
        .ws()
        .word("OUTER")
        .ws()
        .word("JOIN")
        .ws()
        .word("t")
        .build();
    assert_eq!(
        rendered(&rewrite_dialect(&source, Dialect::Postgres)),
        "LEFT JOIN t"
    );
}

#[test]
fn renumbers_placeholders_outside_quotes() {
    let optimized = optimize(
        &[Instruction::EmitStatic {
            value: "SELECT '?' || ?, ?".to_string(),
            position: None,
        }],
        Dialect::Postgres,
    );
    assert_eq!(static_value(&optimized[0]), "SELECT '?' || $1, $2");

    let untouched = optimize(
        &[Instruction::EmitStatic {
            value: "a = ?".to_string(),
            position: None,
        }],
        Dialect::Mysql,
    );
    assert_eq!(static_value(&untouched[0]), "a = ?");
}

#[test]
fn demotes_all_but_last_separator_in_loop_body() {
    let instructions = vec![
        Instruction::LoopStart {
            variable: "v".to_string(),
            collection_expr_index: 0,
            env_index: 1,
        },
        Instruction::EmitUnlessBoundary {
            value: "a".to_string(),
            position: None,
        },
        Instruction::EmitUnlessBoundary {
            value: "b".to_string(),
            position: None,
        },
        Instruction::LoopEnd { env_index: 0 },
    ];

    let result = optimize_loop_boundaries(instructions);
    assert!(matches!(
        &result[1],
        Instruction::EmitStatic { value, .. } if value == "a"
    ));
    assert!(matches!(
        &result[2],
        Instruction::EmitUnlessBoundary { value, .. } if value == "b"
    ));
}

#[test]
fn keeps_authored_limit_as_fallback_arm() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
            (ClauseKind::Limit, Tokens::new().word("LIMIT").ws().number("10")),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    let ops = &compiled.template.instructions;

    assert_eq!(ops.len(), 11);
    assert_eq!(static_value(&ops[0]), "SELECT id FROM t LIMIT ");
    assert!(matches!(ops[1], Instruction::IfSystemLimit));
    assert!(matches!(ops[2], Instruction::EmitSystemLimit));
    assert!(matches!(ops[3], Instruction::Else));
    assert_eq!(static_value(&ops[4]), "10");
    assert!(matches!(ops[5], Instruction::End));
    assert!(matches!(ops[6], Instruction::IfSystemOffset));
    assert!(matches!(ops[10], Instruction::EmitSystemFor));
}

#[test]
fn prunes_empty_system_limit_fallback_arm() {
    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
            (ClauseKind::Limit, Tokens::new().word("LIMIT")),
        ],
    );

    let compiled = compile_statement(&statement, &CompileOptions::default()).unwrap();
    assert!(!compiled
        .template
        .instructions
        .iter()
        .any(|op| matches!(op, Instruction::Else)));
}

fn audit_config() -> Config {
    Config {
        system_fields: vec![
            SystemFieldConfig {
                name: "created_at".to_string(),
                field_type: "timestamp".to_string(),
                on_insert: Some(SystemFieldSource::Default {
                    value: "NOW()".to_string(),
                }),
                on_update: None,
            },
            SystemFieldConfig {
                name: "updated_at".to_string(),
                field_type: "timestamp".to_string(),
                on_insert: Some(SystemFieldSource::Default {
                    value: "NOW()".to_string(),
                }),
                on_update: Some(SystemFieldSource::Default {
                    value: "NOW()".to_string(),
                }),
            },
        ],
    }
}

#[test]
fn injects_system_fields_into_insert() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("logs")
                    .ws()
                    .open()
                    .word("id")
                    .close(),
            ),
            (
                ClauseKind::Values,
                Tokens::new()
                    .word("VALUES")
                    .ws()
                    .open()
                    .directive(DirectiveKind::Variable, "id")
                    .dummy("1")
                    .close(),
            ),
        ],
    );
    let compile_options = CompileOptions {
        config: Some(audit_config()),
        ..Default::default()
    };

    let compiled = compile_statement(&statement, &compile_options).unwrap();
    let ops = &compiled.template.instructions;

    assert!(static_value(&ops[0])
        .starts_with("INSERT INTO logs (id, created_at, updated_at) VALUES ("));
    let injected: Vec<&Instruction> = ops
        .iter()
        .filter(|op| matches!(op, Instruction::EmitSystemValue { .. }))
        .collect();
    assert_eq!(injected.len(), 2);
    assert_eq!(
        injected[0],
        &Instruction::EmitSystemValue {
            field: "created_at".to_string(),
            default_value: Some("CURRENT_TIMESTAMP".to_string()),
        }
    );
}

#[test]
fn injects_system_fields_into_insert_select() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("logs")
                    .ws()
                    .open()
                    .word("id")
                    .close(),
            ),
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("src")),
        ],
    );
    let compile_options = CompileOptions {
        config: Some(audit_config()),
        ..Default::default()
    };

    let compiled = compile_statement(&statement, &compile_options).unwrap();
    let ops = &compiled.template.instructions;

    assert_eq!(ops.len(), 5);
    assert_eq!(
        static_value(&ops[0]),
        "INSERT INTO logs (id, created_at, updated_at) SELECT id, "
    );
    assert_eq!(
        ops[1],
        Instruction::EmitSystemValue {
            field: "created_at".to_string(),
            default_value: Some("CURRENT_TIMESTAMP".to_string()),
        }
    );
    assert_eq!(static_value(&ops[2]), ", ");
    assert!(matches!(
        &ops[3],
        Instruction::EmitSystemValue { field, .. } if field == "updated_at"
    ));
    assert_eq!(static_value(&ops[4]), " FROM src");
}

#[test]
fn explicit_system_column_is_not_injected_twice() {
    let statement = parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("logs")
                    .ws()
                    .open()
                    .word("id")
                    .comma()
                    .ws()
                    .word("created_at")
                    .close(),
            ),
            (
                ClauseKind::Values,
                Tokens::new()
                    .word("VALUES")
                    .ws()
                    .open()
                    .directive(DirectiveKind::Variable, "id")
                    .comma()
                    .ws()
                    .word("CURRENT_TIMESTAMP")
                    .close(),
            ),
        ],
    );
    let compile_options = CompileOptions {
        config: Some(audit_config()),
        ..Default::default()
    };

    let compiled = compile_statement(&statement, &compile_options).unwrap();
    let injected: Vec<String> = compiled
        .template
        .instructions
        .iter()
        .filter_map(|op| match op {
            Instruction::EmitSystemValue { field, .. } => Some(field.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(injected, vec!["updated_at".to_string()]);
}

#[test]
fn appends_on_update_system_fields_to_set() {
    let statement = parsed(
        StatementKind::Update,
        vec![
            (ClauseKind::Update, Tokens::new().word("UPDATE").ws().word("users")),
            (
                ClauseKind::Set,
                Tokens::new()
                    .word("SET")
                    .ws()
                    .word("name")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "name"),
            ),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .word("id")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "id"),
            ),
        ],
    );
    let compile_options = CompileOptions {
        config: Some(audit_config()),
        ..Default::default()
    };

    let compiled = compile_statement(&statement, &compile_options).unwrap();
    let ops = &compiled.template.instructions;

    assert!(ops.iter().any(
        |op| matches!(op, Instruction::EmitStatic { value, .. } if value.contains(", updated_at = "))
    ));
    assert!(ops.iter().any(|op| matches!(
        op,
        Instruction::EmitSystemValue { field, .. } if field == "updated_at"
    )));
    assert!(!ops.iter().any(|op| matches!(
        op,
        Instruction::EmitSystemValue { field, .. } if field == "created_at"
    )));
    assert!(compiled.messages.is_empty());
}

fn rows_function(fields: Vec<(&str, TypeDescriptor)>) -> FunctionDefinition {
    FunctionDefinition {
        parameters: vec![FunctionParameter {
            name: "rows".to_string(),
            param_type: TypeDescriptor::array(TypeDescriptor::object(
                fields
                    .into_iter()
                    .map(|(name, descriptor)| (name.to_string(), descriptor)),
            )),
        }],
    }
}

fn insert_with_dummy_group() -> ParsedStatement {
    parsed(
        StatementKind::Insert,
        vec![
            (
                ClauseKind::InsertInto,
                Tokens::new()
                    .word("INSERT")
                    .ws()
                    .word("INTO")
                    .ws()
                    .word("logs")
                    .ws()
                    .open()
                    .word("id")
                    .comma()
                    .ws()
                    .word("name")
                    .close(),
            ),
            (
                ClauseKind::Values,
                Tokens::new()
                    .word("VALUES")
                    .ws()
                    .directive(DirectiveKind::Variable, "rows")
                    .dummy("(")
                    .dummy("1")
                    .dummy(",")
                    .dummy("'x'")
                    .dummy(")"),
            ),
        ],
    )
}

#[test]
fn auto_expands_array_of_object_values() {
    let compile_options = CompileOptions {
        dialect: Dialect::Mysql,
        function: Some(rows_function(vec![
            ("id", TypeDescriptor::scalar("int")),
            ("name", TypeDescriptor::scalar("text")),
        ])),
        ..Default::default()
    };

    let compiled = compile_statement(&insert_with_dummy_group(), &compile_options).unwrap();
    let ops = &compiled.template.instructions;

    assert!(matches!(
        &ops[1],
        Instruction::LoopStart {
            variable,
            collection_expr_index: 0,
            env_index: 1,
        } if variable == "row_item"
    ));
    assert!(ops.iter().any(|op| matches!(
        op,
        Instruction::EmitUnlessBoundary { value, .. } if value == ", "
    )));
    assert_eq!(compiled.template.expressions[0].expression, "rows");
    assert_eq!(compiled.template.expressions[1].expression, "row_item.id");
    assert_eq!(compiled.template.expressions[2].expression, "row_item.name");
    assert_eq!(
        compiled.template.environments[1].variables[0].name,
        "row_item"
    );
    assert!(compiled.messages.is_empty());
}

#[test]
fn abandons_auto_expansion_when_a_column_has_no_field() {
    let compile_options = CompileOptions {
        dialect: Dialect::Mysql,
        function: Some(rows_function(vec![
            ("id", TypeDescriptor::scalar("int")),
            ("title", TypeDescriptor::scalar("text")),
        ])),
        ..Default::default()
    };

    let compiled = compile_statement(&insert_with_dummy_group(), &compile_options).unwrap();

    assert!(!compiled
        .template
        .instructions
        .iter()
        .any(|op| matches!(op, Instruction::LoopStart { .. })));
    assert_eq!(compiled.messages.len(), 1);
    assert_eq!(compiled.messages[0].severity, Severity::Warning);
    assert!(compiled.messages[0].message.contains("auto-expansion"));
    assert_eq!(compiled.template.expressions.len(), 1);
    assert_eq!(compiled.template.expressions[0].expression, "rows");
}

#[test]
fn applies_type_overrides_by_position() {
    // WHERE(1) ws(2) id(3) ws(4) =(5) ws(6) directive(7)
    let mut overrides = HashMap::new();
    overrides.insert(
        Position::new(1, 7),
        TypeDescriptor::array(TypeDescriptor::scalar("int")),
    );
    let compile_options = CompileOptions {
        type_overrides: overrides,
        ..Default::default()
    };

    let statement = parsed(
        StatementKind::Select,
        vec![
            (ClauseKind::Select, Tokens::new().word("SELECT").ws().word("id")),
            (ClauseKind::From, Tokens::new().word("FROM").ws().word("t")),
            (
                ClauseKind::Where,
                Tokens::new()
                    .word("WHERE")
                    .ws()
                    .word("id")
                    .ws()
                    .op("=")
                    .ws()
                    .directive(DirectiveKind::Variable, "ids"),
            ),
        ],
    );

    let compiled = compile_statement(&statement, &compile_options).unwrap();
    let expression = &compiled.template.expressions[0];
    assert_eq!(expression.expression, "ids");
    assert_eq!(expression.result_type, EvalResultType::Array);
    assert_eq!(
        expression.type_descriptor,
        Some(TypeDescriptor::array(TypeDescriptor::scalar("int")))
    );
}

#[test]
fn classifies_result_types() {
    assert_eq!(
        determine_eval_result_type(&TypeDescriptor::scalar("int")),
        EvalResultType::Scalar
    );
    assert_eq!(
        determine_eval_result_type(&TypeDescriptor::array(TypeDescriptor::object(vec![(
            "id".to_string(),
            TypeDescriptor::scalar("int")
        )]))),
        EvalResultType::ArrayOfObject
    );
    assert_eq!(
        determine_eval_result_type(&TypeDescriptor::Unknown),
        EvalResultType::Unknown
    );
}

#[test]
fn normalizes_system_default_expressions() {
    assert_eq!(
        normalize_default_expression("NOW()", Dialect::Postgres),
        "CURRENT_TIMESTAMP"
    );
    assert_eq!(
        normalize_default_expression("current_timestamp", Dialect::Mysql),
        "NOW()"
    );
    assert_eq!(normalize_default_expression("0", Dialect::Sqlite), "0");
}
