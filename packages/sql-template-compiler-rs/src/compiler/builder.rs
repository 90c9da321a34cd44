pub const MAX_LOOP_NESTING: usize = 10;

#[derive(Debug)]
struct ConditionalFrame {
    expr_index: usize,
    has_elseif: bool,
    has_else: bool,
    loops_at_entry: usize,
}

#[derive(Debug)]
struct LoopFrame {
    variable: String,
    env_index: usize,
}

#[derive(Debug)]
pub struct BuilderOutput {
    pub instructions: Vec<Instruction>,
    pub messages: Vec<CompileMessage>,
    pub where_summary: Option<(WhereStatus, RemovalComboSet)>,
}

/// Stack-based compiler turning a clause token stream with embedded control
/// directives into a flat instruction list. Holds three stacks (conditional
/// frames, loop frames, environment indexes) to support nesting up to
/// `MAX_LOOP_NESTING`.
pub struct InstructionBuilder<'a> {
    ctx: &'a mut GenerationContext,
    instructions: Vec<Instruction>,
    conditionals: Vec<ConditionalFrame>,
    loops: Vec<LoopFrame>,
    env_stack: Vec<usize>,
    messages: Vec<CompileMessage>,
    analyzer: WhereAnalyzer,
    analyzing: bool,
    saw_where: bool,
    insert_columns: Option<Vec<String>>,
    clause_kind: Option<ClauseKind>,
    group_depth: usize,
    values_block_emitted: bool,
    pending_space: bool,
}

impl<'a> InstructionBuilder<'a> {
    pub fn new(ctx: &'a mut GenerationContext) -> Self {
        Self {
            ctx,
            instructions: Vec::new(),
            conditionals: Vec::new(),
            loops: Vec::new(),
            env_stack: vec![0],
            messages: Vec::new(),
            analyzer: WhereAnalyzer::new(),
            analyzing: false,
            saw_where: false,
            insert_columns: None,
            clause_kind: None,
            group_depth: 0,
            values_block_emitted: false,
            pending_space: false,
        }
    }

    pub fn set_insert_columns(&mut self, columns: Vec<String>) {
        self.insert_columns = Some(columns);
    }

    fn current_env(&self) -> usize {
        self.env_stack.last().copied().unwrap_or(0)
    }

    /// Compiles one logical clause into instructions, appending to the
    /// stream. Aborts on the first malformed directive.
    pub fn process(&mut self, kind: ClauseKind, tokens: &[Token]) -> Result<(), CompileError> {
        self.clause_kind = Some(kind);
        self.analyzing = kind == ClauseKind::Where;
        if self.analyzing {
            self.saw_where = true;
        }

        let mut index = 0;
        while index < tokens.len() {
            let token = &tokens[index];
            index = match &token.directive {
                Some(directive) => {
                    let directive = directive.clone();
                    self.flush_space();
                    self.handle_directive(tokens, index, &directive)?
                }
                None => self.handle_plain(tokens, index)?,
            };
        }

        self.analyzing = false;
        Ok(())
    }

    fn handle_directive(
        &mut self,
        tokens: &[Token],
        index: usize,
        directive: &Directive,
    ) -> Result<usize, CompileError> {
        let position = tokens[index].position;
        match directive.kind {
            DirectiveKind::Variable => self.handle_variable(tokens, index, directive, position),
            DirectiveKind::If => {
                let expr_index =
                    self.ctx
                        .add_expression(&directive.condition, self.current_env(), position);
                self.push(Instruction::If { expr_index });
                self.conditionals.push(ConditionalFrame {
                    expr_index,
                    has_elseif: false,
                    has_else: false,
                    loops_at_entry: self.loops.len(),
                });
                if self.analyzing {
                    self.analyzer.on_if(expr_index);
                }
                Ok(index + 1)
            }
            DirectiveKind::ElseIf => {
                self.require_open_conditional("elseif", position)?;
                let expr_index =
                    self.ctx
                        .add_expression(&directive.condition, self.current_env(), position);
                self.push(Instruction::ElseIf { expr_index });
                if let Some(frame) = self.conditionals.last_mut() {
                    frame.has_elseif = true;
                }
                if self.analyzing {
                    self.analyzer.on_elseif(expr_index);
                }
                Ok(index + 1)
            }
            DirectiveKind::Else => {
                self.require_open_conditional("else", position)?;
                self.push(Instruction::Else);
                if let Some(frame) = self.conditionals.last_mut() {
                    frame.has_else = true;
                }
                if self.analyzing {
                    self.analyzer.on_else();
                }
                Ok(index + 1)
            }
            DirectiveKind::End => {
                // Pops whichever stack is innermost: a conditional opened
                // inside the current loop body closes before the loop, while
                // an open loop closes before a conditional opened outside it.
                let conditional_is_innermost = self
                    .conditionals
                    .last()
                    .map(|frame| frame.loops_at_entry == self.loops.len())
                    .unwrap_or(false);
                if conditional_is_innermost {
                    self.conditionals.pop();
                    self.push(Instruction::End);
                    if self.analyzing {
                        self.analyzer.on_end();
                    }
                } else if !self.loops.is_empty() {
                    self.close_loop();
                } else {
                    return Err(CompileError::DirectiveMismatch(format!(
                        "unmatched end directive at {}:{}",
                        position.line, position.column
                    )));
                }
                Ok(index + 1)
            }
            DirectiveKind::For => {
                self.open_loop(&directive.condition, position)?;
                Ok(index + 1)
            }
        }
    }

    fn handle_variable(
        &mut self,
        tokens: &[Token],
        index: usize,
        directive: &Directive,
        position: Position,
    ) -> Result<usize, CompileError> {
        // A parser-inserted sample span directly after the directive is
        // consumed here and never emitted.
        let dummy_start = index + 1;
        let mut dummy_end = dummy_start;
        while dummy_end < tokens.len() && tokens[dummy_end].kind == TokenKind::DummyLiteral {
            dummy_end += 1;
        }

        let expanded = self.try_auto_expand(
            &directive.condition,
            &tokens[dummy_start..dummy_end],
            position,
        )?;
        if !expanded {
            let expr_index =
                self.ctx
                    .add_expression(&directive.condition, self.current_env(), position);
            self.push(Instruction::EmitEval {
                expr_index,
                position: Some(position),
            });
            if self.analyzing {
                self.analyzer.on_eval();
            }
        }
        Ok(dummy_end)
    }

    fn require_open_conditional(
        &self,
        directive: &str,
        position: Position,
    ) -> Result<(), CompileError> {
        let frame = self.conditionals.last().ok_or_else(|| {
            CompileError::DirectiveMismatch(format!(
                "{directive} directive without matching if at {}:{}",
                position.line, position.column
            ))
        })?;
        if frame.loops_at_entry != self.loops.len() {
            return Err(CompileError::DirectiveMismatch(format!(
                "{directive} directive crosses a loop boundary at {}:{}",
                position.line, position.column
            )));
        }
        if frame.has_else {
            return Err(CompileError::DirectiveMismatch(format!(
                "{directive} directive after else at {}:{}",
                position.line, position.column
            )));
        }
        Ok(())
    }

    fn open_loop(&mut self, condition: &str, position: Position) -> Result<(), CompileError> {
        let Some((variable, collection)) = condition.split_once(':') else {
            return Err(CompileError::LoopMismatch(format!(
                "for directive requires '<var> : <collection>', got '{condition}' at {}:{}",
                position.line, position.column
            )));
        };
        let variable = variable.trim();
        let collection = collection.trim();
        if variable.is_empty() || collection.is_empty() || collection.contains(':') {
            return Err(CompileError::LoopMismatch(format!(
                "malformed for directive condition '{condition}' at {}:{}",
                position.line, position.column
            )));
        }
        if self.loops.len() >= MAX_LOOP_NESTING {
            return Err(CompileError::LoopNesting(format!(
                "loop nesting exceeds {MAX_LOOP_NESTING} at {}:{}",
                position.line, position.column
            )));
        }

        let parent_env = self.current_env();
        let collection_expr_index = self.ctx.add_expression(collection, parent_env, position);
        let element = self
            .ctx
            .resolve_descriptor(collection, parent_env, position)
            .map(|descriptor| descriptor.element())
            .unwrap_or(TypeDescriptor::Unknown);
        let env_index = self.ctx.add_environment(
            parent_env,
            EnvVariable {
                name: variable.to_string(),
                sample_value: sample_value_for(&element),
                descriptor: element,
            },
            format!("for:{variable}"),
        );
        self.env_stack.push(env_index);
        self.loops.push(LoopFrame {
            variable: variable.to_string(),
            env_index,
        });
        self.push(Instruction::LoopStart {
            variable: variable.to_string(),
            collection_expr_index,
            env_index,
        });
        if self.analyzing {
            self.analyzer.on_loop_start();
        }
        Ok(())
    }

    fn close_loop(&mut self) {
        self.loops.pop();
        self.env_stack.pop();

        // The outermost VALUES loop gets an implicit tuple separator when the
        // template author did not write one. Inner loops close mid-tuple, so
        // no separator is synthesized for them.
        if self.clause_kind == Some(ClauseKind::Values)
            && self.loops.is_empty()
            && !matches!(
                self.instructions.last(),
                Some(Instruction::EmitUnlessBoundary { .. })
            )
        {
            self.push(Instruction::EmitUnlessBoundary {
                value: ", ".to_string(),
                position: None,
            });
        }

        self.push(Instruction::LoopEnd {
            env_index: self.current_env(),
        });
        if self.analyzing {
            self.analyzer.on_loop_end();
        }
    }

    fn handle_plain(&mut self, tokens: &[Token], index: usize) -> Result<usize, CompileError> {
        let token = &tokens[index];

        if token.is_whitespace_or_comment() {
            self.pending_space = true;
            return Ok(index + 1);
        }
        if token.kind == TokenKind::DummyLiteral {
            return Ok(index + 1);
        }

        // A separator directly before a closing directive defers to the
        // optimizer via EMIT_UNLESS_BOUNDARY.
        if is_separator_token(token) {
            if let Some(next) = next_non_ws(tokens, index + 1) {
                let closes = matches!(
                    tokens[next].directive.as_ref().map(|d| d.kind),
                    Some(DirectiveKind::ElseIf | DirectiveKind::Else | DirectiveKind::End)
                );
                if closes {
                    self.flush_space();
                    let trailing_ws = next > index + 1;
                    let value = if trailing_ws {
                        format!("{} ", token.text)
                    } else {
                        token.text.clone()
                    };
                    self.push(Instruction::EmitUnlessBoundary {
                        value,
                        position: Some(token.position),
                    });
                    // Whitespace before the directive is folded into the value.
                    return Ok(next);
                }
            }
        }

        match token.kind {
            TokenKind::OpenParen => {
                self.flush_space();
                self.group_depth += 1;
                if self.group_depth == 1 {
                    self.values_block_emitted = false;
                }
                self.push_static(&token.text, Some(token.position));
            }
            TokenKind::CloseParen => {
                self.flush_space();
                if self.group_depth == 1 {
                    match self.clause_kind {
                        Some(ClauseKind::Values) => self.inject_insert_system_values(),
                        Some(ClauseKind::InsertInto) => self.inject_insert_column_names(),
                        _ => {}
                    }
                }
                self.group_depth = self.group_depth.saturating_sub(1);
                self.push_static(&token.text, Some(token.position));
            }
            _ => {
                self.flush_space();
                self.push_static(&token.text, Some(token.position));
            }
        }
        Ok(index + 1)
    }

    fn flush_space(&mut self) {
        if !self.pending_space {
            return;
        }
        self.pending_space = false;
        if self.instructions.is_empty() {
            return;
        }
        self.push_static(" ", None);
    }

    pub fn push_static(&mut self, text: &str, position: Option<Position>) {
        self.push(Instruction::EmitStatic {
            value: text.to_string(),
            position,
        });
        if self.analyzing {
            self.analyzer.on_static(text);
        }
    }

    pub fn push_boundary(&mut self) {
        self.push(Instruction::Boundary);
    }

    pub fn push_clause_separator(&mut self) {
        self.pending_space = false;
        self.push(Instruction::EmitStatic {
            value: " ".to_string(),
            position: None,
        });
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn warn(&mut self, message: String) {
        self.messages.push(CompileMessage {
            severity: Severity::Warning,
            message,
        });
    }

    pub fn append(&mut self, instruction: Instruction) {
        self.push(instruction);
    }

    pub fn ensure_closed(&self) -> Result<(), CompileError> {
        if !self.loops.is_empty() || !self.conditionals.is_empty() {
            return Err(CompileError::DirectiveMismatch(
                "unclosed if or for directive at end of statement".to_string(),
            ));
        }
        Ok(())
    }

    /// Runs the post-processing passes and returns the finished stream.
    pub fn finalize(mut self) -> BuilderOutput {
        let instructions = std::mem::take(&mut self.instructions);
        let instructions = convert_trailing_delimiters(instructions);
        let instructions = merge_static_instructions(instructions);
        let instructions = insert_boundaries(instructions);
        let instructions = trim_trailing_static(instructions);

        let where_summary = if self.saw_where {
            Some(self.analyzer.finalize())
        } else {
            None
        };

        BuilderOutput {
            instructions,
            messages: self.messages,
            where_summary,
        }
    }
}

fn is_separator_token(token: &Token) -> bool {
    match token.kind {
        TokenKind::Comma => true,
        TokenKind::Word => {
            token.text.eq_ignore_ascii_case("AND") || token.text.eq_ignore_ascii_case("OR")
        }
        _ => false,
    }
}
