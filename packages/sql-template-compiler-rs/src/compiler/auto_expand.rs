impl<'a> InstructionBuilder<'a> {
    /// Dummy-value-driven auto-expansion for INSERT VALUES: a variable
    /// directive whose expression is statically known to be an
    /// array-of-object (or bare object), followed by a parenthesized sample
    /// group matching the column list, synthesizes a loop (or direct field
    /// projection) without an explicit `for`.
    ///
    /// Field matching is heuristic (exact, case-insensitive, snake-to-camel
    /// candidates); a column with no matching field abandons expansion and
    /// the directive falls back to literal evaluation.
    pub(crate) fn try_auto_expand(
        &mut self,
        expression: &str,
        dummy: &[Token],
        position: Position,
    ) -> Result<bool, CompileError> {
        if self.clause_kind != Some(ClauseKind::Values) {
            return Ok(false);
        }
        let Some(columns) = self.insert_columns.clone() else {
            return Ok(false);
        };
        if columns.is_empty() || !is_parenthesized_group(dummy) {
            return Ok(false);
        }
        if count_group_items(dummy) != columns.len() {
            return Ok(false);
        }

        let env = self.current_env();
        let Some(descriptor) = self.ctx.resolve_descriptor(expression, env, position) else {
            return Ok(false);
        };
        let result_type = determine_eval_result_type(&descriptor);
        let element = match result_type {
            EvalResultType::ArrayOfObject => descriptor.element(),
            EvalResultType::Object => descriptor.clone(),
            _ => return Ok(false),
        };

        let mut fields = Vec::with_capacity(columns.len());
        for column in &columns {
            match match_object_field(&element, column) {
                Some(field) => fields.push(field),
                None => {
                    self.warn(format!(
                        "auto-expansion abandoned for '{expression}': no field matches column '{column}'"
                    ));
                    return Ok(false);
                }
            }
        }

        if result_type == EvalResultType::ArrayOfObject {
            self.expand_array(expression, &fields, position)?;
        } else {
            self.expand_object(expression, &fields, position);
        }
        Ok(true)
    }

    fn expand_array(
        &mut self,
        expression: &str,
        fields: &[String],
        position: Position,
    ) -> Result<(), CompileError> {
        if self.loops.len() >= MAX_LOOP_NESTING {
            return Err(CompileError::LoopNesting(format!(
                "loop nesting exceeds {MAX_LOOP_NESTING} at {}:{}",
                position.line, position.column
            )));
        }

        let parent_env = self.current_env();
        let collection_expr_index = self.ctx.add_expression(expression, parent_env, position);
        let element = self
            .ctx
            .resolve_descriptor(expression, parent_env, position)
            .map(|descriptor| descriptor.element())
            .unwrap_or(TypeDescriptor::Unknown);
        let variable = loop_variable_name(expression);
        let env_index = self.ctx.add_environment(
            parent_env,
            EnvVariable {
                name: variable.clone(),
                sample_value: sample_value_for(&element),
                descriptor: element,
            },
            format!("for:{variable}"),
        );

        self.append(Instruction::LoopStart {
            variable: variable.clone(),
            collection_expr_index,
            env_index,
        });
        self.emit_projection_group(&variable, fields, env_index, position);
        self.append(Instruction::EmitUnlessBoundary {
            value: ", ".to_string(),
            position: None,
        });
        self.append(Instruction::LoopEnd {
            env_index: parent_env,
        });
        Ok(())
    }

    fn expand_object(&mut self, expression: &str, fields: &[String], position: Position) {
        let env = self.current_env();
        self.emit_projection_group(expression, fields, env, position);
    }

    fn emit_projection_group(
        &mut self,
        base: &str,
        fields: &[String],
        env_index: usize,
        position: Position,
    ) {
        self.push_static("(", None);
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                self.push_static(", ", None);
            }
            let expr_index = self
                .ctx
                .add_expression(&format!("{base}.{field}"), env_index, position);
            self.append(Instruction::EmitEval {
                expr_index,
                position: Some(position),
            });
        }
        self.values_block_emitted = false;
        self.inject_insert_system_values();
        self.push_static(")", None);
    }
}

fn is_parenthesized_group(tokens: &[Token]) -> bool {
    let first = tokens.first().map(|t| t.text.trim());
    let last = tokens.last().map(|t| t.text.trim());
    tokens.len() >= 2 && first == Some("(") && last == Some(")")
}

/// Counts top-level comma-separated items inside a parenthesized dummy group.
fn count_group_items(tokens: &[Token]) -> usize {
    let mut depth = 0usize;
    let mut items = 1usize;
    for token in tokens {
        match token.text.trim() {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            "," if depth == 1 => items += 1,
            _ => {}
        }
    }
    items
}

/// Candidate matching for a declared column against object fields: exact,
/// case-insensitive, then the snake-to-camel rendition of the column.
fn match_object_field(descriptor: &TypeDescriptor, column: &str) -> Option<String> {
    let names = descriptor.field_names();
    if names.iter().any(|name| *name == column) {
        return Some(column.to_string());
    }
    if let Some(name) = names.iter().find(|name| name.eq_ignore_ascii_case(column)) {
        return Some((*name).to_string());
    }
    let camel = snake_to_camel(column);
    if let Some(name) = names
        .iter()
        .find(|name| **name == camel || name.eq_ignore_ascii_case(&camel))
    {
        return Some((*name).to_string());
    }
    None
}

fn snake_to_camel(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

fn loop_variable_name(expression: &str) -> String {
    let base = expression
        .rsplit('.')
        .next()
        .unwrap_or(expression)
        .trim()
        .trim_end_matches('s');
    let base = if base.is_empty() { "item" } else { base };
    format!("{base}_item")
}
