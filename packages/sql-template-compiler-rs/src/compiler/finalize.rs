/// A comma/AND/OR static directly before a loop or conditional end becomes
/// boundary-sensitive.
fn convert_trailing_delimiters(mut instructions: Vec<Instruction>) -> Vec<Instruction> {
    for index in 0..instructions.len() {
        let next_closes = matches!(
            instructions.get(index + 1),
            Some(Instruction::LoopEnd { .. }) | Some(Instruction::End)
        );
        if !next_closes {
            continue;
        }
        let Instruction::EmitStatic { value, position } = &instructions[index] else {
            continue;
        };
        if is_delimiter_text(value) {
            instructions[index] = Instruction::EmitUnlessBoundary {
                value: value.clone(),
                position: *position,
            };
        }
    }
    instructions
}

/// Collapses runs of EMIT_STATIC into one instruction, keeping the first
/// source position. A merged value ending in a delimiter splits that
/// delimiter back out as EMIT_UNLESS_BOUNDARY when a LOOP_END follows.
fn merge_static_instructions(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut merged: Vec<Instruction> = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        match (&instruction, merged.last_mut()) {
            (
                Instruction::EmitStatic { value, .. },
                Some(Instruction::EmitStatic {
                    value: existing, ..
                }),
            ) => {
                existing.push_str(value);
            }
            _ => merged.push(instruction),
        }
    }

    let mut result: Vec<Instruction> = Vec::with_capacity(merged.len());
    for (index, instruction) in merged.iter().enumerate() {
        let followed_by_loop_end = matches!(merged.get(index + 1), Some(Instruction::LoopEnd { .. }));
        if followed_by_loop_end {
            if let Instruction::EmitStatic { value, position } = instruction {
                if let Some((head, delimiter)) = split_trailing_delimiter(value) {
                    if !head.is_empty() {
                        result.push(Instruction::EmitStatic {
                            value: head,
                            position: *position,
                        });
                    }
                    result.push(Instruction::EmitUnlessBoundary {
                        value: delimiter,
                        position: *position,
                    });
                    continue;
                }
            }
        }
        result.push(instruction.clone());
    }
    result
}

/// Appends a BOUNDARY after every LOOP_END not directly followed by static
/// text, signalling where suppressible separators terminate.
fn insert_boundaries(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut result = Vec::with_capacity(instructions.len() + 4);
    for index in 0..instructions.len() {
        result.push(instructions[index].clone());
        if matches!(instructions[index], Instruction::LoopEnd { .. })
            && !matches!(
                instructions.get(index + 1),
                Some(Instruction::EmitStatic { .. })
            )
        {
            result.push(Instruction::Boundary);
        }
    }
    result
}

fn trim_trailing_static(mut instructions: Vec<Instruction>) -> Vec<Instruction> {
    if let Some(Instruction::EmitStatic { value, .. }) = instructions.last_mut() {
        let trimmed = value.trim_end();
        if trimmed.is_empty() {
            instructions.pop();
        } else if trimmed.len() != value.len() {
            *value = trimmed.to_string();
        }
    }
    instructions
}

fn is_delimiter_text(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed == "," || trimmed.eq_ignore_ascii_case("AND") || trimmed.eq_ignore_ascii_case("OR")
}

/// Splits a trailing `, ` / `AND ` / `OR ` off a static value, keeping the
/// delimiter's own trailing whitespace with it.
fn split_trailing_delimiter(value: &str) -> Option<(String, String)> {
    let trimmed_end = value.trim_end();
    if trimmed_end.is_empty() {
        return None;
    }
    let tail_ws = &value[trimmed_end.len()..];

    if let Some(head) = trimmed_end.strip_suffix(',') {
        return Some((head.to_string(), format!(",{tail_ws}")));
    }
    for word in ["AND", "OR"] {
        if trimmed_end.len() >= word.len()
            && trimmed_end[trimmed_end.len() - word.len()..].eq_ignore_ascii_case(word)
        {
            let head = &trimmed_end[..trimmed_end.len() - word.len()];
            // Require a word boundary so column names ending in "and" are
            // left alone.
            if head
                .chars()
                .last()
                .map(|c| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(false)
            {
                let delimiter = &trimmed_end[trimmed_end.len() - word.len()..];
                return Some((head.to_string(), format!("{delimiter}{tail_ws}")));
            }
        }
    }
    None
}
