/// Post-pass over the raw instruction list: translates compiler-logical ops
/// into the execution-oriented set, resolves boundary-sensitive separators
/// where the outcome is statically known, drops unused system pagination
/// fallback arms, merges static text and renumbers placeholders for dialects
/// that want `$1, $2, ...`.
pub fn optimize(instructions: &[Instruction], dialect: Dialect) -> Vec<Instruction> {
    let out = optimize_loop_boundaries(instructions.to_vec());
    let out = convert_eval_instructions(out);
    let out = resolve_unless_boundary(out);
    let out = prune_system_else_arms(out);
    let out = merge_adjacent_statics(out);
    renumber_placeholders(out, dialect)
}

/// Inside a loop body only the final iteration's trailing separator can
/// dangle, so every EMIT_UNLESS_BOUNDARY except the last before LOOP_END is
/// demoted to unconditional static text.
pub fn optimize_loop_boundaries(mut instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut stack: Vec<Vec<usize>> = Vec::new();
    let mut demote: Vec<usize> = Vec::new();

    for index in 0..instructions.len() {
        match &instructions[index] {
            Instruction::LoopStart { .. } => stack.push(Vec::new()),
            Instruction::EmitUnlessBoundary { .. } => {
                if let Some(level) = stack.last_mut() {
                    level.push(index);
                }
            }
            Instruction::LoopEnd { .. } => {
                if let Some(level) = stack.pop() {
                    if level.len() > 1 {
                        demote.extend(&level[..level.len() - 1]);
                    }
                }
            }
            _ => {}
        }
    }

    for index in demote {
        if let Instruction::EmitUnlessBoundary { value, position } = &instructions[index] {
            instructions[index] = Instruction::EmitStatic {
                value: value.clone(),
                position: *position,
            };
        }
    }
    instructions
}

/// EMIT_EVAL becomes a `?` placeholder plus a paired ADD_PARAM.
fn convert_eval_instructions(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut result = Vec::with_capacity(instructions.len() * 2);
    for instruction in instructions {
        match instruction {
            Instruction::EmitEval {
                expr_index,
                position,
            } => {
                result.push(Instruction::EmitStatic {
                    value: "?".to_string(),
                    position,
                });
                result.push(Instruction::AddParam { expr_index });
            }
            other => result.push(other),
        }
    }
    result
}

enum BoundaryResolution {
    Keep,
    Demote,
    Drop,
}

fn resolve_unless_boundary(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut result = Vec::with_capacity(instructions.len());
    for index in 0..instructions.len() {
        let Instruction::EmitUnlessBoundary { value, position } = &instructions[index] else {
            result.push(instructions[index].clone());
            continue;
        };
        match classify_boundary_lookahead(&instructions, index + 1) {
            BoundaryResolution::Keep => result.push(instructions[index].clone()),
            BoundaryResolution::Demote => result.push(Instruction::EmitStatic {
                value: value.clone(),
                position: *position,
            }),
            BoundaryResolution::Drop => {}
        }
    }
    result
}

/// Scans forward from a separator. Reaching emitting output first means the
/// separator always survives; reaching a BOUNDARY without crossing a loop end
/// means it is always suppressed; anything control-flow-shaped leaves the
/// decision to the runtime.
fn classify_boundary_lookahead(instructions: &[Instruction], start: usize) -> BoundaryResolution {
    let mut index = start;
    let mut crossed_loop_end = false;

    while index < instructions.len() {
        match &instructions[index] {
            Instruction::Boundary => {
                return if crossed_loop_end {
                    BoundaryResolution::Keep
                } else {
                    BoundaryResolution::Drop
                };
            }
            Instruction::EmitStatic { .. }
            | Instruction::EmitEval { .. }
            | Instruction::AddParam { .. }
            | Instruction::EmitSystemValue { .. }
            | Instruction::EmitSystemLimit
            | Instruction::EmitSystemOffset
            | Instruction::EmitSystemFor => return BoundaryResolution::Demote,
            Instruction::LoopEnd { .. } => {
                crossed_loop_end = true;
                index += 1;
            }
            Instruction::End | Instruction::FallbackCondition { .. } => index += 1,
            Instruction::Else | Instruction::ElseIf { .. } => {
                // The executor jumps from here to the matching END.
                match skip_to_matching_end(instructions, index) {
                    Some(end) => index = end + 1,
                    None => return BoundaryResolution::Keep,
                }
            }
            Instruction::If { .. }
            | Instruction::LoopStart { .. }
            | Instruction::IfSystemLimit
            | Instruction::IfSystemOffset
            | Instruction::EmitUnlessBoundary { .. } => return BoundaryResolution::Keep,
        }
    }

    if crossed_loop_end {
        BoundaryResolution::Keep
    } else {
        BoundaryResolution::Drop
    }
}

/// From an ELSE/ELSE_IF, finds the END closing the enclosing conditional.
fn skip_to_matching_end(instructions: &[Instruction], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for index in from + 1..instructions.len() {
        match &instructions[index] {
            Instruction::If { .. }
            | Instruction::LoopStart { .. }
            | Instruction::IfSystemLimit
            | Instruction::IfSystemOffset => depth += 1,
            Instruction::End | Instruction::LoopEnd { .. } => {
                if depth == 0 {
                    return Some(index);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Conditional,
    SystemIf,
}

/// Drops the empty ELSE fallback arms of system pagination conditionals.
fn prune_system_else_arms(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut result = Vec::with_capacity(instructions.len());

    for index in 0..instructions.len() {
        match &instructions[index] {
            Instruction::If { .. } => stack.push(OpenBlock::Conditional),
            Instruction::IfSystemLimit | Instruction::IfSystemOffset => {
                stack.push(OpenBlock::SystemIf)
            }
            Instruction::End => {
                stack.pop();
            }
            Instruction::Else => {
                if stack.last() == Some(&OpenBlock::SystemIf)
                    && matches!(instructions.get(index + 1), Some(Instruction::End))
                {
                    continue;
                }
            }
            _ => {}
        }
        result.push(instructions[index].clone());
    }
    result
}

fn merge_adjacent_statics(instructions: Vec<Instruction>) -> Vec<Instruction> {
    let mut result: Vec<Instruction> = Vec::with_capacity(instructions.len());
    for instruction in instructions {
        match (&instruction, result.last_mut()) {
            (
                Instruction::EmitStatic { value, .. },
                Some(Instruction::EmitStatic {
                    value: existing, ..
                }),
            ) => existing.push_str(value),
            _ => result.push(instruction),
        }
    }
    result
}

/// Rewrites every unquoted `?` to `$1, $2, ...` in source order for dialects
/// with numbered placeholders. Quoted regions are respected character by
/// character.
fn renumber_placeholders(mut instructions: Vec<Instruction>, dialect: Dialect) -> Vec<Instruction> {
    if !dialect.numbered_placeholders() {
        return instructions;
    }

    let mut next = 1usize;
    for instruction in &mut instructions {
        let value = match instruction {
            Instruction::EmitStatic { value, .. }
            | Instruction::EmitUnlessBoundary { value, .. } => value,
            _ => continue,
        };
        if !value.contains('?') {
            continue;
        }

        let mut rewritten = String::with_capacity(value.len() + 4);
        let mut in_single = false;
        let mut in_double = false;
        for c in value.chars() {
            match c {
                '\'' if !in_double => {
                    in_single = !in_single;
                    rewritten.push(c);
                }
                '"' if !in_single => {
                    in_double = !in_double;
                    rewritten.push(c);
                }
                '?' if !in_single && !in_double => {
                    rewritten.push('$');
                    rewritten.push_str(&next.to_string());
                    next += 1;
                }
                _ => rewritten.push(c),
            }
        }
        *value = rewritten;
    }
    instructions
}
