/// Rewrites a token stream into the vendor syntax of `dialect`.
///
/// JOIN normalization runs first and unconditionally; the remaining rewrites
/// are applied token by token, each consuming the tokens of the construct it
/// matched. Unmatched tokens pass through unchanged, and re-running the
/// rewriter on its own output is a no-op.
pub fn rewrite_dialect(tokens: &[Token], dialect: Dialect) -> Vec<Token> {
    let tokens = normalize_joins(tokens);

    let mut result = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while index < tokens.len() {
        let rewrite = try_rewrite_cast(&tokens, index, dialect)
            .or_else(|| try_rewrite_time_function(&tokens, index, dialect))
            .or_else(|| try_rewrite_date_function(&tokens, index, dialect))
            .or_else(|| try_rewrite_boolean_literal(&tokens, index, dialect))
            .or_else(|| try_rewrite_concat(&tokens, index, dialect));

        match rewrite {
            Some((replacement, consumed)) => {
                result.extend(replacement);
                index += consumed;
            }
            None => {
                result.push(tokens[index].clone());
                index += 1;
            }
        }
    }
    result
}

/// Strips the redundant `OUTER` after `LEFT`/`RIGHT`/`FULL`.
fn normalize_joins(tokens: &[Token]) -> Vec<Token> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if token.kind == TokenKind::Word
            && ["LEFT", "RIGHT", "FULL"]
                .iter()
                .any(|side| token.text.eq_ignore_ascii_case(side))
        {
            if let Some(outer) = next_non_ws(tokens, index + 1) {
                if word_matches(&tokens[outer], "OUTER") {
                    if let Some(join) = next_non_ws(tokens, outer + 1) {
                        if word_matches(&tokens[join], "JOIN") {
                            result.push(token.clone());
                            result.push(Token::whitespace(token.position));
                            result.push(tokens[join].clone());
                            index = join + 1;
                            continue;
                        }
                    }
                }
            }
        }
        result.push(token.clone());
        index += 1;
    }
    result
}

/// `CAST(e AS t)` for postgres becomes `(e)::t`; `(e)::t` for the other
/// dialects becomes `CAST(e AS t)`.
fn try_rewrite_cast(
    tokens: &[Token],
    index: usize,
    dialect: Dialect,
) -> Option<(Vec<Token>, usize)> {
    let position = tokens[index].position;
    if dialect == Dialect::Postgres {
        if !word_matches(&tokens[index], "CAST") {
            return None;
        }
        let open = next_non_ws(tokens, index + 1)?;
        if tokens[open].kind != TokenKind::OpenParen {
            return None;
        }
        let close = find_matching_paren(tokens, open)?;
        let as_index = find_top_level_word(tokens, open + 1, close, "AS")?;

        let mut replacement = vec![Token::open_paren(position)];
        replacement.extend(trim_ws(&tokens[open + 1..as_index]).iter().cloned());
        replacement.push(Token::close_paren(position));
        replacement.push(Token::new(TokenKind::Operator, "::", position));
        replacement.extend(trim_ws(&tokens[as_index + 1..close]).iter().cloned());
        return Some((replacement, close + 1 - index));
    }

    // Other dialects: unfold `(e)::t`.
    if tokens[index].kind != TokenKind::OpenParen {
        return None;
    }
    let close = find_matching_paren(tokens, index)?;
    let cast_op = next_non_ws(tokens, close + 1)?;
    if tokens[cast_op].kind != TokenKind::Operator || tokens[cast_op].text != "::" {
        return None;
    }
    let type_start = next_non_ws(tokens, cast_op + 1)?;
    if tokens[type_start].kind != TokenKind::Word {
        return None;
    }
    let mut type_end = type_start;
    if let Some(maybe_paren) = next_non_ws(tokens, type_start + 1) {
        if tokens[maybe_paren].kind == TokenKind::OpenParen {
            type_end = find_matching_paren(tokens, maybe_paren)?;
        }
    }

    let mut replacement = vec![
        Token::word("CAST", position),
        Token::open_paren(position),
    ];
    replacement.extend(trim_ws(&tokens[index + 1..close]).iter().cloned());
    replacement.push(Token::whitespace(position));
    replacement.push(Token::word("AS", position));
    replacement.push(Token::whitespace(position));
    replacement.extend(trim_ws(&tokens[type_start..=type_end]).iter().cloned());
    replacement.push(Token::close_paren(position));
    Some((replacement, type_end + 1 - index))
}

/// `NOW()` vs `CURRENT_TIMESTAMP`, per dialect canonical form.
fn try_rewrite_time_function(
    tokens: &[Token],
    index: usize,
    dialect: Dialect,
) -> Option<(Vec<Token>, usize)> {
    let position = tokens[index].position;
    match dialect {
        Dialect::Postgres | Dialect::Sqlite => {
            let consumed = match_empty_call(tokens, index, "NOW")?;
            Some((vec![Token::word("CURRENT_TIMESTAMP", position)], consumed))
        }
        Dialect::Mysql | Dialect::Mariadb => {
            if !word_matches(&tokens[index], "CURRENT_TIMESTAMP") {
                return None;
            }
            Some((
                vec![
                    Token::word("NOW", position),
                    Token::open_paren(position),
                    Token::close_paren(position),
                ],
                1,
            ))
        }
    }
}

/// `CURDATE()`/`CURTIME()` vs `CURRENT_DATE`/`CURRENT_TIME`.
fn try_rewrite_date_function(
    tokens: &[Token],
    index: usize,
    dialect: Dialect,
) -> Option<(Vec<Token>, usize)> {
    let position = tokens[index].position;
    match dialect {
        Dialect::Postgres | Dialect::Sqlite => {
            if let Some(consumed) = match_empty_call(tokens, index, "CURDATE") {
                return Some((vec![Token::word("CURRENT_DATE", position)], consumed));
            }
            let consumed = match_empty_call(tokens, index, "CURTIME")?;
            Some((vec![Token::word("CURRENT_TIME", position)], consumed))
        }
        Dialect::Mysql | Dialect::Mariadb => {
            let name = if word_matches(&tokens[index], "CURRENT_DATE") {
                "CURDATE"
            } else if word_matches(&tokens[index], "CURRENT_TIME") {
                "CURTIME"
            } else {
                return None;
            };
            Some((
                vec![
                    Token::word(name, position),
                    Token::open_paren(position),
                    Token::close_paren(position),
                ],
                1,
            ))
        }
    }
}

/// Sqlite has no boolean literals; `TRUE`/`FALSE` become `1`/`0`. The numeric
/// forms are left alone everywhere since a bare `1` cannot be distinguished
/// from an integer at the token level.
fn try_rewrite_boolean_literal(
    tokens: &[Token],
    index: usize,
    dialect: Dialect,
) -> Option<(Vec<Token>, usize)> {
    if dialect != Dialect::Sqlite {
        return None;
    }
    let replacement = if word_matches(&tokens[index], "TRUE") {
        "1"
    } else if word_matches(&tokens[index], "FALSE") {
        "0"
    } else {
        return None;
    };
    Some((
        vec![Token::new(
            TokenKind::Number,
            replacement,
            tokens[index].position,
        )],
        1,
    ))
}

/// `CONCAT(a, b, ...)` unfolds to `a || b || ...` for dialects with `||`;
/// `||` chains are flattened into a single `CONCAT` argument list for the
/// mysql family.
fn try_rewrite_concat(
    tokens: &[Token],
    index: usize,
    dialect: Dialect,
) -> Option<(Vec<Token>, usize)> {
    let position = tokens[index].position;
    match dialect {
        Dialect::Postgres | Dialect::Sqlite => {
            if !word_matches(&tokens[index], "CONCAT") {
                return None;
            }
            let open = next_non_ws(tokens, index + 1)?;
            if tokens[open].kind != TokenKind::OpenParen {
                return None;
            }
            let close = find_matching_paren(tokens, open)?;
            let args = split_top_level_args(tokens, open + 1, close);
            if args.is_empty() {
                return None;
            }

            let mut replacement = Vec::new();
            for (arg_index, arg) in args.iter().enumerate() {
                if arg_index > 0 {
                    replacement.push(Token::whitespace(position));
                    replacement.push(Token::new(TokenKind::Operator, "||", position));
                    replacement.push(Token::whitespace(position));
                }
                replacement.extend(arg.iter().cloned());
            }
            Some((replacement, close + 1 - index))
        }
        Dialect::Mysql | Dialect::Mariadb => {
            // An atom followed by `||` starts a concatenation chain.
            let first_end = parse_atom(tokens, index)?;
            let mut args: Vec<Vec<Token>> = vec![tokens[index..first_end].to_vec()];
            let mut cursor = first_end;
            loop {
                let Some(op) = next_non_ws(tokens, cursor) else {
                    break;
                };
                if tokens[op].kind != TokenKind::Operator || tokens[op].text != "||" {
                    break;
                }
                let operand = next_non_ws(tokens, op + 1)?;
                let operand_end = parse_atom(tokens, operand)?;
                args.push(tokens[operand..operand_end].to_vec());
                cursor = operand_end;
            }
            if args.len() < 2 {
                return None;
            }

            let mut replacement = vec![Token::word("CONCAT", position), Token::open_paren(position)];
            for (arg_index, arg) in args.iter().enumerate() {
                if arg_index > 0 {
                    replacement.push(Token::comma(position));
                    replacement.push(Token::whitespace(position));
                }
                replacement.extend(arg.iter().cloned());
            }
            replacement.push(Token::close_paren(position));
            Some((replacement, cursor - index))
        }
    }
}

/// Canonical spelling for a system-field default expression in `dialect`.
pub fn normalize_default_expression(value: &str, dialect: Dialect) -> String {
    let trimmed = value.trim();
    let canonical_timestamp = match dialect {
        Dialect::Postgres | Dialect::Sqlite => "CURRENT_TIMESTAMP",
        Dialect::Mysql | Dialect::Mariadb => "NOW()",
    };
    if trimmed.eq_ignore_ascii_case("NOW()") || trimmed.eq_ignore_ascii_case("CURRENT_TIMESTAMP") {
        return canonical_timestamp.to_string();
    }
    trimmed.to_string()
}

fn word_matches(token: &Token, expected: &str) -> bool {
    token.kind == TokenKind::Word && token.text.eq_ignore_ascii_case(expected)
}

/// Matches `name()` with no arguments, returning the token count consumed.
fn match_empty_call(tokens: &[Token], index: usize, name: &str) -> Option<usize> {
    if !word_matches(&tokens[index], name) {
        return None;
    }
    let open = next_non_ws(tokens, index + 1)?;
    if tokens[open].kind != TokenKind::OpenParen {
        return None;
    }
    let close = next_non_ws(tokens, open + 1)?;
    if tokens[close].kind != TokenKind::CloseParen {
        return None;
    }
    Some(close + 1 - index)
}

fn next_non_ws(tokens: &[Token], mut index: usize) -> Option<usize> {
    while index < tokens.len() {
        if !tokens[index].is_whitespace_or_comment() {
            return Some(index);
        }
        index += 1;
    }
    None
}

fn find_matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, token) in tokens[open..].iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_top_level_word(tokens: &[Token], start: usize, end: usize, word: &str) -> Option<usize> {
    let mut depth = 0usize;
    for index in start..end {
        match tokens[index].kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0 && word_matches(&tokens[index], word) {
                    return Some(index);
                }
            }
        }
    }
    None
}

fn split_top_level_args(tokens: &[Token], start: usize, end: usize) -> Vec<Vec<Token>> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for token in &tokens[start..end] {
        match token.kind {
            TokenKind::OpenParen => {
                depth += 1;
                current.push(token.clone());
            }
            TokenKind::CloseParen => {
                depth = depth.saturating_sub(1);
                current.push(token.clone());
            }
            TokenKind::Comma if depth == 0 => {
                args.push(trim_ws(&current).to_vec());
                current.clear();
            }
            _ => current.push(token.clone()),
        }
    }
    if !current.iter().all(Token::is_whitespace_or_comment) {
        args.push(trim_ws(&current).to_vec());
    }
    args
}

/// An atom is a literal, an identifier, a function call, or a parenthesized
/// group. Returns the exclusive end index.
fn parse_atom(tokens: &[Token], index: usize) -> Option<usize> {
    match tokens.get(index)?.kind {
        TokenKind::Word => {
            if let Some(next) = next_non_ws(tokens, index + 1) {
                if tokens[next].kind == TokenKind::OpenParen {
                    return Some(find_matching_paren(tokens, next)? + 1);
                }
            }
            Some(index + 1)
        }
        TokenKind::Number | TokenKind::String => Some(index + 1),
        TokenKind::OpenParen => Some(find_matching_paren(tokens, index)? + 1),
        _ => None,
    }
}

fn trim_ws(tokens: &[Token]) -> &[Token] {
    let start = tokens
        .iter()
        .position(|t| !t.is_whitespace_or_comment())
        .unwrap_or(tokens.len());
    let end = tokens
        .iter()
        .rposition(|t| !t.is_whitespace_or_comment())
        .map(|i| i + 1)
        .unwrap_or(start);
    &tokens[start..end]
}
