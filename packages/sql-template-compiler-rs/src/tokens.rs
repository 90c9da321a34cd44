use serde::{Deserialize, Serialize};

/// Source position of a token, 1-based.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Word,
    Number,
    String,
    Operator,
    Comma,
    OpenParen,
    CloseParen,
    Whitespace,
    Comment,
    /// Parser-inserted sample span following a variable directive. Used only
    /// for static type inference and never emitted.
    DummyLiteral,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    Variable,
    If,
    ElseIf,
    Else,
    End,
    For,
}

/// Control annotation carried by a comment token in a two-way SQL template.
///
/// For `For` directives the condition has the grammar `"<var> : <collection>"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub condition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directive: Option<Directive>,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
            directive: None,
        }
    }

    pub fn word(text: impl Into<String>, position: Position) -> Self {
        Self::new(TokenKind::Word, text, position)
    }

    pub fn whitespace(position: Position) -> Self {
        Self::new(TokenKind::Whitespace, " ", position)
    }

    pub fn comma(position: Position) -> Self {
        Self::new(TokenKind::Comma, ",", position)
    }

    pub fn open_paren(position: Position) -> Self {
        Self::new(TokenKind::OpenParen, "(", position)
    }

    pub fn close_paren(position: Position) -> Self {
        Self::new(TokenKind::CloseParen, ")", position)
    }

    pub fn directive(kind: DirectiveKind, condition: impl Into<String>, position: Position) -> Self {
        let condition = condition.into();
        Self {
            kind: TokenKind::Comment,
            text: directive_comment_text(kind, &condition),
            position,
            directive: Some(Directive { kind, condition }),
        }
    }

    pub fn is_whitespace_or_comment(&self) -> bool {
        self.directive.is_none()
            && matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }
}

fn directive_comment_text(kind: DirectiveKind, condition: &str) -> String {
    match kind {
        DirectiveKind::Variable => format!("/*= {condition} */"),
        DirectiveKind::If => format!("/*# if {condition} */"),
        DirectiveKind::ElseIf => format!("/*# elseif {condition} */"),
        DirectiveKind::Else => "/*# else */".to_string(),
        DirectiveKind::End => "/*# end */".to_string(),
        DirectiveKind::For => format!("/*# for {condition} */"),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    InsertInto,
    Values,
    Update,
    Set,
    DeleteFrom,
    Returning,
}

/// One logical clause of a parsed statement, as delivered by the external
/// lexer. Tokens keep their original order and positions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub tokens: Vec<Token>,
}

impl Clause {
    pub fn new(kind: ClauseKind, tokens: Vec<Token>) -> Self {
        Self { kind, tokens }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedStatement {
    pub kind: StatementKind,
    pub clauses: Vec<Clause>,
}

impl ParsedStatement {
    pub fn new(kind: StatementKind, clauses: Vec<Clause>) -> Self {
        Self { kind, clauses }
    }

    pub fn clause(&self, kind: ClauseKind) -> Option<&Clause> {
        self.clauses.iter().find(|clause| clause.kind == kind)
    }
}
