use std::fmt;

/// Token kinds of the trace rule DSL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Keywords
    /// `trace`
    Trace,
    /// `has`
    Has,
    /// `where`
    Where,
    /// `count`
    Count,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `true`
    True,
    /// `false`
    False,
    /// `in`
    In,
    /// `matches`
    Matches,

    // Operators
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,

    // Punctuation
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `.`
    Dot,
    /// `,`
    Comma,

    // Literals
    /// Bare word that is not a keyword
    Identifier,
    /// Double-quoted string, unescaped
    String,
    /// Integer or decimal number
    Number,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Look a word up in the keyword table
    pub fn keyword(word: &str) -> Option<TokenKind> {
        let kind = match word {
            "trace" => TokenKind::Trace,
            "has" => TokenKind::Has,
            "where" => TokenKind::Where,
            "count" => TokenKind::Count,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "in" => TokenKind::In,
            "matches" => TokenKind::Matches,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this kind is a word (identifier or keyword)
    ///
    /// Words may appear as segments of dotted span and attribute names.
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Identifier
                | TokenKind::Trace
                | TokenKind::Has
                | TokenKind::Where
                | TokenKind::Count
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::True
                | TokenKind::False
                | TokenKind::In
                | TokenKind::Matches
        )
    }

    /// Get the literal representation of the token
    pub fn literal(&self) -> &'static str {
        match self {
            TokenKind::Trace => "trace",
            TokenKind::Has => "has",
            TokenKind::Where => "where",
            TokenKind::Count => "count",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Not => "not",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::In => "in",
            TokenKind::Matches => "matches",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Gt => ">",
            TokenKind::Gte => ">=",
            TokenKind::Lt => "<",
            TokenKind::Lte => "<=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.literal())
    }
}

/// A lexical token with its source position
///
/// `text` holds the token value (string literals without quotes, escapes
/// resolved); `len` is the byte length of the raw lexeme in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Token kind
    pub kind: TokenKind,
    /// Token value
    pub text: String,
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// Byte length of the lexeme
    pub len: usize,
}

impl Token {
    /// Create a new token
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize, len: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
            len,
        }
    }

    /// End-of-input marker at the given position
    pub fn eof(line: usize, column: usize) -> Self {
        Self::new(TokenKind::Eof, "", line, column, 0)
    }

    /// Whether this token is of the given kind
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_table() {
        assert_eq!(TokenKind::keyword("trace"), Some(TokenKind::Trace));
        assert_eq!(TokenKind::keyword("matches"), Some(TokenKind::Matches));
        assert_eq!(TokenKind::keyword("contains"), None);
        // keywords are case sensitive
        assert_eq!(TokenKind::keyword("AND"), None);
    }

    #[test]
    fn test_literal_round_trip() {
        for word in ["trace", "has", "where", "count", "and", "or", "not", "true", "false", "in", "matches"] {
            let kind = TokenKind::keyword(word).unwrap();
            assert_eq!(kind.literal(), word);
            assert!(kind.is_word());
        }
        assert!(!TokenKind::Dot.is_word());
    }
}
