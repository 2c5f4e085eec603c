use pretty_assertions::assert_eq;
use spanrules::config::{Deadline, Limits};
use spanrules::lexer::{tokenize, Lexer, TokenKind};
use std::time::Duration;

struct LexTestCase {
    expr: &'static str,
    tokens: Vec<TokenKind>,
}

fn kinds(expr: &str) -> Vec<TokenKind> {
    tokenize(expr).tokens.iter().map(|t| t.kind).collect()
}

#[test]
fn test_lexer_cases() {
    let test_cases = vec![
        LexTestCase {
            expr: "trace.has(auth.login)",
            tokens: vec![
                TokenKind::Trace,
                TokenKind::Dot,
                TokenKind::Has,
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::RParen,
                TokenKind::Eof,
            ],
        },
        LexTestCase {
            expr: "not trace.count(x) >= 10 or true",
            tokens: vec![
                TokenKind::Not,
                TokenKind::Trace,
                TokenKind::Dot,
                TokenKind::Count,
                TokenKind::LParen,
                TokenKind::Identifier,
                TokenKind::RParen,
                TokenKind::Gte,
                TokenKind::Number,
                TokenKind::Or,
                TokenKind::True,
                TokenKind::Eof,
            ],
        },
        LexTestCase {
            expr: r#"region in ["us", 3.5, false]"#,
            tokens: vec![
                TokenKind::Identifier,
                TokenKind::In,
                TokenKind::LBracket,
                TokenKind::String,
                TokenKind::Comma,
                TokenKind::Number,
                TokenKind::Comma,
                TokenKind::False,
                TokenKind::RBracket,
                TokenKind::Eof,
            ],
        },
        LexTestCase {
            expr: "a == b != c > d < e <= f matches g and h",
            tokens: vec![
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::Identifier,
                TokenKind::NotEq,
                TokenKind::Identifier,
                TokenKind::Gt,
                TokenKind::Identifier,
                TokenKind::Lt,
                TokenKind::Identifier,
                TokenKind::Lte,
                TokenKind::Identifier,
                TokenKind::Matches,
                TokenKind::Identifier,
                TokenKind::And,
                TokenKind::Identifier,
                TokenKind::Eof,
            ],
        },
        LexTestCase {
            expr: "// only a comment\n",
            tokens: vec![TokenKind::Eof],
        },
    ];

    for case in test_cases {
        assert_eq!(kinds(case.expr), case.tokens, "lexing {:?}", case.expr);
    }
}

#[test]
fn test_keywords_are_case_sensitive() {
    assert_eq!(
        kinds("AND Trace"),
        vec![TokenKind::Identifier, TokenKind::Identifier, TokenKind::Eof]
    );
}

#[test]
fn test_positions_across_lines() {
    let out = tokenize("trace.has(a.b)\n  and\n    trace.has(c.d)");
    assert!(out.errors.is_empty());
    let and = out.tokens.iter().find(|t| t.kind == TokenKind::And).unwrap();
    assert_eq!((and.line, and.column, and.len), (2, 3, 3));
    let last_trace = out.tokens.iter().rev().find(|t| t.kind == TokenKind::Trace).unwrap();
    assert_eq!((last_trace.line, last_trace.column), (3, 5));
}

#[test]
fn test_identifier_at_limit_is_accepted() {
    let name = "a".repeat(100);
    let out = tokenize(&format!("trace.has({})", name));
    assert!(out.errors.is_empty());
    assert!(out.tokens.iter().any(|t| t.text == name));
}

#[test]
fn test_identifier_over_limit_reports_start() {
    let name = "a".repeat(101);
    let out = tokenize(&format!("trace.has({})", name));
    assert_eq!(out.errors.len(), 1);
    let err = &out.errors[0];
    assert_eq!((err.line, err.column), (1, 11));
    assert_eq!(err.end_column, 11 + 101);
    assert!(err.message.contains("maximum length of 100"));
    assert!(!out.fatal);
}

#[test]
fn test_string_over_limit() {
    let limits = Limits {
        max_string_length: 5,
        ..Limits::default()
    };
    let input = r#"x == "abcdef" and y"#;
    let out = Lexer::new(input, &limits, Deadline::start(Duration::from_secs(5))).tokenize();
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].column, 6);
    // lexing resumes after the closing quote
    assert_eq!(
        out.tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
        vec![
            TokenKind::Identifier,
            TokenKind::Eq,
            TokenKind::String,
            TokenKind::And,
            TokenKind::Identifier,
            TokenKind::Eof
        ]
    );
}

#[test]
fn test_unterminated_string() {
    let out = tokenize(r#"trace.has(a.b).where(x == "open"#);
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].message, "Unterminated string literal");
    assert_eq!(out.errors[0].column, 27);
}

#[test]
fn test_escapes() {
    let out = tokenize(r#""say \"hi\" \\ \d+""#);
    assert_eq!(out.tokens[0].text, r#"say "hi" \ \d+"#);
}

#[test]
fn test_lexer_keeps_going_after_bad_characters() {
    let out = tokenize("trace.has(a) # and $ trace.has(b)");
    assert_eq!(out.errors.len(), 2);
    assert_eq!(out.errors[0].column, 14);
    assert_eq!(out.errors[1].column, 20);
    assert_eq!(out.tokens.iter().filter(|t| t.kind == TokenKind::Trace).count(), 2);
}

#[test]
fn test_run_of_bad_characters_without_whitespace() {
    let prefix = "trace.has(a.b)";
    let input = format!("{}{}", prefix, "@".repeat(65_536 - prefix.len()));
    let limits = Limits::default();
    // the budget is generous so only a superlinear scan could run out of it
    let out = Lexer::new(&input, &limits, Deadline::start(Duration::from_secs(10))).tokenize();

    assert!(!out.fatal);
    assert_eq!(out.errors.len(), 65_536 - prefix.len());
    assert_eq!(out.errors[0].column, 15);
    assert_eq!(out.errors.last().map(|e| e.column), Some(65_536));
    assert!(out.errors.iter().all(|e| e.message == out.errors[0].message));
    assert_eq!(
        out.errors[0].message,
        format!("Unexpected character '@' in '{}{}...'", prefix, "@".repeat(60 - prefix.len()))
    );
}

#[test]
fn test_single_equals_suggests_double() {
    let out = tokenize("x = 1");
    assert_eq!(out.errors.len(), 1);
    assert_eq!(
        out.errors[0].suggestion.as_deref(),
        Some("Use '==' to compare values")
    );
}

#[test]
fn test_oversize_input_is_fatal() {
    let input = " ".repeat(65_537);
    let out = tokenize(&input);
    assert!(out.fatal);
    assert_eq!(out.errors.len(), 1);
    assert_eq!((out.errors[0].line, out.errors[0].column), (1, 1));
}

#[test]
fn test_expired_deadline_is_fatal() {
    let limits = Limits::default();
    let out = Lexer::new("trace.has(a.b) ¤", &limits, Deadline::start(Duration::ZERO)).tokenize();
    assert!(out.fatal);
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].message.contains("timed out"));
}
