//! Lexer for the sandboxed script subset.
//!
//! Tokenization is line-oriented: the source is split into logical lines,
//! each line's indentation is measured, and the remainder is tokenized with
//! [`logos`]. Block structure is recovered from indentation by the parser.

use logos::Logos;

use crate::error::{ScriptError, ScriptResult};

/// Tokens of the script subset.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // Keywords
    #[token("for")]
    For,

    #[token("in")]
    In,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("True")]
    True,

    #[token("False")]
    False,

    // Statement forms outside the subset; rejected by the parser with a
    // targeted message instead of a generic syntax error.
    #[token("import")]
    Import,

    #[token("from")]
    From,

    #[token("def")]
    Def,

    #[token("class")]
    Class,

    #[token("while")]
    While,

    #[token("lambda")]
    Lambda,

    // Literals
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    #[regex(r"'[^']*'", |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    StringLiteral(String),

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Operators
    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<=")]
    Le,

    #[token(">=")]
    Ge,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("=")]
    Assign,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    // Delimiters
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,

    #[token(":")]
    Colon,
}

/// One logical source line: indentation depth plus its tokens.
#[derive(Debug, Clone)]
pub struct Line {
    /// 1-based source line number.
    pub number: usize,
    /// Leading whitespace width (spaces; a tab counts as 8).
    pub indent: usize,
    /// Tokens of the line, comments stripped.
    pub tokens: Vec<Token>,
}

/// Split source into indented, tokenized lines.
///
/// Blank lines and comment-only lines are dropped.
pub fn lex_lines(source: &str) -> ScriptResult<Vec<Line>> {
    let mut lines = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let number = idx + 1;
        let mut indent = 0usize;
        let mut rest = raw;
        loop {
            if let Some(r) = rest.strip_prefix(' ') {
                indent += 1;
                rest = r;
            } else if let Some(r) = rest.strip_prefix('\t') {
                indent += 8;
                rest = r;
            } else {
                break;
            }
        }

        let mut tokens = Vec::new();
        for result in Token::lexer(rest) {
            match result {
                Ok(token) => tokens.push(token),
                Err(()) => {
                    return Err(ScriptError::Syntax {
                        line: number,
                        message: format!("unrecognized input in '{}'", rest.trim()),
                    });
                }
            }
        }

        if !tokens.is_empty() {
            lines.push(Line {
                number,
                indent,
                tokens,
            });
        }
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_simple_line() {
        let lines = lex_lines("circuit = QuantumCircuit(2, 2)").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].indent, 0);
        assert_eq!(
            lines[0].tokens[0],
            Token::Identifier("circuit".to_string())
        );
        assert_eq!(lines[0].tokens[1], Token::Assign);
    }

    #[test]
    fn test_lex_indent_and_comments() {
        let source = "# build a bell pair\nfor i in range(2):\n    circuit.h(i)  # rotate\n";
        let lines = lex_lines(source).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].indent, 0);
        assert_eq!(lines[0].tokens[0], Token::For);
        assert_eq!(lines[1].indent, 4);
    }

    #[test]
    fn test_lex_string_literals() {
        let lines = lex_lines(r#"name = "bell"
other = 'ghz'"#)
            .unwrap();
        assert_eq!(
            lines[0].tokens[2],
            Token::StringLiteral("bell".to_string())
        );
        assert_eq!(lines[1].tokens[2], Token::StringLiteral("ghz".to_string()));
    }

    #[test]
    fn test_lex_rejects_garbage() {
        assert!(lex_lines("circuit = ?!").is_err());
    }
}
