//! Recursive-descent parser for the sandboxed script subset.
//!
//! Blocks are recovered from line indentation; expressions use precedence
//! climbing. Statement forms outside the subset (`import`, `def`, `while`,
//! `class`, `lambda`) are rejected with a targeted error.

use crate::ast::{BinOp, CmpOp, Expr, Stmt};
use crate::error::{ScriptError, ScriptResult};
use crate::lexer::{lex_lines, Line, Token};

/// Parse a complete script into a statement list.
pub fn parse(source: &str) -> ScriptResult<Vec<Stmt>> {
    let lines = lex_lines(source)?;
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let base_indent = lines[0].indent;
    let mut parser = BlockParser { lines, pos: 0 };
    let block = parser.parse_block(base_indent)?;

    if parser.pos < parser.lines.len() {
        let line = &parser.lines[parser.pos];
        return Err(ScriptError::Syntax {
            line: line.number,
            message: "unexpected indentation".to_string(),
        });
    }

    Ok(block)
}

struct BlockParser {
    lines: Vec<Line>,
    pos: usize,
}

impl BlockParser {
    fn parse_block(&mut self, indent: usize) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = Vec::new();

        while self.pos < self.lines.len() {
            let line_indent = self.lines[self.pos].indent;
            if line_indent < indent {
                break;
            }
            if line_indent > indent {
                return Err(ScriptError::Syntax {
                    line: self.lines[self.pos].number,
                    message: "unexpected indentation".to_string(),
                });
            }
            stmts.push(self.parse_stmt(indent)?);
        }

        Ok(stmts)
    }

    fn parse_stmt(&mut self, indent: usize) -> ScriptResult<Stmt> {
        let line = self.lines[self.pos].clone();
        let number = line.number;

        match line.tokens.first() {
            Some(Token::Import) | Some(Token::From) => Err(ScriptError::DisallowedStatement {
                line: number,
                message: "'import' is not available in the sandbox".to_string(),
            }),
            Some(Token::Def) => Err(ScriptError::DisallowedStatement {
                line: number,
                message: "function definitions are not available in the sandbox".to_string(),
            }),
            Some(Token::Class) => Err(ScriptError::DisallowedStatement {
                line: number,
                message: "class definitions are not available in the sandbox".to_string(),
            }),
            Some(Token::While) => Err(ScriptError::DisallowedStatement {
                line: number,
                message: "'while' loops are not available in the sandbox".to_string(),
            }),
            Some(Token::Lambda) => Err(ScriptError::DisallowedStatement {
                line: number,
                message: "'lambda' is not available in the sandbox".to_string(),
            }),
            Some(Token::For) => self.parse_for(indent),
            Some(Token::If) => self.parse_if(indent),
            Some(Token::Else) => Err(ScriptError::Syntax {
                line: number,
                message: "'else' without a matching 'if'".to_string(),
            }),
            Some(_) => {
                self.pos += 1;
                let mut cursor = Cursor::new(&line.tokens, number);
                let stmt = parse_simple_stmt(&mut cursor)?;
                cursor.expect_end()?;
                Ok(stmt)
            }
            None => unreachable!("blank lines are dropped by the lexer"),
        }
    }

    /// `for <name> in <expr>:` with an inline statement or an indented body.
    fn parse_for(&mut self, indent: usize) -> ScriptResult<Stmt> {
        let line = self.lines[self.pos].clone();
        let number = line.number;
        self.pos += 1;

        let mut cursor = Cursor::new(&line.tokens, number);
        cursor.expect(&Token::For)?;
        let var = cursor.expect_identifier()?;
        cursor.expect(&Token::In)?;
        let iter = parse_expr(&mut cursor)?;
        cursor.expect(&Token::Colon)?;

        let body = self.parse_suite(&mut cursor, indent, number)?;
        Ok(Stmt::For {
            line: number,
            var,
            iter,
            body,
        })
    }

    /// `if <expr>:` with an optional `else:` clause at the same indent.
    fn parse_if(&mut self, indent: usize) -> ScriptResult<Stmt> {
        let line = self.lines[self.pos].clone();
        let number = line.number;
        self.pos += 1;

        let mut cursor = Cursor::new(&line.tokens, number);
        cursor.expect(&Token::If)?;
        let cond = parse_expr(&mut cursor)?;
        cursor.expect(&Token::Colon)?;

        let then_body = self.parse_suite(&mut cursor, indent, number)?;

        let mut else_body = Vec::new();
        if self.pos < self.lines.len()
            && self.lines[self.pos].indent == indent
            && self.lines[self.pos].tokens.first() == Some(&Token::Else)
        {
            let else_line = self.lines[self.pos].clone();
            self.pos += 1;
            let mut else_cursor = Cursor::new(&else_line.tokens, else_line.number);
            else_cursor.expect(&Token::Else)?;
            else_cursor.expect(&Token::Colon)?;
            else_body = self.parse_suite(&mut else_cursor, indent, else_line.number)?;
        }

        Ok(Stmt::If {
            line: number,
            cond,
            then_body,
            else_body,
        })
    }

    /// Parse a suite: either inline after the colon, or an indented block.
    fn parse_suite(
        &mut self,
        cursor: &mut Cursor<'_>,
        indent: usize,
        header_line: usize,
    ) -> ScriptResult<Vec<Stmt>> {
        if !cursor.is_end() {
            let stmt = parse_simple_stmt(cursor)?;
            cursor.expect_end()?;
            return Ok(vec![stmt]);
        }

        let Some(next) = self.lines.get(self.pos) else {
            return Err(ScriptError::Syntax {
                line: header_line,
                message: "expected an indented block".to_string(),
            });
        };
        if next.indent <= indent {
            return Err(ScriptError::Syntax {
                line: next.number,
                message: "expected an indented block".to_string(),
            });
        }
        self.parse_block(next.indent)
    }
}

/// A simple (single-line) statement: assignment or bare expression.
fn parse_simple_stmt(cursor: &mut Cursor<'_>) -> ScriptResult<Stmt> {
    let line = cursor.line;

    // Lookahead for `name = expr` (but not `name == expr`).
    if let (Some(Token::Identifier(name)), Some(Token::Assign)) = (cursor.peek(), cursor.peek_at(1))
    {
        let name = name.clone();
        cursor.advance();
        cursor.advance();
        let value = parse_expr(cursor)?;
        return Ok(Stmt::Assign { line, name, value });
    }

    let expr = parse_expr(cursor)?;
    Ok(Stmt::Expr { line, expr })
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token], line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn is_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn expect(&mut self, expected: &Token) -> ScriptResult<()> {
        match self.advance().cloned() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected:?}, found {token:?}"))),
            None => Err(self.error(format!("expected {expected:?}, found end of line"))),
        }
    }

    fn expect_identifier(&mut self) -> ScriptResult<String> {
        match self.advance().cloned() {
            Some(Token::Identifier(name)) => Ok(name),
            Some(token) => Err(self.error(format!("expected a name, found {token:?}"))),
            None => Err(self.error("expected a name, found end of line")),
        }
    }

    fn expect_end(&mut self) -> ScriptResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(self.error(format!("unexpected trailing {token:?}"))),
        }
    }
}

fn parse_expr(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    parse_comparison(cursor)
}

fn parse_comparison(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    let lhs = parse_additive(cursor)?;

    let op = match cursor.peek() {
        Some(Token::EqEq) => Some(CmpOp::Eq),
        Some(Token::NotEq) => Some(CmpOp::NotEq),
        Some(Token::Lt) => Some(CmpOp::Lt),
        Some(Token::Le) => Some(CmpOp::Le),
        Some(Token::Gt) => Some(CmpOp::Gt),
        Some(Token::Ge) => Some(CmpOp::Ge),
        _ => None,
    };

    if let Some(op) = op {
        cursor.advance();
        let rhs = parse_additive(cursor)?;
        return Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        });
    }

    Ok(lhs)
}

fn parse_additive(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    let mut lhs = parse_term(cursor)?;

    loop {
        let op = match cursor.peek() {
            Some(Token::Plus) => BinOp::Add,
            Some(Token::Minus) => BinOp::Sub,
            _ => break,
        };
        cursor.advance();
        let rhs = parse_term(cursor)?;
        lhs = Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }

    Ok(lhs)
}

fn parse_term(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    let mut lhs = parse_unary(cursor)?;

    loop {
        let op = match cursor.peek() {
            Some(Token::Star) => BinOp::Mul,
            Some(Token::Slash) => BinOp::Div,
            Some(Token::Percent) => BinOp::Mod,
            _ => break,
        };
        cursor.advance();
        let rhs = parse_unary(cursor)?;
        lhs = Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }

    Ok(lhs)
}

fn parse_unary(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    if cursor.peek() == Some(&Token::Minus) {
        cursor.advance();
        let inner = parse_unary(cursor)?;
        return Ok(Expr::Neg(Box::new(inner)));
    }
    parse_postfix(cursor)
}

fn parse_postfix(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    let mut expr = parse_primary(cursor)?;

    loop {
        match cursor.peek() {
            Some(Token::LParen) => {
                cursor.advance();
                let args = parse_call_args(cursor)?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            }
            Some(Token::Dot) => {
                cursor.advance();
                let name = cursor.expect_identifier()?;
                expr = Expr::Attr {
                    obj: Box::new(expr),
                    name,
                };
            }
            Some(Token::LBracket) => {
                cursor.advance();
                let index = parse_expr(cursor)?;
                cursor.expect(&Token::RBracket)?;
                expr = Expr::Index {
                    obj: Box::new(expr),
                    index: Box::new(index),
                };
            }
            _ => break,
        }
    }

    Ok(expr)
}

fn parse_call_args(cursor: &mut Cursor<'_>) -> ScriptResult<Vec<Expr>> {
    let mut args = Vec::new();

    if cursor.peek() == Some(&Token::RParen) {
        cursor.advance();
        return Ok(args);
    }

    loop {
        args.push(parse_expr(cursor)?);
        match cursor.advance().cloned() {
            Some(Token::Comma) => continue,
            Some(Token::RParen) => break,
            Some(token) => {
                return Err(cursor.error(format!("expected ',' or ')', found {token:?}")));
            }
            None => return Err(cursor.error("unclosed call, expected ')'")),
        }
    }

    Ok(args)
}

fn parse_primary(cursor: &mut Cursor<'_>) -> ScriptResult<Expr> {
    match cursor.advance().cloned() {
        Some(Token::IntLiteral(v)) => Ok(Expr::Int(v)),
        Some(Token::FloatLiteral(v)) => Ok(Expr::Float(v)),
        Some(Token::StringLiteral(s)) => Ok(Expr::Str(s)),
        Some(Token::True) => Ok(Expr::Bool(true)),
        Some(Token::False) => Ok(Expr::Bool(false)),
        Some(Token::Identifier(name)) => Ok(Expr::Name(name)),
        Some(Token::LParen) => {
            let expr = parse_expr(cursor)?;
            cursor.expect(&Token::RParen)?;
            Ok(expr)
        }
        Some(Token::LBracket) => {
            let mut items = Vec::new();
            if cursor.peek() == Some(&Token::RBracket) {
                cursor.advance();
                return Ok(Expr::List(items));
            }
            loop {
                items.push(parse_expr(cursor)?);
                match cursor.advance().cloned() {
                    Some(Token::Comma) => continue,
                    Some(Token::RBracket) => break,
                    Some(token) => {
                        return Err(
                            cursor.error(format!("expected ',' or ']', found {token:?}"))
                        );
                    }
                    None => return Err(cursor.error("unclosed list, expected ']'")),
                }
            }
            Ok(Expr::List(items))
        }
        Some(token) => Err(cursor.error(format!("unexpected {token:?}"))),
        None => Err(cursor.error("unexpected end of line")),
    }
}
