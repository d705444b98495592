//! A small boolean expression language over the current stack line.
//!
//! ```text
//! expr    := or [';']
//! or      := and ('||' and)*
//! and     := unary ('&&' unary)*
//! unary   := '!' unary | primary
//! primary := 'true' | 'false' | '(' or ')' | 'line' '.' method '(' [string] ')'
//! method  := contains | startsWith | endsWith | equals | isEmpty
//! ```
//!
//! The expression evaluates to `true` when the line should be skipped, e.g.
//! `line.contains("$Proxy") || line.startsWith("at sun.reflect.")`.

use crate::domain::predicate::LineSkipPredicate;
use std::fmt;

/// Error raised while compiling an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ExpressionError {
    pub offset: usize,
    pub message: String,
}

impl ExpressionError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Not,
    And,
    Or,
    Dot,
    LParen,
    RParen,
    Semi,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Not => f.write_str("'!'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Dot => f.write_str("'.'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Semi => f.write_str("';'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push((offset, Token::Not));
            }
            '.' => {
                chars.next();
                tokens.push((offset, Token::Dot));
            }
            '(' => {
                chars.next();
                tokens.push((offset, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((offset, Token::RParen));
            }
            ';' => {
                chars.next();
                tokens.push((offset, Token::Semi));
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        tokens.push((offset, if c == '&' { Token::And } else { Token::Or }));
                    }
                    _ => {
                        return Err(ExpressionError::new(
                            offset,
                            format!("expected '{}{}'", c, c),
                        ))
                    }
                }
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((escape_at, '\\')) => match chars.next() {
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\\')) => value.push('\\'),
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            _ => {
                                return Err(ExpressionError::new(escape_at, "invalid escape"))
                            }
                        },
                        Some((_, other)) => value.push(other),
                        None => {
                            return Err(ExpressionError::new(offset, "unterminated string"))
                        }
                    }
                }
                tokens.push((offset, Token::Str(value)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((offset, Token::Ident(ident)));
            }
            other => {
                return Err(ExpressionError::new(
                    offset,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
    IsEmpty,
}

impl Method {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Method::Contains),
            "startsWith" => Some(Method::StartsWith),
            "endsWith" => Some(Method::EndsWith),
            "equals" => Some(Method::Equals),
            "isEmpty" => Some(Method::IsEmpty),
            _ => None,
        }
    }

    fn takes_argument(&self) -> bool {
        !matches!(self, Method::IsEmpty)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(bool),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Call(Method, String),
}

impl Expr {
    fn eval(&self, line: &str) -> bool {
        match self {
            Expr::Literal(value) => *value,
            Expr::Not(inner) => !inner.eval(line),
            Expr::And(left, right) => left.eval(line) && right.eval(line),
            Expr::Or(left, right) => left.eval(line) || right.eval(line),
            Expr::Call(method, arg) => match method {
                Method::Contains => line.contains(arg.as_str()),
                Method::StartsWith => line.starts_with(arg.as_str()),
                Method::EndsWith => line.ends_with(arg.as_str()),
                Method::Equals => line == arg,
                Method::IsEmpty => line.is_empty(),
            },
        }
    }
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExpressionError::new(
                offset,
                format!("expected {}, found {}", expected, token),
            )),
            None => Err(ExpressionError::new(
                offset,
                format!("expected {}, found end of input", expected),
            )),
        }
    }

    fn parse(mut self) -> Result<Expr, ExpressionError> {
        if self.tokens.is_empty() {
            return Err(ExpressionError::new(0, "empty expression"));
        }
        let expr = self.parse_or()?;
        if self.peek() == Some(&Token::Semi) {
            self.pos += 1;
        }
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(ExpressionError::new(
                self.offset(),
                format!("unexpected {}", token),
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(true)),
                "false" => Ok(Expr::Literal(false)),
                "line" => self.parse_call(),
                _ => Err(ExpressionError::new(
                    offset,
                    format!("unknown identifier '{}', only 'line' is in scope", name),
                )),
            },
            Some(token) => Err(ExpressionError::new(
                offset,
                format!("unexpected {}", token),
            )),
            None => Err(ExpressionError::new(offset, "unexpected end of input")),
        }
    }

    fn parse_call(&mut self) -> Result<Expr, ExpressionError> {
        self.expect(Token::Dot)?;
        let offset = self.offset();
        let method = match self.advance() {
            Some(Token::Ident(name)) => Method::lookup(&name).ok_or_else(|| {
                ExpressionError::new(offset, format!("unknown method '{}'", name))
            })?,
            _ => return Err(ExpressionError::new(offset, "expected method name")),
        };
        self.expect(Token::LParen)?;

        let argument = if method.takes_argument() {
            let offset = self.offset();
            match self.advance() {
                Some(Token::Str(value)) => value,
                _ => return Err(ExpressionError::new(offset, "expected string argument")),
            }
        } else {
            String::new()
        };
        self.expect(Token::RParen)?;
        Ok(Expr::Call(method, argument))
    }
}

/// A compiled line expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LineExpression {
    source: String,
    expr: Expr,
}

impl LineExpression {
    /// Compile `source`. Errors carry the byte offset of the offending token.
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let expr = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        }
        .parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against a rendered stack line.
    pub fn evaluate(&self, line: &str) -> bool {
        self.expr.eval(line)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl LineSkipPredicate for LineExpression {
    fn should_skip_line(&self, line: &str) -> bool {
        self.evaluate(line)
    }
}
