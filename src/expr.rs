//! Lexer and recursive-descent parser for the expression language used
//! inside `[[ ]]` and control tags.
//!
//! The grammar is a small JavaScript-flavoured subset: literals, names
//! looked up in the context, member/index access, calls, and the usual
//! arithmetic, comparison, logical and conditional operators. There is no
//! assignment and no way to reach anything outside the context.

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::error::ExprError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    True,
    False,
    Null,
    Undefined,

    // Symbols
    Dot,
    Comma,
    Colon,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::Number(n) => return write!(f, "{}", n),
            Token::Str(s) => return write!(f, "'{}'", s),
            Token::Ident(s) => s,
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::Undefined => "undefined",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Question => "?",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::EqEqEq => "===",
            Token::NotEqEq => "!==",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
        };
        f.write_str(s)
    }
}

// Longest first so `===` is not read as `==` followed by `=`.
const SYMBOLS: &[(&str, Token)] = &[
    ("===", Token::EqEqEq),
    ("!==", Token::NotEqEq),
    ("==", Token::EqEq),
    ("!=", Token::NotEq),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("&&", Token::AndAnd),
    ("||", Token::OrOr),
    (".", Token::Dot),
    (",", Token::Comma),
    (":", Token::Colon),
    ("?", Token::Question),
    ("(", Token::LParen),
    (")", Token::RParen),
    ("[", Token::LBracket),
    ("]", Token::RBracket),
    ("{", Token::LBrace),
    ("}", Token::RBrace),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    ("!", Token::Bang),
    ("<", Token::Lt),
    (">", Token::Gt),
];

/// Deepest nesting of operators, brackets and calls one expression may use.
pub const MAX_EXPR_DEPTH: usize = 64;

fn invalid_token() -> ExprError {
    ExprError::Syntax("Invalid or unexpected token".to_string())
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

struct Lexer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    fn tokenize(mut self) -> Result<Vec<Token>, ExprError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ExprError> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let rest = self.remaining();
        let first = match rest.chars().next() {
            Some(c) => c,
            None => return Ok(None),
        };

        if first.is_ascii_digit()
            || (first == '.' && rest[1..].starts_with(|c: char| c.is_ascii_digit()))
        {
            return self.number().map(Some);
        }

        if first == '\'' || first == '"' {
            return self.string(first).map(Some);
        }

        if is_ident_start(first) {
            let len: usize = rest
                .chars()
                .take_while(|c| is_ident_continue(*c))
                .map(char::len_utf8)
                .sum();
            let ident = &rest[..len];
            self.advance(len);
            return Ok(Some(match ident {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "undefined" => Token::Undefined,
                _ => Token::Ident(ident.to_string()),
            }));
        }

        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok(Some(token.clone()));
            }
        }

        Err(invalid_token())
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let rest = self.remaining();
        let bytes = rest.as_bytes();
        let mut end = 0;
        while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
            end += 1;
        }
        if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp = end + 1;
            if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                    exp += 1;
                }
                end = exp;
            }
        }
        // `1abc` is a syntax error, not `1` followed by `abc`.
        if rest[end..].starts_with(is_ident_start) {
            return Err(invalid_token());
        }
        let value = rest[..end].parse::<f64>().map_err(|_| invalid_token())?;
        self.advance(end);
        Ok(Token::Number(value))
    }

    fn string(&mut self, quote: char) -> Result<Token, ExprError> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token::Str(s));
            }
            match c {
                '\\' => match chars.next() {
                    Some((_, esc)) => s.push(match esc {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    }),
                    None => break,
                },
                '\n' => break,
                _ => s.push(c),
            }
        }
        // Unterminated string
        Err(invalid_token())
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    // Open nesting levels; every level is one recursion in parsing and in
    // evaluation.
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(ExprError::Syntax("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn ascend(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.consume() {
            Some(t) if t == token => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        self.descend()?;
        let then = self.parse_ternary()?;
        self.expect(Token::Colon)?;
        let otherwise = self.parse_ternary()?;
        self.ascend(1);
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    /// One left-associative precedence level.
    fn binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut lhs = next(self)?;
        // Each operator nests the chain so far one level deeper.
        let mut levels = 0;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    self.descend()?;
                    levels += 1;
                    let rhs = next(self)?;
                    lhs = Expr::BinOp(Box::new(lhs), *op, Box::new(rhs));
                    continue 'outer;
                }
            }
            self.ascend(levels);
            return Ok(lhs);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(Token::OrOr, BinOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(&[(Token::AndAnd, BinOp::And)], Self::parse_eq)
    }

    fn parse_eq(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (Token::EqEqEq, BinOp::StrictEq),
                (Token::NotEqEq, BinOp::StrictNotEq),
                (Token::EqEq, BinOp::Eq),
                (Token::NotEq, BinOp::NotEq),
            ],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (Token::Lt, BinOp::Lt),
                (Token::Le, BinOp::Le),
                (Token::Gt, BinOp::Gt),
                (Token::Ge, BinOp::Ge),
            ],
            Self::parse_add,
        )
    }

    fn parse_add(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Self::parse_mul,
        )
    }

    fn parse_mul(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (Token::Star, BinOp::Mul),
                (Token::Slash, BinOp::Div),
                (Token::Percent, BinOp::Rem),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            _ => return self.parse_postfix(),
        };
        self.consume();
        self.descend()?;
        let operand = self.parse_unary()?;
        self.ascend(1);
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        let mut levels = 0;

        // Handle suffixes: .attr, ['key'], (args)
        loop {
            match self.peek() {
                Some(Token::Dot | Token::LBracket | Token::LParen) => {
                    self.descend()?;
                    levels += 1;
                }
                _ => break,
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.consume();
                    let attr = match self.consume() {
                        Some(Token::Ident(name)) => name,
                        Some(
                            keyword @ (Token::True
                            | Token::False
                            | Token::Null
                            | Token::Undefined),
                        ) => keyword.to_string(),
                        other => return Err(unexpected(other)),
                    };
                    expr = Expr::Attribute(Box::new(expr), attr);
                }
                Some(Token::LBracket) => {
                    self.consume();
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                Some(Token::LParen) => {
                    self.consume();
                    let args = self.parse_list(Token::RParen)?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => break,
            }
        }

        self.ascend(levels);
        Ok(expr)
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn parse_list(&mut self, close: Token) -> Result<Vec<Expr>, ExprError> {
        self.descend()?;
        let mut items = Vec::new();
        while !self.eat(&close) {
            items.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                self.expect(close)?;
                break;
            }
        }
        self.ascend(1);
        Ok(items)
    }

    fn parse_object(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            let key = match self.consume() {
                Some(Token::Ident(name)) | Some(Token::Str(name)) => name,
                Some(Token::Number(n)) => crate::value::Value::Number(n).to_string(),
                other => return Err(unexpected(other)),
            };
            self.expect(Token::Colon)?;
            entries.push((key, self.parse_expr()?));
            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        self.ascend(1);
        Ok(Expr::ObjectLit(entries))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::NumberLit(n)),
            Some(Token::Str(s)) => Ok(Expr::StringLit(s)),
            Some(Token::True) => Ok(Expr::BoolLit(true)),
            Some(Token::False) => Ok(Expr::BoolLit(false)),
            Some(Token::Null) | Some(Token::Undefined) => Ok(Expr::NullLit),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                self.descend()?;
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                self.ascend(1);
                Ok(e)
            }
            Some(Token::LBracket) => Ok(Expr::ArrayLit(self.parse_list(Token::RBracket)?)),
            Some(Token::LBrace) => self.parse_object(),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(token: Option<Token>) -> ExprError {
    match token {
        Some(t) => ExprError::Syntax(format!("Unexpected token '{}'", t)),
        None => ExprError::Syntax("Unexpected end of input".to_string()),
    }
}

/// Compile expression source into its AST.
pub fn compile(source: &str) -> Result<Expr, ExprError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    match parser.consume() {
        None => Ok(expr),
        trailing => Err(unexpected(trailing)),
    }
}
