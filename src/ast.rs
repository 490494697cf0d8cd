use crate::error::ExprError;
use crate::expr;
use crate::location::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,       // ==
    NotEq,    // !=
    StrictEq, // ===
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NullLit,
    BoolLit(bool),
    NumberLit(f64),
    StringLit(String),
    ArrayLit(Vec<Expr>),
    ObjectLit(Vec<(String, Expr)>),
    Var(String),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo['bar']
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Expression text as written in a tag, compiled once at parse time.
///
/// A compile fault is kept rather than raised so that it surfaces as an
/// evaluation error, and only if the expression is actually reached.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    compiled: Result<Expr, ExprError>,
}

impl Expression {
    pub fn compile(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = expr::compile(&source);
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> Result<&Expr, &ExprError> {
        self.compiled.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub condition: Expression,
    pub body: Vec<Node>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Plain(String),
    Expression {
        expr: Expression,
        location: SourceLocation,
    },
    For {
        variable: String,     // e.g., "model"
        iterable: Expression, // e.g., "models"
        body: Vec<Node>,
        location: SourceLocation,
    },
    If {
        condition: Expression,
        body: Vec<Node>,
        else_ifs: Vec<ElseIf>,
        else_body: Option<Vec<Node>>,
        location: SourceLocation,
    },
}

pub type Template = Vec<Node>;
