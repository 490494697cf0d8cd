use crate::location::SourceLocation;
use thiserror::Error;

/// Scanning failure: unterminated tag, bad control keyword or unreadable
/// include.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Tokenizer Error - {message} {location}")]
pub struct TokenizerError {
    pub message: String,
    pub location: SourceLocation,
}

impl TokenizerError {
    pub(crate) fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Structural failure: a block is never closed or a closer has no opener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parser Error - {message} {location}")]
pub struct ParserError {
    pub message: String,
    pub location: SourceLocation,
}

impl ParserError {
    pub(crate) fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// A fault raised by an embedded expression, before it is tied to a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("{0} is not defined")]
    Reference(String),
    #[error("{0}")]
    Syntax(String),
    #[error("{0}")]
    Type(String),
    #[error("{name}: {message}")]
    Function { name: String, message: String },
}

impl ExprError {
    /// Faults that mean "this expression cannot be evaluated here" rather
    /// than "evaluation went wrong".
    pub fn is_reference_or_syntax(&self) -> bool {
        matches!(self, ExprError::Reference(_) | ExprError::Syntax(_))
    }
}

/// An expression fault annotated with the node it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Evaluator Error - {fault} {location}")]
pub struct EvaluatorError {
    pub fault: ExprError,
    pub location: SourceLocation,
}

impl EvaluatorError {
    pub(crate) fn new(fault: ExprError, location: &SourceLocation) -> Self {
        Self {
            fault,
            location: location.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tag '{0}' must not be empty")]
    EmptyTag(&'static str),
    #[error("could not read config file '{path}'")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file '{path}'")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("context must be a JSON object")]
    ContextNotObject,
}
