//! Assertion expression language.
//!
//! A small, pure expression language for user-authored assertion fields:
//! literals, comparison/logical/arithmetic operators, member and index
//! access, `in` membership tests and a fixed set of built-in functions.
//! Expressions evaluate against a named-value environment under a
//! caller-supplied deadline; there is no I/O and the environment is never
//! mutated.

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinOp, Expr, UnOp};
pub use eval::{evaluate, lookup_path, Evaluator};

use thiserror::Error;

use crate::error::CoreError;

/// Typed evaluation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// The expression does not parse
    #[error("syntax: {0}")]
    Syntax(String),
    /// An operator or built-in was applied to the wrong kind of value
    #[error("type: {0}")]
    Type(String),
    /// A name or member did not resolve
    #[error("missing key: {0}")]
    MissingKey(String),
    /// The caller-supplied deadline expired mid-evaluation
    #[error("timeout: evaluation exceeded its deadline")]
    Timeout,
}

impl From<ExprError> for CoreError {
    fn from(err: ExprError) -> Self {
        match err {
            ExprError::Timeout => CoreError::Timeout("expression evaluation".to_string()),
            other => CoreError::EvaluationError(other.to_string()),
        }
    }
}
