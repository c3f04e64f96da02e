use crate::ast::FunctionId;
use thiserror::Error;

/// Why a formula could not be turned into an expression tree.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("formula contains unrecognised input")]
    Lex,

    #[error("formula is malformed")]
    Broken,
}

/// Why an evaluation failed.
///
/// The evaluation context keeps the first cause it sees; the boolean error
/// flag stays the authoritative signal.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("recursion limit reached while calling f{0}")]
    RecursionLimit(FunctionId),

    #[error("f{0} calls itself")]
    SelfReference(FunctionId),

    #[error("no function with id {0}")]
    UnknownFunction(FunctionId),

    #[error("referenced formula f{0} cannot be parsed")]
    BrokenReference(FunctionId),

    #[error("result is not a finite number")]
    NonFinite,

    #[error("expression is broken")]
    BrokenExpression,
}
