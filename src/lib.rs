pub mod ast;
pub mod registry;
pub mod sampler;

use ast::{EvalError, Evaluator, ParseError, Parser};
use registry::FunctionRegistry;
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),
}

/// Parses `expression` and evaluates it once with `x = bound_value`.
pub fn evaluate_expression<R: FunctionRegistry + ?Sized>(
    expression: &str,
    bound_value: f64,
    registry: &R,
) -> Result<f64, Error> {
    let ast = Parser::parse_expression(expression)?;
    let evaluation = Evaluator::new(registry).evaluate(&ast, bound_value, None);
    Ok(evaluation.into_result()?)
}
