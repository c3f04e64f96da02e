mod error;
mod evaluator;
mod lexer;
mod parser;

pub use error::*;
pub use evaluator::*;
pub use lexer::{contains_error, tokenize};
pub use parser::{insert_implicit_multiplication, parse, Parser, MAX_NESTING_DEPTH};

/// Stable identifier of a formula in the function registry.
pub type FunctionId = u32;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Operator(OperatorKind),
    NamedFunction(NamedFunction),
    FunctionRef(FunctionId),
}

impl Token {
    pub fn is_error(&self) -> bool {
        matches!(self, Token::Operator(OperatorKind::Err))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Plus,
    Minus,
    Multiply,
    Divide,
    Power,
    Open,
    Close,
    Abs,
    /// Lexing failed at this position.
    Err,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NamedFunction {
    Variable,
    Pi,
    E,
    Ln,
    Log,
    Sin,
    Cos,
    Tan,
    Ceil,
    Floor,
}

impl NamedFunction {
    /// The value-like names that stand on their own in a formula.
    pub fn as_variable(&self) -> Option<Variable> {
        match self {
            NamedFunction::Variable => Some(Variable::Bound),
            NamedFunction::Pi => Some(Variable::Pi),
            NamedFunction::E => Some(Variable::E),
            _ => None,
        }
    }

    /// The names that take a single primary as argument.
    pub fn as_math_function(&self) -> Option<MathFunction> {
        match self {
            NamedFunction::Ln => Some(MathFunction::Ln),
            NamedFunction::Log => Some(MathFunction::Log),
            NamedFunction::Sin => Some(MathFunction::Sin),
            NamedFunction::Cos => Some(MathFunction::Cos),
            NamedFunction::Tan => Some(MathFunction::Tan),
            NamedFunction::Ceil => Some(MathFunction::Ceil),
            NamedFunction::Floor => Some(MathFunction::Floor),
            NamedFunction::Variable | NamedFunction::Pi | NamedFunction::E => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(f64),
    Binary {
        left: Box<Expression>,
        operator: BinaryOperator,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Variable(Variable),
    Call {
        function: MathFunction,
        argument: Box<Expression>,
    },
    Abs(Box<Expression>),
    FunctionCall {
        id: FunctionId,
        argument: Box<Expression>,
    },
    Broken,
}

impl Expression {
    pub fn is_broken(&self) -> bool {
        matches!(self, Expression::Broken)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Variable {
    /// The bound input, `x` after axis substitution.
    Bound,
    Pi,
    E,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl BinaryOperator {
    pub fn apply(&self, left: f64, right: f64) -> Result<f64, EvalError> {
        match self {
            BinaryOperator::Add => Ok(left + right),
            BinaryOperator::Subtract => Ok(left - right),
            BinaryOperator::Multiply => Ok(left * right),
            BinaryOperator::Divide => {
                if right == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(left / right)
                }
            }
            BinaryOperator::Power => Ok(left.powf(right)),
        }
    }
}

impl TryFrom<OperatorKind> for BinaryOperator {
    type Error = OperatorKind;

    fn try_from(value: OperatorKind) -> Result<Self, Self::Error> {
        match value {
            OperatorKind::Plus => Ok(BinaryOperator::Add),
            OperatorKind::Minus => Ok(BinaryOperator::Subtract),
            OperatorKind::Multiply => Ok(BinaryOperator::Multiply),
            OperatorKind::Divide => Ok(BinaryOperator::Divide),
            OperatorKind::Power => Ok(BinaryOperator::Power),
            other => Err(other),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Plus,
    Minus,
}

impl UnaryOperator {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnaryOperator::Plus => value,
            UnaryOperator::Minus => -value,
        }
    }
}

impl TryFrom<OperatorKind> for UnaryOperator {
    type Error = OperatorKind;

    fn try_from(value: OperatorKind) -> Result<Self, Self::Error> {
        match value {
            OperatorKind::Plus => Ok(UnaryOperator::Plus),
            OperatorKind::Minus => Ok(UnaryOperator::Minus),
            other => Err(other),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Ln,
    Log,
    Sin,
    Cos,
    Tan,
    Ceil,
    Floor,
}

impl MathFunction {
    /// Trigonometry works in radians. `Log` is base 10.
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            MathFunction::Ln => value.ln(),
            MathFunction::Log => value.log10(),
            MathFunction::Sin => value.sin(),
            MathFunction::Cos => value.cos(),
            MathFunction::Tan => value.tan(),
            MathFunction::Ceil => value.ceil(),
            MathFunction::Floor => value.floor(),
        }
    }

    /// Rounding functions produce step curves.
    pub fn is_rounding(&self) -> bool {
        matches!(self, MathFunction::Ceil | MathFunction::Floor)
    }
}
