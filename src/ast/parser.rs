use crate::ast::{
    contains_error, tokenize, BinaryOperator, Expression, OperatorKind, ParseError, Token,
    UnaryOperator,
};
use log::{debug, trace};

/// Deepest nesting of brackets, bars, signs, function arguments and operator
/// chains a formula may have. Anything deeper is broken.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Recursive-descent parser over a token stream.
///
/// Parsing never panics: any grammar violation sets the broken flag and the
/// root of the result becomes `Expression::Broken`.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
    broken: bool,
}

impl Parser {
    /// A stream containing a lexer error is broken before any token is read.
    pub fn new(tokens: Vec<Token>) -> Self {
        if contains_error(&tokens) {
            debug!("Token stream contains a lexer error, refusing to parse");
            return Self {
                tokens,
                position: 0,
                depth: 0,
                broken: true,
            };
        }

        Self {
            tokens: insert_implicit_multiplication(tokens),
            position: 0,
            depth: 0,
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Builds the expression tree. Unconsumed trailing tokens break the parse.
    pub fn parse(&mut self) -> Expression {
        if self.broken {
            return Expression::Broken;
        }

        let expression = self.parse_additive();
        if self.position < self.tokens.len() {
            debug!(
                "Trailing tokens after position {}: {:?}",
                self.position,
                &self.tokens[self.position..]
            );
            self.broken = true;
        }

        if self.broken {
            Expression::Broken
        } else {
            debug!("Parse result: {:#?}", expression);
            expression
        }
    }

    /// Tokenizes and parses `input` in one go.
    pub fn parse_expression(input: &str) -> Result<Expression, ParseError> {
        let tokens = tokenize(input);
        if contains_error(&tokens) {
            return Err(ParseError::Lex);
        }

        let mut parser = Parser::new(tokens);
        let expression = parser.parse();
        if parser.is_broken() {
            Err(ParseError::Broken)
        } else {
            Ok(expression)
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Consumes the next token if it is one of `operators` and returns which one.
    fn match_operator(&mut self, operators: &[OperatorKind]) -> Option<OperatorKind> {
        match self.peek() {
            Some(Token::Operator(kind)) if operators.contains(kind) => {
                let kind = *kind;
                self.position += 1;
                Some(kind)
            }
            _ => None,
        }
    }

    /// Consumes a required closing delimiter.
    fn expect_operator(&mut self, operator: OperatorKind) -> bool {
        if self.match_operator(&[operator]).is_some() {
            true
        } else {
            trace!("Expected {:?} at position {}", operator, self.position);
            self.broken = true;
            false
        }
    }

    /// Runs `parse` one nesting level deeper, breaking the parse past
    /// [`MAX_NESTING_DEPTH`].
    fn nested(&mut self, parse: fn(&mut Self) -> Expression) -> Expression {
        if !self.descend() {
            return Expression::Broken;
        }
        let expression = parse(self);
        self.depth -= 1;
        expression
    }

    fn descend(&mut self) -> bool {
        if self.depth >= MAX_NESTING_DEPTH {
            trace!("Nesting deeper than {} at position {}", MAX_NESTING_DEPTH, self.position);
            self.broken = true;
            return false;
        }
        self.depth += 1;
        true
    }

    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> Expression,
        operators: &[OperatorKind],
    ) -> Expression {
        let entry_depth = self.depth;
        let mut node = next(self);

        // Each fold deepens the left spine of the tree by one.
        while !self.broken {
            let Some(kind) = self.match_operator(operators) else {
                break;
            };
            let Ok(operator) = BinaryOperator::try_from(kind) else {
                self.broken = true;
                break;
            };
            if !self.descend() {
                break;
            }

            let right = next(self);
            node = Expression::Binary {
                left: Box::new(node),
                operator,
                right: Box::new(right),
            };
        }

        self.depth = entry_depth;
        node
    }

    fn parse_additive(&mut self) -> Expression {
        self.parse_binary(
            Self::parse_multiplicative,
            &[OperatorKind::Plus, OperatorKind::Minus],
        )
    }

    fn parse_multiplicative(&mut self) -> Expression {
        self.parse_binary(
            Self::parse_power,
            &[OperatorKind::Multiply, OperatorKind::Divide],
        )
    }

    // Same loop as the other levels, so `^` groups to the left.
    fn parse_power(&mut self) -> Expression {
        self.parse_binary(Self::parse_unary, &[OperatorKind::Power])
    }

    fn parse_unary(&mut self) -> Expression {
        if let Some(kind) = self.match_operator(&[OperatorKind::Plus, OperatorKind::Minus]) {
            let Ok(operator) = UnaryOperator::try_from(kind) else {
                self.broken = true;
                return Expression::Broken;
            };
            let operand = self.nested(Self::parse_unary);
            return Expression::Unary {
                operator,
                operand: Box::new(operand),
            };
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Expression {
        if self.broken {
            return Expression::Broken;
        }

        let Some(token) = self.peek().copied() else {
            trace!("Unexpected end of input");
            self.broken = true;
            return Expression::Broken;
        };
        self.position += 1;

        match token {
            Token::Number(value) => Expression::Literal(value),
            Token::NamedFunction(name) => {
                if let Some(variable) = name.as_variable() {
                    return Expression::Variable(variable);
                }
                match name.as_math_function() {
                    Some(function) => Expression::Call {
                        function,
                        argument: Box::new(self.nested(Self::parse_primary)),
                    },
                    None => {
                        self.broken = true;
                        Expression::Broken
                    }
                }
            }
            Token::FunctionRef(id) => Expression::FunctionCall {
                id,
                argument: Box::new(self.nested(Self::parse_primary)),
            },
            Token::Operator(OperatorKind::Open) => {
                let inner = self.nested(Self::parse_additive);
                if self.expect_operator(OperatorKind::Close) {
                    inner
                } else {
                    Expression::Broken
                }
            }
            Token::Operator(OperatorKind::Abs) => {
                let inner = self.nested(Self::parse_additive);
                if self.expect_operator(OperatorKind::Abs) {
                    Expression::Abs(Box::new(inner))
                } else {
                    Expression::Broken
                }
            }
            Token::Operator(kind) => {
                trace!("Unexpected {:?} where an operand was expected", kind);
                self.broken = true;
                Expression::Broken
            }
        }
    }
}

/// Parses `tokens`, returning the tree and whether the parse broke.
pub fn parse(tokens: Vec<Token>) -> (Expression, bool) {
    let mut parser = Parser::new(tokens);
    let expression = parser.parse();
    (expression, parser.is_broken())
}

/// Inserts a `Multiply` between adjacent tokens where the left one can end a
/// primary and the right one can start one, so `2x` reads as `2*x`.
///
/// A `|` closes an absolute value when one is open and the token before it
/// ends a primary; otherwise it opens a new one.
pub fn insert_implicit_multiplication(tokens: Vec<Token>) -> Vec<Token> {
    let mut output = Vec::with_capacity(tokens.len() * 2);
    let mut open_bars = 0usize;
    let mut previous_ends = false;

    for token in tokens {
        let (starts, ends) = match token {
            Token::Number(_) => (true, true),
            Token::NamedFunction(name) => (true, name.as_variable().is_some()),
            Token::FunctionRef(_) => (true, false),
            Token::Operator(OperatorKind::Open) => (true, false),
            Token::Operator(OperatorKind::Close) => (false, true),
            Token::Operator(OperatorKind::Abs) => {
                if open_bars > 0 && previous_ends {
                    open_bars -= 1;
                    (false, true)
                } else {
                    open_bars += 1;
                    (true, false)
                }
            }
            Token::Operator(_) => (false, false),
        };

        if previous_ends && starts {
            output.push(Token::Operator(OperatorKind::Multiply));
        }
        previous_ends = ends;
        output.push(token);
    }

    output
}
