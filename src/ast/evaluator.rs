use crate::ast::{contains_error, tokenize, EvalError, Expression, FunctionId, Parser, Variable};
use crate::registry::FunctionRegistry;
use log::{debug, trace};
use std::collections::HashMap;
use std::f64::consts;

/// Deepest chain of cross-function calls that may still be entered.
pub const MAX_RECURSION_DEPTH: u32 = 2;

/// Mutable state of one evaluation.
///
/// The cross-reference cache lives as long as the context; everything else
/// is reset for each sample point by [`EvaluationContext::reset`].
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub bound_value: f64,
    pub used_floor_or_ceil: bool,
    /// Id of the formula being evaluated, `None` for a free-standing one.
    pub own_function_id: Option<FunctionId>,
    pub recursion_depth: u32,
    error: Option<EvalError>,
    cross_references: HashMap<FunctionId, Expression>,
}

impl EvaluationContext {
    pub fn new(bound_value: f64, own_function_id: Option<FunctionId>) -> Self {
        Self {
            bound_value,
            own_function_id,
            ..Default::default()
        }
    }

    fn nested(bound_value: f64, function_id: FunctionId, recursion_depth: u32) -> Self {
        Self {
            bound_value,
            own_function_id: Some(function_id),
            recursion_depth,
            ..Default::default()
        }
    }

    /// Prepares the context for another sample point of the same formula,
    /// keeping the already parsed cross-references.
    pub fn reset(&mut self, bound_value: f64) {
        self.bound_value = bound_value;
        self.used_floor_or_ceil = false;
        self.recursion_depth = 0;
        self.error = None;
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// First failure recorded in this context.
    pub fn failure(&self) -> Option<EvalError> {
        self.error
    }

    /// Number of referenced formulas parsed so far.
    pub fn cached_references(&self) -> usize {
        self.cross_references.len()
    }

    /// Flags the evaluation as failed and returns the failure sentinel.
    pub fn fail(&mut self, error: EvalError) -> f64 {
        trace!("Evaluation failed: {}", error);
        self.error.get_or_insert(error);
        f64::NAN
    }
}

/// Outcome of a top-level evaluation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Evaluation {
    /// Meaningless when `error` is set.
    pub value: f64,
    pub error: bool,
    pub used_floor_or_ceil: bool,
    pub failure: Option<EvalError>,
}

impl Evaluation {
    /// The value, if the evaluation succeeded.
    pub fn value(&self) -> Option<f64> {
        (!self.error).then_some(self.value)
    }

    pub fn into_result(self) -> Result<f64, EvalError> {
        match self.failure {
            Some(error) => Err(error),
            None if self.error => Err(EvalError::NonFinite),
            None => Ok(self.value),
        }
    }
}

/// Tree-walking interpreter. Cross-function calls are resolved through the
/// borrowed registry, which must not change during an evaluation.
pub struct Evaluator<'r, R: FunctionRegistry + ?Sized> {
    registry: &'r R,
}

impl<'r, R: FunctionRegistry + ?Sized> Evaluator<'r, R> {
    pub fn new(registry: &'r R) -> Self {
        Self { registry }
    }

    /// Evaluates `expression` with a fresh context.
    pub fn evaluate(
        &self,
        expression: &Expression,
        bound_value: f64,
        own_function_id: Option<FunctionId>,
    ) -> Evaluation {
        let mut context = EvaluationContext::new(bound_value, own_function_id);
        self.evaluate_with(expression, &mut context)
    }

    /// Evaluates `expression` with a caller-provided context. A non-finite
    /// result is reported as a failure.
    pub fn evaluate_with(
        &self,
        expression: &Expression,
        context: &mut EvaluationContext,
    ) -> Evaluation {
        let value = self.evaluate_node(expression, context);
        if !context.has_error() && !value.is_finite() {
            context.fail(EvalError::NonFinite);
        }

        Evaluation {
            value,
            error: context.has_error(),
            used_floor_or_ceil: context.used_floor_or_ceil,
            failure: context.failure(),
        }
    }

    /// Tokenizes, parses and evaluates a formula once.
    ///
    /// # Arguments
    ///
    /// * `expression` - Formula text written with `x` as the bound variable.
    /// * `bound_value` - Value substituted for `x`.
    /// * `own_function_id` - Registry id of the formula, if it has one.
    pub fn evaluate_expression(
        &self,
        expression: &str,
        bound_value: f64,
        own_function_id: Option<FunctionId>,
    ) -> Evaluation {
        let mut parser = Parser::new(tokenize(expression));
        let ast = parser.parse();
        self.evaluate(&ast, bound_value, own_function_id)
    }

    /// Evaluates a single node. Failures set the context's error flag and
    /// return NaN.
    pub fn evaluate_node(&self, expression: &Expression, context: &mut EvaluationContext) -> f64 {
        match expression {
            Expression::Literal(value) => *value,

            Expression::Binary {
                left,
                operator,
                right,
            } => {
                let left_value = self.evaluate_node(left, context);
                let right_value = self.evaluate_node(right, context);
                match operator.apply(left_value, right_value) {
                    Ok(value) if introduced_nan(value, &[left_value, right_value]) => {
                        context.fail(EvalError::NonFinite)
                    }
                    Ok(value) => value,
                    Err(error) => context.fail(error),
                }
            }

            Expression::Unary { operator, operand } => {
                let value = self.evaluate_node(operand, context);
                operator.apply(value)
            }

            Expression::Variable(variable) => match variable {
                Variable::Bound => context.bound_value,
                Variable::Pi => consts::PI,
                Variable::E => consts::E,
            },

            Expression::Call { function, argument } => {
                let value = self.evaluate_node(argument, context);
                if function.is_rounding() {
                    context.used_floor_or_ceil = true;
                }
                let result = function.apply(value);
                if introduced_nan(result, &[value]) {
                    return context.fail(EvalError::NonFinite);
                }
                result
            }

            Expression::Abs(inner) => self.evaluate_node(inner, context).abs(),

            Expression::FunctionCall { id, argument } => {
                self.evaluate_function_call(*id, argument, context)
            }

            Expression::Broken => context.fail(EvalError::BrokenExpression),
        }
    }

    fn evaluate_function_call(
        &self,
        id: FunctionId,
        argument: &Expression,
        context: &mut EvaluationContext,
    ) -> f64 {
        if context.recursion_depth > MAX_RECURSION_DEPTH {
            return context.fail(EvalError::RecursionLimit(id));
        }
        if context.own_function_id == Some(id) {
            return context.fail(EvalError::SelfReference(id));
        }
        if let Err(error) = self.resolve(id, context) {
            return context.fail(error);
        }

        let input = self.evaluate_node(argument, context);
        let mut nested = EvaluationContext::nested(input, id, context.recursion_depth + 1);
        let Some(body) = context.cross_references.get(&id) else {
            return context.fail(EvalError::UnknownFunction(id));
        };
        let value = self.evaluate_node(body, &mut nested);

        context.used_floor_or_ceil |= nested.used_floor_or_ceil;
        if nested.has_error() || !value.is_finite() {
            return context.fail(nested.failure().unwrap_or(EvalError::NonFinite));
        }
        value
    }

    /// Makes sure the formula with `id` is parsed and cached in `context`.
    fn resolve(&self, id: FunctionId, context: &mut EvaluationContext) -> Result<(), EvalError> {
        if context.cross_references.contains_key(&id) {
            return Ok(());
        }

        let formula = self
            .registry
            .formula(id)
            .ok_or(EvalError::UnknownFunction(id))?;
        debug!("Resolving f{}: {:?}", id, formula);

        let tokens = tokenize(&formula);
        if contains_error(&tokens) {
            return Err(EvalError::BrokenReference(id));
        }
        let expression = Parser::new(tokens).parse();
        context.cross_references.insert(id, expression);
        Ok(())
    }
}

/// A NaN made from non-NaN operands, like `(-8)^0.5` or `ln(-1)`. Later
/// arithmetic can turn it back into a number (`NaN^0 = 1`), so it has to be
/// flagged where it appears.
fn introduced_nan(result: f64, operands: &[f64]) -> bool {
    result.is_nan() && !operands.iter().any(|operand| operand.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Axis, Registry};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-9;

    fn eval(input: &str, x: f64) -> Evaluation {
        let registry = Registry::new();
        Evaluator::new(&registry).evaluate_expression(input, x, None)
    }

    fn value(input: &str, x: f64) -> f64 {
        let evaluation = eval(input, x);
        assert!(!evaluation.error, "{:?} failed: {:?}", input, evaluation);
        evaluation.value
    }

    /// Registry whose entry `i` has id `i`.
    fn registry_of(formulas: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for formula in formulas {
            registry.push(*formula, Axis::X);
        }
        registry
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(value("2+3*4", 0.0), 14.0);
        assert_eq!(value("(2+3)*4", 0.0), 20.0);
        assert_eq!(value("10-4-3", 0.0), 3.0);
        assert_eq!(value("12/3/2", 0.0), 2.0);
        assert_eq!(value("1.5*4", 0.0), 6.0);
        assert_eq!(value("-3+5", 0.0), 2.0);
        assert_eq!(value("+3", 0.0), 3.0);
    }

    #[test]
    fn test_power_is_left_associative() {
        assert_eq!(value("2^3^2", 0.0), 64.0);
        assert_eq!(value("-2^2", 0.0), 4.0);
        assert_eq!(value("2^-1", 0.0), 0.5);
    }

    #[test]
    fn test_division_by_zero() {
        let evaluation = eval("1/0", 0.0);
        assert!(evaluation.error);
        assert_eq!(evaluation.failure, Some(EvalError::DivisionByZero));
        assert_eq!(evaluation.value(), None);

        assert!(eval("1/x", 0.0).error);
        assert!(!eval("1/x", 2.0).error);
    }

    #[test]
    fn test_error_flag_survives_arithmetic_that_hides_nan() {
        // NaN^0 is 1, so only the flag tells the sample is bad.
        let evaluation = eval("(1/0)^0", 0.0);
        assert_eq!(evaluation.value, 1.0);
        assert!(evaluation.error);
        assert_eq!(evaluation.into_result(), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_domain_errors_are_flagged_where_they_occur() {
        // (-8)^0.5 is NaN, and NaN^0 would read as 1 without the flag.
        let evaluation = eval("((-8)^0.5)^0", 0.0);
        assert!(evaluation.error);
        assert_eq!(evaluation.failure, Some(EvalError::NonFinite));

        let evaluation = eval("(ln(0-1))^0", 0.0);
        assert!(evaluation.error);
        assert_eq!(evaluation.failure, Some(EvalError::NonFinite));

        let evaluation = eval("0*(x^0.5)", -4.0);
        assert!(evaluation.error);
        assert_eq!(eval("0*(x^0.5)", 4.0).value(), Some(0.0));
    }

    #[test]
    fn test_non_finite_results_fail() {
        assert_eq!(eval("(-8)^(1/3)", 0.0).failure, Some(EvalError::NonFinite));
        assert_eq!(eval("ln(0-1)", 0.0).failure, Some(EvalError::NonFinite));
        assert_eq!(eval("ln x", 0.0).failure, Some(EvalError::NonFinite));
        assert!(eval("10^400", 0.0).error);
    }

    #[test]
    fn test_variable_and_constants() {
        assert_eq!(value("x", 7.5), 7.5);
        assert!((value("π", 0.0) - consts::PI).abs() < EPSILON);
        assert!((value("e", 0.0) - consts::E).abs() < EPSILON);
        assert!((value("ln e", 0.0) - 1.0).abs() < EPSILON);
        assert!((value("log 100", 0.0) - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_trigonometry() {
        assert!(value("sin(x)", 0.0).abs() < EPSILON);
        assert!((value("sin(x)", FRAC_PI_2) - 1.0).abs() < EPSILON);
        assert!((value("cos(0)", 0.0) - 1.0).abs() < EPSILON);
        assert!((value("tan(π/4)", 0.0) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_single_primary_argument() {
        // (sin x) + 1, not sin(x + 1)
        assert!((value("sin x + 1", 0.0) - 1.0).abs() < EPSILON);
        // (sin x)^2
        let expected = 2f64.sin().powi(2);
        assert!((value("sin x^2", 2.0) - expected).abs() < EPSILON);
    }

    #[test]
    fn test_absolute_value() {
        assert_eq!(value("|-(3)|", 0.0), 3.0);
        assert_eq!(value("|x|", -4.0), 4.0);
        assert_eq!(value("|x-5|*2", 1.0), 8.0);
    }

    #[test]
    fn test_floor_and_ceil_set_flag() {
        let evaluation = eval("ceil(1.2)", 0.0);
        assert_eq!(evaluation.value(), Some(2.0));
        assert!(evaluation.used_floor_or_ceil);

        let evaluation = eval("floor x", -0.5);
        assert_eq!(evaluation.value(), Some(-1.0));
        assert!(evaluation.used_floor_or_ceil);

        assert!(!eval("sin x", 1.0).used_floor_or_ceil);
    }

    #[test]
    fn test_implicit_multiplication() {
        assert_eq!(value("2x", 5.0), 10.0);
        assert_eq!(value("2(3+4)", 0.0), 14.0);
        assert_eq!(value("3 4", 0.0), 12.0);
        assert!((value("2π", 0.0) - 2.0 * consts::PI).abs() < EPSILON);
        assert!((value("x sin(x)", FRAC_PI_2) - FRAC_PI_2).abs() < EPSILON);
    }

    #[test]
    fn test_broken_formulas_fail() {
        for input in ["", "(", "sin", "2+", "(1))", "1.2.3", "x y", "|x"] {
            let evaluation = eval(input, 1.0);
            assert!(evaluation.error, "input: {:?}", input);
        }
        assert_eq!(
            eval("2+", 0.0).failure,
            Some(EvalError::BrokenExpression)
        );
    }

    #[test]
    fn test_evaluation_does_not_mutate_ast() {
        let registry = Registry::new();
        let evaluator = Evaluator::new(&registry);
        let ast = Parser::parse_expression("x^2 + ceil x").unwrap();
        let snapshot = ast.clone();

        assert_eq!(evaluator.evaluate(&ast, 2.0, None).value(), Some(6.0));
        assert_eq!(evaluator.evaluate(&ast, 3.0, None).value(), Some(12.0));
        assert_eq!(evaluator.evaluate(&ast, 2.0, None).value(), Some(6.0));
        assert_eq!(ast, snapshot);
    }

    #[test]
    fn test_function_reference() {
        let registry = registry_of(&["x^2", "f0(x) + 1", "f0(2x)"]);
        let evaluator = Evaluator::new(&registry);

        assert_eq!(evaluator.evaluate_expression("f0(3)", 0.0, None).value(), Some(9.0));
        assert_eq!(evaluator.evaluate_expression("f1(x)", 3.0, None).value(), Some(10.0));
        assert_eq!(evaluator.evaluate_expression("f2(x)", 3.0, None).value(), Some(36.0));
        assert_eq!(evaluator.evaluate_expression("2f0 x", 3.0, None).value(), Some(18.0));
    }

    #[test]
    fn test_function_reference_uses_referenced_axis_substitution() {
        let mut registry = Registry::new();
        registry.push("2y", Axis::Y);
        let evaluator = Evaluator::new(&registry);
        assert_eq!(evaluator.evaluate_expression("f0(x)", 4.0, None).value(), Some(8.0));
    }

    #[test]
    fn test_self_reference_always_fails() {
        let registry = registry_of(&["f0(x)", "1"]);
        let evaluator = Evaluator::new(&registry);

        for x in [-1.0, 0.0, 2.5] {
            let evaluation = evaluator.evaluate_expression("f1(x) + f0(1)", x, Some(0));
            assert!(evaluation.error);
            assert_eq!(evaluation.failure, Some(EvalError::SelfReference(0)));
        }

        // Sampling the entry itself hits the same check.
        let evaluation = evaluator.evaluate_expression("f0(x)", 1.0, Some(0));
        assert_eq!(evaluation.failure, Some(EvalError::SelfReference(0)));
    }

    #[test]
    fn test_mutual_recursion_is_bounded() {
        let registry = registry_of(&["f1(x)", "f0(x)"]);
        let evaluator = Evaluator::new(&registry);

        let evaluation = evaluator.evaluate_expression("f0(x)", 1.0, Some(0));
        assert!(evaluation.error);

        let evaluation = evaluator.evaluate_expression("f0(x)", 1.0, None);
        assert!(evaluation.error);
    }

    #[test]
    fn test_recursion_depth_limit() {
        let registry = registry_of(&["x+1", "f0(x)+1", "f1(x)+1", "f2(x)+1"]);
        let evaluator = Evaluator::new(&registry);

        // Three nested calls, the deepest entered at the limit.
        let evaluation = evaluator.evaluate_expression("f2(x)", 0.0, None);
        assert_eq!(evaluation.value(), Some(3.0));

        // One more level is rejected.
        let evaluation = evaluator.evaluate_expression("f3(x)", 0.0, None);
        assert!(evaluation.error);
        assert_eq!(evaluation.failure, Some(EvalError::RecursionLimit(0)));
    }

    #[test]
    fn test_unknown_function() {
        let registry = registry_of(&["x"]);
        let evaluator = Evaluator::new(&registry);
        let evaluation = evaluator.evaluate_expression("f7(x)", 1.0, None);
        assert_eq!(evaluation.failure, Some(EvalError::UnknownFunction(7)));
    }

    #[test]
    fn test_broken_reference() {
        let registry = registry_of(&["x ? 2", "x +", "1/x"]);
        let evaluator = Evaluator::new(&registry);

        let evaluation = evaluator.evaluate_expression("f0(x)", 1.0, None);
        assert_eq!(evaluation.failure, Some(EvalError::BrokenReference(0)));

        let evaluation = evaluator.evaluate_expression("f1(x)", 1.0, None);
        assert_eq!(evaluation.failure, Some(EvalError::BrokenExpression));

        let evaluation = evaluator.evaluate_expression("f2(0)", 1.0, None);
        assert_eq!(evaluation.failure, Some(EvalError::DivisionByZero));
    }

    #[test]
    fn test_referenced_floor_propagates_flag() {
        let registry = registry_of(&["floor x"]);
        let evaluator = Evaluator::new(&registry);
        let evaluation = evaluator.evaluate_expression("f0(x) + 1", 1.5, None);
        assert_eq!(evaluation.value(), Some(2.0));
        assert!(evaluation.used_floor_or_ceil);
    }

    #[test]
    fn test_cross_reference_cache() {
        let registry = registry_of(&["x+1", "2x"]);
        let evaluator = Evaluator::new(&registry);
        let ast = Parser::parse_expression("f0(x) * f0(1) + f1(x)").unwrap();

        let mut context = EvaluationContext::new(1.0, None);
        let evaluation = evaluator.evaluate_with(&ast, &mut context);
        assert_eq!(evaluation.value(), Some(6.0));
        assert_eq!(context.cached_references(), 2);

        context.reset(2.0);
        let evaluation = evaluator.evaluate_with(&ast, &mut context);
        assert_eq!(evaluation.value(), Some(10.0));
        assert_eq!(context.cached_references(), 2);
    }

    #[test]
    fn test_reset_clears_error() {
        let registry = Registry::new();
        let evaluator = Evaluator::new(&registry);
        let ast = Parser::parse_expression("1/x").unwrap();

        let mut context = EvaluationContext::new(0.0, None);
        assert!(evaluator.evaluate_with(&ast, &mut context).error);
        context.reset(4.0);
        assert_eq!(evaluator.evaluate_with(&ast, &mut context).value(), Some(0.25));
    }

    #[test]
    fn test_first_failure_wins() {
        let evaluation = eval("1/0 + f9(x)", 0.0);
        assert_eq!(evaluation.failure, Some(EvalError::DivisionByZero));
    }

    #[test]
    fn test_random_input_never_panics() {
        const ALPHABET: &[&str] = &[
            "x", "e", "π", "1", "2.5", ".", "+", "-", "*", "/", "^", "(", ")", "|", "sin", "ln",
            "log", "ceil", "floor", "f0", "f1", " ", "#", "l", "c",
        ];
        let registry = registry_of(&["x^2", "f0(x)+1"]);
        let evaluator = Evaluator::new(&registry);
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..2000 {
            let length = rng.random_range(0..12);
            let input: String = (0..length)
                .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
                .collect();

            let mut parser = Parser::new(tokenize(&input));
            let ast = parser.parse();
            assert_eq!(parser.is_broken(), ast.is_broken(), "input: {:?}", input);

            let evaluation = evaluator.evaluate(&ast, rng.random_range(-10.0..10.0), None);
            if ast.is_broken() {
                assert!(evaluation.error, "input: {:?}", input);
            }
            if !evaluation.error {
                assert!(evaluation.value.is_finite(), "input: {:?}", input);
            }
        }
    }
}
