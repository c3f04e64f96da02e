use graphcalc_rs::ast::Evaluator;
use graphcalc_rs::registry::{Axis, Registry};

fn main() {
    pretty_env_logger::init();

    let mut registry = Registry::new();
    let square = registry.push("x^2", Axis::X);
    registry.push("f0(x) - 2x + 1", Axis::X);

    let evaluator = Evaluator::new(&registry);
    let expressions = ["2+3*4", "2^3^2", "sin x^2", "|-(3)|", "f1(x)", "1/(x-3)", "2(x"];

    for expression in expressions {
        let evaluation = evaluator.evaluate_expression(expression, 3.0, None);
        match evaluation.into_result() {
            Ok(result) => println!("{} at x = 3: {}", expression, result),
            Err(err) => println!("{} at x = 3: error: {}", expression, err),
        }
    }

    let evaluation = evaluator.evaluate_expression("f0(x)", 3.0, Some(square));
    println!("f0 calling itself: {:?}", evaluation.failure);
}
