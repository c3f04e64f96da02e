use graphcalc_rs::ast::{Evaluator, Parser};
use graphcalc_rs::registry::Registry;

fn main() {
    pretty_env_logger::init();

    let registry = Registry::new();
    let evaluator = Evaluator::new(&registry);

    let expression = "x sin(x) + ceil(x)";
    let ast = Parser::parse_expression(expression).expect("Failed to parse");

    for x in [0.0, 0.5, 1.0, 1.5] {
        let evaluation = evaluator.evaluate(&ast, x, None);
        match evaluation.value() {
            Some(result) => println!("x = {}: {}", x, result),
            None => println!("x = {}: error {:?}", x, evaluation.failure),
        }
    }
}
