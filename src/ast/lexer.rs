use crate::ast::{FunctionId, NamedFunction, OperatorKind, Token};
use log::{debug, trace};

// Keyword tails by leading letter, tried in order.
const L_KEYWORDS: &[(&str, NamedFunction)] =
    &[("n", NamedFunction::Ln), ("og", NamedFunction::Log)];
const S_KEYWORDS: &[(&str, NamedFunction)] = &[("in", NamedFunction::Sin)];
const C_KEYWORDS: &[(&str, NamedFunction)] =
    &[("os", NamedFunction::Cos), ("eil", NamedFunction::Ceil)];
const T_KEYWORDS: &[(&str, NamedFunction)] = &[("an", NamedFunction::Tan)];
const F_KEYWORDS: &[(&str, NamedFunction)] = &[("loor", NamedFunction::Floor)];

/// Splits formula text into tokens.
///
/// Lexing never fails: anything unrecognised becomes an `Operator(Err)` token
/// and scanning carries on. Matching is case-insensitive.
pub fn tokenize(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.to_lowercase().chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\0' || c.is_whitespace() {
            i += 1;
            continue;
        }

        let operator = match c {
            '+' => Some(OperatorKind::Plus),
            '-' => Some(OperatorKind::Minus),
            '*' => Some(OperatorKind::Multiply),
            '/' => Some(OperatorKind::Divide),
            '^' => Some(OperatorKind::Power),
            '(' => Some(OperatorKind::Open),
            ')' => Some(OperatorKind::Close),
            '|' => Some(OperatorKind::Abs),
            _ => None,
        };
        if let Some(operator) = operator {
            tokens.push(Token::Operator(operator));
            i += 1;
            continue;
        }

        match c {
            'x' => {
                tokens.push(Token::NamedFunction(NamedFunction::Variable));
                i += 1;
            }
            'e' => {
                tokens.push(Token::NamedFunction(NamedFunction::E));
                i += 1;
            }
            'π' => {
                tokens.push(Token::NamedFunction(NamedFunction::Pi));
                i += 1;
            }
            'l' => i = keyword(&chars, i, L_KEYWORDS, &mut tokens),
            's' => i = keyword(&chars, i, S_KEYWORDS, &mut tokens),
            'c' => i = keyword(&chars, i, C_KEYWORDS, &mut tokens),
            't' => i = keyword(&chars, i, T_KEYWORDS, &mut tokens),
            // `f` and digits refer to another registry entry, as in `f0(x)`.
            'f' => {
                i = if chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) {
                    function_ref(&chars, i, &mut tokens)
                } else {
                    keyword(&chars, i, F_KEYWORDS, &mut tokens)
                }
            }
            _ => i = number(&chars, i, &mut tokens),
        }
    }

    debug!("Tokenized {:?} into {} tokens", input, tokens.len());
    tokens
}

/// Whether lexing failed anywhere in the stream.
pub fn contains_error(tokens: &[Token]) -> bool {
    tokens.iter().any(Token::is_error)
}

/// Tries each `(rest, function)` candidate in order against the letters after
/// `chars[start]`. Returns the position just past the consumed input.
fn keyword(
    chars: &[char],
    start: usize,
    candidates: &[(&str, NamedFunction)],
    tokens: &mut Vec<Token>,
) -> usize {
    for (rest, function) in candidates {
        let matched = rest
            .chars()
            .enumerate()
            .all(|(offset, expected)| chars.get(start + 1 + offset) == Some(&expected));
        if matched {
            tokens.push(Token::NamedFunction(*function));
            return start + 1 + rest.chars().count();
        }
    }

    trace!("Unknown keyword starting with {:?}", chars[start]);
    tokens.push(Token::Operator(OperatorKind::Err));
    start + 1
}

fn function_ref(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> usize {
    let mut end = start + 1;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }

    let digits: String = chars[start + 1..end].iter().collect();
    match digits.parse::<FunctionId>() {
        Ok(id) => tokens.push(Token::FunctionRef(id)),
        Err(e) => {
            trace!("Invalid function reference {:?}: {}", digits, e);
            tokens.push(Token::Operator(OperatorKind::Err));
        }
    }
    end
}

/// Digits with at most one `.`; a bare `.` reads as zero.
fn number(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> usize {
    let is_number_char = |c: char| c.is_ascii_digit() || c == '.';

    if !is_number_char(chars[start]) {
        trace!("Unexpected character {:?}", chars[start]);
        tokens.push(Token::Operator(OperatorKind::Err));
        return start + 1;
    }

    let mut literal = String::from("0");
    let mut has_dot = false;
    let mut malformed = false;
    let mut end = start;
    while end < chars.len() && is_number_char(chars[end]) {
        if chars[end] == '.' {
            malformed |= has_dot;
            has_dot = true;
        }
        literal.push(chars[end]);
        end += 1;
    }

    if malformed {
        trace!("Multiple decimal points in {:?}", literal);
        tokens.push(Token::Operator(OperatorKind::Err));
        return end;
    }

    match literal.parse::<f64>() {
        Ok(value) => tokens.push(Token::Number(value)),
        Err(_) => tokens.push(Token::Operator(OperatorKind::Err)),
    }
    end
}
