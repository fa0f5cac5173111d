use std::cmp::Ordering;
use std::rc::Rc;

use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult, apply_procedure};
use crate::number::{Number, NumberError, NumberResult};
use crate::source::Span;
use crate::types::{Node, PrimitiveFunc, Procedure, Sexpr};

fn arity_error(name: &str, expected: usize, actual: usize, span: Span) -> EvalResult {
    Err(EvalError::InvalidArguments(
        format!(
            "Primitive '{}' expects exactly {} arguments, got {}",
            name, expected, actual
        ),
        span,
    ))
}

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return arity_error($name, $expected, $args.len(), $span);
        }
    };
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects at least {} arguments, got {}",
                    $name,
                    $expected,
                    $args.len()
                ),
                $span,
            ));
        }
    };
    // Variant for range of args (inclusive)
    ($args:expr, $min:expr, $max:expr, $span:expr, $name:expr) => {
        if !($min..=$max).contains(&$args.len()) {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects between {} and {} arguments, got {}",
                    $name,
                    $min,
                    $max,
                    $args.len()
                ),
                $span,
            ));
        }
    };
}

mod math;

fn type_mismatch(expected: &str, node: &Node, span: Span) -> EvalError {
    EvalError::TypeMismatch {
        expected: expected.to_string(),
        found: node.kind.clone(),
        span, // Use call span for arg type errors
    }
}

fn arithmetic_error(source: NumberError, span: Span) -> EvalError {
    EvalError::Arithmetic { source, span }
}

fn number_node(result: NumberResult, span: Span) -> EvalResult {
    result
        .map(|n| Node::new_number(n, span))
        .map_err(|e| arithmetic_error(e, span))
}

fn expect_number(node: &Node, span: Span) -> EvalResult<Number> {
    match node.kind {
        Sexpr::Number(n) => Ok(n),
        _ => Err(type_mismatch("a number", node, span)),
    }
}

fn expect_int(node: &Node, span: Span) -> EvalResult<i64> {
    match node.kind {
        Sexpr::Number(Number::Int(i)) => Ok(i),
        _ => Err(type_mismatch("an integer", node, span)),
    }
}

fn expect_list(node: &Node, span: Span) -> EvalResult<Rc<Vec<Node>>> {
    match &node.kind {
        Sexpr::List(elements) => Ok(Rc::clone(elements)),
        _ => Err(type_mismatch("a list", node, span)),
    }
}

fn expect_procedure(node: &Node, span: Span) -> EvalResult<Procedure> {
    match &node.kind {
        Sexpr::Procedure(procedure) => Ok(procedure.clone()),
        _ => Err(type_mismatch("a procedure", node, span)),
    }
}

/// Binds every standard procedure and constant into `env`.
pub fn register(env: &mut Environment) {
    math::register(env);

    // `append` is the very same procedure object as `+`.
    let add: PrimitiveFunc = Rc::new(prim_add);
    env.add_alias("+", &add);
    env.add_alias("append", &add);
    env.add_primitive("-", prim_sub);
    env.add_primitive("*", prim_mul);
    env.add_primitive("/", prim_div);

    env.add_primitive(">", |args, span| compare_numbers(args, span, ">", Ordering::is_gt));
    env.add_primitive("<", |args, span| compare_numbers(args, span, "<", Ordering::is_lt));
    env.add_primitive(">=", |args, span| compare_numbers(args, span, ">=", Ordering::is_ge));
    env.add_primitive("<=", |args, span| compare_numbers(args, span, "<=", Ordering::is_le));
    env.add_primitive("=", prim_equals);

    env.add_primitive("abs", prim_abs);
    env.add_primitive("expt", prim_expt);
    env.add_primitive("round", prim_round);
    env.add_primitive("max", |args, span| extremum(args, span, "max", Ordering::Greater));
    env.add_primitive("min", |args, span| extremum(args, span, "min", Ordering::Less));

    env.add_primitive("car", prim_car);
    env.add_primitive("cdr", prim_cdr);
    env.add_primitive("cons", prim_cons);
    env.add_primitive("list", prim_list);
    env.add_primitive("length", prim_length);

    env.add_primitive("null?", |args, span| predicate(args, span, "null?", Sexpr::is_nil));
    env.add_primitive("list?", |args, span| predicate(args, span, "list?", Sexpr::is_list));
    env.add_primitive("number?", |args, span| {
        predicate(args, span, "number?", Sexpr::is_number)
    });
    env.add_primitive("symbol?", |args, span| {
        predicate(args, span, "symbol?", Sexpr::is_symbol)
    });
    env.add_primitive("procedure?", |args, span| {
        predicate(args, span, "procedure?", Sexpr::is_procedure)
    });
    env.add_primitive("eq?", |args, span| relation(args, span, "eq?", Sexpr::eqv));
    env.add_primitive("equal?", |args, span| relation(args, span, "equal?", Sexpr::equal));
    env.add_primitive("not", prim_not);

    env.add_primitive("apply", prim_apply);
    env.add_primitive("begin", prim_begin);
    env.add_primitive("map", prim_map);
    env.add_primitive("print", prim_print);
}

// --- Arithmetic ---

fn fold_numbers(
    args: Vec<Node>,
    span: Span,
    operator: &str,
    func: fn(Number, Number) -> NumberResult,
) -> EvalResult {
    check_arity!(args, min 1, span, operator);
    let mut acc = expect_number(&args[0], span)?;
    for arg in &args[1..] {
        let value = expect_number(arg, span)?;
        acc = func(acc, value).map_err(|e| arithmetic_error(e, span))?;
    }
    Ok(Node::new_number(acc, span))
}

fn concat_lists(args: Vec<Node>, span: Span) -> EvalResult {
    let mut elements = Vec::new();
    for arg in &args {
        elements.extend(expect_list(arg, span)?.iter().cloned());
    }
    Ok(Node::new_list(elements, span))
}

pub fn prim_add(args: Vec<Node>, span: Span) -> EvalResult {
    // (+ 1 2 3) -> 6
    // (+ (list 1) (list 2)) -> (1 2)
    match args.first().map(|arg| &arg.kind) {
        Some(Sexpr::List(_)) => concat_lists(args, span),
        _ => fold_numbers(args, span, "+", Number::add),
    }
}

pub fn prim_sub(args: Vec<Node>, span: Span) -> EvalResult {
    // (- x) -> x
    // (- x y z) -> x - y - z
    fold_numbers(args, span, "-", Number::sub)
}

pub fn prim_mul(args: Vec<Node>, span: Span) -> EvalResult {
    fold_numbers(args, span, "*", Number::mul)
}

pub fn prim_div(args: Vec<Node>, span: Span) -> EvalResult {
    fold_numbers(args, span, "/", Number::div)
}

fn compare_numbers(
    args: Vec<Node>,
    span: Span,
    operator: &str,
    accept: fn(Ordering) -> bool,
) -> EvalResult {
    check_arity!(args, 2, span, operator);
    let left = expect_number(&args[0], span)?;
    let right = expect_number(&args[1], span)?;
    // Any comparison involving NaN is false
    let result = left.compare(right).is_some_and(accept);
    Ok(Node::new_bool(result, span))
}

pub fn prim_equals(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "=");
    Ok(Node::new_bool(args[0].kind.equal(&args[1].kind), span))
}

pub fn prim_abs(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "abs");
    number_node(expect_number(&args[0], span)?.abs(), span)
}

pub fn prim_expt(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "expt");
    let base = expect_number(&args[0], span)?;
    let exponent = expect_number(&args[1], span)?;
    number_node(base.pow(exponent), span)
}

pub fn prim_round(args: Vec<Node>, span: Span) -> EvalResult {
    // (round x) -> integer, (round x digits) -> same kind as x
    check_arity!(args, 1, 2, span, "round");
    let value = expect_number(&args[0], span)?;
    match args.get(1) {
        None => number_node(value.round(), span),
        Some(digits) => number_node(value.round_to(expect_int(digits, span)?), span),
    }
}

// Accepts either several numbers or a single list of numbers. The first of
// several equal extremes wins.
fn extremum(args: Vec<Node>, span: Span, name: &str, wanted: Ordering) -> EvalResult {
    let single_list = matches!(args.as_slice(), [only] if only.kind.is_list());
    let candidates: Vec<Node> = if single_list {
        expect_list(&args[0], span)?.to_vec()
    } else {
        args
    };
    let mut best: Option<Number> = None;
    for candidate in &candidates {
        let value = expect_number(candidate, span)?;
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    match best {
        Some(value) => Ok(Node::new_number(value, span)),
        None => Err(EvalError::InvalidArguments(
            format!("Primitive '{}' needs at least one number", name),
            span,
        )),
    }
}

// --- List Primitives ---

pub fn prim_car(args: Vec<Node>, span: Span) -> EvalResult {
    // (car list) -> first item
    check_arity!(args, 1, span, "car");
    let elements = expect_list(&args[0], span)?;
    match elements.first() {
        Some(first) => Ok(first.clone()),
        None => Err(EvalError::IndexError(
            "car: Cannot take car of empty list".to_string(),
            span,
        )),
    }
}

pub fn prim_cdr(args: Vec<Node>, span: Span) -> EvalResult {
    // (cdr list) -> rest of list
    check_arity!(args, 1, span, "cdr");
    let elements = expect_list(&args[0], span)?;
    match elements.split_first() {
        Some((_, rest)) => Ok(Node::new_list(rest.to_vec(), span)),
        None => Err(EvalError::IndexError(
            "cdr: Cannot take cdr of empty list".to_string(),
            span,
        )),
    }
}

pub fn prim_cons(args: Vec<Node>, span: Span) -> EvalResult {
    // (cons item list) -> [item, ..list]
    check_arity!(args, 2, span, "cons");
    let tail = expect_list(&args[1], span)?;
    let mut elements = Vec::with_capacity(tail.len() + 1);
    elements.push(args[0].clone());
    elements.extend(tail.iter().cloned());
    Ok(Node::new_list(elements, span))
}

pub fn prim_list(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_list(args, span))
}

pub fn prim_length(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "length");
    let elements = expect_list(&args[0], span)?;
    Ok(Node::new_number(elements.len() as i64, span))
}

// --- Predicates ---

fn predicate(args: Vec<Node>, span: Span, name: &str, test: fn(&Sexpr) -> bool) -> EvalResult {
    check_arity!(args, 1, span, name);
    Ok(Node::new_bool(test(&args[0].kind), span))
}

fn relation(
    args: Vec<Node>,
    span: Span,
    name: &str,
    test: fn(&Sexpr, &Sexpr) -> bool,
) -> EvalResult {
    check_arity!(args, 2, span, name);
    Ok(Node::new_bool(test(&args[0].kind, &args[1].kind), span))
}

pub fn prim_not(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "not");
    Ok(Node::new_bool(!args[0].kind.is_truthy(), span))
}

// --- Control ---

pub fn prim_apply(args: Vec<Node>, span: Span) -> EvalResult {
    // (apply proc (list a b)) -> (proc a b)
    check_arity!(args, 2, span, "apply");
    let procedure = expect_procedure(&args[0], span)?;
    let call_args = expect_list(&args[1], span)?;
    apply_procedure(&procedure, call_args.to_vec(), span)
}

pub fn prim_begin(mut args: Vec<Node>, span: Span) -> EvalResult {
    // Arguments were already evaluated in order; keep the last one.
    args.pop().ok_or_else(|| {
        EvalError::IndexError("begin: Needs at least one expression".to_string(), span)
    })
}

pub fn prim_map(args: Vec<Node>, span: Span) -> EvalResult {
    // (map proc list1 list2 ...) stops at the shortest list
    check_arity!(args, min 2, span, "map");
    let procedure = expect_procedure(&args[0], span)?;
    let lists = args[1..]
        .iter()
        .map(|arg| expect_list(arg, span))
        .collect::<EvalResult<Vec<_>>>()?;
    let shortest = lists.iter().map(|list| list.len()).min().unwrap_or(0);

    let mut results = Vec::with_capacity(shortest);
    for index in 0..shortest {
        let call_args = lists.iter().map(|list| list[index].clone()).collect();
        results.push(apply_procedure(&procedure, call_args, span)?);
    }
    Ok(Node::new_list(results, span))
}

// The line `print` writes, without its newline.
fn print_line(args: &[Node]) -> String {
    let rendered: Vec<String> = args.iter().map(Node::to_string).collect();
    rendered.join(" ")
}

pub fn prim_print(args: Vec<Node>, span: Span) -> EvalResult {
    println!("{}", print_line(&args));
    Ok(Node::new_void(span))
}
