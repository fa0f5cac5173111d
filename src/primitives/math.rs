//! Floating point and integer math procedures plus the numeric constants.

use std::f64::consts;

use super::{arithmetic_error, arity_error, expect_int, expect_list, expect_number, number_node};
use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult};
use crate::number::{Number, NumberError, float_to_int};
use crate::source::Span;
use crate::types::{Node, Sexpr};

type UnaryFloat = fn(f64) -> f64;

// Each function names the error raised when it turns finite input into an
// infinity: a pole is a domain error, growing past f64::MAX a range error.
const UNARY_FLOAT: &[(&str, UnaryFloat, NumberError)] = &[
    ("acos", f64::acos, NumberError::Domain),
    ("acosh", f64::acosh, NumberError::Domain),
    ("asin", f64::asin, NumberError::Domain),
    ("asinh", f64::asinh, NumberError::Domain),
    ("atan", f64::atan, NumberError::Domain),
    ("atanh", f64::atanh, NumberError::Domain),
    ("cbrt", f64::cbrt, NumberError::Domain),
    ("cos", f64::cos, NumberError::Domain),
    ("cosh", f64::cosh, NumberError::Range),
    ("degrees", f64::to_degrees, NumberError::Range),
    ("erf", libm::erf, NumberError::Domain),
    ("erfc", libm::erfc, NumberError::Domain),
    ("exp", f64::exp, NumberError::Range),
    ("exp2", f64::exp2, NumberError::Range),
    ("expm1", f64::exp_m1, NumberError::Range),
    ("fabs", f64::abs, NumberError::Domain),
    ("gamma", gamma, NumberError::Range),
    ("lgamma", lgamma, NumberError::Range),
    ("log10", f64::log10, NumberError::Domain),
    ("log1p", f64::ln_1p, NumberError::Domain),
    ("log2", f64::log2, NumberError::Domain),
    ("radians", f64::to_radians, NumberError::Range),
    ("sin", f64::sin, NumberError::Domain),
    ("sinh", f64::sinh, NumberError::Range),
    ("sqrt", f64::sqrt, NumberError::Domain),
    ("tan", f64::tan, NumberError::Domain),
    ("tanh", f64::tanh, NumberError::Domain),
    ("ulp", ulp, NumberError::Range),
];

type BinaryFloat = fn(f64, f64) -> f64;

const BINARY_FLOAT: &[(&str, BinaryFloat, NumberError)] = &[
    ("atan2", f64::atan2, NumberError::Domain),
    ("copysign", f64::copysign, NumberError::Domain),
    ("fmod", fmod, NumberError::Domain),
    ("nextafter", libm::nextafter, NumberError::Range),
    ("pow", float_pow, NumberError::Range),
    ("remainder", ieee_remainder, NumberError::Domain),
];

pub(super) fn register(env: &mut Environment) {
    env.add_constant("pi", Sexpr::Number(Number::Float(consts::PI)));
    env.add_constant("e", Sexpr::Number(Number::Float(consts::E)));
    env.add_constant("tau", Sexpr::Number(Number::Float(consts::TAU)));
    env.add_constant("inf", Sexpr::Number(Number::Float(f64::INFINITY)));
    env.add_constant("nan", Sexpr::Number(Number::Float(f64::NAN)));

    for &(name, func, on_infinite) in UNARY_FLOAT {
        env.add_primitive(name, move |args, span| {
            check_arity!(args, 1, span, name);
            let x = expect_number(&args[0], span)?.as_f64();
            checked_float(func(x), &[x], on_infinite, span)
        });
    }
    for &(name, func, on_infinite) in BINARY_FLOAT {
        env.add_primitive(name, move |args, span| {
            check_arity!(args, 2, span, name);
            let x = expect_number(&args[0], span)?.as_f64();
            let y = expect_number(&args[1], span)?.as_f64();
            checked_float(func(x, y), &[x, y], on_infinite, span)
        });
    }

    env.add_primitive("fma", prim_fma);
    env.add_primitive("log", prim_log);
    env.add_primitive("ldexp", prim_ldexp);
    env.add_primitive("hypot", prim_hypot);

    env.add_primitive("ceil", |args, span| to_integer(args, span, "ceil", f64::ceil));
    env.add_primitive("floor", |args, span| to_integer(args, span, "floor", f64::floor));
    env.add_primitive("trunc", |args, span| to_integer(args, span, "trunc", f64::trunc));

    env.add_primitive("isfinite", |args, span| {
        float_predicate(args, span, "isfinite", f64::is_finite)
    });
    env.add_primitive("isinf", |args, span| {
        float_predicate(args, span, "isinf", f64::is_infinite)
    });
    env.add_primitive("isnan", |args, span| float_predicate(args, span, "isnan", f64::is_nan));
    env.add_primitive("isclose", prim_isclose);

    env.add_primitive("factorial", prim_factorial);
    env.add_primitive("isqrt", prim_isqrt);
    env.add_primitive("gcd", prim_gcd);
    env.add_primitive("lcm", prim_lcm);
    env.add_primitive("comb", prim_comb);
    env.add_primitive("perm", prim_perm);

    env.add_primitive("fsum", prim_fsum);
    env.add_primitive("prod", prim_prod);
    env.add_primitive("dist", prim_dist);
    env.add_primitive("modf", prim_modf);
    env.add_primitive("frexp", prim_frexp);
}

/// Turns a raw float result into a value, reporting NaN produced from
/// non-NaN inputs as a domain error and infinities produced from finite
/// inputs as `on_infinite`.
fn checked_float(result: f64, inputs: &[f64], on_infinite: NumberError, span: Span) -> EvalResult {
    if result.is_nan() && !inputs.iter().any(|x| x.is_nan()) {
        return Err(arithmetic_error(NumberError::Domain, span));
    }
    if result.is_infinite() && inputs.iter().all(|x| x.is_finite()) {
        return Err(arithmetic_error(on_infinite, span));
    }
    Ok(Node::new_number(result, span))
}

fn fmod(x: f64, y: f64) -> f64 {
    if y == 0.0 || x.is_infinite() {
        f64::NAN
    } else {
        x % y
    }
}

// Zero to a negative power has no value rather than overflowing.
fn float_pow(x: f64, y: f64) -> f64 {
    if x == 0.0 && y < 0.0 { f64::NAN } else { x.powf(y) }
}

// x - n*y where n is x/y rounded half to even.
fn ieee_remainder(x: f64, y: f64) -> f64 {
    if y == 0.0 || x.is_infinite() || x.is_nan() || y.is_nan() {
        return f64::NAN;
    }
    if y.is_infinite() {
        return x;
    }
    let n = (x / y).round_ties_even();
    let r = x - n * y;
    if r == 0.0 { 0.0f64.copysign(x) } else { r }
}

fn is_non_positive_integer(x: f64) -> bool {
    x <= 0.0 && x.fract() == 0.0
}

// The gamma function has poles at zero and the negative integers.
fn gamma(x: f64) -> f64 {
    if is_non_positive_integer(x) { f64::NAN } else { libm::tgamma(x) }
}

fn lgamma(x: f64) -> f64 {
    if is_non_positive_integer(x) { f64::NAN } else { libm::lgamma(x) }
}

/// The gap between `|x|` and the next float away from zero. For the largest
/// finite float that gap is infinite, so the gap below it is used instead.
fn ulp(x: f64) -> f64 {
    let x = x.abs();
    if !x.is_finite() {
        return x;
    }
    let next = f64::from_bits(x.to_bits() + 1);
    if next.is_infinite() {
        x - f64::from_bits(x.to_bits() - 1)
    } else {
        next - x
    }
}

fn prim_fma(args: Vec<Node>, span: Span) -> EvalResult {
    // x * y + z with a single rounding
    check_arity!(args, 3, span, "fma");
    let x = expect_number(&args[0], span)?.as_f64();
    let y = expect_number(&args[1], span)?.as_f64();
    let z = expect_number(&args[2], span)?.as_f64();
    checked_float(x.mul_add(y, z), &[x, y, z], NumberError::Range, span)
}

fn prim_log(args: Vec<Node>, span: Span) -> EvalResult {
    // (log x) -> ln x, (log x base)
    check_arity!(args, 1, 2, span, "log");
    let x = expect_number(&args[0], span)?.as_f64();
    if x <= 0.0 {
        return Err(arithmetic_error(NumberError::Domain, span));
    }
    match args.get(1) {
        None => checked_float(x.ln(), &[x], NumberError::Domain, span),
        Some(base) => {
            let base = expect_number(base, span)?.as_f64();
            if base <= 0.0 {
                return Err(arithmetic_error(NumberError::Domain, span));
            }
            if base == 1.0 {
                return Err(arithmetic_error(NumberError::DivisionByZero, span));
            }
            checked_float(x.ln() / base.ln(), &[x, base], NumberError::Domain, span)
        }
    }
}

fn prim_ldexp(args: Vec<Node>, span: Span) -> EvalResult {
    // x * 2^i
    check_arity!(args, 2, span, "ldexp");
    let x = expect_number(&args[0], span)?.as_f64();
    let exp = expect_int(&args[1], span)?;
    if x == 0.0 || !x.is_finite() {
        return Ok(Node::new_number(x, span));
    }
    let exp = exp.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    // Split the scaling so that intermediate powers of two stay finite.
    let half = exp / 2;
    let result = x * 2f64.powi(half) * 2f64.powi(exp - half);
    checked_float(result, &[x], NumberError::Range, span)
}

fn prim_hypot(args: Vec<Node>, span: Span) -> EvalResult {
    let coordinates = args
        .iter()
        .map(|arg| expect_number(arg, span).map(Number::as_f64))
        .collect::<EvalResult<Vec<f64>>>()?;
    checked_float(euclidean_norm(&coordinates), &coordinates, NumberError::Range, span)
}

fn euclidean_norm(values: &[f64]) -> f64 {
    if values.iter().any(|v| v.is_infinite()) {
        return f64::INFINITY;
    }
    values.iter().fold(0.0, |acc: f64, v| acc.hypot(*v))
}

fn to_integer(args: Vec<Node>, span: Span, name: &str, func: UnaryFloat) -> EvalResult {
    check_arity!(args, 1, span, name);
    match expect_number(&args[0], span)? {
        Number::Int(i) => Ok(Node::new_number(i, span)),
        Number::Float(f) => number_node(float_to_int(func(f)), span),
    }
}

fn float_predicate(args: Vec<Node>, span: Span, name: &str, test: fn(f64) -> bool) -> EvalResult {
    check_arity!(args, 1, span, name);
    let x = expect_number(&args[0], span)?.as_f64();
    Ok(Node::new_bool(test(x), span))
}

const REL_TOL: f64 = 1e-9;

fn prim_isclose(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "isclose");
    let a = expect_number(&args[0], span)?.as_f64();
    let b = expect_number(&args[1], span)?.as_f64();
    let close = a == b || {
        let diff = (a - b).abs();
        diff.is_finite() && diff <= REL_TOL * a.abs().max(b.abs())
    };
    Ok(Node::new_bool(close, span))
}

fn non_negative(n: i64, span: Span) -> EvalResult<u64> {
    u64::try_from(n).map_err(|_| arithmetic_error(NumberError::Domain, span))
}

fn int_result(value: u128, span: Span) -> EvalResult {
    i64::try_from(value)
        .map(|i| Node::new_number(i, span))
        .map_err(|_| arithmetic_error(NumberError::Overflow, span))
}

fn prim_factorial(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "factorial");
    let n = non_negative(expect_int(&args[0], span)?, span)?;
    let mut acc: u128 = 1;
    for k in 2..=n {
        acc = acc
            .checked_mul(k as u128)
            .filter(|v| *v <= i64::MAX as u128)
            .ok_or_else(|| arithmetic_error(NumberError::Overflow, span))?;
    }
    int_result(acc, span)
}

fn prim_isqrt(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "isqrt");
    let n = non_negative(expect_int(&args[0], span)?, span)? as u128;
    // Float estimate, corrected to the exact floor.
    let mut root = (n as f64).sqrt() as u128;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    int_result(root, span)
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn int_args(args: &[Node], span: Span) -> EvalResult<Vec<i64>> {
    args.iter().map(|arg| expect_int(arg, span)).collect()
}

fn prim_gcd(args: Vec<Node>, span: Span) -> EvalResult {
    // (gcd) -> 0
    let result = int_args(&args, span)?
        .into_iter()
        .fold(0, |acc, n| gcd(acc, n.unsigned_abs() as u128));
    int_result(result, span)
}

fn prim_lcm(args: Vec<Node>, span: Span) -> EvalResult {
    // (lcm) -> 1
    let mut acc: u128 = 1;
    for n in int_args(&args, span)? {
        let n = n.unsigned_abs() as u128;
        if n == 0 || acc == 0 {
            acc = 0;
            continue;
        }
        acc = acc / gcd(acc, n) * n;
        if acc > i64::MAX as u128 {
            return Err(arithmetic_error(NumberError::Overflow, span));
        }
    }
    int_result(acc, span)
}

fn n_and_k(args: &[Node], span: Span) -> EvalResult<(u64, u64)> {
    let n = non_negative(expect_int(&args[0], span)?, span)?;
    let k = non_negative(expect_int(&args[1], span)?, span)?;
    Ok((n, k))
}

fn prim_comb(args: Vec<Node>, span: Span) -> EvalResult {
    // Ways to choose k items from n without order
    check_arity!(args, 2, span, "comb");
    let (n, k) = n_and_k(&args, span)?;
    if k > n {
        return Ok(Node::new_number(0, span));
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        // Exact at every step: acc * (n - i) is divisible by i + 1.
        acc = acc
            .checked_mul((n - i) as u128)
            .ok_or_else(|| arithmetic_error(NumberError::Overflow, span))?
            / (i as u128 + 1);
    }
    int_result(acc, span)
}

fn prim_perm(args: Vec<Node>, span: Span) -> EvalResult {
    // Ways to choose k items from n with order
    check_arity!(args, 2, span, "perm");
    let (n, k) = n_and_k(&args, span)?;
    if k > n {
        return Ok(Node::new_number(0, span));
    }
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc
            .checked_mul((n - i) as u128)
            .filter(|v| *v <= i64::MAX as u128)
            .ok_or_else(|| arithmetic_error(NumberError::Overflow, span))?;
    }
    int_result(acc, span)
}

fn float_list(node: &Node, span: Span) -> EvalResult<Vec<f64>> {
    expect_list(node, span)?
        .iter()
        .map(|element| expect_number(element, span).map(Number::as_f64))
        .collect()
}

fn prim_fsum(args: Vec<Node>, span: Span) -> EvalResult {
    // Compensated summation of a list of numbers
    check_arity!(args, 1, span, "fsum");
    let values = float_list(&args[0], span)?;
    let mut sum = 0.0;
    let mut compensation = 0.0;
    for value in values.iter().copied() {
        let t = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - t) + value;
        } else {
            compensation += (value - t) + sum;
        }
        sum = t;
    }
    let total = if sum.is_finite() { sum + compensation } else { sum };
    checked_float(total, &values, NumberError::Range, span)
}

fn prim_prod(args: Vec<Node>, span: Span) -> EvalResult {
    // Product of a list, exact while every element is an integer
    check_arity!(args, 1, span, "prod");
    let elements = expect_list(&args[0], span)?;
    let product = elements
        .iter()
        .try_fold(Number::Int(1), |acc, element| -> EvalResult<Number> {
            let value = expect_number(element, span)?;
            acc.mul(value).map_err(|e| arithmetic_error(e, span))
        })?;
    Ok(Node::new_number(product, span))
}

fn prim_dist(args: Vec<Node>, span: Span) -> EvalResult {
    // Euclidean distance between two points of equal dimension
    check_arity!(args, 2, span, "dist");
    let p = float_list(&args[0], span)?;
    let q = float_list(&args[1], span)?;
    if p.len() != q.len() {
        return Err(EvalError::InvalidArguments(
            "dist: Both points must have the same dimension".to_string(),
            span,
        ));
    }
    let deltas: Vec<f64> = p.iter().zip(&q).map(|(a, b)| a - b).collect();
    let inputs: Vec<f64> = p.iter().chain(&q).copied().collect();
    checked_float(euclidean_norm(&deltas), &inputs, NumberError::Range, span)
}

fn prim_modf(args: Vec<Node>, span: Span) -> EvalResult {
    // (modf x) -> (fractional integral), both carrying the sign of x
    check_arity!(args, 1, span, "modf");
    let x = expect_number(&args[0], span)?.as_f64();
    let (fractional, integral) = if x.is_infinite() {
        (0.0f64.copysign(x), x)
    } else {
        (x.fract(), x.trunc())
    };
    Ok(Node::new_list(
        vec![
            Node::new_number(fractional, span),
            Node::new_number(integral, span),
        ],
        span,
    ))
}

/// Splits `x` into a mantissa in `[0.5, 1)` and a power of two.
fn frexp(x: f64) -> (f64, i64) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    // Scale subnormals into the normal range first.
    let (x, bias) = if x.abs() < f64::MIN_POSITIVE {
        (x * 2f64.powi(64), -64)
    } else {
        (x, 0)
    };
    let bits = x.to_bits();
    let exponent = ((bits >> 52) & 0x7ff) as i64 - 1022;
    let mantissa = f64::from_bits((bits & !(0x7ff << 52)) | (1022 << 52));
    (mantissa, exponent + bias)
}

fn prim_frexp(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "frexp");
    let x = expect_number(&args[0], span)?.as_f64();
    let (mantissa, exponent) = frexp(x);
    Ok(Node::new_list(
        vec![
            Node::new_number(mantissa, span),
            Node::new_number(exponent, span),
        ],
        span,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    fn eval(input: &str) -> EvalResult {
        let env = Environment::new_global_populated();
        match parse_str(input) {
            Ok(node) => crate::evaluator::evaluate(node, env),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_display(input: &str, expected: &str) {
        match eval(input) {
            Ok(result) => assert_eq!(result.to_string(), expected, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn assert_eval_float(input: &str, expected: f64) {
        match eval(input).map(|node| node.kind) {
            Ok(Sexpr::Number(Number::Float(f))) => {
                assert!((f - expected).abs() < 1e-12, "Input: '{}', got {}", input, f)
            }
            other => panic!("Expected a float for input '{}', got {:?}", input, other),
        }
    }

    fn assert_arithmetic_error(input: &str, expected: NumberError) {
        match eval(input) {
            Err(EvalError::Arithmetic { source, .. }) => {
                assert_eq!(source, expected, "Input: '{}'", input)
            }
            other => panic!("Expected {:?} for input '{}', got {:?}", expected, input, other),
        }
    }

    #[test]
    fn test_constants() {
        assert_eval_float("pi", std::f64::consts::PI);
        assert_eval_float("e", std::f64::consts::E);
        assert_eval_float("tau", std::f64::consts::TAU);
        assert_eval_display("inf", "inf");
        assert_eval_display("nan", "nan");
    }

    #[test]
    fn test_unary_functions() {
        assert_eval_display("(sqrt 16)", "4.0");
        assert_eval_float("(sin 0)", 0.0);
        assert_eval_float("(cos pi)", -1.0);
        assert_eval_float("(degrees pi)", 180.0);
        assert_eval_float("(radians 180)", std::f64::consts::PI);
        assert_eval_float("(exp 1)", std::f64::consts::E);
        assert_eval_float("(log10 1000)", 3.0);
        assert_eval_float("(log2 8)", 3.0);
        assert_eval_display("(fabs -3)", "3.0");
        assert_eval_display("(cbrt 27)", "3.0");
    }

    #[test]
    fn test_domain_and_range_errors() {
        assert_arithmetic_error("(sqrt -1)", NumberError::Domain);
        assert_arithmetic_error("(acos 2)", NumberError::Domain);
        assert_arithmetic_error("(log 0)", NumberError::Domain);
        assert_arithmetic_error("(log -5)", NumberError::Domain);
        assert_arithmetic_error("(log10 0)", NumberError::Domain);
        assert_arithmetic_error("(atanh 1)", NumberError::Domain);
        assert_arithmetic_error("(exp 1000)", NumberError::Range);
        assert_arithmetic_error("(fmod 1 0)", NumberError::Domain);
        assert_arithmetic_error("(pow 0 -1)", NumberError::Domain);
        assert_arithmetic_error("(log 8 1)", NumberError::DivisionByZero);
        // NaN in, NaN out is not an error
        assert_eval_display("(sqrt nan)", "nan");
        assert_eval_display("(exp inf)", "inf");
    }

    #[test]
    fn test_log() {
        assert_eval_float("(log e)", 1.0);
        assert_eval_float("(log 8 2)", 3.0);
        assert_eval_float("(log 100 10)", 2.0);
    }

    #[test]
    fn test_binary_functions() {
        assert_eval_float("(atan2 1 1)", std::f64::consts::FRAC_PI_4);
        assert_eval_display("(copysign 3 -0.0)", "-3.0");
        assert_eval_display("(fmod 7 3)", "1.0");
        assert_eval_display("(fmod -7 3)", "-1.0");
        assert_eval_display("(remainder 7 4)", "-1.0");
        assert_eval_display("(remainder 5 2)", "1.0");
        assert_eval_display("(pow 2 10)", "1024.0");
        assert_eval_display("(ldexp 1.5 3)", "12.0");
        assert_eval_display("(hypot 3 4)", "5.0");
        assert_eval_display("(hypot 0 3 4)", "5.0");
        assert_eval_display("(hypot)", "0.0");
    }

    #[test]
    fn test_integer_rounding() {
        assert_eval_display("(ceil 1.2)", "2");
        assert_eval_display("(floor -1.2)", "-2");
        assert_eval_display("(trunc -1.7)", "-1");
        assert_eval_display("(floor 5)", "5");
        assert_arithmetic_error("(floor inf)", NumberError::Overflow);
        assert_arithmetic_error("(ceil nan)", NumberError::Domain);
    }

    #[test]
    fn test_float_predicates() {
        assert_eval_display("(isfinite 1)", "#t");
        assert_eval_display("(isinf inf)", "#t");
        assert_eval_display("(isnan nan)", "#t");
        assert_eval_display("(isnan 1.0)", "#f");
        assert_eval_display("(isclose 1.0 1.0000000001)", "#t");
        assert_eval_display("(isclose 1.0 1.001)", "#f");
        assert_eval_display("(isclose inf inf)", "#t");
    }

    #[test]
    fn test_integer_functions() {
        assert_eval_display("(factorial 0)", "1");
        assert_eval_display("(factorial 20)", "2432902008176640000");
        assert_arithmetic_error("(factorial 21)", NumberError::Overflow);
        assert_arithmetic_error("(factorial -1)", NumberError::Domain);
        assert_eval_display("(isqrt 17)", "4");
        assert_eval_display("(isqrt 9223372036854775807)", "3037000499");
        assert_eval_display("(gcd 12 18)", "6");
        assert_eval_display("(gcd -4 6 10)", "2");
        assert_eval_display("(gcd)", "0");
        assert_eval_display("(lcm 4 6)", "12");
        assert_eval_display("(lcm 3 0)", "0");
        assert_eval_display("(lcm)", "1");
        assert_eval_display("(comb 5 2)", "10");
        assert_eval_display("(comb 3 5)", "0");
        assert_eval_display("(comb 60 30)", "118264581564861424");
        assert_eval_display("(perm 5 2)", "20");
        assert_eval_display("(perm 5 0)", "1");
    }

    #[test]
    fn test_integer_functions_reject_floats() {
        assert!(matches!(
            eval("(factorial 5.0)"),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert!(matches!(eval("(gcd 4 2.0)"), Err(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn test_list_functions() {
        assert_eval_float("(fsum (list 0.1 0.2 0.3))", 0.6);
        assert_eval_display("(fsum (quote ()))", "0.0");
        assert_eval_display("(prod (list 2 3 4))", "24");
        assert_eval_display("(prod (list 2 0.5))", "1.0");
        assert_eval_display("(prod (quote ()))", "1");
        assert_eval_display("(dist (list 0 0) (list 3 4))", "5.0");
        assert!(matches!(
            eval("(dist (list 1) (list 1 2))"),
            Err(EvalError::InvalidArguments(..))
        ));
        assert_eval_display("(modf 3.5)", "(0.5 3.0)");
        assert_eval_display("(modf -2.25)", "(-0.25 -2.0)");
        assert_eval_display("(frexp 8)", "(0.5 4)");
        assert_eval_display("(frexp 0)", "(0.0 0)");
        assert_eval_display("(frexp -3)", "(-0.75 2)");
    }

    #[test]
    fn test_frexp_subnormal() {
        let tiny = f64::from_bits(1);
        let (mantissa, exponent) = frexp(tiny);
        assert_eq!(mantissa, 0.5);
        assert_eq!(exponent, -1073);
    }

    fn eval_float(input: &str) -> f64 {
        match eval(input).map(|node| node.kind) {
            Ok(Sexpr::Number(Number::Float(f))) => f,
            other => panic!("Expected a float for input '{}', got {:?}", input, other),
        }
    }

    #[test]
    fn test_special_functions() {
        assert_eval_float("(gamma 5)", 24.0);
        assert_eval_float("(gamma 0.5)", std::f64::consts::PI.sqrt());
        assert_eval_float("(lgamma 10)", 362880f64.ln());
        assert_eval_float("(lgamma 1)", 0.0);
        assert_eval_float("(erf 0)", 0.0);
        assert_eval_float("(erf 1)", 0.8427007929497149);
        assert_eval_float("(erfc 0)", 1.0);
        assert_eval_float("(+ (erf 0.3) (erfc 0.3))", 1.0);
        assert_eval_display("(gamma inf)", "inf");
    }

    #[test]
    fn test_special_function_errors() {
        assert_arithmetic_error("(gamma 0)", NumberError::Domain);
        assert_arithmetic_error("(gamma -3)", NumberError::Domain);
        assert_arithmetic_error("(gamma 200)", NumberError::Range);
        assert_arithmetic_error("(lgamma 0)", NumberError::Domain);
        assert_arithmetic_error("(lgamma -2)", NumberError::Domain);
        assert_arithmetic_error("(fma inf 0 1)", NumberError::Domain);
        assert_arithmetic_error("(fma 1e308 10 0)", NumberError::Range);
    }

    #[test]
    fn test_float_neighbours() {
        assert_eq!(eval_float("(nextafter 1 2)"), 1.0 + f64::EPSILON);
        assert_eq!(eval_float("(nextafter 0 1)"), f64::from_bits(1));
        assert_eq!(eval_float("(nextafter 1 1)"), 1.0);
        assert_eq!(eval_float("(ulp 1)"), f64::EPSILON);
        assert_eq!(eval_float("(ulp -1)"), f64::EPSILON);
        assert_eq!(eval_float("(ulp 0)"), f64::from_bits(1));
        assert_eq!(eval_float("(ulp 1.7976931348623157e308)"), 2f64.powi(971));
        assert_eval_display("(ulp inf)", "inf");
        assert_eval_display("(ulp nan)", "nan");
    }

    #[test]
    fn test_fma() {
        assert_eval_display("(fma 2 3 4)", "10.0");
        // One rounding: the exact product 1 - 2^-104 survives the addition.
        let x = 1.0 + 2f64.powi(-52);
        let y = 1.0 - 2f64.powi(-52);
        let input = format!("(fma {:?} {:?} -1)", x, y);
        assert_eq!(eval_float(&input), -(2f64.powi(-104)));
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(eval("(sqrt)"), Err(EvalError::InvalidArguments(..))));
        assert!(matches!(eval("(atan2 1)"), Err(EvalError::InvalidArguments(..))));
        assert!(matches!(eval("(log 1 2 3)"), Err(EvalError::InvalidArguments(..))));
        assert!(matches!(eval("(fma 1 2)"), Err(EvalError::InvalidArguments(..))));
        assert!(matches!(
            eval("(sqrt (quote x))"),
            Err(EvalError::TypeMismatch { .. })
        ));
    }
}
