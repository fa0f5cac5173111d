use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A numeric atom. Integers stay exact until an operation mixes them with a
/// float, at which point the result is promoted.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NumberError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("math domain error")]
    Domain,
    #[error("math range error")]
    Range,
}

pub type NumberResult<T = Number> = Result<T, NumberError>;

// Largest magnitude an f64 can have and still convert into an i64 exactly.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn is_truthy(self) -> bool {
        !self.is_zero()
    }

    pub fn add(self, rhs: Number) -> NumberResult {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_add(b).map(Number::Int).ok_or(NumberError::Overflow)
            }
            (a, b) => Ok(Number::Float(a.as_f64() + b.as_f64())),
        }
    }

    pub fn sub(self, rhs: Number) -> NumberResult {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_sub(b).map(Number::Int).ok_or(NumberError::Overflow)
            }
            (a, b) => Ok(Number::Float(a.as_f64() - b.as_f64())),
        }
    }

    pub fn mul(self, rhs: Number) -> NumberResult {
        match (self, rhs) {
            (Number::Int(a), Number::Int(b)) => {
                a.checked_mul(b).map(Number::Int).ok_or(NumberError::Overflow)
            }
            (a, b) => Ok(Number::Float(a.as_f64() * b.as_f64())),
        }
    }

    /// True division: the quotient is always a float.
    pub fn div(self, rhs: Number) -> NumberResult {
        if rhs.is_zero() {
            return Err(NumberError::DivisionByZero);
        }
        Ok(Number::Float(self.as_f64() / rhs.as_f64()))
    }

    pub fn pow(self, exponent: Number) -> NumberResult {
        if let (Number::Int(base), Number::Int(exp)) = (self, exponent) {
            if exp >= 0 {
                return u32::try_from(exp)
                    .ok()
                    .and_then(|exp| base.checked_pow(exp))
                    .map(Number::Int)
                    .ok_or(NumberError::Overflow);
            }
        }
        let base = self.as_f64();
        let exp = exponent.as_f64();
        if base == 0.0 && exp < 0.0 {
            return Err(NumberError::DivisionByZero);
        }
        if base < 0.0 && exp.is_finite() && exp.fract() != 0.0 {
            // The result would be complex.
            return Err(NumberError::Domain);
        }
        Ok(Number::Float(base.powf(exp)))
    }

    pub fn abs(self) -> NumberResult {
        match self {
            Number::Int(i) => i.checked_abs().map(Number::Int).ok_or(NumberError::Overflow),
            Number::Float(f) => Ok(Number::Float(f.abs())),
        }
    }

    /// Rounds half to even and returns an integer.
    pub fn round(self) -> NumberResult {
        match self {
            Number::Int(_) => Ok(self),
            Number::Float(f) => float_to_int(f.round_ties_even()),
        }
    }

    /// Rounds to `digits` decimal places (negative values round to tens,
    /// hundreds, ...), half to even. Integers stay integers.
    pub fn round_to(self, digits: i64) -> NumberResult {
        match self {
            Number::Int(_) if digits >= 0 => Ok(self),
            Number::Int(i) => round_int_to(i, digits.unsigned_abs()),
            Number::Float(f) if !f.is_finite() => Ok(self),
            Number::Float(_) if digits > MAX_FLOAT_DIGITS => Ok(self),
            // The decimal rendering is correctly rounded from the exact binary
            // value, so 2.675 (stored just below the midpoint) gives 2.67.
            Number::Float(f) if digits >= 0 => format!("{:.*}", digits as usize, f)
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|_| NumberError::Domain),
            Number::Float(f) => {
                let places = digits.unsigned_abs();
                if places > MAX_FLOAT_EXPONENT {
                    return Ok(Number::Float(0.0 * f));
                }
                let factor = 10f64.powi(places as i32);
                let rounded = (f / factor).round_ties_even() * factor;
                if rounded.is_infinite() {
                    return Err(NumberError::Range);
                }
                Ok(Number::Float(rounded))
            }
        }
    }

    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    /// Equality that also requires the same exactness, so `1` and `1.0`
    /// are not identical even though they compare equal.
    pub fn identical(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (Number::Float(a), Number::Float(b)) => a == b,
            _ => false,
        }
    }
}

// Past this many decimal places rounding cannot change an f64.
const MAX_FLOAT_DIGITS: i64 = 323;
// 10^309 and beyond overflow an f64.
const MAX_FLOAT_EXPONENT: u64 = 308;

// Exact half-to-even rounding of an integer to a multiple of 10^places.
fn round_int_to(i: i64, places: u64) -> NumberResult {
    // From 10^20 on, half the factor exceeds every i64, so all round to zero.
    if places > 19 {
        return Ok(Number::Int(0));
    }
    let factor = 10i128.pow(places as u32);
    let value = i as i128;
    let quotient = value.div_euclid(factor);
    let remainder = value.rem_euclid(factor);
    let rounded = match (2 * remainder).cmp(&factor) {
        Ordering::Less => quotient,
        Ordering::Greater => quotient + 1,
        Ordering::Equal if quotient % 2 == 0 => quotient,
        Ordering::Equal => quotient + 1,
    };
    i64::try_from(rounded * factor)
        .map(Number::Int)
        .map_err(|_| NumberError::Overflow)
}

/// Converts an already-integral float into an `Int`, failing for NaN,
/// infinities and values outside the `i64` range.
pub fn float_to_int(f: f64) -> NumberResult {
    if f.is_nan() {
        Err(NumberError::Domain)
    } else if !(-I64_LIMIT..I64_LIMIT).contains(&f) {
        Err(NumberError::Overflow)
    } else {
        Ok(Number::Int(f as i64))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(*other)
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Int(i)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{}", i),
            Number::Float(x) if x.is_nan() => write!(f, "nan"),
            // Debug keeps the trailing `.0` and switches to exponent notation
            // for very large or small magnitudes, both of which read back.
            Number::Float(x) => write!(f, "{:?}", x),
        }
    }
}
