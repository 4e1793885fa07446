//! Arbitrary-precision numbers.
use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Exponent bound applied by `FromStr`.
pub const DEFAULT_MAX_EXPONENT: u32 = 4096;

/// Decimal literal grammar accepted from strings: optional sign, digits with
/// an optional fraction (or a bare fraction), optional exponent. No
/// whitespace, no hex, no `inf`/`nan`.
static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$").unwrap());

/// An exact decimal number. Values compare by magnitude, so `1`, `1.0` and
/// `1e0` are the same number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Number(BigDecimal);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseNumberError {
    #[error("{0:?} is not a number literal")]
    Syntax(String),
    #[error("{literal:?} has a decimal exponent beyond \u{b1}{limit}")]
    OutOfRange { literal: String, limit: u32 },
}

impl Number {
    pub fn zero() -> Self {
        Number(BigDecimal::zero())
    }

    /// Shortest decimal that round-trips the float, so `0.1f64` is `0.1`.
    /// NaN and the infinities have no number.
    pub fn from_f64(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        BigDecimal::from_str(&format!("{f}")).ok().map(Number)
    }

    /// The exact binary value of the float, digit for digit. Used for floats
    /// read off the wire, where the bit pattern is the value.
    pub fn from_f64_exact(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        Some(Number(exact_decimal(f)))
    }

    /// Parse a decimal literal whose exponent stays within `max_exponent`
    /// either way, so `1e5` passes a bound of 5 and `1e6` does not.
    pub fn parse_bounded(s: &str, max_exponent: u32) -> Result<Self, ParseNumberError> {
        if !NUMBER_LITERAL.is_match(s) {
            return Err(ParseNumberError::Syntax(s.to_string()));
        }
        let body = s.strip_prefix('+').unwrap_or(s);
        let n = BigDecimal::from_str(body).map(Number).map_err(|_| ParseNumberError::Syntax(s.to_string()))?;
        if !n.within_exponent(max_exponent) {
            return Err(ParseNumberError::OutOfRange { literal: s.to_string(), limit: max_exponent });
        }
        Ok(n)
    }

    /// Whether the decimal exponent lies within `max_exponent` in either
    /// direction. Zero always does.
    pub fn within_exponent(&self, max_exponent: u32) -> bool {
        if self.0.is_zero() {
            return true;
        }
        let (_, scale) = self.0.as_bigint_and_exponent();
        scale.unsigned_abs() <= u64::from(max_exponent)
    }

    /// `digits` e `exponent`, never expanded.
    pub fn to_scientific_string(&self) -> String {
        let (digits, scale) = self.0.as_bigint_and_exponent();
        match scale {
            0 => digits.to_string(),
            _ => format!("{digits}e{}", -scale),
        }
    }

    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    /// `Some` only when the number is an integer that fits an `i64`.
    pub fn to_i64_exact(&self) -> Option<i64> {
        if self.0.is_integer() { self.0.to_i64() } else { None }
    }

    pub fn to_u64_exact(&self) -> Option<u64> {
        if self.0.is_integer() { self.0.to_u64() } else { None }
    }

    /// `Some` only when a float64 holds exactly this value.
    pub fn to_f64_exact(&self) -> Option<f64> {
        let f = self.0.to_f64()?;
        if !f.is_finite() {
            return None;
        }
        (exact_decimal(f) == self.0).then_some(f)
    }

    /// Lossy float view, for diagnostics and host interop.
    pub fn to_f64_lossy(&self) -> f64 {
        self.0.to_f64().unwrap_or(f64::NAN)
    }

    /// Plain positional notation without exponent or trailing zeros:
    /// `1e3` renders as `1000`, `2.50` as `2.5`.
    pub fn to_plain_string(&self) -> String {
        if self.0.is_zero() {
            return "0".to_string();
        }
        self.0.normalized().to_plain_string()
    }
}

/// mantissa * 2^exp, expanded to decimal without rounding.
fn exact_decimal(f: f64) -> BigDecimal {
    let bits = f.to_bits();
    let negative = bits >> 63 == 1;
    let exp_bits = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if exp_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exp_bits - 1075)
    };
    let mut digits = BigInt::from(mantissa);
    if negative {
        digits = -digits;
    }
    if exp >= 0 {
        BigDecimal::new(digits << (exp as usize), 0)
    } else {
        // m / 2^k == m * 5^k / 10^k
        let k = (-exp) as u32;
        BigDecimal::new(digits * BigInt::from(5u8).pow(k), k as i64)
    }
}

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Number::parse_bounded(s, DEFAULT_MAX_EXPONENT)
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self { Number(BigDecimal::from(v)) }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self { Number(BigDecimal::from(v)) }
}

impl From<u64> for Number {
    fn from(v: u64) -> Self { Number(BigDecimal::from(v)) }
}

impl From<BigDecimal> for Number {
    fn from(v: BigDecimal) -> Self { Number(v) }
}

impl Number {
    // numbers built outside the parsers may carry any exponent
    fn rendered(&self) -> String {
        if self.within_exponent(DEFAULT_MAX_EXPONENT) { self.to_plain_string() } else { self.to_scientific_string() }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered())
    }
}

impl fmt::Debug for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Number({})", self.rendered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(s: &str) -> Number {
        s.parse().unwrap()
    }

    #[test]
    fn literal_grammar() {
        for ok in ["0", "-1", "+7", "1.5", "-1.5e2", ".5", "5.", "1E10", "007"] {
            assert!(ok.parse::<Number>().is_ok(), "{ok}");
        }
        for bad in ["", " 1", "1 ", "abc", "1e", "--1", "0x10", "inf", "NaN", "1,000"] {
            assert!(bad.parse::<Number>().is_err(), "{bad}");
        }
    }

    #[test]
    fn equality_is_by_magnitude() {
        assert_eq!(n("1"), n("1.0"));
        assert_eq!(n("1e3"), n("1000"));
        assert_eq!(n("-1.5e2"), Number::from(-150i64));
        assert!(n("2") > n("1.99999999999999999999"));
    }

    #[test]
    fn plain_rendering() {
        assert_eq!(n("1e3").to_plain_string(), "1000");
        assert_eq!(n("2.50").to_plain_string(), "2.5");
        assert_eq!(n("-0.000").to_plain_string(), "0");
        assert_eq!(n("0.001").to_plain_string(), "0.001");
    }

    #[test]
    fn exact_representations() {
        assert_eq!(n("42").to_i64_exact(), Some(42));
        assert_eq!(n("4.2").to_i64_exact(), None);
        assert_eq!(n("1267650600228229401496703205376").to_i64_exact(), None);
        assert_eq!(n("0.5").to_f64_exact(), Some(0.5));
        assert_eq!(n("0.1").to_f64_exact(), None);
        assert_eq!(n("-1e300").to_f64_exact(), None);
    }

    #[test]
    fn float_sources() {
        assert_eq!(Number::from_f64(0.1), Some(n("0.1")));
        assert_eq!(Number::from_f64(f64::NAN), None);
        assert_eq!(Number::from_f64(f64::INFINITY), None);
        let exact = Number::from_f64_exact(0.1).unwrap();
        assert_ne!(exact, n("0.1"));
        assert_eq!(exact.to_f64_exact(), Some(0.1));
        assert_eq!(Number::from_f64_exact(-2.0), Some(n("-2")));
    }

    #[test]
    fn exponents_are_bounded() {
        assert!(Number::parse_bounded("1e5", 5).is_ok());
        assert!(Number::parse_bounded("1e-5", 5).is_ok());
        assert_eq!(
            Number::parse_bounded("1e6", 5),
            Err(ParseNumberError::OutOfRange { literal: "1e6".into(), limit: 5 })
        );
        assert!(Number::parse_bounded("1e-6", 5).is_err());
        assert!(Number::parse_bounded("0e999999", 5).is_ok());
        assert!("1e2000000".parse::<Number>().is_err());
        assert!(Number::from_f64_exact(f64::MIN_POSITIVE / 4.0).unwrap().within_exponent(DEFAULT_MAX_EXPONENT));
    }

    #[test]
    fn huge_exponents_render_compactly() {
        let huge = Number::parse_bounded("1e2000000", u32::MAX).unwrap();
        assert_eq!(huge.to_scientific_string(), "1e2000000");
        assert_eq!(format!("{huge:?}"), "Number(1e2000000)");
        assert_eq!(n("25e-1").to_scientific_string(), "25e-1");
        assert_eq!(n("12").to_scientific_string(), "12");
    }
}
