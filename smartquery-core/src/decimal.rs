//! Exact base-10 numbers backing every numeric value of the language.
//!
//! Literals like `0.1` are stored as decimals, so sums of them behave the way
//! a human expects (`0.1 + 0.1 + 0.1` equals `0.3`), which binary floats do
//! not guarantee. Operations that cannot be exact (division, exponentiation)
//! round to a fixed number of significant digits.

use std::fmt;
use std::ops;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ParseBigDecimalError, RoundingMode};
use num_traits::{FromPrimitive, One, ToPrimitive, Zero};

/// Significant digits kept by inexact operations (division, exponentiation).
const PRECISION: u64 = 28;

/// Largest integer exponent accepted by [`Decimal::pow`].
const MAX_INT_EXPONENT: i64 = 1_000_000;

/// Above this many digits on either side of the point, [`fmt::Display`]
/// switches to scientific notation instead of writing the digits out.
const PLAIN_NOTATION_LIMIT: i64 = 40;

/// An arbitrary-precision decimal number.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Decimal(BigDecimal);

impl Decimal {
    // ==================== Constructors ====================

    pub fn zero() -> Decimal {
        Decimal(BigDecimal::zero())
    }

    pub fn one() -> Decimal {
        Decimal(BigDecimal::one())
    }

    /// Convert a binary float, failing on NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Decimal> {
        BigDecimal::from_f64(value).map(Decimal)
    }

    // ==================== Inspection ====================

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_integer(&self) -> bool {
        self.0.is_integer()
    }

    /// The value truncated towards zero, as a machine integer.
    /// Fails when the magnitude does not fit `i64`.
    ///
    /// ```
    /// use smartquery_core::Decimal;
    /// let d: Decimal = "-2.7".parse().unwrap();
    /// assert_eq!(d.to_index(), Some(-2));
    /// ```
    pub fn to_index(&self) -> Option<i64> {
        self.0.with_scale_round(0, RoundingMode::Down).to_i64()
    }

    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64()
    }

    // ==================== Transformations ====================

    /// Truncate towards zero.
    pub fn trunc(&self) -> Decimal {
        Decimal(self.0.with_scale_round(0, RoundingMode::Down))
    }

    /// Round to `digits` fractional digits, ties going to the even neighbor.
    ///
    /// ```
    /// use smartquery_core::Decimal;
    /// let d: Decimal = "0.665".parse().unwrap();
    /// assert_eq!(d.round_digits(2).to_string(), "0.66");
    /// ```
    pub fn round_digits(&self, digits: i64) -> Decimal {
        Decimal(self.0.with_scale_round(digits, RoundingMode::HalfEven))
    }

    pub fn floor(&self) -> Decimal {
        Decimal(self.0.with_scale_round(0, RoundingMode::Floor))
    }

    pub fn ceil(&self) -> Decimal {
        Decimal(self.0.with_scale_round(0, RoundingMode::Ceiling))
    }

    pub fn abs(&self) -> Decimal {
        Decimal(self.0.abs())
    }

    /// Raise to a power, keeping the cost bounded no matter the operands.
    ///
    /// Integer exponents are computed by squaring, rounding intermediate
    /// products to [`PRECISION`] significant digits so that the digit count
    /// never explodes. Fractional exponents fall back to `f64::powf`.
    /// Returns `None` for unrepresentable results (zero to a negative power,
    /// overflowing floats, exponents beyond [`MAX_INT_EXPONENT`]).
    pub fn pow(&self, exponent: &Decimal) -> Option<Decimal> {
        if exponent.is_integer() {
            let exp = exponent.0.to_i64()?;
            if exp.abs() > MAX_INT_EXPONENT {
                return None;
            }
            let mut base = self.0.with_prec(PRECISION);
            let mut remaining = exp.unsigned_abs();
            let mut result = BigDecimal::one();
            while remaining > 0 {
                if remaining & 1 == 1 {
                    result = (&result * &base).with_prec(PRECISION);
                }
                base = (&base * &base).with_prec(PRECISION);
                remaining >>= 1;
            }
            if exp < 0 {
                if result.is_zero() {
                    return None;
                }
                result = (BigDecimal::one() / &result).with_prec(PRECISION);
            }
            Some(Decimal(result))
        } else {
            let value = self.0.to_f64()?.powf(exponent.0.to_f64()?);
            if value.is_finite() {
                Decimal::from_f64(value)
            } else {
                None
            }
        }
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Decimal {
        Decimal(BigDecimal::from(value))
    }
}

impl FromStr for Decimal {
    type Err = ParseBigDecimalError;

    fn from_str(s: &str) -> Result<Decimal, Self::Err> {
        s.parse::<BigDecimal>().map(Decimal)
    }
}

impl ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl ops::Div for Decimal {
    type Output = Decimal;

    /// Divide, rounding nonterminating quotients to [`PRECISION`]
    /// significant digits.
    ///
    /// # Panic
    ///
    /// Panics when `rhs` is zero; callers check [`Decimal::is_zero`] first.
    fn div(self, rhs: Decimal) -> Decimal {
        Decimal((self.0 / rhs.0).with_prec(PRECISION))
    }
}

impl ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normalized = self.0.clone().normalized();
        let (int_part, scale) = normalized.as_bigint_and_exponent();
        let mut digits = int_part.to_string();
        let negative = digits.starts_with('-');
        if negative {
            digits.remove(0);
        }
        // Number of digits left of the point; negative when the value
        // starts with leading fractional zeros.
        let magnitude = digits.len() as i64 - scale;
        if scale > PLAIN_NOTATION_LIMIT || magnitude > PLAIN_NOTATION_LIMIT {
            let exp = digits.len() as i64 - 1 - scale;
            if negative {
                f.write_str("-")?;
            }
            if digits.len() == 1 {
                write!(f, "{}e{:+}", digits, exp)
            } else {
                write!(f, "{}.{}e{:+}", &digits[..1], &digits[1..], exp)
            }
        } else {
            write!(f, "{}", normalized)
        }
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn exact_addition() {
        let sum = dec("0.1") + dec("0.1") + dec("0.1");
        assert_eq!(sum, dec("0.3"));
    }

    #[test]
    fn equality_ignores_scale() {
        assert_eq!(dec("26"), dec("26.00"));
        assert_eq!(dec("0.30"), dec("0.3"));
    }

    #[test]
    fn truncation() {
        assert_eq!(dec("5.9").to_index(), Some(5));
        assert_eq!(dec("-5.9").to_index(), Some(-5));
        assert_eq!(dec("7").to_index(), Some(7));
    }

    #[test]
    fn rounding() {
        assert_eq!((dec("2") / dec("3")).round_digits(2), dec("0.67"));
        assert_eq!(dec("2.5").round_digits(0), dec("2"));
        assert_eq!(dec("3.5").round_digits(0), dec("4"));
    }

    #[test]
    fn floor_and_ceil() {
        assert_eq!(dec("2.1").floor(), dec("2"));
        assert_eq!(dec("-2.1").floor(), dec("-3"));
        assert_eq!(dec("2.1").ceil(), dec("3"));
        assert_eq!(dec("-2.1").ceil(), dec("-2"));
    }

    #[test]
    fn pow_stays_small() {
        // The digit count of huge powers must stay bounded.
        let result = dec("1000").pow(&dec("100000")).unwrap();
        assert!(!result.is_zero());
        assert_eq!(result.to_string(), "1e+300000");
    }

    #[test]
    fn pow_basics() {
        assert_eq!(dec("2").pow(&dec("10")).unwrap(), dec("1024"));
        assert_eq!(dec("2").pow(&dec("-2")).unwrap(), dec("0.25"));
        assert_eq!(dec("5").pow(&dec("0")).unwrap(), dec("1"));
    }

    #[test]
    fn display_is_normalized() {
        assert_eq!(dec("26.00").to_string(), "26");
        assert_eq!(dec("0.300").to_string(), "0.3");
        assert_eq!(dec("-1.5").to_string(), "-1.5");
        assert_eq!(dec("0").to_string(), "0");
    }
}
