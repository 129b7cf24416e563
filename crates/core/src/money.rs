use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;

/// A currency amount held as a two-decimal `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::from(cents) / Decimal::from(100))
    }

    pub fn to_cents(self) -> i64 {
        (self.0 * Decimal::from(100)).round().to_i64().unwrap_or_default()
    }

    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.round_dp(2))
    }

    /// Converts a pre-parsed float (as handed over by OCR providers). Non-finite input yields `None`.
    pub fn from_f64(value: f64) -> Option<Self> {
        Decimal::from_f64(value).map(Self::from_decimal)
    }

    /// Parses `"$1,234.56"`, `"4.99"` or `"-0.50"`; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let clean: String = s
            .trim()
            .chars()
            .filter(|c| *c != ',' && *c != '$' && !c.is_whitespace())
            .collect();
        if clean.is_empty() {
            return None;
        }
        Decimal::from_str(&clean).ok().map(Self::from_decimal)
    }

    pub fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or_default()
    }

    /// Absolute difference between two amounts.
    pub fn distance(self, other: Money) -> Money {
        (self - other).abs()
    }

    /// True when `self` and `other` differ by at most `tolerance`.
    pub fn approx_eq(self, other: Money, tolerance: Money) -> bool {
        self.distance(other) <= tolerance
    }

    /// `self` as a percentage of `base`; `None` when `base` is zero.
    pub fn percent_of(self, base: Money) -> Option<Decimal> {
        if base.is_zero() {
            return None;
        }
        Some(self.0 / base.0 * Decimal::from(100))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_sign_negative() && !self.0.is_zero() {
            write!(f, "-${:.2}", self.0.abs())
        } else {
            write!(f, "${:.2}", self.0)
        }
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_roundtrip() {
        assert_eq!(Money::from_cents(499).to_cents(), 499);
        assert_eq!(Money::from_cents(-42).to_cents(), -42);
    }

    #[test]
    fn parse_accepts_symbols_and_separators() {
        assert_eq!(Money::parse("$1,234.56"), Some(Money::from_cents(123456)));
        assert_eq!(Money::parse(" 4.99 "), Some(Money::from_cents(499)));
        assert_eq!(Money::parse("-0.50"), Some(Money::from_cents(-50)));
        assert_eq!(Money::parse("abc"), None);
        assert_eq!(Money::parse(""), None);
    }

    #[test]
    fn from_f64_rounds_to_cents() {
        assert_eq!(Money::from_f64(8.91), Some(Money::from_cents(891)));
        assert_eq!(Money::from_f64(0.125).map(Money::to_cents), Some(12));
        assert_eq!(Money::from_f64(f64::NAN), None);
    }

    #[test]
    fn approx_eq_respects_tolerance() {
        let tol = Money::from_cents(3);
        assert!(Money::from_cents(891).approx_eq(Money::from_cents(888), tol));
        assert!(!Money::from_cents(891).approx_eq(Money::from_cents(887), tol));
    }

    #[test]
    fn sum_of_amounts() {
        let total: Money = [499, 350].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total, Money::from_cents(849));
    }

    #[test]
    fn percent_of_base() {
        let pct = Money::from_cents(42).percent_of(Money::from_cents(849)).unwrap();
        assert!(pct > Decimal::from(4) && pct < Decimal::from(5));
        assert_eq!(Money::from_cents(1).percent_of(Money::zero()), None);
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Money::from_cents(891).to_string(), "$8.91");
        assert_eq!(Money::from_cents(-50).to_string(), "-$0.50");
    }
}
