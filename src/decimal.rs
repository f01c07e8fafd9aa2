//! Fixed-point decimal type with 4 decimal places precision.
//!
//! Uses `rust_decimal` internally with scale enforcement so ledger amounts and
//! wallet balances never pick up floating-point error. Storage backends that
//! cannot hold a decimal natively persist the value as an integer count of
//! 1/10000 units (see [`Decimal4::to_units`]).

use rust_decimal::Decimal;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// A decimal type that maintains exactly 4 decimal places of precision.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use webhook_ledger::Decimal4;
///
/// let amount = Decimal4::from_str("99.5").unwrap();
/// assert_eq!(amount.to_string(), "99.5000");
/// assert_eq!(amount.to_units(), Some(995_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Decimal4(Decimal);

impl Decimal4 {
    /// The number of decimal places to maintain.
    pub const SCALE: u32 = 4;

    /// Zero value.
    pub const ZERO: Self = Decimal4(Decimal::ZERO);

    /// Creates a new `Decimal4` from a `Decimal`, normalizing to 4 decimal places.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value;
        normalized.rescale(Self::SCALE);
        Decimal4(normalized)
    }

    /// Builds a value from an integer count of 1/10000 units.
    pub fn from_units(units: i64) -> Self {
        Decimal4(Decimal::new(units, Self::SCALE))
    }

    /// Returns the value as an integer count of 1/10000 units, or `None` if it
    /// does not fit in an `i64`.
    pub fn to_units(&self) -> Option<i64> {
        let mut scaled = self.0;
        scaled.rescale(Self::SCALE);
        if scaled.scale() != Self::SCALE {
            return None;
        }
        i64::try_from(scaled.mantissa()).ok()
    }

    /// Addition that returns `None` instead of panicking on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Decimal4::new)
    }

    /// Subtraction that returns `None` instead of panicking on overflow.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Decimal4::new)
    }

    /// Returns `true` if this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl From<Decimal> for Decimal4 {
    fn from(value: Decimal) -> Self {
        Decimal4::new(value)
    }
}

impl FromStr for Decimal4 {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)?;
        Ok(Decimal4::new(decimal))
    }
}

impl fmt::Display for Decimal4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Add for Decimal4 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Decimal4::new(self.0 + rhs.0)
    }
}

impl AddAssign for Decimal4 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sub for Decimal4 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Decimal4::new(self.0 - rhs.0)
    }
}

impl SubAssign for Decimal4 {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
        self.0.rescale(Self::SCALE);
    }
}

impl Sum for Decimal4 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Decimal4::ZERO, |acc, amount| acc + amount)
    }
}

impl<'a> Sum<&'a Decimal4> for Decimal4 {
    fn sum<I: Iterator<Item = &'a Decimal4>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_normalizes_scale() {
        let d = Decimal4::from_str("50").unwrap();
        assert_eq!(d.to_string(), "50.0000");

        let d = Decimal4::from_str("99.50").unwrap();
        assert_eq!(d.to_string(), "99.5000");

        let d = Decimal4::from_str("  125.75  ").unwrap();
        assert_eq!(d.to_string(), "125.7500");
    }

    #[test]
    fn test_units_conversion() {
        let d = Decimal4::from_str("0.0001").unwrap();
        assert_eq!(d.to_units(), Some(1));

        let d = Decimal4::from_units(1_000_000);
        assert_eq!(d.to_string(), "100.0000");

        let d = Decimal4::from_units(-25_000);
        assert_eq!(d.to_string(), "-2.5000");
        assert!(d.is_negative());
    }

    #[test]
    fn test_units_overflow_is_reported() {
        let d = Decimal4::from_str("99999999999999999999.0").unwrap();
        assert_eq!(d.to_units(), None);
    }

    #[test]
    fn test_sum_of_amounts() {
        let amounts = [
            Decimal4::from_str("100").unwrap(),
            Decimal4::from_str("0.25").unwrap(),
            Decimal4::from_str("75.5").unwrap(),
        ];
        let total: Decimal4 = amounts.iter().sum();
        assert_eq!(total.to_string(), "175.7500");

        let empty: Vec<Decimal4> = Vec::new();
        assert!(empty.into_iter().sum::<Decimal4>().is_zero());
    }

    #[test]
    fn test_arithmetic_preserves_scale() {
        let a = Decimal4::from_str("1.5").unwrap();
        let b = Decimal4::from_str("2.5").unwrap();

        assert_eq!((a + b).to_string(), "4.0000");
        assert_eq!((a - b).to_string(), "-1.0000");
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let max = Decimal4::from_str("79228162514264337593543950335").unwrap();
        let one = Decimal4::from_str("1").unwrap();

        assert_eq!(max.checked_add(max), None);
        assert_eq!((Decimal4::ZERO - max).checked_sub(max), None);
        assert_eq!(one.checked_add(one).unwrap().to_string(), "2.0000");
        assert_eq!(one.checked_sub(one), Some(Decimal4::ZERO));
        assert_eq!(max.to_units(), None);
    }
}
