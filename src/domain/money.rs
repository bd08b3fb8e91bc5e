//! Monetary amounts stored as integer cents.
//!
//! [`Amount`] never touches floating point once parsed. On the wire it
//! serializes as a decimal string with two fraction digits (`"110.00"`) so
//! JSON clients cannot lose precision; requests may send either a JSON
//! number (`60` or `12.5`) or a decimal string (`"12.50"`).

use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A non-negative-by-convention amount of money in cents.
///
/// Sign is not enforced by the type: donations and goals are validated
/// with [`Amount::is_positive`] at the boundary, while aggregates may be
/// zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

/// Error returned when a string or number is not a valid amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount: {0}")]
pub struct ParseAmountError(String);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from a number of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is strictly greater than zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Subtracts `other`, returning `None` on overflow.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Converts a floating point number of currency units into cents.
    ///
    /// # Errors
    ///
    /// Returns [`ParseAmountError`] if the value is not finite, does not
    /// fit in `i64` cents, or carries more than two fraction digits.
    pub fn from_units_f64(value: f64) -> Result<Self, ParseAmountError> {
        if !value.is_finite() {
            return Err(ParseAmountError(value.to_string()));
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 || rounded.abs() > 9.0e15 {
            return Err(ParseAmountError(value.to_string()));
        }
        #[allow(clippy::cast_possible_truncation)]
        let cents = rounded as i64;
        Ok(Self(cents))
    }

    /// Returns the amount as floating point currency units, for display
    /// and averages only.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_units_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseAmountError(s.to_string());

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        if frac.len() > 2 {
            return Err(err());
        }

        let whole_cents = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .ok()
                .and_then(|w| w.checked_mul(100))
                .ok_or_else(err)?
        };
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        let cents = whole_cents.checked_add(frac_cents).ok_or_else(err)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Sums saturate at the `i64` bounds instead of overflowing.
impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(0_i64, |acc, a| acc.saturating_add(a.0)))
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal amount as a number or string with at most two fraction digits")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
        v.checked_mul(100)
            .map(Amount)
            .ok_or_else(|| E::custom(ParseAmountError(v.to_string())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .map(Amount)
            .ok_or_else(|| E::custom(ParseAmountError(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Amount, E> {
        Amount::from_units_f64(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Amount {
        let Ok(a) = s.parse::<Amount>() else {
            panic!("expected {s} to parse");
        };
        a
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(parse("100").cents(), 10_000);
        assert_eq!(parse("12.5").cents(), 1_250);
        assert_eq!(parse("12.05").cents(), 1_205);
        assert_eq!(parse(".75").cents(), 75);
        assert_eq!(parse("-3.10").cents(), -310);
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["", ".", "abc", "1.234", "1,00", "1e3", "--1"] {
            assert!(bad.parse::<Amount>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn displays_two_fraction_digits() {
        assert_eq!(Amount::from_cents(11_000).to_string(), "110.00");
        assert_eq!(Amount::from_cents(5).to_string(), "0.05");
        assert_eq!(Amount::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let Ok(a) = serde_json::from_str::<Amount>("60") else {
            panic!("integer should deserialize");
        };
        assert_eq!(a.cents(), 6_000);
        let Ok(b) = serde_json::from_str::<Amount>("19.99") else {
            panic!("float should deserialize");
        };
        assert_eq!(b.cents(), 1_999);
        let Ok(c) = serde_json::from_str::<Amount>("\"7.25\"") else {
            panic!("string should deserialize");
        };
        assert_eq!(c.cents(), 725);
        assert!(serde_json::from_str::<Amount>("0.001").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let Ok(json) = serde_json::to_string(&Amount::from_cents(6_050)) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"60.50\"");
    }

    #[test]
    fn sums_amounts() {
        let total: Amount = [6_000, 5_000].into_iter().map(Amount::from_cents).sum();
        assert_eq!(total, Amount::from_cents(11_000));
    }

    #[test]
    fn sums_saturate_instead_of_overflowing() {
        let rows = [Amount::from_cents(i64::MAX), Amount::from_cents(i64::MAX)];
        let total: Amount = rows.iter().sum();
        assert_eq!(total, Amount::from_cents(i64::MAX));
    }
}
