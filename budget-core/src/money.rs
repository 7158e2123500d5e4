use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::BudgetError;
use crate::error::BudgetResult;

/// An amount of money in a single currency, stored as integer minor units
/// (e.g. cents) so that every value is exactly scaled to 2 fractional
/// digits. All arithmetic re-rounds half-away-from-zero and rejects
/// operations across differing currency codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Money {
    minor_units: i64,
    currency: [u8; 3],
}

impl Money {
    /// Builds a `Money` from a decimal string (e.g. `"12.345"`) and a
    /// 3-letter currency code, rounding half-away-from-zero to 2 fractional
    /// digits. Parses the string directly into integer cents rather than
    /// round-tripping through binary floating point, which cannot represent
    /// every exact decimal (`1.005` is not representable and would round the
    /// wrong way if scaled as an `f64`).
    pub fn from_decimal(amount: &str, currency: &str) -> BudgetResult<Self> {
        let code = normalize_currency(currency)?;
        let minor_units = parse_decimal_to_minor_units(amount)
            .ok_or_else(|| BudgetError::validation_field("invalid decimal amount", "amount"))?;
        Ok(Self {
            minor_units,
            currency: code,
        })
    }

    /// Builds a `Money` directly from already-scaled minor units (cents).
    pub fn from_minor_units(minor_units: i64, currency: &str) -> BudgetResult<Self> {
        let code = normalize_currency(currency)?;
        Ok(Self {
            minor_units,
            currency: code,
        })
    }

    #[must_use]
    pub fn zero(currency: &str) -> Self {
        let code = normalize_currency(currency).unwrap_or(*b"USD");
        Self {
            minor_units: 0,
            currency: code,
        }
    }

    #[must_use]
    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    #[must_use]
    pub fn amount(&self) -> f64 {
        self.minor_units as f64 / 100.0
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        std::str::from_utf8(&self.currency).unwrap_or("USD")
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    #[must_use]
    pub fn abs(&self) -> Self {
        Self {
            minor_units: self.minor_units.abs(),
            currency: self.currency,
        }
    }

    #[must_use]
    pub fn negate(&self) -> Self {
        Self {
            minor_units: -self.minor_units,
            currency: self.currency,
        }
    }

    pub fn add(&self, other: &Money) -> BudgetResult<Money> {
        self.same_currency(other)?;
        Ok(Self {
            minor_units: self.minor_units + other.minor_units,
            currency: self.currency,
        })
    }

    pub fn sub(&self, other: &Money) -> BudgetResult<Money> {
        self.same_currency(other)?;
        Ok(Self {
            minor_units: self.minor_units - other.minor_units,
            currency: self.currency,
        })
    }

    #[must_use]
    pub fn scale(&self, factor: f64) -> Money {
        let scaled = self.minor_units as f64 * factor;
        Self {
            minor_units: round_half_away_from_zero(scaled),
            currency: self.currency,
        }
    }

    pub fn div_scalar(&self, divisor: f64) -> BudgetResult<Money> {
        if divisor == 0.0 {
            return Err(BudgetError::validation("division by zero"));
        }
        let scaled = self.minor_units as f64 / divisor;
        Ok(Self {
            minor_units: round_half_away_from_zero(scaled),
            currency: self.currency,
        })
    }

    pub fn compare(&self, other: &Money) -> BudgetResult<Ordering> {
        self.same_currency(other)?;
        Ok(self.minor_units.cmp(&other.minor_units))
    }

    fn same_currency(&self, other: &Money) -> BudgetResult<()> {
        if self.currency != other.currency {
            return Err(BudgetError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency(),
                other.currency()
            )));
        }
        Ok(())
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.minor_units == other.minor_units && self.currency == other.currency
    }
}

impl Eq for Money {}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs_units = self.minor_units.unsigned_abs();
        let whole = abs_units / 100;
        let frac = abs_units % 100;
        let body = format!("{whole}.{frac:02}");
        match self.currency() {
            "USD" => write!(f, "{sign}${body}"),
            "EUR" => write!(f, "{sign}\u{20ac}{body}"),
            "GBP" => write!(f, "{sign}\u{a3}{body}"),
            code => write!(f, "{sign}{body} {code}"),
        }
    }
}

fn normalize_currency(currency: &str) -> BudgetResult<[u8; 3]> {
    let trimmed = currency.trim();
    if trimmed.len() != 3 || !trimmed.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(BudgetError::validation_field(
            "currency must be an uppercase 3-letter code",
            "currency",
        ));
    }
    let bytes = trimmed.as_bytes();
    Ok([bytes[0], bytes[1], bytes[2]])
}

fn round_half_away_from_zero(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}

/// Parses a plain decimal string (optional leading `-`, digits, optional
/// `.` followed by digits) into integer minor units, rounding
/// half-away-from-zero to 2 fractional digits. Works entirely on the
/// string's digits, never through `f64`, so an exact halfway value like
/// `1.005` rounds to `101` rather than whatever a binary approximation of
/// `100.5` happens to round to.
fn parse_decimal_to_minor_units(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    if unsigned.is_empty() {
        return None;
    }
    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return None;
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac_digits = frac_part.chars();
    let first = frac_digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let second = frac_digits.next().and_then(|c| c.to_digit(10)).unwrap_or(0) as i64;
    let round_up = frac_digits.next().and_then(|c| c.to_digit(10)).is_some_and(|d| d >= 5);
    let mut cents = whole * 100 + first * 10 + second;
    if round_up {
        cents += 1;
    }
    Some(if negative { -cents } else { cents })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_usd() {
        let m = Money::from_minor_units(12345, "USD").expect("money");
        assert_eq!(m.to_string(), "$123.45");
    }

    #[test]
    fn formats_negative_other_currency() {
        let m = Money::from_minor_units(-500, "JPY").expect("money");
        assert_eq!(m.to_string(), "-5.00 JPY");
    }

    #[test]
    fn rejects_mismatched_currency_add() {
        let a = Money::from_minor_units(100, "USD").expect("money");
        let b = Money::from_minor_units(100, "EUR").expect("money");
        assert!(a.add(&b).is_err());
    }

    #[test]
    fn half_away_from_zero_rounding() {
        let m = Money::from_decimal("1.005", "USD").expect("money");
        assert_eq!(m.minor_units(), 101);
        let m2 = Money::from_decimal("-1.005", "USD").expect("money");
        assert_eq!(m2.minor_units(), -101);
    }

    #[test]
    fn from_decimal_rejects_malformed_input() {
        assert!(Money::from_decimal("1.2.3", "USD").is_err());
        assert!(Money::from_decimal("abc", "USD").is_err());
        assert!(Money::from_decimal("", "USD").is_err());
    }

    #[test]
    fn abs_preserves_currency() {
        let m = Money::from_minor_units(-250, "GBP").expect("money");
        assert_eq!(m.abs().currency(), "GBP");
        assert_eq!(m.abs().minor_units(), 250);
    }

    #[test]
    fn division_by_zero_is_error() {
        let m = Money::from_minor_units(100, "USD").expect("money");
        assert!(m.div_scalar(0.0).is_err());
    }

    #[test]
    fn rejects_invalid_currency_code() {
        assert!(Money::from_minor_units(0, "us").is_err());
        assert!(Money::from_minor_units(0, "USDD").is_err());
    }
}
