//! Base-Unit Amount Codec
//! Mission: Lossless fixed-point conversions for stake amounts
//!
//! All monetary amounts cross module boundaries as base-unit integers in
//! decimal string form. Floats are never used for amount arithmetic, only
//! the display conversion here touches human-readable decimals.

use num_bigint::BigUint;

use crate::models::Currency;

/// Amount parsing/conversion failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Not a valid non-negative decimal number
    InvalidAmount(String),
    /// Not a valid base-unit integer string
    InvalidBaseUnits(String),
}

impl std::fmt::Display for AmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountError::InvalidAmount(s) => write!(f, "invalid amount: {}", s),
            AmountError::InvalidBaseUnits(s) => write!(f, "invalid base units: {}", s),
        }
    }
}

impl std::error::Error for AmountError {}

/// Parse a base-unit decimal string into a big integer
pub fn parse_base_units(s: &str) -> Result<BigUint, AmountError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::InvalidBaseUnits(s.to_string()));
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| AmountError::InvalidBaseUnits(s.to_string()))
}

/// Convert a human-readable decimal amount ("10.5") to base units.
/// Fractional digits beyond the currency's precision are truncated.
pub fn to_base_units(amount: &str, currency: Currency) -> Result<String, AmountError> {
    let decimals = currency.decimals();

    let (whole, frac) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::InvalidAmount(amount.to_string()));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::InvalidAmount(amount.to_string()));
    }

    let mut padded_frac = frac.to_string();
    padded_frac.truncate(decimals);
    while padded_frac.len() < decimals {
        padded_frac.push('0');
    }

    let concatenated = format!("{}{}", whole, padded_frac);
    let value = BigUint::parse_bytes(concatenated.as_bytes(), 10)
        .ok_or_else(|| AmountError::InvalidAmount(amount.to_string()))?;

    Ok(value.to_string())
}

/// Convert a base-unit integer string back to a human-readable decimal
pub fn from_base_units(base_units: &str, currency: Currency) -> Result<String, AmountError> {
    // Validates and normalizes leading zeros
    let value = parse_base_units(base_units)?;
    let digits = value.to_string();
    let decimals = currency.decimals();

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let split = padded.len() - decimals;
    let whole = &padded[..split];
    let frac = padded[split..].trim_end_matches('0');

    if frac.is_empty() {
        Ok(whole.to_string())
    } else {
        Ok(format!("{}.{}", whole, frac))
    }
}

/// True if the base-unit string encodes a non-zero amount
pub fn is_positive(base_units: &str) -> bool {
    parse_base_units(base_units)
        .map(|v| v > BigUint::from(0u32))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_base_units_usdc() {
        assert_eq!(to_base_units("10.5", Currency::Usdc).unwrap(), "10500000");
        assert_eq!(to_base_units("0.1", Currency::Usdc).unwrap(), "100000");
        assert_eq!(to_base_units("3", Currency::Usdc).unwrap(), "3000000");
    }

    #[test]
    fn test_to_base_units_wld() {
        assert_eq!(
            to_base_units("1", Currency::Wld).unwrap(),
            "1000000000000000000"
        );
        assert_eq!(
            to_base_units("0.000000000000000001", Currency::Wld).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_excess_precision_truncates() {
        // 7th fractional digit is below USDC precision
        assert_eq!(to_base_units("1.2345678", Currency::Usdc).unwrap(), "1234567");
    }

    #[test]
    fn test_from_base_units() {
        assert_eq!(from_base_units("10500000", Currency::Usdc).unwrap(), "10.5");
        assert_eq!(from_base_units("100000", Currency::Usdc).unwrap(), "0.1");
        assert_eq!(from_base_units("0", Currency::Usdc).unwrap(), "0");
        assert_eq!(
            from_base_units("1000000000000000000", Currency::Wld).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_round_trip() {
        for amount in ["0.1", "1", "12.25", "10000"] {
            let base = to_base_units(amount, Currency::Usdc).unwrap();
            assert_eq!(from_base_units(&base, Currency::Usdc).unwrap(), amount);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(to_base_units("", Currency::Usdc).is_err());
        assert!(to_base_units("-1", Currency::Usdc).is_err());
        assert!(to_base_units("1.2.3", Currency::Usdc).is_err());
        assert!(to_base_units("abc", Currency::Usdc).is_err());
        assert!(parse_base_units("12x").is_err());
        assert!(parse_base_units("").is_err());
    }

    #[test]
    fn test_is_positive() {
        assert!(is_positive("1"));
        assert!(!is_positive("0"));
        assert!(!is_positive("junk"));
    }
}
