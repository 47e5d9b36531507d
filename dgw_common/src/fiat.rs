use std::{fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const DEFAULT_FIAT_CURRENCY: &str = "usd";

//--------------------------------------     FiatAmount       ---------------------------------------------------------
/// A price in fiat minor units (cents), so `29.00` is stored as `2900`.
///
/// Serializes as a two-decimal string. Deserializes from a string or a JSON number; numbers are rounded to the
/// nearest cent at this boundary and never used in any payment comparison afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiatAmount(i64);

#[derive(Debug, Clone, Error)]
#[error("Invalid fiat amount: {0}")]
pub struct FiatConversionError(String);

impl FiatAmount {
    pub fn from_minor_units(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// The amount as a float in major units. Only for handing to third-party APIs that insist on JSON numbers.
    pub fn as_major_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    fn try_from_f64(value: f64) -> Result<Self, FiatConversionError> {
        if !value.is_finite() || value < 0.0 || value > (i64::MAX / 100) as f64 {
            return Err(FiatConversionError(format!("{value} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self((value * 100.0).round() as i64))
    }
}

impl FromStr for FiatAmount {
    type Err = FiatConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) || frac.len() > 2 {
            return Err(FiatConversionError(format!("'{s}' is not an amount with at most two decimals")));
        }
        let whole = whole.parse::<i64>().map_err(|e| FiatConversionError(format!("'{s}': {e}")))?;
        let cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().unwrap_or_default() * 10,
            _ => frac.parse::<i64>().unwrap_or_default(),
        };
        whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .map(Self)
            .ok_or_else(|| FiatConversionError(format!("'{s}' is too large")))
    }
}

impl Display for FiatAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for FiatAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FiatAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FiatVisitor;

        impl<'de> de::Visitor<'de> for FiatVisitor {
            type Value = FiatAmount;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a non-negative amount as a string or number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FiatAmount, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(FiatAmount)
                    .ok_or_else(|| E::custom(format!("{v} is out of range")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FiatAmount, E> {
                if v < 0 {
                    return Err(E::custom("amounts cannot be negative"));
                }
                v.checked_mul(100).map(FiatAmount).ok_or_else(|| E::custom(format!("{v} is out of range")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FiatAmount, E> {
                FiatAmount::try_from_f64(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FiatAmount, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(FiatVisitor)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_amounts() {
        assert_eq!("29".parse::<FiatAmount>().unwrap().minor_units(), 2900);
        assert_eq!("29.5".parse::<FiatAmount>().unwrap().minor_units(), 2950);
        assert_eq!("29.05".parse::<FiatAmount>().unwrap().minor_units(), 2905);
        assert!("29.055".parse::<FiatAmount>().is_err());
        assert!("-3".parse::<FiatAmount>().is_err());
        assert!("abc".parse::<FiatAmount>().is_err());
        assert!(".50".parse::<FiatAmount>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(FiatAmount::from_minor_units(2900).to_string(), "29.00");
        assert_eq!(FiatAmount::from_minor_units(5).to_string(), "0.05");
    }

    #[test]
    fn deserialize_numbers_and_strings() {
        let a: FiatAmount = serde_json::from_str("29.00").unwrap();
        let b: FiatAmount = serde_json::from_str("29").unwrap();
        let c: FiatAmount = serde_json::from_str(r#""29.00""#).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#""29.00""#);
        assert!(serde_json::from_str::<FiatAmount>("-1").is_err());
    }
}
