use std::{fmt::Display, str::FromStr};

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::FiatAmount;

/// The number of wei in one unit of the chain's native currency.
pub const WEI_PER_NATIVE: u128 = 1_000_000_000_000_000_000;

//--------------------------------------        Wei        ---------------------------------------------------------
/// An amount in the chain's smallest unit.
///
/// All on-chain comparisons are done on this type. It is backed by a 256-bit unsigned integer, so there is no
/// floating point anywhere near a payment check. It serializes as a decimal string, since JSON numbers cannot carry
/// values of this size faithfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(U256);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in wei: {0}")]
pub struct WeiConversionError(String);

impl Wei {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a JSON-RPC hex quantity, e.g. `0x1bc16d674ec80000`.
    ///
    /// Absent and empty values (including a bare `0x`) are zero. Anything else that is not valid hex is an error.
    pub fn from_hex_quantity(value: Option<&str>) -> Result<Self, WeiConversionError> {
        let s = match value.map(str::trim) {
            None => return Ok(Self::ZERO),
            Some(s) => s,
        };
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }
        U256::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| WeiConversionError(format!("'{s}' is not a hex quantity. {e}")))
    }

    /// Convert a fiat price to wei at a fixed rate, given as fiat minor units per whole native coin.
    ///
    /// For example, at 250.00 USD per ETH (`25_000` cents), a price of 29.00 USD is `116_000_000_000_000_000` wei.
    /// The division truncates.
    pub fn from_fiat(price: FiatAmount, minor_units_per_native: u64) -> Result<Self, WeiConversionError> {
        if minor_units_per_native == 0 {
            return Err(WeiConversionError("The exchange rate cannot be zero".into()));
        }
        let minor = u64::try_from(price.minor_units())
            .map_err(|_| WeiConversionError(format!("Negative prices cannot be converted: {price}")))?;
        let scaled = U256::from(minor)
            .checked_mul(U256::from(WEI_PER_NATIVE))
            .ok_or_else(|| WeiConversionError(format!("{price} overflows when scaled to wei")))?;
        Ok(Self(scaled / U256::from(minor_units_per_native)))
    }
}

impl From<u64> for Wei {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for Wei {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl FromStr for Wei {
    type Err = WeiConversionError;

    /// Accepts either a decimal string or a `0x`-prefixed hex quantity.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with("0x") || s.starts_with("0X") {
            return Self::from_hex_quantity(Some(s));
        }
        if s.is_empty() {
            return Err(WeiConversionError("empty string".into()));
        }
        U256::from_str_radix(s, 10).map(Self).map_err(|e| WeiConversionError(format!("'{s}' is not a number. {e}")))
    }
}

impl Display for Wei {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WeiVisitor;

        impl<'de> de::Visitor<'de> for WeiVisitor {
            type Value = Wei;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a decimal string, hex quantity or unsigned integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Wei, E> {
                Ok(Wei::from(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Wei, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WeiVisitor)
    }
}
