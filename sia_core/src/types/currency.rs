use core::num::ParseIntError;
use core::ops::{Add, Deref, DerefMut, Div, Mul, Rem, Sub};
use std::io::Write;
use std::iter::Sum;

use serde::{Deserialize, Serialize};

use crate::encoding::{self, SiaDecodable, SiaEncodable};

// I miss untyped constants
const SIACOIN_PRECISION_I32: i32 = 24;
const SIACOIN_PRECISION_U32: u32 = 24;

// Currency represents a quantity of Siacoins as Hastings.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Currency(u128);

impl Serialize for Currency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CurrencyVisitor;

        impl serde::de::Visitor<'_> for CurrencyVisitor {
            type Value = Currency;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string or numeric representing a currency value")
            }

            fn visit_str<E: serde::de::Error>(self, s: &str) -> Result<Self::Value, E> {
                Currency::parse_string(s).map_err(|e| serde::de::Error::custom(format!("{:?}", e)))
            }

            fn visit_i64<E: serde::de::Error>(self, value: i64) -> Result<Self::Value, E> {
                if value < 0 {
                    return Err(serde::de::Error::custom("currency value must be positive"));
                }
                Ok(Currency::new(value as u128))
            }

            fn visit_i128<E: serde::de::Error>(self, value: i128) -> Result<Self::Value, E> {
                if value < 0 {
                    return Err(serde::de::Error::custom("currency value must be positive"));
                }
                Ok(Currency::new(value as u128))
            }

            fn visit_u64<E: serde::de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Currency::new(value as u128))
            }

            fn visit_u128<E: serde::de::Error>(self, value: u128) -> Result<Self::Value, E> {
                Ok(Currency::new(value))
            }
        }

        deserializer.deserialize_any(CurrencyVisitor)
    }
}

impl SiaEncodable for Currency {
    fn encode<W: Write>(&self, w: &mut W) -> encoding::Result<()> {
        w.write_all(&self.0.to_le_bytes())?;
        Ok(())
    }
}

impl SiaDecodable for Currency {
    fn decode<R: std::io::Read>(r: &mut R) -> encoding::Result<Self> {
        let mut buf = [0u8; 16];
        r.read_exact(&mut buf)?;
        Ok(Currency(u128::from_le_bytes(buf)))
    }
}

// Implement Deref and DerefMut to be able to implicitly use Currency as a u128
// This gives us all the traits that u128 already implements for free.
impl Deref for Currency {
    type Target = u128;
    fn deref(&self) -> &u128 {
        &self.0
    }
}

impl DerefMut for Currency {
    fn deref_mut(&mut self) -> &mut u128 {
        &mut self.0
    }
}

impl TryInto<u64> for Currency {
    type Error = core::num::TryFromIntError;
    fn try_into(self) -> Result<u64, Self::Error> {
        self.0.try_into()
    }
}

impl Currency {
    /// The zero value of the currency.
    pub const ZERO: Currency = Currency(0);

    /// The largest representable currency value.
    pub const MAX: Currency = Currency(u128::MAX);

    pub const fn new(value: u128) -> Self {
        Currency(value)
    }

    pub const fn zero() -> Self {
        Currency::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn parse_string(s: &str) -> Result<Self, CurrencyParseError> {
        let i = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (value, unit) = s.split_at(i);
        let value = value.trim();
        let unit = unit.trim();

        if unit.is_empty() || unit == "H" {
            let value = value.parse::<u128>()?;
            return Ok(Currency::new(value));
        }

        let scaling_factor: i32 = match unit {
            "pS" => -12,
            "nS" => -9,
            "uS" => -6,
            "mS" => -3,
            "SC" => 0,
            "KS" => 3,
            "MS" => 6,
            "GS" => 9,
            "TS" => 12,
            &_ => return Err(CurrencyParseError::InvalidUnit(unit.to_string())),
        };

        let parts: Vec<&str> = value.split('.').collect();
        if parts.len() > 2 {
            return Err(CurrencyParseError::InvalidFormat(
                "too many decimal points".to_string(),
            ));
        }

        let integer_part = parts[0]
            .parse::<u128>()
            .map_err(|_| CurrencyParseError::InvalidFormat("invalid integer part".to_string()))?;
        let fraction_part = if parts.len() == 2 {
            parts[1].parse::<u128>().map_err(|_| {
                CurrencyParseError::InvalidFormat("invalid integer part".to_string())
            })?
        } else {
            0
        };

        let frac_digits = parts.get(1).map_or(0, |frac| frac.len() as i32);
        let integer = integer_part * 10u128.pow((SIACOIN_PRECISION_I32 + scaling_factor) as u32);
        let fraction = fraction_part
            * 10u128.pow((SIACOIN_PRECISION_I32 - frac_digits + scaling_factor) as u32);

        Ok(Currency::new(integer + fraction))
    }

    /// Converts a given amount of Siacoins into the `Currency` type, which
    /// internally represents the value in Hastings where 1 SC = 10^24 H.
    pub const fn siacoins(n: u64) -> Self {
        Currency::new((n as u128) * 10u128.pow(SIACOIN_PRECISION_U32))
    }

    pub fn checked_add(self, other: Currency) -> Option<Self> {
        let v = self.0.checked_add(other.0)?;
        Some(Currency(v))
    }

    pub fn checked_sub(self, other: Currency) -> Option<Self> {
        let v = self.0.checked_sub(other.0)?;
        Some(Currency(v))
    }

    pub fn checked_mul(self, other: Currency) -> Option<Self> {
        let v = self.0.checked_mul(other.0)?;
        Some(Currency(v))
    }

    pub fn checked_div(self, other: Currency) -> Option<Self> {
        let v = self.0.checked_div(other.0)?;
        Some(Currency(v))
    }

    /// Exact-floor division by a u64. Panics if v is zero.
    pub fn div64(self, v: u64) -> Self {
        Currency(self.0 / v as u128)
    }

    /// Multiplication by a u64, saturating at Currency::MAX. Only used where a
    /// capped result is acceptable; consensus sums use checked_mul.
    pub fn saturating_mul64(self, v: u64) -> Self {
        Currency(self.0.saturating_mul(v as u128))
    }
}

impl Add for Currency {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Currency {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Mul for Currency {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self(self.0 * other.0)
    }
}

impl Div for Currency {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Self(self.0 / other.0)
    }
}

impl Rem for Currency {
    type Output = Self;

    fn rem(self, rhs: Self) -> Self::Output {
        Self(self.0 % rhs.0)
    }
}

impl Sum for Currency {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Currency::new(0), Add::add)
    }
}

#[derive(Debug, PartialEq)]
pub enum CurrencyParseError {
    ParseIntErr(ParseIntError),
    InvalidUnit(String),
    InvalidFormat(String),
}

impl From<ParseIntError> for CurrencyParseError {
    fn from(err: ParseIntError) -> Self {
        CurrencyParseError::ParseIntErr(err)
    }
}
