//! Type-safe price representation using decimal arithmetic.
//!
//! Every amount in the store is a non-negative [`Decimal`] in the store
//! currency's standard unit (dollars, not cents). Arithmetic never goes through
//! floating point, and results are rounded to [`Price::MINOR_UNIT_SCALE`]
//! decimal places with banker's rounding.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is negative.
    #[error("price cannot be negative")]
    Negative,
    /// The amount has more precision than the currency supports.
    #[error("price cannot have more than {scale} decimal places")]
    TooPrecise {
        /// Maximum allowed number of decimal places.
        scale: u32,
    },
    /// The amount exceeds [`Price::MAX`].
    #[error("price cannot exceed {max}")]
    Overflow {
        /// Largest storable amount.
        max: Decimal,
    },
}

/// A non-negative monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Number of decimal places in the minor currency unit (cents).
    pub const MINOR_UNIT_SCALE: u32 = 2;

    /// The zero price.
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, Self::MINOR_UNIT_SCALE));

    /// Largest amount a `NUMERIC(10,2)` column holds: `99999999.99`.
    pub const MAX: Self = Self(Decimal::from_parts(
        1_410_065_407,
        2,
        0,
        false,
        Self::MINOR_UNIT_SCALE,
    ));

    /// Create a price, validating sign and precision.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for negative amounts,
    /// [`PriceError::TooPrecise`] for sub-cent amounts such as `0.001` and
    /// [`PriceError::Overflow`] above [`Price::MAX`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        let normalized = amount.normalize();
        if normalized.scale() > Self::MINOR_UNIT_SCALE {
            return Err(PriceError::TooPrecise {
                scale: Self::MINOR_UNIT_SCALE,
            });
        }
        bounded(amount)
    }

    /// Create a price from a number of minor units (e.g. `1999` → `19.99`).
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), Self::MINOR_UNIT_SCALE))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a quantity, producing a line total.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the product exceeds [`Price::MAX`].
    pub fn times(self, quantity: u32) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(overflow)
            .and_then(bounded)
    }

    /// Add two prices, failing on overflow.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Overflow`] if the sum exceeds [`Price::MAX`].
    pub fn checked_add(self, other: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(other.0)
            .ok_or_else(overflow)
            .and_then(bounded)
    }
}

fn overflow() -> PriceError {
    PriceError::Overflow {
        max: Price::MAX.0,
    }
}

fn bounded(amount: Decimal) -> Result<Price, PriceError> {
    let rounded = round(amount);
    if rounded > Price::MAX.0 {
        return Err(overflow());
    }
    Ok(Price(rounded))
}

fn round(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(Price::MINOR_UNIT_SCALE, RoundingStrategy::MidpointNearestEven);
    rounded.rescale(Price::MINOR_UNIT_SCALE);
    rounded
}

impl Default for Price {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(round(self.0 + rhs.0))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(round(amount)))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 2)), Err(PriceError::Negative));
    }

    #[test]
    fn test_new_rejects_sub_cent() {
        assert_eq!(
            Price::new(Decimal::new(1, 3)),
            Err(PriceError::TooPrecise { scale: 2 })
        );
        // Trailing zeros are fine
        assert!(Price::new(Decimal::new(1990, 3)).is_ok());
    }

    #[test]
    fn test_times_is_exact() {
        let price = Price::from_cents(999);
        assert_eq!(price.times(2).unwrap(), Price::from_cents(1998));
        assert_eq!(price.times(3).unwrap().to_string(), "$29.97");
    }

    #[test]
    fn test_amounts_are_bounded_by_column_range() {
        assert_eq!(Price::MAX.to_string(), "$99999999.99");
        assert_eq!(Price::new(Price::MAX.amount()), Ok(Price::MAX));
        assert!(matches!(
            Price::new(Decimal::new(100_000_000, 0)),
            Err(PriceError::Overflow { .. })
        ));
        assert!(matches!(
            Price::from_cents(100).times(100_000_000),
            Err(PriceError::Overflow { .. })
        ));
        assert!(matches!(
            Price::MAX.checked_add(Price::from_cents(1)),
            Err(PriceError::Overflow { .. })
        ));
        assert_eq!(
            Price::from_cents(100).times(99_999_999).unwrap().amount(),
            Decimal::new(9_999_999_900, 2)
        );
    }

    #[test]
    fn test_sum_has_no_drift() {
        let total: Price = std::iter::repeat_n(Price::from_cents(10), 3).sum();
        assert_eq!(total, Price::from_cents(30));
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let from_str: Price = serde_json::from_str("\"9.99\"").unwrap();
        assert_eq!(from_str, Price::from_cents(999));
        let from_int: Price = serde_json::from_str("0").unwrap();
        assert!(from_int.is_zero());
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
        assert!(serde_json::from_str::<Price>("\"100000000\"").is_err());
    }

    #[test]
    fn test_serializes_with_two_places() {
        assert_eq!(
            serde_json::to_string(&Price::from_cents(1998)).unwrap(),
            "\"19.98\""
        );
        assert_eq!(serde_json::to_string(&Price::ZERO).unwrap(), "\"0.00\"");
    }
}
