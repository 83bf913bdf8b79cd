//! Human-readable order numbers.
//!
//! Format: `PREFIX-<base36 millisecond timestamp>-<4 random [A-Z0-9]>`, all
//! uppercase, e.g. `ORD-M2X8K1QZ-7F3A`. The random suffix keeps numbers issued
//! in the same millisecond apart; actual uniqueness is enforced by the
//! database's unique constraint, not by the generator.

use core::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;

/// A unique, human-readable order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Default prefix when none is configured.
    pub const DEFAULT_PREFIX: &'static str = "ORD";

    /// Longest accepted prefix.
    pub const MAX_PREFIX_LEN: usize = 16;

    /// Whether `prefix` yields order numbers that [`OrderNumber::parse`] accepts.
    ///
    /// Prefixes must be non-empty ASCII alphanumeric and at most
    /// [`OrderNumber::MAX_PREFIX_LEN`] characters.
    #[must_use]
    pub fn is_valid_prefix(prefix: &str) -> bool {
        !prefix.is_empty()
            && prefix.len() <= Self::MAX_PREFIX_LEN
            && prefix.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Generate a new order number stamped with the current time.
    #[must_use]
    pub fn generate(prefix: &str) -> Self {
        Self::generate_at(prefix, Utc::now(), &mut rand::rng())
    }

    /// Generate an order number for a given instant and random source.
    #[must_use]
    pub fn generate_at(prefix: &str, at: DateTime<Utc>, rng: &mut impl Rng) -> Self {
        let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| {
                let idx = rng.random_range(0..SUFFIX_ALPHABET.len());
                char::from(SUFFIX_ALPHABET.get(idx).copied().unwrap_or(b'X'))
            })
            .collect();

        Self(format!(
            "{}-{}-{suffix}",
            prefix.trim().to_uppercase(),
            to_base36(millis)
        ))
    }

    /// Wrap an order number received from a client or the database.
    ///
    /// Input is trimmed and uppercased so lookups are case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= 64
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| Self(trimmed.to_uppercase()))
    }

    /// Returns the order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Encode a number in uppercase base 36.
fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if value == 0 {
        return "0".to_owned();
    }

    let mut out = Vec::new();
    while value > 0 {
        #[allow(clippy::cast_possible_truncation)] // remainder is always < 36
        let digit = (value % 36) as usize;
        out.push(DIGITS.get(digit).copied().unwrap_or(b'0'));
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn test_format() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let number = OrderNumber::generate_at("ord", at, &mut rand::rng());
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.first().copied(), Some("ORD"));
        assert_eq!(parts.get(1).copied(), Some("LOYW3V28"));
        let suffix = parts.get(2).unwrap();
        assert_eq!(suffix.len(), 4);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        );
    }

    #[test]
    fn test_same_instant_numbers_differ() {
        let at = Utc::now();
        let mut rng = rand::rng();
        let numbers: HashSet<OrderNumber> = (0..200)
            .map(|_| OrderNumber::generate_at("ORD", at, &mut rng))
            .collect();
        // 36^4 suffixes; 200 draws collide with probability well under 2%
        assert!(numbers.len() >= 195);
    }

    #[test]
    fn test_parse_normalizes() {
        let parsed = OrderNumber::parse(" ord-abc-12xy ").unwrap();
        assert_eq!(parsed.as_str(), "ORD-ABC-12XY");
        assert!(OrderNumber::parse("").is_none());
        assert!(OrderNumber::parse("ORD/../x").is_none());
    }

    #[test]
    fn test_valid_prefixes_generate_parseable_numbers() {
        for prefix in ["ORD", "ps", "Shop2026"] {
            assert!(OrderNumber::is_valid_prefix(prefix));
            let number = OrderNumber::generate(prefix);
            assert_eq!(OrderNumber::parse(number.as_str()), Some(number));
        }
        assert!(!OrderNumber::is_valid_prefix(""));
        assert!(!OrderNumber::is_valid_prefix("PS SHOP"));
        assert!(!OrderNumber::is_valid_prefix("ÖRD"));
    }
}
