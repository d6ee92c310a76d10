//! Supermarket retailers the catalog is scraped from.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A supermarket retailer.
///
/// Stored as its display name (`"Tesco"`, `"Asda"`, ...) in the `store`
/// column, which is also how it appears in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Store {
    Tesco,
    Asda,
    Sainsburys,
    Morrisons,
}

impl Store {
    /// Every supported retailer, in listing order.
    pub const ALL: [Self; 4] = [Self::Tesco, Self::Asda, Self::Sainsburys, Self::Morrisons];

    /// The stored display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tesco => "Tesco",
            Self::Asda => "Asda",
            Self::Sainsburys => "Sainsburys",
            Self::Morrisons => "Morrisons",
        }
    }

    /// Upper-case key used for per-retailer environment overrides.
    #[must_use]
    pub const fn env_key(&self) -> &'static str {
        match self {
            Self::Tesco => "TESCO",
            Self::Asda => "ASDA",
            Self::Sainsburys => "SAINSBURYS",
            Self::Morrisons => "MORRISONS",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known retailer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown store: {0:?}")]
pub struct StoreParseError(pub String);

impl FromStr for Store {
    type Err = StoreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|store| store.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| StoreParseError(trimmed.to_owned()))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Store {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Store {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Store {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!("tesco".parse::<Store>().unwrap(), Store::Tesco);
        assert_eq!(" SAINSBURYS ".parse::<Store>().unwrap(), Store::Sainsburys);
        assert_eq!("Morrisons".parse::<Store>().unwrap(), Store::Morrisons);
    }

    #[test]
    fn test_parse_unknown_store() {
        let err = "Waitrose".parse::<Store>().unwrap_err();
        assert_eq!(err, StoreParseError("Waitrose".to_owned()));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for store in Store::ALL {
            assert_eq!(store.to_string().parse::<Store>().unwrap(), store);
        }
    }

    #[test]
    fn test_serializes_as_display_name() {
        assert_eq!(serde_json::to_string(&Store::Asda).unwrap(), "\"Asda\"");
    }
}
