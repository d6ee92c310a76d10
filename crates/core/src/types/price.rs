//! Fixed-point GBP price.
//!
//! Every price in the system is a [`Price`]: a [`Decimal`] held at exactly two
//! fractional digits, the same shape as the `NUMERIC(8, 2)` catalog column.
//! Rounding uses banker's rounding so values read back from the database and
//! values computed in memory agree.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of fractional digits kept on every price.
pub const PRICE_SCALE: u32 = 2;

/// A price in pounds sterling, two fractional digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// The zero price. Also the sentinel for text that could not be parsed.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// The largest price the catalog column can hold, `999999.99`.
    pub const MAX: Self = Self(Decimal::from_parts(99_999_999, 0, 0, false, PRICE_SCALE));

    /// Create a price, rounding to two fractional digits.
    #[must_use]
    pub fn new(amount: Decimal) -> Self {
        let mut amount =
            amount.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointNearestEven);
        amount.rescale(PRICE_SCALE);
        Self(amount)
    }

    /// Create a price from a whole number of pence.
    #[must_use]
    pub fn from_pence(pence: i64) -> Self {
        Self(Decimal::new(pence, PRICE_SCALE))
    }

    /// The amount in pounds.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this is the zero price.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// This price multiplied by a line quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.0 * Decimal::from(quantity))
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.0 + rhs.0)
    }
}

impl AddAssign for Price {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "£{:.2}", self.0)
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
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value).map(Self::new)
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
    fn test_new_rounds_half_to_even() {
        assert_eq!(Price::new(Decimal::new(3_495, 3)), Price::from_pence(350));
        assert_eq!(Price::new(Decimal::new(3_485, 3)), Price::from_pence(348));
    }

    #[test]
    fn test_scale_is_always_two() {
        let price = Price::new(Decimal::from(2));
        assert_eq!(price.amount().scale(), 2);
        assert_eq!(price.to_string(), "£2.00");
    }

    #[test]
    fn test_times_and_sum() {
        let tea = Price::from_pence(100).times(2);
        let milk = Price::from_pence(300);
        assert_eq!(tea, Price::from_pence(200));
        assert_eq!([tea, milk].into_iter().sum::<Price>(), Price::from_pence(500));
    }

    #[test]
    fn test_max_fits_numeric_8_2() {
        assert_eq!(Price::MAX, Price::from_pence(99_999_999));
        assert_eq!(Price::MAX.to_string(), "£999999.99");
        assert!(Price::new(Decimal::from(1_000_000)) > Price::MAX);
    }

    #[test]
    fn test_empty_sum_is_zero() {
        let total: Price = core::iter::empty().sum();
        assert!(total.is_zero());
    }

    #[test]
    fn test_serializes_as_string_amount() {
        let json = serde_json::to_string(&Price::from_pence(349)).unwrap();
        assert_eq!(json, "\"3.49\"");
    }
}
