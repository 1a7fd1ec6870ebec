use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored exchange rate for one direction of a currency pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRate {
    pub id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    /// Units of `to_currency` per unit of `from_currency`
    pub rate: Decimal,
    /// Fractional fee rate quoted alongside the rate
    pub spread: Decimal,
    /// Last instant at which this rate may be used
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ExchangeRate {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.valid_until >= at
    }

    pub fn matches(&self, from: &str, to: &str) -> bool {
        self.from_currency == from && self.to_currency == to
    }
}

/// Rate as returned to API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateQuote {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: Decimal,
    pub spread: Decimal,
    pub valid_until: DateTime<Utc>,
}

impl From<&ExchangeRate> for RateQuote {
    fn from(rate: &ExchangeRate) -> Self {
        Self {
            from_currency: rate.from_currency.clone(),
            to_currency: rate.to_currency.clone(),
            rate: rate.rate,
            spread: rate.spread,
            valid_until: rate.valid_until,
        }
    }
}

/// Pick the authoritative rate for `from -> to` at `at`: the still-valid row
/// with the latest expiry. The inverse pair is never considered.
pub fn select_authoritative<'a, I>(
    rates: I,
    from: &str,
    to: &str,
    at: DateTime<Utc>,
) -> Option<&'a ExchangeRate>
where
    I: IntoIterator<Item = &'a ExchangeRate>,
{
    rates
        .into_iter()
        .filter(|r| r.matches(from, to) && r.is_valid_at(at))
        .max_by_key(|r| r.valid_until)
}
