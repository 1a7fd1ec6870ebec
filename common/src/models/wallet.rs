use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account holder, identified externally by email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Unique identity key (e.g., "alice@example.com")
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Per-user, per-currency balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// ISO-style currency code (e.g., "NGN", "USD")
    pub currency: String,
    /// Current balance, never negative
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

/// Trim and upper-case a currency code, rejecting empty ones.
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(Error::ValidationError(
            "Currency code must not be empty".to_string(),
        ));
    }
    Ok(code.to_uppercase())
}
