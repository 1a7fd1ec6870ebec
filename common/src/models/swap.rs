use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a swap record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SwapStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapStatus::Pending => write!(f, "pending"),
            SwapStatus::Completed => write!(f, "completed"),
            SwapStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SwapStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SwapStatus::Pending),
            "completed" => Ok(SwapStatus::Completed),
            "failed" => Ok(SwapStatus::Failed),
            other => Err(Error::InternalError(format!(
                "Unknown swap status: {}",
                other
            ))),
        }
    }
}

/// Fee and converted amount for a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapAmounts {
    /// Taken in the source currency: `amount * spread`
    pub fee: Decimal,
    /// Credited in the destination currency: `(amount - fee) * rate`
    pub converted: Decimal,
}

impl SwapAmounts {
    pub fn compute(amount: Decimal, rate: Decimal, spread: Decimal) -> Result<Self> {
        let overflow = || Error::ValidationError("Amount is too large to convert".to_string());

        let fee = amount.checked_mul(spread).ok_or_else(overflow)?;
        let converted = amount
            .checked_sub(fee)
            .and_then(|net| net.checked_mul(rate))
            .ok_or_else(overflow)?;

        Ok(Self { fee, converted })
    }
}

/// Persisted swap record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    /// Debited from the source wallet
    pub from_amount: Decimal,
    /// Credited to the destination wallet
    pub to_amount: Decimal,
    pub rate: Decimal,
    pub fee: Decimal,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
}

/// Swap record before the store assigns its id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSwapTransaction {
    pub user_id: Uuid,
    pub from_wallet_id: Uuid,
    pub to_wallet_id: Uuid,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub rate: Decimal,
    pub fee: Decimal,
    pub status: SwapStatus,
}

impl NewSwapTransaction {
    pub fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> SwapTransaction {
        SwapTransaction {
            id,
            user_id: self.user_id,
            from_wallet_id: self.from_wallet_id,
            to_wallet_id: self.to_wallet_id,
            from_amount: self.from_amount,
            to_amount: self.to_amount,
            rate: self.rate,
            fee: self.fee,
            status: self.status,
            created_at,
        }
    }
}

/// Outcome of a swap as returned to API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapResult {
    pub transaction_id: Uuid,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub rate: Decimal,
    pub fee: Decimal,
    pub status: SwapStatus,
}

impl From<&SwapTransaction> for SwapResult {
    fn from(tx: &SwapTransaction) -> Self {
        Self {
            transaction_id: tx.id,
            from_amount: tx.from_amount,
            to_amount: tx.to_amount,
            rate: tx.rate,
            fee: tx.fee,
            status: tx.status,
        }
    }
}

/// One page of a user's swaps, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapHistory {
    pub page: u32,
    pub limit: u32,
    pub transactions: Vec<SwapTransaction>,
}
