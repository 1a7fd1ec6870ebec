use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{ExchangeRate, NewSwapTransaction, SwapTransaction, User, Wallet};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Persistence seam for rates, wallets and the swap log
#[async_trait]
pub trait ExchangeStore: Send + Sync {
    /// Latest-expiring rate for the exact pair that is still valid at `at`
    async fn latest_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError>;

    /// A user's swaps ordered by creation time, newest first
    async fn user_transactions(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SwapTransaction>, StoreError>;

    /// Open a unit of work for one swap
    async fn begin_swap(&self) -> Result<Box<dyn SwapUnit>, StoreError>;
}

/// Reads and writes of a single swap, applied all together on `commit`.
///
/// Dropping a unit without committing discards every change made through it.
#[async_trait]
pub trait SwapUnit: Send {
    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError>;

    /// The user's wallets, locked against concurrent swaps until the unit ends
    async fn wallets_for_update(&mut self, user_id: Uuid) -> Result<Vec<Wallet>, StoreError>;

    async fn latest_rate(
        &mut self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError>;

    /// Add `delta` (negative to debit) to a wallet balance. Fails with
    /// `ConstraintViolation` if the balance would go negative.
    async fn adjust_balance(&mut self, wallet_id: Uuid, delta: Decimal)
        -> Result<Wallet, StoreError>;

    async fn insert_transaction(
        &mut self,
        record: NewSwapTransaction,
    ) -> Result<SwapTransaction, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
