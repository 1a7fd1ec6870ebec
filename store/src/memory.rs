//! In-process store for running the exchange core without PostgreSQL.
//!
//! A swap unit takes the state lock when it begins and holds it until it is
//! committed or dropped, so swaps are fully serialized. Changes are made on a
//! working copy that replaces the shared state only on commit.

use crate::{ExchangeStore, StoreError, SwapUnit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{
    select_authoritative, ExchangeRate, NewSwapTransaction, SwapTransaction, User, Wallet,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<User>,
    wallets: Vec<Wallet>,
    rates: Vec<ExchangeRate>,
    /// Append order doubles as a tie-breaker for equal timestamps
    transactions: Vec<SwapTransaction>,
}

impl MemoryState {
    fn latest_rate(&self, from: &str, to: &str, at: DateTime<Utc>) -> Option<ExchangeRate> {
        select_authoritative(&self.rates, from, to, at).cloned()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, email: &str) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.email == email) {
            return Err(StoreError::ConstraintViolation(format!(
                "user {} already exists",
                email
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    pub async fn add_wallet(
        &self,
        user_id: Uuid,
        currency: &str,
        balance: Decimal,
    ) -> Result<Wallet, StoreError> {
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        if state
            .wallets
            .iter()
            .any(|w| w.user_id == user_id && w.currency == currency)
        {
            return Err(StoreError::ConstraintViolation(format!(
                "user {} already has a {} wallet",
                user_id, currency
            )));
        }
        if balance < Decimal::ZERO {
            return Err(StoreError::ConstraintViolation(
                "balance must not be negative".to_string(),
            ));
        }

        let wallet = Wallet {
            id: Uuid::new_v4(),
            user_id,
            currency: currency.to_string(),
            balance,
            updated_at: Utc::now(),
        };
        state.wallets.push(wallet.clone());
        Ok(wallet)
    }

    pub async fn add_rate(
        &self,
        from: &str,
        to: &str,
        rate: Decimal,
        spread: Decimal,
        valid_until: DateTime<Utc>,
    ) -> ExchangeRate {
        let rate = ExchangeRate {
            id: Uuid::new_v4(),
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate,
            spread,
            valid_until,
            created_at: Utc::now(),
        };
        self.state.lock().await.rates.push(rate.clone());
        rate
    }

    /// Append an already-built record, bypassing the swap path
    pub async fn add_transaction(&self, record: SwapTransaction) {
        self.state.lock().await.transactions.push(record);
    }

    pub async fn wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        let state = self.state.lock().await;
        state.wallets.iter().find(|w| w.id == wallet_id).cloned()
    }

    pub async fn transactions(&self) -> Vec<SwapTransaction> {
        self.state.lock().await.transactions.clone()
    }
}

#[async_trait]
impl ExchangeStore for MemoryStore {
    async fn latest_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        Ok(self.state.lock().await.latest_rate(from, to, at))
    }

    async fn user_transactions(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SwapTransaction>, StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&SwapTransaction> = state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .collect();
        // Stable sort keeps later appends first among equal timestamps.
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn begin_swap(&self) -> Result<Box<dyn SwapUnit>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemorySwapUnit { guard, working }))
    }
}

pub struct MemorySwapUnit {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl SwapUnit for MemorySwapUnit {
    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.iter().find(|u| u.email == email).cloned())
    }

    async fn wallets_for_update(&mut self, user_id: Uuid) -> Result<Vec<Wallet>, StoreError> {
        Ok(self
            .working
            .wallets
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn latest_rate(
        &mut self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        Ok(self.working.latest_rate(from, to, at))
    }

    async fn adjust_balance(
        &mut self,
        wallet_id: Uuid,
        delta: Decimal,
    ) -> Result<Wallet, StoreError> {
        let wallet = self
            .working
            .wallets
            .iter_mut()
            .find(|w| w.id == wallet_id)
            .ok_or_else(|| StoreError::NotFound(format!("wallet {}", wallet_id)))?;

        let balance = wallet
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::ConversionError("balance overflow".to_string()))?;
        if balance < Decimal::ZERO {
            return Err(StoreError::ConstraintViolation(format!(
                "wallet {} balance would become {}",
                wallet_id, balance
            )));
        }

        wallet.balance = balance;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn insert_transaction(
        &mut self,
        record: NewSwapTransaction,
    ) -> Result<SwapTransaction, StoreError> {
        let record = record.into_record(Uuid::new_v4(), Utc::now());
        self.working.transactions.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySwapUnit { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
