use crate::{ExchangeStore, StoreConfig, StoreError, SwapUnit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{ExchangeRate, NewSwapTransaction, SwapStatus, SwapTransaction, User, Wallet};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

const WALLET_COLUMNS: &str = "id, user_id, currency, balance, updated_at";
const RATE_COLUMNS: &str = "id, from_currency, to_currency, rate, spread, valid_until, created_at";
const SWAP_COLUMNS: &str =
    "id, user_id, from_wallet_id, to_wallet_id, from_amount, to_amount, rate, fee, status, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    currency: String,
    balance: Decimal,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            user_id: row.user_id,
            currency: row.currency,
            balance: row.balance,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    from_currency: String,
    to_currency: String,
    rate: Decimal,
    spread: Decimal,
    valid_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<RateRow> for ExchangeRate {
    fn from(row: RateRow) -> Self {
        ExchangeRate {
            id: row.id,
            from_currency: row.from_currency,
            to_currency: row.to_currency,
            rate: row.rate,
            spread: row.spread,
            valid_until: row.valid_until,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SwapRow {
    id: Uuid,
    user_id: Uuid,
    from_wallet_id: Uuid,
    to_wallet_id: Uuid,
    from_amount: Decimal,
    to_amount: Decimal,
    rate: Decimal,
    fee: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SwapRow> for SwapTransaction {
    type Error = StoreError;

    fn try_from(row: SwapRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SwapStatus>()
            .map_err(|e| StoreError::ConversionError(e.to_string()))?;

        Ok(SwapTransaction {
            id: row.id,
            user_id: row.user_id,
            from_wallet_id: row.from_wallet_id,
            to_wallet_id: row.to_wallet_id,
            from_amount: row.from_amount,
            to_amount: row.to_amount,
            rate: row.rate,
            fee: row.fee,
            status,
            created_at: row.created_at,
        })
    }
}

fn latest_rate_query() -> String {
    format!(
        "SELECT {} FROM exchange_rates \
         WHERE from_currency = $1 AND to_currency = $2 AND valid_until >= $3 \
         ORDER BY valid_until DESC LIMIT 1",
        RATE_COLUMNS
    )
}

fn to_i64(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::ConversionError(format!("{} out of range", what)))
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ExchangeStore for PgStore {
    async fn latest_rate(
        &self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        debug!(from, to, "Querying latest valid rate");

        let row = sqlx::query_as::<_, RateRow>(&latest_rate_query())
            .bind(from)
            .bind(to)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ExchangeRate::from))
    }

    async fn user_transactions(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SwapTransaction>, StoreError> {
        let query = format!(
            "SELECT {} FROM swap_transactions WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3",
            SWAP_COLUMNS
        );

        let rows = sqlx::query_as::<_, SwapRow>(&query)
            .bind(user_id)
            .bind(to_i64(offset, "offset")?)
            .bind(to_i64(limit, "limit")?)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(SwapTransaction::try_from).collect()
    }

    async fn begin_swap(&self) -> Result<Box<dyn SwapUnit>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSwapUnit { tx }))
    }
}

/// A swap running inside one PostgreSQL transaction
pub struct PgSwapUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SwapUnit for PgSwapUnit {
    async fn user_by_email(&mut self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(User::from))
    }

    async fn wallets_for_update(&mut self, user_id: Uuid) -> Result<Vec<Wallet>, StoreError> {
        // Lock in id order so two swaps over the same wallets cannot deadlock.
        let query = format!(
            "SELECT {} FROM wallets WHERE user_id = $1 ORDER BY id FOR UPDATE",
            WALLET_COLUMNS
        );

        let rows = sqlx::query_as::<_, WalletRow>(&query)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.into_iter().map(Wallet::from).collect())
    }

    async fn latest_rate(
        &mut self,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ExchangeRate>, StoreError> {
        let row = sqlx::query_as::<_, RateRow>(&latest_rate_query())
            .bind(from)
            .bind(to)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(ExchangeRate::from))
    }

    async fn adjust_balance(
        &mut self,
        wallet_id: Uuid,
        delta: Decimal,
    ) -> Result<Wallet, StoreError> {
        let query = format!(
            "UPDATE wallets SET balance = balance + $2, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            WALLET_COLUMNS
        );

        let row = sqlx::query_as::<_, WalletRow>(&query)
            .bind(wallet_id)
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("wallet {}", wallet_id)))?;

        Ok(Wallet::from(row))
    }

    async fn insert_transaction(
        &mut self,
        record: NewSwapTransaction,
    ) -> Result<SwapTransaction, StoreError> {
        let query = format!(
            "INSERT INTO swap_transactions \
             (id, user_id, from_wallet_id, to_wallet_id, from_amount, to_amount, rate, fee, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            SWAP_COLUMNS
        );

        let row = sqlx::query_as::<_, SwapRow>(&query)
            .bind(Uuid::new_v4())
            .bind(record.user_id)
            .bind(record.from_wallet_id)
            .bind(record.to_wallet_id)
            .bind(record.from_amount)
            .bind(record.to_amount)
            .bind(record.rate)
            .bind(record.fee)
            .bind(record.status.to_string())
            .fetch_one(&mut *self.tx)
            .await?;

        SwapTransaction::try_from(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
