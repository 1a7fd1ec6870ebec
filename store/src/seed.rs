//! Demo data for local development.

use crate::{PgStore, StoreError};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

/// How long seeded rates stay valid
pub const SEED_RATE_VALIDITY_SECS: i64 = 30;

struct SeedWallet {
    currency: &'static str,
    balance: Decimal,
}

struct SeedUser {
    email: &'static str,
    wallets: [SeedWallet; 2],
}

struct SeedRate {
    from: &'static str,
    to: &'static str,
    rate: Decimal,
    spread: Decimal,
}

fn seed_users() -> [SeedUser; 2] {
    [
        SeedUser {
            email: "alice@example.com",
            wallets: [
                SeedWallet {
                    currency: "NGN",
                    balance: Decimal::new(500_000, 0),
                },
                SeedWallet {
                    currency: "USD",
                    balance: Decimal::new(1_000, 0),
                },
            ],
        },
        SeedUser {
            email: "bob@example.com",
            wallets: [
                SeedWallet {
                    currency: "NGN",
                    balance: Decimal::new(250_000, 0),
                },
                SeedWallet {
                    currency: "USD",
                    balance: Decimal::new(500, 0),
                },
            ],
        },
    ]
}

fn seed_rates() -> [SeedRate; 2] {
    [
        SeedRate {
            from: "NGN",
            to: "USD",
            rate: Decimal::new(12, 4),
            spread: Decimal::new(125, 4),
        },
        SeedRate {
            from: "USD",
            to: "NGN",
            rate: Decimal::new(83_333, 2),
            spread: Decimal::new(125, 4),
        },
    ]
}

#[derive(Debug, Default)]
pub struct SeedSummary {
    pub users: usize,
    pub wallets_created: usize,
    pub rates: usize,
}

/// Insert the demo users, wallets and rates.
///
/// Users and wallets that already exist are left untouched; rates are always
/// appended with a fresh validity window.
pub async fn seed_demo_data(store: &PgStore) -> Result<SeedSummary, StoreError> {
    let mut tx = store.pool().begin().await?;
    let mut summary = SeedSummary::default();

    for user in seed_users() {
        let (user_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO users (id, email) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(user.email)
        .fetch_one(&mut *tx)
        .await?;
        summary.users += 1;

        for wallet in user.wallets {
            let result = sqlx::query(
                "INSERT INTO wallets (id, user_id, currency, balance) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (user_id, currency) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(wallet.currency)
            .bind(wallet.balance)
            .execute(&mut *tx)
            .await?;
            summary.wallets_created += result.rows_affected() as usize;
        }
    }

    let valid_until = Utc::now() + Duration::seconds(SEED_RATE_VALIDITY_SECS);
    for rate in seed_rates() {
        sqlx::query(
            "INSERT INTO exchange_rates (id, from_currency, to_currency, rate, spread, valid_until) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(rate.from)
        .bind(rate.to)
        .bind(rate.rate)
        .bind(rate.spread)
        .bind(valid_until)
        .execute(&mut *tx)
        .await?;
        summary.rates += 1;
    }

    tx.commit().await?;

    info!(
        users = summary.users,
        wallets_created = summary.wallets_created,
        rates = summary.rates,
        %valid_until,
        "Seed data created"
    );

    Ok(summary)
}
