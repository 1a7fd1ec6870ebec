use chrono::Utc;
use common::{
    models::{
        normalize_currency, NewSwapTransaction, RateQuote, SwapAmounts, SwapHistory, SwapResult,
        SwapStatus,
    },
    Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use store::ExchangeStore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Largest page the history endpoint will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Quote resolution, swap execution and swap history over an injected store
pub struct ExchangeService {
    store: Arc<dyn ExchangeStore>,
    /// Fee fraction applied to every swap
    spread: Decimal,
}

impl ExchangeService {
    pub fn new(store: Arc<dyn ExchangeStore>, spread: Decimal) -> Self {
        Self { store, spread }
    }

    /// Current authoritative rate for `from -> to`
    #[instrument(skip(self))]
    pub async fn get_exchange_rate(&self, from: &str, to: &str) -> Result<RateQuote> {
        let from = normalize_currency(from)?;
        let to = normalize_currency(to)?;

        let rate = self
            .store
            .latest_rate(&from, &to, Utc::now())
            .await?
            .ok_or_else(|| Error::RateNotFound {
                from: from.clone(),
                to: to.clone(),
            })?;

        debug!(rate = %rate.rate, valid_until = %rate.valid_until, "Resolved rate");
        Ok(RateQuote::from(&rate))
    }

    /// Move `amount` out of the user's `from` wallet and the converted value,
    /// net of the fee, into their `to` wallet.
    #[instrument(skip(self, email))]
    pub async fn execute_swap(
        &self,
        email: &str,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<SwapResult> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::ValidationError("Email must not be empty".to_string()));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::ValidationError(
                "Amount must be greater than zero".to_string(),
            ));
        }
        let from = normalize_currency(from)?;
        let to = normalize_currency(to)?;

        // Any early return drops the unit, which discards its changes.
        let mut unit = self.store.begin_swap().await?;

        let user = unit
            .user_by_email(email)
            .await?
            .ok_or_else(|| Error::UserNotFound(email.to_string()))?;

        let wallets = unit.wallets_for_update(user.id).await?;
        let from_wallet = wallets
            .iter()
            .find(|w| w.currency == from)
            .ok_or_else(|| Error::WalletNotFound(format!("no {} wallet for {}", from, email)))?;
        let to_wallet = wallets
            .iter()
            .find(|w| w.currency == to)
            .ok_or_else(|| Error::WalletNotFound(format!("no {} wallet for {}", to, email)))?;

        if !from_wallet.can_cover(amount) {
            warn!(balance = %from_wallet.balance, "Swap rejected for insufficient funds");
            return Err(Error::InsufficientFunds {
                currency: from,
                available: from_wallet.balance,
                requested: amount,
            });
        }

        let rate = unit
            .latest_rate(&from, &to, Utc::now())
            .await?
            .ok_or_else(|| Error::RateNotFound {
                from: from.clone(),
                to: to.clone(),
            })?;

        let amounts = SwapAmounts::compute(amount, rate.rate, self.spread)?;

        unit.adjust_balance(from_wallet.id, -amount).await?;
        unit.adjust_balance(to_wallet.id, amounts.converted).await?;
        let record = unit
            .insert_transaction(NewSwapTransaction {
                user_id: user.id,
                from_wallet_id: from_wallet.id,
                to_wallet_id: to_wallet.id,
                from_amount: amount,
                to_amount: amounts.converted,
                rate: rate.rate,
                fee: amounts.fee,
                status: SwapStatus::Completed,
            })
            .await?;
        unit.commit().await?;

        info!(
            transaction_id = %record.id,
            from = %from,
            to = %to,
            to_amount = %record.to_amount,
            fee = %record.fee,
            "Swap completed"
        );

        Ok(SwapResult::from(&record))
    }

    /// One page of a user's swaps, newest first
    #[instrument(skip(self))]
    pub async fn get_user_swap_history(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<SwapHistory> {
        if page == 0 {
            return Err(Error::ValidationError("Page must be at least 1".to_string()));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(Error::ValidationError(format!(
                "Limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        let offset = u64::from(page - 1) * u64::from(limit);
        let transactions = self
            .store
            .user_transactions(user_id, offset, u64::from(limit))
            .await?;

        debug!(count = transactions.len(), "Loaded swap history");
        Ok(SwapHistory {
            page,
            limit,
            transactions,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use common::models::{ExchangeRate, SwapTransaction, User, Wallet};
    use rust_decimal_macros::dec;
    use store::{MemoryStore, StoreError, SwapUnit};

    pub(crate) struct Fixture {
        pub store: MemoryStore,
        pub user: User,
        pub ngn: Wallet,
        pub usd: Wallet,
    }

    /// alice@example.com with 500000 NGN and 1000 USD, NGN->USD at 0.0012
    pub(crate) async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let user = store.add_user("alice@example.com").await.unwrap();
        let ngn = store.add_wallet(user.id, "NGN", dec!(500000)).await.unwrap();
        let usd = store.add_wallet(user.id, "USD", dec!(1000)).await.unwrap();
        store
            .add_rate(
                "NGN",
                "USD",
                dec!(0.0012),
                dec!(0.0125),
                Utc::now() + Duration::seconds(30),
            )
            .await;
        Fixture {
            store,
            user,
            ngn,
            usd,
        }
    }

    fn service(store: &MemoryStore) -> ExchangeService {
        ExchangeService::new(Arc::new(store.clone()), dec!(0.0125))
    }

    async fn balance(store: &MemoryStore, wallet: &Wallet) -> Decimal {
        store.wallet(wallet.id).await.unwrap().balance
    }

    #[tokio::test]
    async fn test_quote_returns_latest_valid_rate() {
        let f = fixture().await;
        f.store
            .add_rate(
                "NGN",
                "USD",
                dec!(0.0013),
                dec!(0.01),
                Utc::now() + Duration::seconds(90),
            )
            .await;
        f.store
            .add_rate(
                "NGN",
                "USD",
                dec!(0.0099),
                dec!(0.01),
                Utc::now() - Duration::seconds(1),
            )
            .await;

        let quote = service(&f.store)
            .get_exchange_rate("ngn", "usd")
            .await
            .unwrap();
        assert_eq!(quote.from_currency, "NGN");
        assert_eq!(quote.to_currency, "USD");
        assert_eq!(quote.rate, dec!(0.0013));
        assert_eq!(quote.spread, dec!(0.01));
    }

    #[tokio::test]
    async fn test_quote_without_rate_fails() {
        let f = fixture().await;
        let svc = service(&f.store);

        let inverse = svc.get_exchange_rate("USD", "NGN").await;
        assert!(matches!(inverse, Err(Error::RateNotFound { .. })));

        let same = svc.get_exchange_rate("USD", "USD").await;
        assert!(matches!(same, Err(Error::RateNotFound { .. })));
    }

    #[tokio::test]
    async fn test_swap_moves_fee_adjusted_value() {
        let f = fixture().await;

        let result = service(&f.store)
            .execute_swap("alice@example.com", "NGN", "USD", dec!(100000))
            .await
            .unwrap();

        assert_eq!(result.from_amount, dec!(100000));
        assert_eq!(result.fee, dec!(1250));
        assert_eq!(result.to_amount, dec!(118.5));
        assert_eq!(result.rate, dec!(0.0012));
        assert_eq!(result.status, SwapStatus::Completed);

        assert_eq!(balance(&f.store, &f.ngn).await, dec!(400000));
        assert_eq!(balance(&f.store, &f.usd).await, dec!(1118.5));

        let log = f.store.transactions().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, result.transaction_id);
        assert_eq!(log[0].user_id, f.user.id);
        assert_eq!(log[0].from_wallet_id, f.ngn.id);
        assert_eq!(log[0].to_wallet_id, f.usd.id);
    }

    #[tokio::test]
    async fn test_swap_uses_service_spread_not_rate_spread() {
        let f = fixture().await;
        let svc = ExchangeService::new(Arc::new(f.store.clone()), dec!(0.02));

        let result = svc
            .execute_swap("alice@example.com", "NGN", "USD", dec!(1000))
            .await
            .unwrap();
        assert_eq!(result.fee, dec!(20));
        assert_eq!(result.to_amount, dec!(1.176));
    }

    #[tokio::test]
    async fn test_swap_errors_leave_state_unchanged() {
        let f = fixture().await;
        let svc = service(&f.store);

        let cases = [
            ("nobody@example.com", "NGN", "USD", dec!(10)),
            ("alice@example.com", "NGN", "EUR", dec!(10)),
            ("alice@example.com", "USD", "NGN", dec!(10)),
            ("alice@example.com", "NGN", "USD", dec!(500000.01)),
        ];
        let results = [
            svc.execute_swap(cases[0].0, cases[0].1, cases[0].2, cases[0].3).await,
            svc.execute_swap(cases[1].0, cases[1].1, cases[1].2, cases[1].3).await,
            svc.execute_swap(cases[2].0, cases[2].1, cases[2].2, cases[2].3).await,
            svc.execute_swap(cases[3].0, cases[3].1, cases[3].2, cases[3].3).await,
        ];

        assert!(matches!(results[0], Err(Error::UserNotFound(_))));
        assert!(matches!(results[1], Err(Error::WalletNotFound(_))));
        assert!(matches!(results[2], Err(Error::RateNotFound { .. })));
        assert!(matches!(results[3], Err(Error::InsufficientFunds { .. })));

        assert_eq!(balance(&f.store, &f.ngn).await, dec!(500000));
        assert_eq!(balance(&f.store, &f.usd).await, dec!(1000));
        assert!(f.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_swap_rejects_invalid_input() {
        let f = fixture().await;
        let svc = service(&f.store);

        for (email, from, to, amount) in [
            ("alice@example.com", "NGN", "USD", dec!(0)),
            ("alice@example.com", "NGN", "USD", dec!(-5)),
            ("  ", "NGN", "USD", dec!(5)),
            ("alice@example.com", "", "USD", dec!(5)),
        ] {
            let result = svc.execute_swap(email, from, to, amount).await;
            assert!(
                matches!(result, Err(Error::ValidationError(_))),
                "expected validation error for {:?}",
                (email, from, to, amount)
            );
        }
    }

    #[tokio::test]
    async fn test_same_currency_swap_follows_rate_table() {
        let f = fixture().await;
        let svc = service(&f.store);

        let missing = svc
            .execute_swap("alice@example.com", "USD", "usd", dec!(10))
            .await;
        assert!(matches!(missing, Err(Error::RateNotFound { .. })));
        assert_eq!(balance(&f.store, &f.usd).await, dec!(1000));

        f.store
            .add_rate(
                "USD",
                "USD",
                dec!(1),
                dec!(0),
                Utc::now() + Duration::seconds(30),
            )
            .await;
        let quote = svc.get_exchange_rate("USD", "USD").await.unwrap();
        assert_eq!(quote.rate, dec!(1));

        let result = svc
            .execute_swap("alice@example.com", "USD", "USD", dec!(10))
            .await
            .unwrap();
        assert_eq!(result.fee, dec!(0.125));
        assert_eq!(result.to_amount, dec!(9.875));

        // Debit and credit land on the same wallet; only the fee leaves it.
        assert_eq!(balance(&f.store, &f.usd).await, dec!(999.875));
        let log = f.store.transactions().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from_wallet_id, f.usd.id);
        assert_eq!(log[0].to_wallet_id, f.usd.id);
    }

    /// Collects the field names of every `execute_swap` span
    struct SwapSpanFields(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SwapSpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if attrs.metadata().name() == "execute_swap" {
                let mut names = self.0.lock().unwrap();
                names.extend(
                    attrs
                        .metadata()
                        .fields()
                        .iter()
                        .map(|field| field.name().to_string()),
                );
            }
        }
    }

    #[tokio::test]
    async fn test_swap_span_omits_email() {
        use tracing_subscriber::layer::SubscriberExt;

        let names = Arc::new(std::sync::Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(SwapSpanFields(names.clone()));
        let _guard = tracing::subscriber::set_default(subscriber);

        let f = fixture().await;
        service(&f.store)
            .execute_swap("alice@example.com", "NGN", "USD", dec!(1000))
            .await
            .unwrap();

        let names = names.lock().unwrap().clone();
        assert!(names.contains(&"amount".to_string()));
        assert!(names.contains(&"from".to_string()));
        assert!(!names.contains(&"email".to_string()));
    }

    #[tokio::test]
    async fn test_expired_rate_aborts_swap() {
        let store = MemoryStore::new();
        let user = store.add_user("bob@example.com").await.unwrap();
        let ngn = store.add_wallet(user.id, "NGN", dec!(250000)).await.unwrap();
        store.add_wallet(user.id, "USD", dec!(500)).await.unwrap();
        store
            .add_rate(
                "NGN",
                "USD",
                dec!(0.0012),
                dec!(0.0125),
                Utc::now() - Duration::seconds(1),
            )
            .await;

        let result = service(&store)
            .execute_swap("bob@example.com", "NGN", "USD", dec!(1000))
            .await;
        assert!(matches!(result, Err(Error::RateNotFound { .. })));
        assert_eq!(balance(&store, &ngn).await, dec!(250000));
    }

    #[tokio::test]
    async fn test_repeated_swaps_never_overdraw() {
        let f = fixture().await;
        let svc = service(&f.store);

        let mut completed = 0;
        for _ in 0..7 {
            match svc
                .execute_swap("alice@example.com", "NGN", "USD", dec!(80000))
                .await
            {
                Ok(_) => completed += 1,
                Err(Error::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(completed, 6);
        assert_eq!(balance(&f.store, &f.ngn).await, dec!(20000));
        assert_eq!(f.store.transactions().await.len(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_swaps_serialize() {
        let f = fixture().await;
        let svc = Arc::new(service(&f.store));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.execute_swap("alice@example.com", "NGN", "USD", dec!(30000))
                        .await
                })
            })
            .collect();

        let mut completed = 0u32;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                completed += 1;
            }
        }

        // 500000 / 30000 = 16 whole swaps
        assert_eq!(completed, 16);
        assert_eq!(balance(&f.store, &f.ngn).await, dec!(20000));
        assert_eq!(
            balance(&f.store, &f.usd).await,
            dec!(1000) + dec!(35.55) * Decimal::from(completed)
        );
    }

    /// Store whose units fail when recording the transaction
    struct FailingLog {
        inner: MemoryStore,
    }

    struct FailingLogUnit {
        inner: Box<dyn SwapUnit>,
    }

    #[async_trait]
    impl ExchangeStore for FailingLog {
        async fn latest_rate(
            &self,
            from: &str,
            to: &str,
            at: DateTime<Utc>,
        ) -> std::result::Result<Option<ExchangeRate>, StoreError> {
            self.inner.latest_rate(from, to, at).await
        }

        async fn user_transactions(
            &self,
            user_id: Uuid,
            offset: u64,
            limit: u64,
        ) -> std::result::Result<Vec<SwapTransaction>, StoreError> {
            self.inner.user_transactions(user_id, offset, limit).await
        }

        async fn begin_swap(&self) -> std::result::Result<Box<dyn SwapUnit>, StoreError> {
            Ok(Box::new(FailingLogUnit {
                inner: self.inner.begin_swap().await?,
            }))
        }
    }

    #[async_trait]
    impl SwapUnit for FailingLogUnit {
        async fn user_by_email(
            &mut self,
            email: &str,
        ) -> std::result::Result<Option<User>, StoreError> {
            self.inner.user_by_email(email).await
        }

        async fn wallets_for_update(
            &mut self,
            user_id: Uuid,
        ) -> std::result::Result<Vec<Wallet>, StoreError> {
            self.inner.wallets_for_update(user_id).await
        }

        async fn latest_rate(
            &mut self,
            from: &str,
            to: &str,
            at: DateTime<Utc>,
        ) -> std::result::Result<Option<ExchangeRate>, StoreError> {
            self.inner.latest_rate(from, to, at).await
        }

        async fn adjust_balance(
            &mut self,
            wallet_id: Uuid,
            delta: Decimal,
        ) -> std::result::Result<Wallet, StoreError> {
            self.inner.adjust_balance(wallet_id, delta).await
        }

        async fn insert_transaction(
            &mut self,
            _record: NewSwapTransaction,
        ) -> std::result::Result<SwapTransaction, StoreError> {
            Err(StoreError::QueryError("swap log unavailable".to_string()))
        }

        async fn commit(self: Box<Self>) -> std::result::Result<(), StoreError> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn test_failed_record_rolls_back_balances() {
        let f = fixture().await;
        let svc = ExchangeService::new(
            Arc::new(FailingLog {
                inner: f.store.clone(),
            }),
            dec!(0.0125),
        );

        let result = svc
            .execute_swap("alice@example.com", "NGN", "USD", dec!(100000))
            .await;
        assert!(matches!(result, Err(Error::DbError(_))));

        assert_eq!(balance(&f.store, &f.ngn).await, dec!(500000));
        assert_eq!(balance(&f.store, &f.usd).await, dec!(1000));
        assert!(f.store.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let f = fixture().await;
        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..25 {
            let record = NewSwapTransaction {
                user_id: f.user.id,
                from_wallet_id: f.ngn.id,
                to_wallet_id: f.usd.id,
                from_amount: dec!(1000),
                to_amount: dec!(1.185),
                rate: dec!(0.0012),
                fee: dec!(12.5),
                status: SwapStatus::Completed,
            }
            .into_record(Uuid::new_v4(), base + Duration::seconds(i));
            ids.push(record.id);
            f.store.add_transaction(record).await;
        }
        // Newest first: rank 1 is the last one inserted.
        ids.reverse();

        let history = service(&f.store)
            .get_user_swap_history(f.user.id, 2, 10)
            .await
            .unwrap();
        assert_eq!(history.page, 2);
        assert_eq!(history.limit, 10);
        let got: Vec<Uuid> = history.transactions.iter().map(|t| t.id).collect();
        assert_eq!(got, ids[10..20].to_vec());

        let last = service(&f.store)
            .get_user_swap_history(f.user.id, 3, 10)
            .await
            .unwrap();
        assert_eq!(last.transactions.len(), 5);
    }

    #[tokio::test]
    async fn test_history_bounds() {
        let f = fixture().await;
        let svc = service(&f.store);

        assert!(matches!(
            svc.get_user_swap_history(f.user.id, 0, 10).await,
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            svc.get_user_swap_history(f.user.id, 1, 0).await,
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            svc.get_user_swap_history(f.user.id, 1, MAX_PAGE_SIZE + 1).await,
            Err(Error::ValidationError(_))
        ));

        let unknown = svc
            .get_user_swap_history(Uuid::new_v4(), 1, MAX_PAGE_SIZE)
            .await
            .unwrap();
        assert!(unknown.transactions.is_empty());
    }
}
