use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No valid exchange rate found for {from}/{to}")]
    RateNotFound { from: String, to: String },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Insufficient funds: {currency} balance {available} is less than {requested}")]
    InsufficientFunds {
        currency: String,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DbError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Domain errors are caused by the request itself, the rest by the service.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::RateNotFound { .. }
                | Error::UserNotFound(_)
                | Error::WalletNotFound(_)
                | Error::InsufficientFunds { .. }
                | Error::ValidationError(_)
        )
    }
}
