mod rate;
mod swap;
mod wallet;

pub use rate::{select_authoritative, ExchangeRate, RateQuote};
pub use swap::{
    NewSwapTransaction, SwapAmounts, SwapHistory, SwapResult, SwapStatus, SwapTransaction,
};
pub use wallet::{normalize_currency, User, Wallet};
