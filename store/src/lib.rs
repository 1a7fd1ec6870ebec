mod config;
mod error;
mod exchange_store;
pub mod memory;
mod pg_store;
pub mod seed;

pub use config::StoreConfig;
pub use error::StoreError;
pub use exchange_store::{ExchangeStore, SwapUnit};
pub use memory::MemoryStore;
pub use pg_store::PgStore;
