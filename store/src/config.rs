use crate::StoreError;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Configuration for the PostgreSQL store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl StoreConfig {
    /// Create a new store configuration from environment variables
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                StoreError::ConfigError("DATABASE_URL environment variable not set".to_string())
            })?;

        let max_connections = match var("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                StoreError::ConfigError(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", raw))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}
