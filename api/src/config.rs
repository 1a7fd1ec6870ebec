use common::{Error, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Fee fraction charged on every swap
    pub spread: Decimal,
}

/// 1.25%
pub fn default_spread() -> Decimal {
    Decimal::new(125, 4)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            spread: default_spread(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = var("HOST").unwrap_or(defaults.host);
        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| Error::ConfigError(format!("Invalid PORT: {}", raw)))?,
            None => defaults.port,
        };
        let spread = match var("SWAP_SPREAD") {
            Some(raw) => {
                let spread = Decimal::from_str(raw.trim())
                    .map_err(|_| Error::ConfigError(format!("Invalid SWAP_SPREAD: {}", raw)))?;
                if spread < Decimal::ZERO || spread >= Decimal::ONE {
                    return Err(Error::ConfigError(format!(
                        "SWAP_SPREAD must be in [0, 1), got {}",
                        spread
                    )));
                }
                spread
            }
            None => defaults.spread,
        };

        Ok(Self { host, port, spread })
    }
}
