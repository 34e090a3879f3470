//! Environment-driven configuration.

use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    /// Upper bound on a whole order-creation call; past it the caller gets a
    /// `Timeout` instead of a hung request.
    pub checkout_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().context("PORT must be a port number")?,
            Err(_) => 8083,
        };
        let nats_url = std::env::var("NATS_URL").ok();
        let checkout_timeout = match std::env::var("CHECKOUT_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(
                raw.parse()
                    .context("CHECKOUT_TIMEOUT_SECS must be a number of seconds")?,
            ),
            Err(_) => Duration::from_secs(10),
        };
        Ok(Self {
            database_url,
            port,
            nats_url,
            checkout_timeout,
        })
    }
}
