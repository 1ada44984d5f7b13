use crate::error::{StoreError, StoreResult};
use crate::expiry::ExpiryConfig;
use crate::schema::{Namespace, DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_MESSAGE_TTL};
use db_pool::env_utils::{parse_env_optional, parse_env_required, parse_env_with_default};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub namespace: Namespace,
    /// Expiry window written into the TTL index
    pub message_ttl: Duration,
    pub expiry: ExpiryConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("namespace", &self.namespace)
            .field("message_ttl", &self.message_ttl)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> StoreResult<Self> {
        dotenv().ok();

        let database_url: String =
            parse_env_required("DATABASE_URL").map_err(StoreError::Config)?;
        let (namespace, message_ttl) = Self::layout_from_env()?;

        let defaults = ExpiryConfig::default();
        let expiry = ExpiryConfig {
            sweep_interval: Duration::from_secs(
                parse_env_with_default(
                    "EXPIRY_SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval.as_secs(),
                )
                .max(1),
            ),
            batch_size: parse_env_with_default("EXPIRY_BATCH_SIZE", defaults.batch_size).max(1),
        };

        Ok(Self {
            database_url,
            namespace,
            message_ttl,
            expiry,
        })
    }

    /// Namespace and TTL window only; enough to render DDL without a database
    pub fn layout_from_env() -> StoreResult<(Namespace, Duration)> {
        dotenv().ok();

        let database =
            env::var("MESSAGE_STORE_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.into());
        let collection =
            env::var("MESSAGE_STORE_COLLECTION").unwrap_or_else(|_| DEFAULT_COLLECTION.into());
        let namespace = Namespace::new(database.trim(), collection.trim())?;

        let message_ttl = match parse_env_optional::<u64>("MESSAGE_TTL_SECONDS") {
            Some(0) => {
                return Err(StoreError::Config(
                    "MESSAGE_TTL_SECONDS must be greater than zero".into(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_MESSAGE_TTL,
        };

        Ok((namespace, message_ttl))
    }
}
