//! Database settings loaded from TOML and the environment.

use crate::error::DbError;
use crate::middleware::TxConfig;
use crate::transaction::{IsolationLevel, TxOptions};
use serde::Deserialize;
use sqlx::Database;
use sqlx::pool::PoolOptions;
use std::time::Duration;

/// Connection and transaction settings for one logical database.
///
/// ```toml
/// url = "postgres://app@localhost/orders"
/// max_connections = 10
/// isolation = "serializable"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub isolation: Option<IsolationLevel>,
    #[serde(default)]
    pub read_only: bool,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

impl DbSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            index: 0,
            isolation: None,
            read_only: false,
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, DbError> {
        toml::from_str(source).map_err(|e| DbError::Config(e.to_string()))
    }

    /// `DATABASE_URL`, when set, replaces the configured url.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.url = url;
        }
        self
    }

    pub fn tx_options(&self) -> TxOptions {
        TxOptions {
            isolation: self.isolation,
            read_only: self.read_only,
        }
    }

    pub fn pool_options<DB: Database>(&self) -> PoolOptions<DB> {
        PoolOptions::<DB>::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }

    /// Connect a pool and build the matching [`TxConfig`].
    pub async fn connect<DB: Database>(&self) -> Result<TxConfig<DB>, DbError> {
        if self.url.is_empty() {
            return Err(DbError::Config("database url is empty".to_string()));
        }
        // Unsupported options are rejected before any connection is made.
        self.tx_options().begin_statement(DB::NAME)?;

        let pool = self
            .pool_options::<DB>()
            .connect(&self.url)
            .await
            .map_err(DbError::connect)?;
        tracing::info!(
            database = DB::NAME,
            index = self.index,
            max_connections = self.max_connections,
            "Database pool connected"
        );
        Ok(TxConfig::new(pool)
            .options(self.tx_options())?
            .index(self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DbSettings::from_toml_str(r#"url = "sqlite::memory:""#).unwrap();
        assert_eq!(settings, DbSettings::new("sqlite::memory:"));
        assert_eq!(settings.tx_options(), TxOptions::default());
    }

    #[test]
    fn test_full_settings() {
        let settings = DbSettings::from_toml_str(
            r#"
            url = "postgres://app@localhost/orders"
            max_connections = 10
            acquire_timeout_secs = 3
            index = 1
            isolation = "serializable"
            read_only = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.max_connections, 10);
        assert_eq!(settings.acquire_timeout_secs, 3);
        assert_eq!(settings.index, 1);
        assert_eq!(
            settings.tx_options(),
            TxOptions::new()
                .isolation(IsolationLevel::Serializable)
                .read_only(true)
        );
    }

    #[test]
    fn test_invalid_settings() {
        let err = DbSettings::from_toml_str("max_connections = 3").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_url() {
        let err = DbSettings::new("")
            .connect::<sqlx::Sqlite>()
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_unsupported_options() {
        let mut settings = DbSettings::new("sqlite::memory:");
        settings.isolation = Some(IsolationLevel::Serializable);

        let err = settings.connect::<sqlx::Sqlite>().await.unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
