//! Process configuration read from environment variables.
//!
//! | Variable              | Default       |
//! |-----------------------|---------------|
//! | `HOST`                | `127.0.0.1`   |
//! | `PORT`                | `8000`        |
//! | `MESSAGE_STORE`       | `sqlite`      |
//! | `DATABASE_URL`        | `messages.db` |
//! | `DB_POOL_MAX`         | `10`          |
//! | `DB_CONN_TIMEOUT_SEC` | `30`          |

use std::env;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::memory_store::MemoryStore;
use crate::message_database::{MessageStore, StoreResult};
use crate::sqlite_store::{SqliteConfig, SqliteStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    pub sqlite: SqliteConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sqlite_defaults = SqliteConfig::default();

        let host = lookup("HOST").unwrap_or_else(|| String::from("127.0.0.1"));
        let port = parse_or(&lookup, "PORT", 8000, "a port number")?;
        let store = parse_or(
            &lookup,
            "MESSAGE_STORE",
            StoreKind::Sqlite,
            "`sqlite` or `memory`",
        )?;
        let database_url = lookup("DATABASE_URL").unwrap_or(sqlite_defaults.database_url);
        let max_pool_size = parse_or(
            &lookup,
            "DB_POOL_MAX",
            sqlite_defaults.max_pool_size,
            "a positive integer",
        )?;
        let connection_timeout_sec = parse_or(
            &lookup,
            "DB_CONN_TIMEOUT_SEC",
            sqlite_defaults.connection_timeout_sec,
            "a number of seconds",
        )?;

        if max_pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_MAX",
                value: String::from("0"),
                expected: "a positive integer",
            });
        }

        Ok(Self {
            host,
            port,
            store,
            sqlite: SqliteConfig {
                database_url,
                max_pool_size,
                connection_timeout_sec,
                ..sqlite_defaults
            },
        })
    }

    pub fn open_store(&self) -> StoreResult<Arc<dyn MessageStore>> {
        let store: Arc<dyn MessageStore> = match self.store {
            StoreKind::Sqlite => Arc::new(SqliteStore::open(&self.sqlite)?),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}

fn parse_or<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected,
        }),
    }
}
