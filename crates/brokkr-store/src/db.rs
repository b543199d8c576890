//! The encrypted database wrapper over a backend driver.
//!
//! Owns the encrypt-on-write / decrypt-on-read boundary and the contract
//! guard that TTL-bound records never carry secondary indexes. Domain stores
//! above this layer only ever see decrypted, typed values.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::driver::StorageDriver;
use crate::encryption::{Encrypter, KEY_LENGTH};
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryDriver;
use crate::sql::SqlDriver;
use crate::store::Store;
use crate::types::{Index, Record, Sealed};

/// Which backend driver to run on, selected at startup by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEngine {
    Memory,
    Sql,
    Redis,
}

impl FromStr for StorageEngine {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sql" | "postgres" => Ok(Self::Sql),
            "redis" => Ok(Self::Redis),
            other => Err(StoreError::InvalidArgument(format!(
                "unknown storage engine '{other}' (expected memory, sql or redis)"
            ))),
        }
    }
}

impl std::fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sql => write!(f, "sql"),
            Self::Redis => write!(f, "redis"),
        }
    }
}

/// Backend selection plus the at-rest encryption key.
#[derive(Clone)]
pub struct StoreConfig {
    pub engine: StorageEngine,
    /// Connection URL; required for the sql and redis engines.
    pub url: Option<String>,
    /// 32-byte key; absent means records are stored as plaintext JSON.
    pub encryption_key: Option<[u8; KEY_LENGTH]>,
    /// How often the relational reaper purges expired records.
    pub cleanup_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: StorageEngine::Memory,
            url: None,
            encryption_key: None,
            cleanup_interval: Duration::from_secs(5),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("engine", &self.engine)
            .field("url", &self.url)
            .field(
                "encryption_key",
                &self.encryption_key.map(|_| "[REDACTED]"),
            )
            .field("cleanup_interval", &self.cleanup_interval)
            .finish()
    }
}

/// Namespace/key/value database with secondary indexes, TTL and at-rest
/// encryption, backed by an interchangeable [`StorageDriver`].
#[derive(Clone)]
pub struct Database {
    driver: Arc<dyn StorageDriver>,
    encrypter: Option<Encrypter>,
}

impl Database {
    /// Build the configured backend and wrap it.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        let driver: Arc<dyn StorageDriver> = match config.engine {
            StorageEngine::Memory => Arc::new(MemoryDriver::new()),
            StorageEngine::Sql => {
                let url = config.url.as_deref().ok_or_else(|| {
                    StoreError::InvalidArgument(
                        "storage engine 'sql' requires a connection url".to_string(),
                    )
                })?;
                Arc::new(SqlDriver::connect(url, config.cleanup_interval).await?)
            }
            StorageEngine::Redis => {
                #[cfg(feature = "redis")]
                {
                    let url = config.url.as_deref().ok_or_else(|| {
                        StoreError::InvalidArgument(
                            "storage engine 'redis' requires a connection url".to_string(),
                        )
                    })?;
                    Arc::new(crate::redis::RedisDriver::connect(url).await?)
                }
                #[cfg(not(feature = "redis"))]
                {
                    return Err(StoreError::InvalidArgument(
                        "storage engine 'redis' requires the `redis` cargo feature".to_string(),
                    ));
                }
            }
        };
        Ok(Self::with_driver(driver, config.encryption_key))
    }

    /// Wrap an already-built driver.
    #[must_use]
    pub fn with_driver(
        driver: Arc<dyn StorageDriver>,
        encryption_key: Option<[u8; KEY_LENGTH]>,
    ) -> Self {
        Self {
            driver,
            encrypter: encryption_key.map(Encrypter::new),
        }
    }

    /// In-memory database without encryption, for tests and development.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_driver(Arc::new(MemoryDriver::new()), None)
    }

    /// A namespace-scoped handle carrying this database plus a fixed TTL.
    #[must_use]
    pub fn store(&self, namespace: impl Into<String>, ttl: u64) -> Store {
        Store::new(self.clone(), namespace.into(), ttl)
    }

    /// Write a value. Fails with `InvalidArgument` when `ttl > 0` and
    /// indexes are supplied: TTL-scoped namespaces are never secondarily
    /// indexed, which keeps expiry cheap and index entries never stale.
    pub async fn put<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: u64,
        indexes: &[Index],
    ) -> StoreResult<()> {
        if ttl > 0 && !indexes.is_empty() {
            return Err(StoreError::InvalidArgument(
                "secondary indexes are not allowed on a record with ttl".to_string(),
            ));
        }
        let record = self.seal(value)?;
        self.driver.put(namespace, key, record, ttl, indexes).await
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        match self.driver.get(namespace, key).await? {
            Some(record) => Ok(Some(self.unseal(record)?)),
            None => Ok(None),
        }
    }

    /// Atomically fetch and delete: at most one concurrent caller gets the
    /// value.
    pub async fn take<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        match self.driver.take(namespace, key).await? {
            Some(record) => Ok(Some(self.unseal(record)?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_index<T: DeserializeOwned>(
        &self,
        namespace: &str,
        index: &Index,
    ) -> StoreResult<Vec<T>> {
        self.driver
            .get_by_index(namespace, index)
            .await?
            .into_iter()
            .map(|record| self.unseal(record))
            .collect()
    }

    pub async fn get_all<T: DeserializeOwned>(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<T>> {
        self.driver
            .get_all(namespace, offset, limit)
            .await?
            .into_iter()
            .map(|record| self.unseal(record))
            .collect()
    }

    pub async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        self.driver.delete(namespace, key).await
    }

    /// Readiness probe against the backend.
    pub async fn ping(&self) -> StoreResult<()> {
        self.driver.ping().await
    }

    fn seal<T: Serialize>(&self, value: &T) -> StoreResult<Record> {
        match &self.encrypter {
            Some(encrypter) => {
                let json = serde_json::to_vec(value)?;
                let envelope = encrypter.encrypt(&json)?;
                Ok(Record::encrypted(envelope.value, envelope.iv, envelope.tag))
            }
            None => Ok(Record::plain(serde_json::to_string(value)?)),
        }
    }

    fn unseal<T: DeserializeOwned>(&self, record: Record) -> StoreResult<T> {
        match record.sealed()? {
            Sealed::Plain(json) => Ok(serde_json::from_str(&json)?),
            Sealed::Encrypted { value, iv, tag } => {
                let encrypter = self.encrypter.as_ref().ok_or_else(|| {
                    StoreError::Decryption(
                        "record is encrypted but no encryption key is configured".to_string(),
                    )
                })?;
                let plaintext = encrypter.decrypt(&value, &iv, &tag)?;
                Ok(serde_json::from_slice(&plaintext)?)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("encrypted", &self.encrypter.is_some())
            .finish_non_exhaustive()
    }
}
