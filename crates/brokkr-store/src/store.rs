//! Namespace-scoped store handle.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::db::Database;
use crate::error::StoreResult;
use crate::types::Index;

/// A [`Database`] partially applied to one namespace and TTL.
///
/// Every higher-level store (connections, sessions, codes, tokens) holds one
/// of these instead of re-deriving the namespace/ttl wiring per call.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
    namespace: String,
    ttl: u64,
}

impl Store {
    pub(crate) fn new(db: Database, namespace: String, ttl: u64) -> Self {
        Self { db, namespace, ttl }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// TTL in seconds applied to every write; zero means no expiry.
    #[must_use]
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        indexes: &[Index],
    ) -> StoreResult<()> {
        self.db
            .put(&self.namespace, key, value, self.ttl, indexes)
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.db.get(&self.namespace, key).await
    }

    /// Atomic fetch-and-delete; see [`Database::take`].
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.db.take(&self.namespace, key).await
    }

    pub async fn get_by_index<T: DeserializeOwned>(&self, index: &Index) -> StoreResult<Vec<T>> {
        self.db.get_by_index(&self.namespace, index).await
    }

    pub async fn get_all<T: DeserializeOwned>(
        &self,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<T>> {
        self.db.get_all(&self.namespace, offset, limit).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        self.db.delete(&self.namespace, key).await
    }
}
