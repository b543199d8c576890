//! The backend driver contract.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{Index, Record};

/// Uniform contract every storage backend implements.
///
/// Drivers persist [`Record`]s verbatim under `namespace`/`key`, maintain
/// secondary index entries, and enforce TTL expiry themselves: an expired
/// record is never returned from `get`/`take`/`get_all`, even if the backend
/// has not yet physically removed it.
///
/// The encrypt-on-write / decrypt-on-read boundary lives above this trait;
/// drivers never see plaintext domain data when a key is configured.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Fetch a record by key. Absent or expired records yield `None`.
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>>;

    /// List records in a namespace, newest first. `limit == 0` means no limit.
    async fn get_all(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Record>>;

    /// Fetch every record carrying the given secondary index entry.
    async fn get_by_index(&self, namespace: &str, index: &Index) -> StoreResult<Vec<Record>>;

    /// Write (or overwrite) a record. A `ttl` of zero means no expiry.
    /// Re-writing a key replaces its previous index entries.
    async fn put(
        &self,
        namespace: &str,
        key: &str,
        record: Record,
        ttl: u64,
        indexes: &[Index],
    ) -> StoreResult<()>;

    /// Atomically fetch and delete a record.
    ///
    /// Under concurrent callers racing on the same key, at most one observes
    /// the record; the rest get `None`. This is the single-use primitive
    /// behind authorization codes.
    async fn take(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>>;

    /// Delete a record and all of its index entries. Deleting an absent key
    /// is not an error.
    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()>;

    /// Readiness probe against the backend.
    async fn ping(&self) -> StoreResult<()>;
}
