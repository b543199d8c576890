//! In-memory backend driver.
//!
//! Intended for development and tests; every instance is its own isolated
//! universe. TTL expiry is checked on read, so correctness never depends on
//! a background sweep.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::driver::StorageDriver;
use crate::error::StoreResult;
use crate::types::{index_key, record_key, Index, Record};

/// Sweep cadence: every N writes, drop entries already past their expiry.
const SWEEP_EVERY: u64 = 256;

struct Entry {
    record: Record,
    namespace: String,
    expires_at: Option<Instant>,
    /// Physical index keys this record is a member of.
    index_keys: Vec<String>,
    /// Monotonic insertion sequence, for newest-first listing.
    seq: u64,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<String, Entry>,
    /// Physical index key -> record keys carrying it.
    indexes: HashMap<String, BTreeSet<String>>,
    seq: u64,
}

impl MemoryInner {
    fn unlink_indexes(&mut self, record_key: &str, index_keys: &[String]) {
        for ik in index_keys {
            if let Some(members) = self.indexes.get_mut(ik) {
                members.remove(record_key);
                if members.is_empty() {
                    self.indexes.remove(ik);
                }
            }
        }
    }

    fn remove(&mut self, full_key: &str) -> Option<Entry> {
        let entry = self.records.remove(full_key)?;
        let index_keys = entry.index_keys.clone();
        self.unlink_indexes(full_key, &index_keys);
        Some(entry)
    }

    fn sweep_expired(&mut self) {
        let expired: Vec<String> = self
            .records
            .iter()
            .filter(|(_, e)| e.expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.remove(&key);
        }
    }
}

/// In-memory [`StorageDriver`] on a `tokio` read-write lock.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&record_key(namespace, key))
            .filter(|entry| !entry.expired())
            .map(|entry| entry.record.clone()))
    }

    async fn get_all(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Record>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner
            .records
            .values()
            .filter(|entry| entry.namespace == namespace && !entry.expired())
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));

        let records = entries
            .into_iter()
            .skip(offset)
            .take(if limit == 0 { usize::MAX } else { limit })
            .map(|entry| entry.record.clone())
            .collect();
        Ok(records)
    }

    async fn get_by_index(&self, namespace: &str, index: &Index) -> StoreResult<Vec<Record>> {
        let inner = self.inner.read().await;
        let Some(members) = inner.indexes.get(&index_key(namespace, index)) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<&Entry> = members
            .iter()
            .filter_map(|rk| inner.records.get(rk))
            .filter(|entry| !entry.expired())
            .collect();
        hits.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(hits.into_iter().map(|entry| entry.record.clone()).collect())
    }

    async fn put(
        &self,
        namespace: &str,
        key: &str,
        record: Record,
        ttl: u64,
        indexes: &[Index],
    ) -> StoreResult<()> {
        let full_key = record_key(namespace, key);
        let index_keys: Vec<String> = indexes.iter().map(|i| index_key(namespace, i)).collect();

        let mut inner = self.inner.write().await;
        inner.seq += 1;
        if inner.seq % SWEEP_EVERY == 0 {
            inner.sweep_expired();
        }

        // Overwrite replaces previous index entries.
        inner.remove(&full_key);

        let seq = inner.seq;
        for ik in &index_keys {
            inner
                .indexes
                .entry(ik.clone())
                .or_default()
                .insert(full_key.clone());
        }
        inner.records.insert(
            full_key,
            Entry {
                record,
                namespace: namespace.to_string(),
                expires_at: (ttl > 0).then(|| Instant::now() + Duration::from_secs(ttl)),
                index_keys,
                seq,
            },
        );
        Ok(())
    }

    async fn take(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .remove(&record_key(namespace, key))
            .filter(|entry| !entry.expired())
            .map(|entry| entry.record))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.remove(&record_key(namespace, key));
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
