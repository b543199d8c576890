//! Cache backend driver (Redis).
//!
//! Records live as JSON strings under their physical key with native `EX`
//! expiry; secondary indexes are sets of record keys, with a per-record
//! reverse set so deletion can cascade; a per-namespace recency ZSET backs
//! newest-first listing. Atomic take is `GETDEL`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::driver::StorageDriver;
use crate::error::StoreResult;
use crate::types::{index_key, record_key, Index, Record};

fn reverse_key(full_key: &str) -> String {
    format!("{full_key}:_indexes")
}

fn created_key(namespace: &str) -> String {
    format!("{namespace}:_created")
}

/// Redis-backed [`StorageDriver`].
#[derive(Clone)]
pub struct RedisDriver {
    conn: ConnectionManager,
}

impl RedisDriver {
    /// Connect to the given `redis://` URL.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Drop this record's index memberships, if any.
    async fn unlink_indexes(&self, full_key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let reverse = reverse_key(full_key);
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&reverse)
            .query_async(&mut conn)
            .await?;
        for ik in &members {
            let _: () = redis::cmd("SREM")
                .arg(ik)
                .arg(full_key)
                .query_async(&mut conn)
                .await?;
        }
        if !members.is_empty() {
            let _: () = redis::cmd("DEL")
                .arg(&reverse)
                .query_async(&mut conn)
                .await?;
        }
        Ok(())
    }

    fn parse(json: &str) -> StoreResult<Record> {
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl StorageDriver for RedisDriver {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = redis::cmd("GET")
            .arg(record_key(namespace, key))
            .query_async(&mut conn)
            .await?;
        json.as_deref().map(Self::parse).transpose()
    }

    async fn get_all(
        &self,
        namespace: &str,
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<Record>> {
        let mut conn = self.conn.clone();
        let stop: i64 = if limit == 0 {
            -1
        } else {
            (offset + limit - 1) as i64
        };
        let keys: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(created_key(namespace))
            .arg(offset as i64)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut records = Vec::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            match value {
                Some(json) => records.push(Self::parse(&json)?),
                None => {
                    // Key expired under us; drop the stale recency member.
                    let _: () = redis::cmd("ZREM")
                        .arg(created_key(namespace))
                        .arg(key)
                        .query_async(&mut conn)
                        .await?;
                }
            }
        }
        Ok(records)
    }

    async fn get_by_index(&self, namespace: &str, index: &Index) -> StoreResult<Vec<Record>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = redis::cmd("SMEMBERS")
            .arg(index_key(namespace, index))
            .query_async(&mut conn)
            .await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;
        values
            .into_iter()
            .flatten()
            .map(|json| Self::parse(&json))
            .collect()
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
        let json = serde_json::to_string(&record)?;

        // Overwrite replaces previous index entries.
        self.unlink_indexes(&full_key).await?;

        let mut conn = self.conn.clone();
        if ttl > 0 {
            let _: () = redis::cmd("SET")
                .arg(&full_key)
                .arg(&json)
                .arg("EX")
                .arg(ttl)
                .query_async(&mut conn)
                .await?;
        } else {
            let _: () = redis::cmd("SET")
                .arg(&full_key)
                .arg(&json)
                .query_async(&mut conn)
                .await?;
        }

        for index in indexes {
            let ik = index_key(namespace, index);
            let _: () = redis::cmd("SADD")
                .arg(&ik)
                .arg(&full_key)
                .query_async(&mut conn)
                .await?;
            let _: () = redis::cmd("SADD")
                .arg(reverse_key(&full_key))
                .arg(&ik)
                .query_async(&mut conn)
                .await?;
        }

        let _: () = redis::cmd("ZADD")
            .arg(created_key(namespace))
            .arg(chrono::Utc::now().timestamp_millis())
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take(&self, namespace: &str, key: &str) -> StoreResult<Option<Record>> {
        let full_key = record_key(namespace, key);
        let mut conn = self.conn.clone();

        // GETDEL is the atomic claim; everything after is cleanup.
        let json: Option<String> = redis::cmd("GETDEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;
        let Some(json) = json else {
            return Ok(None);
        };

        self.unlink_indexes(&full_key).await?;
        let _: () = redis::cmd("ZREM")
            .arg(created_key(namespace))
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;

        Ok(Some(Self::parse(&json)?))
    }

    async fn delete(&self, namespace: &str, key: &str) -> StoreResult<()> {
        let full_key = record_key(namespace, key);
        self.unlink_indexes(&full_key).await?;

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("ZREM")
            .arg(created_key(namespace))
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;
        let _: () = redis::cmd("DEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running redis"]
    async fn test_roundtrip_take_and_index_cascade() {
        let driver = RedisDriver::connect(&redis_url()).await.unwrap();
        let ns = format!("test:{}", chrono::Utc::now().timestamp_nanos_opt().unwrap());
        let index = Index::new("tenant_product", "acme:hr");

        driver
            .put(
                &ns,
                "k1",
                Record::plain("{\"v\":1}".to_string()),
                0,
                std::slice::from_ref(&index),
            )
            .await
            .unwrap();

        assert!(driver.get(&ns, "k1").await.unwrap().is_some());
        assert_eq!(driver.get_by_index(&ns, &index).await.unwrap().len(), 1);

        let taken = driver.take(&ns, "k1").await.unwrap();
        assert!(taken.is_some());
        assert!(driver.take(&ns, "k1").await.unwrap().is_none());
        assert!(driver.get_by_index(&ns, &index).await.unwrap().is_empty());
    }
}
