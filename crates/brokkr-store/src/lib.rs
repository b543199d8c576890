//! Encrypted namespace/key/value storage for the identity broker.
//!
//! One capability interface ([`StorageDriver`]) with interchangeable
//! backends (in-memory, Postgres, and Redis behind the `redis` feature),
//! wrapped by [`Database`], which owns at-rest encryption and the contract
//! guard that TTL-bound records never carry secondary indexes.
//!
//! # Example
//!
//! ```rust,ignore
//! use brokkr_store::{Database, Index, StoreConfig};
//!
//! let db = Database::connect(StoreConfig::default()).await?;
//! let connections = db.store("sso:connection", 0);
//! connections
//!     .put("client-id", &connection, &[Index::new("tenant_product", "acme:hr")])
//!     .await?;
//! ```

pub mod db;
pub mod driver;
pub mod encryption;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod sql;
pub mod store;
pub mod types;

pub use db::{Database, StorageEngine, StoreConfig};
pub use driver::StorageDriver;
pub use encryption::{generate_key, generate_key_hex, Encrypter, KEY_LENGTH};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryDriver;
#[cfg(feature = "redis")]
pub use redis::RedisDriver;
pub use sql::SqlDriver;
pub use store::Store;
pub use types::{Index, Record, Sealed};
