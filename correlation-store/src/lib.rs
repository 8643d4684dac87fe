//! Shared key-value store used as the request/response rendezvous
//!
//! Requests and responses travel on independent tasks: the caller that sent
//! a request waits on a key, the connection reader writes the provider's
//! answer to that key. This crate provides:
//!
//! - [`keys`]: pure functions naming every key the bridge uses
//! - [`CorrelationStore`]: the store operations the bridge depends on
//! - [`MemoryStore`]: an in-process backend
//! - [`RedisStore`]: a Redis server shared by every bridge process
//!
//! ```rust
//! use correlation_store::{keys, CorrelationStore, MemoryStore};
//!
//! # tokio_test_block_on(async {
//! let store = MemoryStore::new();
//! store.sadd(&keys::monitored_set_key("app"), "1001").await.unwrap();
//! assert_eq!(store.smembers(&keys::monitored_set_key("app")).await.unwrap(), vec!["1001"]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

mod error;
pub mod keys;
mod memory;
mod redis_store;
mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::CorrelationStore;
