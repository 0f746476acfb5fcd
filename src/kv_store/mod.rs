//! Dynamic key-value storage for the `k-v.io` TXT protocol.
//!
//! Supports a generic interface for getting, putting, and deleting string values by key,
//! driven entirely by DNS TXT queries (`put.my-value.my-key.k-v.io`, `my-key.k-v.io`,
//! `delete.my-key.k-v.io`).
//!
//! Two implementations are provided, [`etcd::EtcdKvStore`] and [`memory::InMemoryKvStore`].
//! The former keeps keys in an etcd cluster so every server in a fleet answers
//! consistently; the latter keeps keys in process memory and is the fallback when no etcd
//! endpoint is configured or the configured one is unreachable at startup. The choice is
//! made once, at startup; the two are never consulted together.

use crate::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod etcd;
pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use etcd::EtcdKvStore;
#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryKvStore;

/// `DynKvStore` is a type alias for a [`KvStore`] shared by every in-flight query task,
/// coordinated through an [`Arc`] and a [`RwLock`] wrapping the store.
#[allow(clippy::module_name_repetitions)]
pub type DynKvStore = Arc<RwLock<dyn KvStore + Send + Sync>>;

/// An async trait describing dynamic storage of the TXT values served under `k-v.io`,
/// keyed by the (lowercased) first label under the apex.
#[async_trait::async_trait]
pub trait KvStore {
    /// Get the value stored for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&mut self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&mut self, key: &str) -> Result<(), Error>;

    /// Short backend label reported by the metrics TXT answer.
    fn backend(&self) -> &'static str;
}
