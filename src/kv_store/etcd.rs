//! An etcd-backed implementation of the [`KvStore`][super::KvStore] trait.
//!
//! etcd keeps the `k-v.io` data consistent across a fleet of servers, so a value `put` via
//! one nameserver is immediately `get`-able via the others.
use crate::error::Error;
use crate::kv_store::KvStore;
use etcd_client::{Client, ConnectOptions};
use std::time::Duration;
use tokio::time::timeout;

/// How long we wait for etcd to get back to us. etcd reads on the slow server take as long
/// as 482 ms, and the round trip to the farthest nameserver is ~190 ms; quadrupling the
/// headroom (4 × 482 = 1928) still answers well within a resolver's typical 5000 ms
/// per-query patience.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(1928);

const DIAL_TIMEOUT: Duration = Duration::from_millis(250);

pub struct EtcdKvStore {
    client: Client,
}

impl EtcdKvStore {
    /// Connects to etcd and issues a probe read, so an unreachable or misbehaving endpoint
    /// is caught at startup while the in-memory fallback is still an option.
    pub async fn connect(endpoint: &str) -> Result<Self, Error> {
        let options = ConnectOptions::new().with_connect_timeout(DIAL_TIMEOUT);
        let client = timeout(REQUEST_TIMEOUT, Client::connect([endpoint], Some(options)))
            .await
            .map_err(|_| Error::KvTimeout)??;
        let store = EtcdKvStore { client };
        store.get("probe-key, doesn't matter whether it exists").await?;
        Ok(store)
    }
}

#[async_trait::async_trait]
impl KvStore for EtcdKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut kv = self.client.kv_client();
        let response = timeout(REQUEST_TIMEOUT, kv.get(key, None))
            .await
            .map_err(|_| Error::KvTimeout)??;
        match response.kvs().first() {
            Some(entry) => Ok(Some(entry.value_str()?.to_string())),
            None => Ok(None),
        }
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<(), Error> {
        let mut kv = self.client.kv_client();
        timeout(REQUEST_TIMEOUT, kv.put(key, value, None))
            .await
            .map_err(|_| Error::KvTimeout)??;
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), Error> {
        let mut kv = self.client.kv_client();
        timeout(REQUEST_TIMEOUT, kv.delete(key, None))
            .await
            .map_err(|_| Error::KvTimeout)??;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "etcd"
    }
}
