//! An in-memory implementation of the [`KvStore`][super::KvStore] trait.
//!
//! Makes no effort to persist values between restarts, and servers in a fleet each see
//! their own copy of the data.
use crate::error::Error;
use crate::kv_store::KvStore;
use std::collections::HashMap;

/// An in-memory key-value store: a plain [`HashMap`] behind the [`KvStore`] interface.
#[derive(Default, Debug, Clone)]
pub struct InMemoryKvStore {
    entries: HashMap<String, String>,
}

#[async_trait::async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "builtin"
    }
}
