use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::eval::testing;
use crate::model::Value;
use crate::{Result, ValueStore};

/// Write front-end over a [`ValueStore`].
///
/// Every write is validated and its evaluation tests are run before the store is
/// called. Writes to the same id are serialized, and `update` reads the current
/// server timestamps and echoes them back.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn ValueStore>,
    locks: Arc<WriteLocks>,
}

impl Session {
    pub fn new(store: Arc<dyn ValueStore>) -> Self {
        Self {
            store,
            locks: Arc::new(WriteLocks::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ValueStore> {
        &self.store
    }

    /// Checks a value locally: structure first, then its tests.
    pub fn check(value: &Value) -> Result<()> {
        value.validate()?;
        testing::run(value).into_result()?;
        Ok(())
    }

    pub async fn read(&self, id: &str) -> Result<Value> {
        self.store.get(id).await
    }

    pub async fn create(&self, value: &Value) -> Result<()> {
        Self::check(value)?;
        let _guard = self.locks.acquire(&value.id).await;
        self.store.create(&value.without_server_fields()).await
    }

    /// Replaces the stored value and returns what was sent.
    ///
    /// Any timestamps on `value` are ignored; the current ones are fetched under
    /// the id's write lock.
    pub async fn update(&self, value: &Value) -> Result<Value> {
        Self::check(value)?;
        let _guard = self.locks.acquire(&value.id).await;
        let current = self.store.get(&value.id).await?;
        let next = value.clone().merge_server_fields(&current);
        self.store.update(&next).await?;
        log::debug!("updated value {}", next.id);
        Ok(next)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;
        self.store.delete(id).await
    }
}

#[derive(Default)]
struct WriteLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteLocks {
    async fn acquire(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop locks nobody holds or waits on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
