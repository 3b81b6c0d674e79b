use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;

use crate::model::{ServerTime, Value};
use crate::{Error, Result, ValueReader, ValueWriter};

/// An in-memory value store with the server's write semantics.
///
/// Values are validated on write, ids are unique, timestamps are assigned here and
/// an update whose timestamps do not match the stored ones is rejected as stale.
pub struct MemStore {
    data: RwLock<HashMap<String, Value>>,
    clock: AtomicI64,
}

impl MemStore {
    pub fn new(initial_data: HashMap<String, Value>) -> Self {
        Self {
            data: RwLock::new(initial_data),
            clock: AtomicI64::new(0),
        }
    }

    /// Ids of all stored values, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.read()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Value>>> {
        self.data.read().map_err(|_| Error::Internal("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Value>>> {
        self.data.write().map_err(|_| Error::Internal("store lock poisoned".to_string()))
    }

    // Milliseconds since the epoch, strictly increasing across calls.
    fn stamp(&self) -> ServerTime {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let mut last = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.clock.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return ServerTime(json!(next)),
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[async_trait]
impl ValueReader for MemStore {
    async fn get(&self, id: &str) -> Result<Value> {
        self.read()?.get(id).cloned().ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ValueWriter for MemStore {
    async fn create(&self, value: &Value) -> Result<()> {
        value.validate()?;
        let stamp = self.stamp();
        let mut data = self.write()?;
        if data.contains_key(&value.id) {
            return Err(Error::AlreadyExists(value.id.clone()));
        }
        let mut stored = value.clone();
        stored.create_time = Some(stamp.clone());
        stored.update_time = Some(stamp);
        log::debug!("created value {}", stored.id);
        data.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn update(&self, value: &Value) -> Result<()> {
        value.validate()?;
        let stamp = self.stamp();
        let mut data = self.write()?;
        let current = data.get(&value.id).ok_or_else(|| Error::NotFound(value.id.clone()))?;
        if current.create_time != value.create_time || current.update_time != value.update_time {
            return Err(Error::Conflict(value.id.clone()));
        }
        let mut stored = value.clone();
        stored.update_time = Some(stamp);
        log::debug!("updated value {}", stored.id);
        data.insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.write()?.remove(id).is_some() {
            log::debug!("deleted value {}", id);
        }
        Ok(())
    }
}
