//! Legacy/target record store contract
//!
//! Both stores expose the same minimal surface: point reads, point writes,
//! and an enumeration of records changed after a checkpoint. The wire format
//! behind it is the store's own business.

use crate::error::StoreError;
use crate::record::{ChangedRecord, Checkpoint, RecordKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

/// Access contract for one backing store
#[async_trait]
pub trait RecordStore: Send + Sync + Debug {
    /// Store name used in logs and errors
    fn name(&self) -> &str;

    /// Fetch a record; `Ok(None)` when absent
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>, StoreError>;

    /// Create or overwrite a record
    async fn put(&self, key: &RecordKey, payload: &Value) -> Result<(), StoreError>;

    /// Records changed after `after`, oldest change first, at most `limit`
    async fn changed_since(
        &self,
        after: Checkpoint,
        limit: usize,
    ) -> Result<Vec<ChangedRecord>, StoreError>;
}

#[derive(Debug)]
struct StoredRecord {
    payload: Value,
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<RecordKey, StoredRecord>,
    /// seq -> key, holding only each key's latest change
    changes: BTreeMap<u64, RecordKey>,
    next_seq: u64,
}

/// In-process record store
///
/// Every put bumps a store-wide sequence number, which doubles as the
/// change checkpoint.
#[derive(Debug)]
pub struct MemoryRecordStore {
    name: String,
    inner: Mutex<MemoryInner>,
}

impl MemoryRecordStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    /// Insert without going through the async contract
    pub fn insert(&self, key: RecordKey, payload: Value) {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        if let Some(old) = inner.records.insert(key.clone(), StoredRecord { payload, seq }) {
            inner.changes.remove(&old.seq);
        }
        inner.changes.insert(seq, key);
    }

    /// Remove a record; returns the old payload
    pub fn remove(&self, key: &RecordKey) -> Option<Value> {
        let mut inner = self.inner.lock();
        let old = inner.records.remove(key)?;
        inner.changes.remove(&old.seq);
        Some(old.payload)
    }

    /// Synchronous point read
    #[must_use]
    pub fn snapshot(&self, key: &RecordKey) -> Option<Value> {
        self.inner.lock().records.get(key).map(|r| r.payload.clone())
    }

    /// Number of records held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Latest checkpoint issued
    #[inline]
    #[must_use]
    pub fn head(&self) -> Checkpoint {
        Checkpoint(self.inner.lock().next_seq)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RecordKey) -> Result<Option<Value>, StoreError> {
        Ok(self.snapshot(key))
    }

    async fn put(&self, key: &RecordKey, payload: &Value) -> Result<(), StoreError> {
        self.insert(key.clone(), payload.clone());
        Ok(())
    }

    async fn changed_since(
        &self,
        after: Checkpoint,
        limit: usize,
    ) -> Result<Vec<ChangedRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .changes
            .range(after.0.saturating_add(1)..)
            .take(limit)
            .map(|(seq, key)| ChangedRecord {
                key: key.clone(),
                checkpoint: Checkpoint(*seq),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(id: &str) -> RecordKey {
        RecordKey::new("animal", "t1", id)
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = MemoryRecordStore::new("legacy");
        store.put(&key("a"), &json!({ "x": 1 })).await.unwrap();

        assert_eq!(store.get(&key("a")).await.unwrap(), Some(json!({ "x": 1 })));
        assert_eq!(store.get(&key("b")).await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn changed_since_reports_latest_change_per_key_in_order() {
        let store = MemoryRecordStore::new("legacy");
        store.put(&key("a"), &json!({ "x": 1 })).await.unwrap();
        store.put(&key("b"), &json!({ "x": 2 })).await.unwrap();
        store.put(&key("a"), &json!({ "x": 3 })).await.unwrap();

        let changes = store.changed_since(Checkpoint::ORIGIN, 10).await.unwrap();
        let ids: Vec<_> = changes.iter().map(|c| c.key.record_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(changes[1].checkpoint, Checkpoint(3));

        let after_b = store.changed_since(changes[0].checkpoint, 10).await.unwrap();
        assert_eq!(after_b.len(), 1);
        assert_eq!(after_b[0].key, key("a"));
    }

    #[tokio::test]
    async fn changed_since_respects_limit() {
        let store = MemoryRecordStore::new("target");
        for i in 0..5 {
            store.put(&key(&i.to_string()), &json!({ "i": i })).await.unwrap();
        }
        let page = store.changed_since(Checkpoint::ORIGIN, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(store.head(), Checkpoint(5));
    }

    #[test]
    fn remove_drops_change_entry() {
        let store = MemoryRecordStore::new("legacy");
        store.insert(key("a"), json!({}));
        assert!(store.remove(&key("a")).is_some());
        assert!(store.is_empty());
        assert!(store.remove(&key("a")).is_none());
    }
}
