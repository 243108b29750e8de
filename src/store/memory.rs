//! In-process store for tests and single-process sessions

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Collection, SharedStore, StoreSnapshot};

struct Partition {
    records: DashMap<String, Value>,
    changes: broadcast::Sender<StoreSnapshot>,
}

impl Partition {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            records: DashMap::new(),
            changes,
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        let records: HashMap<String, Value> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        Arc::new(records)
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.changes.send(self.snapshot());
    }
}

/// Store living in this process. Every participant holding a clone of the
/// same `Arc<MemoryStore>` sees the others' writes.
pub struct MemoryStore {
    partitions: [Partition; 3],
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: [Partition::new(), Partition::new(), Partition::new()],
            offline: AtomicBool::new(false),
        }
    }

    fn partition(&self, collection: Collection) -> &Partition {
        &self.partitions[collection.index()]
    }

    /// Simulate a transport outage: while offline, writes and removals are
    /// silently lost.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.partition(collection).records.len()
    }

    pub fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        self.partition(collection)
            .records
            .get(key)
            .map(|entry| entry.value().clone())
    }

    fn is_offline(&self, op: &'static str, collection: Collection, key: &str) -> bool {
        let offline = self.offline.load(Ordering::Relaxed);
        if offline {
            debug!(op, collection = collection.path(), key, "Store offline, write dropped");
        }
        offline
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStore for MemoryStore {
    fn put(&self, collection: Collection, key: &str, value: Value) {
        if self.is_offline("put", collection, key) {
            return;
        }
        let partition = self.partition(collection);
        partition.records.insert(key.to_string(), value);
        partition.notify();
    }

    fn remove(&self, collection: Collection, key: &str) {
        if self.is_offline("remove", collection, key) {
            return;
        }
        let partition = self.partition(collection);
        if partition.records.remove(key).is_some() {
            partition.notify();
        }
    }

    fn snapshot(&self, collection: Collection) -> StoreSnapshot {
        self.partition(collection).snapshot()
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<StoreSnapshot> {
        self.partition(collection).changes.subscribe()
    }
}
