//! Replication channel - one participant's view of the shared store

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{Collection, SharedStore, StoreSnapshot};
use crate::util::rate_limit::PublishGate;

use super::leader::{expired_keys, Leadership};
use super::protocol::{AvatarRecord, Replicated};
use super::ReplicationTuning;

/// Counters for the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelStats {
    pub publishes: u64,
    pub ephemeral_writes: u64,
    pub sweeps: u64,
    pub swept_records: u64,
    pub is_leader: bool,
}

/// Publish/subscribe/evict for a single participant
pub struct ReplicationChannel<S: SharedStore> {
    self_id: Uuid,
    store: Arc<S>,
    tuning: ReplicationTuning,
    gate: PublishGate,
    leadership: Leadership,
    /// Pending self-removal of ephemeral records written by this participant
    timers: HashMap<(Collection, Uuid), JoinHandle<()>>,
    stats: ChannelStats,
}

impl<S: SharedStore> ReplicationChannel<S> {
    pub fn new(self_id: Uuid, store: Arc<S>, tuning: ReplicationTuning) -> Self {
        Self {
            self_id,
            store,
            tuning,
            gate: PublishGate::new(tuning.publish_interval_ms),
            leadership: Leadership::new(tuning.leader_check_interval_ms),
            timers: HashMap::new(),
            stats: ChannelStats::default(),
        }
    }

    pub fn self_id(&self) -> Uuid {
        self.self_id
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub fn is_leader(&self) -> bool {
        self.leadership.is_leader()
    }

    /// Number of ephemeral records still waiting for their timed removal
    pub fn pending_ephemeral(&self) -> usize {
        self.timers.values().filter(|timer| !timer.is_finished()).count()
    }

    /// Publish own avatar state unless the last publish was too recent.
    /// Returns whether a write was issued.
    pub fn publish_self(&mut self, record: &AvatarRecord, now_ms: u64) -> bool {
        if !self.gate.try_claim(now_ms) {
            return false;
        }

        match record.encode() {
            Ok(value) => {
                self.store.put(Collection::Avatars, &self.self_id.to_string(), value);
                self.stats.publishes += 1;
                true
            }
            Err(e) => {
                warn!(player_id = %self.self_id, error = %e, "Failed to encode avatar");
                false
            }
        }
    }

    /// Receiver of every change to `collection`
    pub fn subscribe(&self, collection: Collection) -> broadcast::Receiver<StoreSnapshot> {
        self.store.subscribe(collection)
    }

    /// Current contents of `collection`
    pub fn snapshot(&self, collection: Collection) -> StoreSnapshot {
        self.store.snapshot(collection)
    }

    /// Write a short-lived record and schedule its removal after `ttl`.
    /// Must be called from within a tokio runtime.
    pub fn create_ephemeral<R: Replicated>(&mut self, key: Uuid, record: &R, ttl: Duration) {
        let value = match record.encode() {
            Ok(value) => value,
            Err(e) => {
                warn!(collection = R::COLLECTION.path(), key = %key, error = %e, "Failed to encode record");
                return;
            }
        };

        let collection = R::COLLECTION;
        self.store.put(collection, &key.to_string(), value);
        self.stats.ephemeral_writes += 1;

        self.timers.retain(|_, timer| !timer.is_finished());

        let store = Arc::clone(&self.store);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            debug!(collection = collection.path(), key = %key, "Ephemeral record expired");
            store.remove(collection, &key.to_string());
        });

        if let Some(previous) = self.timers.insert((collection, key), timer) {
            previous.abort();
        }
    }

    /// Remove an ephemeral record now and cancel its pending timer.
    /// Returns whether a timer was still pending.
    pub fn retire_ephemeral(&mut self, collection: Collection, key: Uuid) -> bool {
        let pending = match self.timers.remove(&(collection, key)) {
            Some(timer) => {
                let pending = !timer.is_finished();
                timer.abort();
                pending
            }
            None => false,
        };
        self.store.remove(collection, &key.to_string());
        pending
    }

    /// Delete own avatar record
    pub fn remove_self(&mut self) {
        info!(player_id = %self.self_id, "Removing own avatar record");
        self.store.remove(Collection::Avatars, &self.self_id.to_string());
    }

    /// Leave the store clean: own avatar and every ephemeral record still pending
    pub fn shutdown(&mut self) {
        let pending: Vec<(Collection, Uuid)> = self.timers.keys().copied().collect();
        for (collection, key) in pending {
            self.retire_ephemeral(collection, key);
        }
        self.remove_self();
    }

    /// Re-check leadership when due and, if leading, delete every expired
    /// record. Returns the number of deletions issued when a sweep ran.
    pub fn sweep_if_due(&mut self, now_ms: u64) -> Option<usize> {
        if !self.leadership.due(now_ms) {
            return None;
        }

        let avatars = self.store.snapshot(Collection::Avatars);
        let leader = self
            .leadership
            .evaluate(self.self_id, &avatars, now_ms, self.tuning.avatar_ttl_ms);
        self.stats.is_leader = leader;
        if !leader {
            return None;
        }

        let mut deleted = 0;
        for collection in Collection::ALL {
            let snapshot = self.store.snapshot(collection);
            let ttl = self.tuning.ttl_for(collection);
            for key in expired_keys(&snapshot, collection, now_ms, ttl) {
                debug!(collection = collection.path(), key = %key, "Sweeping expired record");
                self.store.remove(collection, &key);
                deleted += 1;
            }
        }

        self.stats.sweeps += 1;
        self.stats.swept_records += deleted as u64;
        if deleted > 0 {
            info!(player_id = %self.self_id, deleted, "Swept expired records");
        }
        Some(deleted)
    }
}

impl<S: SharedStore> Drop for ReplicationChannel<S> {
    fn drop(&mut self) {
        // Records stay in the store and age out; only the timers die with us
        for timer in self.timers.values() {
            timer.abort();
        }
    }
}

/// Drain `rx` without blocking and keep only the newest snapshot.
/// Lagging behind is harmless since every message is a full snapshot.
pub fn latest_snapshot(rx: &mut broadcast::Receiver<StoreSnapshot>) -> Option<StoreSnapshot> {
    let mut latest = None;
    loop {
        match rx.try_recv() {
            Ok(snapshot) => latest = Some(snapshot),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Snapshot receiver lagged");
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return latest,
        }
    }
}
