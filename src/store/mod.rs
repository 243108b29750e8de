//! Shared key-value store backing replication
//!
//! The store holds three flat collections of JSON records. It offers
//! per-key last-write-wins and nothing more: no transactions, no TTLs, and
//! every write is fire-and-forget.

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::{RestStore, StoreError};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

/// Full contents of one collection at some instant
pub type StoreSnapshot = Arc<HashMap<String, Value>>;

/// Logical collections in the shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Avatars,
    Projectiles,
    Effects,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Avatars, Collection::Projectiles, Collection::Effects];

    /// Path segment of the collection in the store
    pub fn path(self) -> &'static str {
        match self {
            Collection::Avatars => "players",
            Collection::Projectiles => "projectiles",
            Collection::Effects => "effects",
        }
    }

    fn index(self) -> usize {
        match self {
            Collection::Avatars => 0,
            Collection::Projectiles => 1,
            Collection::Effects => 2,
        }
    }
}

/// Eventually consistent store shared by all participants.
///
/// Writes and removals return immediately; their effect shows up in later
/// snapshots. Failures are logged by the implementation and never surface
/// to the caller.
pub trait SharedStore: Send + Sync + 'static {
    fn put(&self, collection: Collection, key: &str, value: Value);

    fn remove(&self, collection: Collection, key: &str);

    /// Latest known contents of a collection
    fn snapshot(&self, collection: Collection) -> StoreSnapshot;

    /// Receive the full collection every time it changes
    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<StoreSnapshot>;
}
