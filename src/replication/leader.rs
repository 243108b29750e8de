//! Opportunistic cleanup leadership
//!
//! The store never expires anything on its own. One participant, the one
//! whose id sorts first among live avatars, deletes dead records. Two
//! participants briefly believing they lead is harmless since deleting an
//! expired record twice changes nothing.

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::store::{Collection, StoreSnapshot};
use crate::util::time::age_ms;

use super::protocol::parse_key;

/// Field carrying a record's age stamp in `collection`
pub fn stamp_field(collection: Collection) -> &'static str {
    match collection {
        Collection::Avatars => "lastUpdate",
        Collection::Projectiles | Collection::Effects => "createdAt",
    }
}

fn stamp_of(value: &Value, collection: Collection) -> Option<u64> {
    value.get(stamp_field(collection)).and_then(Value::as_u64)
}

/// True when `self_id` is the only participant or sorts first among them
pub fn is_leader(self_id: Uuid, participants: impl IntoIterator<Item = Uuid>) -> bool {
    participants.into_iter().all(|other| self_id <= other)
}

/// Ids of avatars whose record is still within `ttl_ms`
pub fn live_participants(avatars: &StoreSnapshot, now_ms: u64, ttl_ms: u64) -> Vec<Uuid> {
    avatars
        .iter()
        .filter(|(_, value)| {
            stamp_of(value, Collection::Avatars).is_some_and(|stamp| age_ms(now_ms, stamp) <= ttl_ms)
        })
        .filter_map(|(key, _)| parse_key(key).ok())
        .collect()
}

/// Keys of records past `ttl_ms`. A record without a readable stamp can
/// never become fresh again, so it counts as expired.
pub fn expired_keys(snapshot: &StoreSnapshot, collection: Collection, now_ms: u64, ttl_ms: u64) -> Vec<String> {
    snapshot
        .iter()
        .filter(|(_, value)| match stamp_of(value, collection) {
            Some(stamp) => age_ms(now_ms, stamp) > ttl_ms,
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect()
}

/// Periodic leadership evaluation for one participant
#[derive(Debug, Clone)]
pub struct Leadership {
    interval_ms: u64,
    last_check_ms: Option<u64>,
    is_leader: bool,
}

impl Leadership {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_check_ms: None,
            is_leader: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Whether a re-check is due. The first call is always due.
    pub fn due(&self, now_ms: u64) -> bool {
        match self.last_check_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.interval_ms,
            None => true,
        }
    }

    /// Re-evaluate against the current avatar membership
    pub fn evaluate(&mut self, self_id: Uuid, avatars: &StoreSnapshot, now_ms: u64, avatar_ttl_ms: u64) -> bool {
        self.last_check_ms = Some(now_ms);

        let participants = live_participants(avatars, now_ms, avatar_ttl_ms);
        let leader = is_leader(self_id, participants.iter().copied());
        if leader != self.is_leader {
            info!(
                player_id = %self_id,
                leader,
                participants = participants.len(),
                "Cleanup leadership changed"
            );
        }
        self.is_leader = leader;
        leader
    }
}
