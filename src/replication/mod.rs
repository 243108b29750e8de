//! Replication over the shared store
//!
//! Every participant publishes its own avatar, fires short-lived projectile
//! and effect records, and mirrors everybody else's records locally. The
//! store has no leave events and no server-side expiry, so membership is
//! inferred by diffing snapshots and dead records are swept by a single
//! opportunistically elected leader.

pub mod channel;
pub mod leader;
pub mod mirror;
pub mod protocol;

pub use channel::{ChannelStats, ReplicationChannel};
pub use leader::Leadership;
pub use mirror::{Mirror, Reconciliation};
pub use protocol::{AvatarRecord, EffectRecord, ProjectileRecord, RecordError, Replicated};

use crate::store::Collection;

/// Replication timing contract shared by all peers
#[derive(Debug, Clone, Copy)]
pub struct ReplicationTuning {
    /// Age after which an avatar record is dead
    pub avatar_ttl_ms: u64,
    /// Age after which a projectile record is dead (matches projectile lifespan)
    pub projectile_ttl_ms: u64,
    /// Age after which an effect record is dead
    pub effect_ttl_ms: u64,
    /// Minimum spacing of own avatar publishes
    pub publish_interval_ms: u64,
    /// How often leadership is re-evaluated and, if held, a sweep is run
    pub leader_check_interval_ms: u64,
}

impl ReplicationTuning {
    pub fn ttl_for(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Avatars => self.avatar_ttl_ms,
            Collection::Projectiles => self.projectile_ttl_ms,
            Collection::Effects => self.effect_ttl_ms,
        }
    }
}

impl Default for ReplicationTuning {
    fn default() -> Self {
        Self {
            avatar_ttl_ms: 10_000,
            projectile_ttl_ms: 2_000,
            effect_ttl_ms: 3_000,
            publish_interval_ms: crate::util::rate_limit::PUBLISH_INTERVAL_MS,
            leader_check_interval_ms: 10_000,
        }
    }
}
