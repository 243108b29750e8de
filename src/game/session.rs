//! Client session - one participant's frame loop
//!
//! A session owns the local avatar, the mirrored peers, every projectile it
//! knows about and its replication channel. Each frame it applies whatever
//! the store delivered since the last frame, simulates, and publishes.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use glam::Vec3;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::replication::channel::latest_snapshot;
use crate::replication::{AvatarRecord, EffectRecord, Mirror, ProjectileRecord, ReplicationChannel};
use crate::store::{Collection, SharedStore, StoreSnapshot};
use crate::util::time::{age_ms, frame_duration, unix_millis};

use super::body::OrbitalBody;
use super::controller::{Avatar, BodyController, LocalControlled, RemoteInterpolated};
use super::projectile::{tick_projectiles, Hit, HitTarget, Projectile};
use super::snapshot::SnapshotBuilder;
use super::{InputFrame, InputSource, PlayerId, SimError};

/// Where a session's avatar appears
#[derive(Debug, Clone, Copy)]
pub struct SpawnPoint {
    /// Direction from the planet centre
    pub direction: Vec3,
    /// Preferred facing; projected onto the surface
    pub heading: Vec3,
}

impl SpawnPoint {
    /// Uniformly random point on the sphere with a random heading
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            direction: random_unit(rng),
            heading: random_unit(rng),
        }
    }
}

fn random_unit<R: Rng>(rng: &mut R) -> Vec3 {
    let z: f32 = rng.gen_range(-1.0..=1.0);
    let phi: f32 = rng.gen_range(0.0..TAU);
    let ring = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(ring * phi.cos(), ring * phi.sin(), z)
}

/// Things that happened during a frame
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RemoteJoined(PlayerId),
    RemoteLeft(PlayerId),
    Fired(Uuid),
    Hit(Hit),
}

/// Per-session counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub player_id: PlayerId,
    pub frames: u64,
    pub skipped_updates: u64,
    pub publishes: u64,
    pub ephemeral_writes: u64,
    /// Ephemeral records of this session still waiting for timed removal
    pub pending_ephemeral: usize,
    pub remote_avatars: usize,
    pub projectiles: usize,
    pub effects: usize,
    pub shots_fired: u32,
    pub hits_dealt: u32,
    pub hits_taken: u32,
    pub fuel: f32,
    pub height: f32,
    pub is_leader: bool,
    pub sweeps: u64,
    pub swept_records: u64,
}

/// A mirrored peer
struct Peer {
    avatar: Avatar<RemoteInterpolated>,
    /// Sender stamp of the last applied sample
    last_update: u64,
}

/// A mirrored hit effect
#[derive(Debug, Clone, Copy)]
pub struct EffectView {
    pub position: Vec3,
    pub created_at: u64,
}

struct Subscriptions {
    avatars: broadcast::Receiver<StoreSnapshot>,
    projectiles: broadcast::Receiver<StoreSnapshot>,
    effects: broadcast::Receiver<StoreSnapshot>,
}

struct Mirrors {
    avatars: Mirror,
    projectiles: Mirror,
    effects: Mirror,
}

/// One participant
pub struct Session<S: SharedStore> {
    config: Arc<SimConfig>,
    channel: ReplicationChannel<S>,
    local: Avatar<LocalControlled>,
    peers: HashMap<PlayerId, Peer>,
    projectiles: Vec<Projectile>,
    effects: HashMap<Uuid, EffectView>,
    /// Effects this session wrote, by creation time
    own_effects: HashMap<Uuid, u64>,
    mirrors: Mirrors,
    subscriptions: Subscriptions,
    /// Latest snapshot per collection, re-checked for expiry between deliveries
    latest: [Option<StoreSnapshot>; 3],
    fire_cooldown: f32,
    stats: SessionStats,
}

impl<S: SharedStore> Session<S> {
    /// Spawn the local avatar and take in whatever the store already holds
    pub fn new(
        self_id: PlayerId,
        store: Arc<S>,
        config: Arc<SimConfig>,
        spawn: SpawnPoint,
        now_ms: u64,
    ) -> Result<Self, SimError> {
        let body = OrbitalBody::spawn(config.planet_radius, config.heights, spawn.direction, spawn.heading)?;
        let local = Avatar::local(self_id, body, &config);
        let channel = ReplicationChannel::new(self_id, store, config.replication);

        let subscriptions = Subscriptions {
            avatars: channel.subscribe(Collection::Avatars),
            projectiles: channel.subscribe(Collection::Projectiles),
            effects: channel.subscribe(Collection::Effects),
        };

        let mut session = Self {
            config,
            channel,
            local,
            peers: HashMap::new(),
            projectiles: Vec::new(),
            effects: HashMap::new(),
            own_effects: HashMap::new(),
            mirrors: Mirrors {
                avatars: Mirror::new(),
                projectiles: Mirror::new(),
                effects: Mirror::new(),
            },
            subscriptions,
            latest: [None, None, None],
            fire_cooldown: 0.0,
            stats: SessionStats {
                player_id: self_id,
                ..SessionStats::default()
            },
        };

        let mut events = Vec::new();
        for collection in Collection::ALL {
            let snapshot = session.channel.snapshot(collection);
            session.apply(collection, snapshot, true, now_ms, &mut events);
        }

        info!(
            player_id = %self_id,
            peers = session.peers.len(),
            projectiles = session.projectiles.len(),
            "Session started"
        );
        Ok(session)
    }

    pub fn id(&self) -> PlayerId {
        self.local.id
    }

    pub fn local(&self) -> &Avatar<LocalControlled> {
        &self.local
    }

    pub fn remote(&self, id: &PlayerId) -> Option<&Avatar<RemoteInterpolated>> {
        self.peers.get(id).map(|peer| &peer.avatar)
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.peers.keys()
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn effects(&self) -> &HashMap<Uuid, EffectView> {
        &self.effects
    }

    pub fn channel(&self) -> &ReplicationChannel<S> {
        &self.channel
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Advance one frame of `dt` seconds at wall time `now_ms`
    pub fn frame(&mut self, input: &InputFrame, dt: f32, now_ms: u64) -> Vec<SessionEvent> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut events = Vec::new();

        self.pump(now_ms, &mut events);

        if let Err(e) = self.local.update(input, dt) {
            warn!(player_id = %self.id(), error = %e, "Skipping local update");
            self.stats.skipped_updates += 1;
        }

        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);
        if input.fire && self.fire_cooldown <= 0.0 {
            self.fire(now_ms, &mut events);
        }

        self.update_projectiles(dt, now_ms, &mut events);

        let idle = InputFrame::default();
        for (id, peer) in self.peers.iter_mut() {
            if let Err(e) = peer.avatar.update(&idle, dt) {
                warn!(player_id = %id, error = %e, "Skipping remote update");
                self.stats.skipped_updates += 1;
            }
        }

        self.expire_effects(now_ms);

        let record = SnapshotBuilder::avatar(&self.local.body, self.local.controller.thrust_active(), now_ms);
        self.channel.publish_self(&record, now_ms);

        if let Some(deleted) = self.channel.sweep_if_due(now_ms) {
            debug!(player_id = %self.id(), deleted, "Cleanup sweep ran");
        }

        self.refresh_stats();
        events
    }

    /// Apply every snapshot delivered since the last frame. Collections with
    /// no delivery are re-checked against the clock so records that went
    /// stale without being deleted still drop out.
    fn pump(&mut self, now_ms: u64, events: &mut Vec<SessionEvent>) {
        for collection in Collection::ALL {
            let rx = match collection {
                Collection::Avatars => &mut self.subscriptions.avatars,
                Collection::Projectiles => &mut self.subscriptions.projectiles,
                Collection::Effects => &mut self.subscriptions.effects,
            };

            match latest_snapshot(rx) {
                Some(snapshot) => self.apply(collection, snapshot, true, now_ms, events),
                None => {
                    if let Some(snapshot) = self.latest[collection_slot(collection)].clone() {
                        self.apply(collection, snapshot, false, now_ms, events);
                    }
                }
            }
        }
    }

    fn apply(
        &mut self,
        collection: Collection,
        snapshot: StoreSnapshot,
        fresh: bool,
        now_ms: u64,
        events: &mut Vec<SessionEvent>,
    ) {
        match collection {
            Collection::Avatars => self.apply_avatars(&snapshot, fresh, now_ms, events),
            Collection::Projectiles => self.apply_projectiles(&snapshot, fresh, now_ms),
            Collection::Effects => self.apply_effects(&snapshot, fresh, now_ms),
        }
        self.latest[collection_slot(collection)] = Some(snapshot);
    }

    fn apply_avatars(&mut self, snapshot: &StoreSnapshot, fresh: bool, now_ms: u64, events: &mut Vec<SessionEvent>) {
        let self_id = self.id();
        let ttl = self.config.replication.avatar_ttl_ms;
        let diff = self
            .mirrors
            .avatars
            .reconcile(snapshot, now_ms, ttl, |id, _: &AvatarRecord| id == self_id);

        for id in diff.removed {
            if self.peers.remove(&id).is_some() {
                info!(player_id = %self_id, peer_id = %id, "Remote avatar left");
                events.push(SessionEvent::RemoteLeft(id));
            }
        }

        if !fresh {
            return;
        }
        for (id, record) in diff.added.into_iter().chain(diff.updated) {
            self.upsert_peer(id, &record, now_ms, events);
        }
    }

    fn upsert_peer(&mut self, id: PlayerId, record: &AvatarRecord, now_ms: u64, events: &mut Vec<SessionEvent>) {
        if let Some(peer) = self.peers.get(&id) {
            if peer.last_update == record.last_update {
                return;
            }
        }

        let Some((position, rotation)) = SnapshotBuilder::avatar_pose(record) else {
            warn!(peer_id = %id, "Avatar record without rotation, not applied");
            return;
        };

        match self.peers.get_mut(&id) {
            Some(peer) => {
                match peer.avatar.ingest(position, rotation, record.is_thrust_active, now_ms) {
                    Ok(()) => peer.last_update = record.last_update,
                    Err(e) => warn!(peer_id = %id, error = %e, "Rejected avatar sample"),
                }
            }
            None => {
                match Avatar::remote(id, position, rotation, record.is_thrust_active, now_ms, &self.config) {
                    Ok(avatar) => {
                        info!(player_id = %self.id(), peer_id = %id, "Remote avatar joined");
                        self.peers.insert(
                            id,
                            Peer {
                                avatar,
                                last_update: record.last_update,
                            },
                        );
                        events.push(SessionEvent::RemoteJoined(id));
                    }
                    Err(e) => warn!(peer_id = %id, error = %e, "Cannot place remote avatar"),
                }
            }
        }
    }

    fn apply_projectiles(&mut self, snapshot: &StoreSnapshot, fresh: bool, now_ms: u64) {
        let self_id = self.id();
        let ttl = self.config.replication.projectile_ttl_ms;
        let diff = self
            .mirrors
            .projectiles
            .reconcile(snapshot, now_ms, ttl, |_, record: &ProjectileRecord| record.owner_id == self_id);

        if !diff.removed.is_empty() {
            self.projectiles
                .retain(|p| p.owner_id == self_id || !diff.removed.contains(&p.id));
        }

        // Records never change after creation, so updates carry nothing new
        if !fresh {
            return;
        }
        for (id, record) in diff.added {
            match SnapshotBuilder::remote_projectile(&record, now_ms, &self.config.projectile) {
                Ok(projectile) => {
                    debug!(projectile_id = %id, owner_id = %record.owner_id, "Remote projectile");
                    self.projectiles.push(projectile);
                }
                Err(e) => warn!(projectile_id = %id, error = %e, "Cannot place remote projectile"),
            }
        }
    }

    fn apply_effects(&mut self, snapshot: &StoreSnapshot, fresh: bool, now_ms: u64) {
        let ttl = self.config.replication.effect_ttl_ms;
        let own = &self.own_effects;
        let diff = self
            .mirrors
            .effects
            .reconcile(snapshot, now_ms, ttl, |id, _: &EffectRecord| own.contains_key(&id));

        for id in diff.removed {
            self.effects.remove(&id);
        }

        if !fresh {
            return;
        }
        for (id, record) in diff.added {
            self.effects.insert(
                id,
                EffectView {
                    position: record.position.into(),
                    created_at: record.created_at,
                },
            );
        }
    }

    fn fire(&mut self, now_ms: u64, events: &mut Vec<SessionEvent>) {
        let body = &self.local.body;
        let projectile = match Projectile::fire(Uuid::new_v4(), self.id(), body.position(), body.forward(), now_ms) {
            Ok(projectile) => projectile,
            Err(e) => {
                warn!(player_id = %self.id(), error = %e, "Cannot fire");
                return;
            }
        };

        let record = SnapshotBuilder::projectile(&projectile);
        let ttl = Duration::from_millis(self.config.replication.projectile_ttl_ms);
        self.channel.create_ephemeral(projectile.id, &record, ttl);

        debug!(player_id = %self.id(), projectile_id = %projectile.id, "Fired");
        events.push(SessionEvent::Fired(projectile.id));
        self.projectiles.push(projectile);
        self.fire_cooldown = self.config.projectile.fire_cooldown;
        self.stats.shots_fired += 1;
    }

    fn update_projectiles(&mut self, dt: f32, now_ms: u64, events: &mut Vec<SessionEvent>) {
        let self_id = self.id();
        let radius = self.config.avatar_radius;

        let mut targets = Vec::with_capacity(self.peers.len() + 1);
        targets.push(HitTarget {
            id: self_id,
            position: self.local.body.position(),
            radius,
        });
        targets.extend(self.peers.iter().map(|(id, peer)| HitTarget {
            id: *id,
            position: peer.avatar.body.position(),
            radius,
        }));

        let tick = tick_projectiles(&mut self.projectiles, &targets, dt, now_ms, &self.config.projectile);

        for projectile in tick.expired {
            if projectile.owner_id == self_id {
                self.channel.retire_ephemeral(Collection::Projectiles, projectile.id);
            }
        }

        for hit in tick.hits {
            if hit.shooter_id == self_id {
                self.channel.retire_ephemeral(Collection::Projectiles, hit.projectile_id);
                self.stats.hits_dealt += 1;
            }
            if hit.target_id == self_id {
                self.stats.hits_taken += 1;
                let effect_id = Uuid::new_v4();
                let record = SnapshotBuilder::effect(effect_id, hit.position, now_ms);
                let ttl = Duration::from_millis(self.config.replication.effect_ttl_ms);
                self.channel.create_ephemeral(effect_id, &record, ttl);
                self.own_effects.insert(effect_id, now_ms);
            }
            events.push(SessionEvent::Hit(hit));
        }
    }

    fn expire_effects(&mut self, now_ms: u64) {
        let ttl = self.config.replication.effect_ttl_ms;
        self.effects
            .retain(|_, effect| age_ms(now_ms, effect.created_at) <= ttl);
        self.own_effects
            .retain(|_, created_at| age_ms(now_ms, *created_at) <= ttl);
    }

    fn refresh_stats(&mut self) {
        let channel = self.channel.stats();
        let stats = &mut self.stats;
        stats.frames += 1;
        stats.publishes = channel.publishes;
        stats.ephemeral_writes = channel.ephemeral_writes;
        stats.pending_ephemeral = self.channel.pending_ephemeral();
        stats.is_leader = channel.is_leader;
        stats.sweeps = channel.sweeps;
        stats.swept_records = channel.swept_records;
        stats.remote_avatars = self.peers.len();
        stats.projectiles = self.projectiles.len();
        stats.effects = self.effects.len();
        stats.fuel = self.local.controller.thrust_state().fuel;
        stats.height = self.local.body.height();
    }

    /// Drive the session from `input` at `frame_rate` until `shutdown` fires,
    /// then remove own records from the store
    pub async fn run<I: InputSource>(
        mut self,
        mut input: I,
        frame_rate: u32,
        registry: Arc<SessionRegistry>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let id = self.id();
        let mut ticker = interval(frame_duration(frame_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last).as_secs_f32().min(0.1);
                    last = now;

                    let frame = input.next_frame(dt);
                    for event in self.frame(&frame, dt, unix_millis()) {
                        if let SessionEvent::Hit(hit) = event {
                            if hit.target_id == id {
                                info!(player_id = %id, shooter_id = %hit.shooter_id, "Took a hit");
                            }
                        }
                    }
                    registry.upsert(self.stats.clone());
                }
                _ = shutdown.changed() => break,
            }
        }

        self.channel.shutdown();
        registry.remove(&id);
        info!(player_id = %id, frames = self.stats.frames, "Session stopped");
    }
}

fn collection_slot(collection: Collection) -> usize {
    match collection {
        Collection::Avatars => 0,
        Collection::Projectiles => 1,
        Collection::Effects => 2,
    }
}

/// Latest stats of every running session, read by the status endpoints
pub struct SessionRegistry {
    sessions: DashMap<PlayerId, SessionStats>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<SessionStats> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn upsert(&self, stats: SessionStats) {
        self.sessions.insert(stats.player_id, stats);
    }

    pub fn remove(&self, id: &PlayerId) -> Option<SessionStats> {
        self.sessions.remove(id).map(|(_, s)| s)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn all(&self) -> Vec<SessionStats> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    /// Id of the session currently acting as cleanup leader, if any
    pub fn leader(&self) -> Option<PlayerId> {
        self.sessions
            .iter()
            .find(|s| s.value().is_leader)
            .map(|s| *s.key())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
