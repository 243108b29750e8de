//! Multi-session replication through the in-process store

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use orbital_arena::config::SimConfig;
use orbital_arena::game::{InputFrame, Session, SessionEvent, SpawnPoint};
use orbital_arena::replication::ReplicationTuning;
use orbital_arena::store::{Collection, MemoryStore};
use tokio_test::assert_ok;
use uuid::Uuid;

const STEP_MS: u64 = 20;
const DT: f32 = STEP_MS as f32 / 1000.0;

fn spawn_at(angle: f32) -> SpawnPoint {
    SpawnPoint {
        direction: Vec3::new(angle.sin(), 0.0, angle.cos()),
        heading: Vec3::X,
    }
}

fn session(store: &Arc<MemoryStore>, config: &Arc<SimConfig>, spawn: SpawnPoint) -> Session<MemoryStore> {
    assert_ok!(Session::new(Uuid::new_v4(), Arc::clone(store), Arc::clone(config), spawn, 0))
}

fn count(events: &[SessionEvent], wanted: &SessionEvent) -> usize {
    events.iter().filter(|event| *event == wanted).count()
}

#[tokio::test]
async fn stalled_peer_is_dropped_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig {
        replication: ReplicationTuning {
            avatar_ttl_ms: 4_000,
            ..ReplicationTuning::default()
        },
        ..SimConfig::default()
    });
    let mut a = session(&store, &config, spawn_at(0.0));
    let mut b = session(&store, &config, spawn_at(1.0));
    let b_id = b.id();
    let idle = InputFrame::default();

    let mut seen_by_a = Vec::new();
    let mut now = 0;
    while now <= 8_000 {
        // B goes silent for five seconds, longer than the avatar TTL
        let b_alive = now < 1_000 || now >= 6_000;
        if b_alive {
            b.frame(&idle, DT, now);
        }
        seen_by_a.extend(a.frame(&idle, DT, now));

        if now == 5_500 {
            assert!(a.remote(&b_id).is_none());
            // Expired but nobody has deleted it yet
            assert!(store.get(Collection::Avatars, &b_id.to_string()).is_some());
        }
        now += STEP_MS;
    }

    assert_eq!(count(&seen_by_a, &SessionEvent::RemoteLeft(b_id)), 1);
    assert_eq!(count(&seen_by_a, &SessionEvent::RemoteJoined(b_id)), 2);
    assert!(a.remote(&b_id).is_some());
}

#[tokio::test]
async fn leader_deletes_dead_peer_within_one_check_interval() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig::default());
    let mut a = session(&store, &config, spawn_at(0.0));
    let mut b = session(&store, &config, spawn_at(1.0));
    let b_id = b.id();
    let idle = InputFrame::default();

    let mut left_at = None;
    let mut now = 0;
    while now <= 21_000 {
        // B crashes after one second without removing itself
        if now < 1_000 {
            b.frame(&idle, DT, now);
        }
        let events = a.frame(&idle, DT, now);
        if events.contains(&SessionEvent::RemoteLeft(b_id)) {
            left_at = Some(now);
        }

        if now == 15_000 {
            assert!(store.get(Collection::Avatars, &b_id.to_string()).is_some());
        }
        now += STEP_MS;
    }

    let left_at = left_at.expect("peer never left");
    assert!((10_900..=11_000).contains(&left_at), "left at {left_at}");
    assert!(store.get(Collection::Avatars, &b_id.to_string()).is_none());
    assert!(store.get(Collection::Avatars, &a.id().to_string()).is_some());
    assert!(a.channel().is_leader());
    assert_eq!(a.stats().swept_records, 1);
}

fn stored_stamp(store: &MemoryStore, id: Uuid) -> Option<u64> {
    store
        .get(Collection::Avatars, &id.to_string())
        .and_then(|record| record["lastUpdate"].as_u64())
}

#[tokio::test]
async fn store_outage_heals_on_next_publish() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig::default());
    let mut a = session(&store, &config, spawn_at(0.0));
    let mut b = session(&store, &config, spawn_at(1.0));
    let a_id = a.id();
    let idle = InputFrame::default();
    let publish_interval = config.replication.publish_interval_ms;

    let mut seen_by_b = Vec::new();
    let mut healed_at = None;
    let mut now = 0;
    while now <= 1_500 {
        // Every write is dropped between 600 and 1000 ms
        if now == 600 {
            store.set_offline(true);
        }
        if now == 1_000 {
            store.set_offline(false);
        }

        a.frame(&idle, DT, now);
        seen_by_b.extend(b.frame(&idle, DT, now));

        if now == 980 {
            assert!(stored_stamp(&store, a_id).is_some_and(|stamp| stamp < 600));
            assert!(b.remote(&a_id).is_some());
        }
        if healed_at.is_none() && stored_stamp(&store, a_id).is_some_and(|stamp| stamp >= 1_000) {
            healed_at = Some(now);
        }
        now += STEP_MS;
    }

    let healed_at = healed_at.expect("record never refreshed");
    assert!(healed_at - 1_000 <= publish_interval, "healed at {healed_at}");

    assert_eq!(count(&seen_by_b, &SessionEvent::RemoteJoined(a_id)), 1);
    assert_eq!(count(&seen_by_b, &SessionEvent::RemoteLeft(a_id)), 0);
    assert!(b.remote(&a_id).is_some());
}

#[tokio::test(start_paused = true)]
async fn shot_is_seen_and_scored_on_both_sides() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig::default());
    let mut a = session(&store, &config, spawn_at(0.0));
    let mut b = session(&store, &config, spawn_at(0.5));
    let (a_id, b_id) = (a.id(), b.id());

    let idle = InputFrame::default();
    let trigger = InputFrame {
        fire: true,
        ..Default::default()
    };

    // Let both sides see each other before firing
    a.frame(&idle, DT, 0);
    b.frame(&idle, DT, 0);

    let mut now = STEP_MS;
    let mut a_events = Vec::new();
    let mut b_events = Vec::new();
    while now <= 600 {
        // B runs first so it resolves the impact before A consumes the record
        let input = if now == STEP_MS { &trigger } else { &idle };
        b_events.extend(b.frame(&idle, DT, now));
        a_events.extend(a.frame(input, DT, now));
        now += STEP_MS;
    }

    assert_eq!(a.stats().shots_fired, 1);
    assert_eq!(a.stats().hits_dealt, 1);
    assert_eq!(b.stats().hits_taken, 1);
    assert_eq!(a.stats().hits_taken, 0);

    let hit_on_b = |event: &SessionEvent| {
        matches!(event, SessionEvent::Hit(hit) if hit.shooter_id == a_id && hit.target_id == b_id)
    };
    assert_eq!(a_events.iter().filter(|e| hit_on_b(e)).count(), 1);
    assert_eq!(b_events.iter().filter(|e| hit_on_b(e)).count(), 1);

    // The shooter retired its projectile record on impact
    assert_eq!(store.len(Collection::Projectiles), 0);
    assert!(a.projectiles().is_empty());
    assert!(b.projectiles().is_empty());

    // B published an impact effect that A mirrors
    assert_eq!(store.len(Collection::Effects), 1);
    a.frame(&idle, DT, now);
    assert_eq!(a.effects().len(), 1);
    assert!(b.effects().is_empty());

    // The effect removes itself once its TTL has run out
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(store.len(Collection::Effects), 0);
    a.frame(&idle, DT, now + STEP_MS);
    assert!(a.effects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missed_shot_record_expires_on_its_own() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig::default());
    let mut a = session(&store, &config, spawn_at(0.0));

    let trigger = InputFrame {
        fire: true,
        ..Default::default()
    };
    a.frame(&trigger, DT, 0);
    assert_eq!(store.len(Collection::Projectiles), 1);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(store.len(Collection::Projectiles), 0);
}

#[tokio::test]
async fn departing_session_cleans_up_after_itself() {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(SimConfig::default());
    let mut a = session(&store, &config, spawn_at(0.0));
    let mut b = session(&store, &config, spawn_at(1.0));
    let a_id = a.id();
    let idle = InputFrame::default();

    a.frame(&InputFrame { fire: true, ..Default::default() }, DT, 0);
    b.frame(&idle, DT, 0);
    assert!(b.remote(&a_id).is_some());

    let registry = Arc::new(orbital_arena::game::SessionRegistry::new());
    let (tx, rx) = tokio::sync::watch::channel(false);
    let pilot = orbital_arena::game::autopilot::Autopilot::new(1);
    let handle = tokio::spawn(a.run(pilot, 60, Arc::clone(&registry), rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_ok!(tx.send(true));
    assert_ok!(handle.await);

    assert!(store.get(Collection::Avatars, &a_id.to_string()).is_none());
    assert_eq!(store.len(Collection::Projectiles), 0);
    assert_eq!(registry.active_sessions(), 0);

    let events = b.frame(&idle, DT, 40);
    assert!(events.contains(&SessionEvent::RemoteLeft(a_id)));
}
