//! Projectile kinematics and hit detection
//!
//! Projectiles travel great-circle arcs at a fixed angular speed around the
//! axis captured when they were fired.

use glam::Vec3;
use tracing::{info, warn};
use uuid::Uuid;

use crate::util::time::age_ms;

use super::surface;
use super::{PlayerId, SimError};

/// Weapon and projectile constants
#[derive(Debug, Clone, Copy)]
pub struct ProjectileTuning {
    /// Arc travelled per second (radians)
    pub angular_speed: f32,
    /// Lifespan from creation (matches the projectile record TTL)
    pub lifespan_ms: u64,
    /// Projectile hitbox radius
    pub radius: f32,
    /// Minimum time between two shots of one avatar (seconds)
    pub fire_cooldown: f32,
}

impl Default for ProjectileTuning {
    fn default() -> Self {
        Self {
            angular_speed: 2.0,
            lifespan_ms: 2_000,
            radius: 0.2,
            fire_cooldown: 0.25,
        }
    }
}

/// Active projectile, fired locally or mirrored from a peer
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_id: PlayerId,
    position: Vec3,
    /// Initial travel direction, as published
    direction: Vec3,
    /// Rotation axis captured at fire time
    axis: Vec3,
    orbit_radius: f32,
    pub created_at: u64,
}

impl Projectile {
    /// Create a projectile at `position` heading along `direction`
    pub fn fire(
        id: Uuid,
        owner_id: PlayerId,
        position: Vec3,
        direction: Vec3,
        created_at: u64,
    ) -> Result<Self, SimError> {
        let up = surface::outward_normal(position)?;
        let axis = surface::tangent_axis(direction, up)?;

        Ok(Self {
            id,
            owner_id,
            position,
            direction,
            axis,
            orbit_radius: position.length(),
            created_at,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Move along the arc by `dt` seconds of flight
    pub fn advance(&mut self, dt: f32, tuning: &ProjectileTuning) -> Result<(), SimError> {
        self.position = surface::rotate_about(
            self.position,
            self.axis,
            tuning.angular_speed * dt,
            self.orbit_radius,
        )?;
        Ok(())
    }

    pub fn is_expired(&self, now_ms: u64, tuning: &ProjectileTuning) -> bool {
        age_ms(now_ms, self.created_at) >= tuning.lifespan_ms
    }

    /// Check collision with a target sphere
    pub fn check_hit(&self, target: Vec3, target_radius: f32, tuning: &ProjectileTuning) -> bool {
        let combined = tuning.radius + target_radius;
        self.position.distance_squared(target) <= combined * combined
    }
}

/// Something a projectile can hit this frame
#[derive(Debug, Clone, Copy)]
pub struct HitTarget {
    pub id: PlayerId,
    pub position: Vec3,
    pub radius: f32,
}

/// Hit result from combat resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub projectile_id: Uuid,
    pub shooter_id: PlayerId,
    pub target_id: PlayerId,
    pub position: Vec3,
}

/// What one projectile pass produced
#[derive(Debug, Default)]
pub struct ProjectileTick {
    pub hits: Vec<Hit>,
    pub expired: Vec<Projectile>,
}

/// Advance every projectile, retire expired ones and resolve hits.
///
/// Each projectile hits at most one target per pass (the first qualifying
/// one) and is removed from `projectiles` as soon as it does. A projectile
/// never hits its owner.
pub fn tick_projectiles<'a>(
    projectiles: &mut Vec<Projectile>,
    targets: impl IntoIterator<Item = &'a HitTarget> + Clone,
    dt: f32,
    now_ms: u64,
    tuning: &ProjectileTuning,
) -> ProjectileTick {
    let mut tick = ProjectileTick::default();
    let mut survivors = Vec::with_capacity(projectiles.len());

    for mut projectile in projectiles.drain(..) {
        if projectile.is_expired(now_ms, tuning) {
            tick.expired.push(projectile);
            continue;
        }

        if let Err(e) = projectile.advance(dt, tuning) {
            warn!(projectile_id = %projectile.id, error = %e, "Dropping projectile");
            tick.expired.push(projectile);
            continue;
        }

        let hit = targets
            .clone()
            .into_iter()
            .filter(|target| target.id != projectile.owner_id)
            .find(|target| projectile.check_hit(target.position, target.radius, tuning));

        match hit {
            Some(target) => {
                info!(
                    projectile_id = %projectile.id,
                    shooter_id = %projectile.owner_id,
                    target_id = %target.id,
                    "Projectile hit"
                );
                tick.hits.push(Hit {
                    projectile_id: projectile.id,
                    shooter_id: projectile.owner_id,
                    target_id: target.id,
                    position: projectile.position,
                });
            }
            None => survivors.push(projectile),
        }
    }

    *projectiles = survivors;
    tick
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORBIT: f32 = 5.6;

    fn shot(owner: PlayerId) -> Projectile {
        Projectile::fire(Uuid::new_v4(), owner, Vec3::Z * ORBIT, Vec3::X, 0).unwrap()
    }

    #[test]
    fn travels_great_circle_at_fixed_speed() {
        let tuning = ProjectileTuning::default();
        let mut projectile = shot(Uuid::new_v4());
        let start = projectile.position();

        for _ in 0..60 {
            projectile.advance(1.0 / 60.0, &tuning).unwrap();
            assert!((projectile.position().length() - ORBIT).abs() < 1e-3);
            assert!(projectile.position().y.abs() < 1e-4);
        }
        let travelled = surface::arc_angle(start, projectile.position());
        assert!((travelled - tuning.angular_speed).abs() < 1e-3);
    }

    #[test]
    fn survives_past_a_quarter_orbit() {
        let tuning = ProjectileTuning::default();
        let mut projectile = shot(Uuid::new_v4());
        for _ in 0..50 {
            projectile.advance(0.02, &tuning).unwrap();
        }
        // 2 rad of arc: beyond the point where the original heading is radial
        assert!(projectile.position().x > 0.0);
        assert!(projectile.position().z < 0.0);
    }

    #[test]
    fn expires_after_lifespan() {
        let tuning = ProjectileTuning::default();
        let projectile = shot(Uuid::new_v4());
        assert!(!projectile.is_expired(1_999, &tuning));
        assert!(projectile.is_expired(2_000, &tuning));
    }

    #[test]
    fn owner_is_never_hit() {
        let tuning = ProjectileTuning::default();
        let owner = Uuid::new_v4();
        let mut projectiles = vec![shot(owner)];
        let targets = [HitTarget {
            id: owner,
            position: Vec3::Z * ORBIT,
            radius: 1.0,
        }];

        let tick = tick_projectiles(&mut projectiles, &targets, 0.0, 10, &tuning);
        assert!(tick.hits.is_empty());
        assert_eq!(projectiles.len(), 1);
    }

    #[test]
    fn first_target_wins_and_projectile_retires() {
        let tuning = ProjectileTuning::default();
        let owner = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut projectiles = vec![shot(owner)];
        let targets = [
            HitTarget { id: owner, position: Vec3::Z * ORBIT, radius: 1.0 },
            HitTarget { id: first, position: Vec3::Z * ORBIT, radius: 1.0 },
            HitTarget { id: second, position: Vec3::Z * ORBIT, radius: 1.0 },
        ];

        let tick = tick_projectiles(&mut projectiles, &targets, 0.0, 10, &tuning);
        assert_eq!(tick.hits.len(), 1);
        assert_eq!(tick.hits[0].target_id, first);
        assert!(projectiles.is_empty());

        let again = tick_projectiles(&mut projectiles, &targets, 0.0, 20, &tuning);
        assert!(again.hits.is_empty());
    }

    #[test]
    fn expired_projectiles_are_reported() {
        let tuning = ProjectileTuning::default();
        let mut projectiles = vec![shot(Uuid::new_v4())];
        let no_targets: Vec<HitTarget> = Vec::new();
        let tick = tick_projectiles(&mut projectiles, &no_targets, 0.016, 5_000, &tuning);
        assert_eq!(tick.expired.len(), 1);
        assert!(projectiles.is_empty());
    }
}
