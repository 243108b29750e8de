//! Conversion between simulated bodies and wire records

use glam::{Quat, Vec3};
use uuid::Uuid;

use crate::replication::protocol::{AvatarRecord, EffectRecord, ProjectileRecord};
use crate::util::time::{age_ms, ms_to_secs};

use super::body::OrbitalBody;
use super::projectile::{Projectile, ProjectileTuning};
use super::SimError;

/// Builds outgoing records and reads incoming ones
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Own avatar state as published
    pub fn avatar(body: &OrbitalBody, thrust_active: bool, now_ms: u64) -> AvatarRecord {
        AvatarRecord {
            position: body.position().into(),
            rotation: Some(body.orientation().into()),
            is_thrust_active: thrust_active,
            last_update: now_ms,
        }
    }

    pub fn projectile(projectile: &Projectile) -> ProjectileRecord {
        ProjectileRecord {
            id: projectile.id,
            position: projectile.position().into(),
            direction: projectile.direction().into(),
            owner_id: projectile.owner_id,
            created_at: projectile.created_at,
        }
    }

    pub fn effect(id: Uuid, position: Vec3, now_ms: u64) -> EffectRecord {
        EffectRecord {
            id,
            position: position.into(),
            created_at: now_ms,
        }
    }

    /// Pose carried by an avatar record; `None` when the rotation is missing
    pub fn avatar_pose(record: &AvatarRecord) -> Option<(Vec3, Quat)> {
        let rotation = record.rotation?;
        Some((record.position.into(), rotation.into()))
    }

    /// Rebuild a peer's projectile and fast-forward it by its age so every
    /// client agrees on where it is now
    pub fn remote_projectile(
        record: &ProjectileRecord,
        now_ms: u64,
        tuning: &ProjectileTuning,
    ) -> Result<Projectile, SimError> {
        let mut projectile = Projectile::fire(
            record.id,
            record.owner_id,
            record.position.into(),
            record.direction.into(),
            record.created_at,
        )?;

        let age = age_ms(now_ms, record.created_at);
        if age > 0 {
            projectile.advance(ms_to_secs(age), tuning)?;
        }
        Ok(projectile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::HeightLimits;
    use crate::game::surface;

    #[test]
    fn avatar_record_carries_pose() {
        let body = OrbitalBody::spawn(5.0, HeightLimits::default(), Vec3::Y, Vec3::X).unwrap();
        let record = SnapshotBuilder::avatar(&body, true, 1_234);
        let (position, rotation) = SnapshotBuilder::avatar_pose(&record).unwrap();

        assert_eq!(position, body.position());
        assert!(rotation.abs_diff_eq(body.orientation(), 1e-6));
        assert!(record.is_thrust_active);
        assert_eq!(record.last_update, 1_234);
    }

    #[test]
    fn missing_rotation_yields_no_pose() {
        let record = AvatarRecord {
            position: Vec3::Z.into(),
            rotation: None,
            is_thrust_active: false,
            last_update: 0,
        };
        assert!(SnapshotBuilder::avatar_pose(&record).is_none());
    }

    #[test]
    fn remote_projectile_catches_up_by_age() {
        let tuning = ProjectileTuning::default();
        let record = ProjectileRecord {
            id: Uuid::new_v4(),
            position: (Vec3::Z * 5.6).into(),
            direction: Vec3::X.into(),
            owner_id: Uuid::new_v4(),
            created_at: 1_000,
        };

        let projectile = SnapshotBuilder::remote_projectile(&record, 1_250, &tuning).unwrap();
        let travelled = surface::arc_angle(Vec3::Z, projectile.position());
        assert!((travelled - tuning.angular_speed * 0.25).abs() < 1e-3);
        assert!(projectile.position().x > 0.0);
    }
}
