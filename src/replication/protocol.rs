//! Wire records stored in the shared collections
//! Field names are camelCase to match what every peer writes.

use glam::{Quat, Vec3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::Collection;

/// `{x, y, z}` vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for WireVec3 {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// `{x, y, z, w}` quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl From<Quat> for WireQuat {
    fn from(q: Quat) -> Self {
        Self { x: q.x, y: q.y, z: q.z, w: q.w }
    }
}

impl From<WireQuat> for Quat {
    fn from(q: WireQuat) -> Self {
        Quat::from_xyzw(q.x, q.y, q.z, q.w)
    }
}

/// Avatar state, keyed by the participant's id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarRecord {
    pub position: WireVec3,
    /// Peers occasionally publish without a rotation; such samples are not applied
    #[serde(default)]
    pub rotation: Option<WireQuat>,
    #[serde(default)]
    pub is_thrust_active: bool,
    /// Sender clock (epoch ms)
    pub last_update: u64,
}

/// Projectile spawn, keyed by the projectile id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileRecord {
    pub id: Uuid,
    pub position: WireVec3,
    pub direction: WireVec3,
    pub owner_id: Uuid,
    pub created_at: u64,
}

/// Transient hit effect, keyed by the effect id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectRecord {
    pub id: Uuid,
    pub position: WireVec3,
    pub created_at: u64,
}

/// A record type living in one of the shared collections
pub trait Replicated: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Timestamp the record's age is measured from
    fn stamp(&self) -> u64;

    fn encode(&self) -> Result<Value, RecordError> {
        serde_json::to_value(self).map_err(RecordError::Malformed)
    }

    fn decode(value: &Value) -> Result<Self, RecordError> {
        Self::deserialize(value).map_err(RecordError::Malformed)
    }
}

impl Replicated for AvatarRecord {
    const COLLECTION: Collection = Collection::Avatars;

    fn stamp(&self) -> u64 {
        self.last_update
    }
}

impl Replicated for ProjectileRecord {
    const COLLECTION: Collection = Collection::Projectiles;

    fn stamp(&self) -> u64 {
        self.created_at
    }
}

impl Replicated for EffectRecord {
    const COLLECTION: Collection = Collection::Effects;

    fn stamp(&self) -> u64 {
        self.created_at
    }
}

/// Parse a store key as an entity id
pub fn parse_key(key: &str) -> Result<Uuid, RecordError> {
    Uuid::parse_str(key).map_err(|_| RecordError::InvalidKey(key.to_string()))
}

/// Wire decode errors
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("record key {0:?} is not an id")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn avatar_record_uses_camel_case() {
        let record = AvatarRecord {
            position: Vec3::new(1.0, 2.0, 3.0).into(),
            rotation: Some(Quat::IDENTITY.into()),
            is_thrust_active: true,
            last_update: 42,
        };
        let value = record.encode().unwrap();
        assert_eq!(value["isThrustActive"], json!(true));
        assert_eq!(value["lastUpdate"], json!(42));
        assert_eq!(value["rotation"]["w"], json!(1.0));
    }

    #[test]
    fn avatar_record_tolerates_missing_rotation() {
        let value = json!({
            "position": {"x": 0.0, "y": 0.0, "z": 5.6},
            "lastUpdate": 10
        });
        let record = AvatarRecord::decode(&value).unwrap();
        assert!(record.rotation.is_none());
        assert!(!record.is_thrust_active);
    }

    #[test]
    fn projectile_record_requires_owner() {
        let value = json!({
            "id": Uuid::new_v4(),
            "position": {"x": 0.0, "y": 0.0, "z": 5.6},
            "direction": {"x": 1.0, "y": 0.0, "z": 0.0},
            "createdAt": 10
        });
        assert!(matches!(
            ProjectileRecord::decode(&value),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn bad_key_is_rejected() {
        assert!(matches!(parse_key("not-an-id"), Err(RecordError::InvalidKey(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_key(&id.to_string()).unwrap(), id);
    }
}
