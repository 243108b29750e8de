//! Simulation modules

pub mod autopilot;
pub mod body;
pub mod controller;
pub mod interpolation;
pub mod projectile;
pub mod session;
pub mod snapshot;
pub mod surface;
pub mod thrust;

pub use body::{HeightLimits, OrbitalBody};
pub use controller::{Avatar, BodyController, LocalControlled, RemoteInterpolated};
pub use session::{Session, SessionEvent, SessionRegistry, SessionStats, SpawnPoint};

use glam::Vec3;
use uuid::Uuid;

/// Identity of a participant (also the key of its avatar record)
pub type PlayerId = Uuid;

/// Input state for a single frame, sampled once by the input collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputFrame {
    /// Forward/back intent (-1.0 = full back, 1.0 = full forward)
    pub forward: f32,
    /// Strafe intent (-1.0 = full left, 1.0 = full right)
    pub strafe: f32,
    /// Pointer delta for turning in place, in pointer units
    pub turn_delta: f32,
    /// Vertical thrust held this frame
    pub thrust: bool,
    /// Fire trigger held this frame
    pub fire: bool,
}

impl InputFrame {
    /// Clamp analog axes to their valid range; non-finite values become zero
    pub fn clamped(self) -> Self {
        let axis = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        Self {
            forward: axis(self.forward),
            strafe: axis(self.strafe),
            turn_delta: if self.turn_delta.is_finite() { self.turn_delta } else { 0.0 },
            ..self
        }
    }
}

/// Source of per-frame input for a locally controlled avatar
pub trait InputSource {
    fn next_frame(&mut self, dt: f32) -> InputFrame;
}

/// Lateral movement constants
#[derive(Debug, Clone, Copy)]
pub struct MovementTuning {
    /// Arc travelled per second at full intent (radians)
    pub move_speed: f32,
    /// Radians of heading change per pointer unit
    pub turn_sensitivity: f32,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            move_speed: 1.0,
            turn_sensitivity: 0.002,
        }
    }
}

/// Simulation invariant violations. None of these are fatal: the caller
/// skips the affected body for the frame.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("position {0} has no outward direction")]
    DegeneratePosition(Vec3),

    #[error("travel direction is parallel to the surface normal")]
    DegenerateTravel,

    #[error("orientation is missing or not a rotation")]
    InvalidOrientation,

    #[error("radius drift of {drift} exceeds tolerance")]
    RadiusDrift { drift: f32 },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}
