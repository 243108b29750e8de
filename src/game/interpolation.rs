//! Remote pose reconstruction from sparse snapshots
//!
//! Peers publish at most ~30 times a second and samples arrive with jitter,
//! gaps and the occasional duplicate. Each frame the remote body moves a
//! bounded step toward the latest sample, helped along by a smoothed
//! velocity estimate, so motion stays continuous between samples without
//! ever passing the last known target.

use glam::{Quat, Vec3};

use crate::util::time::ms_to_secs;

use super::body::{HeightLimits, OrbitalBody};
use super::surface;
use super::SimError;

#[derive(Debug, Clone, Copy)]
pub struct InterpolationTuning {
    /// Fraction of the remaining height gap closed per frame
    pub height_smoothing: f32,
    /// Weight of the vertical velocity estimate in the height step
    pub vertical_prediction: f32,
    /// Fraction of the remaining distance closed per frame
    pub position_smoothing: f32,
    /// Seconds of estimated velocity added to each position step
    pub velocity_factor: f32,
    /// Upper bound on lateral travel per second (world units)
    pub interpolation_speed: f32,
    /// Slerp rate toward the target rotation (per second)
    pub rotation_speed: f32,
    /// Weight of a fresh finite difference in the velocity estimate
    pub velocity_blend: f32,
    /// Distances below this count as arrived
    pub arrival_epsilon: f32,
}

impl Default for InterpolationTuning {
    fn default() -> Self {
        Self {
            height_smoothing: 0.2,
            vertical_prediction: 0.5,
            position_smoothing: 0.15,
            velocity_factor: 0.05,
            interpolation_speed: 8.0,
            rotation_speed: 10.0,
            velocity_blend: 0.3,
            arrival_epsilon: 1e-4,
        }
    }
}

/// Latest snapshot of a remote body plus the motion estimated from the
/// samples received so far.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSample {
    pub target_position: Vec3,
    pub target_rotation: Quat,
    pub target_height: f32,
    /// Local receive time (ms), not the sender's timestamp
    pub received_at: u64,
    pub estimated_velocity: Vec3,
    pub estimated_vertical_velocity: f32,
}

#[derive(Debug, Clone)]
pub struct RemoteStateInterpolator {
    tuning: InterpolationTuning,
    planet_radius: f32,
    limits: HeightLimits,
    latest: Option<RemoteSample>,
}

impl RemoteStateInterpolator {
    pub fn new(tuning: InterpolationTuning, planet_radius: f32, limits: HeightLimits) -> Self {
        Self {
            tuning,
            planet_radius,
            limits,
            latest: None,
        }
    }

    pub fn latest(&self) -> Option<&RemoteSample> {
        self.latest.as_ref()
    }

    /// Record a new sample. Velocity is finite-differenced against the
    /// previously received sample; a sample that arrives in the same
    /// millisecond as the last keeps the old estimate.
    pub fn ingest(&mut self, position: Vec3, rotation: Quat, received_at: u64) -> Result<(), SimError> {
        if !position.is_finite() {
            return Err(SimError::NonFinite("sample position"));
        }
        if !rotation.is_finite() || rotation.length_squared() < 1e-6 {
            return Err(SimError::InvalidOrientation);
        }
        surface::outward_normal(position)?;

        let target_height = self.limits.clamp(position.length() - self.planet_radius);
        let blend = self.tuning.velocity_blend;

        let (estimated_velocity, estimated_vertical_velocity) = match &self.latest {
            Some(prev) if received_at > prev.received_at => {
                let dt = ms_to_secs(received_at - prev.received_at);
                let velocity = (position - prev.target_position) / dt;
                let vertical = (target_height - prev.target_height) / dt;
                (
                    prev.estimated_velocity * (1.0 - blend) + velocity * blend,
                    prev.estimated_vertical_velocity * (1.0 - blend) + vertical * blend,
                )
            }
            Some(prev) => (prev.estimated_velocity, prev.estimated_vertical_velocity),
            None => (Vec3::ZERO, 0.0),
        };

        self.latest = Some(RemoteSample {
            target_position: position,
            target_rotation: rotation.normalize(),
            target_height,
            received_at,
            estimated_velocity,
            estimated_vertical_velocity,
        });
        Ok(())
    }

    /// Move `body` one frame toward the latest sample
    pub fn advance(&self, body: &mut OrbitalBody, dt: f32) -> Result<(), SimError> {
        let Some(sample) = &self.latest else {
            return Ok(());
        };
        let tuning = &self.tuning;

        let bound = tuning.interpolation_speed * dt;
        let current_height = body.height();
        let mut rise = self.next_height(current_height, sample, dt) - current_height;

        let current = body.position();
        let to_target = sample.target_position - current;
        let distance = to_target.length();

        let mut angle = if distance > tuning.arrival_epsilon {
            let direction = to_target / distance;
            let predicted = sample.estimated_velocity.dot(direction).max(0.0) * tuning.velocity_factor;
            let step = (distance * tuning.position_smoothing + predicted).min(bound).min(distance);

            let remaining = surface::arc_angle(current, sample.target_position);
            (step / current.length()).min(remaining)
        } else {
            0.0
        };

        // Lateral arc and height change share one displacement budget. The
        // arc is measured on the outer of the two radii so the chord between
        // old and new position can only be shorter.
        let outer = self.planet_radius + current_height.max(current_height + rise);
        let combined = (angle * outer).hypot(rise);
        if combined > bound {
            let scale = if combined > 0.0 { bound / combined } else { 0.0 };
            angle *= scale;
            rise *= scale;
        }

        let height = self.limits.clamp(current_height + rise);
        let radius = self.planet_radius + height;

        let position = if angle > 0.0 {
            match surface::rotate_along(current, to_target, angle, radius) {
                Ok(position) => position,
                // Purely radial gap: only the height has to move
                Err(SimError::DegenerateTravel) => surface::project_to_radius(current, radius)?,
                Err(e) => return Err(e),
            }
        } else {
            surface::project_to_radius(current, radius)?
        };

        let alpha = (tuning.rotation_speed * dt).min(1.0);
        let rotation = body.orientation().slerp(sample.target_rotation, alpha);

        body.set_pose(position, rotation, height)
    }

    /// Exponential approach plus a velocity-predicted term, never crossing
    /// the target
    fn next_height(&self, height: f32, sample: &RemoteSample, dt: f32) -> f32 {
        let gap = sample.target_height - height;
        let step = gap * self.tuning.height_smoothing
            + sample.estimated_vertical_velocity * dt * self.tuning.vertical_prediction;
        let step = if gap >= 0.0 {
            step.clamp(0.0, gap)
        } else {
            step.clamp(gap, 0.0)
        };
        self.limits.clamp(height + step)
    }
}
