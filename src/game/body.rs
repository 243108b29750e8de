//! Orbital bodies - entities locked to the planet surface

use glam::{Quat, Vec3};

use super::surface::{self, SurfaceFrame, RADIUS_EPSILON};
use super::SimError;

/// Valid range of height above the base radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightLimits {
    pub min: f32,
    pub max: f32,
}

impl HeightLimits {
    pub fn clamp(&self, height: f32) -> f32 {
        height.clamp(self.min, self.max)
    }

    pub fn contains(&self, height: f32) -> bool {
        (self.min..=self.max).contains(&height)
    }
}

impl Default for HeightLimits {
    fn default() -> Self {
        Self { min: 0.6, max: 4.0 }
    }
}

/// A body whose position always lies on the sphere of radius
/// `planet_radius + height`.
#[derive(Debug, Clone)]
pub struct OrbitalBody {
    position: Vec3,
    orientation: Quat,
    height: f32,
    vertical_velocity: f32,
    planet_radius: f32,
    limits: HeightLimits,
}

impl OrbitalBody {
    /// Place a body at rest on the lowest allowed height, above `direction`,
    /// facing as close to `heading` as the surface allows.
    pub fn spawn(
        planet_radius: f32,
        limits: HeightLimits,
        direction: Vec3,
        heading: Vec3,
    ) -> Result<Self, SimError> {
        let height = limits.min;
        let position = surface::project_to_radius(direction, planet_radius + height)?;
        let frame = SurfaceFrame::at(position, heading)?;

        Ok(Self {
            position,
            orientation: frame.orientation(),
            height,
            vertical_velocity: 0.0,
            planet_radius,
            limits,
        })
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    pub fn planet_radius(&self) -> f32 {
        self.planet_radius
    }

    pub fn limits(&self) -> HeightLimits {
        self.limits
    }

    /// Radius the position must sit on
    pub fn target_radius(&self) -> f32 {
        self.planet_radius + self.height
    }

    pub fn frame(&self) -> SurfaceFrame {
        SurfaceFrame::from_orientation(self.orientation)
    }

    pub fn forward(&self) -> Vec3 {
        self.frame().forward
    }

    pub fn right(&self) -> Vec3 {
        self.frame().right
    }

    /// Move `angle` radians of arc toward `travel`. The heading carries over
    /// from the previous frame and only up is corrected, so the body rolls
    /// with the curvature.
    pub fn travel(&mut self, travel: Vec3, angle: f32) -> Result<(), SimError> {
        if angle == 0.0 {
            return Ok(());
        }

        let next = surface::rotate_along(self.position, travel, angle, self.target_radius())?;
        let frame = SurfaceFrame::at(next, self.forward())?;

        self.position = next;
        self.orientation = frame.orientation();
        Ok(())
    }

    /// Turn in place about the local up axis
    pub fn turn(&mut self, angle: f32) {
        if angle == 0.0 || !angle.is_finite() {
            return;
        }
        self.orientation = self.frame().turned(angle).orientation();
    }

    /// Integrate vertical motion under `acceleration` for `dt` seconds.
    ///
    /// Leaving the height range clamps the height and zeroes the vertical
    /// velocity (no bounce). Returns whether a bound was hit.
    pub fn integrate_vertical(&mut self, acceleration: f32, dt: f32) -> Result<bool, SimError> {
        if !(acceleration.is_finite() && dt.is_finite()) {
            return Err(SimError::NonFinite("vertical integration"));
        }

        let velocity = self.vertical_velocity + acceleration * dt;
        let raw = self.height + velocity * dt;
        let height = self.limits.clamp(raw);
        let hit_bound = height != raw;

        let position = surface::project_to_radius(self.position, self.planet_radius + height)?;
        self.position = position;
        self.height = height;
        self.vertical_velocity = if hit_bound { 0.0 } else { velocity };
        Ok(hit_bound)
    }

    /// Change height directly, clamped, keeping the body on its new radius
    pub fn set_height(&mut self, height: f32) -> Result<(), SimError> {
        if !height.is_finite() {
            return Err(SimError::NonFinite("height"));
        }
        let height = self.limits.clamp(height);
        self.position = surface::project_to_radius(self.position, self.planet_radius + height)?;
        self.height = height;
        Ok(())
    }

    /// Overwrite the whole pose, as remote reconstruction does each frame
    pub fn set_pose(&mut self, position: Vec3, orientation: Quat, height: f32) -> Result<(), SimError> {
        if !height.is_finite() {
            return Err(SimError::NonFinite("height"));
        }
        if !orientation.is_finite() || orientation.length_squared() < 1e-6 {
            return Err(SimError::InvalidOrientation);
        }

        let height = self.limits.clamp(height);
        let position = surface::project_to_radius(position, self.planet_radius + height)?;

        self.position = position;
        self.orientation = orientation.normalize();
        self.height = height;
        Ok(())
    }

    /// Distance between the position's radius and where it should be
    pub fn surface_error(&self) -> f32 {
        (self.position.length() - self.target_radius()).abs()
    }

    pub fn check_surface_lock(&self) -> Result<(), SimError> {
        let drift = self.surface_error();
        if drift.is_finite() && drift < RADIUS_EPSILON {
            Ok(())
        } else {
            Err(SimError::RadiusDrift { drift })
        }
    }
}
