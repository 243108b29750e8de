//! Local surface frame on a sphere centred at the origin
//!
//! All lateral motion in the simulation goes through [`rotate_along`] or
//! [`rotate_about`]: a point is rotated about an axis through the planet
//! centre and then re-projected to its exact target radius, so it travels
//! along a great circle and never accumulates radius drift.

use glam::{Mat3, Quat, Vec3};

use super::SimError;

/// Tolerance for surface-lock checks (world units)
pub const RADIUS_EPSILON: f32 = 1e-3;

const DEGENERATE_EPSILON: f32 = 1e-10;

/// Orthonormal basis at a point on the sphere.
///
/// Local axes map onto the orientation quaternion as `right = +X`,
/// `up = +Y`, `forward = +Z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceFrame {
    pub up: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
}

impl SurfaceFrame {
    /// Build the frame at `position`, keeping `forward_hint` as close as the
    /// new up vector allows.
    pub fn at(position: Vec3, forward_hint: Vec3) -> Result<Self, SimError> {
        let up = outward_normal(position)?;
        let right = up.cross(forward_hint);
        let right = if right.length_squared() > DEGENERATE_EPSILON {
            right.normalize()
        } else {
            // Hint is parallel to up: any tangent heading will do
            up.cross(up.any_orthonormal_vector()).normalize()
        };
        let forward = right.cross(up);
        Ok(Self { up, forward, right })
    }

    /// Read the basis back out of an orientation
    pub fn from_orientation(orientation: Quat) -> Self {
        Self {
            up: orientation * Vec3::Y,
            forward: orientation * Vec3::Z,
            right: orientation * Vec3::X,
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_mat3(&Mat3::from_cols(self.right, self.up, self.forward)).normalize()
    }

    /// Turn in place: rotate forward and right about up by a signed angle
    pub fn turned(&self, angle: f32) -> Self {
        let yaw = Quat::from_axis_angle(self.up, angle);
        Self {
            up: self.up,
            forward: (yaw * self.forward).normalize(),
            right: (yaw * self.right).normalize(),
        }
    }
}

/// Outward radial direction at `position`
pub fn outward_normal(position: Vec3) -> Result<Vec3, SimError> {
    position
        .try_normalize()
        .ok_or(SimError::DegeneratePosition(position))
}

/// Axis that carries a point with normal `up` along `travel`
pub fn tangent_axis(travel: Vec3, up: Vec3) -> Result<Vec3, SimError> {
    let axis = travel.cross(-up);
    if axis.is_finite() && axis.length_squared() > DEGENERATE_EPSILON {
        Ok(axis.normalize())
    } else {
        Err(SimError::DegenerateTravel)
    }
}

/// Scale `position` onto the sphere of the given radius
pub fn project_to_radius(position: Vec3, radius: f32) -> Result<Vec3, SimError> {
    if !radius.is_finite() {
        return Err(SimError::NonFinite("radius"));
    }
    Ok(outward_normal(position)? * radius)
}

/// Rotate `position` about a fixed axis through the centre, then re-project
pub fn rotate_about(position: Vec3, axis: Vec3, angle: f32, radius: f32) -> Result<Vec3, SimError> {
    if !angle.is_finite() {
        return Err(SimError::NonFinite("angle"));
    }
    project_to_radius(Quat::from_axis_angle(axis, angle) * position, radius)
}

/// Move `position` by `angle` radians of arc in the direction of `travel`
pub fn rotate_along(position: Vec3, travel: Vec3, angle: f32, radius: f32) -> Result<Vec3, SimError> {
    let up = outward_normal(position)?;
    let axis = tangent_axis(travel, up)?;
    rotate_about(position, axis, angle, radius)
}

/// Central angle between two points, accurate for small separations
pub fn arc_angle(a: Vec3, b: Vec3) -> f32 {
    a.cross(b).length().atan2(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_orthonormal(frame: &SurfaceFrame) {
        assert!((frame.up.length() - 1.0).abs() < 1e-5);
        assert!((frame.forward.length() - 1.0).abs() < 1e-5);
        assert!((frame.right.length() - 1.0).abs() < 1e-5);
        assert!(frame.up.dot(frame.forward).abs() < 1e-5);
        assert!(frame.up.dot(frame.right).abs() < 1e-5);
        assert!(frame.forward.dot(frame.right).abs() < 1e-5);
    }

    #[test]
    fn frame_keeps_forward_hint_tangent() {
        let frame = SurfaceFrame::at(Vec3::new(0.0, 0.0, 5.6), Vec3::X).unwrap();
        assert_orthonormal(&frame);
        assert!((frame.up - Vec3::Z).length() < 1e-6);
        assert!((frame.forward - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn frame_survives_hint_parallel_to_up() {
        let frame = SurfaceFrame::at(Vec3::new(0.0, 3.0, 0.0), Vec3::Y).unwrap();
        assert_orthonormal(&frame);
    }

    #[test]
    fn orientation_round_trips_basis() {
        let frame = SurfaceFrame::at(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.3, -1.0, 0.2)).unwrap();
        let back = SurfaceFrame::from_orientation(frame.orientation());
        assert!((back.up - frame.up).length() < 1e-5);
        assert!((back.forward - frame.forward).length() < 1e-5);
        assert!((back.right - frame.right).length() < 1e-5);
    }

    #[test]
    fn turning_keeps_up_and_position_basis() {
        let frame = SurfaceFrame::at(Vec3::new(0.0, 0.0, 5.6), Vec3::X).unwrap();
        let turned = frame.turned(std::f32::consts::FRAC_PI_2);
        assert_orthonormal(&turned);
        assert_eq!(turned.up, frame.up);
        assert!(turned.forward.dot(frame.forward).abs() < 1e-5);
    }

    #[test]
    fn tangent_rotation_stays_on_sphere() {
        let radius = 5.6;
        let mut position = Vec3::new(1.0, -2.0, 4.0).normalize() * radius;
        for step in 0..1_000 {
            let travel = if step % 2 == 0 {
                Vec3::new(0.4, 1.0, 0.3)
            } else {
                position.cross(Vec3::Y)
            };
            position = rotate_along(position, travel, 0.013, radius).unwrap();
            assert!((position.length() - radius).abs() < RADIUS_EPSILON);
        }
    }

    #[test]
    fn rotation_moves_toward_travel_direction() {
        let start = Vec3::new(0.0, 0.0, 5.0);
        let moved = rotate_along(start, Vec3::X, 0.1, 5.0).unwrap();
        assert!(moved.x > 0.0);
        assert!((arc_angle(start, moved) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn radial_travel_is_rejected() {
        let result = rotate_along(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, 0.1, 5.0);
        assert_eq!(result, Err(SimError::DegenerateTravel));
    }

    #[test]
    fn origin_has_no_normal() {
        assert!(matches!(
            outward_normal(Vec3::ZERO),
            Err(SimError::DegeneratePosition(_))
        ));
    }
}
