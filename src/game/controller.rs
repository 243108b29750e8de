//! Body controllers - who drives an avatar's pose
//!
//! The local player's avatar is simulated from input; every peer's avatar is
//! reconstructed from replicated samples. The choice is made once, at
//! construction, by the controller type an [`Avatar`] is built with.

use glam::{Quat, Vec3};

use super::body::OrbitalBody;
use super::interpolation::{InterpolationTuning, RemoteStateInterpolator};
use super::thrust::{ThrustController, ThrustState, ThrustTuning};
use super::{InputFrame, MovementTuning, PlayerId, SimError};
use crate::config::SimConfig;

/// Per-frame driver of an [`OrbitalBody`]
pub trait BodyController {
    /// Advance `body` by `dt` seconds
    fn step(&mut self, body: &mut OrbitalBody, input: &InputFrame, dt: f32) -> Result<(), SimError>;

    /// Whether the body should render its thrust effect
    fn thrust_active(&self) -> bool;
}

/// Input-driven controller for the player's own avatar
#[derive(Debug, Clone)]
pub struct LocalControlled {
    movement: MovementTuning,
    thrust: ThrustController,
}

impl LocalControlled {
    pub fn new(movement: MovementTuning, thrust: ThrustTuning) -> Self {
        Self {
            movement,
            thrust: ThrustController::new(thrust),
        }
    }

    pub fn thrust_state(&self) -> ThrustState {
        self.thrust.state()
    }
}

impl BodyController for LocalControlled {
    fn step(&mut self, body: &mut OrbitalBody, input: &InputFrame, dt: f32) -> Result<(), SimError> {
        let input = input.clamped();

        body.turn(input.turn_delta * self.movement.turn_sensitivity);

        let frame = body.frame();
        let travel = frame.forward * input.forward + frame.right * input.strafe;
        let intent = travel.length().min(1.0);
        if intent > f32::EPSILON {
            body.travel(travel, self.movement.move_speed * intent * dt)?;
        }

        self.thrust.step(input.thrust, body, dt)
    }

    fn thrust_active(&self) -> bool {
        self.thrust.is_active()
    }
}

/// Sample-driven controller for a peer's avatar
#[derive(Debug, Clone)]
pub struct RemoteInterpolated {
    interpolator: RemoteStateInterpolator,
    thrust_active: bool,
}

impl RemoteInterpolated {
    pub fn new(tuning: InterpolationTuning, planet_radius: f32, body: &OrbitalBody) -> Self {
        Self {
            interpolator: RemoteStateInterpolator::new(tuning, planet_radius, body.limits()),
            thrust_active: false,
        }
    }

    /// Feed a received sample. The thrust flag is mirrored for visuals only.
    pub fn ingest(
        &mut self,
        position: Vec3,
        rotation: Quat,
        thrust_active: bool,
        received_at: u64,
    ) -> Result<(), SimError> {
        self.interpolator.ingest(position, rotation, received_at)?;
        self.thrust_active = thrust_active;
        Ok(())
    }

}

impl BodyController for RemoteInterpolated {
    fn step(&mut self, body: &mut OrbitalBody, _input: &InputFrame, dt: f32) -> Result<(), SimError> {
        self.interpolator.advance(body, dt)
    }

    fn thrust_active(&self) -> bool {
        self.thrust_active
    }
}

/// An avatar body together with the controller that owns its motion
#[derive(Debug, Clone)]
pub struct Avatar<C: BodyController> {
    pub id: PlayerId,
    pub body: OrbitalBody,
    pub controller: C,
}

impl<C: BodyController + Clone> Avatar<C> {
    /// Advance one frame. On any invariant violation the body and its
    /// controller keep their previous state and the error is returned for
    /// the caller to log.
    pub fn update(&mut self, input: &InputFrame, dt: f32) -> Result<(), SimError> {
        let body = self.body.clone();
        let controller = self.controller.clone();
        let result = self
            .controller
            .step(&mut self.body, input, dt)
            .and_then(|()| self.body.check_surface_lock());

        if result.is_err() {
            self.body = body;
            self.controller = controller;
        }
        result
    }
}

impl Avatar<LocalControlled> {
    pub fn local(id: PlayerId, body: OrbitalBody, config: &SimConfig) -> Self {
        Self {
            id,
            body,
            controller: LocalControlled::new(config.movement, config.thrust),
        }
    }
}

impl Avatar<RemoteInterpolated> {
    /// Build a peer avatar standing exactly at its first sample
    pub fn remote(
        id: PlayerId,
        position: Vec3,
        rotation: Quat,
        thrust_active: bool,
        received_at: u64,
        config: &SimConfig,
    ) -> Result<Self, SimError> {
        let mut body = OrbitalBody::spawn(config.planet_radius, config.heights, position, Vec3::ZERO)?;
        let height = position.length() - config.planet_radius;
        body.set_pose(position, rotation, height)?;

        let mut controller = RemoteInterpolated::new(config.interpolation, config.planet_radius, &body);
        controller.ingest(position, rotation, thrust_active, received_at)?;

        Ok(Self { id, body, controller })
    }

    pub fn ingest(
        &mut self,
        position: Vec3,
        rotation: Quat,
        thrust_active: bool,
        received_at: u64,
    ) -> Result<(), SimError> {
        self.controller.ingest(position, rotation, thrust_active, received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn local() -> Avatar<LocalControlled> {
        let config = SimConfig::default();
        let body = OrbitalBody::spawn(config.planet_radius, config.heights, Vec3::Z, Vec3::X).unwrap();
        Avatar::local(Uuid::new_v4(), body, &config)
    }

    #[test]
    fn forward_input_moves_along_heading() {
        let mut avatar = local();
        let input = InputFrame {
            forward: 1.0,
            ..Default::default()
        };
        avatar.update(&input, 0.1).unwrap();
        assert!(avatar.body.position().x > 0.0);
        assert!(avatar.body.position().y.abs() < 1e-5);
    }

    #[test]
    fn strafe_moves_to_the_right() {
        let mut avatar = local();
        let right = avatar.body.right();
        let input = InputFrame {
            strafe: 1.0,
            ..Default::default()
        };
        avatar.update(&input, 0.1).unwrap();
        assert!(avatar.body.position().dot(right) > 0.0);
    }

    #[test]
    fn diagonal_intent_is_not_faster() {
        let mut straight = local();
        let mut diagonal = local();
        let start = straight.body.position();

        straight
            .update(&InputFrame { forward: 1.0, ..Default::default() }, 0.1)
            .unwrap();
        diagonal
            .update(&InputFrame { forward: 1.0, strafe: 1.0, ..Default::default() }, 0.1)
            .unwrap();

        let a = straight.body.position().distance(start);
        let b = diagonal.body.position().distance(start);
        assert!((a - b).abs() < 1e-4);
    }

    #[test]
    fn failed_frame_keeps_fuel() {
        let mut avatar = local();
        let before = avatar.controller.thrust_state();
        let position = avatar.body.position();

        let input = InputFrame {
            thrust: true,
            ..Default::default()
        };
        assert!(avatar.update(&input, f32::INFINITY).is_err());

        assert_eq!(avatar.controller.thrust_state(), before);
        assert_eq!(avatar.body.position(), position);
    }

    #[test]
    fn remote_avatar_starts_at_first_sample() {
        let config = SimConfig::default();
        let position = Vec3::new(0.0, 6.5, 0.0);
        let rotation = Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let avatar =
            Avatar::remote(Uuid::new_v4(), position, rotation, true, 0, &config).unwrap();

        assert!((avatar.body.position() - position).length() < 1e-4);
        assert!((avatar.body.height() - 1.5).abs() < 1e-4);
        assert!(avatar.controller.thrust_active());
    }

    #[test]
    fn remote_step_ignores_input() {
        let config = SimConfig::default();
        let position = Vec3::new(0.0, 0.0, 5.6);
        let mut avatar =
            Avatar::remote(Uuid::new_v4(), position, Quat::IDENTITY, false, 0, &config).unwrap();

        let input = InputFrame { forward: 1.0, thrust: true, ..Default::default() };
        avatar.update(&input, 0.1).unwrap();
        assert!((avatar.body.position() - position).length() < 1e-4);
    }
}
