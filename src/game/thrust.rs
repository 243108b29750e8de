//! Fuel-gated vertical thrust

use super::body::OrbitalBody;
use super::SimError;

/// Thrust and fuel constants. All rates are per second.
#[derive(Debug, Clone, Copy)]
pub struct ThrustTuning {
    pub max_fuel: f32,
    /// Fuel burned per second while thrust is held
    pub burn_rate: f32,
    /// Fuel regained per second while thrust is released (slower than burn)
    pub refill_rate: f32,
    /// Upward acceleration while thrusting
    pub thrust_force: f32,
    /// Downward acceleration, always applied
    pub gravity: f32,
    /// Fraction of `max_fuel` needed before an empty tank can thrust again
    pub reengage_fraction: f32,
}

impl Default for ThrustTuning {
    fn default() -> Self {
        Self {
            max_fuel: 100.0,
            burn_rate: 35.0,
            refill_rate: 12.0,
            thrust_force: 14.0,
            gravity: 7.0,
            reengage_fraction: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustState {
    pub fuel: f32,
    pub engaged: bool,
    /// Latched off at empty; back on only once fuel reaches the re-engage level
    pub has_fuel: bool,
}

/// Vertical integrator for a locally simulated avatar
#[derive(Debug, Clone)]
pub struct ThrustController {
    tuning: ThrustTuning,
    state: ThrustState,
}

impl ThrustController {
    pub fn new(tuning: ThrustTuning) -> Self {
        Self {
            tuning,
            state: ThrustState {
                fuel: tuning.max_fuel,
                engaged: false,
                has_fuel: true,
            },
        }
    }

    pub fn state(&self) -> ThrustState {
        self.state
    }

    /// Thrust is visibly firing this frame
    pub fn is_active(&self) -> bool {
        self.state.engaged && self.state.has_fuel
    }

    /// Advance fuel and vertical motion by `dt` seconds
    pub fn step(&mut self, engaged: bool, body: &mut OrbitalBody, dt: f32) -> Result<(), SimError> {
        self.update_fuel(engaged, dt);

        let mut acceleration = -self.tuning.gravity;
        if self.is_active() && body.height() < body.limits().max {
            acceleration += self.tuning.thrust_force;
        }

        body.integrate_vertical(acceleration, dt)?;
        Ok(())
    }

    fn update_fuel(&mut self, engaged: bool, dt: f32) {
        let tuning = &self.tuning;
        let state = &mut self.state;

        state.engaged = engaged;
        state.fuel = if engaged {
            state.fuel - tuning.burn_rate * dt
        } else {
            state.fuel + tuning.refill_rate * dt
        }
        .clamp(0.0, tuning.max_fuel);

        if state.fuel <= 0.0 {
            state.has_fuel = false;
        } else if !state.has_fuel && state.fuel >= tuning.max_fuel * tuning.reengage_fraction {
            state.has_fuel = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::HeightLimits;
    use glam::Vec3;

    fn body() -> OrbitalBody {
        OrbitalBody::spawn(5.0, HeightLimits::default(), Vec3::Z, Vec3::X).unwrap()
    }

    #[test]
    fn fuel_stays_in_range() {
        let mut thrust = ThrustController::new(ThrustTuning::default());
        let mut body = body();

        for i in 0..2_000 {
            let engaged = (i / 200) % 2 == 0;
            thrust.step(engaged, &mut body, 1.0 / 60.0).unwrap();
            let fuel = thrust.state().fuel;
            assert!((0.0..=100.0).contains(&fuel));
            assert!(body.limits().contains(body.height()));
        }
    }

    #[test]
    fn empty_tank_recovers_only_at_reengage_level() {
        let mut thrust = ThrustController::new(ThrustTuning::default());
        let mut body = body();

        thrust.step(true, &mut body, 10.0).unwrap();
        assert_eq!(thrust.state().fuel, 0.0);
        assert!(!thrust.state().has_fuel);

        // 12/s * 0.75s = 9% of the tank: still locked out
        thrust.step(false, &mut body, 0.75).unwrap();
        assert!((thrust.state().fuel - 9.0).abs() < 1e-4);
        assert!(!thrust.state().has_fuel);

        // 12/s * 1/6s brings it to 11%
        thrust.step(false, &mut body, 1.0 / 6.0).unwrap();
        assert!((thrust.state().fuel - 11.0).abs() < 1e-3);
        assert!(thrust.state().has_fuel);
    }

    #[test]
    fn held_thrust_without_fuel_does_not_lift() {
        let mut thrust = ThrustController::new(ThrustTuning::default());
        let mut body = body();

        thrust.step(true, &mut body, 10.0).unwrap();
        body.set_height(body.limits().min).unwrap();

        for _ in 0..30 {
            thrust.step(true, &mut body, 1.0 / 60.0).unwrap();
        }
        assert!(!thrust.is_active());
        assert_eq!(body.height(), body.limits().min);
    }

    #[test]
    fn thrust_lifts_off_the_ground() {
        let mut thrust = ThrustController::new(ThrustTuning::default());
        let mut body = body();

        for _ in 0..30 {
            thrust.step(true, &mut body, 1.0 / 60.0).unwrap();
        }
        assert!(thrust.is_active());
        assert!(body.height() > body.limits().min);
        assert!(body.vertical_velocity() > 0.0);
    }

    #[test]
    fn integration_is_frame_rate_independent() {
        let run = |steps: u32| {
            let mut thrust = ThrustController::new(ThrustTuning::default());
            let mut body = body();
            let dt = 1.0 / steps as f32;
            for _ in 0..steps {
                thrust.step(true, &mut body, dt).unwrap();
            }
            (thrust.state().fuel, body.height())
        };

        let (fuel_30, height_30) = run(30);
        let (fuel_120, height_120) = run(120);
        assert!((fuel_30 - fuel_120).abs() < 1e-2);
        assert!((height_30 - height_120).abs() < 0.15);
    }
}
