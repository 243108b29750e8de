//! Scripted input for headless clients

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{InputFrame, InputSource};

/// Seconds a chosen manoeuvre is held before the next one is picked
const MANOEUVRE_SECS: std::ops::Range<f32> = 0.5..2.5;

/// Deterministic wandering pilot. Two autopilots with the same seed produce
/// the same frames for the same sequence of `dt`.
#[derive(Debug, Clone)]
pub struct Autopilot {
    rng: ChaCha8Rng,
    current: InputFrame,
    remaining: f32,
    /// Chance per second of pulling the trigger
    fire_rate: f32,
}

impl Autopilot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            current: InputFrame::default(),
            remaining: 0.0,
            fire_rate: 1.5,
        }
    }

    fn pick_manoeuvre(&mut self) {
        self.current = InputFrame {
            forward: self.rng.gen_range(-0.3..1.0),
            strafe: self.rng.gen_range(-0.5..0.5),
            turn_delta: self.rng.gen_range(-8.0..8.0),
            thrust: self.rng.gen_bool(0.3),
            fire: false,
        };
        self.remaining = self.rng.gen_range(MANOEUVRE_SECS);
    }
}

impl InputSource for Autopilot {
    fn next_frame(&mut self, dt: f32) -> InputFrame {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            self.pick_manoeuvre();
        }

        let fire_chance = f64::from((self.fire_rate * dt).clamp(0.0, 1.0));
        InputFrame {
            fire: self.rng.gen_bool(fire_chance),
            ..self.current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_frames() {
        let mut a = Autopilot::new(7);
        let mut b = Autopilot::new(7);
        for _ in 0..500 {
            assert_eq!(a.next_frame(1.0 / 60.0), b.next_frame(1.0 / 60.0));
        }
    }

    #[test]
    fn frames_stay_in_range() {
        let mut pilot = Autopilot::new(42);
        let mut fired = 0;
        for _ in 0..3_600 {
            let frame = pilot.next_frame(1.0 / 60.0);
            assert_eq!(frame, frame.clamped());
            if frame.fire {
                fired += 1;
            }
        }
        // About 1.5 shots a second over a minute
        assert!((30..200).contains(&fired));
    }
}
