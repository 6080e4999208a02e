use glam::{Quat, Vec3};

use spacegame::net::PlayerRecord;

use super::config::ReckoningConfig;

/// One authoritative observation of a remote ship.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub orientation: Quat,
    pub server_time_ms: u64,
    /// Local clock when the update arrived.
    pub received_ms: u64,
}

impl Observation {
    pub fn from_record(record: &PlayerRecord, server_time_ms: u64, received_ms: u64) -> Self {
        Self {
            position: record.position.into(),
            velocity: record.linear_velocity.into(),
            acceleration: record.reserved.into(),
            orientation: record.orientation.into(),
            server_time_ms,
            received_ms,
        }
    }

    /// `p + v*t + a*t^2/2`
    pub fn project(&self, t: f32) -> Vec3 {
        self.position + self.velocity * t + self.acceleration * (t * t * 0.5)
    }

    fn is_newer_than(&self, other: &Observation) -> bool {
        (self.received_ms, self.server_time_ms) > (other.received_ms, other.server_time_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum State {
    Uninitialized,
    Tracking {
        previous: Observation,
        latest: Observation,
        interval: f32,
        elapsed: f32,
    },
}

/// Two-slot dead reckoning for a remote ship.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadReckoning {
    config: ReckoningConfig,
    state: State,
}

impl DeadReckoning {
    pub fn new(config: ReckoningConfig) -> Self {
        Self {
            config,
            state: State::Uninitialized,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, State::Tracking { .. })
    }

    /// Both slots take `observation`; any history is discarded.
    pub fn seed(&mut self, observation: Observation) {
        self.state = State::Tracking {
            previous: observation,
            latest: observation,
            interval: self.config.default_interval_secs.max(self.config.min_interval_secs),
            elapsed: 0.0,
        };
    }

    /// Returns false when the update is not newer than the one held and was dropped.
    pub fn observe(&mut self, observation: Observation) -> bool {
        let min_interval = self.config.min_interval_secs;
        match &mut self.state {
            State::Uninitialized => {
                self.seed(observation);
                true
            }
            State::Tracking {
                previous,
                latest,
                interval,
                elapsed,
            } => {
                if !observation.is_newer_than(latest) {
                    log::trace!(
                        "Dropped stale update (received {} <= {})",
                        observation.received_ms,
                        latest.received_ms
                    );
                    return false;
                }

                *previous = *latest;
                *latest = observation;
                let gap = latest.received_ms.saturating_sub(previous.received_ms) as f32 / 1000.0;
                *interval = gap.max(min_interval);
                *elapsed = 0.0;
                true
            }
        }
    }

    /// Advances by `dt` and returns the blended position and orientation.
    pub fn interpolate(&mut self, dt: f32) -> Option<(Vec3, Quat)> {
        let max_age = self.config.max_extrapolation_secs;
        let State::Tracking {
            previous,
            latest,
            interval,
            elapsed,
        } = &mut self.state
        else {
            return None;
        };

        *elapsed += dt.max(0.0);
        let t = (*elapsed / *interval).clamp(0.0, 1.0);

        let gap = latest.received_ms.saturating_sub(previous.received_ms) as f32 / 1000.0;
        let from = previous.project((gap + *elapsed).min(max_age));
        let to = latest.project(elapsed.min(max_age));

        let position = from.lerp(to, t);
        let orientation = previous.orientation.slerp(latest.orientation, t).normalize();
        Some((position, orientation))
    }

    pub fn blend_factor(&self) -> f32 {
        match &self.state {
            State::Uninitialized => 0.0,
            State::Tracking {
                interval, elapsed, ..
            } => (*elapsed / *interval).clamp(0.0, 1.0),
        }
    }

    pub fn interval_secs(&self) -> Option<f32> {
        match &self.state {
            State::Uninitialized => None,
            State::Tracking { interval, .. } => Some(*interval),
        }
    }

    pub fn latest(&self) -> Option<&Observation> {
        match &self.state {
            State::Uninitialized => None,
            State::Tracking { latest, .. } => Some(latest),
        }
    }
}

impl Default for DeadReckoning {
    fn default() -> Self {
        Self::new(ReckoningConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(position: Vec3, velocity: Vec3, received_ms: u64) -> Observation {
        Observation {
            position,
            velocity,
            acceleration: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            server_time_ms: received_ms,
            received_ms,
        }
    }

    fn same_rotation(a: Quat, b: Quat) -> bool {
        a.dot(b).abs() > 1.0 - 1e-5
    }

    #[test]
    fn test_uninitialized_yields_nothing() {
        let mut reckoning = DeadReckoning::default();
        assert!(!reckoning.is_tracking());
        assert!(reckoning.interpolate(0.1).is_none());
    }

    #[test]
    fn test_identical_seed_does_not_drift() {
        let mut reckoning = DeadReckoning::default();
        let seed = Observation {
            orientation: Quat::from_rotation_y(0.7),
            ..observation(Vec3::new(3.0, -2.0, 9.0), Vec3::ZERO, 1000)
        };
        reckoning.seed(seed);

        for dt in [0.0, 0.016, 0.2, 0.5, 3.0] {
            let (position, orientation) = reckoning.interpolate(dt).unwrap();
            assert_eq!(position, seed.position);
            assert!(same_rotation(orientation, seed.orientation));
        }
    }

    #[test]
    fn test_seeded_motion_is_capped() {
        let mut reckoning = DeadReckoning::default();
        reckoning.seed(observation(Vec3::ZERO, Vec3::X, 0));

        let (p, _) = reckoning.interpolate(0.5).unwrap();
        assert!((p.x - 0.5).abs() < 1e-5);

        let (p, _) = reckoning.interpolate(5.0).unwrap();
        assert!((p.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_stale_updates_are_dropped() {
        let mut reckoning = DeadReckoning::default();
        assert!(reckoning.observe(observation(Vec3::ZERO, Vec3::ZERO, 1000)));
        assert!(reckoning.observe(observation(Vec3::X, Vec3::ZERO, 1200)));
        assert!(!reckoning.observe(observation(Vec3::Y, Vec3::ZERO, 1100)));
        assert!(!reckoning.observe(observation(Vec3::Y, Vec3::ZERO, 1200)));

        assert_eq!(reckoning.latest().unwrap().position, Vec3::X);
    }

    #[test]
    fn test_interval_comes_from_receipt_gap() {
        let mut reckoning = DeadReckoning::default();
        reckoning.observe(observation(Vec3::ZERO, Vec3::ZERO, 1000));
        assert_eq!(reckoning.interval_secs(), Some(0.2));

        reckoning.observe(observation(Vec3::X, Vec3::ZERO, 1250));
        assert!((reckoning.interval_secs().unwrap() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_zero_gap_uses_minimum_interval() {
        let mut reckoning = DeadReckoning::default();
        reckoning.observe(Observation {
            server_time_ms: 1,
            ..observation(Vec3::ZERO, Vec3::ZERO, 1000)
        });
        reckoning.observe(Observation {
            server_time_ms: 2,
            ..observation(Vec3::X, Vec3::ZERO, 1000)
        });

        assert_eq!(reckoning.interval_secs(), Some(0.01));
        let (p, _) = reckoning.interpolate(0.0).unwrap();
        assert!(p.is_finite());
    }

    #[test]
    fn test_blend_endpoints() {
        let a = observation(Vec3::ZERO, Vec3::Z, 1000);
        let b = Observation {
            orientation: Quat::from_rotation_y(1.0),
            ..observation(Vec3::new(0.0, 0.0, 0.4), Vec3::Z * 2.0, 1200)
        };

        let mut reckoning = DeadReckoning::default();
        reckoning.observe(a);
        reckoning.observe(b);

        let (start, start_rot) = reckoning.interpolate(0.0).unwrap();
        assert_eq!(reckoning.blend_factor(), 0.0);
        assert!((start - a.project(0.2)).length() < 1e-5);
        assert!(same_rotation(start_rot, a.orientation));

        let (end, end_rot) = reckoning.interpolate(0.2).unwrap();
        assert_eq!(reckoning.blend_factor(), 1.0);
        assert!((end - b.project(0.2)).length() < 1e-5);
        assert!(same_rotation(end_rot, b.orientation));
    }

    #[test]
    fn test_acceleration_term() {
        let mut reckoning = DeadReckoning::default();
        reckoning.seed(Observation {
            acceleration: Vec3::new(0.0, 2.0, 0.0),
            ..observation(Vec3::ZERO, Vec3::ZERO, 0)
        });
        let (p, _) = reckoning.interpolate(0.5).unwrap();
        assert!((p.y - 0.25).abs() < 1e-5);
    }
}
