//! The caller-owned chain: configuration, joint state, velocities and trail.
//!
//! Each frame the host calls exactly one of [`Pendulum::tick`] or
//! [`Pendulum::drag_to`], optionally [`Pendulum::record_trace`], then reads
//! [`Pendulum::positions`] for drawing. Every mutating call either succeeds
//! completely or returns an error with the chain untouched.

use crate::config::{self, ChainConfig};
use crate::error::ChainError;
use crate::ik::fabrik_pass;
use crate::logic::{ChainSolver, MAX_FRAME_SECONDS};
use crate::math::{self, Energy, Point};
use crate::trace::TraceBuffer;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Which representation is authoritative right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Angles are the source; positions come from forward kinematics.
    Angular,
    /// Positions came out of an IK pass; angles were derived from them.
    Cartesian,
}

/// Joint state tagged by its source of truth.
///
/// After a physics tick the angles are authoritative. After a drag the IK
/// positions are kept as produced, with angles derived once at drag time, so
/// neither side is ever recomputed behind the caller's back.
#[derive(Debug, Clone, PartialEq)]
pub enum JointState {
    Angular { angles: Vec<f64> },
    Cartesian { positions: Vec<Point>, angles: Vec<f64> },
}

impl JointState {
    /// Chain hanging straight down.
    pub fn hanging(link_count: usize) -> Self {
        Self::Angular {
            angles: vec![0.0; link_count],
        }
    }

    pub fn angles(&self) -> &[f64] {
        match self {
            Self::Angular { angles } | Self::Cartesian { angles, .. } => angles,
        }
    }

    pub fn representation(&self) -> Representation {
        match self {
            Self::Angular { .. } => Representation::Angular,
            Self::Cartesian { .. } => Representation::Cartesian,
        }
    }

    /// Joint positions, anchor first.
    pub fn positions(&self, link_length: f64) -> Vec<Point> {
        match self {
            Self::Angular { angles } => math::forward_kinematics(angles, link_length),
            Self::Cartesian { positions, .. } => positions.clone(),
        }
    }

    /// Drops the Cartesian copy, keeping the derived angles.
    fn into_angular(self) -> Self {
        match self {
            Self::Cartesian { angles, .. } => Self::Angular { angles },
            angular => angular,
        }
    }
}

/// One N-link chain with its own parameters and trail.
#[derive(Debug, Clone)]
pub struct Pendulum {
    config: ChainConfig,
    state: JointState,
    velocities: Vec<f64>,
    trace: TraceBuffer,
}

impl Pendulum {
    /// Builds a chain at rest, hanging straight down.
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        config.validate()?;
        debug!(
            "new chain: {} links of {} (g = {})",
            config.link_count, config.link_length, config.gravity
        );
        Ok(Self {
            state: JointState::hanging(config.link_count),
            velocities: vec![0.0; config.link_count],
            trace: TraceBuffer::new(config.trace_limit),
            config,
        })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn link_count(&self) -> usize {
        self.config.link_count
    }

    pub fn link_length(&self) -> f64 {
        self.config.link_length
    }

    pub fn angles(&self) -> &[f64] {
        self.state.angles()
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn state(&self) -> &JointState {
        &self.state
    }

    pub fn representation(&self) -> Representation {
        self.state.representation()
    }

    /// Current joint positions, anchor first. Always `link_count + 1` points.
    pub fn positions(&self) -> Vec<Point> {
        self.state.positions(self.config.link_length)
    }

    pub fn trace(&self) -> &TraceBuffer {
        &self.trace
    }

    pub fn energy(&self) -> Energy {
        math::energy(
            self.angles(),
            &self.velocities,
            self.config.link_length,
            self.config.gravity,
        )
    }

    fn solver(&self) -> ChainSolver {
        ChainSolver::new(self.config.gravity, self.config.link_length, self.config.max_step)
    }

    /// Advances the physics by `dt` seconds.
    ///
    /// On a degenerate solve the frame is rejected and the previous state kept.
    pub fn tick(&mut self, dt: f64) -> Result<(), ChainError> {
        let mut angles = self.angles().to_vec();
        let mut velocities = self.velocities.clone();
        if let Err(err) = self.solver().advance(&mut angles, &mut velocities, dt) {
            if err.is_transient() {
                warn!("tick rejected: {err}");
            }
            return Err(err);
        }
        self.state = JointState::Angular { angles };
        self.velocities = velocities;
        Ok(())
    }

    /// One IK pass moving joint `index` (0 = anchor, `link_count` = free end) toward `(x, y)`.
    ///
    /// Angles are re-derived from the new positions, keeping each one's turn
    /// count. Velocities are zeroed: releasing a drag imparts no momentum.
    pub fn drag_to(&mut self, index: usize, x: f64, y: f64) -> Result<(), ChainError> {
        let joints = self.link_count() + 1;
        if index >= joints {
            return Err(ChainError::JointOutOfRange { index, joints });
        }
        if !(x.is_finite() && y.is_finite()) {
            return Err(ChainError::InvalidTarget { x, y });
        }

        let outcome = fabrik_pass(
            &self.positions(),
            index,
            Point::new(x, y),
            self.config.link_length,
        );
        if !outcome.is_clean() {
            warn!(
                "drag of joint {index} rejected: {} zero-length link(s)",
                outcome.skipped_links
            );
            return Err(ChainError::degenerate(format!(
                "{} zero-length link vector(s) during IK",
                outcome.skipped_links
            )));
        }

        let mut angles = math::angles_from_positions(&outcome.positions);
        math::unwrap_near(&mut angles, self.angles());
        self.state = JointState::Cartesian {
            positions: outcome.positions,
            angles,
        };
        self.velocities.iter_mut().for_each(|w| *w = 0.0);
        Ok(())
    }

    /// Pushes a copy of the current positions onto the trail.
    pub fn record_trace(&mut self) {
        let snapshot = self.positions();
        self.trace.record(snapshot);
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// Resizes the chain. State goes back to hanging at rest and the trail is
    /// cleared, since old snapshots have a different joint count.
    pub fn set_link_count(&mut self, link_count: usize) {
        debug!("link count {} -> {link_count}, resetting", self.config.link_count);
        self.config.link_count = link_count;
        self.reset();
    }

    /// Back to hanging at rest with an empty trail, same parameters.
    pub fn reset(&mut self) {
        self.state = JointState::hanging(self.config.link_count);
        self.velocities = vec![0.0; self.config.link_count];
        self.trace.clear();
    }

    /// Changes link length. Angles are kept; positions follow from them.
    pub fn set_link_length(&mut self, link_length: f64) -> Result<(), ChainError> {
        config::validate_link_length(link_length)?;
        debug!("link length {} -> {link_length}", self.config.link_length);
        self.config.link_length = link_length;
        self.state = std::mem::replace(&mut self.state, JointState::hanging(0)).into_angular();
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: f64) -> Result<(), ChainError> {
        config::validate_gravity(gravity)?;
        self.config.gravity = gravity;
        Ok(())
    }

    pub fn set_trace_limit(&mut self, trace_limit: usize) -> Result<(), ChainError> {
        config::validate_trace_limit(trace_limit)?;
        self.config.trace_limit = trace_limit;
        self.trace.set_limit(trace_limit);
        Ok(())
    }

    /// Loads an explicit angular state at rest. Length must match the link count.
    pub fn set_angles(&mut self, angles: &[f64]) -> Result<(), ChainError> {
        if angles.len() != self.link_count() {
            return Err(ChainError::config(format!(
                "expected {} angles, got {}",
                self.link_count(),
                angles.len()
            )));
        }
        if angles.iter().any(|a| !a.is_finite()) {
            return Err(ChainError::config("angles must be finite"));
        }
        self.state = JointState::Angular {
            angles: angles.to_vec(),
        };
        self.velocities = vec![0.0; angles.len()];
        Ok(())
    }
}

/// Turns frame timestamps (milliseconds) into step lengths (seconds).
///
/// Owned by the frame driver; the chain itself keeps no clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since the previous timestamp. `None` on the first frame or if time did not advance.
    ///
    /// Gaps longer than `MAX_FRAME_SECONDS` (a hidden tab, a paused client) are clamped to it.
    pub fn delta(&mut self, timestamp_ms: f64) -> Option<f64> {
        let previous = self.last.replace(timestamp_ms);
        previous
            .map(|prev| (timestamp_ms - prev) / 1000.0)
            .filter(|dt| *dt > 0.0)
            .map(|dt| dt.min(MAX_FRAME_SECONDS))
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain(n: usize, l: f64) -> Pendulum {
        Pendulum::new(ChainConfig::new(n, l, 9.8)).unwrap()
    }

    #[test]
    fn starts_hanging_at_rest() {
        let p = chain(4, 0.25);
        assert_eq!(p.angles(), &[0.0; 4]);
        assert_eq!(p.velocities(), &[0.0; 4]);
        assert_eq!(p.positions().len(), 5);
        assert_eq!(p.representation(), Representation::Angular);
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(Pendulum::new(ChainConfig::new(3, -1.0, 9.8)).is_err());
    }

    #[test]
    fn drag_switches_to_cartesian_and_zeroes_velocity() {
        let mut p = chain(2, 1.0);
        p.set_angles(&[0.5, 0.5]).unwrap();
        p.tick(0.1).unwrap();
        assert!(p.velocities().iter().any(|w| *w != 0.0));

        p.drag_to(2, 1.0, 1.0).unwrap();
        assert_eq!(p.representation(), Representation::Cartesian);
        assert_eq!(p.velocities(), &[0.0, 0.0]);

        // Derived angles reproduce the stored positions.
        let fk = math::forward_kinematics(p.angles(), 1.0);
        for (a, b) in fk.iter().zip(p.positions().iter()) {
            assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn tick_after_drag_goes_back_to_angular() {
        let mut p = chain(2, 1.0);
        p.drag_to(2, 1.0, 1.0).unwrap();
        p.tick(0.01).unwrap();
        assert_eq!(p.representation(), Representation::Angular);
    }

    #[test]
    fn out_of_range_joint_is_rejected() {
        let mut p = chain(3, 1.0);
        let err = p.drag_to(4, 0.0, 1.0).unwrap_err();
        assert_eq!(err, ChainError::JointOutOfRange { index: 4, joints: 4 });
    }

    #[test]
    fn non_finite_target_is_rejected() {
        let mut p = chain(3, 1.0);
        assert!(matches!(
            p.drag_to(3, f64::NAN, 0.0),
            Err(ChainError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn degenerate_drag_keeps_previous_state() {
        let mut p = chain(2, 1.0);
        let before = p.positions();
        let err = p.drag_to(1, 0.0, 0.0).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(p.positions(), before);
        assert_eq!(p.representation(), Representation::Angular);
    }

    #[test]
    fn drag_keeps_turn_count() {
        let mut p = chain(1, 1.0);
        p.set_angles(&[std::f64::consts::TAU + 0.1]).unwrap();
        p.drag_to(1, 0.2f64.sin(), 0.2f64.cos()).unwrap();
        assert_relative_eq!(p.angles()[0], std::f64::consts::TAU + 0.2, epsilon = 1e-9);
    }

    #[test]
    fn empty_chain_is_valid() {
        let mut p = chain(0, 1.0);
        p.tick(0.016).unwrap();
        p.drag_to(0, 3.0, 3.0).unwrap();
        assert_eq!(p.positions(), vec![Point::origin()]);
        assert!(p.drag_to(1, 0.0, 0.0).is_err());
    }

    #[test]
    fn link_count_change_resets_and_clears_trace() {
        let mut p = chain(3, 0.5);
        p.set_angles(&[0.3, 0.2, 0.1]).unwrap();
        p.tick(0.05).unwrap();
        p.record_trace();
        p.set_link_count(5);
        assert_eq!(p.angles(), &[0.0; 5]);
        assert_eq!(p.velocities(), &[0.0; 5]);
        assert!(p.trace().is_empty());
    }

    #[test]
    fn link_length_change_rederives_positions() {
        let mut p = chain(2, 1.0);
        p.drag_to(2, 2.0, 0.0).unwrap();
        p.set_link_length(0.5).unwrap();
        assert_eq!(p.representation(), Representation::Angular);
        let end = *p.positions().last().unwrap();
        assert_relative_eq!(end.x, 1.0, epsilon = 1e-9);
        assert!(p.set_link_length(0.0).is_err());
    }

    #[test]
    fn record_trace_snapshots_are_copies() {
        let mut p = chain(1, 1.0);
        p.record_trace();
        p.drag_to(1, 1.0, 0.0).unwrap();
        p.record_trace();
        let snaps: Vec<&[Point]> = p.trace().iter().collect();
        assert_relative_eq!(snaps[0][1].y, 1.0);
        assert_relative_eq!(snaps[1][1].x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn trace_limit_and_gravity_setters_validate() {
        let mut p = chain(1, 1.0);
        for _ in 0..4 {
            p.record_trace();
        }
        p.set_trace_limit(2).unwrap();
        assert_eq!(p.trace().len(), 2);
        assert!(p.set_trace_limit(0).is_err());
        assert!(p.set_gravity(f64::NAN).is_err());
        p.set_gravity(0.0).unwrap();
        p.set_angles(&[1.0]).unwrap();
        p.tick(0.5).unwrap();
        assert_relative_eq!(p.angles()[0], 1.0);
        p.clear_trace();
        assert!(p.trace().is_empty());
    }

    #[test]
    fn set_angles_checks_length() {
        let mut p = chain(2, 1.0);
        assert!(p.set_angles(&[0.1]).is_err());
        assert!(p.set_angles(&[0.1, f64::INFINITY]).is_err());
    }

    #[test]
    fn frame_clock_skips_first_frame() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.delta(1000.0), None);
        assert_relative_eq!(clock.delta(1016.0).unwrap(), 0.016, epsilon = 1e-12);
        assert_eq!(clock.delta(1016.0), None);
        clock.reset();
        assert_eq!(clock.delta(2000.0), None);
    }

    #[test]
    fn frame_clock_clamps_long_gaps() {
        let mut clock = FrameClock::new();
        clock.delta(0.0);
        assert_eq!(clock.delta(3_600_000.0), Some(MAX_FRAME_SECONDS));

        let mut p = chain(2, 1.0);
        p.set_angles(&[0.3, -0.1]).unwrap();
        assert!(p.tick(clock.delta(3_600_000.0 + 1e12).unwrap()).is_ok());
    }

    #[test]
    fn oversized_tick_is_rejected_without_change() {
        let mut p = chain(2, 1.0);
        p.set_angles(&[0.3, -0.1]).unwrap();
        let before = p.clone();
        let err = p.tick(1e9).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTimeStep(_)));
        assert_eq!(p.angles(), before.angles());
        assert_eq!(p.velocities(), before.velocities());
    }
}
