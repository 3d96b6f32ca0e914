// src/logic.rs
// Dynamics engine: advances (θ, ω) by RK4, taking α from the linear system assembled in math.rs.
// The integrated state is packed as y = [θ0..θn-1, ω0..ωn-1] so the RK4 combination is plain vector algebra.
// Angles are never wrapped; an unwrapped angle keeps counting full turns.

use crate::error::ChainError;
use crate::math::ChainMath;
use log::trace;
use nalgebra::DVector;

/// Longest frame `advance` accepts. Longer gaps are paused clients, not physics.
pub const MAX_FRAME_SECONDS: f64 = 1.0;
/// Most RK4 steps one `advance` call may take.
pub const MAX_SUBSTEPS: usize = 10_000;

/// Dynamics parameters for one chain. Holds no clock and no state of its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSolver {
    pub gravity: f64,     // Gravitational acceleration.
    pub link_length: f64, // Uniform link length.
    pub max_step: f64,    // Longest single RK4 step.
}

impl ChainSolver {
    pub fn new(gravity: f64, link_length: f64, max_step: f64) -> Self {
        Self {
            gravity,
            link_length,
            max_step,
        }
    }

    fn gravity_ratio(&self) -> f64 {
        self.gravity / self.link_length
    }

    /// α for the given θ and ω.
    pub fn accelerations(&self, angles: &[f64], velocities: &[f64]) -> Result<DVector<f64>, ChainError> {
        ChainMath::new(self.gravity_ratio(), angles, velocities).accelerations()
    }

    /// dy/dt = [ω, α] for the packed state y = [θ, ω].
    pub fn deriv(&self, y: &DVector<f64>) -> Result<DVector<f64>, ChainError> {
        let n = y.len() / 2;
        let (angles, velocities) = y.as_slice().split_at(n);
        let alpha = self.accelerations(angles, velocities)?;
        // dθ/dt = ω, dω/dt = α.
        Ok(DVector::from_iterator(
            2 * n,
            velocities.iter().chain(alpha.iter()).copied(),
        ))
    }

    /// One classical RK4 step: y + (dt/6)(k1 + 2k2 + 2k3 + k4).
    pub fn rk4_step(&self, y: &DVector<f64>, dt: f64) -> Result<DVector<f64>, ChainError> {
        let k1 = self.deriv(y)?;
        let k2 = self.deriv(&(y + &k1 * (0.5 * dt)))?; // Midpoint from k1.
        let k3 = self.deriv(&(y + &k2 * (0.5 * dt)))?; // Midpoint from k2.
        let k4 = self.deriv(&(y + &k3 * dt))?; // Endpoint from k3.
        let y_new = y + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0);
        if y_new.iter().all(|v| v.is_finite()) {
            Ok(y_new)
        } else {
            Err(ChainError::degenerate("non-finite state after RK4 step"))
        }
    }

    /// Advances `(angles, velocities)` by `dt`, split into equal steps no longer than `max_step`.
    ///
    /// Works on a scratch copy: on error the slices are left untouched.
    /// `dt` must lie in `(0, MAX_FRAME_SECONDS]` and need at most `MAX_SUBSTEPS` steps.
    pub fn advance(&self, angles: &mut [f64], velocities: &mut [f64], dt: f64) -> Result<(), ChainError> {
        if !(dt.is_finite() && dt > 0.0 && dt <= MAX_FRAME_SECONDS) {
            return Err(ChainError::InvalidTimeStep(dt));
        }
        // Slack keeps dt == k * max_step from rounding up to k + 1 steps.
        let substeps = (dt / self.max_step - 1e-9).ceil().max(1.0);
        if substeps > MAX_SUBSTEPS as f64 {
            return Err(ChainError::InvalidTimeStep(dt));
        }
        let substeps = substeps as usize;
        let n = angles.len();
        if n == 0 {
            return Ok(());
        }

        let h = dt / substeps as f64;
        let mut y = pack(angles, velocities);
        for _ in 0..substeps {
            y = self.rk4_step(&y, h)?;
        }
        trace!("advanced {n} links by {dt:.5}s in {substeps} substeps");

        let (new_angles, new_velocities) = y.as_slice().split_at(n);
        angles.copy_from_slice(new_angles);
        velocities.copy_from_slice(new_velocities);
        Ok(())
    }

    /// Integrates from rest at `initial_angles` for `steps` fixed steps of `dt`.
    /// Returns the angle vector after every step, the initial state first.
    pub fn solve(&self, initial_angles: &[f64], dt: f64, steps: usize) -> Result<Vec<Vec<f64>>, ChainError> {
        let mut angles = initial_angles.to_vec();
        let mut velocities = vec![0.0; angles.len()];
        let mut sol = vec![angles.clone()];
        for _ in 0..steps {
            self.advance(&mut angles, &mut velocities, dt)?;
            sol.push(angles.clone());
        }
        Ok(sol)
    }
}

fn pack(angles: &[f64], velocities: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        angles.len() * 2,
        angles.iter().chain(velocities.iter()).copied(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::energy;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn solver() -> ChainSolver {
        ChainSolver::new(9.8, 1.0, 0.01)
    }

    #[test]
    fn deriv_places_velocity_then_acceleration() {
        let y = DVector::from_vec(vec![0.0, 0.0, 0.7, -0.2]);
        let d = solver().deriv(&y).unwrap();
        assert_relative_eq!(d[0], 0.7);
        assert_relative_eq!(d[1], -0.2);
    }

    #[test]
    fn equilibrium_stays_put() {
        let mut angles = vec![0.0; 3];
        let mut vels = vec![0.0; 3];
        for _ in 0..100 {
            solver().advance(&mut angles, &mut vels, 0.01).unwrap();
        }
        for a in &angles {
            assert_abs_diff_eq!(*a, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn small_swing_has_simple_pendulum_period() {
        // Single link, L = 1: period ≈ 2π √(L/g).
        let s = ChainSolver::new(9.8, 1.0, 1e-3);
        let mut angles = vec![0.01];
        let mut vels = vec![0.0];
        let period = std::f64::consts::TAU / 9.8f64.sqrt();
        for _ in 0..10 {
            s.advance(&mut angles, &mut vels, period / 10.0).unwrap();
        }
        assert_abs_diff_eq!(angles[0], 0.01, epsilon = 1e-5);
    }

    #[test]
    fn substeps_match_explicit_steps() {
        let s = ChainSolver::new(9.8, 0.5, 0.01);
        let (mut a1, mut v1) = (vec![0.5, -0.3], vec![0.0, 0.0]);
        let (mut a2, mut v2) = (a1.clone(), v1.clone());
        s.advance(&mut a1, &mut v1, 0.04).unwrap();
        for _ in 0..4 {
            s.advance(&mut a2, &mut v2, 0.01).unwrap();
        }
        for i in 0..2 {
            assert_relative_eq!(a1[i], a2[i], epsilon = 1e-12);
            assert_relative_eq!(v1[i], v2[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn energy_is_nearly_conserved() {
        let s = ChainSolver::new(9.8, 1.0, 1e-3);
        let mut angles = vec![1.0, -0.5, 0.3];
        let mut vels = vec![0.0; 3];
        let e0 = energy(&angles, &vels, 1.0, 9.8).total();
        for _ in 0..1000 {
            s.advance(&mut angles, &mut vels, 1e-3).unwrap();
        }
        let e1 = energy(&angles, &vels, 1.0, 9.8).total();
        assert!((e1 - e0).abs() < 1e-3 * e0.abs(), "drift {e0} -> {e1}");
    }

    #[test]
    fn rejects_bad_time_step() {
        let mut a = vec![0.1];
        let mut v = vec![0.0];
        for dt in [0.0, -0.01, f64::NAN, f64::INFINITY] {
            let err = solver().advance(&mut a, &mut v, dt);
            assert!(matches!(err, Err(ChainError::InvalidTimeStep(_))));
        }
        assert_eq!(a, vec![0.1]);
    }

    #[test]
    fn rejects_frames_too_long_to_integrate() {
        let mut a = vec![0.4, -0.2];
        let mut v = vec![0.0, 0.5];
        for dt in [MAX_FRAME_SECONDS * 1.5, 1e9] {
            let err = solver().advance(&mut a, &mut v, dt);
            assert!(matches!(err, Err(ChainError::InvalidTimeStep(_))));
        }
        // Within the frame limit but over the step budget.
        let fine = ChainSolver::new(9.8, 1.0, 1e-6);
        let err = fine.advance(&mut a, &mut v, 0.5);
        assert!(matches!(err, Err(ChainError::InvalidTimeStep(_))));
        assert_eq!(a, vec![0.4, -0.2]);
        assert_eq!(v, vec![0.0, 0.5]);

        assert!(solver().advance(&mut a, &mut v, MAX_FRAME_SECONDS).is_ok());
    }

    #[test]
    fn failed_step_leaves_state_untouched() {
        let mut a = vec![f64::NAN, 0.0];
        let mut v = vec![0.0, 1.0];
        assert!(solver().advance(&mut a, &mut v, 0.01).is_err());
        assert!(a[0].is_nan());
        assert_eq!(v, vec![0.0, 1.0]);
    }

    #[test]
    fn empty_chain_is_a_no_op() {
        let mut a: Vec<f64> = Vec::new();
        let mut v: Vec<f64> = Vec::new();
        assert!(solver().advance(&mut a, &mut v, 0.01).is_ok());
        assert!(a.is_empty());
    }

    #[test]
    fn solve_records_every_step() {
        let sol = solver().solve(&[0.3, 0.0], 0.01, 10).unwrap();
        assert_eq!(sol.len(), 11);
        assert_eq!(sol[0], vec![0.3, 0.0]);
    }
}
