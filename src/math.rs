// src/math.rs
// Equations of motion for a uniform N-link chain with a unit mass at every joint: A α = b.
// A is the (scaled) mass matrix, b collects the centripetal and gravity terms with sign flipped.
// Dividing the Lagrangian through by L² leaves only the ratio gravity / link_length in b.
// Indices are 0-based from the anchor: link 0 hangs from the pivot, link N-1 carries the free end.
// Positions use screen orientation (y grows downward) so angle 0 hangs straight down.

use crate::error::ChainError;
use nalgebra::{DMatrix, DVector, Point2};

/// A joint position in the chain plane.
pub type Point = Point2<f64>;

/// Number of joint masses at or beyond link `max(i, j)`, i.e. the mass that both links carry.
/// With unit masses this is a count; it replaces an explicit sum over a mass list.
#[inline]
pub fn shared_mass(n: usize, i: usize, j: usize) -> f64 {
    (n - i.max(j)) as f64
}

/// Snapshot of the chain at one instant, enough to assemble A and b.
pub struct ChainMath<'a> {
    pub n: usize,                // Number of links.
    pub gravity_ratio: f64,      // gravity / link_length.
    pub angles: &'a [f64],       // θ, length n.
    pub velocities: &'a [f64],   // ω, length n.
}

impl<'a> ChainMath<'a> {
    /// Borrows a state snapshot; both slices must have length `n`.
    pub fn new(gravity_ratio: f64, angles: &'a [f64], velocities: &'a [f64]) -> Self {
        debug_assert_eq!(angles.len(), velocities.len());
        Self {
            n: angles.len(),
            gravity_ratio,
            angles,
            velocities,
        }
    }

    /// A[i][j] = m(i,j) · cos(θi − θj). Symmetric, positive definite for any finite state.
    pub fn system_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.n, self.n, |row, column| {
            let cos_term = (self.angles[row] - self.angles[column]).cos(); // cos(θ_row − θ_col).
            shared_mass(self.n, row, column) * cos_term
        })
    }

    /// C[i] = Σ_j m(i,j) · sin(θi − θj) · ωj².
    pub fn centripetal_vector(&self) -> DVector<f64> {
        DVector::from_fn(self.n, |i, _| {
            let mut f_term = 0.0;
            for j in 0..self.n {
                let sin_val = (self.angles[i] - self.angles[j]).sin();
                let velsq = self.velocities[j] * self.velocities[j]; // ωj².
                f_term += shared_mass(self.n, i, j) * sin_val * velsq;
            }
            f_term
        })
    }

    /// G[i] = (g / L) · m(i,i) · sin θi.
    pub fn gravity_vector(&self) -> DVector<f64> {
        DVector::from_fn(self.n, |i, _| {
            self.gravity_ratio * shared_mass(self.n, i, i) * self.angles[i].sin()
        })
    }

    /// b = −(C + G).
    pub fn forcing_vector(&self) -> DVector<f64> {
        -(self.centripetal_vector() + self.gravity_vector())
    }

    /// Solves A α = b for the angular accelerations.
    ///
    /// An empty chain yields an empty vector without touching the solver.
    pub fn accelerations(&self) -> Result<DVector<f64>, ChainError> {
        if self.n == 0 {
            return Ok(DVector::zeros(0));
        }
        solve_dense(self.system_matrix(), &self.forcing_vector())
    }
}

/// LU-solves `a · x = b`, refusing singular systems and non-finite answers.
pub fn solve_dense(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, ChainError> {
    let n = b.len();
    let x = a
        .lu()
        .solve(b)
        .ok_or_else(|| ChainError::degenerate(format!("singular {n}x{n} system matrix")))?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(ChainError::degenerate("non-finite angular acceleration"))
    }
}

/// Joint positions from angles: position[0] is the anchor, position[k] sums links 0..k.
pub fn forward_kinematics(angles: &[f64], link_length: f64) -> Vec<Point> {
    let mut result = Vec::with_capacity(angles.len() + 1);
    result.push(Point::origin());
    let (mut x, mut y) = (0.0, 0.0);
    for theta in angles {
        x += theta.sin() * link_length;
        y += theta.cos() * link_length;
        result.push(Point::new(x, y));
    }
    result
}

/// Angles from joint positions, one per consecutive pair, via atan2(dx, dy).
///
/// Results lie in (−π, π]; callers wanting continuity with a previous unwrapped
/// state should pass it through [`unwrap_near`].
pub fn angles_from_positions(positions: &[Point]) -> Vec<f64> {
    positions
        .windows(2)
        .map(|pair| {
            let delta = pair[1] - pair[0];
            delta.x.atan2(delta.y)
        })
        .collect()
}

/// Shifts each wrapped angle by whole turns so it lands nearest the matching reference.
/// Keeps the accumulated rotation count across a drag.
pub fn unwrap_near(wrapped: &mut [f64], reference: &[f64]) {
    use std::f64::consts::TAU;
    for (angle, &prev) in wrapped.iter_mut().zip(reference) {
        let turns = ((prev - *angle) / TAU).round();
        *angle += turns * TAU;
    }
}

/// Kinetic and potential energy of the chain, unit joint masses.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Energy {
    pub kinetic: f64,
    pub potential: f64,
}

impl Energy {
    pub fn total(&self) -> f64 {
        self.kinetic + self.potential
    }
}

/// Energy of a state. Potential is zero at the pivot height and negative below it.
pub fn energy(angles: &[f64], velocities: &[f64], link_length: f64, gravity: f64) -> Energy {
    let n = angles.len();
    let mut kinetic = 0.0;
    for i in 0..n {
        for j in 0..n {
            kinetic += shared_mass(n, i, j)
                * (angles[i] - angles[j]).cos()
                * velocities[i]
                * velocities[j];
        }
    }
    kinetic *= 0.5 * link_length * link_length;

    let potential = -gravity
        * link_length
        * (0..n)
            .map(|i| shared_mass(n, i, i) * angles[i].cos())
            .sum::<f64>();

    Energy { kinetic, potential }
}
