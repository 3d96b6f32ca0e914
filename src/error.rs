//! Error types for chain configuration and per-frame updates.

use thiserror::Error;

/// Errors reported by the chain engine.
///
/// None of these are fatal. A failed operation leaves the chain exactly as it
/// was before the call, so the caller can skip the frame and carry on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// A configuration value was rejected (e.g. non-positive link length).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The system matrix was singular, the integrated state went non-finite,
    /// or an IK pass met a zero-length link vector.
    #[error("degenerate solve: {0}")]
    DegenerateSolve(String),

    /// A drag addressed a joint the chain does not have.
    #[error("joint index {index} out of range for a chain with {joints} joints")]
    JointOutOfRange {
        /// Requested joint index.
        index: usize,
        /// Number of joints, anchor included (`link_count + 1`).
        joints: usize,
    },

    /// Time step was zero, negative, or not finite.
    #[error("invalid time step: {0}")]
    InvalidTimeStep(f64),

    /// Drag target had a non-finite coordinate.
    #[error("invalid drag target ({x}, {y})")]
    InvalidTarget {
        /// Target x.
        x: f64,
        /// Target y.
        y: f64,
    },
}

impl ChainError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Creates a degenerate-solve error.
    #[must_use]
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateSolve(msg.into())
    }

    /// Whether the error came from geometry rather than bad input.
    ///
    /// Degenerate solves are transient: the next frame may well succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DegenerateSolve(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ChainError::config("link_length must be positive");
        let msg = format!("{err}");
        assert!(msg.contains("invalid configuration"));
        assert!(msg.contains("link_length"));
    }

    #[test]
    fn error_joint_out_of_range() {
        let err = ChainError::JointOutOfRange { index: 7, joints: 4 };
        let msg = format!("{err}");
        assert!(msg.contains('7'));
        assert!(msg.contains('4'));
    }

    #[test]
    fn only_degenerate_is_transient() {
        assert!(ChainError::degenerate("singular").is_transient());
        assert!(!ChainError::InvalidTimeStep(-1.0).is_transient());
        assert!(!ChainError::config("x").is_transient());
    }
}
