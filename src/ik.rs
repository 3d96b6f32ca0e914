//! Single-pass FABRIK for dragging one joint of the chain.
//!
//! One backward pass pulls joints `k-1..=0` toward the target, one forward
//! pass re-anchors at the origin and restores every link length outward. The
//! pass is not iterated to convergence: each frame gets exactly one, so the
//! chain follows the pointer smoothly rather than snapping.

use crate::math::Point;
use nalgebra::Vector2;

/// Result of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FabrikOutcome {
    /// Joint positions after the pass, anchor first.
    pub positions: Vec<Point>,
    /// Links left in place because their direction vector had zero length.
    pub skipped_links: usize,
}

impl FabrikOutcome {
    /// Whether every link was repositioned.
    pub fn is_clean(&self) -> bool {
        self.skipped_links == 0
    }
}

/// Moves joint `index` toward `target` while keeping the anchor at the origin.
///
/// `positions` holds `N + 1` joints and `index` must be at most `N`.
/// The single backward-then-forward pass runs only for targets joint `index` can
/// reach. When the target lies at or beyond that reach, links `0..index` are
/// laid out straight toward it instead, and only the forward pass follows.
pub fn fabrik_pass(positions: &[Point], index: usize, target: Point, link_length: f64) -> FabrikOutcome {
    let mut joints = positions.to_vec();
    let mut skipped_links = 0;
    if joints.is_empty() {
        return FabrikOutcome {
            positions: joints,
            skipped_links,
        };
    }
    debug_assert!(index < joints.len());

    let anchor = Point::origin();
    let reach = index as f64 * link_length;
    let to_target = target - anchor;

    if index > 0 && to_target.norm() >= reach {
        // Out of reach: stretch fully along anchor -> target.
        if let Some(dir) = to_target.try_normalize(f64::EPSILON) {
            for (i, joint) in joints.iter_mut().enumerate().take(index + 1) {
                *joint = anchor + dir * (i as f64 * link_length);
            }
        }
    } else {
        // Backward: pin the dragged joint, walk toward the anchor.
        joints[index] = target;
        for i in (0..index).rev() {
            match direction(joints[i] - joints[i + 1]) {
                Some(dir) => joints[i] = joints[i + 1] + dir * link_length,
                None => skipped_links += 1,
            }
        }
    }

    // Forward: re-anchor, walk outward.
    joints[0] = anchor;
    for i in 0..joints.len() - 1 {
        match direction(joints[i + 1] - joints[i]) {
            Some(dir) => joints[i + 1] = joints[i] + dir * link_length,
            None => skipped_links += 1,
        }
    }

    FabrikOutcome {
        positions: joints,
        skipped_links,
    }
}

fn direction(v: Vector2<f64>) -> Option<Vector2<f64>> {
    v.try_normalize(f64::EPSILON)
}
