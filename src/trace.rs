//! Bounded history of chain snapshots for drawing a fading trail.

use crate::math::Point;
use std::collections::VecDeque;

/// FIFO of full position snapshots, oldest first, never longer than `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceBuffer {
    entries: VecDeque<Vec<Point>>,
    limit: usize,
}

impl TraceBuffer {
    /// Creates an empty buffer. `limit` is clamped to at least 1.
    ///
    /// Storage grows with use; nothing is reserved for `limit` up front.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Appends a snapshot, evicting the oldest one once full.
    ///
    /// Takes ownership: callers hand over a copy, never the live position buffer.
    pub fn record(&mut self, snapshot: Vec<Point>) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Changes capacity, dropping the oldest entries that no longer fit.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(1);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshots in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &[Point]> + '_ {
        self.entries.iter().map(Vec::as_slice)
    }

    /// The free end of every snapshot, oldest first. Snapshots of an empty chain contribute the anchor.
    pub fn end_effector_path(&self) -> Vec<Point> {
        self.entries.iter().filter_map(|s| s.last().copied()).collect()
    }
}
