//! Bounded time series for live charts.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Number of points a chart keeps.
pub const DEFAULT_SERIES_CAPACITY: usize = 60;

/// One sample on a chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// When the frame carrying the value was received.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The value, `NaN` when the frame did not carry a usable one.
    pub value: f64,
}

/// A FIFO of at most `capacity` points; the oldest point is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBuffer {
    points: VecDeque<TimeSeriesPoint>,
    capacity: usize,
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesBuffer {
    /// Create an empty buffer holding [`DEFAULT_SERIES_CAPACITY`] points.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SERIES_CAPACITY)
    }

    /// Create an empty buffer holding at most `capacity` points (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest one if the buffer is full.
    pub fn push(&mut self, point: TimeSeriesPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    /// The newest point.
    pub fn latest(&self) -> Option<&TimeSeriesPoint> {
        self.points.back()
    }

    /// Points from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesPoint> {
        self.points.iter()
    }

    /// Number of points currently held.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the buffer holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of points kept before the oldest is dropped.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove every point.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}
