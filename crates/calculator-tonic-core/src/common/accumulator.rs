//! Running state for the streaming operations.
//!
//! Each streaming call owns exactly one accumulator for its whole lifetime.
//! Accumulators are plain values with no interior mutability or sharing: a
//! call creates one when it starts and drops it when it ends, whether the call
//! completed or failed.

use crate::{Error, Result};

/// Running sum and count of the values streamed to `ComputeAverage`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AverageAccumulator {
    sum: i64,
    count: i64,
}

impl AverageAccumulator {
    pub const fn new() -> Self {
        Self { sum: 0, count: 0 }
    }

    /// Adds one value to the running state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overflow`] if the running sum leaves the `i64` range.
    /// The accumulator is left untouched in that case.
    pub fn push(&mut self, value: i32) -> Result<()> {
        let sum = self
            .sum
            .checked_add(i64::from(value))
            .ok_or_else(|| Error::Overflow {
                context: format!("running sum exceeded 64 bits after {} values", self.count),
            })?;
        self.sum = sum;
        self.count += 1;
        Ok(())
    }

    /// Number of values pushed so far.
    pub const fn count(&self) -> i64 {
        self.count
    }

    /// Consumes the accumulator and returns `sum / count` as an `f32`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyStream`] when no value was pushed, instead of
    /// dividing by zero.
    pub fn finish(self) -> Result<f32> {
        if self.count == 0 {
            return Err(Error::EmptyStream);
        }
        Ok((self.sum as f64 / self.count as f64) as f32)
    }
}

/// Running maximum of the values streamed to `FindMaximum`.
///
/// [`observe`](Self::observe) reports a value only when it is strictly greater
/// than every value seen before it, so the reported values form a strictly
/// increasing sequence. Ties are never reported.
///
/// The tracker starts at `i32::MIN`. How the very first candidate is treated
/// depends on the constructor:
///
/// - [`MaximumTracker::new`] lets the first candidate set the baseline
///   silently; `[1, 5, 3, 6, 2, 20]` reports `[5, 6, 20]`.
/// - [`MaximumTracker::announcing_first`] compares the first candidate against
///   the `i32::MIN` floor like any other; `[1, 5, 3, 6, 2, 20]` reports
///   `[1, 5, 6, 20]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaximumTracker {
    current: i32,
    seeded: bool,
}

impl MaximumTracker {
    pub const fn new() -> Self {
        Self {
            current: i32::MIN,
            seeded: false,
        }
    }

    pub const fn announcing_first() -> Self {
        Self {
            current: i32::MIN,
            seeded: true,
        }
    }

    /// Feeds one candidate, returning it if it is a new strict maximum.
    pub fn observe(&mut self, candidate: i32) -> Option<i32> {
        if !self.seeded {
            self.seeded = true;
            self.current = candidate;
            return None;
        }
        if candidate > self.current {
            self.current = candidate;
            Some(candidate)
        } else {
            None
        }
    }

    pub const fn current(&self) -> i32 {
        self.current
    }
}

impl Default for MaximumTracker {
    fn default() -> Self {
        Self::new()
    }
}
