//! Exact aggregation: every sample retained, overflow is a loud failure

use std::time::Duration;

use super::{Aggregator, MetricsError, Summary};

/// Hard upper bound on the exact aggregator's capacity
///
/// `Duration` samples are 16 bytes, so the bound caps retained memory at a
/// few megabytes regardless of what the caller asks for.
pub const EXACT_MAX_CAPACITY: usize = 1_000_000;

/// Capacity used by [`ExactAggregator::new`]
pub const EXACT_DEFAULT_CAPACITY: usize = 100_000;

/// Exact metrics aggregator
///
/// Keeps every response duration in memory. Not scalable to unbounded
/// streams, but simple, and the reference against which the sampling
/// strategy is verified. Its contract is exactness up to the declared
/// capacity: one sample past that is a [`MetricsError::CapacityExceeded`],
/// never a silent drop.
#[derive(Debug)]
pub struct ExactAggregator {
    responses: Vec<Duration>,
    capacity: usize,
    total_time: Duration,
    min: Duration,
    max: Duration,
    skipped: usize,
    failed: usize,
}

impl ExactAggregator {
    /// Create an aggregator with the default capacity
    pub fn new() -> Self {
        Self {
            responses: Vec::new(),
            capacity: EXACT_DEFAULT_CAPACITY,
            total_time: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            skipped: 0,
            failed: 0,
        }
    }

    /// Create an aggregator with a pre-allocated capacity
    ///
    /// When the number of input rows is known up front, pre-allocating
    /// avoids re-allocations. Capacity must be within
    /// `[1, EXACT_MAX_CAPACITY]`; an unchecked `usize` could ask for
    /// petabytes of RAM.
    pub fn with_capacity(capacity: usize) -> Result<Self, MetricsError> {
        if capacity < 1 || capacity > EXACT_MAX_CAPACITY {
            return Err(MetricsError::InvalidCapacity {
                requested: capacity,
                max: EXACT_MAX_CAPACITY,
            });
        }

        Ok(Self {
            responses: Vec::with_capacity(capacity),
            capacity,
            total_time: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            skipped: 0,
            failed: 0,
        })
    }

    /// Number of responses retained so far
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Whether no responses have been recorded yet
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl Default for ExactAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator for ExactAggregator {
    fn add_response(&mut self, duration: Duration) -> Result<(), MetricsError> {
        if self.responses.len() == self.capacity {
            return Err(MetricsError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        if self.responses.is_empty() || duration < self.min {
            self.min = duration;
        }
        if self.responses.is_empty() || duration > self.max {
            self.max = duration;
        }
        self.total_time += duration;
        self.responses.push(duration);

        Ok(())
    }

    fn add_skipped(&mut self) {
        self.skipped += 1;
    }

    fn add_failed(&mut self) {
        self.failed += 1;
    }

    fn aggregate(&mut self) -> Summary {
        let processed = self.responses.len();
        if processed == 0 {
            return Summary::empty(self.skipped, self.failed);
        }

        self.responses.sort_unstable();

        Summary {
            processed,
            skipped: self.skipped,
            failed: self.failed,
            total_time: self.total_time,
            min: self.min,
            // upper-middle element for even counts, not an averaged pair
            median: self.responses[processed / 2],
            average: self.total_time / processed as u32,
            max: self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    #[test]
    fn test_with_capacity_zero() {
        let result = ExactAggregator::with_capacity(0);
        assert_eq!(
            result.unwrap_err(),
            MetricsError::InvalidCapacity {
                requested: 0,
                max: EXACT_MAX_CAPACITY
            }
        );
    }

    #[test]
    fn test_with_capacity_too_large() {
        let result = ExactAggregator::with_capacity(EXACT_MAX_CAPACITY + 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_capacity_bounds_are_valid() {
        assert!(ExactAggregator::with_capacity(1).is_ok());
        assert!(ExactAggregator::with_capacity(EXACT_MAX_CAPACITY).is_ok());
    }

    #[test]
    fn test_aggregate_one_through_ten_seconds() {
        let mut aggregator = ExactAggregator::new();
        for value in 1..=10 {
            aggregator.add_response(seconds(value)).unwrap();
        }

        let summary = aggregator.aggregate();
        assert_eq!(summary.processed, 10);
        assert_eq!(summary.total_time, seconds(55));
        assert_eq!(summary.min, seconds(1));
        assert_eq!(summary.median, seconds(6));
        assert_eq!(summary.average, seconds(55) / 10);
        assert_eq!(summary.max, seconds(10));
    }

    #[test]
    fn test_aggregate_unsorted_input() {
        let mut aggregator = ExactAggregator::new();
        for value in [5u64, 1, 9, 3, 7] {
            aggregator.add_response(seconds(value)).unwrap();
        }

        let summary = aggregator.aggregate();
        assert_eq!(summary.min, seconds(1));
        assert_eq!(summary.median, seconds(5));
        assert_eq!(summary.max, seconds(9));
    }

    #[test]
    fn test_capacity_exceeded_is_typed_error() {
        let mut aggregator = ExactAggregator::with_capacity(3).unwrap();
        for _ in 0..3 {
            aggregator.add_response(seconds(1)).unwrap();
        }

        let error = aggregator.add_response(seconds(1)).unwrap_err();
        assert_eq!(error, MetricsError::CapacityExceeded { capacity: 3 });
        // nothing was silently dropped or truncated
        assert_eq!(aggregator.len(), 3);
        assert_eq!(aggregator.aggregate().total_time, seconds(3));
    }

    #[test]
    fn test_skipped_and_failed_counts() {
        let mut aggregator = ExactAggregator::new();
        aggregator.add_skipped();
        aggregator.add_skipped();
        aggregator.add_failed();

        let summary = aggregator.aggregate();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_first_response_initializes_min_and_max() {
        let mut aggregator = ExactAggregator::new();
        aggregator.add_response(seconds(4)).unwrap();

        let summary = aggregator.aggregate();
        assert_eq!(summary.min, seconds(4));
        assert_eq!(summary.max, seconds(4));
        assert_eq!(summary.median, seconds(4));
    }
}
