//! Reservoir-sampled aggregation: bounded memory for unbounded streams

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Aggregator, MetricsError, Summary};

/// Hard upper bound on the reservoir's sample size
pub const RESERVOIR_MAX_SAMPLE_SIZE: usize = 1_000_000;

/// Sample size used by [`ReservoirAggregator::new`]
pub const RESERVOIR_DEFAULT_SAMPLE_SIZE: usize = 10_000;

/// Uniform integer generator: given `n`, returns a value in `[0, n)`
///
/// Injected at construction so the sampling behavior is reproducible in
/// tests.
pub type RandomIndex = Box<dyn FnMut(usize) -> usize + Send>;

/// Reservoir-sampling metrics aggregator
///
/// Same external contract as [`super::ExactAggregator`], but memory is
/// bounded by a fixed sample size regardless of stream length. `min`,
/// `max`, `total_time`, and `average` are computed from the full stream and
/// stay exact; only the median is approximated over the retained sample.
///
/// While fewer than `sample_size` responses have been seen, the retained
/// buffer is the full stream. After that, the standard single-pass
/// reservoir step keeps the buffer a uniform random subset of everything
/// seen so far: draw `j` uniformly from `[0, seen)` and overwrite
/// `retained[j]` when `j < sample_size`, otherwise discard. Where the exact
/// strategy fails loudly at capacity, this one samples and keeps going.
pub struct ReservoirAggregator {
    retained: Vec<Duration>,
    sample_size: usize,
    seen: usize,
    total_time: Duration,
    min: Duration,
    max: Duration,
    skipped: usize,
    failed: usize,
    random_index: RandomIndex,
}

impl ReservoirAggregator {
    /// Create an aggregator with the default sample size
    pub fn new(random_index: RandomIndex) -> Self {
        Self {
            retained: Vec::with_capacity(RESERVOIR_DEFAULT_SAMPLE_SIZE),
            sample_size: RESERVOIR_DEFAULT_SAMPLE_SIZE,
            seen: 0,
            total_time: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            skipped: 0,
            failed: 0,
            random_index,
        }
    }

    /// Create an aggregator with an explicit sample size
    ///
    /// The sample size must be within `[1, RESERVOIR_MAX_SAMPLE_SIZE]`.
    pub fn with_sample_size(
        sample_size: usize,
        random_index: RandomIndex,
    ) -> Result<Self, MetricsError> {
        if sample_size < 1 || sample_size > RESERVOIR_MAX_SAMPLE_SIZE {
            return Err(MetricsError::InvalidSampleSize {
                requested: sample_size,
                max: RESERVOIR_MAX_SAMPLE_SIZE,
            });
        }

        Ok(Self {
            retained: Vec::with_capacity(sample_size),
            sample_size,
            seen: 0,
            total_time: Duration::ZERO,
            min: Duration::ZERO,
            max: Duration::ZERO,
            skipped: 0,
            failed: 0,
            random_index,
        })
    }

    /// Create an aggregator backed by an entropy-seeded generator
    pub fn from_entropy(sample_size: usize) -> Result<Self, MetricsError> {
        let mut rng = StdRng::from_entropy();
        Self::with_sample_size(sample_size, Box::new(move |n| rng.gen_range(0..n)))
    }

    /// Number of durations currently retained in the sample buffer
    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    /// Number of responses ever recorded, retained or not
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl Aggregator for ReservoirAggregator {
    fn add_response(&mut self, duration: Duration) -> Result<(), MetricsError> {
        self.seen += 1;
        self.total_time += duration;

        if self.seen == 1 || duration < self.min {
            self.min = duration;
        }
        if self.seen == 1 || duration > self.max {
            self.max = duration;
        }

        if self.retained.len() < self.sample_size {
            self.retained.push(duration);
        } else {
            let j = (self.random_index)(self.seen);
            if j < self.sample_size {
                self.retained[j] = duration;
            }
        }

        Ok(())
    }

    fn add_skipped(&mut self) {
        self.skipped += 1;
    }

    fn add_failed(&mut self) {
        self.failed += 1;
    }

    fn aggregate(&mut self) -> Summary {
        if self.seen == 0 {
            return Summary::empty(self.skipped, self.failed);
        }

        self.retained.sort_unstable();

        Summary {
            processed: self.seen,
            skipped: self.skipped,
            failed: self.failed,
            total_time: self.total_time,
            min: self.min,
            median: self.retained[self.retained.len() / 2],
            average: self.total_time / self.seen as u32,
            max: self.max,
        }
    }
}

impl std::fmt::Debug for ReservoirAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservoirAggregator")
            .field("sample_size", &self.sample_size)
            .field("seen", &self.seen)
            .field("retained", &self.retained.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    /// Deterministic generator cycling through a fixed script of draws.
    fn scripted(draws: Vec<usize>) -> RandomIndex {
        let mut position = 0;
        Box::new(move |_n| {
            let draw = draws[position % draws.len()];
            position += 1;
            draw
        })
    }

    #[test]
    fn test_with_sample_size_zero() {
        let result = ReservoirAggregator::with_sample_size(0, Box::new(|_| 0));
        assert_eq!(
            result.unwrap_err(),
            MetricsError::InvalidSampleSize {
                requested: 0,
                max: RESERVOIR_MAX_SAMPLE_SIZE
            }
        );
    }

    #[test]
    fn test_with_sample_size_too_large() {
        let result =
            ReservoirAggregator::with_sample_size(RESERVOIR_MAX_SAMPLE_SIZE + 1, Box::new(|_| 0));
        assert!(result.is_err());
    }

    #[test]
    fn test_aggregate_one_through_ten_seconds() {
        let mut aggregator = ReservoirAggregator::new(Box::new(|_| 0));
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
    fn test_never_errors_past_sample_size() {
        let mut aggregator =
            ReservoirAggregator::with_sample_size(4, Box::new(|seen| seen - 1)).unwrap();
        for value in 1..=100 {
            aggregator.add_response(seconds(value)).unwrap();
        }

        assert_eq!(aggregator.retained_len(), 4);
        assert_eq!(aggregator.seen(), 100);
    }

    #[test]
    fn test_exact_fields_survive_sampling() {
        let mut aggregator =
            ReservoirAggregator::with_sample_size(2, scripted(vec![0, 1, 5, 0])).unwrap();
        for value in [10u64, 3, 8, 1, 12, 4] {
            aggregator.add_response(seconds(value)).unwrap();
        }

        let summary = aggregator.aggregate();
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.total_time, seconds(38));
        assert_eq!(summary.min, seconds(1));
        assert_eq!(summary.max, seconds(12));
        assert_eq!(summary.average, seconds(38) / 6);
    }

    #[test]
    fn test_scripted_replacement_is_deterministic() {
        // Buffer fills with [1, 2]; the scripted draws then replace index 0
        // with 3, discard 4 (draw >= sample size), and replace index 1 with 5.
        let mut aggregator =
            ReservoirAggregator::with_sample_size(2, scripted(vec![0, 7, 1])).unwrap();
        for value in 1..=5 {
            aggregator.add_response(seconds(value)).unwrap();
        }

        let summary = aggregator.aggregate();
        // retained is now [3, 5]; sorted median index 1 -> 5s
        assert_eq!(summary.median, seconds(5));
        assert_eq!(summary.processed, 5);
    }

    #[test]
    fn test_discard_draw_leaves_buffer_untouched() {
        let mut aggregator =
            ReservoirAggregator::with_sample_size(3, Box::new(|_| usize::MAX)).unwrap();
        for value in 1..=10 {
            aggregator.add_response(seconds(value)).unwrap();
        }

        // every post-fill draw discarded, so the buffer is the first 3 items
        let summary = aggregator.aggregate();
        assert_eq!(summary.median, seconds(2));
        assert_eq!(summary.min, seconds(1));
        assert_eq!(summary.max, seconds(10));
    }

    #[test]
    fn test_skipped_and_failed_counts() {
        let mut aggregator = ReservoirAggregator::new(Box::new(|_| 0));
        aggregator.add_skipped();
        aggregator.add_failed();

        let summary = aggregator.aggregate();
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.median, Duration::ZERO);
    }
}
