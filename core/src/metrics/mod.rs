//! Latency metrics aggregation
//!
//! Two interchangeable strategies implement the same [`Aggregator`]
//! contract:
//!
//! - [`ExactAggregator`] retains every observed duration up to a declared
//!   capacity and never misreports: exceeding the capacity is a typed, loud
//!   failure rather than silent truncation.
//! - [`ReservoirAggregator`] bounds memory with single-pass reservoir
//!   sampling: `min`, `max`, `total`, and `average` remain exact for the
//!   full stream; only the median is approximated over the retained sample.
//!
//! When a stream fits inside the reservoir's sample size, the two
//! strategies produce identical [`Summary`] values, median included — that
//! equivalence is the primary cross-check between them.

mod exact;
mod reservoir;

pub use exact::{ExactAggregator, EXACT_DEFAULT_CAPACITY, EXACT_MAX_CAPACITY};
pub use reservoir::{
    RandomIndex, ReservoirAggregator, RESERVOIR_DEFAULT_SAMPLE_SIZE, RESERVOIR_MAX_SAMPLE_SIZE,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metrics errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    /// Requested capacity is outside the allowed range
    #[error("capacity must be within [1, {max}], got {requested}")]
    InvalidCapacity {
        /// The capacity that was requested
        requested: usize,
        /// The maximum allowed capacity
        max: usize,
    },

    /// Requested sample size is outside the allowed range
    #[error("sample size must be within [1, {max}], got {requested}")]
    InvalidSampleSize {
        /// The sample size that was requested
        requested: usize,
        /// The maximum allowed sample size
        max: usize,
    },

    /// The exact aggregator was asked to retain more than its capacity
    #[error("exact aggregator exceeded its declared capacity of {capacity}")]
    CapacityExceeded {
        /// The declared capacity that was exceeded
        capacity: usize,
    },
}

/// The aggregation contract shared by both strategies
///
/// An aggregator is only ever touched from the result collector's single
/// task, so implementations need no internal synchronization; `Send` is
/// required because the collector runs on its own task.
pub trait Aggregator: Send {
    /// Record one successful response duration
    ///
    /// Only the exact strategy can fail here, with
    /// [`MetricsError::CapacityExceeded`]; that failure is fatal for the
    /// whole run.
    fn add_response(&mut self, duration: Duration) -> Result<(), MetricsError>;

    /// Record one item that was skipped before execution
    fn add_skipped(&mut self);

    /// Record one item whose execution failed
    fn add_failed(&mut self);

    /// Compute the summary over everything recorded so far
    fn aggregate(&mut self) -> Summary;
}

/// Aggregated latency summary for one run
///
/// Derived on demand from the aggregator's internal state. When no
/// successful response was recorded, all duration statistics are zero and
/// only the counts are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Number of successfully processed queries
    pub processed: usize,
    /// Number of input rows skipped because they failed to decode
    pub skipped: usize,
    /// Number of queries whose execution failed
    pub failed: usize,
    /// Sum of all response durations
    pub total_time: Duration,
    /// Smallest single response duration
    pub min: Duration,
    /// Median response duration (upper-middle element for even counts)
    pub median: Duration,
    /// Mean response duration
    pub average: Duration,
    /// Largest single response duration
    pub max: Duration,
}

impl Summary {
    /// Summary with zeroed duration statistics and the given counts
    pub(crate) fn empty(skipped: usize, failed: usize) -> Self {
        Self {
            processed: 0,
            skipped,
            failed,
            total_time: Duration::ZERO,
            min: Duration::ZERO,
            median: Duration::ZERO,
            average: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Render a human-readable multi-line report
    ///
    /// Intended for end-of-run reporting and logs, not for programmatic
    /// consumption.
    pub fn table(&self) -> String {
        format!(
            "processed queries: {}\n\
             skipped queries:   {}\n\
             failed queries:    {}\n\
             total time:        {:?}\n\
             min:               {:?}\n\
             median:            {:?}\n\
             average:           {:?}\n\
             max:               {:?}",
            self.processed,
            self.skipped,
            self.failed,
            self.total_time,
            self.min,
            self.median,
            self.average,
            self.max,
        )
    }
}
