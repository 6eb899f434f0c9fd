//! Affinity-routed worker pool
//!
//! The pool owns N lanes and N worker loops, one per lane. Submission
//! resolves each query's hostname to a lane through the [`AffinityRouter`],
//! so every query for a given hostname executes on the same worker in
//! submission order; workers never contend for a per-key resource because
//! no two of them ever see the same key.
//!
//! Each worker runs the simple loop: **receive -> execute -> report ->
//! repeat**. Execution failures never abort other workers; the worker
//! reports [`Outcome::Failed`] and moves on to the next item on its lane.
//! Cancellation is cooperative and observed at every blocking point (lane
//! hand-off, lane receive, outcome report); an executor call already in
//! flight always runs to completion.
//!
//! Shutdown follows a strict order — close all lanes, join all workers,
//! then close the shared results channel — so no worker can ever report
//! into a closed channel.

mod collector;
mod router;
mod worker;
mod worker_pool;

pub use collector::ResultCollector;
pub use router::AffinityRouter;
pub use worker::WorkerReport;
pub use worker_pool::{WorkerPool, MAX_WORKERS};

use std::time::Duration;

/// The result of attempting one work item
///
/// Produced exactly once per item, by the worker that executed it or by the
/// submission path for rows that never reached a lane, and consumed exactly
/// once by the result collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The query executed successfully
    Success {
        /// Wall-clock duration of the execution
        duration: Duration,
    },
    /// The input row could not be decoded; the item was never executed
    Skipped,
    /// Execution failed after the client exhausted its retries
    Failed,
}
