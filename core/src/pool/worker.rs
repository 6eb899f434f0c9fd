//! The per-lane worker loop

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Outcome;
use crate::client::QueryClient;
use crate::query::Query;

/// Per-worker accounting returned when the worker loop terminates
#[derive(Debug, Default, Clone)]
pub struct WorkerReport {
    /// Index of the worker (and its lane)
    pub worker_id: usize,

    /// Queries executed successfully
    pub executed: usize,

    /// Queries whose execution failed
    pub failed: usize,

    /// Outcomes dropped because cancellation fired while reporting
    pub dropped: usize,
}

impl WorkerReport {
    fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }
}

/// Run one worker loop until its lane closes or cancellation fires
///
/// Each received item is executed through the client and yields exactly one
/// outcome on the results channel, except when cancellation fires at the
/// reporting point: the pending outcome is then dropped, counted in the
/// report, and logged.
pub(crate) async fn run(
    worker_id: usize,
    mut lane: mpsc::Receiver<Query>,
    results: mpsc::Sender<Outcome>,
    client: Arc<dyn QueryClient>,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut report = WorkerReport::new(worker_id);
    tracing::debug!(worker_id, "worker started");

    loop {
        let query = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(worker_id, "worker cancelled");
                break;
            }

            next = lane.recv() => match next {
                Some(query) => query,
                None => {
                    tracing::debug!(worker_id, "lane closed, worker stopping");
                    break;
                }
            },
        };

        let started = Instant::now();
        let outcome = match client.execute(&query.build()).await {
            Ok(_) => {
                report.executed += 1;
                Outcome::Success {
                    duration: started.elapsed(),
                }
            }
            Err(error) => {
                report.failed += 1;
                tracing::warn!(
                    worker_id,
                    hostname = %query.hostname,
                    error = %error,
                    "query execution failed"
                );
                Outcome::Failed
            }
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                report.dropped += 1;
                tracing::warn!(worker_id, "cancelled while reporting outcome, result dropped");
                break;
            }

            sent = results.send(outcome) => {
                if sent.is_err() {
                    if cancel.is_cancelled() {
                        report.dropped += 1;
                        tracing::warn!(worker_id, "cancelled while reporting outcome, result dropped");
                    } else {
                        // the shutdown protocol closes results only after all
                        // workers are joined, so this should be unreachable
                        tracing::error!(worker_id, "results channel closed while worker running");
                    }
                    break;
                }
            }
        }
    }

    tracing::debug!(
        worker_id,
        executed = report.executed,
        failed = report.failed,
        dropped = report.dropped,
        "worker finished"
    );

    report
}
