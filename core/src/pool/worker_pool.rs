//! The affinity-routed worker pool

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::router::AffinityRouter;
use super::worker::{self, WorkerReport};
use super::Outcome;
use crate::client::QueryClient;
use crate::error::Error;
use crate::query::Query;

/// Upper bound on the pool's worker count
pub const MAX_WORKERS: usize = 128;

/// A fixed set of workers, each owning one lane
///
/// [`WorkerPool::start`] spawns all worker loops up front. Items are handed
/// to lanes through [`WorkerPool::submit`], which resolves the item's lane
/// via the affinity router so all items sharing a hostname execute on the
/// same worker in submission order.
///
/// [`WorkerPool::shutdown`] closes every lane and joins every worker before
/// the shared results channel is closed. That ordering is the load-bearing
/// invariant of the whole pool: the results channel must outlive the last
/// worker that could still report into it.
pub struct WorkerPool {
    router: AffinityRouter,
    lanes: Vec<mpsc::Sender<Query>>,
    results_tx: mpsc::Sender<Outcome>,
    workers: Vec<JoinHandle<WorkerReport>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `num_workers` worker loops and return the pool plus the
    /// receiving end of the shared results channel
    ///
    /// The receiver is handed to a single result collector; the pool and
    /// its workers keep the sending side.
    pub fn start(
        num_workers: usize,
        client: Arc<dyn QueryClient>,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Outcome>), Error> {
        if num_workers < 1 || num_workers > MAX_WORKERS {
            return Err(Error::Config(format!(
                "worker count must be within [1, {MAX_WORKERS}], got {num_workers}"
            )));
        }

        let (results_tx, results_rx) = mpsc::channel(1);
        let mut lanes = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            // one single-slot lane per worker: hand-off semantics, owned
            // exclusively by that worker
            let (lane_tx, lane_rx) = mpsc::channel(1);
            lanes.push(lane_tx);
            workers.push(tokio::spawn(worker::run(
                worker_id,
                lane_rx,
                results_tx.clone(),
                Arc::clone(&client),
                cancel.clone(),
            )));
        }

        tracing::debug!(num_workers, "worker pool started");

        let pool = Self {
            router: AffinityRouter::new(num_workers),
            lanes,
            results_tx,
            workers,
            cancel,
        };

        Ok((pool, results_rx))
    }

    /// Hand a query to its affine lane
    ///
    /// Blocks until the lane accepts the item or cancellation fires, in
    /// which case [`Error::Cancelled`] is returned and the item is dropped.
    pub async fn submit(&mut self, query: Query) -> Result<(), Error> {
        let lane = self.router.resolve(&query.hostname);

        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(Error::Cancelled),

            sent = self.lanes[lane].send(query) => sent.map_err(|_| {
                if self.cancel.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::Pool(format!("lane {lane} closed while pool running"))
                }
            }),
        }
    }

    /// Report an item that was skipped before reaching any lane
    ///
    /// Used by the submission path for rows that failed to decode, so the
    /// final summary still accounts for them.
    pub async fn report_skipped(&self) -> Result<(), Error> {
        tokio::select! {
            biased;

            _ = self.cancel.cancelled() => Err(Error::Cancelled),

            sent = self.results_tx.send(Outcome::Skipped) => sent.map_err(|_| {
                if self.cancel.is_cancelled() {
                    Error::Cancelled
                } else {
                    Error::Pool("results channel closed while pool running".into())
                }
            }),
        }
    }

    /// Number of lanes (= workers) owned by this pool
    pub fn lanes(&self) -> usize {
        self.router.lanes()
    }

    /// Close every lane, join every worker, then close the results channel
    ///
    /// Closing the lanes signals "no more work"; each worker drains its
    /// pending item (if any) and terminates. Only once every worker has been
    /// joined is the pool's results sender dropped, closing the channel for
    /// the collector. Swapping those two steps would allow a worker to
    /// report into a closed channel under some interleavings.
    pub async fn shutdown(mut self) -> Vec<WorkerReport> {
        self.lanes.clear();

        let mut reports = Vec::with_capacity(self.workers.len());
        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    tracing::error!(worker_id, error = %error, "worker task panicked");
                }
            }
        }

        // every worker is joined; now the results channel may close
        drop(self.results_tx);
        tracing::debug!(workers = reports.len(), "worker pool shut down");

        reports
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("lanes", &self.lanes.len())
            .field("bound_keys", &self.router.bindings())
            .finish()
    }
}
