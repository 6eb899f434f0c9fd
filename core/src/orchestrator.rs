//! Run orchestration: startup, submission, shutdown, final aggregation
//!
//! The [`Orchestrator`] sequences one complete benchmark run: it starts the
//! worker pool, spawns the result collector, drains the work source into
//! the pool, then drives the ordered shutdown and retrieves the final
//! summary.
//!
//! Cancellation (deadline- or signal-derived) is not a failure: the
//! submission loop stops, already-dispatched queries finish, and the
//! partial summary is still returned with [`RunReport::interrupted`] set.
//! Only fatal conditions — a broken input stream, the exact aggregator
//! exceeding its capacity, construction errors — surface as `Err`.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::client::QueryClient;
use crate::config::BenchConfig;
use crate::error::{Error, Result};
use crate::metrics::{Aggregator, Summary};
use crate::pool::{ResultCollector, WorkerPool};
use crate::query::QuerySource;

/// The outcome of one benchmark run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Final aggregated summary
    pub summary: Summary,

    /// Whether the run was cancelled before the input was fully processed
    pub interrupted: bool,
}

/// Sequences one benchmark run from startup through final aggregation
pub struct Orchestrator {
    config: BenchConfig,
    client: Arc<dyn QueryClient>,
    source: Box<dyn QuerySource + Send>,
    aggregator: Box<dyn Aggregator>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Errors
    /// Returns a configuration error if the config fails validation.
    pub fn new(
        config: BenchConfig,
        client: Arc<dyn QueryClient>,
        source: Box<dyn QuerySource + Send>,
        aggregator: Box<dyn Aggregator>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            client,
            source,
            aggregator,
            cancel: CancellationToken::new(),
        })
    }

    /// Get a handle to the run's cancellation token
    ///
    /// Cancelling it stops submission and triggers the ordered shutdown;
    /// used to wire up Ctrl+C handling.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute the run, honoring the configured deadline if any
    pub async fn run(self) -> Result<RunReport> {
        match self.config.deadline {
            Some(deadline) => {
                let cancel = self.cancel.clone();
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(deadline).await;
                    tracing::info!(?deadline, "deadline reached, cancelling run");
                    cancel.cancel();
                });

                let result = self.run_inner().await;
                timer.abort();
                result
            }
            None => self.run_inner().await,
        }
    }

    async fn run_inner(mut self) -> Result<RunReport> {
        let started = Instant::now();

        let (mut pool, results_rx) =
            WorkerPool::start(self.config.workers, Arc::clone(&self.client), self.cancel.clone())?;
        let collector = ResultCollector::new(results_rx, self.aggregator, self.cancel.clone());
        let collector_handle = tokio::spawn(collector.run());

        tracing::info!(workers = self.config.workers, "run started");

        let mut interrupted = false;
        let mut fatal: Option<Error> = None;

        loop {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            match self.source.next_query() {
                Ok(Some(query)) => match pool.submit(query).await {
                    Ok(()) => {}
                    Err(Error::Cancelled) => {
                        interrupted = true;
                        break;
                    }
                    Err(error) => {
                        fatal = Some(error);
                        break;
                    }
                },
                Ok(None) => break,
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(error = %error, "skipping row that failed to decode");
                    match pool.report_skipped().await {
                        Ok(()) => {}
                        Err(Error::Cancelled) => {
                            interrupted = true;
                            break;
                        }
                        Err(error) => {
                            fatal = Some(error);
                            break;
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "work source failed, aborting run");
                    fatal = Some(Error::Source(error));
                    break;
                }
            }
        }

        if fatal.is_some() {
            // stop workers promptly; there is nothing useful left to report
            self.cancel.cancel();
        }

        let reports = pool.shutdown().await;
        for report in &reports {
            tracing::debug!(
                worker_id = report.worker_id,
                executed = report.executed,
                failed = report.failed,
                dropped = report.dropped,
                "worker joined"
            );
        }
        let dropped: usize = reports.iter().map(|report| report.dropped).sum();
        if dropped > 0 {
            tracing::warn!(dropped, "outcomes dropped while cancelling");
        }

        let mut aggregator = match collector_handle.await {
            Ok(Ok(aggregator)) => aggregator,
            Ok(Err(error)) => return Err(fatal.unwrap_or(Error::Metrics(error))),
            Err(join_error) => {
                return Err(fatal.unwrap_or_else(|| {
                    Error::Pool(format!("result collector failed: {join_error}"))
                }))
            }
        };

        if let Some(error) = fatal {
            return Err(error);
        }

        if self.cancel.is_cancelled() {
            interrupted = true;
        }

        let summary = aggregator.aggregate();
        tracing::info!(
            elapsed = ?started.elapsed(),
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            interrupted,
            "run complete"
        );

        Ok(RunReport {
            summary,
            interrupted,
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish()
    }
}
