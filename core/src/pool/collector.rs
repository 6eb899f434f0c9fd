//! Single-consumer result collection

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Outcome;
use crate::metrics::{Aggregator, MetricsError};

/// Drains the shared results channel into the aggregator
///
/// Runs as the single consumer of the results channel, so the aggregator is
/// only ever touched from one task and needs no locking. The collector
/// finishes when the channel closes (normal shutdown) or cancellation
/// fires; on cancellation it still consumes outcomes already buffered in
/// the channel so accepted results are not lost.
pub struct ResultCollector {
    results_rx: mpsc::Receiver<Outcome>,
    aggregator: Box<dyn Aggregator>,
    cancel: CancellationToken,
}

impl ResultCollector {
    /// Create a collector over the given channel and aggregator
    pub fn new(
        results_rx: mpsc::Receiver<Outcome>,
        aggregator: Box<dyn Aggregator>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            results_rx,
            aggregator,
            cancel,
        }
    }

    /// Drain outcomes until the channel closes or cancellation fires
    ///
    /// Returns the aggregator for final aggregation. A recording failure
    /// (exact aggregator over capacity) is fatal: the shared token is
    /// cancelled so workers and the submission path stop promptly, and the
    /// error is returned.
    pub async fn run(mut self) -> Result<Box<dyn Aggregator>, MetricsError> {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    while let Ok(outcome) = self.results_rx.try_recv() {
                        self.record(outcome)?;
                    }
                    tracing::debug!("collector stopped on cancellation");
                    break;
                }

                next = self.results_rx.recv() => match next {
                    Some(outcome) => {
                        if let Err(error) = self.record(outcome) {
                            tracing::error!(error = %error, "metrics recording failed, aborting run");
                            self.cancel.cancel();
                            return Err(error);
                        }
                    }
                    None => {
                        tracing::debug!("results channel closed, collector finishing");
                        break;
                    }
                },
            }
        }

        Ok(self.aggregator)
    }

    fn record(&mut self, outcome: Outcome) -> Result<(), MetricsError> {
        match outcome {
            Outcome::Success { duration } => self.aggregator.add_response(duration),
            Outcome::Skipped => {
                self.aggregator.add_skipped();
                Ok(())
            }
            Outcome::Failed => {
                self.aggregator.add_failed();
                Ok(())
            }
        }
    }
}
