//! Continuous pull loop.
//!
//! ```text
//! Idle(delay) ──sleep──▶ Resolving ──URL──▶ Receiving ──batch settled──▶ Idle(poll interval)
//! ```
//!
//! The first cycle starts at once. The queue is resolved again on every cycle.
//! Cancellation is checked before each cycle, raced against the sleep and
//! against a creation retry during resolution, and checked again before the
//! receive. A batch already handed to the handler runs to completion.

use crate::client::{BatchOutcome, QueueClient};
use crate::error::QueueError;
use crate::handler::MessageHandler;
use crate::message::QueueUrl;
use crate::request::ReceiveRequest;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "pull_tests.rs"]
mod tests;

/// Where the loop is within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullState {
    Idle { delay: Duration },
    Resolving,
    Receiving(QueueUrl),
}

/// Totals over the lifetime of a pull loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub cycles: u64,
    pub received: u64,
    pub acknowledged: u64,
    pub rejected: u64,
    pub delete_failed: u64,
}

impl PullSummary {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.received += outcome.received as u64;
        self.acknowledged += outcome.acknowledged as u64;
        self.rejected += outcome.rejected as u64;
        self.delete_failed += outcome.delete_failed as u64;
    }
}

impl QueueClient {
    /// Receive batches from a queue until `cancel` (or the client's own token)
    /// is cancelled.
    ///
    /// Returns the loop totals on cancellation. A failed resolution or receive
    /// ends the loop with [`QueueError::PullLoopAborted`].
    pub async fn pull<H>(
        &self,
        request: impl Into<ReceiveRequest>,
        handler: &H,
        cancel: &CancellationToken,
    ) -> Result<PullSummary, QueueError>
    where
        H: MessageHandler + ?Sized,
    {
        let request = request.into();
        let shutdown = self.cancellation_token();
        let poll_interval = self.config().poll_interval();
        let mut summary = PullSummary::default();
        let mut state = PullState::Idle {
            delay: Duration::ZERO,
        };

        info!(queue = %request.target, poll_interval_secs = poll_interval.as_secs(), "Starting pull loop");

        loop {
            state = match state {
                PullState::Idle { delay } => {
                    if cancel.is_cancelled() || shutdown.is_cancelled() {
                        break;
                    }
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    summary.cycles += 1;
                    PullState::Resolving
                }
                PullState::Resolving => {
                    debug!(cycle = summary.cycles, queue = %request.target, "Resolving queue");
                    match self.resolve(&request.target, cancel).await {
                        Ok(_) if cancel.is_cancelled() || shutdown.is_cancelled() => break,
                        Ok(url) => PullState::Receiving(url),
                        Err(QueueError::Cancelled { .. }) => break,
                        Err(e) => return Err(abort(summary.cycles, e)),
                    }
                }
                PullState::Receiving(url) => {
                    let outcome = self
                        .receive_batch(&url, &request, handler)
                        .await
                        .map_err(|e| abort(summary.cycles, e))?;
                    summary.record(&outcome);
                    debug!(
                        cycle = summary.cycles,
                        received = outcome.received,
                        "Pull cycle complete"
                    );
                    PullState::Idle {
                        delay: poll_interval,
                    }
                }
            };
        }

        info!(
            cycles = summary.cycles,
            received = summary.received,
            acknowledged = summary.acknowledged,
            "Pull loop stopped"
        );
        Ok(summary)
    }
}

fn abort(cycle: u64, source: QueueError) -> QueueError {
    warn!(cycle, error = %source, "Pull loop aborted");
    QueueError::PullLoopAborted {
        cycle,
        source: Box::new(source),
    }
}
