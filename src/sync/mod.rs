//! Periodic control loop
//!
//! Every period: refresh the application registry from the feed (which also
//! prunes the learned cache), then reconcile every community. Passes never
//! overlap. A feed failure only skips the refresh; a store failure stops the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::apps::ApplicationFeed;
use crate::error::Result;
use crate::reconcile::{PassReport, Reconciler};

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Size of the refreshed application set, `None` if the refresh failed
    pub refreshed: Option<usize>,
    pub pass: PassReport,
}

/// Timer-driven refresh and reconcile
pub struct ControlLoop {
    reconciler: Arc<Reconciler>,
    feed: Arc<dyn ApplicationFeed>,
    period: Duration,
    run_on_start: bool,
}

impl ControlLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        feed: Arc<dyn ApplicationFeed>,
        period: Duration,
        run_on_start: bool,
    ) -> Self {
        Self {
            reconciler,
            feed,
            period,
            run_on_start,
        }
    }

    /// Refresh the registry, then reconcile every community
    pub async fn tick(&self) -> Result<TickReport> {
        let refreshed = match self.reconciler.registry().refresh(self.feed.as_ref()).await {
            Ok(count) => Some(count),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    source = %self.feed.source(),
                    error = %e.format_for_log(),
                    "Application id refresh failed, keeping previous set"
                );
                None
            }
        };

        let pass = self.reconciler.reconcile_all_communities().await?;
        info!(
            communities = pass.communities,
            members = pass.members,
            granted = pass.granted,
            revoked = pass.revoked,
            failed = pass.failed,
            "Reconciliation pass complete"
        );

        Ok(TickReport { refreshed, pass })
    }

    /// Run until `shutdown` turns true or its sender is dropped
    ///
    /// A pass in flight when shutdown arrives is dropped at its next await point.
    /// Returns the number of completed ticks.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        let start = if self.run_on_start {
            Instant::now()
        } else {
            Instant::now() + self.period
        };
        let mut timer = tokio::time::interval_at(start, self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_secs = self.period.as_secs(),
            run_on_start = self.run_on_start,
            "Control loop started"
        );

        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!(ticks, "Shutdown requested, stopping control loop");
                    break;
                }

                result = async {
                    timer.tick().await;
                    self.tick().await
                } => {
                    match result {
                        Ok(_) => ticks += 1,
                        Err(e) => {
                            error!(error = %e.format_for_log(), "Control loop stopped");
                            return Err(e);
                        }
                    }
                }
            }
        }

        Ok(ticks)
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
