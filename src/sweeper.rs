//! Sweep Worker
//!
//! Background loop that releases expired holds and advances dispute phases
//! whose deadline has passed.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::dispute::DisputeEngine;
use crate::transfer::TransferEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Held transfers auto-released
    pub released: usize,
    /// Disputes moved to their next phase
    pub escalated: usize,
}

pub struct SweepWorker {
    transfers: Arc<TransferEngine>,
    disputes: Arc<DisputeEngine>,
    interval: Duration,
}

impl SweepWorker {
    pub fn new(
        transfers: Arc<TransferEngine>,
        disputes: Arc<DisputeEngine>,
        interval: Duration,
    ) -> Self {
        Self {
            transfers,
            disputes,
            interval,
        }
    }

    /// One pass over both sweeps. A failing sweep is logged and counted as zero.
    pub async fn run_once(&self) -> SweepReport {
        let released = match self.transfers.sweep_expired().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Transfer sweep failed");
                0
            }
        };
        let escalated = match self.disputes.sweep_expired_phases().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Dispute sweep failed");
                0
            }
        };

        let report = SweepReport {
            released,
            escalated,
        };
        if released > 0 || escalated > 0 {
            info!(released, escalated, "Sweep pass complete");
        } else {
            debug!("Sweep pass found nothing due");
        }
        report
    }

    /// Sweep on every tick until `shutdown` resolves
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        info!(interval_secs = self.interval.as_secs(), "Starting sweep worker");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        info!("Sweep worker stopped");
    }
}
