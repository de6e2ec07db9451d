//! Ledger Sweeper
//!
//! Periodically drops terminal attempts past the retention horizon. A guard
//! keeps overlapping cycles from running at the same time.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::service::RedemptionService;

/// Periodic ledger sweeper
pub struct LedgerSweeper {
    service: Arc<RedemptionService>,
    period: Duration,
    guard: Mutex<()>,
}

impl LedgerSweeper {
    pub fn new(service: Arc<RedemptionService>, period: Duration) -> Self {
        Self {
            service,
            period,
            guard: Mutex::new(()),
        }
    }

    /// Run a single sweep; `None` when another cycle is still running
    pub async fn sweep_once(&self) -> Option<usize> {
        let _running = match self.guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("sweep already in progress, skipping");
                return None;
            }
        };

        match self.service.sweep_expired().await {
            Ok(removed) => {
                if removed > 0 {
                    info!(removed, "swept expired redemption attempts");
                }
                Some(removed)
            }
            Err(e) => {
                warn!(error = %e, "sweep failed");
                Some(0)
            }
        }
    }

    /// Run the sweeper until the task is dropped
    pub async fn run(self: Arc<Self>) {
        info!(period_secs = self.period.as_secs(), "ledger sweeper started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep_once().await;
        }
    }

    /// Spawn the sweeper on the current runtime
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
