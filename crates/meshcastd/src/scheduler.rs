//! Reconciliation scheduler.
//!
//! Each tick bumps an invocation counter. Every `threshold`th tick the
//! counter wraps to zero, cluster maintenance runs, and every known network
//! gets a forced peer resync. Other ticks send nothing.

use meshcast_common::MeshcastError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::maintenance::Maintenance;
use crate::publishers::Propagator;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Lifetime tick number (1-based)
    pub tick: u64,
    /// This tick forced a resync
    pub forced: bool,
    /// Networks a peer update was attempted for
    pub networks: usize,
    /// Networks whose peer update reported an error
    pub failed_networks: usize,
}

/// Scheduler counters
#[derive(Clone, Debug, Default, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub forced_syncs: u64,
    pub counter: u32,
    pub threshold: u32,
}

pub struct ReconciliationScheduler {
    propagator: Arc<Propagator>,
    maintenance: Arc<dyn Maintenance>,
    /// Run firewall re-provisioning on forced ticks
    manage_firewall: bool,
    threshold: u32,
    counter: AtomicU32,
    ticks: AtomicU64,
    forced_syncs: AtomicU64,
}

impl ReconciliationScheduler {
    pub fn new(
        propagator: Arc<Propagator>,
        maintenance: Arc<dyn Maintenance>,
        threshold: u32,
        manage_firewall: bool,
    ) -> Self {
        Self {
            propagator,
            maintenance,
            manage_firewall,
            threshold: threshold.max(1),
            counter: AtomicU32::new(0),
            ticks: AtomicU64::new(0),
            forced_syncs: AtomicU64::new(0),
        }
    }

    /// Bump the counter; true when it reached the threshold and wrapped
    fn advance(&self) -> bool {
        let threshold = self.threshold;
        let previous = match self.counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
            Some(if c + 1 >= threshold { 0 } else { c + 1 })
        }) {
            Ok(c) | Err(c) => c,
        };
        previous + 1 >= threshold
    }

    /// One reconciliation tick. Failures are logged, never returned.
    pub async fn tick(&self) -> TickOutcome {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let networks = match self.propagator.registry().networks().await {
            Ok(networks) => networks,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list networks for reconciliation");
                Vec::new()
            }
        };

        let forced = self.advance();
        if !forced {
            return TickOutcome {
                tick,
                ..Default::default()
            };
        }

        self.forced_syncs.fetch_add(1, Ordering::Relaxed);
        self.run_maintenance().await;

        tracing::info!(tick, networks = networks.len(), "🔄 Sending scheduled peer update");
        let mut failed_networks = 0;
        for network in &networks {
            if let Err(e) = self.propagator.publish_peer_update(&network.net_id, false).await {
                failed_networks += 1;
                tracing::error!(network = %network.net_id, error = %e, "Scheduled peer update failed");
            }
        }

        TickOutcome {
            tick,
            forced,
            networks: networks.len(),
            failed_networks,
        }
    }

    async fn run_maintenance(&self) {
        if self.manage_firewall {
            log_step("firewall re-provisioning", self.maintenance.reprovision_firewall().await);
        }
        log_step("host refresh", self.maintenance.refresh_host().await);
        log_step("telemetry checkpoint", self.maintenance.timer_checkpoint().await);
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            forced_syncs: self.forced_syncs.load(Ordering::Relaxed),
            counter: self.counter.load(Ordering::SeqCst),
            threshold: self.threshold,
        }
    }
}

fn log_step(step: &'static str, result: Result<(), MeshcastError>) {
    if let Err(e) = result {
        tracing::warn!(step, error = %e, "Maintenance step failed");
    }
}

/// Calls [`ReconciliationScheduler::tick`] on a fixed cadence until shutdown
pub async fn scheduler_worker(
    scheduler: Arc<ReconciliationScheduler>,
    period: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(period = ?period, threshold = scheduler.threshold, "⏱️ Reconciliation scheduler started");

    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let outcome = scheduler.tick().await;
                tracing::trace!(
                    tick = outcome.tick,
                    forced = outcome.forced,
                    networks = outcome.networks,
                    failed_networks = outcome.failed_networks,
                    "Reconciliation tick"
                );
            }
            _ = shutdown.recv() => {
                tracing::info!("⏱️ Reconciliation scheduler shutting down");
                break;
            }
        }
    }
}
