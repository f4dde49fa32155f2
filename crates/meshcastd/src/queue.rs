//! Background network-wide broadcasts.
//!
//! External-peer changes ask for a full peer resync of the node's network
//! without waiting for it. Requests go through a bounded queue drained by a
//! single worker; the requester never sees the outcome, failures only reach
//! the log. When the queue is full the request is dropped: the next
//! reconciliation tick resyncs the network anyway.

use meshcast_common::MeshcastError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

use crate::publishers::Propagator;

/// One pending network-wide peer update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTask {
    pub network: String,
    /// Node whose change caused the broadcast
    pub trigger_node: String,
}

#[derive(Default)]
struct QueueStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of broadcast queue counters
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct QueueStatsSnapshot {
    pub submitted: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Submission side of the broadcast queue
#[derive(Clone)]
pub struct BroadcastQueue {
    tx: mpsc::Sender<BroadcastTask>,
    stats: Arc<QueueStats>,
}

impl BroadcastQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BroadcastTask>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                stats: Arc::new(QueueStats::default()),
            },
            rx,
        )
    }

    /// Enqueue without waiting
    pub fn submit(&self, task: BroadcastTask) -> Result<(), MeshcastError> {
        match self.tx.try_send(task) {
            Ok(()) => {
                self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    network = %task.network,
                    trigger_node = %task.trigger_node,
                    "Broadcast queue full, dropping network peer update"
                );
                Err(MeshcastError::Internal("broadcast queue full".to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(MeshcastError::Internal("broadcast worker stopped".to_string()))
            }
        }
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, ok: bool) {
        let counter = if ok {
            &self.stats.completed
        } else {
            &self.stats.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drains the broadcast queue until shutdown or until every sender is gone
pub async fn broadcast_worker(
    propagator: Arc<Propagator>,
    mut rx: mpsc::Receiver<BroadcastTask>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!("📣 Broadcast worker started");

    loop {
        tokio::select! {
            task = rx.recv() => {
                let Some(task) = task else { break };
                run_task(&propagator, task).await;
            }
            _ = shutdown.recv() => {
                tracing::info!(pending = rx.len(), "📣 Broadcast worker shutting down");
                break;
            }
        }
    }
}

async fn run_task(propagator: &Propagator, task: BroadcastTask) {
    tracing::debug!(network = %task.network, trigger_node = %task.trigger_node, "Running queued network peer update");

    let result = propagator.publish_peer_update(&task.network, false).await;
    if let Err(e) = &result {
        tracing::error!(
            network = %task.network,
            trigger_node = %task.trigger_node,
            error = %e,
            "Queued network peer update failed"
        );
    }
    propagator.broadcasts().record(result.is_ok());
}
