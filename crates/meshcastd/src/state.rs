//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

use crate::config::{AppConfig, TransportBackend};
use crate::maintenance::ServerMaintenance;
use crate::publishers::Propagator;
use crate::queue::{BroadcastQueue, BroadcastTask};
use crate::registry::{FullMeshTopology, RedisRegistry, Registry};
use crate::scheduler::ReconciliationScheduler;
use crate::transport::{MemoryPublisher, Message, MessageQueue, Publisher, RedisPublisher};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Update publishers
    pub propagator: Arc<Propagator>,

    /// Periodic reconciliation
    pub scheduler: Arc<ReconciliationScheduler>,

    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    /// Connect to Redis and wire publishers, registry, and scheduler.
    ///
    /// Also returns the receiving end of the broadcast queue for the worker.
    pub async fn new(config: AppConfig) -> Result<(Self, mpsc::Receiver<BroadcastTask>)> {
        // Connection manager handles reconnection
        let client = redis::Client::open(config.redis_url.as_str())
            .context("Failed to create Redis client")?;
        let redis = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        let registry: Arc<dyn Registry> = Arc::new(RedisRegistry::new(redis.clone()));
        let topology = Arc::new(FullMeshTopology::new(
            registry.clone(),
            config.server_version.clone(),
        ));

        let publisher: Arc<dyn Publisher> = match config.transport {
            TransportBackend::Redis => Arc::new(RedisPublisher::new(redis.clone())),
            TransportBackend::Memory => {
                tracing::warn!("Using in-memory transport, updates will not reach agents");
                let broker = Arc::new(MemoryPublisher::new());
                tokio::spawn(log_local_messages(broker.subscribe()));
                broker
            }
        };
        let mq = MessageQueue::new(
            publisher,
            Duration::from_secs(config.scheduler.publish_timeout_secs),
        );

        let (broadcasts, broadcast_rx) =
            BroadcastQueue::new(config.scheduler.broadcast_queue_capacity);
        let propagator = Arc::new(Propagator::new(
            registry.clone(),
            topology,
            mq,
            broadcasts,
            config.message_queue_backend,
        ));

        let maintenance = Arc::new(ServerMaintenance::new(
            redis,
            registry,
            config.server_id.clone(),
            config.server_version.clone(),
            config.firewall.command.clone(),
            config.scheduler.telemetry_interval_secs,
        ));
        let scheduler = Arc::new(ReconciliationScheduler::new(
            propagator.clone(),
            maintenance,
            config.scheduler.force_sync_every,
            config.firewall.is_managed(),
        ));

        Ok((Self::from_parts(config, propagator, scheduler), broadcast_rx))
    }

    pub fn from_parts(
        config: AppConfig,
        propagator: Arc<Propagator>,
        scheduler: Arc<ReconciliationScheduler>,
    ) -> Self {
        Self {
            config,
            propagator,
            scheduler,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Dry-run sink for the in-memory transport
async fn log_local_messages(mut rx: broadcast::Receiver<Message>) {
    loop {
        match rx.recv().await {
            Ok(message) => tracing::info!(
                topic = %message.topic,
                qos = ?message.qos,
                retain = message.retain,
                bytes = message.payload.len(),
                "Local publish"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Local publish log lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
