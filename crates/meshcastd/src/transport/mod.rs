//! Publish/subscribe egress.
//!
//! Every update class leaves the coordinator through [`MessageQueue::publish`],
//! which bounds the wait for a broker acknowledgment. A publish that times
//! out is reported as failed but is not cancelled: the message may still be
//! delivered, and since every payload is a full snapshot a late delivery is
//! harmless.

mod memory;
mod redis_broker;

pub use memory::MemoryPublisher;
pub use redis_broker::RedisPublisher;

use async_trait::async_trait;
use meshcast_common::MeshcastError;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Delivery guarantee requested from the broker.
///
/// Per-node snapshots go out at most once, metrics exactly once; nothing
/// publishes at least once, so that level is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    ExactlyOnce = 2,
}

/// A single outbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub qos: QoS,
    /// Broker keeps the last payload for late subscribers
    pub retain: bool,
    pub payload: Vec<u8>,
}

/// Transport client. Resolves once the broker acknowledges (or rejects) the message.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), MeshcastError>;

    /// Is the broker reachable?
    async fn ping(&self) -> bool;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Publish counters
#[derive(Default)]
pub struct PublishStats {
    pub published: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
}

/// Snapshot of publish counters
#[derive(Clone, Debug, Default, Serialize)]
pub struct PublishStatsSnapshot {
    pub published: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// Timeout-bounded front end for a [`Publisher`]
pub struct MessageQueue {
    publisher: Arc<dyn Publisher>,
    timeout: Duration,
    stats: PublishStats,
}

impl MessageQueue {
    pub fn new(publisher: Arc<dyn Publisher>, timeout: Duration) -> Self {
        Self {
            publisher,
            timeout,
            stats: PublishStats::default(),
        }
    }

    pub fn publisher(&self) -> Arc<dyn Publisher> {
        self.publisher.clone()
    }

    /// Publish and wait up to the configured timeout for acknowledgment.
    ///
    /// The publish runs as its own task so that giving up on the wait does
    /// not abort it.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), MeshcastError> {
        let message = Message {
            topic: topic.to_string(),
            qos,
            retain,
            payload,
        };
        let publisher = self.publisher.clone();
        let mut handle = tokio::spawn(async move { publisher.publish(message).await });

        let result = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(MeshcastError::Internal(format!(
                "publish task failed: {join_err}"
            ))),
            Err(_) => {
                // handle dropped here, the publish itself keeps running
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(topic = %topic, timeout = ?self.timeout, "Publish not acknowledged in time");
                return Err(MeshcastError::Timeout);
            }
        };

        match &result {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(topic = %topic, backend = self.publisher.name(), "Published");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(topic = %topic, error = %e, "Publish rejected");
            }
        }
        result
    }

    pub fn stats(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            published: self.stats.published.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
        }
    }
}
