//! In-process broker.
//!
//! Keeps the last retained payload per topic and a bounded history of recent
//! messages, and re-broadcasts messages to local subscribers. Failure and
//! stall injection lets tests exercise timeout and broker-error paths
//! without a server.

use async_trait::async_trait;
use meshcast_common::MeshcastError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

use super::{Message, Publisher};

const SUBSCRIBER_CAPACITY: usize = 1024;
/// Recent messages kept for inspection; older ones are evicted
const HISTORY_LIMIT: usize = 1024;

pub struct MemoryPublisher {
    sent: Mutex<VecDeque<Message>>,
    retained: Mutex<HashMap<String, Vec<u8>>>,
    tx: broadcast::Sender<Message>,
    failure: Mutex<Option<String>>,
    responsive: watch::Sender<bool>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let (responsive, _) = watch::channel(true);
        Self {
            sent: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            retained: Mutex::new(HashMap::new()),
            tx,
            failure: Mutex::new(None),
            responsive,
        }
    }

    /// Receive every message accepted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
impl MemoryPublisher {
    /// Recently accepted messages, in publish order
    pub fn messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn messages_on(&self, topic: &str) -> Vec<Message> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .collect()
    }

    /// Last retained payload on a topic
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.retained.lock().ok()?.get(topic).cloned()
    }

    /// Reject every publish with this broker message (None to accept again)
    pub fn set_failure(&self, failure: Option<String>) {
        if let Ok(mut f) = self.failure.lock() {
            *f = failure;
        }
    }

    /// Hold every publish without acknowledging until responsive again
    pub fn set_unresponsive(&self, unresponsive: bool) {
        self.responsive.send_replace(!unresponsive);
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, message: Message) -> Result<(), MeshcastError> {
        let mut responsive = self.responsive.subscribe();
        responsive
            .wait_for(|ok| *ok)
            .await
            .map_err(|e| MeshcastError::Internal(e.to_string()))?;

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(failure) = failure {
            return Err(MeshcastError::Transport(failure));
        }

        if message.retain {
            if let Ok(mut retained) = self.retained.lock() {
                retained.insert(message.topic.clone(), message.payload.clone());
            }
        }
        if let Ok(mut sent) = self.sent.lock() {
            if sent.len() == HISTORY_LIMIT {
                sent.pop_front();
            }
            sent.push_back(message.clone());
        }
        // no local subscribers is fine
        let _ = self.tx.send(message);
        Ok(())
    }

    async fn ping(&self) -> bool {
        *self.responsive.borrow()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
