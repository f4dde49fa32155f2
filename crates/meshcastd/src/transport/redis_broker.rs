//! Redis pub/sub transport.
//!
//! Redis has no native retained messages, so retained payloads are also
//! written to `retained:{topic}` in the same MULTI block. Agents read that
//! key on (re)connect before subscribing.

use async_trait::async_trait;
use meshcast_common::MeshcastError;
use meshcast_common::constants::redis_keys::RETAINED_PREFIX;
use redis::aio::ConnectionManager;

use super::{Message, Publisher, QoS};

pub struct RedisPublisher {
    /// Auto-reconnecting connection
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, message: Message) -> Result<(), MeshcastError> {
        if message.qos != QoS::AtMostOnce {
            // Redis PUBLISH is fire-and-forget to subscribers; the MULTI reply
            // is the only acknowledgment available.
            tracing::trace!(topic = %message.topic, qos = ?message.qos, "QoS downgraded to broker ack");
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("PUBLISH")
            .arg(&message.topic)
            .arg(&message.payload)
            .ignore();
        if message.retain {
            pipe.cmd("SET")
                .arg(format!("{}{}", RETAINED_PREFIX, message.topic))
                .arg(&message.payload)
                .ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| MeshcastError::Transport(e.to_string()))?;

        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
