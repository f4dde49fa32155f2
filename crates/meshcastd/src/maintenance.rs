//! Cluster maintenance run on forced reconciliation ticks.
//!
//! - Firewall/NAT re-provisioning (external command)
//! - Coordinator host state refresh (heartbeat record in Redis)
//! - Telemetry checkpoint (at most once per configured interval)

use async_trait::async_trait;
use meshcast_common::MeshcastError;
use meshcast_common::constants::redis_keys::{SERVER_PREFIX, TELEMETRY};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::registry::Registry;

/// Maintenance steps triggered by the scheduler
#[async_trait]
pub trait Maintenance: Send + Sync {
    async fn reprovision_firewall(&self) -> Result<(), MeshcastError>;

    async fn refresh_host(&self) -> Result<(), MeshcastError>;

    async fn timer_checkpoint(&self) -> Result<(), MeshcastError>;
}

/// Coordinator heartbeat record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub server_id: String,
    pub version: String,
    pub last_seen: i64,
}

/// Last telemetry checkpoint written by a coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub server_id: String,
    pub version: String,
    pub last_send: i64,
    pub networks: usize,
    pub nodes: usize,
}

/// Is a checkpoint due at `now` given the previous one?
fn checkpoint_due(last_send: Option<i64>, now: i64, interval_secs: u64) -> bool {
    match last_send {
        Some(last) => now.saturating_sub(last) >= interval_secs as i64,
        None => true,
    }
}

pub struct ServerMaintenance {
    redis: ConnectionManager,
    registry: Arc<dyn Registry>,
    server_id: String,
    version: String,
    firewall_command: Option<String>,
    telemetry_interval_secs: u64,
}

impl ServerMaintenance {
    pub fn new(
        redis: ConnectionManager,
        registry: Arc<dyn Registry>,
        server_id: String,
        version: String,
        firewall_command: Option<String>,
        telemetry_interval_secs: u64,
    ) -> Self {
        Self {
            redis,
            registry,
            server_id,
            version,
            firewall_command,
            telemetry_interval_secs,
        }
    }

    async fn last_telemetry(&self) -> Result<Option<TelemetryRecord>, MeshcastError> {
        let mut conn = self.redis.clone();
        let data: Option<String> = conn
            .hget(TELEMETRY, &self.server_id)
            .await
            .map_err(|e| MeshcastError::Redis(e.to_string()))?;

        match data {
            Some(d) => Ok(Some(serde_json::from_str(&d)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Maintenance for ServerMaintenance {
    async fn reprovision_firewall(&self) -> Result<(), MeshcastError> {
        let Some(command) = self.firewall_command.as_deref() else {
            tracing::debug!("No firewall command configured, skipping");
            return Ok(());
        };

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| MeshcastError::Internal(format!("failed to run firewall command: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MeshcastError::Internal(format!(
                "firewall command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::info!("🧱 Firewall rules re-provisioned");
        Ok(())
    }

    async fn refresh_host(&self) -> Result<(), MeshcastError> {
        let record = ServerRecord {
            server_id: self.server_id.clone(),
            version: self.version.clone(),
            last_seen: chrono::Utc::now().timestamp(),
        };
        let data = serde_json::to_string(&record)?;

        let mut conn = self.redis.clone();
        let _: () = conn
            .set(format!("{}{}", SERVER_PREFIX, self.server_id), data)
            .await
            .map_err(|e| MeshcastError::Redis(e.to_string()))?;

        tracing::debug!(server_id = %self.server_id, "Host state refreshed");
        Ok(())
    }

    async fn timer_checkpoint(&self) -> Result<(), MeshcastError> {
        let now = chrono::Utc::now().timestamp();
        let last = self.last_telemetry().await?.map(|r| r.last_send);
        if !checkpoint_due(last, now, self.telemetry_interval_secs) {
            return Ok(());
        }

        let networks = self.registry.networks().await?.len();
        let nodes = self.registry.all_nodes().await?.len();
        let record = TelemetryRecord {
            server_id: self.server_id.clone(),
            version: self.version.clone(),
            last_send: now,
            networks,
            nodes,
        };
        let data = serde_json::to_string(&record)?;

        let mut conn = self.redis.clone();
        let _: () = conn
            .hset(TELEMETRY, &self.server_id, data)
            .await
            .map_err(|e| MeshcastError::Redis(e.to_string()))?;

        tracing::info!(networks, nodes, "📊 Telemetry checkpoint recorded");
        Ok(())
    }
}
