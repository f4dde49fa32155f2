//! Read-only view of coordinator records stored in Redis.
//!
//! Layout (JSON values):
//! - `meshcast:node:{node_id}` -> Node
//! - `meshcast:host:{node_id}` -> Host
//! - `meshcast:networks` -> set of network IDs
//! - `meshcast:network:{net_id}:nodes` -> set of node IDs

use async_trait::async_trait;
use meshcast_common::constants::redis_keys::{HOST_PREFIX, NETWORK_PREFIX, NETWORKS, NODE_PREFIX};
use meshcast_common::{Host, MeshcastError, Network, Node};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;

use super::Registry;

pub struct RedisRegistry {
    conn: ConnectionManager,
}

fn redis_err(e: redis::RedisError) -> MeshcastError {
    MeshcastError::Redis(e.to_string())
}

fn network_nodes_key(network: &str) -> String {
    format!("{}{}:nodes", NETWORK_PREFIX, network)
}

impl RedisRegistry {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, MeshcastError> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(key).await.map_err(redis_err)?;

        match data {
            Some(d) => Ok(Some(serde_json::from_str(&d)?)),
            None => Ok(None),
        }
    }

    async fn members_sorted(&self, key: &str) -> Result<Vec<String>, MeshcastError> {
        let mut conn = self.conn.clone();
        let mut members: Vec<String> = conn.smembers(key).await.map_err(redis_err)?;
        // sets are unordered; sort so a fan-out pass is deterministic
        members.sort();
        Ok(members)
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn node(&self, node_id: &str) -> Result<Node, MeshcastError> {
        self.get_json(&format!("{}{}", NODE_PREFIX, node_id))
            .await?
            .ok_or_else(|| MeshcastError::NotFound(format!("node {}", node_id)))
    }

    async fn host(&self, node_id: &str) -> Result<Host, MeshcastError> {
        self.get_json(&format!("{}{}", HOST_PREFIX, node_id))
            .await?
            .ok_or_else(|| MeshcastError::NotFound(format!("host for node {}", node_id)))
    }

    async fn network_nodes(&self, network: &str) -> Result<Vec<Node>, MeshcastError> {
        let ids = self.members_sorted(&network_nodes_key(network)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| format!("{}{}", NODE_PREFIX, id)).collect();
        let mut conn = self.conn.clone();
        let records: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        let mut nodes = Vec::with_capacity(records.len());
        for (id, record) in ids.iter().zip(records) {
            match record {
                Some(data) => match serde_json::from_str::<Node>(&data) {
                    Ok(node) => nodes.push(node),
                    Err(e) => {
                        tracing::warn!(node_id = %id, network = %network, error = %e, "Skipping unreadable node record");
                    }
                },
                // set and records briefly disagree while a node is being removed
                None => tracing::debug!(node_id = %id, network = %network, "Node listed but has no record"),
            }
        }
        Ok(nodes)
    }

    async fn all_nodes(&self) -> Result<Vec<Node>, MeshcastError> {
        let mut nodes = Vec::new();
        for network in self.networks().await? {
            nodes.extend(self.network_nodes(&network.net_id).await?);
        }
        Ok(nodes)
    }

    async fn networks(&self) -> Result<Vec<Network>, MeshcastError> {
        Ok(self
            .members_sorted(NETWORKS)
            .await?
            .into_iter()
            .map(Network::new)
            .collect())
    }
}
