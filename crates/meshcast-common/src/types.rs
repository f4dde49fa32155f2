//! Core types shared across Meshcast components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pending action carried on a node record.
///
/// Agents read this from node updates:
/// - `noop`: nothing pending
/// - `update`: apply an incremental change
/// - `force`: discard local state and fully resync
/// - `addnetwork`: join the node's network
/// - `delete`: leave the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    #[default]
    Noop,
    Update,
    #[serde(rename = "force")]
    ForceUpdate,
    AddNetwork,
    Delete,
}

/// A mesh participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node identifier
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Network this node belongs to
    pub network: String,

    /// Mesh address inside the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Public endpoint (ip:port) other peers dial
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// WireGuard public key
    #[serde(default)]
    pub public_key: String,

    /// Pending action for the agent
    #[serde(default)]
    pub action: NodeAction,

    /// Network access key used at enrollment. Never redistributed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Last agent check-in (Unix epoch seconds)
    #[serde(default)]
    pub last_check_in: i64,
}

impl Node {
    pub fn new(id: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            network: network.into(),
            address: None,
            endpoint: None,
            public_key: String::new(),
            action: NodeAction::Noop,
            access_key: None,
            last_check_in: chrono::Utc::now().timestamp(),
        }
    }

    /// Copy of this record safe to send to agents (access key removed)
    pub fn redacted(&self) -> Self {
        Self {
            access_key: None,
            ..self.clone()
        }
    }
}

/// Configuration of the physical agent behind a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Host identifier
    pub id: String,

    /// Hostname reported by the agent
    #[serde(default)]
    pub name: String,

    /// Route traffic through the proxy instead of direct peer connections
    #[serde(default)]
    pub proxy_enabled: bool,

    /// Proxy listen port (only meaningful when proxy is enabled)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_listen_port: Option<u16>,

    /// Agent version
    #[serde(default)]
    pub version: String,
}

impl Host {
    pub fn new(id: impl Into<String>, proxy_enabled: bool) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            proxy_enabled,
            proxy_listen_port: None,
            version: String::new(),
        }
    }
}

/// A mesh network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network identifier
    pub net_id: String,
}

impl Network {
    pub fn new(net_id: impl Into<String>) -> Self {
        Self {
            net_id: net_id.into(),
        }
    }
}

/// One peer as seen by the receiving node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Keepalive interval in seconds (0 disables)
    #[serde(default)]
    pub persistent_keepalive: u16,
}

/// Proxy manager action tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyAction {
    #[default]
    NoProxy,
    AddNetwork,
    DeleteNetwork,
}

/// Proxy-relevant state for one peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyPeer {
    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Peer's own host runs behind the proxy
    #[serde(default)]
    pub proxied: bool,
}

/// Instructions for an agent's proxy manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProxyManagerPayload {
    pub action: ProxyAction,

    pub network: String,

    #[serde(default)]
    pub peers: Vec<ProxyPeer>,
}

/// Snapshot of the peer set a node should now see
///
/// Always a full snapshot, never a delta, so repeated or reordered
/// deliveries converge to the same agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerUpdate {
    pub network: String,

    pub server_version: String,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    /// Present only when the destination host runs in proxy mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_update: Option<ProxyManagerPayload>,
}

/// Connectivity sample towards one peer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerMetric {
    pub connected: bool,
    pub latency_ms: u64,
    pub total_sent: u64,
    pub total_received: u64,
    pub uptime_secs: u64,
}

/// Metrics snapshot pushed to the exporter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub node_id: String,

    #[serde(default)]
    pub node_name: String,

    pub network: String,

    /// Peer node ID -> connectivity sample
    #[serde(default)]
    pub connectivity: BTreeMap<String, PeerMetric>,
}
