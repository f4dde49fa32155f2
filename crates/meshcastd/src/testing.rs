//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use meshcast_common::{
    Host, MeshcastError, Network, Node, PeerConfig, PeerUpdate, ProxyAction,
    ProxyManagerPayload, ProxyPeer,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::maintenance::Maintenance;
use crate::registry::{Registry, Topology};

/// Registry backed by insertion-ordered vectors
#[derive(Default)]
pub struct MemoryRegistry {
    nodes: Mutex<Vec<Node>>,
    hosts: Mutex<HashMap<String, Host>>,
    networks: Mutex<Vec<String>>,
    fail_enumeration: AtomicBool,
    enumerations: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node, host: Option<Host>) {
        let mut networks = self.networks.lock().unwrap();
        if !networks.contains(&node.network) {
            networks.push(node.network.clone());
        }
        if let Some(host) = host {
            self.hosts.lock().unwrap().insert(node.id.clone(), host);
        }
        self.nodes.lock().unwrap().push(node);
    }

    pub fn set_fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    /// Number of `all_nodes` calls
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    fn check_enumeration(&self) -> Result<(), MeshcastError> {
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(MeshcastError::Redis("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn node(&self, node_id: &str) -> Result<Node, MeshcastError> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == node_id)
            .cloned()
            .ok_or_else(|| MeshcastError::NotFound(format!("node {}", node_id)))
    }

    async fn host(&self, node_id: &str) -> Result<Host, MeshcastError> {
        self.hosts
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .ok_or_else(|| MeshcastError::NotFound(format!("host for node {}", node_id)))
    }

    async fn network_nodes(&self, network: &str) -> Result<Vec<Node>, MeshcastError> {
        self.check_enumeration()?;
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.network == network)
            .cloned()
            .collect())
    }

    async fn all_nodes(&self) -> Result<Vec<Node>, MeshcastError> {
        self.check_enumeration()?;
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn networks(&self) -> Result<Vec<Network>, MeshcastError> {
        self.check_enumeration()?;
        Ok(self
            .networks
            .lock()
            .unwrap()
            .iter()
            .map(|n| Network::new(n.clone()))
            .collect())
    }
}

/// Topology returning one fixed peer per update, with per-node failures
#[derive(Default)]
pub struct ScriptedTopology {
    fail_peers: Mutex<HashSet<String>>,
    fail_proxy: Mutex<HashSet<String>>,
}

impl ScriptedTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_peers_for(&self, node_id: &str) {
        self.fail_peers.lock().unwrap().insert(node_id.to_string());
    }

    pub fn fail_proxy_for(&self, node_id: &str) {
        self.fail_proxy.lock().unwrap().insert(node_id.to_string());
    }
}

#[async_trait]
impl Topology for ScriptedTopology {
    async fn peer_update(&self, node: &Node) -> Result<PeerUpdate, MeshcastError> {
        if self.fail_peers.lock().unwrap().contains(&node.id) {
            return Err(MeshcastError::Assembly(format!("peers for {}", node.id)));
        }
        Ok(PeerUpdate {
            network: node.network.clone(),
            server_version: "test".to_string(),
            peers: vec![PeerConfig {
                public_key: "pk-peer".to_string(),
                endpoint: None,
                allowed_ips: vec!["10.0.0.9/32".to_string()],
                persistent_keepalive: 20,
            }],
            proxy_update: None,
        })
    }

    async fn proxy_payload(
        &self,
        node: &Node,
        _exclude_proxied: bool,
    ) -> Result<ProxyManagerPayload, MeshcastError> {
        if self.fail_proxy.lock().unwrap().contains(&node.id) {
            return Err(MeshcastError::Assembly(format!("proxy for {}", node.id)));
        }
        Ok(ProxyManagerPayload {
            action: ProxyAction::NoProxy,
            network: node.network.clone(),
            peers: vec![ProxyPeer {
                public_key: "pk-peer".to_string(),
                endpoint: None,
                proxied: false,
            }],
        })
    }
}

/// Records maintenance calls in order
#[derive(Default)]
pub struct RecordingMaintenance {
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl RecordingMaintenance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, step: &'static str) {
        self.failing.lock().unwrap().insert(step);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) -> Result<(), MeshcastError> {
        self.calls.lock().unwrap().push(step);
        if self.failing.lock().unwrap().contains(step) {
            return Err(MeshcastError::Internal(format!("{} failed", step)));
        }
        Ok(())
    }
}

#[async_trait]
impl Maintenance for RecordingMaintenance {
    async fn reprovision_firewall(&self) -> Result<(), MeshcastError> {
        self.record("firewall")
    }

    async fn refresh_host(&self) -> Result<(), MeshcastError> {
        self.record("host")
    }

    async fn timer_checkpoint(&self) -> Result<(), MeshcastError> {
        self.record("telemetry")
    }
}
