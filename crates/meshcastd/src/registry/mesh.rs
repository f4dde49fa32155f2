//! Full-mesh topology: every node peers with every other node in its network.

use async_trait::async_trait;
use meshcast_common::{
    MeshcastError, Node, PeerConfig, PeerUpdate, ProxyAction, ProxyManagerPayload, ProxyPeer,
};
use std::sync::Arc;

use super::{Registry, Topology};

/// Keepalive sent to agents for every peer (seconds)
const PERSISTENT_KEEPALIVE: u16 = 20;

pub struct FullMeshTopology {
    registry: Arc<dyn Registry>,
    server_version: String,
}

impl FullMeshTopology {
    pub fn new(registry: Arc<dyn Registry>, server_version: String) -> Self {
        Self {
            registry,
            server_version,
        }
    }

    async fn others(&self, node: &Node) -> Result<Vec<Node>, MeshcastError> {
        let nodes = self
            .registry
            .network_nodes(&node.network)
            .await
            .map_err(|e| MeshcastError::Assembly(format!("listing network {}: {}", node.network, e)))?;

        Ok(nodes.into_iter().filter(|n| n.id != node.id).collect())
    }
}

fn peer_config(peer: &Node) -> PeerConfig {
    PeerConfig {
        public_key: peer.public_key.clone(),
        endpoint: peer.endpoint.clone(),
        allowed_ips: peer
            .address
            .iter()
            .map(|addr| format!("{}/32", addr))
            .collect(),
        persistent_keepalive: PERSISTENT_KEEPALIVE,
    }
}

#[async_trait]
impl Topology for FullMeshTopology {
    async fn peer_update(&self, node: &Node) -> Result<PeerUpdate, MeshcastError> {
        if node.public_key.is_empty() {
            return Err(MeshcastError::Assembly(format!(
                "node {} has no public key",
                node.id
            )));
        }

        let peers = self
            .others(node)
            .await?
            .iter()
            .filter(|peer| !peer.public_key.is_empty())
            .map(peer_config)
            .collect();

        Ok(PeerUpdate {
            network: node.network.clone(),
            server_version: self.server_version.clone(),
            peers,
            proxy_update: None,
        })
    }

    async fn proxy_payload(
        &self,
        node: &Node,
        exclude_proxied: bool,
    ) -> Result<ProxyManagerPayload, MeshcastError> {
        let mut peers = Vec::new();
        for peer in self.others(node).await? {
            // a peer without a host record is treated as direct
            let proxied = self
                .registry
                .host(&peer.id)
                .await
                .map(|h| h.proxy_enabled)
                .unwrap_or(false);

            if exclude_proxied && proxied {
                continue;
            }
            peers.push(ProxyPeer {
                public_key: peer.public_key,
                endpoint: peer.endpoint,
                proxied,
            });
        }

        Ok(ProxyManagerPayload {
            action: ProxyAction::NoProxy,
            network: node.network.clone(),
            peers,
        })
    }
}
