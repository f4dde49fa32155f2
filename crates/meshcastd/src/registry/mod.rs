//! Collaborators the propagation core reads from.
//!
//! - [`Registry`]: node, host, and network records (owned by storage)
//! - [`Topology`]: peer and proxy payload computation
//!
//! Both are looked up fresh on every publish; nothing here is cached.

mod mesh;
mod redis_store;

pub use mesh::FullMeshTopology;
pub use redis_store::RedisRegistry;

use async_trait::async_trait;
use meshcast_common::{Host, MeshcastError, Network, Node, PeerUpdate, ProxyManagerPayload};

/// Node, host, and network lookup
#[async_trait]
pub trait Registry: Send + Sync {
    async fn node(&self, node_id: &str) -> Result<Node, MeshcastError>;

    /// Host behind a node. `NotFound` for deprovisioned agents.
    async fn host(&self, node_id: &str) -> Result<Host, MeshcastError>;

    async fn network_nodes(&self, network: &str) -> Result<Vec<Node>, MeshcastError>;

    async fn all_nodes(&self) -> Result<Vec<Node>, MeshcastError>;

    async fn networks(&self) -> Result<Vec<Network>, MeshcastError>;
}

/// Peer and proxy payload computation
#[async_trait]
pub trait Topology: Send + Sync {
    /// Full peer snapshot for a node (proxy field left empty)
    async fn peer_update(&self, node: &Node) -> Result<PeerUpdate, MeshcastError>;

    /// Proxy instructions for a node. With `exclude_proxied`, peers whose own
    /// hosts are proxied are left out.
    async fn proxy_payload(
        &self,
        node: &Node,
        exclude_proxied: bool,
    ) -> Result<ProxyManagerPayload, MeshcastError>;
}
