//! Per-node topic derivation.

use meshcast_common::Node;
use meshcast_common::constants::topics::{
    METRICS_EXPORTER, PEERS_PREFIX, PROXY_PREFIX, UPDATE_PREFIX,
};

/// Update classes that are scoped to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateClass {
    Peers,
    Node,
    Proxy,
}

impl UpdateClass {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Peers => PEERS_PREFIX,
            Self::Node => UPDATE_PREFIX,
            Self::Proxy => PROXY_PREFIX,
        }
    }
}

/// `{class}/{network}/{node_id}`, recomputed on every publish
pub fn node_topic(class: UpdateClass, node: &Node) -> String {
    format!("{}/{}/{}", class.prefix(), node.network, node.id)
}

/// Metrics are not keyed by network or node
pub fn metrics_topic() -> &'static str {
    METRICS_EXPORTER
}
