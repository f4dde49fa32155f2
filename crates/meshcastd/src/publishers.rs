//! Peer, node, proxy, and metrics publishers.
//!
//! Each publisher resolves what it needs from the registry at call time,
//! builds a full snapshot, and hands it to the message queue on the node's
//! topic. A node without a host record is treated as deprovisioned: the
//! publisher succeeds without sending anything.

use meshcast_common::{Host, MeshcastError, Metrics, Node, ProxyAction, ProxyManagerPayload};
use std::sync::Arc;

use crate::queue::{BroadcastQueue, BroadcastTask};
use crate::registry::{Registry, Topology};
use crate::topics::{UpdateClass, metrics_topic, node_topic};
use crate::transport::{MessageQueue, QoS};

/// Propagates configuration changes to agents
pub struct Propagator {
    registry: Arc<dyn Registry>,
    topology: Arc<dyn Topology>,
    mq: MessageQueue,
    broadcasts: BroadcastQueue,
    /// When false, publishers succeed without sending
    enabled: bool,
}

impl Propagator {
    pub fn new(
        registry: Arc<dyn Registry>,
        topology: Arc<dyn Topology>,
        mq: MessageQueue,
        broadcasts: BroadcastQueue,
        enabled: bool,
    ) -> Self {
        Self {
            registry,
            topology,
            mq,
            broadcasts,
            enabled,
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn message_queue(&self) -> &MessageQueue {
        &self.mq
    }

    pub fn broadcasts(&self) -> &BroadcastQueue {
        &self.broadcasts
    }

    /// Host lookup; any failure means "nothing to do"
    async fn host_for(&self, node: &Node) -> Option<Host> {
        match self.registry.host(&node.id).await {
            Ok(host) => Some(host),
            Err(e) => {
                tracing::debug!(node_id = %node.id, error = %e, "No host for node, skipping publish");
                None
            }
        }
    }

    /// Per-node messages: QoS 0, retained so a reconnecting agent gets the latest snapshot
    async fn publish_to_node(
        &self,
        class: UpdateClass,
        node: &Node,
        payload: Vec<u8>,
    ) -> Result<(), MeshcastError> {
        let topic = node_topic(class, node);
        tracing::trace!(topic = %topic, bytes = payload.len(), "Publishing to node");
        self.mq.publish(&topic, QoS::AtMostOnce, true, payload).await
    }

    /// Proxy instructions for a node, tagged to join the network
    async fn proxy_update_for(&self, node: &Node) -> Result<ProxyManagerPayload, MeshcastError> {
        let mut payload = self.topology.proxy_payload(node, false).await?;
        payload.action = ProxyAction::AddNetwork;
        Ok(payload)
    }

    /// Publish a peer update to every node in a network.
    ///
    /// Nodes are handled one after another; a failing node is logged and
    /// skipped. Only the last failure is returned, so an error means "at
    /// least one node may be stale", not which one.
    pub async fn publish_peer_update(
        &self,
        network: &str,
        publish_to_self: bool,
    ) -> Result<(), MeshcastError> {
        if !self.enabled {
            return Ok(());
        }

        let nodes = self.registry.network_nodes(network).await.inspect_err(|e| {
            tracing::error!(network = %network, error = %e, "Failed to list network nodes");
        })?;

        tracing::debug!(network = %network, nodes = nodes.len(), publish_to_self, "Publishing network peer update");

        let mut last_err = None;
        for node in &nodes {
            if let Err(e) = self.publish_single_peer_update(node).await {
                tracing::warn!(
                    node_id = %node.id,
                    network = %node.network,
                    error = %e,
                    "Failed to publish peer update to node"
                );
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Publish a peer update to one node.
    ///
    /// Once a host declares proxy mode the proxy payload is mandatory:
    /// failing to assemble it fails the publish.
    pub async fn publish_single_peer_update(&self, node: &Node) -> Result<(), MeshcastError> {
        let Some(host) = self.host_for(node).await else {
            return Ok(());
        };

        let mut peer_update = self.topology.peer_update(node).await?;
        if host.proxy_enabled {
            peer_update.proxy_update = Some(self.proxy_update_for(node).await?);
        }

        let data = serde_json::to_vec(&peer_update)?;
        self.publish_to_node(UpdateClass::Peers, node, data).await
    }

    /// Peer update after an externally managed peer changed.
    ///
    /// Proxy data is best-effort here. On success the rest of the network is
    /// resynced in the background.
    pub async fn publish_ext_peer_update(&self, node: &Node) -> Result<(), MeshcastError> {
        let Some(host) = self.host_for(node).await else {
            return Ok(());
        };
        if !self.enabled {
            return Ok(());
        }

        let mut peer_update = self.topology.peer_update(node).await?;
        if host.proxy_enabled {
            match self.proxy_update_for(node).await {
                Ok(proxy) => peer_update.proxy_update = Some(proxy),
                Err(e) => {
                    tracing::warn!(node_id = %node.id, error = %e, "Sending external peer update without proxy data");
                }
            }
        }

        let data = serde_json::to_vec(&peer_update)?;
        self.publish_to_node(UpdateClass::Peers, node, data).await?;

        let task = BroadcastTask {
            network: node.network.clone(),
            trigger_node: node.id.clone(),
        };
        if let Err(e) = self.broadcasts.submit(task) {
            tracing::warn!(network = %node.network, error = %e, "Network peer update not scheduled");
        }
        Ok(())
    }

    /// Publish a node's record (access key removed) to its agent
    pub async fn node_update(&self, node: &Node) -> Result<(), MeshcastError> {
        let Some(host) = self.host_for(node).await else {
            return Ok(());
        };
        if !self.enabled {
            return Ok(());
        }
        tracing::debug!(node_id = %node.id, action = ?node.action, "Publishing node update");

        let data = serde_json::to_vec(&node.redacted()).inspect_err(|e| {
            tracing::error!(node_id = %node.id, error = %e, "Failed to encode node update");
        })?;
        self.publish_to_node(UpdateClass::Node, node, data)
            .await
            .inspect_err(|e| {
                tracing::error!(node_id = %node.id, error = %e, "Failed to publish node update");
            })?;

        if host.proxy_enabled {
            if let Err(e) = self.publish_proxy_peer_update(node).await {
                tracing::warn!(
                    node_id = %node.id,
                    network = %node.network,
                    error = %e,
                    "Failed to publish proxy update to node"
                );
            }
        }
        Ok(())
    }

    /// Assemble and publish proxy instructions for a node
    pub async fn publish_proxy_peer_update(&self, node: &Node) -> Result<(), MeshcastError> {
        let payload = self.proxy_update_for(node).await?;
        self.proxy_update(&payload, node).await.inspect_err(|e| {
            tracing::warn!(node_id = %node.id, error = %e, "Failed to send proxy update");
        })
    }

    /// Publish proxy instructions. No-op unless the node's host runs in proxy mode.
    pub async fn proxy_update(
        &self,
        payload: &ProxyManagerPayload,
        node: &Node,
    ) -> Result<(), MeshcastError> {
        let Some(host) = self.host_for(node).await else {
            return Ok(());
        };
        if !self.enabled || !host.proxy_enabled {
            return Ok(());
        }
        tracing::debug!(node_id = %node.id, action = ?payload.action, "Publishing proxy update");

        let data = serde_json::to_vec(payload)?;
        self.publish_to_node(UpdateClass::Proxy, node, data)
            .await
            .inspect_err(|e| {
                tracing::error!(node_id = %node.id, error = %e, "Failed to publish proxy update");
            })
    }

    /// Push a metrics snapshot to the exporter topic (exactly once, retained)
    pub async fn push_metrics(&self, metrics: &Metrics) -> Result<(), MeshcastError> {
        tracing::debug!(node_id = %metrics.node_id, "Pushing metrics to exporter");

        let data = serde_json::to_vec(metrics)
            .map_err(|e| MeshcastError::Serialization(format!("failed to marshal metrics: {}", e)))?;
        self.mq
            .publish(metrics_topic(), QoS::ExactlyOnce, true, data)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryRegistry, ScriptedTopology};
    use crate::transport::MemoryPublisher;
    use meshcast_common::{NodeAction, PeerMetric, PeerUpdate};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        propagator: Propagator,
        registry: Arc<MemoryRegistry>,
        topology: Arc<ScriptedTopology>,
        broker: Arc<MemoryPublisher>,
        queued: mpsc::Receiver<BroadcastTask>,
    }

    fn harness_with(enabled: bool) -> Harness {
        let registry = Arc::new(MemoryRegistry::new());
        let topology = Arc::new(ScriptedTopology::new());
        let broker = Arc::new(MemoryPublisher::new());
        let mq = MessageQueue::new(broker.clone(), Duration::from_millis(200));
        let (broadcasts, queued) = BroadcastQueue::new(8);
        let propagator = Propagator::new(registry.clone(), topology.clone(), mq, broadcasts, enabled);
        Harness {
            propagator,
            registry,
            topology,
            broker,
            queued,
        }
    }

    fn harness() -> Harness {
        harness_with(true)
    }

    fn node(id: &str) -> Node {
        Node::new(id, "mesh")
    }

    fn peer_update_on(broker: &MemoryPublisher, topic: &str) -> PeerUpdate {
        let sent = broker.messages_on(topic);
        assert_eq!(sent.len(), 1, "expected one message on {}", topic);
        serde_json::from_slice(&sent[0].payload).unwrap()
    }

    #[tokio::test]
    async fn test_hostless_node_publishes_nothing() {
        let h = harness();
        let n = node("ghost");
        h.registry.add_node(n.clone(), None);

        assert_ok!(h.propagator.publish_single_peer_update(&n).await);
        assert_ok!(h.propagator.publish_ext_peer_update(&n).await);
        assert_ok!(h.propagator.node_update(&n).await);
        assert_ok!(h.propagator.proxy_update(&ProxyManagerPayload::default(), &n).await);
        assert_ok!(h.propagator.publish_peer_update("mesh", false).await);

        assert!(h.broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_field_follows_host_mode() {
        let h = harness();
        h.registry.add_node(node("direct"), Some(Host::new("h1", false)));
        h.registry.add_node(node("proxied"), Some(Host::new("h2", true)));

        assert_ok!(h.propagator.publish_peer_update("mesh", false).await);

        let direct = peer_update_on(&h.broker, "peers/mesh/direct");
        assert!(direct.proxy_update.is_none());

        let proxied = peer_update_on(&h.broker, "peers/mesh/proxied");
        let proxy = proxied.proxy_update.expect("proxy data for proxy-enabled host");
        assert_eq!(proxy.action, ProxyAction::AddNetwork);
        assert!(!proxy.peers.is_empty());
    }

    #[tokio::test]
    async fn test_single_peer_update_fails_without_proxy_data() {
        let h = harness();
        let n = node("p1");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));
        h.topology.fail_proxy_for("p1");

        let err = assert_err!(h.propagator.publish_single_peer_update(&n).await);
        assert!(matches!(err, MeshcastError::Assembly(_)));
        assert!(h.broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_continues_and_returns_last_error() {
        let h = harness();
        for id in ["n1", "n2", "n3", "n4", "n5"] {
            h.registry.add_node(node(id), Some(Host::new(format!("h-{}", id), false)));
        }
        h.topology.fail_peers_for("n2");
        h.topology.fail_peers_for("n4");

        let err = assert_err!(h.propagator.publish_peer_update("mesh", true).await);
        assert_eq!(err.to_string(), "Assembly failed: peers for n4");

        let topics: Vec<_> = h.broker.messages().into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["peers/mesh/n1", "peers/mesh/n3", "peers/mesh/n5"]);
    }

    #[tokio::test]
    async fn test_fan_out_enumeration_failure() {
        let h = harness();
        h.registry.add_node(node("n1"), Some(Host::new("h1", false)));
        h.registry.set_fail_enumeration(true);

        assert_err!(h.propagator.publish_peer_update("mesh", false).await);
        assert!(h.broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_backend_sends_nothing() {
        let h = harness_with(false);
        let n = node("n1");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));

        assert_ok!(h.propagator.publish_peer_update("mesh", false).await);
        assert_ok!(h.propagator.node_update(&n).await);
        assert_ok!(h.propagator.publish_ext_peer_update(&n).await);
        assert!(h.broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_ext_peer_update_tolerates_proxy_failure_and_queues_broadcast() {
        let mut h = harness();
        let n = node("ext");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));
        h.topology.fail_proxy_for("ext");

        assert_ok!(h.propagator.publish_ext_peer_update(&n).await);

        let update = peer_update_on(&h.broker, "peers/mesh/ext");
        assert!(update.proxy_update.is_none());

        let task = h.queued.try_recv().unwrap();
        assert_eq!(task.network, "mesh");
        assert_eq!(task.trigger_node, "ext");
    }

    #[tokio::test]
    async fn test_ext_peer_update_attaches_proxy_when_available() {
        let h = harness();
        let n = node("ext");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));

        assert_ok!(h.propagator.publish_ext_peer_update(&n).await);
        let update = peer_update_on(&h.broker, "peers/mesh/ext");
        assert!(update.proxy_update.is_some());
    }

    #[tokio::test]
    async fn test_ext_peer_update_publish_failure_skips_broadcast() {
        let mut h = harness();
        let n = node("ext");
        h.registry.add_node(n.clone(), Some(Host::new("h1", false)));
        h.broker.set_failure(Some("broker down".to_string()));

        let err = assert_err!(h.propagator.publish_ext_peer_update(&n).await);
        assert_eq!(err.to_string(), "broker down");
        assert!(h.queued.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_node_update_strips_access_key() {
        let h = harness();
        let mut n = node("n1");
        n.access_key = Some("enroll-secret".to_string());
        n.action = NodeAction::Update;
        h.registry.add_node(n.clone(), Some(Host::new("h1", false)));

        assert_ok!(h.propagator.node_update(&n).await);

        let sent = h.broker.messages_on("update/mesh/n1");
        assert_eq!(sent.len(), 1);
        let published: Node = serde_json::from_slice(&sent[0].payload).unwrap();
        assert!(published.access_key.is_none());
        assert_eq!(published.action, NodeAction::Update);
        assert!(!String::from_utf8_lossy(&sent[0].payload).contains("enroll-secret"));
        assert!(h.broker.messages_on("proxy/mesh/n1").is_empty());
    }

    #[tokio::test]
    async fn test_node_update_sends_proxy_for_proxy_hosts() {
        let h = harness();
        let n = node("n1");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));

        assert_ok!(h.propagator.node_update(&n).await);

        let proxy = h.broker.messages_on("proxy/mesh/n1");
        assert_eq!(proxy.len(), 1);
        let payload: ProxyManagerPayload = serde_json::from_slice(&proxy[0].payload).unwrap();
        assert_eq!(payload.action, ProxyAction::AddNetwork);
    }

    #[tokio::test]
    async fn test_node_update_survives_proxy_failure() {
        let h = harness();
        let n = node("n1");
        h.registry.add_node(n.clone(), Some(Host::new("h1", true)));
        h.topology.fail_proxy_for("n1");

        assert_ok!(h.propagator.node_update(&n).await);
        assert_eq!(h.broker.messages_on("update/mesh/n1").len(), 1);
        assert!(h.broker.messages_on("proxy/mesh/n1").is_empty());
    }

    #[tokio::test]
    async fn test_proxy_update_skips_direct_hosts() {
        let h = harness();
        let n = node("n1");
        h.registry.add_node(n.clone(), Some(Host::new("h1", false)));

        assert_ok!(h.propagator.proxy_update(&ProxyManagerPayload::default(), &n).await);
        assert!(h.broker.messages().is_empty());
    }

    #[tokio::test]
    async fn test_push_metrics_exactly_once_retained() {
        let h = harness();
        let mut metrics = Metrics {
            node_id: "n1".to_string(),
            network: "mesh".to_string(),
            ..Default::default()
        };
        metrics.connectivity.insert("n2".to_string(), PeerMetric {
            connected: true,
            latency_ms: 12,
            ..Default::default()
        });

        assert_ok!(h.propagator.push_metrics(&metrics).await);

        let sent = h.broker.messages_on("metrics_exporter");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].qos, QoS::ExactlyOnce);
        assert!(sent[0].retain);
        let decoded: Metrics = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(decoded, metrics);
    }

    #[tokio::test]
    async fn test_push_metrics_timeout() {
        let h = harness();
        h.broker.set_unresponsive(true);

        let err = assert_err!(h.propagator.push_metrics(&Metrics::default()).await);
        assert!(matches!(err, MeshcastError::Timeout));
        assert_eq!(err.to_string(), "connection timeout");
    }

    #[tokio::test]
    async fn test_push_metrics_broker_error_verbatim() {
        let h = harness();
        h.broker.set_failure(Some("topic metrics_exporter not authorized".to_string()));

        let err = assert_err!(h.propagator.push_metrics(&Metrics::default()).await);
        assert_eq!(err.to_string(), "topic metrics_exporter not authorized");
    }
}
