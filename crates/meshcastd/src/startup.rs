//! Coordinator startup notification.

use meshcast_common::{MeshcastError, NodeAction};

use crate::publishers::Propagator;

/// Tell every known node to fully resync after a coordinator restart.
///
/// Each node is marked force-update and sent its record. Per-node failures
/// are logged and skipped; only a failure to enumerate nodes is returned.
/// Returns the number of nodes that were notified successfully.
pub async fn server_start_notify(propagator: &Propagator) -> Result<usize, MeshcastError> {
    let mut nodes = propagator.registry().all_nodes().await?;
    let total = nodes.len();

    let mut notified = 0;
    for node in nodes.iter_mut() {
        node.action = NodeAction::ForceUpdate;
        match propagator.node_update(node).await {
            Ok(()) => notified += 1,
            Err(e) => {
                tracing::warn!(
                    node_id = %node.id,
                    network = %node.network,
                    error = %e,
                    "Failed to notify node of server startup"
                );
            }
        }
    }

    tracing::info!(notified, total, "📢 Startup notification sent");
    Ok(notified)
}
