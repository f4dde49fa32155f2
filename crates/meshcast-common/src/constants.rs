//! Shared constants for Meshcast components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default admin HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Seconds to wait for a broker acknowledgment before a publish fails
pub const MQ_TIMEOUT_SECS: u64 = 20;

/// Every Nth reconciliation tick forces a full peer resync
pub const FORCE_SYNC_EVERY: u32 = 5;

/// Reconciliation tick interval (seconds)
pub const TICK_INTERVAL_SECS: u64 = 60;

/// Telemetry checkpoint interval (24 hours)
pub const TELEMETRY_INTERVAL_SECS: u64 = 86_400;

/// Pending network-wide broadcasts before new submissions are dropped
pub const BROADCAST_QUEUE_CAPACITY: usize = 64;

/// Transport topics
pub mod topics {
    /// Peer updates: peers/{network}/{node_id}
    pub const PEERS_PREFIX: &str = "peers";

    /// Node record updates: update/{network}/{node_id}
    pub const UPDATE_PREFIX: &str = "update";

    /// Proxy manager updates: proxy/{network}/{node_id}
    pub const PROXY_PREFIX: &str = "proxy";

    /// Metrics exporter (not scoped by network or node)
    pub const METRICS_EXPORTER: &str = "metrics_exporter";
}

/// Redis key layout
pub mod redis_keys {
    /// Node record: meshcast:node:{node_id}
    pub const NODE_PREFIX: &str = "meshcast:node:";

    /// Host record keyed by node: meshcast:host:{node_id}
    pub const HOST_PREFIX: &str = "meshcast:host:";

    /// Set of all network IDs
    pub const NETWORKS: &str = "meshcast:networks";

    /// Set of node IDs in a network: meshcast:network:{net_id}:nodes
    pub const NETWORK_PREFIX: &str = "meshcast:network:";

    /// Last retained payload per topic: retained:{topic}
    pub const RETAINED_PREFIX: &str = "retained:";

    /// Coordinator heartbeat: meshcast:server:{server_id}
    pub const SERVER_PREFIX: &str = "meshcast:server:";

    /// Telemetry checkpoint record
    pub const TELEMETRY: &str = "meshcast:telemetry";
}
