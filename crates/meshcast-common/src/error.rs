//! Common error types for Meshcast components.

use thiserror::Error;

/// Common errors across Meshcast components
#[derive(Debug, Error)]
pub enum MeshcastError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis connection/operation error
    #[error("Redis error: {0}")]
    Redis(String),

    /// Broker rejected or failed a publish; the broker's message is kept verbatim
    #[error("{0}")]
    Transport(String),

    /// No acknowledgment within the publish window
    #[error("connection timeout")]
    Timeout,

    /// Record lookup miss (node, host, network)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Peer or proxy payload could not be computed
    #[error("Assembly failed: {0}")]
    Assembly(String),

    /// Payload could not be encoded
    #[error("{0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeshcastError {
    /// Returns true if the operation may succeed when re-triggered later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Transport(_) | Self::Timeout)
    }

    /// Returns true for lookup misses
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for MeshcastError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
