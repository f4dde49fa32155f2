//! # Meshcast Common
//!
//! Shared types, errors, and constants used across Meshcast components.
//!
//! ## Modules
//! - `types` - Wire and record types (Node, Host, PeerUpdate, ProxyManagerPayload, Metrics)
//! - `error` - Common error type
//! - `constants` - Topic prefixes, timing defaults, and Redis key layout

pub mod constants;
pub mod error;
pub mod types;

pub use error::MeshcastError;
pub use types::*;
