//! Configuration management for meshcastd.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use meshcast_common::constants::{
    BROADCAST_QUEUE_CAPACITY, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, FORCE_SYNC_EVERY,
    MQ_TIMEOUT_SECS, TELEMETRY_INTERVAL_SECS, TICK_INTERVAL_SECS,
};

/// Where publishes go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportBackend {
    /// Redis PUBLISH (retained payloads mirrored under `retained:{topic}`)
    #[default]
    Redis,
    /// In-process recorder, nothing leaves the coordinator
    Memory,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL (registry and default transport)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Admin HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// This coordinator's unique ID (auto-generated if not set)
    #[serde(default = "generate_server_id")]
    pub server_id: String,

    /// Version string stamped on peer updates
    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// Publish backend
    #[serde(default)]
    pub transport: TransportBackend,

    /// Master switch for publishing; when off every publisher succeeds without sending
    #[serde(default = "default_true")]
    pub message_queue_backend: bool,

    /// Push metrics snapshots to the exporter topic
    #[serde(default)]
    pub metrics_exporter: bool,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Firewall provisioning
    #[serde(default)]
    pub firewall: FirewallConfig,
}

/// Reconciliation and publish timing
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between reconciliation ticks
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Every Nth tick forces a network-wide peer resync
    #[serde(default = "default_force_sync_every")]
    pub force_sync_every: u32,

    /// Seconds to wait for a publish acknowledgment
    #[serde(default = "default_publish_timeout")]
    pub publish_timeout_secs: u64,

    /// Pending background broadcasts before submissions are dropped
    #[serde(default = "default_queue_capacity")]
    pub broadcast_queue_capacity: usize,

    /// Minimum seconds between telemetry checkpoints
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            force_sync_every: default_force_sync_every(),
            publish_timeout_secs: default_publish_timeout(),
            broadcast_queue_capacity: default_queue_capacity(),
            telemetry_interval_secs: default_telemetry_interval(),
        }
    }
}

/// Firewall/NAT provisioning mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallMode {
    On,
    #[default]
    Off,
}

/// Firewall provisioning configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirewallConfig {
    #[serde(default)]
    pub manage: FirewallMode,

    /// Shell command that (re)applies forwarding rules
    #[serde(default)]
    pub command: Option<String>,
}

impl FirewallConfig {
    pub fn is_managed(&self) -> bool {
        self.manage != FirewallMode::Off
    }
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_server_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_true() -> bool { true }
fn default_tick_interval() -> u64 { TICK_INTERVAL_SECS }
fn default_force_sync_every() -> u32 { FORCE_SYNC_EVERY }
fn default_publish_timeout() -> u64 { MQ_TIMEOUT_SECS }
fn default_queue_capacity() -> usize { BROADCAST_QUEUE_CAPACITY }
fn default_telemetry_interval() -> u64 { TELEMETRY_INTERVAL_SECS }

fn generate_server_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("server-{:08x}", rng.random::<u32>())
}

/// `MESHCAST_<KEY>` variables, `__` between nested keys
fn env_source() -> config::Environment {
    config::Environment::with_prefix("MESHCAST")
        .prefix_separator("_")
        .separator("__")
}

impl AppConfig {
    /// Load configuration from file and environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        if !Path::new(config_path).exists() {
            tracing::warn!("Config file not found, using defaults and environment");
        }
        let mut config = Self::from_sources(config_path, env_source())?;

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(transport) = args.transport {
            config.transport = transport;
        }

        config.validate()?;
        Ok(config)
    }

    /// Optional TOML file, then environment
    fn from_sources(config_path: &str, env: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(env)
            .build()
            .context("Failed to load config")?
            .try_deserialize()
            .context("Failed to parse config")
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.force_sync_every == 0 {
            anyhow::bail!("scheduler.force_sync_every must be at least 1");
        }
        if self.scheduler.tick_interval_secs == 0 {
            anyhow::bail!("scheduler.tick_interval_secs must be at least 1");
        }
        if self.scheduler.broadcast_queue_capacity == 0 {
            anyhow::bail!("scheduler.broadcast_queue_capacity must be at least 1");
        }
        if self.firewall.is_managed() && self.firewall.command.is_none() {
            tracing::warn!("Firewall management is on but no command is configured");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            server_id: generate_server_id(),
            server_version: default_server_version(),
            transport: TransportBackend::default(),
            message_queue_backend: true,
            metrics_exporter: false,
            scheduler: SchedulerConfig::default(),
            firewall: FirewallConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.force_sync_every, 5);
        assert!(config.message_queue_backend);
        assert!(!config.firewall.is_managed());
        assert!(config.server_id.starts_with("server-"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                transport = "memory"
                message_queue_backend = false

                [scheduler]
                force_sync_every = 3

                [firewall]
                manage = "on"
                command = "true"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();

        let config: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(config.transport, TransportBackend::Memory);
        assert!(!config.message_queue_backend);
        assert_eq!(config.scheduler.force_sync_every, 3);
        assert_eq!(config.scheduler.tick_interval_secs, TICK_INTERVAL_SECS);
        assert!(config.firewall.is_managed());
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source().source(Some(vars))
    }

    #[test]
    fn test_env_overrides_without_config_file() {
        let config = AppConfig::from_sources(
            "does/not/exist.toml",
            env(&[
                ("MESHCAST_SCHEDULER__FORCE_SYNC_EVERY", "3"),
                ("MESHCAST_TRANSPORT", "memory"),
                ("MESHCAST_REDIS_URL", "redis://10.0.0.2:6379"),
            ]),
        )
        .unwrap();

        assert_eq!(config.scheduler.force_sync_every, 3);
        assert_eq!(config.scheduler.tick_interval_secs, TICK_INTERVAL_SECS);
        assert_eq!(config.transport, TransportBackend::Memory);
        assert_eq!(config.redis_url, "redis://10.0.0.2:6379");
    }

    #[test]
    fn test_env_overrides_config_file() {
        let path = std::env::temp_dir().join(format!("meshcastd-{}.toml", std::process::id()));
        std::fs::write(&path, "metrics_exporter = true\n[scheduler]\nforce_sync_every = 7\n").unwrap();

        let config = AppConfig::from_sources(
            path.to_str().unwrap(),
            env(&[("MESHCAST_SCHEDULER__FORCE_SYNC_EVERY", "2")]),
        )
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.scheduler.force_sync_every, 2);
        assert!(config.metrics_exporter);
    }

    #[test]
    fn test_no_file_no_env_is_default() {
        let config = AppConfig::from_sources("does/not/exist.toml", env(&[])).unwrap();
        assert_eq!(config.scheduler.force_sync_every, FORCE_SYNC_EVERY);
        assert!(config.message_queue_backend);
        assert!(config.server_id.starts_with("server-"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = AppConfig::default();
        config.scheduler.force_sync_every = 0;
        assert!(config.validate().is_err());
    }
}
