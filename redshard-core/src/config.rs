//! Client configuration.
//!
//! `ClusterConfig` can be built in code or deserialized from a config
//! file. Durations accept humantime strings (`"500ms"`, `"55s"`). Legacy
//! option spellings from earlier deployments of this client are accepted
//! as aliases (`serv_list`, `connection_timout`, `enableSlaveRead`) so
//! existing config files keep working; the canonical names are the ones
//! on the fields.

use std::time::Duration;

use redshard_protocols::NodeAddr;
use serde::{Deserialize, Deserializer};

use crate::error::{ClusterError, Result};

/// Configuration for one named cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Cache key distinguishing co-resident clusters. Required.
    pub name: String,

    /// Seed nodes used whenever no topology is cached. Required, non-empty.
    #[serde(alias = "serv_list", deserialize_with = "de_node_addrs")]
    pub servers: Vec<NodeAddr>,

    /// Password sent once per fresh node session.
    #[serde(default)]
    pub auth: Option<String>,

    /// Per-socket operation timeout.
    #[serde(
        default = "default_connection_timeout",
        with = "humantime_serde",
        alias = "connection_timout"
    )]
    pub connection_timeout: Duration,

    /// Connect retries against a single seed while loading topology.
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,

    /// MOVED/ASK retry budget per command.
    #[serde(default = "default_max_redirection")]
    pub max_redirection: u32,

    /// Idle time before a pooled connection is discarded.
    #[serde(default = "default_keepalive_timeout", with = "humantime_serde")]
    pub keepalive_timeout: Duration,

    /// Pool size hint per node.
    #[serde(default = "default_keepalive_cons")]
    pub keepalive_cons: u32,

    /// Allow reads to land on replicas.
    #[serde(default, alias = "enableSlaveRead")]
    pub enable_slave_read: bool,
}

fn default_connection_timeout() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_connection_attempts() -> u32 {
    3
}

fn default_max_redirection() -> u32 {
    5
}

fn default_keepalive_timeout() -> Duration {
    Duration::from_millis(55_000)
}

fn default_keepalive_cons() -> u32 {
    1000
}

impl ClusterConfig {
    /// Minimal configuration: a name and a seed list, defaults elsewhere.
    pub fn new(name: impl Into<String>, servers: Vec<NodeAddr>) -> Self {
        Self {
            name: name.into(),
            servers,
            auth: None,
            connection_timeout: default_connection_timeout(),
            max_connection_attempts: default_max_connection_attempts(),
            max_redirection: default_max_redirection(),
            keepalive_timeout: default_keepalive_timeout(),
            keepalive_cons: default_keepalive_cons(),
            enable_slave_read: false,
        }
    }

    pub fn with_auth(mut self, password: impl Into<String>) -> Self {
        self.auth = Some(password.into());
        self
    }

    pub fn with_slave_read(mut self, enabled: bool) -> Self {
        self.enable_slave_read = enabled;
        self
    }

    pub fn with_max_redirection(mut self, limit: u32) -> Self {
        self.max_redirection = limit;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Check the required fields. Called by the client constructor.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ClusterError::ConfigInvalid("cluster name is required".to_string()));
        }
        if self.servers.is_empty() {
            return Err(ClusterError::ConfigInvalid("seed server list is empty".to_string()));
        }
        if self.max_redirection == 0 {
            return Err(ClusterError::ConfigInvalid(
                "max_redirection must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Seed nodes are written as `"host:port"` strings in config files.
fn de_node_addrs<'de, D>(deserializer: D) -> std::result::Result<Vec<NodeAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    raw.iter()
        .map(|s| s.parse::<NodeAddr>().map_err(serde::de::Error::custom))
        .collect()
}
