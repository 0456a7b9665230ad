//! Topology loading from seed nodes.
//!
//! The loader walks the configured seed list in order, giving each seed
//! `max_connection_attempts` connects. The first seed that yields slot
//! assignments satisfies the load; `CLUSTER NODES` is best-effort on top
//! of it, falling back to the slot map's own masters when it fails. Only
//! when every seed comes up empty does the accumulated error list
//! surface.

use redshard_protocols::{parse_cluster_nodes, parse_slots_reply, NodeAddr};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::session::{authenticate, NodeSession, SessionError, SessionPool};
use crate::topology::{Topology, TopologyCache};

pub struct SlotLoader<'a> {
    config: &'a ClusterConfig,
    pool: &'a dyn SessionPool,
}

impl<'a> SlotLoader<'a> {
    pub fn new(config: &'a ClusterConfig, pool: &'a dyn SessionPool) -> Self {
        Self { config, pool }
    }

    /// Fetch a fresh topology from the first seed that can serve one.
    pub async fn load(&self) -> Result<Topology> {
        let mut failures = Vec::new();

        for seed in &self.config.servers {
            let mut session = match self.connect_seed(seed).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::debug!(cluster = %self.config.name, seed = %seed, error = %e,
                        "seed unreachable");
                    failures.push(format!("{seed}: {e}"));
                    continue;
                }
            };

            // Auth rejections are terminal: the password is cluster-wide,
            // so the remaining seeds would refuse it too.
            if let Err(e) = authenticate(session.as_mut(), self.config).await {
                self.pool.release(session).await;
                return Err(e);
            }

            match self.fetch_topology(session.as_mut()).await {
                Ok(topology) => {
                    self.pool.release(session).await;
                    return Ok(topology);
                }
                Err(e) => {
                    tracing::debug!(cluster = %self.config.name, seed = %seed, error = %e,
                        "seed could not serve a slot map");
                    failures.push(format!("{seed}: {e}"));
                    self.pool.release(session).await;
                }
            }
        }

        Err(ClusterError::TopologyLoadFailed(failures))
    }

    async fn connect_seed(&self, seed: &NodeAddr) -> Result<Box<dyn NodeSession>> {
        let mut last_error: Option<SessionError> = None;
        for attempt in 1..=self.config.max_connection_attempts {
            let mut session = self.pool.create();
            session.set_timeout(self.config.connection_timeout);
            match session.connect(&seed.host, seed.port).await {
                Ok(()) => return Ok(session),
                Err(e) => {
                    tracing::debug!(seed = %seed, attempt, error = %e, "seed connect failed");
                    self.pool.release(session).await;
                    last_error = Some(e);
                }
            }
        }
        Err(ClusterError::ConnectFailed {
            addr: seed.to_string(),
            source: last_error.unwrap_or_else(|| SessionError::other("no connect attempts")),
        })
    }

    async fn fetch_topology(&self, session: &mut (dyn NodeSession + '_)) -> Result<Topology> {
        let reply = session.command("CLUSTER", &[b"SLOTS".to_vec()]).await?;
        if let Some(msg) = reply.error_str() {
            return Err(ClusterError::Backend(msg.to_string()));
        }
        let ranges = parse_slots_reply(&reply)?;
        if ranges.is_empty() {
            return Err(ClusterError::Backend("cluster has no slot assignments".to_string()));
        }

        let masters = match self.fetch_masters(session).await {
            Ok(masters) => Some(masters),
            Err(e) => {
                // Still a usable load: the slot map stands on its own and
                // the master list falls back to the ranges' masters.
                tracing::warn!(cluster = %self.config.name, error = %e,
                    "CLUSTER NODES failed, deriving masters from slot map");
                None
            }
        };

        Ok(Topology::from_ranges(&ranges, masters))
    }

    async fn fetch_masters(&self, session: &mut (dyn NodeSession + '_)) -> Result<Vec<NodeAddr>> {
        let reply = session.command("CLUSTER", &[b"NODES".to_vec()]).await?;
        if let Some(msg) = reply.error_str() {
            return Err(ClusterError::Backend(msg.to_string()));
        }
        let text = reply
            .as_str()
            .ok_or_else(|| ClusterError::Backend("CLUSTER NODES reply was not text".to_string()))?;
        let records = parse_cluster_nodes(text)?;
        Ok(records.into_iter().filter(|r| r.is_master()).map(|r| r.addr).collect())
    }
}

/// Reload and republish the topology, swallowing failures.
///
/// Redirection handling calls this opportunistically; the caller's own
/// error, not the refresh outcome, is what surfaces to users.
pub(crate) async fn refresh_best_effort(config: &ClusterConfig, pool: &dyn SessionPool) {
    match SlotLoader::new(config, pool).load().await {
        Ok(topology) => {
            tracing::debug!(cluster = %config.name, "topology refreshed");
            TopologyCache::replace(&config.name, topology);
        }
        Err(e) => {
            tracing::warn!(cluster = %config.name, error = %e, "topology refresh failed");
        }
    }
}
