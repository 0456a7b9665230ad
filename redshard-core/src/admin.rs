//! Fan-out for cluster-global administrative commands.
//!
//! Commands like FLUSHALL only make sense against every master at once.
//! The fan-out opens an independent session per master and succeeds only
//! when every node does; partial failures come back as one concatenated
//! error so nothing is silently half-applied.

use redshard_protocols::{NodeAddr, Value};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::session::{authenticate, SessionPool};
use crate::topology::TopologyCache;

/// Commands executed on every master.
const FANOUT_COMMANDS: &[&str] = &["flushall", "flushdb"];

/// Commands refused outright: their blast radius on a whole cluster is
/// not something to reach through a keyed client API.
const DENIED_COMMANDS: &[&str] = &["config", "shutdown"];

pub fn is_fanout_command(cmd: &str) -> bool {
    FANOUT_COMMANDS.iter().any(|c| cmd.eq_ignore_ascii_case(c))
}

pub fn is_denied_command(cmd: &str) -> bool {
    DENIED_COMMANDS.iter().any(|c| cmd.eq_ignore_ascii_case(c))
}

pub struct AdminFanout<'a> {
    config: &'a ClusterConfig,
    pool: &'a dyn SessionPool,
}

impl<'a> AdminFanout<'a> {
    pub fn new(config: &'a ClusterConfig, pool: &'a dyn SessionPool) -> Self {
        Self { config, pool }
    }

    /// Run `cmd` on every master, collecting per-node failures.
    pub async fn run_on_all_masters(&self, cmd: &str, args: &[Vec<u8>]) -> Result<Value> {
        let masters: Vec<NodeAddr> = TopologyCache::get(&self.config.name)
            .ok_or_else(|| ClusterError::topology_unknown(&self.config.name, None))?
            .masters()
            .to_vec();

        let mut errors = Vec::new();
        for master in &masters {
            if let Err(e) = self.run_on_master(master, cmd, args).await {
                tracing::warn!(cluster = %self.config.name, node = %master, command = cmd,
                    error = %e, "fan-out command failed on master");
                errors.push(format!("{master}: {e}"));
            }
        }

        if errors.is_empty() {
            Ok(Value::ok())
        } else {
            Err(ClusterError::Backend(errors.join("; ")))
        }
    }

    async fn run_on_master(&self, addr: &NodeAddr, cmd: &str, args: &[Vec<u8>]) -> Result<()> {
        let mut session = self.pool.create();
        session.set_timeout(self.config.connection_timeout);
        if let Err(e) = session.connect(&addr.host, addr.port).await {
            self.pool.release(session).await;
            return Err(ClusterError::ConnectFailed { addr: addr.to_string(), source: e });
        }

        if let Err(e) = authenticate(session.as_mut(), self.config).await {
            self.pool.release(session).await;
            return Err(e);
        }

        let reply = match session.command(cmd, args).await {
            Ok(reply) => reply,
            Err(e) => {
                self.pool.release(session).await;
                return Err(e.into());
            }
        };
        self.pool.release(session).await;

        match reply.error_str() {
            Some(msg) => Err(ClusterError::Backend(msg.to_string())),
            None => Ok(()),
        }
    }
}
