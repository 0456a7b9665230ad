//! Single-command execution and the redirection state machine.
//!
//! Each attempt resolves the key's slot against the cached topology,
//! selects a node, and issues the command. Redirections drive the state:
//!
//! - `MOVED` means ownership changed for good: refresh the topology and
//!   retry from scratch.
//! - `ASK ` means the slot is mid-migration: make exactly one hop to the
//!   named node with an `ASKING` preamble, and never chain a second hop.
//! - `CLUSTERDOWN` is not a routing problem; it surfaces immediately and
//!   retrying is left to the caller.
//!
//! The loop is bounded by `max_redirection` attempts, and the session in
//! use is returned to the pool on every exit path.

use redshard_protocols::{
    is_cluster_down, parse_redirect, slot_for_key, NodeAddr, Redirect, Value,
};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::loader::refresh_best_effort;
use crate::selector;
use crate::session::{authenticate, SessionPool};
use crate::topology::TopologyCache;

pub struct CommandExecutor<'a> {
    config: &'a ClusterConfig,
    pool: &'a dyn SessionPool,
}

enum Attempt {
    Done(Value),
    Retry,
    RetryAsking(NodeAddr),
}

impl<'a> CommandExecutor<'a> {
    pub fn new(config: &'a ClusterConfig, pool: &'a dyn SessionPool) -> Self {
        Self { config, pool }
    }

    /// Execute one logical command, following redirections.
    pub async fn execute(&self, cmd: &str, key: &str, args: &[Vec<u8>]) -> Result<Value> {
        self.execute_redirected(cmd, key, args, None).await
    }

    /// Execute with the first attempt pre-targeted at `ask_target` as an
    /// ASKING hop. This is how pipeline reassembly replays a single
    /// command that came back with an ASK reply.
    pub async fn execute_redirected(
        &self,
        cmd: &str,
        key: &str,
        args: &[Vec<u8>],
        ask_target: Option<NodeAddr>,
    ) -> Result<Value> {
        let slot = slot_for_key(key.as_bytes());
        let limit = self.config.max_redirection;
        let mut asking = ask_target;

        for attempt in 1..=limit {
            let ask_hop = asking.take();
            match self.attempt(cmd, key, args, slot, ask_hop, attempt == limit).await? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry => {}
                Attempt::RetryAsking(addr) => asking = Some(addr),
            }
        }

        Err(ClusterError::MaxRedirectionsExceeded { limit, slot })
    }

    async fn attempt(
        &self,
        cmd: &str,
        key: &str,
        args: &[Vec<u8>],
        slot: u16,
        ask_hop: Option<NodeAddr>,
        last: bool,
    ) -> Result<Attempt> {
        // Routing state is copied out of the snapshot before the first
        // await so a concurrent refresh can retire the old topology.
        let (addr, is_replica) = {
            let topology = TopologyCache::get(&self.config.name)
                .ok_or_else(|| ClusterError::topology_unknown(&self.config.name, slot))?;
            let entry = topology
                .entry(slot)
                .ok_or_else(|| ClusterError::topology_unknown(&self.config.name, slot))?;
            match &ask_hop {
                // An ASK hop targets the named node directly, as a master.
                Some(addr) => (addr.clone(), false),
                None => selector::pick(
                    entry.nodes(),
                    slot,
                    self.config.enable_slave_read,
                    None,
                )?,
            }
        };

        let mut session = self.pool.create();
        session.set_timeout(self.config.connection_timeout);
        if let Err(e) = session.connect(&addr.host, addr.port).await {
            tracing::debug!(cluster = %self.config.name, node = %addr, error = %e,
                "connect failed, refreshing topology");
            self.pool.release(session).await;
            refresh_best_effort(self.config, self.pool).await;
            if last {
                return Err(ClusterError::ConnectFailed { addr: addr.to_string(), source: e });
            }
            return Ok(Attempt::Retry);
        }

        if let Err(e) = authenticate(session.as_mut(), self.config).await {
            self.pool.release(session).await;
            return Err(e);
        }

        if is_replica {
            // A replica refusing READONLY means our routing is stale.
            if let Err(e) = session.readonly().await {
                self.pool.release(session).await;
                refresh_best_effort(self.config, self.pool).await;
                return Err(e.into());
            }
        }

        if ask_hop.is_some() {
            if let Err(e) = session.asking().await {
                self.pool.release(session).await;
                refresh_best_effort(self.config, self.pool).await;
                return Err(e.into());
            }
        }

        let wire_args = wire_args(cmd, key, args);
        let reply = match session.command(cmd, &wire_args).await {
            Ok(reply) => reply,
            Err(e) => {
                self.pool.release(session).await;
                refresh_best_effort(self.config, self.pool).await;
                return Err(e.into());
            }
        };
        self.pool.release(session).await;

        let msg = match reply.error_str() {
            Some(msg) => msg.to_string(),
            None => return Ok(Attempt::Done(reply)),
        };

        if msg.starts_with("MOVED") {
            tracing::debug!(cluster = %self.config.name, slot, node = %addr,
                "MOVED received, refreshing topology");
            refresh_best_effort(self.config, self.pool).await;
            return Ok(Attempt::Retry);
        }

        if is_cluster_down(&msg) {
            return Err(ClusterError::ClusterDown(msg));
        }

        if let Some(Redirect::Ask { addr: target, .. }) = parse_redirect(&msg)? {
            if ask_hop.is_some() {
                return Err(ClusterError::NestedAskRedirection { slot });
            }
            tracing::debug!(cluster = %self.config.name, slot, target = %target,
                "ASK received, making one-shot hop");
            return Ok(Attempt::RetryAsking(target));
        }

        refresh_best_effort(self.config, self.pool).await;
        Err(ClusterError::Backend(msg))
    }
}

/// EVAL and EVALSHA carry their full argument list verbatim; every other
/// command gets the key prepended.
pub(crate) fn wire_args(cmd: &str, key: &str, args: &[Vec<u8>]) -> Vec<Vec<u8>> {
    if is_eval_command(cmd) {
        return args.to_vec();
    }
    let mut out = Vec::with_capacity(args.len() + 1);
    out.push(key.as_bytes().to_vec());
    out.extend(args.iter().cloned());
    out
}

pub(crate) fn is_eval_command(cmd: &str) -> bool {
    cmd.eq_ignore_ascii_case("eval") || cmd.eq_ignore_ascii_case("evalsha")
}
