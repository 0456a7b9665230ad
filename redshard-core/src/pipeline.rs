//! Pipeline scatter/gather.
//!
//! A committed pipeline is partitioned into one bucket per target node,
//! each bucket issued as a node-level pipeline, and the replies
//! reassembled into the caller's submission order. Individual `MOVED`
//! and `ASK ` replies are recovered by replaying just that command
//! through the executor; the topology refresh a `MOVED` triggers happens
//! at most once per commit.

use std::collections::HashMap;

use rand::Rng;
use redshard_protocols::{
    is_cluster_down, parse_redirect, slot_for_key, NodeAddr, Redirect, Value,
};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::executor::{wire_args, CommandExecutor};
use crate::loader::refresh_best_effort;
use crate::selector;
use crate::session::{authenticate, Command, SessionPool};
use crate::topology::TopologyCache;

/// One buffered command awaiting commit. `origin_index` is the
/// caller-visible position preserved across scatter/gather.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub command: Command,
    pub key: String,
    pub origin_index: usize,
}

struct Bucket {
    addr: NodeAddr,
    is_replica: bool,
    /// Indices into the request buffer, in buffer order.
    items: Vec<usize>,
}

pub struct PipelineExecutor<'a> {
    config: &'a ClusterConfig,
    pool: &'a dyn SessionPool,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(config: &'a ClusterConfig, pool: &'a dyn SessionPool) -> Self {
        Self { config, pool }
    }

    /// Flush a buffered pipeline and return replies in submission order.
    pub async fn commit(&self, requests: &[PipelineRequest]) -> Result<Vec<Value>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let buckets = self.partition(requests)?;
        tracing::debug!(cluster = %self.config.name, requests = requests.len(),
            buckets = buckets.len(), "pipeline partitioned");

        // Replies keyed by origin index, each with the request it answers.
        let mut gathered: Vec<Option<(usize, Value)>> = (0..requests.len()).map(|_| None).collect();

        for bucket in buckets.into_values() {
            let replies = match self.run_bucket(&bucket, requests).await {
                Ok(replies) => replies,
                Err(e) => {
                    if matches!(e, ClusterError::ConnectFailed { .. } | ClusterError::Session(_)) {
                        refresh_best_effort(self.config, self.pool).await;
                    }
                    return Err(e);
                }
            };
            for (&request_index, reply) in bucket.items.iter().zip(replies) {
                let origin = requests[request_index].origin_index;
                let cell = gathered
                    .get_mut(origin)
                    .ok_or_else(|| {
                        ClusterError::Backend(format!("origin index {origin} out of range"))
                    })?;
                *cell = Some((request_index, reply));
            }
        }

        // A CLUSTERDOWN anywhere poisons the whole commit.
        for entry in gathered.iter().flatten() {
            if let Some(msg) = entry.1.error_str() {
                if is_cluster_down(msg) {
                    return Err(ClusterError::ClusterDown(msg.to_string()));
                }
            }
        }

        self.reassemble(requests, gathered).await
    }

    /// Compute a bucket per target node. One random seed per commit
    /// keeps every request for a given slot on the same replica, so a
    /// pipeline does not fan across all N replicas of each master.
    fn partition(&self, requests: &[PipelineRequest]) -> Result<HashMap<String, Bucket>> {
        let topology = TopologyCache::get(&self.config.name)
            .ok_or_else(|| ClusterError::topology_unknown(&self.config.name, None))?;
        let magic = rand::thread_rng().gen_range(1..=topology.servers().len().max(1)) as u64;

        let mut buckets: HashMap<String, Bucket> = HashMap::new();
        for (index, request) in requests.iter().enumerate() {
            let slot = slot_for_key(request.key.as_bytes());
            let entry = topology
                .entry(slot)
                .ok_or_else(|| ClusterError::topology_unknown(&self.config.name, slot))?;
            let (addr, is_replica) = selector::pick(
                entry.nodes(),
                slot,
                self.config.enable_slave_read,
                Some(magic),
            )?;
            buckets
                .entry(addr.to_string())
                .or_insert_with(|| Bucket { addr, is_replica, items: Vec::new() })
                .items
                .push(index);
        }
        Ok(buckets)
    }

    async fn run_bucket(
        &self,
        bucket: &Bucket,
        requests: &[PipelineRequest],
    ) -> Result<Vec<Value>> {
        let mut session = self.pool.create();
        session.set_timeout(self.config.connection_timeout);
        if let Err(e) = session.connect(&bucket.addr.host, bucket.addr.port).await {
            self.pool.release(session).await;
            return Err(ClusterError::ConnectFailed {
                addr: bucket.addr.to_string(),
                source: e,
            });
        }

        if let Err(e) = authenticate(session.as_mut(), self.config).await {
            self.pool.release(session).await;
            return Err(e);
        }

        if bucket.is_replica {
            if let Err(e) = session.readonly().await {
                self.pool.release(session).await;
                return Err(e.into());
            }
        }

        let commands: Vec<Command> = bucket
            .items
            .iter()
            .map(|&index| {
                let request = &requests[index];
                Command::new(
                    request.command.name.clone(),
                    wire_args(&request.command.name, &request.key, &request.command.args),
                )
            })
            .collect();

        let replies = match session.pipeline(&commands).await {
            Ok(replies) => replies,
            Err(e) => {
                self.pool.release(session).await;
                return Err(e.into());
            }
        };
        self.pool.release(session).await;

        if replies.len() != commands.len() {
            return Err(ClusterError::Backend(format!(
                "node {} answered {} replies for {} pipelined commands",
                bucket.addr,
                replies.len(),
                commands.len()
            )));
        }
        Ok(replies)
    }

    /// Order replies by origin index, replaying redirected items.
    async fn reassemble(
        &self,
        requests: &[PipelineRequest],
        gathered: Vec<Option<(usize, Value)>>,
    ) -> Result<Vec<Value>> {
        let executor = CommandExecutor::new(self.config, self.pool);
        let mut refreshed = false;
        let mut output = Vec::with_capacity(gathered.len());

        for (origin, entry) in gathered.into_iter().enumerate() {
            let (request_index, reply) = entry.ok_or_else(|| {
                ClusterError::Backend(format!("no reply gathered for request {origin}"))
            })?;
            let request = &requests[request_index];

            let redirect = match reply.error_str() {
                Some(msg) => parse_redirect(msg)?,
                None => None,
            };

            let value = match redirect {
                Some(Redirect::Ask { addr, .. }) => {
                    self.replay(&executor, request, Some(addr)).await?
                }
                Some(Redirect::Moved { .. }) => {
                    if !refreshed {
                        refresh_best_effort(self.config, self.pool).await;
                        refreshed = true;
                    }
                    self.replay(&executor, request, None).await?
                }
                None => reply,
            };
            output.push(value);
        }

        Ok(output)
    }

    /// Re-execute one redirected pipeline item. Failures land in the
    /// item's result slot as error replies, except ClusterDown which
    /// fails the commit like it would have in the gather phase.
    async fn replay(
        &self,
        executor: &CommandExecutor<'_>,
        request: &PipelineRequest,
        ask_target: Option<NodeAddr>,
    ) -> Result<Value> {
        match executor
            .execute_redirected(
                &request.command.name,
                &request.key,
                &request.command.args,
                ask_target,
            )
            .await
        {
            Ok(value) => Ok(value),
            Err(e @ ClusterError::ClusterDown(_)) => Err(e),
            Err(e) => Ok(Value::Error(e.to_string())),
        }
    }
}
