//! The cluster client façade.
//!
//! `ClusterClient` wires configuration, the session pool, and the named
//! initialization lock together, and exposes the command surface: a
//! generic [`call`](ClusterClient::call) that routes any command name
//! through the executor, typed wrappers for the everyday commands, the
//! EVAL contract, and pipeline buffering.

use std::sync::Arc;

use redshard_protocols::Value;

use crate::admin::{is_denied_command, is_fanout_command, AdminFanout};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::executor::{is_eval_command, CommandExecutor};
use crate::loader::{refresh_best_effort, SlotLoader};
use crate::lock::{NamedLock, ProcessLock};
use crate::pipeline::{PipelineExecutor, PipelineRequest};
use crate::session::{Command, SessionPool};
use crate::topology::TopologyCache;

/// Routing key for EVAL calls that declare zero keys. Such scripts have
/// no slot of their own, so they all land where this constant hashes;
/// callers needing deterministic placement pass a real key.
const EVAL_SENTINEL_KEY: &str = "no_key";

/// A cluster-aware Redis client.
///
/// Cheap to construct per task: the heavyweight state (topology, pooled
/// connections) is shared process-wide, keyed by the configured cluster
/// name.
pub struct ClusterClient {
    config: ClusterConfig,
    pool: Arc<dyn SessionPool>,
    lock: Arc<dyn NamedLock>,
    buffer: Option<Vec<PipelineRequest>>,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("config", &self.config)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl ClusterClient {
    /// Validate the configuration and ensure a topology is loaded.
    pub async fn new(config: ClusterConfig, pool: Arc<dyn SessionPool>) -> Result<Self> {
        Self::with_lock(config, pool, Arc::new(ProcessLock)).await
    }

    /// Like [`new`](Self::new) with a caller-supplied named lock, for
    /// deployments where workers span more than one process.
    pub async fn with_lock(
        config: ClusterConfig,
        pool: Arc<dyn SessionPool>,
        lock: Arc<dyn NamedLock>,
    ) -> Result<Self> {
        config.validate()?;
        let client = Self { config, pool, lock, buffer: None };
        client.init_slots().await?;
        Ok(client)
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Idempotent, single-flight topology initialization.
    ///
    /// The named lock gates only this cold-start path; refreshes
    /// triggered later by redirections proceed without it.
    pub async fn init_slots(&self) -> Result<()> {
        if TopologyCache::get(&self.config.name).is_some() {
            return Ok(());
        }
        let lock_name = format!("redis_cluster_slot_{}", self.config.name);
        let _guard = self.lock.acquire(&lock_name).await?;
        // Another worker may have loaded while we waited.
        if TopologyCache::get(&self.config.name).is_some() {
            return Ok(());
        }
        let topology = SlotLoader::new(&self.config, self.pool.as_ref()).load().await?;
        TopologyCache::replace(&self.config.name, topology);
        Ok(())
    }

    /// Explicit best-effort topology refresh.
    pub async fn fetch_slots(&self) {
        refresh_best_effort(&self.config, self.pool.as_ref()).await;
    }

    /// Dispatch any command name through the routing executor.
    ///
    /// `key` determines the slot; `args` follow the key on the wire.
    /// EVAL/EVALSHA interpret `key` as the script and `args` as the raw
    /// trailing arguments (`nkeys`, keys, script args). Fan-out commands
    /// run on every master; denied commands are rejected up front.
    pub async fn call(&mut self, cmd: &str, key: &str, args: Vec<Vec<u8>>) -> Result<Value> {
        if is_denied_command(cmd) {
            return Err(ClusterError::UnsupportedCommand(cmd.to_string()));
        }
        if is_fanout_command(cmd) {
            return AdminFanout::new(&self.config, self.pool.as_ref())
                .run_on_all_masters(cmd, &args)
                .await;
        }
        if is_eval_command(cmd) {
            let (routing_key, raw_args) = eval_routing(key, args)?;
            return self.dispatch(cmd, routing_key, raw_args).await;
        }
        self.dispatch(cmd, key.to_string(), args).await
    }

    async fn dispatch(&mut self, cmd: &str, key: String, args: Vec<Vec<u8>>) -> Result<Value> {
        if let Some(buffer) = self.buffer.as_mut() {
            let origin_index = buffer.len();
            buffer.push(PipelineRequest { command: Command::new(cmd, args), key, origin_index });
            return Ok(Value::Status("QUEUED".to_string()));
        }
        CommandExecutor::new(&self.config, self.pool.as_ref()).execute(cmd, &key, &args).await
    }

    // -- pipeline mode ---------------------------------------------------

    /// Switch into buffering mode; commands queue until commit.
    pub fn init_pipeline(&mut self) {
        self.buffer = Some(Vec::new());
    }

    /// Discard any buffered commands and leave pipeline mode.
    pub fn cancel_pipeline(&mut self) {
        self.buffer = None;
    }

    /// Flush the buffer; results come back in submission order.
    /// The buffer is consumed whether the commit succeeds or fails.
    pub async fn commit_pipeline(&mut self) -> Result<Vec<Value>> {
        let Some(requests) = self.buffer.take() else {
            return Err(ClusterError::Backend("no pipeline to commit".to_string()));
        };
        PipelineExecutor::new(&self.config, self.pool.as_ref()).commit(&requests).await
    }

    // -- convenience wrappers --------------------------------------------

    pub async fn get(&mut self, key: &str) -> Result<Value> {
        self.call("GET", key, Vec::new()).await
    }

    pub async fn set(&mut self, key: &str, value: impl Into<Vec<u8>> + Send) -> Result<Value> {
        self.call("SET", key, vec![value.into()]).await
    }

    pub async fn del(&mut self, key: &str) -> Result<Value> {
        self.call("DEL", key, Vec::new()).await
    }

    pub async fn exists(&mut self, key: &str) -> Result<Value> {
        self.call("EXISTS", key, Vec::new()).await
    }

    pub async fn expire(&mut self, key: &str, seconds: i64) -> Result<Value> {
        self.call("EXPIRE", key, vec![seconds.to_string().into_bytes()]).await
    }

    pub async fn incr(&mut self, key: &str) -> Result<Value> {
        self.call("INCR", key, Vec::new()).await
    }

    pub async fn decr(&mut self, key: &str) -> Result<Value> {
        self.call("DECR", key, Vec::new()).await
    }

    pub async fn hget(&mut self, key: &str, field: &str) -> Result<Value> {
        self.call("HGET", key, vec![field.as_bytes().to_vec()]).await
    }

    pub async fn hset(
        &mut self,
        key: &str,
        field: &str,
        value: impl Into<Vec<u8>> + Send,
    ) -> Result<Value> {
        self.call("HSET", key, vec![field.as_bytes().to_vec(), value.into()]).await
    }

    pub async fn lpush(&mut self, key: &str, value: impl Into<Vec<u8>> + Send) -> Result<Value> {
        self.call("LPUSH", key, vec![value.into()]).await
    }

    pub async fn rpop(&mut self, key: &str) -> Result<Value> {
        self.call("RPOP", key, Vec::new()).await
    }

    pub async fn sadd(&mut self, key: &str, member: impl Into<Vec<u8>> + Send) -> Result<Value> {
        self.call("SADD", key, vec![member.into()]).await
    }

    pub async fn smembers(&mut self, key: &str) -> Result<Value> {
        self.call("SMEMBERS", key, Vec::new()).await
    }

    /// EVAL with the standard call shape: script, key count, then keys
    /// and script arguments.
    pub async fn eval(
        &mut self,
        script: &str,
        nkeys: usize,
        keys_and_args: Vec<Vec<u8>>,
    ) -> Result<Value> {
        let mut args = vec![nkeys.to_string().into_bytes()];
        args.extend(keys_and_args);
        self.call("EVAL", script, args).await
    }

    pub async fn flushall(&mut self) -> Result<Value> {
        self.call("FLUSHALL", "", Vec::new()).await
    }

    pub async fn flushdb(&mut self) -> Result<Value> {
        self.call("FLUSHDB", "", Vec::new()).await
    }
}

/// Validate the EVAL key count and pick the routing key.
///
/// A script touching more than one key cannot be pinned to a single
/// slot, so `nkeys > 1` is refused before any network traffic. With
/// `nkeys == 0` routing falls back to [`EVAL_SENTINEL_KEY`].
fn eval_routing(script: &str, args: Vec<Vec<u8>>) -> Result<(String, Vec<Vec<u8>>)> {
    let nkeys = args
        .first()
        .and_then(|raw| std::str::from_utf8(raw).ok())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ClusterError::EvalKeysInvalid("key count missing or non-numeric".to_string())
        })?;

    let routing_key = match nkeys {
        0 => EVAL_SENTINEL_KEY.to_string(),
        1 => {
            let key = args.get(1).ok_or_else(|| {
                ClusterError::EvalKeysInvalid("declared 1 key but none provided".to_string())
            })?;
            String::from_utf8_lossy(key).into_owned()
        }
        n => {
            return Err(ClusterError::EvalKeysInvalid(format!(
                "{n} keys declared; scripts are limited to a single slot"
            )))
        }
    };

    let mut raw_args = Vec::with_capacity(args.len() + 1);
    raw_args.push(script.as_bytes().to_vec());
    raw_args.extend(args);
    Ok((routing_key, raw_args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(s: &str) -> Vec<u8> {
        s.as_bytes().to_vec()
    }

    #[test]
    fn eval_single_key_routes_on_that_key() {
        let (key, raw) =
            eval_routing("return 1", vec![arg("1"), arg("{user}state"), arg("x")]).unwrap();
        assert_eq!(key, "{user}state");
        assert_eq!(raw, vec![arg("return 1"), arg("1"), arg("{user}state"), arg("x")]);
    }

    #[test]
    fn eval_zero_keys_uses_sentinel() {
        let (key, raw) = eval_routing("return 1", vec![arg("0")]).unwrap();
        assert_eq!(key, EVAL_SENTINEL_KEY);
        assert_eq!(raw, vec![arg("return 1"), arg("0")]);
    }

    #[test]
    fn eval_multi_key_is_refused() {
        let err = eval_routing("return 1", vec![arg("2"), arg("a"), arg("b")]).unwrap_err();
        assert!(matches!(err, ClusterError::EvalKeysInvalid(_)));
    }

    #[test]
    fn eval_non_numeric_count_is_refused() {
        for bad in [vec![], vec![arg("abc")], vec![arg("1.5")]] {
            let err = eval_routing("return 1", bad).unwrap_err();
            assert!(matches!(err, ClusterError::EvalKeysInvalid(_)));
        }
    }

    #[test]
    fn eval_declared_key_must_be_present() {
        let err = eval_routing("return 1", vec![arg("1")]).unwrap_err();
        assert!(matches!(err, ClusterError::EvalKeysInvalid(_)));
    }
}
