//! Scripted mock session backing the integration tests.
//!
//! A `MockBackend` holds the cluster's scripted state: a `CLUSTER SLOTS`
//! reply served to any connected session, derived `CLUSTER NODES` text,
//! and a FIFO of canned replies per node. Every session event is
//! recorded in an ordered log so tests can assert on routing decisions,
//! ASKING preambles, and auth discipline.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redshard_core::{
    ClusterClient, ClusterConfig, Command, NodeAddr, NodeSession, SessionError, SessionPool, Value,
};

pub enum MockReply {
    Value(Value),
    /// Simulated transport failure while reading the reply.
    Transport,
}

#[derive(Default)]
struct NodeState {
    replies: VecDeque<MockReply>,
    refuse_connect: bool,
    /// Connections returned to the keep-alive pool, consumed by the
    /// next connect to model reuse.
    released: usize,
}

#[derive(Default)]
pub struct MockBackend {
    nodes: Mutex<HashMap<String, NodeState>>,
    slots_reply: Mutex<Option<Value>>,
    nodes_text: Mutex<String>,
    fail_cluster_nodes: AtomicBool,
    reject_auth: AtomicBool,
    slots_served: AtomicUsize,
    releases: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install a topology: `(start, end, master, replicas)` per range.
    /// Registers every referenced node and regenerates the
    /// `CLUSTER NODES` text (replicas get the `slave` flag).
    pub fn set_topology(&self, ranges: &[(u16, u16, &str, &[&str])]) {
        let mut rows = Vec::new();
        let mut lines = String::new();
        let mut node_id = 0usize;
        for (start, end, master, replicas) in ranges {
            let mut row = vec![
                Value::Int(i64::from(*start)),
                Value::Int(i64::from(*end)),
                node_value(master),
            ];
            self.register(master);
            lines.push_str(&node_line(node_id, master, "master"));
            node_id += 1;
            for replica in *replicas {
                row.push(node_value(replica));
                self.register(replica);
                lines.push_str(&node_line(node_id, replica, "slave"));
                node_id += 1;
            }
            rows.push(Value::Array(row));
        }
        *self.slots_reply.lock() = Some(Value::Array(rows));
        *self.nodes_text.lock() = lines;
    }

    /// Register a node that serves no slots (e.g. a dedicated seed or an
    /// ASK target outside the slot map).
    pub fn add_node(&self, addr: &str) {
        self.register(addr);
    }

    fn register(&self, addr: &str) {
        self.nodes.lock().entry(addr.to_string()).or_default();
    }

    pub fn push_value(&self, addr: &str, value: Value) {
        self.nodes
            .lock()
            .entry(addr.to_string())
            .or_default()
            .replies
            .push_back(MockReply::Value(value));
    }

    pub fn push_ok(&self, addr: &str) {
        self.push_value(addr, Value::ok());
    }

    pub fn push_bulk(&self, addr: &str, data: &str) {
        self.push_value(addr, Value::bulk(data));
    }

    pub fn push_error(&self, addr: &str, msg: &str) {
        self.push_value(addr, Value::Error(msg.to_string()));
    }

    pub fn push_transport_error(&self, addr: &str) {
        self.nodes
            .lock()
            .entry(addr.to_string())
            .or_default()
            .replies
            .push_back(MockReply::Transport);
    }

    pub fn refuse_connect(&self, addr: &str, refuse: bool) {
        self.nodes.lock().entry(addr.to_string()).or_default().refuse_connect = refuse;
    }

    pub fn fail_cluster_nodes(&self, fail: bool) {
        self.fail_cluster_nodes.store(fail, Ordering::SeqCst);
    }

    pub fn reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// How many times `CLUSTER SLOTS` was served: one per topology load.
    pub fn slots_loads(&self) -> usize {
        self.slots_served.load(Ordering::SeqCst)
    }

    /// How many sessions were returned through the pool.
    pub fn pool_releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Events for one node, with the address prefix stripped.
    pub fn log_for(&self, addr: &str) -> Vec<String> {
        let prefix = format!("{addr} ");
        self.log
            .lock()
            .iter()
            .filter_map(|line| line.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn record(&self, addr: &str, event: &str) {
        self.log.lock().push(format!("{addr} {event}"));
    }
}

fn node_value(addr: &str) -> Value {
    let parsed: NodeAddr = addr.parse().expect("test node address");
    Value::Array(vec![
        Value::bulk(parsed.host.clone()),
        Value::Int(i64::from(parsed.port)),
        Value::bulk(format!("id-{addr}")),
    ])
}

fn node_line(id: usize, addr: &str, role: &str) -> String {
    let parsed: NodeAddr = addr.parse().expect("test node address");
    format!(
        "{id:040} {host}:{port}@{bus} {role} - 0 0 1 connected\n",
        host = parsed.host,
        port = parsed.port,
        bus = u32::from(parsed.port) + 10_000,
    )
}

pub struct MockSession {
    backend: Arc<MockBackend>,
    addr: Option<String>,
    reused: usize,
    connected: bool,
}

impl MockSession {
    fn addr(&self) -> Result<String, SessionError> {
        self.addr.clone().ok_or_else(|| SessionError::other("session not connected"))
    }
}

#[async_trait]
impl NodeSession for MockSession {
    fn set_timeout(&mut self, _timeout: Duration) {}

    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError> {
        let key = format!("{host}:{port}");
        {
            let mut nodes = self.backend.nodes.lock();
            let Some(state) = nodes.get_mut(&key) else {
                return Err(SessionError::other(format!("unknown node {key}")));
            };
            if state.refuse_connect {
                drop(nodes);
                self.backend.record(&key, "connect-refused");
                return Err(SessionError::other("connection refused"));
            }
            self.reused = if state.released > 0 {
                state.released -= 1;
                1
            } else {
                0
            };
        }
        self.backend.record(&key, "connect");
        self.addr = Some(key);
        self.connected = true;
        Ok(())
    }

    fn reused_times(&self) -> usize {
        self.reused
    }

    async fn auth(&mut self, _password: &str) -> Result<(), SessionError> {
        let addr = self.addr()?;
        self.backend.record(&addr, "auth");
        if self.backend.reject_auth.load(Ordering::SeqCst) {
            return Err(SessionError::other("ERR invalid password"));
        }
        Ok(())
    }

    async fn readonly(&mut self) -> Result<(), SessionError> {
        let addr = self.addr()?;
        self.backend.record(&addr, "readonly");
        Ok(())
    }

    async fn asking(&mut self) -> Result<(), SessionError> {
        let addr = self.addr()?;
        self.backend.record(&addr, "asking");
        Ok(())
    }

    async fn command(&mut self, cmd: &str, args: &[Vec<u8>]) -> Result<Value, SessionError> {
        let addr = self.addr()?;

        if cmd.eq_ignore_ascii_case("cluster") {
            let sub = args
                .first()
                .map(|a| String::from_utf8_lossy(a).to_uppercase())
                .unwrap_or_default();
            self.backend.record(&addr, &format!("command CLUSTER {sub}"));
            match sub.as_str() {
                "SLOTS" => {
                    let reply = self
                        .backend
                        .slots_reply
                        .lock()
                        .clone()
                        .ok_or_else(|| SessionError::other("no topology scripted"))?;
                    self.backend.slots_served.fetch_add(1, Ordering::SeqCst);
                    return Ok(reply);
                }
                "NODES" => {
                    if self.backend.fail_cluster_nodes.load(Ordering::SeqCst) {
                        return Err(SessionError::other("connection reset"));
                    }
                    return Ok(Value::bulk(self.backend.nodes_text.lock().clone()));
                }
                _ => return Err(SessionError::other(format!("unscripted CLUSTER {sub}"))),
            }
        }

        let first = args.first().map(|a| String::from_utf8_lossy(a).into_owned());
        match first {
            Some(first) => self.backend.record(&addr, &format!("command {cmd} {first}")),
            None => self.backend.record(&addr, &format!("command {cmd}")),
        }

        let reply = self
            .backend
            .nodes
            .lock()
            .get_mut(&addr)
            .and_then(|state| state.replies.pop_front())
            .ok_or_else(|| SessionError::other(format!("no scripted reply at {addr}")))?;
        match reply {
            MockReply::Value(value) => Ok(value),
            MockReply::Transport => Err(SessionError::other("broken pipe")),
        }
    }

    async fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Value>, SessionError> {
        let addr = self.addr()?;
        self.backend.record(&addr, &format!("pipeline {}", commands.len()));

        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            let first = command.args.first().map(|a| String::from_utf8_lossy(a).into_owned());
            match first {
                Some(first) => {
                    self.backend.record(&addr, &format!("command {} {first}", command.name))
                }
                None => self.backend.record(&addr, &format!("command {}", command.name)),
            }
            let reply = self
                .backend
                .nodes
                .lock()
                .get_mut(&addr)
                .and_then(|state| state.replies.pop_front())
                .ok_or_else(|| SessionError::other(format!("no scripted reply at {addr}")))?;
            match reply {
                MockReply::Value(value) => replies.push(value),
                MockReply::Transport => return Err(SessionError::other("broken pipe")),
            }
        }
        Ok(replies)
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        // Only connections that actually opened go back to keep-alive.
        if self.connected {
            if let Some(addr) = &self.addr {
                if let Some(state) = self.backend.nodes.lock().get_mut(addr) {
                    state.released += 1;
                }
            }
        }
    }
}

pub struct MockPool {
    backend: Arc<MockBackend>,
}

impl MockPool {
    pub fn new(backend: Arc<MockBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SessionPool for MockPool {
    fn create(&self) -> Box<dyn NodeSession> {
        Box::new(MockSession {
            backend: Arc::clone(&self.backend),
            addr: None,
            reused: 0,
            connected: false,
        })
    }

    async fn release(&self, session: Box<dyn NodeSession>) {
        self.backend.releases.fetch_add(1, Ordering::SeqCst);
        drop(session);
    }
}

/// Config with mock-friendly defaults and the given seeds.
pub fn test_config(name: &str, seeds: &[&str]) -> ClusterConfig {
    let servers = seeds.iter().map(|s| s.parse().expect("test seed address")).collect();
    ClusterConfig::new(name, servers)
}

/// Build a client over the mock backend, running the initial load.
pub async fn connect_client(
    config: ClusterConfig,
    backend: &Arc<MockBackend>,
) -> redshard_core::Result<ClusterClient> {
    ClusterClient::new(config, Arc::new(MockPool::new(Arc::clone(backend)))).await
}
