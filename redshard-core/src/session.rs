//! The node-session seam.
//!
//! The routing engine never opens sockets itself; it drives a single-node
//! RESP client through [`NodeSession`] and borrows/returns instances
//! through [`SessionPool`]. Connection reuse is the pool's business:
//! `connect` on a pooled implementation may hand back a kept-alive
//! connection, which [`NodeSession::reused_times`] exposes so the engine
//! can apply its authenticate-once discipline.

use std::time::Duration;

use async_trait::async_trait;
use redshard_protocols::Value;
use thiserror::Error;

use crate::config::ClusterConfig;
use crate::error::ClusterError;

/// Transport-level failure from the underlying RESP client.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl SessionError {
    pub fn other(msg: impl Into<String>) -> Self {
        SessionError::Other(msg.into())
    }
}

/// One command destined for a node-level pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<Vec<u8>>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self { name: name.into(), args }
    }
}

/// A connection to a single cluster node.
///
/// Server error replies come back as `Ok(Value::Error(..))`; an `Err`
/// from any method means the transport itself failed.
#[async_trait]
pub trait NodeSession: Send {
    /// Apply the per-operation socket timeout.
    fn set_timeout(&mut self, timeout: Duration);

    /// Connect to a node, possibly resuming a kept-alive connection.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError>;

    /// How many times this connection has been handed out before.
    /// Zero means a fresh connection that has never authenticated.
    fn reused_times(&self) -> usize;

    async fn auth(&mut self, password: &str) -> Result<(), SessionError>;

    /// Issue `READONLY`, enabling replica reads on this connection.
    async fn readonly(&mut self) -> Result<(), SessionError>;

    /// Issue `ASKING`, honoring a one-shot migration redirect.
    async fn asking(&mut self) -> Result<(), SessionError>;

    /// Issue a single command.
    async fn command(&mut self, cmd: &str, args: &[Vec<u8>]) -> Result<Value, SessionError>;

    /// Issue a node-level pipeline; replies come back in command order.
    async fn pipeline(&mut self, commands: &[Command]) -> Result<Vec<Value>, SessionError>;
}

/// Factory and keep-alive pool for node sessions.
///
/// `release` is called on every exit path, success or failure; the
/// implementation decides whether the connection is healthy enough to
/// keep, honoring the configured `keepalive_timeout`/`keepalive_cons`.
#[async_trait]
pub trait SessionPool: Send + Sync {
    /// Hand out a session object. Connecting it is the caller's job.
    fn create(&self) -> Box<dyn NodeSession>;

    /// Return a session for keep-alive reuse.
    async fn release(&self, session: Box<dyn NodeSession>);
}

/// Authenticate a freshly dequeued session exactly once.
///
/// Re-used connections are already authenticated and must not re-issue
/// AUTH. Rejections are terminal; the caller must not retry them.
pub(crate) async fn authenticate(
    session: &mut (dyn NodeSession + '_),
    config: &ClusterConfig,
) -> Result<(), ClusterError> {
    let Some(password) = config.auth.as_deref() else {
        return Ok(());
    };
    if session.reused_times() > 0 {
        return Ok(());
    }
    session
        .auth(password)
        .await
        .map_err(|e| ClusterError::AuthFailed(e.to_string()))
}
