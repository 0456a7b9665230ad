//! Error kinds surfaced by the routing layer.
//!
//! Every routing-layer failure reaches the caller as one of these
//! variants. Opportunistic topology refreshes never mask the original
//! error: a failed refresh is logged and the triggering error returned.

use redshard_protocols::ParseError;
use thiserror::Error;

use crate::session::SessionError;

/// Result alias for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Missing cluster name or empty seed list.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No slot map is cached for the cluster, or the slot is unassigned.
    #[error("no topology for cluster '{name}' covering slot {slot:?}")]
    TopologyUnknown { name: String, slot: Option<u16> },

    /// Transport-level connect failure.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: SessionError,
    },

    /// No seed produced a slot map; carries one message per failed attempt.
    #[error("topology load failed: {}", .0.join("; "))]
    TopologyLoadFailed(Vec<String>),

    /// AUTH rejected. Never retried.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The cluster reported itself unavailable; retrying immediately is
    /// the caller's call, not ours.
    #[error("cluster down: {0}")]
    ClusterDown(String),

    /// The redirection budget was exhausted without settling on a node.
    #[error("exceeded {limit} redirections for slot {slot}")]
    MaxRedirectionsExceeded { limit: u32, slot: u16 },

    /// The server answered ASK while an ASKING hop was already in
    /// flight. One-shot redirects must not chain.
    #[error("nested ASK redirection for slot {slot}")]
    NestedAskRedirection { slot: u16 },

    /// Command is in the deny set and never dispatched.
    #[error("unsupported command '{0}'")]
    UnsupportedCommand(String),

    /// EVAL/EVALSHA key count missing, non-numeric, or greater than one.
    #[error("invalid EVAL key count: {0}")]
    EvalKeysInvalid(String),

    /// A slot entry with no nodes; published topologies never contain
    /// these, so hitting this means the invariant was broken upstream.
    #[error("no node available for slot {0}")]
    NodeSelectionFailed(u16),

    /// Any other error string returned by the server, passed through.
    #[error("{0}")]
    Backend(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ClusterError {
    pub(crate) fn topology_unknown(name: &str, slot: impl Into<Option<u16>>) -> Self {
        ClusterError::TopologyUnknown { name: name.to_string(), slot: slot.into() }
    }
}
