//! Routing engine for Redis Cluster.
//!
//! This crate turns logical commands into connections to the correct
//! shard: it caches the slot map per cluster name, follows MOVED/ASK
//! redirections, scatters pipelines across nodes while preserving the
//! caller's ordering, and fans administrative commands out to every
//! master. The single-node RESP client is abstract: implement
//! [`NodeSession`]/[`SessionPool`] over your connection layer and hand
//! the pool to [`ClusterClient`].
//!
//! ```ignore
//! let config = ClusterConfig::new("orders", vec![NodeAddr::new("10.0.0.1", 6379)]);
//! let mut client = ClusterClient::new(config, pool).await?;
//!
//! client.set("user:1000", "alice").await?;
//!
//! client.init_pipeline();
//! client.get("{user:1000}.profile").await?;
//! client.get("{user:1000}.settings").await?;
//! let replies = client.commit_pipeline().await?;
//! ```

pub mod admin;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod loader;
pub mod lock;
pub mod pipeline;
pub mod selector;
pub mod session;
pub mod topology;

pub use client::ClusterClient;
pub use config::ClusterConfig;
pub use error::{ClusterError, Result};
pub use lock::{LockGuard, NamedLock, ProcessLock};
pub use session::{Command, NodeSession, SessionError, SessionPool};
pub use topology::{SlotEntry, Topology, TopologyCache};

pub use redshard_protocols::{NodeAddr, SlotRange, Value};
