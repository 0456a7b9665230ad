//! Named locks for single-flight initialization.
//!
//! The first topology load for a cluster name must happen once even when
//! many workers cold-start together. [`NamedLock`] is the seam: the
//! default [`ProcessLock`] serializes tasks within one process, and
//! deployments spanning several worker processes plug in their own
//! implementation (file lock, shared-memory lock, ...).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::Result;

/// Held lock; releases on drop so every exit path unlocks.
pub struct LockGuard {
    _held: Box<dyn std::any::Any + Send>,
}

impl LockGuard {
    pub fn new(held: impl std::any::Any + Send) -> Self {
        Self { _held: Box::new(held) }
    }
}

/// Mutual exclusion keyed by name, safe across workers sharing state.
#[async_trait]
pub trait NamedLock: Send + Sync {
    async fn acquire(&self, name: &str) -> Result<LockGuard>;
}

static LOCK_TABLE: Lazy<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// In-process named lock backed by a global table of async mutexes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLock;

#[async_trait]
impl NamedLock for ProcessLock {
    async fn acquire(&self, name: &str) -> Result<LockGuard> {
        let mutex = {
            let mut table = LOCK_TABLE.lock();
            Arc::clone(table.entry(name.to_string()).or_default())
        };
        let guard = mutex.lock_owned().await;
        Ok(LockGuard::new(guard))
    }
}
