//! Cluster topology snapshots and the process-wide cache.
//!
//! A [`Topology`] is immutable once published: a refresh builds a whole
//! new value and swaps it into the cache under the cluster name. Readers
//! clone an `Arc` and keep a consistent snapshot for the duration of one
//! command attempt, extracting what they need into locals before any
//! suspension so a concurrent refresh can retire the old snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use redshard_protocols::{NodeAddr, SlotRange, CLUSTER_SLOTS};

/// Ordered node list for one slot: the master first, then replicas in
/// the order the cluster reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    nodes: Vec<NodeAddr>,
}

impl SlotEntry {
    pub fn new(master: NodeAddr, replicas: Vec<NodeAddr>) -> Self {
        let mut nodes = Vec::with_capacity(1 + replicas.len());
        nodes.push(master);
        nodes.extend(replicas);
        Self { nodes }
    }

    pub fn master(&self) -> &NodeAddr {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[NodeAddr] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One consistent view of cluster membership and slot ownership.
#[derive(Debug, Clone)]
pub struct Topology {
    slots: Vec<Option<Arc<SlotEntry>>>,
    servers: Vec<NodeAddr>,
    masters: Vec<NodeAddr>,
}

impl Topology {
    /// Build a topology from `CLUSTER SLOTS` ranges.
    ///
    /// `masters` comes from `CLUSTER NODES` when available; pass `None`
    /// to fall back to the unique first-position masters of the ranges.
    /// The master list is rebuilt wholesale on every refresh, never
    /// appended to.
    pub fn from_ranges(ranges: &[SlotRange], masters: Option<Vec<NodeAddr>>) -> Self {
        let mut slots: Vec<Option<Arc<SlotEntry>>> = vec![None; CLUSTER_SLOTS as usize];
        let mut servers = Vec::new();
        let mut seen = HashSet::new();

        for range in ranges {
            let entry =
                Arc::new(SlotEntry::new(range.master.clone(), range.replicas.clone()));
            for node in entry.nodes() {
                if seen.insert(node.clone()) {
                    servers.push(node.clone());
                }
            }
            for slot in range.start..=range.end {
                slots[slot as usize] = Some(Arc::clone(&entry));
            }
        }

        let masters = masters.unwrap_or_else(|| {
            let mut unique = HashSet::new();
            ranges
                .iter()
                .map(|r| r.master.clone())
                .filter(|m| unique.insert(m.clone()))
                .collect()
        });

        Self { slots, servers, masters }
    }

    /// The node list serving `slot`, if the cluster has assigned it.
    pub fn entry(&self, slot: u16) -> Option<&SlotEntry> {
        self.slots.get(slot as usize)?.as_deref()
    }

    /// Every node appearing in any slot entry (dynamic membership).
    pub fn servers(&self) -> &[NodeAddr] {
        &self.servers
    }

    /// Nodes flagged `master`, the fan-out targets.
    pub fn masters(&self) -> &[NodeAddr] {
        &self.masters
    }

    /// Whether any slot is assigned. An empty map never satisfies a load.
    pub fn has_assignments(&self) -> bool {
        !self.servers.is_empty()
    }
}

static CACHE: Lazy<RwLock<HashMap<String, Arc<Topology>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Process-wide topology cache keyed by cluster name.
///
/// Lives for the process lifetime: populated on first client
/// construction for a name, replaced wholesale by refreshes. Readers
/// never mutate.
pub struct TopologyCache;

impl TopologyCache {
    pub fn get(name: &str) -> Option<Arc<Topology>> {
        CACHE.read().get(name).cloned()
    }

    /// Atomically publish a new topology for `name`.
    pub fn replace(name: &str, topology: Topology) {
        CACHE.write().insert(name.to_string(), Arc::new(topology));
    }

    /// Drop the cached topology, forcing the next init to reload.
    pub fn remove(name: &str) {
        CACHE.write().remove(name);
    }
}
