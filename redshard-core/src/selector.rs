//! Node selection policy.
//!
//! Picks which entry of a slot's node list serves a request. Replica
//! reads are opt-in; a pipeline passes a per-commit seed so every
//! request for a given slot inside that pipeline converges on the same
//! node instead of fanning across all replicas.

use rand::Rng;
use redshard_protocols::NodeAddr;

use crate::error::{ClusterError, Result};

/// Choose a node from `nodes` (master first, replicas after).
///
/// With replica reads disabled the master is returned unconditionally.
/// With them enabled, a provided `seed` selects `seed % len`
/// deterministically; otherwise the pick is uniform over the whole list,
/// master included.
pub fn pick(
    nodes: &[NodeAddr],
    slot: u16,
    enable_slave_read: bool,
    seed: Option<u64>,
) -> Result<(NodeAddr, bool)> {
    if nodes.is_empty() {
        return Err(ClusterError::NodeSelectionFailed(slot));
    }
    if !enable_slave_read {
        return Ok((nodes[0].clone(), false));
    }
    let index = match seed {
        Some(seed) => (seed % nodes.len() as u64) as usize,
        None => rand::thread_rng().gen_range(0..nodes.len()),
    };
    Ok((nodes[index].clone(), index != 0))
}
