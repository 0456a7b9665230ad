//! MOVED and ASK redirect parsing.
//!
//! Redis Cluster steers clients with error replies:
//!
//! - `MOVED <slot> <ip>:<port>`: the slot has permanently relocated; the
//!   client should refresh its slot map.
//! - `ASK <slot> <ip>:<port>`: the slot is mid-migration; the client makes
//!   exactly one call to the given address, prefixed by `ASKING`, without
//!   touching its slot map.

use crate::addr::NodeAddr;
use crate::error::ParseError;

/// A redirect extracted from a server error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Permanent slot reassignment; refresh topology and retry.
    Moved { slot: u16, addr: NodeAddr },
    /// One-shot migration hop; send `ASKING` then the command, once.
    Ask { slot: u16, addr: NodeAddr },
}

/// Parse a server error string into a redirect, if it is one.
///
/// Returns `Ok(None)` for non-redirect errors and `Err` for replies that
/// claim to be redirects but cannot be parsed.
///
/// # Example
///
/// ```
/// use redshard_protocols::{parse_redirect, Redirect};
///
/// let r = parse_redirect("MOVED 3999 127.0.0.1:6381").unwrap();
/// assert!(matches!(r, Some(Redirect::Moved { slot: 3999, .. })));
/// ```
pub fn parse_redirect(msg: &str) -> Result<Option<Redirect>, ParseError> {
    if let Some(rest) = msg.strip_prefix("MOVED ") {
        let (slot, addr) = parse_slot_addr(rest, msg)?;
        return Ok(Some(Redirect::Moved { slot, addr }));
    }
    if let Some(rest) = msg.strip_prefix("ASK ") {
        let (slot, addr) = parse_slot_addr(rest, msg)?;
        return Ok(Some(Redirect::Ask { slot, addr }));
    }
    Ok(None)
}

/// Whether a server error reports cluster-wide unavailability.
pub fn is_cluster_down(msg: &str) -> bool {
    msg.starts_with("CLUSTERDOWN")
}

fn parse_slot_addr(rest: &str, full: &str) -> Result<(u16, NodeAddr), ParseError> {
    let mut parts = rest.split_whitespace();
    let slot = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| ParseError::Redirect(full.to_string()))?;
    let addr: NodeAddr = parts
        .next()
        .ok_or_else(|| ParseError::Redirect(full.to_string()))?
        .parse()?;
    Ok((slot, addr))
}
