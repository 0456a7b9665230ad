//! `CLUSTER SLOTS` reply decoding.
//!
//! The reply is an array of rows, one per contiguous slot range:
//!
//! ```text
//! 1) 1) (integer) 0           <- start slot
//!    2) (integer) 5460        <- end slot
//!    3) 1) "127.0.0.1"        <- master: host
//!       2) (integer) 7000     <-         port
//!       3) "09a1..."          <-         node id (3.0+, ignored)
//!    4) 1) "127.0.0.1"        <- first replica, same shape
//!       2) (integer) 7003
//! ```

use crate::addr::NodeAddr;
use crate::error::ParseError;
use crate::slot::CLUSTER_SLOTS;
use crate::value::Value;

/// One row of a `CLUSTER SLOTS` reply: a contiguous slot range and the
/// nodes serving it, master first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    pub master: NodeAddr,
    pub replicas: Vec<NodeAddr>,
}

/// Decode a full `CLUSTER SLOTS` reply into slot ranges.
pub fn parse_slots_reply(reply: &Value) -> Result<Vec<SlotRange>, ParseError> {
    let rows = reply
        .as_array()
        .ok_or_else(|| ParseError::Slots(format!("expected array, got {reply:?}")))?;

    let mut ranges = Vec::with_capacity(rows.len());
    for row in rows {
        ranges.push(parse_row(row)?);
    }
    Ok(ranges)
}

fn parse_row(row: &Value) -> Result<SlotRange, ParseError> {
    let fields = row
        .as_array()
        .ok_or_else(|| ParseError::Slots(format!("expected row array, got {row:?}")))?;
    if fields.len() < 3 {
        return Err(ParseError::Slots(format!("row too short: {} fields", fields.len())));
    }

    let start = parse_slot_number(&fields[0])?;
    let end = parse_slot_number(&fields[1])?;
    if start > end {
        return Err(ParseError::Slots(format!("inverted range {start}-{end}")));
    }

    let master = parse_node(&fields[2])?;
    let replicas = fields[3..].iter().map(parse_node).collect::<Result<Vec<_>, _>>()?;

    Ok(SlotRange { start, end, master, replicas })
}

fn parse_slot_number(value: &Value) -> Result<u16, ParseError> {
    let n = value
        .as_int()
        .ok_or_else(|| ParseError::Slots(format!("expected slot number, got {value:?}")))?;
    if !(0..i64::from(CLUSTER_SLOTS)).contains(&n) {
        return Err(ParseError::Slots(format!("slot {n} out of range")));
    }
    Ok(n as u16)
}

/// A node element is `[host, port, id?, meta?]`; only host and port matter.
fn parse_node(value: &Value) -> Result<NodeAddr, ParseError> {
    let fields = value
        .as_array()
        .ok_or_else(|| ParseError::Slots(format!("expected node array, got {value:?}")))?;
    let host = fields
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::Slots("node host missing".to_string()))?;
    let port = fields
        .get(1)
        .and_then(Value::as_int)
        .filter(|p| (0..=i64::from(u16::MAX)).contains(p))
        .ok_or_else(|| ParseError::Slots(format!("node port missing for host {host}")))?;
    Ok(NodeAddr::new(host, port as u16))
}
