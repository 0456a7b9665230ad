//! `CLUSTER NODES` text parsing.
//!
//! Each line describes one node as whitespace-separated fields:
//!
//! ```text
//! <id> <ip:port@cport> <flags> <master-id> <ping> <pong> <epoch> <state> <slots...>
//! ```
//!
//! The flags field is a comma-separated token list (`myself,master`,
//! `slave`, `master,fail?`, ...). Only the address and the `master` token
//! matter for routing; the rest is carried for diagnostics.

use crate::addr::NodeAddr;
use crate::error::ParseError;

/// One parsed line of `CLUSTER NODES` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// 40-character node id.
    pub id: String,
    /// Client-facing address (the `@cport` suffix is stripped).
    pub addr: NodeAddr,
    /// Raw flags tokens.
    pub flags: Vec<String>,
}

impl NodeRecord {
    /// Whether the flags list carries the `master` token.
    pub fn is_master(&self) -> bool {
        self.flags.iter().any(|f| f == "master")
    }
}

/// Parse the full `CLUSTER NODES` text. Blank lines are skipped; any
/// malformed line fails the parse, since a truncated reply must not
/// silently shrink the master list.
pub fn parse_cluster_nodes(text: &str) -> Result<Vec<NodeRecord>, ParseError> {
    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(parse_line(line)?);
    }
    Ok(records)
}

fn parse_line(line: &str) -> Result<NodeRecord, ParseError> {
    let mut fields = line.split_whitespace();
    let id = fields.next().ok_or_else(|| ParseError::Nodes(line.to_string()))?;
    let addr_field = fields.next().ok_or_else(|| ParseError::Nodes(line.to_string()))?;
    let flags_field = fields.next().ok_or_else(|| ParseError::Nodes(line.to_string()))?;

    // `ip:port@cport`; the cluster-bus port after `@` is not client-facing.
    let client_part = addr_field.split('@').next().unwrap_or(addr_field);
    let addr: NodeAddr =
        client_part.parse().map_err(|_| ParseError::Nodes(line.to_string()))?;

    let flags = flags_field.split(',').map(str::to_string).collect();

    Ok(NodeRecord { id: id.to_string(), addr, flags })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
07c37dfeb235213a872192d90877d0cd55635b91 127.0.0.1:30004@31004 slave e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 0 1426238317239 4 connected
67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 127.0.0.1:30002@31002 master - 0 1426238316232 2 connected 5461-10922
e7d1eecce10fd6bb5eb35b9f99a514335d9ba9ca 127.0.0.1:30001@31001 myself,master - 0 0 1 connected 0-5460
6ec23923021cf3ffec47632106199cb7f496ce01 127.0.0.1:30005@31005 slave 67ed2db8d677e59ec4a4cefb06858cf2a1a89fa1 0 1426238316232 5 connected
824fe116063bc5fcf9f4ffd895bc17aee7731ac3 127.0.0.1:30003@31003 master - 0 1426238318243 3 connected 10923-16383
";

    #[test]
    fn parses_masters_and_replicas() {
        let records = parse_cluster_nodes(SAMPLE).unwrap();
        assert_eq!(records.len(), 5);

        let masters: Vec<_> = records.iter().filter(|r| r.is_master()).collect();
        assert_eq!(masters.len(), 3);
        assert!(masters.iter().any(|m| m.addr == NodeAddr::new("127.0.0.1", 30001)));
        assert!(masters.iter().any(|m| m.addr == NodeAddr::new("127.0.0.1", 30002)));
        assert!(masters.iter().any(|m| m.addr == NodeAddr::new("127.0.0.1", 30003)));
    }

    #[test]
    fn myself_master_counts_as_master() {
        let records = parse_cluster_nodes(SAMPLE).unwrap();
        let me = records.iter().find(|r| r.flags.iter().any(|f| f == "myself")).unwrap();
        assert!(me.is_master());
    }

    #[test]
    fn strips_cluster_bus_port() {
        let records = parse_cluster_nodes(SAMPLE).unwrap();
        assert!(records.iter().all(|r| r.addr.port < 31000));
    }

    #[test]
    fn addr_without_bus_suffix_still_parses() {
        // pre-4.0 servers emit plain ip:port
        let line = "abc123 10.1.2.3:6379 master - 0 0 1 connected 0-16383\n";
        let records = parse_cluster_nodes(line).unwrap();
        assert_eq!(records[0].addr, NodeAddr::new("10.1.2.3", 6379));
    }

    #[test]
    fn blank_lines_skipped() {
        let text = "\n\nabc 127.0.0.1:7000@17000 master - 0 0 1 connected\n\n";
        assert_eq!(parse_cluster_nodes(text).unwrap().len(), 1);
    }

    #[test]
    fn malformed_line_fails_parse() {
        assert!(parse_cluster_nodes("justanid\n").is_err());
        assert!(parse_cluster_nodes("id noport master\n").is_err());
    }

    #[test]
    fn failed_master_still_listed() {
        // flag scan is a token match, `fail` does not hide `master`
        let line = "abc 127.0.0.1:7000@17000 master,fail - 0 0 1 disconnected\n";
        let records = parse_cluster_nodes(line).unwrap();
        assert!(records[0].is_master());
    }
}
