//! Run configuration.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;
use std::time::Duration;

use crate::types::{NodeAddress, SpiderError, SpiderResult};

pub const DEFAULT_POOL_SIZE: usize = 20;
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(180);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRIES: u32 = 2;

/// Settings shared read-only by every worker of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiderConfig {
    /// Maximum number of nodes probed at once.
    pub pool_size: usize,
    /// Deadline for classifying and extracting one node.
    pub node_timeout: Duration,
    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
    /// Retries per HTTP request on connection errors and 5xx answers.
    pub retries: u32,
    /// Nodes whose web interface listens on a non-standard port.
    pub port_overrides: HashMap<NodeAddress, u16>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retries: DEFAULT_RETRIES,
            port_overrides: HashMap::new(),
        }
    }
}

impl SpiderConfig {
    pub fn port_for(&self, node: &NodeAddress) -> Option<u16> {
        self.port_overrides.get(node).copied()
    }
}

/// Parse `ADDR:PORT` (`[v6]:PORT` for IPv6).
pub fn parse_node_port(s: &str) -> SpiderResult<(NodeAddress, u16)> {
    let bad = || SpiderError::Usage(format!("expected ADDR:PORT, got '{s}'"));
    let s = s.trim();
    let (host, port) = s.rsplit_once(':').ok_or_else(bad)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = host.parse().map_err(|_| bad())?;
    let port: u16 = port.parse().map_err(|_| bad())?;
    Ok((NodeAddress::new(ip), port))
}

/// Parse a node given as `ADDR` or `ADDR:PORT`.
pub fn parse_node_spec(s: &str) -> SpiderResult<(NodeAddress, Option<u16>)> {
    if let Ok(node) = s.parse::<NodeAddress>() {
        return Ok((node, None));
    }
    parse_node_port(s).map(|(node, port)| (node, Some(port)))
}

/// What a run is going to do, checked before anything touches the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunPlan {
    pub nodes: BTreeSet<NodeAddress>,
    pub merge_sources: Vec<String>,
}

impl RunPlan {
    /// Fails with a usage error when there is nothing to probe and nothing
    /// to merge.
    pub fn new(
        nodes: impl IntoIterator<Item = NodeAddress>,
        merge_sources: Vec<String>,
    ) -> SpiderResult<Self> {
        let nodes: BTreeSet<NodeAddress> = nodes.into_iter().collect();
        if nodes.is_empty() && merge_sources.is_empty() {
            return Err(SpiderError::Usage(
                "no nodes to probe and no dumps to merge".into(),
            ));
        }
        Ok(Self {
            nodes,
            merge_sources,
        })
    }
}
