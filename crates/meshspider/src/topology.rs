//! Candidate node discovery from OLSR `txtinfo` output.

use std::collections::BTreeSet;
use std::net::IpAddr;

use scraper::Html;
use tracing::{debug, info};

use crate::fetch::Fetch;
use crate::types::{NodeAddress, SpiderError, SpiderResult};

const TOPOLOGY_TABLE: &str = "Table: Topology";

/// Every destination and last-hop address of the topology table.
pub fn parse_txtinfo(text: &str) -> SpiderResult<BTreeSet<NodeAddress>> {
    let mut lines = text.lines().skip_while(|l| !l.trim().starts_with(TOPOLOGY_TABLE));
    if lines.next().is_none() {
        return Err(SpiderError::Parse("no topology table in txtinfo".into()));
    }

    let mut nodes = BTreeSet::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Table:") {
            break;
        }
        let mut fields = line.split_whitespace();
        let (Some(dest), Some(last_hop)) = (fields.next(), fields.next()) else {
            continue;
        };
        // header row
        let (Ok(dest), Ok(last_hop)) = (dest.parse::<IpAddr>(), last_hop.parse::<IpAddr>()) else {
            continue;
        };
        nodes.insert(NodeAddress::new(dest));
        nodes.insert(NodeAddress::new(last_hop));
    }
    Ok(nodes)
}

/// Load candidates from a file or an `http(s)://` URL, keeping at most
/// `limit` nodes (in address order) when given.
pub async fn load_candidates(
    source: &str,
    fetch: &dyn Fetch,
    limit: Option<usize>,
) -> SpiderResult<BTreeSet<NodeAddress>> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        fetch.get(source).await?.body
    } else {
        tokio::fs::read_to_string(source).await?
    };

    let mut nodes = parse_txtinfo(&plain_text(body))?;
    info!("{} candidate nodes from {source}", nodes.len());
    if let Some(limit) = limit.filter(|n| *n > 0) {
        nodes = nodes.into_iter().take(limit).collect();
        debug!("limited to {} nodes", nodes.len());
    }
    Ok(nodes)
}

/// Some frontends serve the table inside an HTML page.
fn plain_text(body: String) -> String {
    if !body.trim_start().starts_with('<') {
        return body;
    }
    Html::parse_document(&body)
        .root_element()
        .text()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXTINFO: &str = "Table: Links
Local IP\tRemote IP\tHyst.\tLQ\tNLQ\tCost
193.238.158.1\t193.238.158.2\t0.00\t1.000\t1.000\t1.000

Table: Topology
Dest. IP\tLast hop IP\tLQ\tNLQ\tCost
193.238.156.1\t193.238.158.2\t1.000\t1.000\t1.000
78.41.115.1\t193.238.158.2\t0.870\t0.900\t1.277
193.238.158.2\t193.238.156.1\t1.000\t1.000\t1.000

Table: HNA
0.0.0.0/0\t193.238.156.1
";

    #[test]
    fn test_topology_nodes_are_deduplicated() {
        let nodes = parse_txtinfo(TXTINFO).unwrap();
        let shown: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
        assert_eq!(shown, vec!["78.41.115.1", "193.238.156.1", "193.238.158.2"]);
    }

    #[test]
    fn test_missing_topology_table() {
        assert!(parse_txtinfo("Table: Links\n").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txtinfo.txt");
        std::fs::write(&path, TXTINFO).unwrap();
        let fetch = crate::fetch::LocalFetcher::new(dir.path());

        let nodes = load_candidates(path.to_str().unwrap(), &fetch, Some(2))
            .await
            .unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_load_from_html_wrapped_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topo.html");
        std::fs::write(&path, format!("<html><body><pre>{TXTINFO}</pre></body></html>")).unwrap();
        let fetch = crate::fetch::LocalFetcher::new(dir.path());

        let nodes = load_candidates(path.to_str().unwrap(), &fetch, None)
            .await
            .unwrap();
        assert_eq!(nodes.len(), 3);
    }
}
