//! olsrd httpinfo plugin pages.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use scraper::node::Node;
use scraper::Html;

use super::{ExtractRequest, Extraction, Extractor};
use crate::fetch::Fetch;
use crate::html::{
    child_elements, element_string, first_child_element, parse_blocking, select_all,
};
use crate::types::{Inet4, Interface, SpiderError, SpiderResult};

pub struct OlsrExtractor;

#[async_trait]
impl Extractor for OlsrExtractor {
    async fn extract(
        &self,
        fetch: &dyn Fetch,
        request: &ExtractRequest,
    ) -> SpiderResult<Extraction> {
        if !request.wants.any() {
            return Ok(Extraction::default());
        }
        let page = fetch.get(&request.page_url("")).await?;
        parse_blocking(page.body, parse_httpinfo).await
    }
}

/// Parse the httpinfo front page.
pub fn parse_httpinfo(body: &str) -> SpiderResult<Extraction> {
    let doc = Html::parse_document(body);
    let main = select_all(&doc, "div")
        .into_iter()
        .find(|d| d.value().id() == Some("maintable"))
        .ok_or_else(|| SpiderError::Parse("unable to find main table".into()))?;

    let version = match main.children().next().map(|n| n.value()) {
        Some(Node::Text(t)) => parse_version(&t.text)?,
        _ => return Err(SpiderError::Parse("no version text in main table".into())),
    };

    let heading = main
        .descendants()
        .filter_map(scraper::ElementRef::wrap)
        .find(|e| e.value().name() == "h2" && element_string(*e).as_deref() == Some("Interfaces"))
        .ok_or_else(|| SpiderError::Parse("no Interfaces heading".into()))?;
    let table = heading
        .next_siblings()
        .filter_map(scraper::ElementRef::wrap)
        .find(|e| e.value().name() == "table")
        .ok_or_else(|| SpiderError::Parse("no interface table".into()))?;

    // Rows are grouped under a `th` naming the interface; some firmware omits
    // closing tags, so collect every `tr` below the table.
    let mut blocks: Vec<(String, HashMap<String, String>)> = Vec::new();
    for tr in table
        .descendants()
        .filter_map(scraper::ElementRef::wrap)
        .filter(|e| e.value().name() == "tr")
    {
        let Some(first) = first_child_element(tr) else {
            continue;
        };
        if first.value().name() == "th" {
            let name = element_string(first).unwrap_or_default().trim().to_string();
            blocks.push((name, HashMap::new()));
            continue;
        }
        let Some((_, fields)) = blocks.last_mut() else {
            continue;
        };
        for td in child_elements(tr) {
            let text = td.text().collect::<Vec<_>>().join(" ");
            if let Some((k, v)) = text.split_once(':') {
                fields.insert(k.trim().to_lowercase(), v.trim().to_string());
            }
        }
    }

    let mut extraction = Extraction {
        version: Some(version),
        ..Default::default()
    };
    let up = blocks
        .into_iter()
        .filter(|(name, f)| !name.is_empty() && f.get("status").map(String::as_str) == Some("UP"));
    for (index, (name, fields)) in up.enumerate() {
        let mtu = fields.get("mtu").and_then(|m| m.parse().ok());
        let mut iface = Interface::new(index as u32, name, mtu);
        iface.is_wlan = fields
            .get("wlan")
            .is_some_and(|w| w.eq_ignore_ascii_case("yes"));
        if let Some(addr) = fields.get("ip").and_then(|ip| ip.parse::<Ipv4Addr>().ok()) {
            iface.inet4.push(Inet4 {
                addr,
                netmask: fields.get("mask").and_then(|m| m.parse().ok()),
                broadcast: fields.get("bcast").and_then(|b| b.parse().ok()),
            });
            extraction.addresses.insert(IpAddr::V4(addr));
        }
        extraction.interfaces.push(iface);
    }
    Ok(extraction)
}

fn parse_version(text: &str) -> SpiderResult<String> {
    let text = text.trim();
    if !text.starts_with("Version:") {
        return Err(SpiderError::Parse(format!("unexpected version text '{text}'")));
    }
    text.split(" - ")
        .nth(1)
        .map(|v| v.trim().to_string())
        .ok_or_else(|| SpiderError::Parse(format!("unexpected version text '{text}'")))
}
