//! Classic Freifunk firmware status page.
//!
//! The status page dumps `ifconfig` and `iwconfig` output inside `<pre>`
//! blocks; both are parsed as plain text.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::Html;

use super::{ExtractRequest, Extraction, Extractor};
use crate::classify::detect::FREIFUNK_STATUS_PAGE;
use crate::fetch::Fetch;
use crate::html::{parse_blocking, select_all};
use crate::types::{Inet4, Inet6, Interface, SpiderError, SpiderResult, WlanInfo};

pub struct FreifunkExtractor;

#[async_trait]
impl Extractor for FreifunkExtractor {
    async fn extract(
        &self,
        fetch: &dyn Fetch,
        request: &ExtractRequest,
    ) -> SpiderResult<Extraction> {
        if !request.wants.any() {
            return Ok(Extraction::default());
        }
        let page = fetch.get(&request.page_url(FREIFUNK_STATUS_PAGE)).await?;
        parse_blocking(page.body, parse_status).await
    }
}

/// Parse the status page. A page without `ifconfig` output is a login or
/// error page and fails.
pub fn parse_status(body: &str) -> SpiderResult<Extraction> {
    let doc = Html::parse_document(body);
    let mut ifconfig = Vec::new();
    let mut iwconfig = HashMap::new();
    let mut seen_ifconfig = false;
    for pre in select_all(&doc, "pre") {
        let text: String = pre.text().collect();
        if text.contains("Link encap") {
            seen_ifconfig = true;
            ifconfig.extend(parse_ifconfig(&text));
        } else if text.contains("ESSID") || text.contains("IEEE 802.11") {
            iwconfig.extend(parse_iwconfig(&text));
        }
    }
    if !seen_ifconfig {
        return Err(SpiderError::Parse(
            "no ifconfig output on status page".into(),
        ));
    }

    let page_text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    let version = firmware_re()
        .captures(&page_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let mut extraction = Extraction {
        version,
        ..Default::default()
    };
    for (index, mut iface) in ifconfig.into_iter().enumerate() {
        iface.index = index as u32;
        if let Some(info) = iwconfig.remove(&iface.name) {
            iface.is_wlan = true;
            iface.wlan = Some(info);
        }
        extraction
            .addresses
            .extend(iface.inet4.iter().map(|i| IpAddr::V4(i.addr)));
        extraction
            .addresses
            .extend(iface.inet6.iter().map(|i| IpAddr::V6(i.addr)));
        extraction.interfaces.push(iface);
    }
    Ok(extraction)
}

fn firmware_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Firmware\s*(?:[Vv]ersion)?\s*:?\s*v?([0-9][\w.\-]*)").expect("valid regex")
    })
}

/// Split command output into per-interface blocks: a block starts with a
/// line that is not indented.
fn blocks(text: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            out.push((name.trim_end_matches(':').to_string(), rest.to_string()));
        } else if let Some((_, body)) = out.last_mut() {
            body.push('\n');
            body.push_str(line.trim());
        }
    }
    out
}

fn field<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let start = text.find(key)? + key.len();
    let rest = text[start..].trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end]).filter(|v| !v.is_empty())
}

/// Interfaces that are up, loopback excluded.
fn parse_ifconfig(text: &str) -> Vec<Interface> {
    let mut out = Vec::new();
    for (name, body) in blocks(text) {
        if body.contains("Local Loopback") {
            continue;
        }
        let up = body
            .lines()
            .any(|l| l.split_whitespace().next() == Some("UP"));
        if !up {
            continue;
        }
        let mtu = field(&body, "MTU:").and_then(|m| m.parse().ok());
        let mut iface = Interface::new(0, name, mtu);
        iface.link = field(&body, "HWaddr").map(str::to_string);
        for line in body.lines() {
            if let Some(addr) = field(line, "inet addr:").and_then(|a| a.parse::<Ipv4Addr>().ok())
            {
                iface.inet4.push(Inet4 {
                    addr,
                    netmask: field(line, "Mask:").and_then(|m| m.parse().ok()),
                    broadcast: field(line, "Bcast:").and_then(|b| b.parse().ok()),
                });
            } else if let Some(cidr) = field(line, "inet6 addr:") {
                let (addr, prefix) = cidr.split_once('/').unwrap_or((cidr, ""));
                if let Ok(addr) = addr.parse::<Ipv6Addr>() {
                    iface.inet6.push(Inet6 {
                        addr,
                        prefix: prefix.parse().ok(),
                    });
                }
            }
        }
        out.push(iface);
    }
    out
}

fn parse_iwconfig(text: &str) -> HashMap<String, WlanInfo> {
    let mut out = HashMap::new();
    for (name, body) in blocks(text) {
        if body.contains("no wireless extensions") {
            continue;
        }
        let ssid = body
            .split_once("ESSID:\"")
            .and_then(|(_, rest)| rest.split('"').next())
            .map(str::to_string);
        let bssid = field(&body, "Cell:")
            .or_else(|| field(&body, "Access Point:"))
            .map(str::to_string);
        let channel = field(&body, "Channel:")
            .or_else(|| field(&body, "Channel="))
            .or_else(|| field(&body, "Frequency:"))
            .map(str::to_string);
        let level = |key: &str| {
            field(&body, key)
                .and_then(|v| v.split('/').next())
                .and_then(|v| v.parse().ok())
        };
        let info = WlanInfo {
            ssid,
            mode: field(&body, "Mode:").map(str::to_string),
            channel,
            bssid,
            signal: level("Signal level="),
            noise: level("Noise level="),
        };
        out.insert(name, info);
    }
    out
}
