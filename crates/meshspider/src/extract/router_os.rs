//! Router_OS (0xffolsr) route and OLSR detail pages.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use scraper::{ElementRef, Html};

use super::{join_url, ExtractRequest, Extraction, Extractor};
use crate::addr::is_routable_v4;
use crate::classify::detect::ROUTER_OS_PAGE;
use crate::fetch::Fetch;
use crate::html::{child_elements, element_string, next_text, parse_blocking, select_all};
use crate::types::{Inet4, Interface, SpiderError, SpiderResult};

const VERSION_PREFIX: &str = "0xffolsr";

pub struct RouterOsExtractor;

#[async_trait]
impl Extractor for RouterOsExtractor {
    async fn extract(
        &self,
        fetch: &dyn Fetch,
        request: &ExtractRequest,
    ) -> SpiderResult<Extraction> {
        if !request.wants.any() {
            return Ok(Extraction::default());
        }
        let page = request.page(ROUTER_OS_PAGE);
        let base = join_url(&request.site, &page);
        let post_routes = if page.ends_with("cgi") { 2 } else { 1 };

        let routes = fetch.get(&format!("{base}?post_routes={post_routes}")).await?;
        let routes = parse_blocking(routes.body, parse_routes).await?;
        let details = fetch.get(&format!("{base}?post_olsr=1")).await?;
        let details = parse_blocking(details.body, parse_details).await?;

        let version = routes.version.clone().ok_or_else(|| {
            SpiderError::Parse("no version, probably login page of router-os".into())
        })?;
        let mut extraction = assemble(&routes, &details);
        extraction.version = Some(version);
        extraction.addresses.insert(request.node.ip());
        Ok(extraction)
    }
}

/// Insertion-ordered string map; a repeated key keeps its first position.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ordered<V>(Vec<(String, V)>);

impl<V> Ordered<V> {
    fn insert(&mut self, key: String, value: V) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Address to device mapping from the routes page.
#[derive(Debug, Default)]
pub struct Routes {
    pub ip_dev: Ordered<String>,
    pub version: Option<String>,
}

fn anchors(pre: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    child_elements(pre).filter(|e| e.value().name() == "a")
}

fn anchor_text(a: ElementRef<'_>) -> String {
    element_string(a).unwrap_or_default().trim().to_string()
}

/// Parse `ip route` style output: a network anchor followed by
/// `dev <name> ... scope link src`, then the source address anchor.
pub fn parse_routes(body: &str) -> SpiderResult<Routes> {
    let doc = Html::parse_document(body);
    let mut routes = Routes::default();

    for pre in select_all(&doc, "pre") {
        let mut device: Option<Option<String>> = None;
        for a in anchors(pre) {
            match device.take() {
                None => {
                    let Some(tail) = next_text(a).filter(|t| t.contains("scope link")) else {
                        continue;
                    };
                    let mut words = tail.split_whitespace();
                    let dev = words
                        .by_ref()
                        .find(|w| *w == "dev")
                        .and_then(|_| words.next())
                        .map(str::to_string);
                    device = Some(dev);
                }
                Some(dev) => {
                    if let Some(dev) = dev {
                        routes.ip_dev.insert(anchor_text(a), dev);
                    }
                }
            }
        }
    }

    routes.version = select_all(&doc, "small")
        .into_iter()
        .filter_map(element_string)
        .map(|s| s.trim().to_string())
        .find(|s| s.starts_with(VERSION_PREFIX));
    Ok(routes)
}

/// Link metrics and address to device mapping from the OLSR details page.
#[derive(Debug, Default)]
pub struct Details {
    pub ip_dev: Ordered<String>,
    /// LQ, NLQ and cost per local address.
    pub metric: Ordered<Vec<f64>>,
}

impl Details {
    /// Wireless unless all three link metrics are exactly 1.0.
    pub fn is_wlan(&self, ip: &str) -> bool {
        match self.metric.get(ip) {
            Some(m) => m.iter().filter(|x| **x == 1.0).count() != 3,
            None => true,
        }
    }
}

enum Section {
    LinkLocal,
    LinkRemote { local: String },
    Skipping,
    RouteDest,
    RouteGateway { local: Option<String> },
}

pub fn parse_details(body: &str) -> SpiderResult<Details> {
    let doc = Html::parse_document(body);
    let mut details = Details::default();

    for pre in select_all(&doc, "pre") {
        let first = pre
            .children()
            .next()
            .and_then(|n| n.value().as_text().map(|t| t.text.to_string()))
            .unwrap_or_default();
        if !first.contains("Table: Links") {
            return Err(SpiderError::Parse(
                "OLSR details page does not start with the links table".into(),
            ));
        }

        // remote address -> local address of the link
        let mut gateways: Ordered<String> = Ordered::default();
        let mut state = Section::LinkLocal;
        for a in anchors(pre) {
            let tail = next_text(a).unwrap_or_default();
            state = match state {
                Section::LinkLocal => Section::LinkRemote {
                    local: anchor_text(a),
                },
                Section::LinkRemote { local } => {
                    let metrics = tail
                        .split_whitespace()
                        .skip(1)
                        .take(3)
                        .map(|x| x.parse().unwrap_or(f64::NAN))
                        .collect();
                    details.metric.insert(local.clone(), metrics);
                    gateways.insert(anchor_text(a), local);
                    if tail.contains("Table: Routes") {
                        Section::RouteDest
                    } else if tail.contains("Table:") {
                        Section::Skipping
                    } else {
                        Section::LinkLocal
                    }
                }
                Section::Skipping if tail.contains("Table: Routes") => Section::RouteDest,
                Section::Skipping => Section::Skipping,
                Section::RouteDest => Section::RouteGateway {
                    local: gateways.get(&anchor_text(a)).cloned(),
                },
                Section::RouteGateway { local } => {
                    if let (Some(local), Some(dev)) = (local, tail.split_whitespace().last()) {
                        details.ip_dev.insert(local, dev.to_string());
                    }
                    Section::RouteDest
                }
            };
        }
    }
    Ok(details)
}

/// Combine both pages into interfaces; unroutable addresses are dropped.
fn assemble(routes: &Routes, details: &Details) -> Extraction {
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut extraction = Extraction::default();
    let mut base = 0;

    let put = |interfaces: &mut Vec<Interface>, iface: Interface| {
        match interfaces.iter_mut().find(|i| i.name == iface.name) {
            Some(slot) => *slot = iface,
            None => interfaces.push(iface),
        }
    };

    for (count, (ip, dev)) in routes.ip_dev.iter().enumerate() {
        let Some(addr) = ip.parse::<Ipv4Addr>().ok().filter(|a| is_routable_v4(*a)) else {
            continue;
        };
        extraction.addresses.insert(IpAddr::V4(addr));
        let mut iface = Interface::new(count as u32, dev, None);
        iface.inet4.push(Inet4::new(addr));
        put(&mut interfaces, iface);
        base = count;
    }
    base += 1;

    for (count, (ip, dev)) in details.ip_dev.iter().enumerate() {
        let Some(addr) = ip.parse::<Ipv4Addr>().ok().filter(|a| is_routable_v4(*a)) else {
            continue;
        };
        let is_wlan = details.is_wlan(ip);
        let index = (base + count) as u32;
        if extraction.addresses.contains(&IpAddr::V4(addr)) {
            match interfaces.iter_mut().find(|i| i.name == *dev) {
                Some(iface) => {
                    if !iface.inet4.iter().any(|i| i.addr == addr) {
                        if !iface.inet4.is_empty() {
                            iface.inet4.remove(0);
                        }
                        iface.inet4.push(Inet4::new(addr));
                    }
                    iface.is_wlan = is_wlan;
                }
                None => {
                    let mut iface = Interface::new(index, dev, None);
                    iface.inet4.push(Inet4::new(addr));
                    iface.is_wlan = is_wlan;
                    interfaces.push(iface);
                }
            }
            continue;
        }
        extraction.addresses.insert(IpAddr::V4(addr));
        let mut iface = Interface::new(index, dev, None);
        iface.is_wlan = is_wlan;
        iface.inet4.push(Inet4::new(addr));
        put(&mut interfaces, iface);
    }

    extraction.interfaces = interfaces;
    extraction
}
