//! LuCI freifunk pages, shared by the Backfire and OpenWRT flavours.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::{join_url, ExtractRequest, Extraction, Extractor};
use crate::addr::is_routable_v4;
use crate::fetch::Fetch;
use crate::html::{
    child_elements, element_string, element_text, first_child_element, has_class, next_text,
    parse_blocking, select_all, select_within, table_rows,
};
use crate::types::{Inet4, Inet6, Interface, SpiderError, SpiderResult, WlanInfo};

/// OLSR interface table.
pub const INTERFACES_PAGE: &str = "cgi-bin/luci/freifunk/olsr/interfaces";
/// Status page carrying the wireless overview.
pub const WIRELESS_PAGE: &str = "cgi-bin/luci/freifunk/status";

const HEADER_CELLS: [&str; 2] = ["Interface", "Schnittstelle"];
const WIRELESS_TITLES: [&str; 3] = ["Wireless Overview", "Drahtlosübersicht", "WLAN Übersicht"];
const POWERED_BY: &str = "Powered by LuCI";
const LUCI_HOME: &str = "http://luci.subsignal.org/";

pub struct LuciExtractor;

#[async_trait]
impl Extractor for LuciExtractor {
    async fn extract(
        &self,
        fetch: &dyn Fetch,
        request: &ExtractRequest,
    ) -> SpiderResult<Extraction> {
        if !request.wants.any() {
            return Ok(Extraction::default());
        }
        let page = fetch.get(&request.page_url(INTERFACES_PAGE)).await?;
        let mut extraction = parse_blocking(page.body, parse_interfaces).await?;
        if extraction.interfaces.is_empty() {
            return Ok(extraction);
        }

        let status = fetch.get(&join_url(&request.site, WIRELESS_PAGE)).await?;
        let wlans = parse_blocking(status.body, parse_wireless).await?;
        for (name, info) in wlans {
            if let Some(iface) = extraction.interfaces.iter_mut().find(|i| i.name == name) {
                iface.wlan = Some(info);
            } else {
                debug!("wireless entry for unknown interface {name}");
            }
        }
        Ok(extraction)
    }
}

/// Parse the OLSR interfaces table and the version footer.
pub fn parse_interfaces(body: &str) -> SpiderResult<Extraction> {
    let doc = Html::parse_document(body);
    let mut version = VersionInfo::default();
    // (interface, kept) in first-seen order
    let mut seen: Vec<(Interface, bool)> = Vec::new();
    let mut addresses = std::collections::BTreeSet::new();

    for div in select_all(&doc, "div") {
        version.inspect(div);
        if div.value().id() != Some("maincontent") || seen.iter().any(|(_, kept)| *kept) {
            continue;
        }
        let Some(table) = select_within(div, "table").into_iter().next() else {
            continue;
        };
        for (n, tr) in table_rows(table).into_iter().enumerate() {
            let Some(first) = first_child_element(tr) else {
                continue;
            };
            if first.value().name() == "th" {
                let head = element_string(first).unwrap_or_default();
                if !HEADER_CELLS.contains(&head.trim()) {
                    return Err(SpiderError::Parse(format!(
                        "unexpected interface table header '{head}'"
                    )));
                }
                continue;
            }
            let cells: Vec<Option<String>> = child_elements(tr)
                .map(|td| element_string(td).map(|s| s.trim().to_string()))
                .collect();
            let [name, status, mtu, wlan, ip, mask, bcast]: [Option<String>; 7] =
                cells.try_into().map_err(|c: Vec<_>| {
                    SpiderError::Parse(format!("interface row with {} cells", c.len()))
                })?;
            let name = name.unwrap_or_default();

            let idx = match seen.iter().position(|(i, _)| i.name == name) {
                Some(idx) => idx,
                None => {
                    let mut iface = Interface::new(
                        n as u32,
                        name.clone(),
                        mtu.and_then(|m| m.parse().ok()),
                    );
                    iface.is_wlan = wlan.as_deref().and_then(yes_no).unwrap_or(false);
                    seen.push((iface, false));
                    seen.len() - 1
                }
            };
            if status.as_deref() == Some("DOWN") {
                continue;
            }
            let Some(ip) = ip else {
                continue;
            };
            let (iface, kept) = &mut seen[idx];
            if ip.contains(':') {
                if let Ok(addr) = ip.parse::<Ipv6Addr>() {
                    let prefix = mask
                        .as_deref()
                        .and_then(|m| m.trim_start_matches('/').parse().ok());
                    iface.inet6.push(Inet6 { addr, prefix });
                }
            } else if let Ok(addr) = ip.parse::<Ipv4Addr>() {
                iface.inet4.push(Inet4 {
                    addr,
                    netmask: mask.as_deref().and_then(|m| m.parse().ok()),
                    broadcast: bcast.as_deref().and_then(|b| b.parse().ok()),
                });
                if is_routable_v4(addr) {
                    *kept = true;
                    addresses.insert(IpAddr::V4(addr));
                }
            }
        }
    }

    version.fallback(&doc);
    Ok(Extraction {
        version: version.formatted(),
        interfaces: seen
            .into_iter()
            .filter_map(|(iface, kept)| kept.then_some(iface))
            .collect(),
        addresses,
    })
}

fn yes_no(s: &str) -> Option<bool> {
    match s.trim() {
        "yes" | "ja" => Some(true),
        "no" | "nein" => Some(false),
        _ => None,
    }
}

/// Version pieces collected while walking the page.
#[derive(Debug, Default)]
struct VersionInfo {
    luci: Option<String>,
    firmware: Option<String>,
}

impl VersionInfo {
    fn inspect(&mut self, div: ElementRef<'_>) {
        if has_class(div, "footer") {
            for p in select_within(div, "p") {
                if !has_class(p, "luci") {
                    continue;
                }
                if let Some(a) = first_child_element(p).filter(|a| a.value().name() == "a") {
                    let text = element_text(a);
                    if text.starts_with(POWERED_BY) {
                        self.luci = Some(text);
                    }
                }
            }
        }
        if has_class(div, "header_right") {
            self.firmware = Some(element_text(div));
        }
        if has_class(div, "hostinfo") {
            let text = element_text(div);
            let fw = text.split('|').next().unwrap_or("").trim().to_string();
            self.firmware = Some(fw);
        }
        if div.value().id() == Some("header") && self.firmware.is_none() {
            if let Some(p) = select_within(div, "p").into_iter().next() {
                let text = element_text(p);
                let after = text.split_once(':').map_or(text.as_str(), |(_, v)| v);
                let fw = after.split('|').next().unwrap_or("").trim();
                self.firmware = Some(fw.to_string());
            }
        }
    }

    /// Older pages put the LuCI line in a bare `p.luci`; 2014 builds link it
    /// to the LuCI homepage with the firmware after the link.
    fn fallback(&mut self, doc: &Html) {
        if self.luci.is_none() {
            self.luci = select_all(doc, "p")
                .into_iter()
                .rev()
                .find(|p| has_class(*p, "luci"))
                .map(element_text);
        }
        if self.luci.is_none() {
            let link = select_all(doc, "a")
                .into_iter()
                .find(|a| a.value().attr("href") == Some(LUCI_HOME));
            if let Some(a) = link {
                let text = element_text(a);
                if text.starts_with(POWERED_BY) {
                    self.luci = Some(text);
                    self.firmware = next_text(a).map(|t| t.trim().to_string());
                }
            }
        }
    }

    fn formatted(&self) -> Option<String> {
        let mut luci = self.luci.as_deref()?;
        if luci.starts_with(POWERED_BY) {
            luci = luci
                .split_once('(')
                .map_or(luci, |(_, rest)| rest.split(')').next().unwrap_or(rest));
        }
        let firmware = self.firmware.as_deref().filter(|f| !f.is_empty())?;
        Some(format!("{firmware} / Luci {luci}"))
    }
}

fn signal_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r".*ignal.*(?:(-[0-9]+)|(?:N/A))\s+d.*oise.*(-[0-9]+)\s+d")
            .expect("valid regex")
    })
}

/// Parse the wireless overview into `(interface name, info)` pairs.
pub fn parse_wireless(body: &str) -> SpiderResult<Vec<(String, WlanInfo)>> {
    let doc = Html::parse_document(body);
    let overview = select_all(&doc, "div").into_iter().find(|div| {
        has_class(*div, "cbi-map")
            && first_child_element(*div).is_some_and(|h| {
                h.value().name() == "h2"
                    && element_string(h).is_some_and(|t| WIRELESS_TITLES.contains(&t.trim()))
            })
    });
    let Some(overview) = overview else {
        return Ok(Vec::new());
    };

    let mut wlans = Vec::new();
    for tr in select_within(overview, "tr") {
        if !has_class(tr, "cbi-section-table-row") {
            continue;
        }
        let mut fields: HashMap<String, Option<String>> = HashMap::new();
        let mut info = WlanInfo::default();
        for td in child_elements(tr) {
            let key = match td.value().id() {
                Some(id) => id.rsplit('-').next().unwrap_or(id).to_string(),
                None => "name".to_string(),
            };
            let value = element_string(td).map(|s| s.trim().to_string());
            if key == "signal" && value.is_none() {
                let title = first_child_element(td)
                    .filter(|img| img.value().name() == "img")
                    .and_then(|img| img.value().attr("title"));
                if let Some(caps) = title.and_then(|t| signal_title_re().captures(t)) {
                    info.signal = caps.get(1).and_then(|m| m.as_str().parse().ok());
                    info.noise = caps.get(2).and_then(|m| m.as_str().parse().ok());
                    continue;
                }
            }
            fields.insert(key, value);
        }

        let mut take = |k: &str| fields.remove(k).flatten().filter(|v| !v.is_empty());
        let Some(name) = take("name") else {
            continue;
        };
        info.ssid = take("ssid");
        info.mode = take("mode");
        info.channel = take("channel");
        info.bssid = take("bssid");
        if info.signal.is_none() {
            info.signal = take("signal").and_then(|s| leading_int(&s));
        }
        if info.noise.is_none() {
            info.noise = take("noise").and_then(|s| leading_int(&s));
        }
        wlans.push((name, info));
    }
    Ok(wlans)
}

fn leading_int(s: &str) -> Option<i32> {
    s.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERFACES: &str = r#"<html><body>
<div id="header"><h1>node</h1><p>Firmware: Backfire 0.10.1 | Kernel 2.6.32</p></div>
<div id="maincontent">
<table>
<tr><th>Schnittstelle</th><th>Status</th><th>MTU</th><th>WLAN</th><th>IP</th><th>Netzmaske</th><th>Broadcast</th></tr>
<tr><td>wl0</td><td>UP</td><td>1500</td><td>ja</td><td>193.238.158.20</td><td>255.255.255.255</td><td>193.238.158.20</td></tr>
<tr><td>lan</td><td>UP</td><td>1500</td><td>nein</td><td>192.168.1.1</td><td>255.255.255.0</td><td>192.168.1.255</td></tr>
<tr><td>wan</td><td>DOWN</td><td>1500</td><td>nein</td><td>78.41.115.1</td><td>255.255.255.0</td><td>78.41.115.255</td></tr>
<tr><td>wl0</td><td>UP</td><td>1500</td><td>ja</td><td>2a02:60:1::20</td><td>64</td><td></td></tr>
</table>
</div>
<div class="footer"><p class="luci"><a href="http://luci.subsignal.org/">Powered by LuCI (0.10.0 Release)</a></p></div>
</body></html>"#;

    const STATUS: &str = r#"<html><body>
<div class="cbi-map"><h2>Drahtlosübersicht</h2>
<table>
<tr class="cbi-section-table-titles"><th>Name</th></tr>
<tr class="cbi-section-table-row">
  <td>wl0</td>
  <td id="cbi-wifi-0-ssid">www.funkfeuer.at</td>
  <td id="cbi-wifi-0-mode">Ad-Hoc</td>
  <td id="cbi-wifi-0-channel">10</td>
  <td id="cbi-wifi-0-bssid">02:CA:FF:EE:BA:BE</td>
  <td id="cbi-wifi-0-signal"><img src="s.png" title="Signal: -71 dBm / Noise: -95 dBm"></td>
</tr>
</table></div>
</body></html>"#;

    #[test]
    fn test_interfaces_table() {
        let got = parse_interfaces(INTERFACES).unwrap();
        assert_eq!(got.interfaces.len(), 1);
        let wl0 = &got.interfaces[0];
        assert_eq!(wl0.name, "wl0");
        assert!(wl0.is_wlan);
        assert_eq!(wl0.index, 1);
        assert_eq!(wl0.inet4[0].addr, Ipv4Addr::new(193, 238, 158, 20));
        assert_eq!(wl0.inet6.len(), 1);
        assert_eq!(wl0.inet6[0].prefix, Some(64));
        assert_eq!(got.addresses.len(), 1);
        assert_eq!(
            got.version.as_deref(),
            Some("Backfire 0.10.1 / Luci 0.10.0 Release")
        );
    }

    #[test]
    fn test_unexpected_header_is_parse_error() {
        let html = r#"<div id="maincontent"><table><tr><th>Name</th></tr></table></div>"#;
        assert!(matches!(
            parse_interfaces(html).unwrap_err(),
            SpiderError::Parse(_)
        ));
    }

    #[test]
    fn test_short_row_is_parse_error() {
        let html = r#"<div id="maincontent"><table><tr><td>wl0</td><td>UP</td></tr></table></div>"#;
        assert!(parse_interfaces(html).is_err());
    }

    #[test]
    fn test_version_from_hostinfo() {
        let html = r#"<html><body>
<div class="hostinfo">OpenWrt Attitude Adjustment 12.09 | Load: 0.1</div>
<p class="luci">Powered by LuCI (0.11.1)</p>
</body></html>"#;
        let got = parse_interfaces(html).unwrap();
        assert_eq!(
            got.version.as_deref(),
            Some("OpenWrt Attitude Adjustment 12.09 / Luci 0.11.1")
        );
        assert!(got.interfaces.is_empty());
    }

    #[test]
    fn test_no_version_without_luci_footer() {
        let html = r#"<div class="header_right">Backfire</div>"#;
        assert_eq!(parse_interfaces(html).unwrap().version, None);
    }

    #[test]
    fn test_wireless_overview() {
        let got = parse_wireless(STATUS).unwrap();
        assert_eq!(got.len(), 1);
        let (name, info) = &got[0];
        assert_eq!(name, "wl0");
        assert_eq!(info.ssid.as_deref(), Some("www.funkfeuer.at"));
        assert_eq!(info.mode.as_deref(), Some("Ad-Hoc"));
        assert_eq!(info.channel.as_deref(), Some("10"));
        assert_eq!(info.bssid.as_deref(), Some("02:CA:FF:EE:BA:BE"));
        assert_eq!(info.signal, Some(-71));
        assert_eq!(info.noise, Some(-95));
    }

    #[test]
    fn test_wireless_signal_not_available() {
        let html = r#"<div class="cbi-map"><h2>Wireless Overview</h2><table>
<tr class="cbi-section-table-row"><td>wl0</td>
<td id="cbi-wifi-0-signal"><img title="Signal: N/A dBm / Noise: -92 dBm"></td></tr>
</table></div>"#;
        let got = parse_wireless(html).unwrap();
        assert_eq!(got[0].1.signal, None);
        assert_eq!(got[0].1.noise, Some(-92));
    }

    #[test]
    fn test_other_maps_are_ignored() {
        let html = r#"<div class="cbi-map"><h2>Routes</h2><table>
<tr class="cbi-section-table-row"><td>x</td></tr></table></div>"#;
        assert!(parse_wireless(html).unwrap().is_empty());
    }
}
