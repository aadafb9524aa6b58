//! First-pass detectors run against a node's root page.

use scraper::Html;

use crate::html::{element_string, has_class, select_all};

/// Title of the olsrd httpinfo plugin page.
pub const OLSR_TITLE: &str = "olsr.org httpinfo plugin";

/// Default status page of the classic Freifunk firmware.
pub const FREIFUNK_STATUS_PAGE: &str = "cgi-bin-status.html";

/// Default page of Router_OS style firmware.
pub const ROUTER_OS_PAGE: &str = "cgi-bin/index.cgi";

/// Page used when only the login form identified a Router_OS node.
pub const ROUTER_OS_LOGIN_PAGE: &str = "cgi-bin/index.sh";

const LUCI_REFRESH_SUFFIX: &str = "cgi-bin/luci";
const FREIFUNK_REFRESH_SUFFIX: &str = "URL=/cgi-bin-index.html";

const STATUS_LINK: &str = "Status";
const STATUS_LINK_CLASSIC: &str = "Status klassisch";

const ROUTER_OS_SCORES: [(&str, u32); 6] = [
    ("UBNT-Version:", 100),
    ("Loadavg:", 1),
    ("Idle Time:", 1),
    ("Default Route:", 1),
    ("Uptime:", 1),
    ("Interface", 1),
];
const ROUTER_OS_THRESHOLD: u32 = 3;
const ROUTER_OS_LOGIN_ACTION: &str = "/login.cgi";
const ROUTER_OS_ROUTE_LINKS: [&str; 2] = ["OLSR-Routen", "OLSR-Routen (IPv4)"];

/// Result of the first pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstGuess {
    /// httpinfo plugin; extracted from the root page itself.
    Olsr,
    /// Some LuCI flavour; needs the second-stage probe.
    Luci,
    Freifunk { status_page: String },
    RouterOs { page: String },
}

type Detector = fn(&Html) -> Option<FirstGuess>;

/// Detectors in the order they are tried after the title check.
pub const DETECTORS: [(&str, Detector); 3] = [
    ("refresh-redirect", detect_refresh),
    ("marker-element", detect_marker),
    ("score-table", detect_score_table),
];

/// Run the title check and then every detector in order.
///
/// Returns the first confirmation together with the name of the detector
/// that produced it, or `None` when nothing recognised the page.
pub fn first_guess(html: &str) -> Option<(&'static str, FirstGuess)> {
    let doc = Html::parse_document(html);

    if title_matches(&doc) {
        return Some(("title", FirstGuess::Olsr));
    }

    DETECTORS
        .iter()
        .find_map(|(name, detect)| detect(&doc).map(|guess| (*name, guess)))
}

fn title_matches(doc: &Html) -> bool {
    select_all(doc, "title")
        .first()
        .and_then(|t| element_string(*t))
        .is_some_and(|t| t.trim() == OLSR_TITLE)
}

fn detect_refresh(doc: &Html) -> Option<FirstGuess> {
    for meta in select_all(doc, "meta") {
        let equiv = meta.value().attr("http-equiv").unwrap_or("");
        if !equiv.eq_ignore_ascii_case("refresh") {
            continue;
        }
        let Some(content) = meta.value().attr("content") else {
            continue;
        };
        if content.ends_with(LUCI_REFRESH_SUFFIX) {
            return Some(FirstGuess::Luci);
        }
        if content.ends_with(FREIFUNK_REFRESH_SUFFIX) {
            return Some(FirstGuess::Freifunk {
                status_page: FREIFUNK_STATUS_PAGE.to_string(),
            });
        }
    }
    None
}

fn detect_marker(doc: &Html) -> Option<FirstGuess> {
    let confirmed = select_all(doc, "big")
        .into_iter()
        .any(|big| has_class(big, "plugin"));
    if !confirmed {
        return None;
    }
    let status_page = status_link(doc).unwrap_or_else(|| FREIFUNK_STATUS_PAGE.to_string());
    Some(FirstGuess::Freifunk { status_page })
}

/// Best-effort lookup of the Freifunk status page link.
///
/// A "Status klassisch" link wins over a plain "Status" link no matter
/// which of the two comes first.
pub fn status_link(doc: &Html) -> Option<String> {
    let mut plain = None;
    for a in select_all(doc, "a") {
        if !has_class(a, "plugin") {
            continue;
        }
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        match element_string(a).as_deref() {
            Some(STATUS_LINK_CLASSIC) => return Some(href.to_string()),
            Some(STATUS_LINK) if plain.is_none() => plain = Some(href.to_string()),
            _ => {}
        }
    }
    plain
}

fn detect_score_table(doc: &Html) -> Option<FirstGuess> {
    let mut page = if router_os_score_exceeded(doc) {
        ROUTER_OS_PAGE.to_string()
    } else if select_all(doc, "form")
        .into_iter()
        .any(|f| f.value().attr("action") == Some(ROUTER_OS_LOGIN_ACTION))
    {
        ROUTER_OS_LOGIN_PAGE.to_string()
    } else {
        return None;
    };

    let route_link = select_all(doc, "a").into_iter().find(|a| {
        element_string(*a).is_some_and(|s| ROUTER_OS_ROUTE_LINKS.contains(&s.trim()))
    });
    if let Some(href) = route_link.and_then(|a| a.value().attr("href")) {
        page = href.split('?').next().unwrap_or(href).to_string();
    }

    Some(FirstGuess::RouterOs { page })
}

/// Weighted vote over table cells; stops as soon as the threshold is passed.
fn router_os_score_exceeded(doc: &Html) -> bool {
    let mut score = 0;
    for td in select_all(doc, "td") {
        let Some(text) = element_string(td) else {
            continue;
        };
        let text = text.trim();
        if let Some((_, weight)) = ROUTER_OS_SCORES.iter().find(|(label, _)| *label == text) {
            score += *weight;
        }
        if score > ROUTER_OS_THRESHOLD {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guess(html: &str) -> Option<FirstGuess> {
        first_guess(html).map(|(_, g)| g)
    }

    #[test]
    fn test_olsr_title() {
        let html = "<html><head><title> olsr.org httpinfo plugin </title></head><body></body></html>";
        assert_eq!(first_guess(html), Some(("title", FirstGuess::Olsr)));
    }

    #[test]
    fn test_similar_title_is_not_olsr() {
        let html = "<html><head><title>olsr.org httpinfo plugin v2</title></head></html>";
        assert_eq!(guess(html), None);
    }

    #[test]
    fn test_luci_refresh() {
        let html = r#"<html><head><meta http-equiv="refresh" content="0; URL=/cgi-bin/luci"></head></html>"#;
        assert_eq!(first_guess(html), Some(("refresh-redirect", FirstGuess::Luci)));
    }

    #[test]
    fn test_refresh_equiv_ignores_case() {
        let html = r#"<html><head><META HTTP-EQUIV="Refresh" content="0; URL=/cgi-bin/luci"></head></html>"#;
        assert_eq!(first_guess(html), Some(("refresh-redirect", FirstGuess::Luci)));
    }

    #[test]
    fn test_fonera_refresh_is_freifunk() {
        let html = r#"<html><head><meta http-equiv="refresh" content="0;URL=/cgi-bin-index.html"></head></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::Freifunk {
                status_page: FREIFUNK_STATUS_PAGE.to_string()
            })
        );
    }

    #[test]
    fn test_refresh_beats_marker() {
        let html = r#"<html><head><meta http-equiv="refresh" content="0; URL=/cgi-bin/luci"></head>
            <body><big class="plugin">Freifunk</big></body></html>"#;
        assert_eq!(guess(html), Some(FirstGuess::Luci));
    }

    #[test]
    fn test_marker_with_classic_status_link_found_last() {
        let html = r#"<html><body><big class="plugin">Home</big>
            <a class="plugin" href="cgi-bin-status.html">Status</a>
            <a class="plugin" href="cgi-bin-status-classic.html">Status klassisch</a>
            </body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::Freifunk {
                status_page: "cgi-bin-status-classic.html".to_string()
            })
        );
    }

    #[test]
    fn test_marker_with_classic_status_link_found_first() {
        let html = r#"<html><body><big class="plugin">Home</big>
            <a class="plugin" href="classic.html">Status klassisch</a>
            <a class="plugin" href="new.html">Status</a>
            </body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::Freifunk {
                status_page: "classic.html".to_string()
            })
        );
    }

    #[test]
    fn test_marker_with_plain_status_link() {
        let html = r#"<html><body><big class="plugin">Home</big>
            <a class="plugin" href="status.html">Status</a>
            <a href="other.html">Status klassisch</a>
            </body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::Freifunk {
                status_page: "status.html".to_string()
            })
        );
    }

    #[test]
    fn test_score_table_router_os() {
        let html = r#"<html><body><table>
            <tr><td>Uptime:</td><td>3 days</td></tr>
            <tr><td>Loadavg:</td><td>0.1</td></tr>
            <tr><td>Idle Time:</td><td>99%</td></tr>
            <tr><td>Default Route:</td><td>10.0.0.1</td></tr>
            </table>
            <a href="/cgi-bin/index.cgi?post_routes=1">OLSR-Routen</a>
            </body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::RouterOs {
                page: "/cgi-bin/index.cgi".to_string()
            })
        );
    }

    #[test]
    fn test_score_exactly_threshold_declines() {
        let html = r#"<html><body><table>
            <tr><td>Uptime:</td><td>Loadavg:</td><td>Idle Time:</td></tr>
            </table></body></html>"#;
        assert_eq!(guess(html), None);
    }

    #[test]
    fn test_ubnt_version_alone_confirms() {
        let html = r#"<html><body><table><tr><td>UBNT-Version:</td><td>XM.v5</td></tr></table></body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::RouterOs {
                page: ROUTER_OS_PAGE.to_string()
            })
        );
    }

    #[test]
    fn test_padded_cells_still_score() {
        let html = r#"<html><body><table><tr><td>
            UBNT-Version:
        </td></tr></table></body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::RouterOs {
                page: ROUTER_OS_PAGE.to_string()
            })
        );
    }

    #[test]
    fn test_cells_after_threshold_do_not_change_outcome() {
        let base = r#"<tr><td>UBNT-Version:</td></tr>"#;
        let short = format!("<html><body><table>{base}</table></body></html>");
        let long = format!(
            "<html><body><table>{base}<tr><td>Uptime:</td><td>Loadavg:</td><td>junk</td></tr></table></body></html>"
        );
        assert_eq!(guess(&short), guess(&long));
    }

    #[test]
    fn test_login_form_router_os() {
        let html = r#"<html><body><form action="/login.cgi" method="post"></form></body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::RouterOs {
                page: ROUTER_OS_LOGIN_PAGE.to_string()
            })
        );
    }

    #[test]
    fn test_login_form_refined_by_route_link() {
        let html = r#"<html><body><form action="/login.cgi"></form>
            <a href="cgi-bin/olsr.cgi?x=1">OLSR-Routen (IPv4)</a></body></html>"#;
        assert_eq!(
            guess(html),
            Some(FirstGuess::RouterOs {
                page: "cgi-bin/olsr.cgi".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_page() {
        assert_eq!(guess("<html><body><p>hello</p></body></html>"), None);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let html = r#"<html><body><big class="plugin">x</big><a class="plugin" href="s">Status</a></body></html>"#;
        let first = first_guess(html);
        for _ in 0..5 {
            assert_eq!(first_guess(html), first);
        }
    }
}
