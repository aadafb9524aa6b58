//! Second-stage probe telling the LuCI flavours apart.

use scraper::Html;

use crate::html::{child_elements, select_all};
use crate::types::Backend;

/// Sub-path fetched for the second stage.
pub const LUCI_PAGE: &str = "cgi-bin/luci";

const HEADER_TAGS: [&str; 2] = ["p", "h1"];

/// OpenWRT when every element in `div#header` is a `p` or `h1`, Backfire
/// otherwise (including when there is no header at all).
pub fn luci_flavor(html: &str) -> Backend {
    let doc = Html::parse_document(html);
    let Some(header) = select_all(&doc, "div")
        .into_iter()
        .find(|d| d.value().id() == Some("header"))
    else {
        return Backend::Backfire;
    };

    if child_elements(header).all(|c| HEADER_TAGS.contains(&c.value().name())) {
        Backend::OpenWrt
    } else {
        Backend::Backfire
    }
}
