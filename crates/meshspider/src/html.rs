//! Small helpers over `scraper` shared by the detectors and extractors.
//!
//! `scraper` types are `!Send`; parse inside [`parse_blocking`] or drop the
//! document before awaiting.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::types::{SpiderError, SpiderResult};

/// Run a synchronous page parser on the blocking pool.
///
/// The parsed document never crosses an await point, so callers stay `Send`.
pub async fn parse_blocking<T, F>(body: String, parse: F) -> SpiderResult<T>
where
    F: FnOnce(&str) -> SpiderResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&body))
        .await
        .map_err(|e| SpiderError::Internal(format!("parser task failed: {e}")))?
}

/// All elements of `doc` matching `css`, in document order.
pub fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// All descendants of `el` matching `css`, in document order.
pub fn select_within<'a>(el: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => el.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// The text of an element when it has exactly one text leaf.
///
/// Mirrors the usual "string" accessor of HTML soup libraries: an element
/// with a single child yields that child's string (recursively); anything
/// with mixed or multiple children yields `None`.
pub fn element_string(el: ElementRef<'_>) -> Option<String> {
    let mut children = el.children();
    let only = children.next()?;
    if children.next().is_some() {
        return None;
    }
    match only.value() {
        Node::Text(t) => Some(t.text.to_string()),
        Node::Element(_) => ElementRef::wrap(only).and_then(element_string),
        _ => None,
    }
}

/// All text below an element, whitespace-joined and trimmed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Direct element children.
pub fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

/// First element child, skipping text.
pub fn first_child_element(el: ElementRef<'_>) -> Option<ElementRef<'_>> {
    child_elements(el).next()
}

/// Whether the element's `class` attribute contains `class`.
pub fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Rows of a table, looking through an implicit `tbody`/`thead`/`tfoot`
/// but not into nested tables.
pub fn table_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in child_elements(table) {
        match child.value().name() {
            "tr" => rows.push(child),
            "tbody" | "thead" | "tfoot" => {
                rows.extend(child_elements(child).filter(|c| c.value().name() == "tr"))
            }
            _ => {}
        }
    }
    rows
}

/// Text of the node immediately after `el`, if that node is text.
pub fn next_text(el: ElementRef<'_>) -> Option<String> {
    let sibling = el.next_sibling()?;
    match sibling.value() {
        Node::Text(t) => Some(t.text.to_string()),
        _ => None,
    }
}
