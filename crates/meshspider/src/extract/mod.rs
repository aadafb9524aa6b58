//! Per-family page extractors.
//!
//! An extractor receives the node's site URL, the page the classifier picked
//! (if any) and the facts wanted, fetches whatever additional pages its family
//! needs and returns an [`Extraction`]. Nothing is written into shared state;
//! the classifier folds the returned value into the node's snapshot.

pub mod freifunk;
pub mod luci;
pub mod olsr;
pub mod router_os;

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::fetch::Fetch;
use crate::types::{Backend, Interface, NodeAddress, SpiderResult};

pub use freifunk::FreifunkExtractor;
pub use luci::LuciExtractor;
pub use olsr::OlsrExtractor;
pub use router_os::RouterOsExtractor;

/// Which facts the caller wants extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wants {
    pub addresses: bool,
    pub interfaces: bool,
}

impl Wants {
    pub fn all() -> Self {
        Self {
            addresses: true,
            interfaces: true,
        }
    }

    pub fn any(&self) -> bool {
        self.addresses || self.interfaces
    }
}

impl Default for Wants {
    fn default() -> Self {
        Self::all()
    }
}

/// Parameters handed from the classifier to an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    pub node: NodeAddress,
    /// Base URL, including a port override when one applies.
    pub site: String,
    /// Page picked during detection; `None` lets the extractor use its own.
    pub page: Option<String>,
    pub wants: Wants,
}

impl ExtractRequest {
    pub fn new(node: NodeAddress, site: impl Into<String>) -> Self {
        Self {
            node,
            site: site.into(),
            page: None,
            wants: Wants::all(),
        }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    /// The page to fetch: the requested one, or `default`.
    pub fn page(&self, default: &str) -> String {
        self.page.clone().unwrap_or_else(|| default.to_string())
    }

    /// Full URL of `page(default)` below the site.
    pub fn page_url(&self, default: &str) -> String {
        join_url(&self.site, &self.page(default))
    }
}

/// Join a site and a relative page without doubling the slash.
pub fn join_url(site: &str, page: &str) -> String {
    let page = page.trim_start_matches('/');
    if page.is_empty() {
        return site.to_string();
    }
    format!("{}/{}", site.trim_end_matches('/'), page)
}

/// Everything an extractor found on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub version: Option<String>,
    pub interfaces: Vec<Interface>,
    /// All addresses seen; the classifier keeps the routable ones.
    pub addresses: BTreeSet<IpAddr>,
}

/// Pulls interfaces, addresses and version out of one family's pages.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, fetch: &dyn Fetch, request: &ExtractRequest)
        -> SpiderResult<Extraction>;
}

/// One extractor per backend family.
#[derive(Clone)]
pub struct Extractors {
    olsr: Arc<dyn Extractor>,
    openwrt: Arc<dyn Extractor>,
    backfire: Arc<dyn Extractor>,
    freifunk: Arc<dyn Extractor>,
    router_os: Arc<dyn Extractor>,
}

impl Extractors {
    /// The built-in page parsers.
    pub fn builtin() -> Self {
        let luci: Arc<dyn Extractor> = Arc::new(LuciExtractor);
        Self {
            olsr: Arc::new(OlsrExtractor),
            openwrt: luci.clone(),
            backfire: luci,
            freifunk: Arc::new(FreifunkExtractor),
            router_os: Arc::new(RouterOsExtractor),
        }
    }

    /// Replace the handler for one family.
    pub fn with(mut self, backend: Backend, extractor: Arc<dyn Extractor>) -> Self {
        match backend {
            Backend::Olsr => self.olsr = extractor,
            Backend::OpenWrt => self.openwrt = extractor,
            Backend::Backfire => self.backfire = extractor,
            Backend::Freifunk => self.freifunk = extractor,
            Backend::RouterOs => self.router_os = extractor,
        }
        self
    }

    pub fn for_backend(&self, backend: Backend) -> &dyn Extractor {
        match backend {
            Backend::Olsr => self.olsr.as_ref(),
            Backend::OpenWrt => self.openwrt.as_ref(),
            Backend::Backfire => self.backfire.as_ref(),
            Backend::Freifunk => self.freifunk.as_ref(),
            Backend::RouterOs => self.router_os.as_ref(),
        }
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::builtin()
    }
}
