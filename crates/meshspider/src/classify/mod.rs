//! Backend detection and snapshot assembly for a single node.
//!
//! The root page goes through the first-pass cascade in [`detect`]; an
//! ambiguous LuCI answer is resolved by a second fetch ([`luci`]). The chosen
//! family's extractor then produces the facts that end up in the
//! [`Snapshot`].

pub mod detect;
pub mod luci;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::addr::is_routable;
use crate::dispatch::Probe;
use crate::extract::{join_url, ExtractRequest, Extractors};
use crate::fetch::Fetch;
use crate::html::parse_blocking;
use crate::types::{Backend, NodeAddress, Snapshot, SpiderError, SpiderResult};

pub use detect::{first_guess, FirstGuess};
pub use luci::{luci_flavor, LUCI_PAGE};

/// Version recorded when no extractor found one.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Outcome of detection: the family and what its extractor should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub backend: Backend,
    /// Name of the first-pass detector that confirmed.
    pub detector: &'static str,
    pub request: ExtractRequest,
}

/// Classifies nodes and runs the matching extractor.
#[derive(Clone)]
pub struct Classifier {
    fetcher: Arc<dyn Fetch>,
    extractors: Arc<Extractors>,
}

impl Classifier {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            fetcher,
            extractors: Arc::new(Extractors::builtin()),
        }
    }

    pub fn with_extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = Arc::new(extractors);
        self
    }

    /// Pick the backend family of `node`.
    pub async fn classify(
        &self,
        node: NodeAddress,
        port: Option<u16>,
    ) -> SpiderResult<Classification> {
        let site = node.site_url(port);
        let root_url = format!("{site}/");
        let root = self.fetcher.get(&root_url).await?;

        let (detector, guess) = parse_blocking(root.body, |body| Ok(first_guess(body)))
            .await?
            .ok_or_else(|| SpiderError::InvalidResponse("unknown web frontend".into()))?;
        debug!("{node}: first pass {guess:?} via {detector}");

        let (backend, request) = match guess {
            FirstGuess::Olsr => (Backend::Olsr, ExtractRequest::new(node, root_url)),
            FirstGuess::Luci => {
                let page = self.fetcher.get(&join_url(&site, LUCI_PAGE)).await?;
                let backend = parse_blocking(page.body, |body| Ok(luci_flavor(body))).await?;
                debug!("{node}: LuCI flavour {backend}");
                (backend, ExtractRequest::new(node, site))
            }
            FirstGuess::Freifunk { status_page } => (
                Backend::Freifunk,
                ExtractRequest::new(node, site).with_page(status_page),
            ),
            FirstGuess::RouterOs { page } => (
                Backend::RouterOs,
                ExtractRequest::new(node, site).with_page(page),
            ),
        };

        Ok(Classification {
            backend,
            detector,
            request,
        })
    }

    /// Classify `node`, run its extractor and build the snapshot.
    pub async fn snapshot(&self, node: NodeAddress, port: Option<u16>) -> SpiderResult<Snapshot> {
        let classification = self.classify(node, port).await?;
        let extraction = self
            .extractors
            .for_backend(classification.backend)
            .extract(self.fetcher.as_ref(), &classification.request)
            .await?;

        Ok(Snapshot {
            backend: classification.backend,
            version: extraction
                .version
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            interfaces: extraction.interfaces,
            addresses: extraction
                .addresses
                .into_iter()
                .filter(|ip| is_routable(*ip))
                .collect(),
            captured_at: Utc::now(),
        })
    }
}

#[async_trait]
impl Probe for Classifier {
    async fn probe(&self, node: NodeAddress, port: Option<u16>) -> SpiderResult<Snapshot> {
        self.snapshot(node, port).await
    }
}
