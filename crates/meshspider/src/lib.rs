//! meshspider: probe the web interfaces of wireless mesh nodes.
//!
//! For every candidate node the spider fetches the root page, works out
//! which management frontend the node runs (olsrd httpinfo, LuCI in its
//! OpenWRT and Backfire flavours, classic Freifunk, or Router_OS) and
//! extracts interfaces, addresses and the firmware version. Runs are
//! bounded by a worker pool with a per-node deadline; results of several
//! runs are reconciled into one map and can be written as dumps or CSV.

pub mod addr;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod extract;
pub mod fetch;
pub mod html;
pub mod reconcile;
pub mod report;
pub mod storage;
pub mod store;
pub mod topology;
pub mod types;

pub use classify::{Classification, Classifier};
pub use config::{RunPlan, SpiderConfig};
pub use dispatch::{Dispatcher, Probe, RunSummary};
pub use extract::{ExtractRequest, Extraction, Extractor, Extractors, Wants};
pub use fetch::{Fetch, HttpFetcher, LocalFetcher, Page};
pub use reconcile::{decide, merge, Decision, Reconciler};
pub use report::ResultStats;
pub use storage::{Dump, DumpReader, DumpWriter};
pub use store::{ResultMap, ResultStore};
pub use types::*;
