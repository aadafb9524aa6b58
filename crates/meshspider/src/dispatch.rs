//! Bounded worker pool running one probe per node.
//!
//! Each node gets a supervisor future; at most `pool_size` supervisors are
//! polled at once. A supervisor spawns the probe as its own task and waits
//! for it under the node deadline. When the deadline passes the supervisor
//! records a timeout, aborts the task handle and moves on; work stuck on a
//! blocking thread is left to finish on its own and its result is dropped.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SpiderConfig;
use crate::store::ResultStore;
use crate::types::{FailureKind, NodeAddress, ProbeOutcome, Snapshot, SpiderResult};

/// Classify-and-extract work for one node.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn probe(&self, node: NodeAddress, port: Option<u16>) -> SpiderResult<Snapshot>;
}

/// Counts for one dispatcher run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dispatched: usize,
    /// Already present in the store when their turn came.
    pub skipped: usize,
    pub succeeded: usize,
    /// Failures other than timeouts.
    pub failed: usize,
    pub timed_out: usize,
}

enum Tally {
    Skipped,
    Done(Option<FailureKind>),
}

pub struct Dispatcher {
    probe: Arc<dyn Probe>,
    config: Arc<SpiderConfig>,
}

impl Dispatcher {
    pub fn new(probe: Arc<dyn Probe>, config: SpiderConfig) -> Self {
        Self {
            probe,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SpiderConfig {
        &self.config
    }

    /// Probe every node not yet in `store`, writing one outcome per node.
    ///
    /// Cancelling `cancel` stops new dispatch; probes already running finish
    /// or time out and their outcomes are kept.
    pub async fn run(
        &self,
        nodes: impl IntoIterator<Item = NodeAddress>,
        store: &ResultStore,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let nodes: BTreeSet<NodeAddress> = nodes.into_iter().collect();
        info!(
            "dispatching {} nodes with {} workers, timeout {:?}",
            nodes.len(),
            self.config.pool_size,
            self.config.node_timeout
        );

        let tallies: Vec<Tally> = stream::iter(nodes)
            .take_until(cancel.cancelled())
            .map(|node| self.supervise(node, store))
            .buffer_unordered(self.config.pool_size.max(1))
            .collect()
            .await;

        if cancel.is_cancelled() {
            warn!("run cancelled, remaining nodes were not dispatched");
        }

        let mut summary = RunSummary::default();
        for tally in tallies {
            match tally {
                Tally::Skipped => summary.skipped += 1,
                Tally::Done(kind) => {
                    summary.dispatched += 1;
                    match kind {
                        None => summary.succeeded += 1,
                        Some(FailureKind::Timeout) => summary.timed_out += 1,
                        Some(_) => summary.failed += 1,
                    }
                }
            }
        }
        info!(
            "run finished: {} dispatched, {} skipped, {} ok, {} failed, {} timed out",
            summary.dispatched,
            summary.skipped,
            summary.succeeded,
            summary.failed,
            summary.timed_out
        );
        summary
    }

    async fn supervise(&self, node: NodeAddress, store: &ResultStore) -> Tally {
        if store.contains(&node) {
            debug!("{node}: already recorded, skipping");
            return Tally::Skipped;
        }

        let probe = self.probe.clone();
        let port = self.config.port_for(&node);
        debug!("{node}: started");
        let mut handle = tokio::spawn(async move { probe.probe(node, port).await });

        let outcome = match tokio::time::timeout(self.config.node_timeout, &mut handle).await {
            Ok(Ok(Ok(snapshot))) => ProbeOutcome::Success(snapshot),
            Ok(Ok(Err(e))) => ProbeOutcome::from(e),
            Ok(Err(e)) if e.is_panic() => ProbeOutcome::failure(
                FailureKind::InternalError,
                format!("probe panicked: {}", panic_message(e.into_panic())),
            ),
            Ok(Err(e)) => ProbeOutcome::failure(FailureKind::InternalError, e.to_string()),
            Err(_) => {
                handle.abort();
                ProbeOutcome::failure(
                    FailureKind::Timeout,
                    format!("no result within {:?}", self.config.node_timeout),
                )
            }
        };

        match &outcome {
            ProbeOutcome::Success(snapshot) => info!("{node}: {snapshot}"),
            ProbeOutcome::Failure {
                kind: FailureKind::Timeout,
                ..
            } => debug!("{node}: {outcome}"),
            ProbeOutcome::Failure { .. } => warn!("{node}: {outcome}"),
        }

        let kind = outcome.failure_kind();
        if let Err(e) = store.record(node, outcome) {
            warn!("{e}");
        }
        Tally::Done(kind)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
