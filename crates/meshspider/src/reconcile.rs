//! Folding results of several runs into one map.
//!
//! Sources are folded in order into an accumulator. For a node present in
//! both, the first matching rule of this table decides:
//!
//! | existing             | incoming                   | kept     |
//! |----------------------|----------------------------|----------|
//! | failure              | success                    | incoming |
//! | `Timeout` failure    | anything                   | incoming |
//! | anything             | `InvalidResponse` failure  | incoming |
//! | success              | other failure              | existing |
//! | success              | success                    | existing |
//! | other failure        | other failure              | existing |
//!
//! The `InvalidResponse` rule applies even over an existing success, so
//! merge order matters for those nodes.

use std::collections::BTreeSet;

use tracing::debug;

use crate::store::ResultMap;
use crate::types::{FailureKind, NodeAddress, ProbeOutcome, SpiderError};

/// Which side of a merge survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Incoming,
    Existing,
}

/// Apply the precedence table to one key present in both maps.
pub fn decide(existing: &ProbeOutcome, incoming: &ProbeOutcome) -> Decision {
    rule(existing, incoming).0
}

/// The decision together with the table row that produced it.
fn rule(existing: &ProbeOutcome, incoming: &ProbeOutcome) -> (Decision, &'static str) {
    use ProbeOutcome::{Failure, Success};

    match (existing, incoming) {
        (Failure { .. }, Success(_)) => (Decision::Incoming, "success replaces failure"),
        (
            Failure {
                kind: FailureKind::Timeout,
                ..
            },
            _,
        ) => (Decision::Incoming, "timeout is always replaced"),
        (
            _,
            Failure {
                kind: FailureKind::InvalidResponse,
                ..
            },
        ) => (Decision::Incoming, "invalid response always replaces"),
        (Success(_), Failure { .. }) => (Decision::Existing, "failure never replaces success"),
        (Success(_), Success(_)) => (Decision::Existing, "first success wins"),
        (Failure { .. }, Failure { .. }) => (Decision::Existing, "first failure wins"),
    }
}

/// Running accumulator over any number of result maps.
#[derive(Debug, Default)]
pub struct Reconciler {
    merged: ResultMap,
    errors: Vec<(String, SpiderError)>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `incoming` into the accumulator; `source` only labels log lines.
    pub fn fold(&mut self, source: &str, incoming: ResultMap) {
        debug!("merging {} entries from {source}", incoming.len());
        let mut untouched: BTreeSet<NodeAddress> = self.merged.keys().copied().collect();

        for (node, outcome) in incoming {
            untouched.remove(&node);
            let Some(existing) = self.merged.get(&node) else {
                debug!("{node}: new: {outcome}");
                self.merged.insert(node, outcome);
                continue;
            };
            let (decision, why) = rule(existing, &outcome);
            match decision {
                Decision::Incoming => {
                    if existing != &outcome {
                        debug!("{node}: overwriting {existing} with {outcome} ({why})");
                    }
                    self.merged.insert(node, outcome);
                }
                Decision::Existing => {
                    if existing != &outcome {
                        debug!("{node}: not overwriting {existing} with {outcome} ({why})");
                    }
                }
            }
        }

        for node in untouched {
            debug!("{node}: not existing in {source}");
        }
    }

    /// Record a source that could not be loaded; merging carries on.
    pub fn source_failed(&mut self, source: &str, error: SpiderError) {
        tracing::warn!("skipping {source}: {error}");
        self.errors.push((source.to_string(), error));
    }

    pub fn errors(&self) -> &[(String, SpiderError)] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    pub fn finish(self) -> ResultMap {
        self.merged
    }
}

/// Fold `sources` in order.
pub fn merge<'a>(sources: impl IntoIterator<Item = (&'a str, ResultMap)>) -> ResultMap {
    let mut reconciler = Reconciler::new();
    for (label, results) in sources {
        reconciler.fold(label, results);
    }
    reconciler.finish()
}
